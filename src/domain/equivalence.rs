//! Cross-mode verification: evaluate one graph under every run configuration
//! and report the first place where any line disagrees.

use log::{debug, info};

use crate::domain::error::EngineError;
use crate::domain::graph::{Graph, GraphBuilder};
use crate::domain::line::is_nan;
use crate::domain::scheduler::{RunConfig, evaluate};

/// Bitwise equality with NaN equal to NaN.
#[inline]
pub fn same_value(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (is_nan(a) && is_nan(b))
}

/// First disagreement between two evaluations of the same graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    pub node: String,
    pub line: String,
    pub bar: usize,
    pub left: f64,
    pub right: f64,
    pub left_config: RunConfig,
    pub right_config: RunConfig,
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} at bar {}: {} ({}, pregrow={}) vs {} ({}, pregrow={})",
            self.node,
            self.line,
            self.bar,
            self.left,
            self.left_config.mode,
            self.left_config.pregrow,
            self.right,
            self.right_config.mode,
            self.right_config.pregrow
        )
    }
}

/// Compare every line of two evaluated copies of one graph, in node order.
pub fn first_divergence(
    left: &Graph,
    left_config: RunConfig,
    right: &Graph,
    right_config: RunConfig,
) -> Option<Divergence> {
    for id in left.node_ids() {
        let (a, b) = (left.lines(id), right.lines(id));
        for ((name, la), (_, lb)) in a.iter().zip(b.iter()) {
            let (sa, sb) = (la.as_slice(), lb.as_slice());
            let len = sa.len().max(sb.len());
            for bar in 0..len {
                let (x, y) = (la.at(bar), lb.at(bar));
                if !same_value(x, y) {
                    return Some(Divergence {
                        node: left.label(id).to_string(),
                        line: name.to_string(),
                        bar,
                        left: x,
                        right: y,
                        left_config,
                        right_config,
                    });
                }
            }
        }
    }
    None
}

/// Build the graph once per run configuration, evaluate each copy and compare
/// them all against the first. `build` must construct the same graph every
/// time it is called.
pub fn verify<F>(build: F) -> Result<Option<Divergence>, EngineError>
where
    F: Fn() -> Result<GraphBuilder, EngineError>,
{
    let configs = RunConfig::all();
    let reference_config = configs[0];
    let reference = evaluate(build()?.build(), reference_config)?;
    info!(
        "verifying {} nodes over {} bars",
        reference.len(),
        reference.timeline().len()
    );
    for &config in &configs[1..] {
        let other = evaluate(build()?.build(), config)?;
        if let Some(divergence) = first_divergence(&reference, reference_config, &other, config) {
            return Ok(Some(divergence));
        }
        debug!("{} pregrow={} matches", config.mode, config.pregrow);
    }
    Ok(None)
}
