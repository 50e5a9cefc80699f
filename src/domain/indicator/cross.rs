//! Crossover detection.
//!
//! [`CrossUp`] and [`CrossDown`] are composites: a [`NonZeroDifference`], its
//! value one bar back, and two comparisons joined by `and`:
//!
//! ```text
//! up   = nzd(-1) < 0  and  in0 > in1
//! down = nzd(-1) > 0  and  in0 < in1
//! ```
//!
//! [`CrossOver`] is a single node with its own carried difference and emits
//! +1.0 / -1.0 / 0.0. It seeds the carry from the first bar's raw difference
//! and reports 0.0 on that bar.
//!
//! In all three, equality never fires a cross and a run of equal bars does not
//! erase the sign of the last nonzero difference.

use crate::domain::error::EngineError;
use crate::domain::graph::GraphBuilder;
use crate::domain::indicator::nzd::NonZeroDifference;
use crate::domain::line::{LineRef, Schema};
use crate::domain::node::{BarContext, Indicator, RangeContext};

/// Lines produced by a directional cross composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossLines {
    /// Sticky difference between the two inputs.
    pub nzd: LineRef,
    /// 1.0 on the bar of the cross, 0.0 otherwise.
    pub cross: LineRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

fn build_cross(
    builder: &mut GraphBuilder,
    inputs: &[LineRef],
    direction: Direction,
    name: &'static str,
) -> Result<CrossLines, EngineError> {
    if inputs.len() < 2 {
        return Err(EngineError::TooFewInputs {
            node: name,
            expected: 2,
            got: inputs.len(),
        });
    }
    let (a, b) = (inputs[0], inputs[1]);
    let nzd = builder.add(NonZeroDifference::new(), &[a, b])?;
    let prev = builder.delay(nzd, 1)?;
    let (before, after) = match direction {
        Direction::Up => (builder.lt(prev, 0.0)?, builder.gt(a, b)?),
        Direction::Down => (builder.gt(prev, 0.0)?, builder.lt(a, b)?),
    };
    let cross = builder.and(before, after)?;
    builder.label(cross.node, name);
    Ok(CrossLines {
        nzd: nzd.into(),
        cross,
    })
}

/// 1.0 on the bar where `in0` crosses above `in1`.
pub struct CrossUp;

impl CrossUp {
    pub const NAME: &'static str = "crossup";

    pub fn build(
        builder: &mut GraphBuilder,
        inputs: &[LineRef],
    ) -> Result<CrossLines, EngineError> {
        build_cross(builder, inputs, Direction::Up, Self::NAME)
    }
}

/// 1.0 on the bar where `in0` crosses below `in1`.
pub struct CrossDown;

impl CrossDown {
    pub const NAME: &'static str = "crossdown";

    pub fn build(
        builder: &mut GraphBuilder,
        inputs: &[LineRef],
    ) -> Result<CrossLines, EngineError> {
        build_cross(builder, inputs, Direction::Down, Self::NAME)
    }
}

/// Signed crossover: +1.0 up, -1.0 down, 0.0 otherwise.
#[derive(Debug, Default)]
pub struct CrossOver {
    last_nzd: f64,
}

impl CrossOver {
    pub fn new() -> Self {
        CrossOver { last_nzd: 0.0 }
    }
}

/// Signal for the current `diff` given the carried difference; also returns
/// the carry for the next bar.
#[inline]
fn signed_cross(carried: f64, diff: f64) -> (f64, f64) {
    let signal = if carried < 0.0 && diff > 0.0 {
        1.0
    } else if carried > 0.0 && diff < 0.0 {
        -1.0
    } else {
        0.0
    };
    let carry = if diff != 0.0 { diff } else { carried };
    (signal, carry)
}

impl Indicator for CrossOver {
    const SCHEMA: Schema = Schema {
        name: "crossover",
        lines: &["crossover"],
        min_inputs: 2,
    };

    fn nextstart(&mut self, ctx: &mut BarContext<'_>) {
        self.last_nzd = ctx.input(0, 0) - ctx.input(1, 0);
        ctx.set(0, 0.0);
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let diff = ctx.input(0, 0) - ctx.input(1, 0);
        let (signal, carry) = signed_cross(self.last_nzd, diff);
        self.last_nzd = carry;
        ctx.set(0, signal);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let (a, b) = (ctx.input(0), ctx.input(1));
        let seed = ctx.seed_bar();
        let out = ctx.line_mut(0);
        let mut carried = 0.0;
        for i in start.max(seed)..end {
            let diff = a[i] - b[i];
            if i == seed {
                carried = diff;
                out.set_at(i, 0.0);
                continue;
            }
            let (signal, carry) = signed_cross(carried, diff);
            carried = carry;
            out.set_at(i, signal);
        }
        self.last_nzd = carried;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::feed::DataFeed;
    use crate::domain::indicator::test_support::{assert_modes_agree, run_all_modes};
    use proptest::prelude::*;

    fn crossover(a: &[f64], b: &[f64]) -> Vec<Vec<f64>> {
        run_all_modes(&[a, b], |g, feeds| {
            let id = g.add(CrossOver::new(), &[feeds[0].into(), feeds[1].into()])?;
            Ok(id.into())
        })
    }

    fn cross_up(a: &[f64], b: &[f64]) -> Vec<Vec<f64>> {
        run_all_modes(&[a, b], |g, feeds| {
            Ok(CrossUp::build(g, &[feeds[0].into(), feeds[1].into()])?.cross)
        })
    }

    fn cross_down(a: &[f64], b: &[f64]) -> Vec<Vec<f64>> {
        run_all_modes(&[a, b], |g, feeds| {
            Ok(CrossDown::build(g, &[feeds[0].into(), feeds[1].into()])?.cross)
        })
    }

    #[test]
    fn crossover_fixture() {
        let outputs = crossover(&[1.0, 2.0, 3.0, 2.0, 1.0], &[2.0, 2.0, 2.0, 2.0, 2.0]);
        assert_eq!(outputs[0], vec![0.0, 0.0, 1.0, 0.0, -1.0]);
        assert_modes_agree(&outputs);
    }

    #[test]
    fn crossover_first_bar_never_crosses() {
        let outputs = crossover(&[5.0, 5.0], &[1.0, 1.0]);
        assert_eq!(outputs[0], vec![0.0, 0.0]);
    }

    #[test]
    fn negative_zero_positive_crosses_once_at_positive_bar() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 2.0, 2.0, 2.0];
        let signed = crossover(&a, &b);
        assert_eq!(signed[0], vec![0.0, 0.0, 1.0, 0.0]);

        let up = cross_up(&a, &b);
        assert!(up[0][0].is_nan());
        assert_eq!(&up[0][1..], &[0.0, 1.0, 0.0]);
        assert_modes_agree(&up);
    }

    #[test]
    fn long_equality_run_keeps_sign() {
        let a = [3.0, 2.0, 2.0, 2.0, 2.0, 1.0];
        let b = [2.0; 6];
        let signed = crossover(&a, &b);
        assert_eq!(signed[0], vec![0.0, 0.0, 0.0, 0.0, 0.0, -1.0]);

        let down = cross_down(&a, &b);
        assert_eq!(&down[0][1..], &[0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_modes_agree(&down);
    }

    #[test]
    fn touching_without_crossing_is_silent() {
        // Dips to equality and returns to the same side.
        let a = [1.0, 2.0, 1.0, 2.0, 1.0];
        let b = [2.0; 5];
        assert_eq!(crossover(&a, &b)[0], vec![0.0; 5]);
        assert_eq!(&cross_up(&a, &b)[0][1..], &[0.0; 4]);
    }

    #[test]
    fn no_cross_before_first_nonzero_difference() {
        let a = [2.0, 2.0, 3.0, 1.0];
        let b = [2.0; 4];
        assert_eq!(crossover(&a, &b)[0], vec![0.0, 0.0, 0.0, -1.0]);
        assert_eq!(&cross_up(&a, &b)[0][1..], &[0.0, 0.0, 0.0]);
        assert_eq!(&cross_down(&a, &b)[0][1..], &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn oscillation_around_zero() {
        // diff: -1, 0, 1, 0, -1, 0, 1
        let a = [1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0];
        let b = [2.0; 7];
        assert_eq!(
            crossover(&a, &b)[0],
            vec![0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 1.0]
        );
        assert_eq!(
            &cross_up(&a, &b)[0][1..],
            &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            &cross_down(&a, &b)[0][1..],
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn composite_minperiod_is_one_past_nzd() {
        let mut g = GraphBuilder::new();
        let a = g.add_feed(DataFeed::from_closes("a", &[1.0; 3])).unwrap();
        let b = g.add_feed(DataFeed::from_closes("b", &[1.0; 3])).unwrap();
        let lines = CrossUp::build(&mut g, &[a.into(), b.into()]).unwrap();
        assert_eq!(g.minperiod(lines.nzd.node), 1);
        assert_eq!(g.minperiod(lines.cross.node), 2);
        let graph = g.build();
        assert_eq!(graph.label(lines.cross.node), "crossup");
    }

    #[test]
    fn composites_need_two_inputs() {
        let mut g = GraphBuilder::new();
        let a = g.add_feed(DataFeed::from_closes("a", &[1.0])).unwrap();
        let before = g.len();
        let err = CrossDown::build(&mut g, &[a.into()]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::TooFewInputs {
                node: "crossdown",
                ..
            }
        ));
        assert_eq!(g.len(), before);
    }

    proptest! {
        #[test]
        fn signed_cross_matches_directional_crosses(
            pairs in prop::collection::vec((-2i32..3, -2i32..3), 2..60),
        ) {
            let a: Vec<f64> = pairs.iter().map(|p| f64::from(p.0)).collect();
            let b: Vec<f64> = pairs.iter().map(|p| f64::from(p.1)).collect();
            let signed = crossover(&a, &b);
            let up = cross_up(&a, &b);
            let down = cross_down(&a, &b);
            assert_modes_agree(&signed);
            assert_modes_agree(&up);
            assert_modes_agree(&down);

            prop_assert_eq!(signed[0][0], 0.0);
            for i in 1..a.len() {
                prop_assert_eq!(signed[0][i], up[0][i] - down[0][i]);
                // Equality never fires.
                if a[i] == b[i] {
                    prop_assert_eq!(signed[0][i], 0.0);
                }
            }
        }
    }
}
