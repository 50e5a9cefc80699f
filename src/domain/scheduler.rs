//! Run-mode selection and the bar-driving scheduler.
//!
//! One topological order is computed when the scheduler is created and
//! minperiods are resolved bottom-up in that order. After that:
//!
//! - incremental mode advances every node by one bar per `step`, inputs
//!   before dependents;
//! - batch mode fills every node over the whole run in `start`, in the same
//!   order, and `step` only walks the cursors forward so consumers read the
//!   same `get(ago)` view they would see incrementally.
//!
//! `stop` tears nodes down in reverse order, exactly once per node.

use std::collections::VecDeque;

use log::{debug, info};

use crate::domain::error::EngineError;
use crate::domain::graph::Graph;
use crate::domain::node::combine_minperiod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Bar-by-bar evaluation.
    #[default]
    Incremental,
    /// Whole-range evaluation in one call per node.
    Batch,
}

impl RunMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "incremental" | "next" | "streaming" => Some(RunMode::Incremental),
            "batch" | "once" | "vectorized" => Some(RunMode::Batch),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Incremental => write!(f, "incremental"),
            RunMode::Batch => write!(f, "batch"),
        }
    }
}

/// How a run evaluates its graph. Results are identical under every
/// combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunConfig {
    pub mode: RunMode,
    /// Size every buffer for the whole run before the first bar instead of
    /// growing it one slot per bar. Batch mode always pre-grows.
    pub pregrow: bool,
}

impl RunConfig {
    pub fn new(mode: RunMode, pregrow: bool) -> Self {
        RunConfig { mode, pregrow }
    }

    /// Every mode and growth combination, incremental without pre-growth
    /// first.
    pub fn all() -> [RunConfig; 4] {
        [
            RunConfig::new(RunMode::Incremental, false),
            RunConfig::new(RunMode::Incremental, true),
            RunConfig::new(RunMode::Batch, false),
            RunConfig::new(RunMode::Batch, true),
        ]
    }
}

/// Kahn's algorithm over input edges, ties broken by node index.
pub fn topological_order(graph: &Graph) -> Vec<usize> {
    let n = graph.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for id in graph.node_ids() {
        for input in graph.inputs(id) {
            indegree[id.index()] += 1;
            dependents[input.node.index()].push(id.index());
        }
    }

    let mut ready: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.push_back(d);
            }
        }
    }
    debug_assert_eq!(order.len(), n, "graph built through GraphBuilder is acyclic");
    order
}

pub struct Scheduler {
    graph: Graph,
    order: Vec<usize>,
    config: RunConfig,
    len: usize,
    next_bar: usize,
    started: bool,
    stopped: bool,
}

impl Scheduler {
    pub fn new(mut graph: Graph, config: RunConfig) -> Result<Self, EngineError> {
        if graph.feeds().is_empty() {
            return Err(EngineError::NoFeeds);
        }
        let len = graph.timeline().len();
        let order = topological_order(&graph);

        for &idx in &order {
            let id = crate::domain::line::NodeId(idx);
            let input_mps: Vec<usize> = graph
                .inputs(id)
                .iter()
                .map(|r| graph.minperiod(r.node))
                .collect();
            let mp = combine_minperiod(input_mps, graph.lookback(idx));
            graph.set_minperiod(idx, mp);
        }

        info!(
            "scheduler: {} nodes, {} bars, mode={}, pregrow={}",
            graph.len(),
            len,
            config.mode,
            config.pregrow
        );
        Ok(Scheduler {
            graph,
            order,
            config,
            len,
            next_bar: 0,
            started: false,
            stopped: false,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn config(&self) -> RunConfig {
        self.config
    }

    /// Number of bars in the run.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Prepare buffers; in batch mode this is where all computation happens.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        match self.config.mode {
            RunMode::Incremental => {
                if self.config.pregrow {
                    self.graph.preallocate(self.len);
                }
            }
            RunMode::Batch => {
                self.graph.preallocate(self.len);
                for &idx in &self.order {
                    self.graph.once_node(idx, 0, self.len);
                }
                self.graph.home();
                debug!("batch evaluation of {} nodes done", self.order.len());
            }
        }
    }

    /// Move the whole graph to the next bar. Returns the bar index, or `None`
    /// once the run is exhausted or stopped.
    pub fn step(&mut self) -> Option<usize> {
        if !self.started {
            self.start();
        }
        if self.stopped || self.next_bar >= self.len {
            return None;
        }
        let bar = self.next_bar;
        match self.config.mode {
            RunMode::Incremental => {
                for &idx in &self.order {
                    self.graph.step_node(idx, bar);
                }
            }
            RunMode::Batch => self.graph.advance_all(),
        }
        self.next_bar += 1;
        Some(bar)
    }

    /// Drive every remaining bar.
    pub fn run_to_end(&mut self) {
        while self.step().is_some() {}
    }

    /// Tear down every node once, dependents first. Safe to call again.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut count = 0;
        for &idx in self.order.iter().rev() {
            if self.graph.stop_node(idx) {
                count += 1;
            }
        }
        debug!("stopped {count} nodes after {} bars", self.next_bar);
    }

    /// Stop a single node. Returns `false` if it was already stopped.
    pub fn stop_node(&mut self, node: crate::domain::line::NodeId) -> bool {
        self.graph.stop_node(node.index())
    }

    /// Rewind every buffer and node so the same graph can be driven again.
    pub fn rewind(&mut self) {
        self.graph.reset();
        self.next_bar = 0;
        self.started = false;
        self.stopped = false;
    }
}

/// Build, drive and stop a graph in one go.
pub fn evaluate(graph: Graph, config: RunConfig) -> Result<Graph, EngineError> {
    let mut scheduler = Scheduler::new(graph, config)?;
    scheduler.start();
    scheduler.run_to_end();
    scheduler.stop();
    Ok(scheduler.into_graph())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::GraphBuilder;
    use crate::domain::indicator::feed::DataFeed;
    use crate::domain::indicator::sma::Sma;
    use crate::domain::line::{NodeId, Schema};
    use crate::domain::node::{BarContext, Indicator, NodeState, RangeContext};
    use crate::domain::ohlcv::bars_from_closes;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every hook call into a shared log.
    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        lookback: usize,
    }

    impl Indicator for Probe {
        const SCHEMA: Schema = Schema {
            name: "probe",
            lines: &["value"],
            min_inputs: 1,
        };

        fn lookback(&self) -> usize {
            self.lookback
        }

        fn prenext(&mut self, ctx: &mut BarContext<'_>) {
            self.log
                .borrow_mut()
                .push(format!("{}:prenext:{}", self.name, ctx.bar()));
        }

        fn nextstart(&mut self, ctx: &mut BarContext<'_>) {
            self.log
                .borrow_mut()
                .push(format!("{}:nextstart:{}", self.name, ctx.bar()));
            let v = ctx.input(0, 0);
            ctx.set(0, v);
        }

        fn next(&mut self, ctx: &mut BarContext<'_>) {
            self.log
                .borrow_mut()
                .push(format!("{}:next:{}", self.name, ctx.bar()));
            let v = ctx.input(0, 0);
            ctx.set(0, v);
        }

        fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
            self.log
                .borrow_mut()
                .push(format!("{}:once:{start}..{end}", self.name));
            let src = ctx.input(0);
            for i in start.max(ctx.seed_bar())..end {
                ctx.line_mut(0).set_at(i, src[i]);
            }
        }

        fn stop(&mut self) {
            self.log.borrow_mut().push(format!("{}:stop", self.name));
        }
    }

    fn probe_graph(log: &Rc<RefCell<Vec<String>>>) -> (Graph, NodeId, NodeId) {
        let mut b = GraphBuilder::new();
        let data = b
            .add_feed(DataFeed::new("d", bars_from_closes(&[1.0, 2.0, 3.0, 4.0])))
            .unwrap();
        let first = b
            .add(
                Probe {
                    name: "a",
                    log: log.clone(),
                    lookback: 2,
                },
                &[data.into()],
            )
            .unwrap();
        let second = b
            .add(
                Probe {
                    name: "b",
                    log: log.clone(),
                    lookback: 1,
                },
                &[first.into()],
            )
            .unwrap();
        (b.build(), first, second)
    }

    #[test]
    fn run_mode_parse() {
        assert_eq!(RunMode::parse("batch"), Some(RunMode::Batch));
        assert_eq!(RunMode::parse(" Incremental "), Some(RunMode::Incremental));
        assert_eq!(RunMode::parse("once"), Some(RunMode::Batch));
        assert_eq!(RunMode::parse("fast"), None);
    }

    #[test]
    fn topological_order_puts_inputs_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (graph, first, second) = probe_graph(&log);
        let order = topological_order(&graph);
        let pos = |id: NodeId| order.iter().position(|&i| i == id.index()).unwrap();
        assert!(pos(first) < pos(second));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn incremental_hooks_follow_minperiod() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (graph, first, second) = probe_graph(&log);
        let mut s = Scheduler::new(graph, RunConfig::default()).unwrap();
        assert_eq!(s.graph().minperiod(first), 2);
        assert_eq!(s.graph().minperiod(second), 2);

        s.run_to_end();
        let calls = log.borrow().clone();
        assert_eq!(
            calls,
            vec![
                "a:prenext:0",
                "b:prenext:0",
                "a:nextstart:1",
                "b:nextstart:1",
                "a:next:2",
                "b:next:2",
                "a:next:3",
                "b:next:3",
            ]
        );
        assert_eq!(s.graph().state(second), NodeState::Steady);
    }

    #[test]
    fn batch_calls_once_per_node_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (graph, _, second) = probe_graph(&log);
        let config = RunConfig {
            mode: RunMode::Batch,
            pregrow: false,
        };
        let mut s = Scheduler::new(graph, config).unwrap();
        s.start();
        assert_eq!(*log.borrow(), vec!["a:once:0..4", "b:once:0..4"]);

        // Cursor walk only; no further hooks.
        s.run_to_end();
        assert_eq!(log.borrow().len(), 2);
        let out = s.graph().lines(second).alias();
        assert_eq!(out.get(0), 4.0);
        assert_eq!(out.get(-2), 2.0);
        assert!(out.at(0).is_nan());
    }

    #[test]
    fn stop_runs_in_reverse_order_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (graph, first, _) = probe_graph(&log);
        let mut s = Scheduler::new(graph, RunConfig::default()).unwrap();
        s.step();
        s.stop();
        s.stop();
        assert!(!s.stop_node(first));
        let stops: Vec<String> = log
            .borrow()
            .iter()
            .filter(|l| l.ends_with(":stop"))
            .cloned()
            .collect();
        assert_eq!(stops, vec!["b:stop", "a:stop"]);
        assert_eq!(s.graph().state(first), NodeState::Stopped);
    }

    #[test]
    fn step_after_stop_yields_nothing() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (graph, _, _) = probe_graph(&log);
        let mut s = Scheduler::new(graph, RunConfig::default()).unwrap();
        assert_eq!(s.step(), Some(0));
        s.stop();
        assert_eq!(s.step(), None);
    }

    #[test]
    fn graph_without_feeds_is_rejected() {
        let b = GraphBuilder::new();
        let err = Scheduler::new(b.build(), RunConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::NoFeeds));
    }

    #[test]
    fn rewind_allows_a_second_pass() {
        let mut b = GraphBuilder::new();
        let data = b
            .add_feed(DataFeed::new("d", bars_from_closes(&[1.0, 2.0, 3.0])))
            .unwrap();
        let sma = b.add(Sma::new(2).unwrap(), &[data.into()]).unwrap();
        let mut s = Scheduler::new(b.build(), RunConfig::default()).unwrap();
        s.run_to_end();
        let first: Vec<f64> = s.graph().lines(sma).alias().as_slice().to_vec();
        s.rewind();
        s.run_to_end();
        let second = s.graph().lines(sma).alias().as_slice();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[1..], second[1..]);
    }

    #[test]
    fn pregrow_sizes_buffers_up_front() {
        let mut b = GraphBuilder::new();
        let data = b
            .add_feed(DataFeed::new("d", bars_from_closes(&[1.0, 2.0, 3.0])))
            .unwrap();
        let config = RunConfig {
            mode: RunMode::Incremental,
            pregrow: true,
        };
        let mut s = Scheduler::new(b.build(), config).unwrap();
        s.step();
        assert_eq!(s.graph().lines(data).alias().buflen(), 3);
        assert_eq!(s.graph().lines(data).alias().len(), 1);
    }

    #[test]
    fn no_mode_reads_ahead_of_the_current_bar() {
        for config in RunConfig::all() {
            let mut b = GraphBuilder::new();
            let data = b
                .add_feed(DataFeed::new("d", bars_from_closes(&[1.0, 2.0, 3.0])))
                .unwrap();
            let mut s = Scheduler::new(b.build(), config).unwrap();
            s.step();
            let close = s.graph().line(data.into());
            assert_eq!(close.get(0), 1.0, "{config:?}");
            assert!(close.get(1).is_nan(), "{config:?}");
        }
    }
}
