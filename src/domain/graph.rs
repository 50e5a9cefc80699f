//! The node graph: construction, expression building and per-node storage.
//!
//! Nodes are added through [`GraphBuilder`], which hands back a [`NodeId`]
//! only after the node exists. Inputs can therefore only point at nodes that
//! were added earlier, so the graph is acyclic by construction.
//!
//! Output lines live in one `Vec<Lines>` indexed by node. While a node is
//! evaluated its own `Lines` are taken out of that vector, which lets the node
//! write its outputs while reading every other node's lines.

use chrono::NaiveDate;
use log::debug;

use crate::domain::error::EngineError;
use crate::domain::indicator::feed::DataFeed;
use crate::domain::indicator::operation::{BinaryOp, Delay, Operand, Operation};
use crate::domain::line::{LineBuffer, LineRef, Lines, NodeId};
use crate::domain::node::{
    BarContext, DynNode, Indicator, Inputs, NodeState, RangeContext, combine_minperiod,
};

pub(crate) struct Slot {
    pub(crate) node: Box<dyn DynNode>,
    pub(crate) label: String,
    pub(crate) inputs: Vec<LineRef>,
    pub(crate) minperiod: usize,
    pub(crate) state: NodeState,
    pub(crate) bar_count: usize,
}

#[derive(Default)]
pub struct GraphBuilder {
    slots: Vec<Slot>,
    lines: Vec<Lines>,
    feeds: Vec<NodeId>,
    timeline: Vec<NaiveDate>,
    feed_lengths: Vec<usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node reading `inputs`. Fails if fewer inputs than the node type
    /// requires are given or an input does not name an existing line.
    pub fn add<T: Indicator>(
        &mut self,
        node: T,
        inputs: &[LineRef],
    ) -> Result<NodeId, EngineError> {
        let schema = T::SCHEMA;
        if inputs.len() < schema.min_inputs {
            return Err(EngineError::TooFewInputs {
                node: schema.name,
                expected: schema.min_inputs,
                got: inputs.len(),
            });
        }
        for (k, input) in inputs.iter().enumerate() {
            let valid = self
                .lines
                .get(input.node.0)
                .is_some_and(|lines| input.line < lines.len());
            if !valid {
                return Err(EngineError::UnknownInput {
                    node: schema.name,
                    input: k,
                });
            }
        }
        let lookback = node.lookback();
        if lookback == 0 {
            return Err(EngineError::InvalidPeriod {
                node: schema.name,
                reason: "lookback must be at least 1".into(),
            });
        }
        let minperiod = combine_minperiod(
            inputs.iter().map(|r| self.slots[r.node.0].minperiod),
            lookback,
        );

        let id = NodeId(self.slots.len());
        debug!(
            "node {} = {} inputs={} minperiod={}",
            id.0,
            schema.name,
            inputs.len(),
            minperiod
        );
        self.slots.push(Slot {
            node: Box::new(node),
            label: schema.name.to_string(),
            inputs: inputs.to_vec(),
            minperiod,
            state: NodeState::Uninitialized,
            bar_count: 0,
        });
        self.lines.push(Lines::new(schema.lines));
        Ok(id)
    }

    /// Add a data feed. The first feed's dates become the run's timeline and
    /// every later feed must carry exactly the same dates.
    pub fn add_feed(&mut self, feed: DataFeed) -> Result<NodeId, EngineError> {
        let len = feed.len();
        if let Some(&expected) = self.feed_lengths.first() {
            if expected != len {
                return Err(EngineError::FeedMisaligned {
                    feed: self.feeds.len(),
                    expected,
                    got: len,
                });
            }
        }
        let dates = feed.dates();
        if self.feeds.is_empty() {
            self.timeline = dates;
        } else if let Some(bar) = self
            .timeline
            .iter()
            .zip(&dates)
            .position(|(a, b)| a != b)
        {
            return Err(EngineError::FeedDatesMismatch {
                feed: self.feeds.len(),
                bar,
                expected: self.timeline[bar],
                got: dates[bar],
            });
        }
        let name = feed.name().to_string();
        let id = self.add(feed, &[])?;
        self.label(id, &name);
        self.feeds.push(id);
        self.feed_lengths.push(len);
        Ok(id)
    }

    /// Rename a node; used by composite builders so their output node reads
    /// by what it means.
    pub fn label(&mut self, node: NodeId, label: &str) {
        if let Some(slot) = self.slots.get_mut(node.0) {
            slot.label = label.to_string();
        }
    }

    pub fn minperiod(&self, node: NodeId) -> usize {
        self.slots[node.0].minperiod
    }

    pub fn feeds(&self) -> &[NodeId] {
        &self.feeds
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Resolve a line by name once, at build time.
    pub fn line_named(&self, node: NodeId, name: &str) -> Result<LineRef, EngineError> {
        let lines = &self.lines[node.0];
        lines
            .index_of(name)
            .map(|i| node.line(i))
            .ok_or_else(|| EngineError::UnknownLine {
                node: self.slots[node.0].label.clone(),
                line: name.to_string(),
            })
    }

    /// Binary expression over two operands, evaluated per bar like any other
    /// node.
    pub fn op(
        &mut self,
        op: BinaryOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        let (node, inputs) = Operation::bind(op, lhs.into(), rhs.into());
        let id = self.add(node, &inputs)?;
        self.label(id, op.symbol());
        Ok(id.into())
    }

    pub fn add_lines(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Add, a, b)
    }

    pub fn sub(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Sub, a, b)
    }

    pub fn mul(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Mul, a, b)
    }

    pub fn div(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Div, a, b)
    }

    pub fn gt(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Gt, a, b)
    }

    pub fn ge(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Ge, a, b)
    }

    pub fn lt(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Lt, a, b)
    }

    pub fn le(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Le, a, b)
    }

    pub fn and(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::And, a, b)
    }

    pub fn or(
        &mut self,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<LineRef, EngineError> {
        self.op(BinaryOp::Or, a, b)
    }

    /// `src` as it was `bars` bars ago.
    pub fn delay(&mut self, src: impl Into<LineRef>, bars: usize) -> Result<LineRef, EngineError> {
        let id = self.add(Delay::new(bars), &[src.into()])?;
        Ok(id.into())
    }

    pub fn build(self) -> Graph {
        Graph {
            slots: self.slots,
            lines: self.lines,
            feeds: self.feeds,
            timeline: self.timeline,
        }
    }
}

/// A built graph. Evaluation is driven by the scheduler.
pub struct Graph {
    slots: Vec<Slot>,
    lines: Vec<Lines>,
    feeds: Vec<NodeId>,
    timeline: Vec<NaiveDate>,
}

impl Graph {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn feeds(&self) -> &[NodeId] {
        &self.feeds
    }

    /// Dates of the run, one per bar.
    pub fn timeline(&self) -> &[NaiveDate] {
        &self.timeline
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.slots.len()).map(NodeId)
    }

    pub fn label(&self, node: NodeId) -> &str {
        &self.slots[node.0].label
    }

    pub fn minperiod(&self, node: NodeId) -> usize {
        self.slots[node.0].minperiod
    }

    pub fn state(&self, node: NodeId) -> NodeState {
        self.slots[node.0].state
    }

    pub fn inputs(&self, node: NodeId) -> &[LineRef] {
        &self.slots[node.0].inputs
    }

    pub fn lines(&self, node: NodeId) -> &Lines {
        &self.lines[node.0]
    }

    pub fn line(&self, r: LineRef) -> &LineBuffer {
        self.lines[r.node.0].line(r.line)
    }

    /// Largest minperiod in the graph.
    pub fn max_minperiod(&self) -> usize {
        self.slots.iter().map(|s| s.minperiod).max().unwrap_or(1)
    }

    pub(crate) fn set_minperiod(&mut self, idx: usize, minperiod: usize) {
        self.slots[idx].minperiod = minperiod;
    }

    pub(crate) fn lookback(&self, idx: usize) -> usize {
        self.slots[idx].node.lookback()
    }

    pub(crate) fn preallocate(&mut self, len: usize) {
        for lines in &mut self.lines {
            lines.preallocate(len);
        }
    }

    pub(crate) fn reset(&mut self) {
        for lines in &mut self.lines {
            lines.reset();
        }
        for slot in &mut self.slots {
            slot.state = NodeState::Uninitialized;
            slot.bar_count = 0;
        }
    }

    /// Move every buffer's cursor back before the first bar, keeping values.
    pub(crate) fn home(&mut self) {
        for lines in &mut self.lines {
            lines.home();
        }
    }

    /// Move every buffer's cursor to the next bar without computing anything.
    pub(crate) fn advance_all(&mut self) {
        for lines in &mut self.lines {
            lines.advance();
        }
    }

    /// Advance node `idx` by one bar and run the hook its bar count calls for.
    pub(crate) fn step_node(&mut self, idx: usize, bar: usize) {
        let mut own = std::mem::take(&mut self.lines[idx]);
        own.advance();

        let slot = &mut self.slots[idx];
        slot.bar_count += 1;
        slot.state = NodeState::for_bar_count(slot.bar_count, slot.minperiod);
        {
            let inputs = Inputs::new(&self.lines, &slot.inputs);
            let mut ctx = BarContext::new(inputs, &mut own, bar, slot.minperiod);
            match slot.state {
                NodeState::Warmup => slot.node.prenext(&mut ctx),
                NodeState::Seed => slot.node.nextstart(&mut ctx),
                NodeState::Steady => slot.node.next(&mut ctx),
                NodeState::Uninitialized | NodeState::Stopped => {}
            }
        }
        self.lines[idx] = own;
    }

    /// Fill node `idx` over `start..end` in one call.
    pub(crate) fn once_node(&mut self, idx: usize, start: usize, end: usize) {
        let mut own = std::mem::take(&mut self.lines[idx]);
        let slot = &mut self.slots[idx];
        {
            let inputs = Inputs::new(&self.lines, &slot.inputs);
            let mut ctx = RangeContext::new(inputs, &mut own, slot.minperiod);
            slot.node.once(&mut ctx, start, end);
        }
        slot.bar_count = end;
        slot.state = NodeState::for_bar_count(end, slot.minperiod);
        self.lines[idx] = own;
    }

    /// Stop node `idx`. Returns `false` if it was already stopped.
    pub(crate) fn stop_node(&mut self, idx: usize) -> bool {
        let slot = &mut self.slots[idx];
        if slot.state == NodeState::Stopped {
            return false;
        }
        slot.node.stop();
        slot.state = NodeState::Stopped;
        true
    }
}
