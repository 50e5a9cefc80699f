//! Computation nodes and their dual-mode evaluation hooks.
//!
//! Every node type implements [`Indicator`]: a static [`Schema`], a lookback,
//! the incremental hooks (`prenext`, `nextstart`, `next`) and the batch hook
//! `once`. The two paths must produce the same values bar for bar; the
//! property tests in each indicator module check this.
//!
//! Per bar in incremental mode the scheduler calls exactly one hook:
//!
//! - `prenext` while fewer than `minperiod` bars have been seen,
//! - `nextstart` once, on the bar where the count reaches `minperiod`,
//! - `next` on every later bar.
//!
//! In batch mode `once(start, end)` is called a single time and must lay down
//! the same sequence, seed bar included.

use crate::domain::line::{LineBuffer, LineRef, Lines, Schema};

/// Lifecycle of a node inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Uninitialized,
    Warmup,
    Seed,
    Steady,
    Stopped,
}

impl NodeState {
    /// State after `bar_count` bars have been fed to a node with the given
    /// minperiod.
    pub fn for_bar_count(bar_count: usize, minperiod: usize) -> Self {
        use std::cmp::Ordering;
        if bar_count == 0 {
            return NodeState::Uninitialized;
        }
        match bar_count.cmp(&minperiod) {
            Ordering::Less => NodeState::Warmup,
            Ordering::Equal => NodeState::Seed,
            Ordering::Greater => NodeState::Steady,
        }
    }
}

/// Read-only view of a node's inputs.
#[derive(Clone, Copy)]
pub struct Inputs<'a> {
    store: &'a [Lines],
    refs: &'a [LineRef],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(store: &'a [Lines], refs: &'a [LineRef]) -> Self {
        Inputs { store, refs }
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The `k`-th input line.
    #[inline]
    pub fn line(&self, k: usize) -> &'a LineBuffer {
        let r = self.refs[k];
        self.store[r.node.0].line(r.line)
    }
}

/// What a node sees during one incremental step.
pub struct BarContext<'a> {
    inputs: Inputs<'a>,
    lines: &'a mut Lines,
    bar: usize,
    minperiod: usize,
}

impl<'a> BarContext<'a> {
    pub(crate) fn new(
        inputs: Inputs<'a>,
        lines: &'a mut Lines,
        bar: usize,
        minperiod: usize,
    ) -> Self {
        BarContext {
            inputs,
            lines,
            bar,
            minperiod,
        }
    }

    /// Absolute index of the current bar.
    pub fn bar(&self) -> usize {
        self.bar
    }

    pub fn minperiod(&self) -> usize {
        self.minperiod
    }

    pub fn inputs(&self) -> Inputs<'a> {
        self.inputs
    }

    /// Value of input `k`, `ago` bars back.
    #[inline]
    pub fn input(&self, k: usize, ago: isize) -> f64 {
        self.inputs.line(k).get(ago)
    }

    /// Value of own line `line`, `ago` bars back.
    #[inline]
    pub fn get(&self, line: usize, ago: isize) -> f64 {
        self.lines.line(line).get(ago)
    }

    /// Write own line `line` at the current bar.
    #[inline]
    pub fn set(&mut self, line: usize, value: f64) {
        self.lines.line_mut(line).set(0, value);
    }

    pub fn lines(&self) -> &Lines {
        self.lines
    }
}

/// What a node sees during its single batch call.
pub struct RangeContext<'a> {
    inputs: Inputs<'a>,
    lines: &'a mut Lines,
    minperiod: usize,
}

impl<'a> RangeContext<'a> {
    pub(crate) fn new(inputs: Inputs<'a>, lines: &'a mut Lines, minperiod: usize) -> Self {
        RangeContext {
            inputs,
            lines,
            minperiod,
        }
    }

    pub fn minperiod(&self) -> usize {
        self.minperiod
    }

    /// Index of the seed bar.
    pub fn seed_bar(&self) -> usize {
        self.minperiod.saturating_sub(1)
    }

    pub fn inputs(&self) -> Inputs<'a> {
        self.inputs
    }

    /// Full array of input `k`.
    #[inline]
    pub fn input(&self, k: usize) -> &'a [f64] {
        self.inputs.line(k).as_slice()
    }

    pub fn line(&self, line: usize) -> &LineBuffer {
        self.lines.line(line)
    }

    pub fn line_mut(&mut self, line: usize) -> &mut LineBuffer {
        self.lines.line_mut(line)
    }
}

/// A node type in the computation graph.
pub trait Indicator: 'static {
    const SCHEMA: Schema;

    /// Bars of history this node needs on top of its inputs' minperiod.
    fn lookback(&self) -> usize {
        1
    }

    fn prenext(&mut self, _ctx: &mut BarContext<'_>) {}

    fn nextstart(&mut self, ctx: &mut BarContext<'_>) {
        self.next(ctx);
    }

    fn next(&mut self, ctx: &mut BarContext<'_>);

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize);

    fn stop(&mut self) {}
}

/// Object-safe face of [`Indicator`], stored by the graph.
pub(crate) trait DynNode {
    fn lookback(&self) -> usize;
    fn prenext(&mut self, ctx: &mut BarContext<'_>);
    fn nextstart(&mut self, ctx: &mut BarContext<'_>);
    fn next(&mut self, ctx: &mut BarContext<'_>);
    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize);
    fn stop(&mut self);
}

impl<T: Indicator> DynNode for T {
    fn lookback(&self) -> usize {
        Indicator::lookback(self)
    }

    fn prenext(&mut self, ctx: &mut BarContext<'_>) {
        Indicator::prenext(self, ctx)
    }

    fn nextstart(&mut self, ctx: &mut BarContext<'_>) {
        Indicator::nextstart(self, ctx)
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        Indicator::next(self, ctx)
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        Indicator::once(self, ctx, start, end)
    }

    fn stop(&mut self) {
        Indicator::stop(self)
    }
}

/// `minperiod = max(input minperiods) + lookback - 1`; a node without inputs
/// has `minperiod = lookback`.
pub fn combine_minperiod(
    input_minperiods: impl IntoIterator<Item = usize>,
    lookback: usize,
) -> usize {
    let base = input_minperiods.into_iter().max().unwrap_or(1);
    base + lookback - 1
}
