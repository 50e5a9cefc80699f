//! Line buffers and the per-node `Lines` container.
//!
//! A [`LineBuffer`] is one time series of `f64` samples with a cursor on the
//! current bar. Reads are relative to the cursor (`ago <= 0`); anything
//! before the start of history reads as NaN.
//!
//! A [`Lines`] container holds the buffers a node owns, in the order given by
//! the node type's static [`Schema`]. Line 0 is the node's default output.

/// NaN test by self-inequality.
#[inline]
#[allow(clippy::eq_op)]
pub fn is_nan(x: f64) -> bool {
    x != x
}

/// Static description of a node type: its name, the ordered names of the
/// lines it owns, and the minimum number of inputs it must be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub lines: &'static [&'static str],
    pub min_inputs: usize,
}

impl Schema {
    pub fn line_index(&self, name: &str) -> Option<usize> {
        self.lines.iter().position(|l| *l == name)
    }
}

/// Handle to a node in a graph. Only handed out by the graph builder once the
/// node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn line(self, line: usize) -> LineRef {
        LineRef { node: self, line }
    }
}

/// Read-only reference to one line of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRef {
    pub node: NodeId,
    pub line: usize,
}

impl From<NodeId> for LineRef {
    fn from(node: NodeId) -> Self {
        node.line(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineBuffer {
    data: Vec<f64>,
    // Position of the current bar; -1 before the first advance.
    idx: isize,
    pregrown: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        LineBuffer {
            data: Vec::new(),
            idx: -1,
            pregrown: false,
        }
    }

    /// Value `ago` bars back from the cursor (0 = current bar, -1 the one
    /// before). Bars after the cursor read NaN even when a batch pass has
    /// already filled them.
    #[inline]
    pub fn get(&self, ago: isize) -> f64 {
        let pos = self.idx + ago;
        if ago > 0 || pos < 0 {
            return f64::NAN;
        }
        self.data.get(pos as usize).copied().unwrap_or(f64::NAN)
    }

    /// Write `value` `ago` bars back from the cursor. Writes ahead of the
    /// cursor or outside the buffer are dropped.
    #[inline]
    pub fn set(&mut self, ago: isize, value: f64) {
        let pos = self.idx + ago;
        if ago > 0 || pos < 0 {
            return;
        }
        if let Some(slot) = self.data.get_mut(pos as usize) {
            *slot = value;
        }
    }

    /// Move to the next bar. Under incremental growth a NaN slot is appended;
    /// a pre-grown buffer only moves its cursor.
    #[inline]
    pub fn advance(&mut self) {
        self.idx += 1;
        if self.idx as usize >= self.data.len() {
            self.data.push(f64::NAN);
        }
    }

    /// Size the buffer for a whole run up front. Every slot reads NaN until
    /// written and the cursor is rewound.
    pub fn preallocate(&mut self, len: usize) {
        self.data.clear();
        self.data.resize(len, f64::NAN);
        self.idx = -1;
        self.pregrown = true;
    }

    /// Rewind the cursor and discard all values. A pre-grown buffer keeps its
    /// length.
    pub fn reset(&mut self) {
        if self.pregrown {
            self.data.fill(f64::NAN);
        } else {
            self.data.clear();
        }
        self.idx = -1;
    }

    /// Rewind the cursor without touching values.
    pub fn home(&mut self) {
        self.idx = -1;
    }

    /// Absolute position of the cursor, `None` before the first advance.
    pub fn cursor(&self) -> Option<usize> {
        usize::try_from(self.idx).ok()
    }

    /// Number of bars the cursor has passed, including the current one.
    pub fn len(&self) -> usize {
        (self.idx + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.idx < 0
    }

    /// Number of allocated slots.
    pub fn buflen(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn at(&self, i: usize) -> f64 {
        self.data.get(i).copied().unwrap_or(f64::NAN)
    }

    #[inline]
    pub fn set_at(&mut self, i: usize, value: f64) {
        if let Some(slot) = self.data.get_mut(i) {
            *slot = value;
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The last `period` values ending at the cursor, or fewer if history is
    /// shorter.
    pub fn window(&self, period: usize) -> &[f64] {
        let end = self.len().min(self.data.len());
        &self.data[end.saturating_sub(period)..end]
    }

    /// The `period` values ending at absolute position `i`, or fewer near the
    /// start.
    pub fn window_at(&self, i: usize, period: usize) -> &[f64] {
        let end = (i + 1).min(self.data.len());
        &self.data[(i + 1).saturating_sub(period).min(end)..end]
    }
}

/// Ordered, fixed collection of the line buffers one node owns.
#[derive(Debug, Clone, Default)]
pub struct Lines {
    names: &'static [&'static str],
    buffers: Vec<LineBuffer>,
}

impl Lines {
    pub fn new(names: &'static [&'static str]) -> Self {
        Lines {
            names,
            buffers: names.iter().map(|_| LineBuffer::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }

    /// Line 0 under the node's natural name.
    pub fn alias(&self) -> &LineBuffer {
        &self.buffers[0]
    }

    pub fn line(&self, i: usize) -> &LineBuffer {
        &self.buffers[i]
    }

    pub fn line_mut(&mut self, i: usize) -> &mut LineBuffer {
        &mut self.buffers[i]
    }

    pub fn get(&self, i: usize) -> Option<&LineBuffer> {
        self.buffers.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &LineBuffer)> {
        self.names.iter().copied().zip(self.buffers.iter())
    }

    pub(crate) fn advance(&mut self) {
        for b in &mut self.buffers {
            b.advance();
        }
    }

    pub(crate) fn preallocate(&mut self, len: usize) {
        for b in &mut self.buffers {
            b.preallocate(len);
        }
    }

    pub(crate) fn home(&mut self) {
        for b in &mut self.buffers {
            b.home();
        }
    }

    pub(crate) fn reset(&mut self) {
        for b in &mut self.buffers {
            b.reset();
        }
    }
}
