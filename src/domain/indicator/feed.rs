//! Data feed node: replays OHLCV bars into lines.
//!
//! Close comes first so the feed can be used wherever a single series is
//! expected.

use chrono::NaiveDate;

use crate::domain::line::Schema;
use crate::domain::node::{BarContext, Indicator, RangeContext};
use crate::domain::ohlcv::{OhlcvBar, bars_from_closes};

pub struct DataFeed {
    name: String,
    bars: Vec<OhlcvBar>,
}

impl DataFeed {
    pub const CLOSE: usize = 0;
    pub const OPEN: usize = 1;
    pub const HIGH: usize = 2;
    pub const LOW: usize = 3;
    pub const VOLUME: usize = 4;

    pub fn new(name: &str, bars: Vec<OhlcvBar>) -> Self {
        DataFeed {
            name: name.to_string(),
            bars,
        }
    }

    /// Feed a bare series as flat bars.
    pub fn from_closes(name: &str, closes: &[f64]) -> Self {
        Self::new(name, bars_from_closes(closes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    fn fields(bar: &OhlcvBar) -> [f64; 5] {
        [bar.close, bar.open, bar.high, bar.low, bar.volume]
    }
}

impl Indicator for DataFeed {
    const SCHEMA: Schema = Schema {
        name: "feed",
        lines: &["close", "open", "high", "low", "volume"],
        min_inputs: 0,
    };

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        if let Some(bar) = self.bars.get(ctx.bar()) {
            for (line, value) in Self::fields(bar).into_iter().enumerate() {
                ctx.set(line, value);
            }
        }
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        for i in start..end.min(self.bars.len()) {
            for (line, value) in Self::fields(&self.bars[i]).into_iter().enumerate() {
                ctx.line_mut(line).set_at(i, value);
            }
        }
    }
}
