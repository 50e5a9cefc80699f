//! Fill simulation: the bar price model for each execution type.
//!
//! - `Market` fills at the open, `Close` at the close of the bar it is
//!   matched on (the bar after submission).
//! - `Limit(p)`: a buy fills if `low <= p` at `min(open, p)`; a sell fills if
//!   `high >= p` at `max(open, p)`.
//! - `Stop(p)`: a buy triggers if `high >= p` at `max(open, p)`; a sell
//!   triggers if `low <= p` at `min(open, p)`.
//!
//! A bar with any NaN price never matches.

use crate::domain::indicator::feed::DataFeed;
use crate::domain::line::{Lines, is_nan};
use crate::domain::order::{ExecType, Side};

/// OHLC of one feed at the current bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarPrices {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl BarPrices {
    /// Read the current bar from a feed's lines.
    pub fn from_feed(lines: &Lines) -> Self {
        BarPrices {
            open: lines.line(DataFeed::OPEN).get(0),
            high: lines.line(DataFeed::HIGH).get(0),
            low: lines.line(DataFeed::LOW).get(0),
            close: lines.line(DataFeed::CLOSE).get(0),
        }
    }

    pub fn is_complete(&self) -> bool {
        !(is_nan(self.open) || is_nan(self.high) || is_nan(self.low) || is_nan(self.close))
    }
}

/// Price used for the funds check when an order is accepted.
pub fn estimate_price(exec: ExecType, bar: &BarPrices) -> f64 {
    match exec {
        ExecType::Market => bar.open,
        ExecType::Close => bar.close,
        ExecType::Limit(p) | ExecType::Stop(p) => p,
    }
}

/// Fill price on this bar, or `None` if the order does not match.
pub fn match_price(side: Side, exec: ExecType, bar: &BarPrices) -> Option<f64> {
    if !bar.is_complete() {
        return None;
    }
    match (exec, side) {
        (ExecType::Market, _) => Some(bar.open),
        (ExecType::Close, _) => Some(bar.close),
        (ExecType::Limit(p), Side::Buy) => (bar.low <= p).then(|| bar.open.min(p)),
        (ExecType::Limit(p), Side::Sell) => (bar.high >= p).then(|| bar.open.max(p)),
        (ExecType::Stop(p), Side::Buy) => (bar.high >= p).then(|| bar.open.max(p)),
        (ExecType::Stop(p), Side::Sell) => (bar.low <= p).then(|| bar.open.min(p)),
    }
}
