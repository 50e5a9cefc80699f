//! Simple Moving Average.
//!
//! SMA(n)[i] = sum(in[i-n+1..=i]) / n. Both evaluation paths sum the same
//! window oldest first, so they agree to the bit.

use crate::domain::error::EngineError;
use crate::domain::line::Schema;
use crate::domain::node::{BarContext, Indicator, RangeContext};

/// Arithmetic mean over a full window of `period` values.
#[inline]
pub(crate) fn mean(window: &[f64], period: usize) -> f64 {
    window.iter().sum::<f64>() / period as f64
}

#[derive(Debug, Clone, Copy)]
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, EngineError> {
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                node: Self::SCHEMA.name,
                reason: "period must be at least 1".into(),
            });
        }
        Ok(Sma { period })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    const SCHEMA: Schema = Schema {
        name: "sma",
        lines: &["sma"],
        min_inputs: 1,
    };

    fn lookback(&self) -> usize {
        self.period
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let value = mean(ctx.inputs().line(0).window(self.period), self.period);
        ctx.set(0, value);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let src = ctx.inputs().line(0);
        for i in start.max(ctx.seed_bar())..end {
            let value = mean(src.window_at(i, self.period), self.period);
            ctx.line_mut(0).set_at(i, value);
        }
    }
}
