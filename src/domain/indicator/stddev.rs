//! Standard Deviation.
//!
//! Population standard deviation over n values:
//! STDDEV(n)[i] = sqrt(sum((in[i-j] - SMA(n)[i])^2 for j in 0..n) / n)

use crate::domain::error::EngineError;
use crate::domain::indicator::sma::mean;
use crate::domain::line::Schema;
use crate::domain::node::{BarContext, Indicator, RangeContext};

/// Mean and population standard deviation of a full window.
#[inline]
pub(crate) fn mean_stddev(window: &[f64], period: usize) -> (f64, f64) {
    let avg = mean(window, period);
    let variance = window
        .iter()
        .map(|x| {
            let diff = x - avg;
            diff * diff
        })
        .sum::<f64>()
        / period as f64;
    (avg, variance.sqrt())
}

#[derive(Debug, Clone, Copy)]
pub struct StdDev {
    period: usize,
}

impl StdDev {
    pub fn new(period: usize) -> Result<Self, EngineError> {
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                node: Self::SCHEMA.name,
                reason: "period must be at least 1".into(),
            });
        }
        Ok(StdDev { period })
    }
}

impl Indicator for StdDev {
    const SCHEMA: Schema = Schema {
        name: "stddev",
        lines: &["stddev"],
        min_inputs: 1,
    };

    fn lookback(&self) -> usize {
        self.period
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let (_, sd) = mean_stddev(ctx.inputs().line(0).window(self.period), self.period);
        ctx.set(0, sd);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let src = ctx.inputs().line(0);
        for i in start.max(ctx.seed_bar())..end {
            let (_, sd) = mean_stddev(src.window_at(i, self.period), self.period);
            ctx.line_mut(0).set_at(i, sd);
        }
    }
}
