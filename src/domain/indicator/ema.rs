//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first full window, then
//! EMA[i] = in[i]*k + EMA[i-1]*(1-k).

use crate::domain::error::EngineError;
use crate::domain::indicator::sma::mean;
use crate::domain::line::Schema;
use crate::domain::node::{BarContext, Indicator, RangeContext};

#[derive(Debug, Clone, Copy)]
pub struct Ema {
    period: usize,
    alpha: f64,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, EngineError> {
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                node: Self::SCHEMA.name,
                reason: "period must be at least 1".into(),
            });
        }
        Ok(Ema {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }

    #[inline]
    fn smooth(&self, value: f64, previous: f64) -> f64 {
        value * self.alpha + previous * (1.0 - self.alpha)
    }
}

impl Indicator for Ema {
    const SCHEMA: Schema = Schema {
        name: "ema",
        lines: &["ema"],
        min_inputs: 1,
    };

    fn lookback(&self) -> usize {
        self.period
    }

    fn nextstart(&mut self, ctx: &mut BarContext<'_>) {
        let seed = mean(ctx.inputs().line(0).window(self.period), self.period);
        ctx.set(0, seed);
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let value = self.smooth(ctx.input(0, 0), ctx.get(0, -1));
        ctx.set(0, value);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let src = ctx.inputs().line(0);
        let seed = ctx.seed_bar();
        let out = ctx.line_mut(0);
        for i in start.max(seed)..end {
            let value = if i == seed {
                mean(src.window_at(i, self.period), self.period)
            } else {
                self.smooth(src.at(i), out.at(i - 1))
            };
            out.set_at(i, value);
        }
    }
}
