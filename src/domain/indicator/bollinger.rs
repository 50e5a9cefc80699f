//! Bollinger Bands.
//!
//! - mid: SMA over n periods
//! - top: mid + devfactor * StdDev
//! - bot: mid - devfactor * StdDev
//!
//! StdDev is the population standard deviation (divides by N, not N-1).

use crate::domain::error::EngineError;
use crate::domain::indicator::stddev::mean_stddev;
use crate::domain::line::Schema;
use crate::domain::node::{BarContext, Indicator, RangeContext};

#[derive(Debug, Clone, Copy)]
pub struct Bollinger {
    period: usize,
    devfactor: f64,
}

impl Bollinger {
    pub const MID: usize = 0;
    pub const TOP: usize = 1;
    pub const BOT: usize = 2;

    pub fn new(period: usize, devfactor: f64) -> Result<Self, EngineError> {
        if period == 0 {
            return Err(EngineError::InvalidPeriod {
                node: Self::SCHEMA.name,
                reason: "period must be at least 1".into(),
            });
        }
        if !devfactor.is_finite() || devfactor < 0.0 {
            return Err(EngineError::InvalidPeriod {
                node: Self::SCHEMA.name,
                reason: format!("devfactor must be a non-negative number, got {devfactor}"),
            });
        }
        Ok(Bollinger { period, devfactor })
    }

    #[inline]
    fn bands(&self, window: &[f64]) -> [f64; 3] {
        let (mid, sd) = mean_stddev(window, self.period);
        [mid, mid + self.devfactor * sd, mid - self.devfactor * sd]
    }
}

impl Indicator for Bollinger {
    const SCHEMA: Schema = Schema {
        name: "bollinger",
        lines: &["mid", "top", "bot"],
        min_inputs: 1,
    };

    fn lookback(&self) -> usize {
        self.period
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let bands = self.bands(ctx.inputs().line(0).window(self.period));
        for (line, value) in bands.into_iter().enumerate() {
            ctx.set(line, value);
        }
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let src = ctx.inputs().line(0);
        for i in start.max(ctx.seed_bar())..end {
            let bands = self.bands(src.window_at(i, self.period));
            for (line, value) in bands.into_iter().enumerate() {
                ctx.line_mut(line).set_at(i, value);
            }
        }
    }
}
