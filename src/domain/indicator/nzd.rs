//! Sticky difference between two series.
//!
//! `out[i] = in0[i] - in1[i]` when that is nonzero, otherwise `out[i-1]`, so
//! runs of exact equality keep the sign of the last real difference. The
//! seed bar takes the raw difference whatever its value.

use crate::domain::line::Schema;
use crate::domain::node::{BarContext, Indicator, RangeContext};

#[derive(Debug, Default)]
pub struct NonZeroDifference;

impl NonZeroDifference {
    pub fn new() -> Self {
        NonZeroDifference
    }
}

#[inline]
fn sticky(diff: f64, previous: f64) -> f64 {
    if diff != 0.0 { diff } else { previous }
}

impl Indicator for NonZeroDifference {
    const SCHEMA: Schema = Schema {
        name: "nzd",
        lines: &["nzd"],
        min_inputs: 2,
    };

    fn nextstart(&mut self, ctx: &mut BarContext<'_>) {
        let diff = ctx.input(0, 0) - ctx.input(1, 0);
        ctx.set(0, diff);
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let diff = ctx.input(0, 0) - ctx.input(1, 0);
        let out = sticky(diff, ctx.get(0, -1));
        ctx.set(0, out);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let (a, b) = (ctx.input(0), ctx.input(1));
        let seed = ctx.seed_bar();
        let out = ctx.line_mut(0);
        for i in start.max(seed)..end {
            let diff = a[i] - b[i];
            let value = if i == seed {
                diff
            } else {
                sticky(diff, out.at(i - 1))
            };
            out.set_at(i, value);
        }
    }
}
