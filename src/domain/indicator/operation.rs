//! Expression nodes: binary operations over lines or constants, and delays.
//!
//! These back the expression builder on `GraphBuilder` (`lt`, `and`,
//! `delay`, ...). An expression can be declared before any data exists and
//! is evaluated per bar through the same hooks as every other node.
//!
//! Comparisons and logic yield 1.0 or 0.0. A comparison with a NaN operand
//! is false; arithmetic propagates NaN.

use crate::domain::line::{LineRef, NodeId, Schema, is_nan};
use crate::domain::node::{BarContext, Indicator, RangeContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Line(LineRef),
    Const(f64),
}

impl From<LineRef> for Operand {
    fn from(r: LineRef) -> Self {
        Operand::Line(r)
    }
}

impl From<NodeId> for Operand {
    fn from(id: NodeId) -> Self {
        Operand::Line(id.into())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Const(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Ge,
    Lt,
    Le,
    And,
    Or,
}

#[inline]
fn truthy(x: f64) -> bool {
    x != 0.0 && !is_nan(x)
}

#[inline]
fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Gt => flag(a > b),
            BinaryOp::Ge => flag(a >= b),
            BinaryOp::Lt => flag(a < b),
            BinaryOp::Le => flag(a <= b),
            BinaryOp::And => flag(truthy(a) && truthy(b)),
            BinaryOp::Or => flag(truthy(a) || truthy(b)),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Arg {
    Input(usize),
    Const(f64),
}

pub struct Operation {
    op: BinaryOp,
    lhs: Arg,
    rhs: Arg,
}

impl Operation {
    /// Split operands into the node and the line inputs it reads.
    pub fn bind(op: BinaryOp, lhs: Operand, rhs: Operand) -> (Self, Vec<LineRef>) {
        let mut inputs = Vec::with_capacity(2);
        let mut arg = |operand: Operand| match operand {
            Operand::Line(r) => {
                inputs.push(r);
                Arg::Input(inputs.len() - 1)
            }
            Operand::Const(v) => Arg::Const(v),
        };
        let lhs = arg(lhs);
        let rhs = arg(rhs);
        (Operation { op, lhs, rhs }, inputs)
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl Indicator for Operation {
    const SCHEMA: Schema = Schema {
        name: "operation",
        lines: &["value"],
        min_inputs: 0,
    };

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let value = |arg: Arg| match arg {
            Arg::Input(k) => ctx.input(k, 0),
            Arg::Const(v) => v,
        };
        let out = self.op.apply(value(self.lhs), value(self.rhs));
        ctx.set(0, out);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let inputs = ctx.inputs();
        let value = |arg: Arg, i: usize| match arg {
            Arg::Input(k) => inputs.line(k).at(i),
            Arg::Const(v) => v,
        };
        for i in start.max(ctx.seed_bar())..end {
            let out = self.op.apply(value(self.lhs, i), value(self.rhs, i));
            ctx.line_mut(0).set_at(i, out);
        }
    }
}

/// `out[i] = in[i - bars]`.
pub struct Delay {
    bars: usize,
}

impl Delay {
    pub fn new(bars: usize) -> Self {
        Delay { bars }
    }
}

impl Indicator for Delay {
    const SCHEMA: Schema = Schema {
        name: "delay",
        lines: &["value"],
        min_inputs: 1,
    };

    fn lookback(&self) -> usize {
        self.bars + 1
    }

    fn next(&mut self, ctx: &mut BarContext<'_>) {
        let v = ctx.input(0, -(self.bars as isize));
        ctx.set(0, v);
    }

    fn once(&mut self, ctx: &mut RangeContext<'_>, start: usize, end: usize) {
        let src = ctx.input(0);
        for i in start.max(ctx.seed_bar())..end {
            ctx.line_mut(0).set_at(i, src[i - self.bars]);
        }
    }
}
