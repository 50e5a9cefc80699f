//! Indicator library.
//!
//! Every indicator is a graph node implementing
//! [`Indicator`](crate::domain::node::Indicator):
//!
//! - [`feed::DataFeed`]: OHLCV bars replayed as lines
//! - [`sma::Sma`], [`ema::Ema`], [`stddev::StdDev`], [`bollinger::Bollinger`]
//! - [`nzd::NonZeroDifference`], [`cross::CrossOver`] and the
//!   [`cross::CrossUp`] / [`cross::CrossDown`] composites
//! - [`operation::Operation`] and [`operation::Delay`], behind the expression
//!   methods on `GraphBuilder`

pub mod bollinger;
pub mod cross;
pub mod ema;
pub mod feed;
pub mod nzd;
pub mod operation;
pub mod sma;
pub mod stddev;

pub use bollinger::Bollinger;
pub use cross::{CrossDown, CrossLines, CrossOver, CrossUp};
pub use ema::Ema;
pub use feed::DataFeed;
pub use nzd::NonZeroDifference;
pub use operation::{BinaryOp, Delay, Operand, Operation};
pub use sma::Sma;
pub use stddev::StdDev;
