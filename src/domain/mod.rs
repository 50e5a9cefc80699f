//! Core domain types and logic: the line engine, indicators, broker and
//! run orchestration.

pub mod ohlcv;
pub mod error;
pub mod line;
pub mod node;
pub mod graph;
pub mod scheduler;
pub mod equivalence;
pub mod indicator;
pub mod commission;
pub mod order;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod broker;
pub mod strategy;
pub mod metrics;
pub mod backtest;
pub mod config_validation;
