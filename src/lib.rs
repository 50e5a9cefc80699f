//! linetrader: a line-based indicator engine with a bar-driven backtester.
//!
//! Hexagonal architecture: the engine, broker and strategies live in
//! [`domain`], port traits in [`ports`], concrete implementations in
//! [`adapters`]. [`cli`] wires them into the `linetrader` binary.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
