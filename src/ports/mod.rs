//! Port traits the domain talks to; implemented in `adapters`.

pub mod config_port;
pub mod data_port;
