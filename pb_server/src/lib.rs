//! HTTP surface of the pool-to-bracket engine.
//!
//! The binary in `main.rs` wires these modules to a PostgreSQL or in-memory
//! store; integration tests build the router directly.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
