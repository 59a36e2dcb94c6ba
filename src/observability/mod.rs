//! Observability for the orchestrator itself.
//!
//! - Structured logging with configurable formats (pretty, compact, JSON)
//! - Prometheus counters for cleanup, backup, alert and job activity

pub mod metrics;
mod tracing_init;

pub use tracing_init::*;
