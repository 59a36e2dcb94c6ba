//! Log retention, backup and alerting orchestrator.
//!
//! The crate keeps a service's log directory bounded and durable:
//!
//! - [`retention`] deletes log files older than their category's retention period
//! - [`backup`] mirrors dated log files to object storage with retry and skip-existing uploads
//! - [`health`] aggregates statistics and evaluates them against thresholds
//! - [`alerts`] fans out rate-limited alerts to webhook, email and audit channels
//! - [`jobs`] drives all of the above from cron schedules

pub mod alerts;
pub mod backup;
pub mod config;
pub mod health;
pub mod jobs;
pub mod logs;
pub mod observability;
pub mod retention;
pub mod retry;
pub mod storage;
pub mod validation;

pub use config::{ConfigError, MaintenanceConfig};
