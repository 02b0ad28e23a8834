//! qgstats - job queue statistics for Mackerel.
//!
//! Reads per-(queue, job class) statistics from a `qg`/`que` job queue stored
//! in PostgreSQL, aggregates them and reports four metrics through the
//! Mackerel agent plugin protocol.
//!
//! The library is shared between:
//! - `mackerel-plugin-qg` - the plugin binary invoked by mackerel-agent
//! - integration tests running against a live database

pub mod aggregate;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod plugin;
pub mod reporter;
pub mod source;

pub use aggregate::aggregate;
pub use config::{ConnectionConfig, PluginConfig};
pub use error::QgStatsError;
pub use model::{AggregateStat, Filter, JobStat};
pub use plugin::{Plugin, QgPlugin};
pub use reporter::MackerelReporter;
pub use source::{PostgresSource, StatsSource};
