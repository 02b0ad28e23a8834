//! Sources of per-(queue, type) job statistics.

pub mod mock;
mod pg_source;
mod queries;

pub use pg_source::PostgresSource;

use crate::error::QgStatsError;
use crate::model::JobStat;

/// Produces the current job statistics rows.
///
/// Connection and query failures are returned as
/// [`QgStatsError::SourceUnavailable`]; implementations do not retry.
pub trait StatsSource {
    fn fetch(&mut self) -> Result<Vec<JobStat>, QgStatsError>;
}
