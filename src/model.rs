//! Job queue statistics rows and their aggregate.

use chrono::{DateTime, Utc};

/// Statistics for one (queue, job class) pair.
///
/// Source: the `que_jobs` table grouped by `queue, job_class`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct JobStat {
    /// Queue name.
    pub queue: String,
    /// Job class within the queue.
    pub job_type: String,
    /// Pending jobs.
    pub count: i64,
    /// Jobs currently locked by a worker.
    pub count_working: i64,
    /// Jobs that failed at least once.
    pub count_errored: i64,
    /// Highest `error_count` among the jobs of this row.
    pub highest_error_count: i64,
    /// Earliest `run_at` among pending jobs. `None` when nothing is pending.
    ///
    /// Whole-second precision: the source reads `run_at` as epoch seconds,
    /// with 0 standing for "no pending jobs", so a `run_at` of exactly
    /// 1970-01-01T00:00:00Z also reads as unset.
    pub oldest_run_at: Option<DateTime<Utc>>,
}

/// Filtered summary of zero or more [`JobStat`] rows.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AggregateStat {
    pub count: i64,
    pub count_working: i64,
    pub count_errored: i64,
    pub highest_error_count: i64,
    pub oldest_run_at: Option<DateTime<Utc>>,
}

/// Restricts aggregation to one queue and/or one job type.
///
/// An unset dimension matches every row.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Filter {
    pub queue: Option<String>,
    pub job_type: Option<String>,
}

impl Filter {
    /// Creates a filter. Empty strings are treated as unset.
    pub fn new(queue: Option<String>, job_type: Option<String>) -> Self {
        Self {
            queue: queue.filter(|q| !q.is_empty()),
            job_type: job_type.filter(|t| !t.is_empty()),
        }
    }

    /// Returns true if `stat` passes both dimensions.
    pub fn matches(&self, stat: &JobStat) -> bool {
        let queue_ok = self.queue.as_deref().is_none_or(|q| q == stat.queue);
        let type_ok = self.job_type.as_deref().is_none_or(|t| t == stat.job_type);
        queue_ok && type_ok
    }
}
