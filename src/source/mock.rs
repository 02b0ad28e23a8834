//! In-memory stats source for tests.

use crate::error::QgStatsError;
use crate::model::JobStat;

use super::StatsSource;

/// Returns a fixed set of rows, or fails like an unreachable database.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    rows: Vec<JobStat>,
    unavailable: Option<String>,
    fetches: usize,
}

impl MockSource {
    pub fn new(rows: Vec<JobStat>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// A source whose every fetch fails with `SourceUnavailable`.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            unavailable: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Number of `fetch` calls so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

impl StatsSource for MockSource {
    fn fetch(&mut self) -> Result<Vec<JobStat>, QgStatsError> {
        self.fetches += 1;
        match &self.unavailable {
            Some(reason) => Err(QgStatsError::SourceUnavailable(reason.clone())),
            None => Ok(self.rows.clone()),
        }
    }
}
