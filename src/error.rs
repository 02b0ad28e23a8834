//! Error type shared by the stats source, configuration and reporter.

/// Error type for a collection cycle.
#[derive(Debug)]
pub enum QgStatsError {
    /// Connection parameters could not be resolved.
    InvalidConfig(String),
    /// The stats source could not be reached or queried.
    SourceUnavailable(String),
    /// Writing plugin output or bookkeeping state failed.
    Report(String),
}

impl std::fmt::Display for QgStatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QgStatsError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            QgStatsError::SourceUnavailable(msg) => write!(f, "PostgreSQL: {}", msg),
            QgStatsError::Report(msg) => write!(f, "report failed: {}", msg),
        }
    }
}

impl std::error::Error for QgStatsError {}

impl From<std::io::Error> for QgStatsError {
    fn from(e: std::io::Error) -> Self {
        QgStatsError::Report(e.to_string())
    }
}
