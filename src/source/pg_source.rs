//! Job statistics read from a `qg`/`que` queue in PostgreSQL.

use chrono::DateTime;
use postgres::{Client, NoTls};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::QgStatsError;
use crate::model::JobStat;

use super::StatsSource;
use super::queries::JOB_STATS_QUERY;

/// Reads job statistics over a single blocking connection.
///
/// The connection is opened on the first [`fetch`](StatsSource::fetch) and
/// reused afterwards.
pub struct PostgresSource {
    config: ConnectionConfig,
    client: Option<Client>,
}

impl PostgresSource {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Connects now instead of on the first fetch.
    ///
    /// Useful to check reachability before doing any other work.
    pub fn try_connect(&mut self) -> Result<(), QgStatsError> {
        self.ensure_connected().map(|_| ())
    }

    /// Returns the open connection, connecting if needed.
    ///
    /// Configuration is validated before any network activity.
    pub fn ensure_connected(&mut self) -> Result<&mut Client, QgStatsError> {
        if self.client.is_none() {
            let pg_config = self.config.to_pg_config()?;
            let tls = self.config.tls_connector()?;
            debug!("connecting to PostgreSQL: {}", self.config.describe());

            let result = match tls {
                Some(connector) => pg_config.connect(connector),
                None => pg_config.connect(NoTls),
            };
            let client = result
                .map_err(|e| QgStatsError::SourceUnavailable(format_postgres_error(&e)))?;
            self.client = Some(client);
        }

        self.client
            .as_mut()
            .ok_or_else(|| QgStatsError::SourceUnavailable("not connected".to_string()))
    }
}

impl StatsSource for PostgresSource {
    fn fetch(&mut self) -> Result<Vec<JobStat>, QgStatsError> {
        let client = self.ensure_connected()?;

        let rows = match client.query(JOB_STATS_QUERY, &[]) {
            Ok(rows) => rows,
            Err(e) => {
                // Drop a broken connection so the next fetch reconnects.
                if e.is_closed() {
                    self.client = None;
                }
                return Err(QgStatsError::SourceUnavailable(format!(
                    "query error: {}",
                    format_postgres_error(&e)
                )));
            }
        };

        let stats: Vec<JobStat> = rows
            .iter()
            .map(|row| JobStat {
                queue: row.get(0),
                job_type: row.get(1),
                count: row.get(2),
                count_working: row.get(3),
                count_errored: row.get(4),
                highest_error_count: row.get(5),
                oldest_run_at: epoch_to_datetime(row.get(6)),
            })
            .collect();

        debug!("fetched {} job stat rows", stats.len());
        Ok(stats)
    }
}

/// Epoch seconds to a timestamp; 0 means unset.
fn epoch_to_datetime(secs: i64) -> Option<DateTime<chrono::Utc>> {
    if secs == 0 {
        None
    } else {
        DateTime::from_timestamp(secs, 0)
    }
}

/// Formats PostgreSQL error message for display.
///
/// Connection failures carry their reason (refused, timed out, DNS, TLS) in
/// the error's source chain, so the chain is appended to the message.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = error_chain(e);
        if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}

/// Joins an error and all of its sources with `": "`.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !msg.ends_with(&cause_msg) {
            msg.push_str(": ");
            msg.push_str(&cause_msg);
        }
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_epoch_is_unset() {
        assert_eq!(epoch_to_datetime(0), None);
        assert_eq!(
            epoch_to_datetime(1_700_000_000).map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn invalid_port_fails_before_connecting() {
        let mut source = PostgresSource::new(ConnectionConfig {
            port: Some("not-a-port".to_string()),
            ..ConnectionConfig::default()
        });
        assert!(matches!(
            source.fetch(),
            Err(QgStatsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unreachable_server_is_source_unavailable() {
        // Port 1 on loopback is not a PostgreSQL server.
        let mut source = PostgresSource::new(ConnectionConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some("1".to_string()),
            user: Some("qgstats".to_string()),
            ssl_mode: Some("disable".to_string()),
            connect_timeout: Duration::from_secs(1),
            ..ConnectionConfig::default()
        });
        assert!(matches!(
            source.fetch(),
            Err(QgStatsError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn connection_error_keeps_reason() {
        let mut source = PostgresSource::new(ConnectionConfig {
            host: Some("127.0.0.1".to_string()),
            port: Some("1".to_string()),
            user: Some("qgstats".to_string()),
            ssl_mode: Some("disable".to_string()),
            connect_timeout: Duration::from_secs(1),
            ..ConnectionConfig::default()
        });

        let msg = source.try_connect().unwrap_err().to_string();
        assert!(msg.contains("refused"), "no reason in {:?}", msg);
    }

    #[derive(Debug)]
    struct Wrapped(std::io::Error);

    impl std::fmt::Display for Wrapped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "error connecting to server")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn error_chain_appends_sources() {
        let e = Wrapped(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused (os error 111)",
        ));
        assert_eq!(
            error_chain(&e),
            "error connecting to server: Connection refused (os error 111)"
        );
    }
}
