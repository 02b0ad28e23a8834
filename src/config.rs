//! Plugin and PostgreSQL connection configuration.
//!
//! Connection settings follow libpq conventions: every field may come from a
//! command-line flag or from the matching `PG*` environment variable, and an
//! empty value means "unset".

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;

use crate::error::QgStatsError;
use crate::model::Filter;

/// Metric key prefix used when none is configured.
pub const DEFAULT_METRIC_KEY_PREFIX: &str = "qg";

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const APPLICATION_NAME: &str = "mackerel-plugin-qg";

/// TLS negotiation mode, as accepted by libpq's `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = QgStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(QgStatsError::InvalidConfig(format!(
                "invalid sslmode: {}",
                other
            ))),
        }
    }
}

impl SslMode {
    /// Mode handed to the `postgres` driver. It has no `allow`/`verify-*`
    /// variants; verification is done by the TLS connector instead.
    fn driver_mode(self) -> postgres::config::SslMode {
        match self {
            SslMode::Disable => postgres::config::SslMode::Disable,
            SslMode::Allow | SslMode::Prefer => postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                postgres::config::SslMode::Require
            }
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    /// Kept as text so a malformed value surfaces as a configuration error.
    pub port: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_mode: Option<String>,
    pub ssl_key: Option<PathBuf>,
    pub ssl_cert: Option<PathBuf>,
    pub ssl_root_cert: Option<PathBuf>,
    /// `Duration::ZERO` disables the timeout.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Reads connection settings from the standard `PG*` environment variables.
    ///
    /// Falls back to `$USER` when `PGUSER` is not set.
    pub fn from_env() -> Self {
        let var = |name: &str| non_empty(std::env::var(name).ok());
        Self {
            host: var("PGHOST"),
            port: var("PGPORT"),
            user: var("PGUSER").or_else(|| var("USER")),
            password: var("PGPASSWORD"),
            database: var("PGDATABASE"),
            ssl_mode: var("PGSSLMODE"),
            ssl_key: var("PGSSLKEY").map(PathBuf::from),
            ssl_cert: var("PGSSLCERT").map(PathBuf::from),
            ssl_root_cert: var("PGSSLROOTCERT").map(PathBuf::from),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Parses the configured port, defaulting to 5432.
    pub fn port(&self) -> Result<u16, QgStatsError> {
        match self.port.as_deref() {
            None => Ok(DEFAULT_PORT),
            Some(p) => p
                .trim()
                .parse::<u16>()
                .map_err(|_| QgStatsError::InvalidConfig(format!("invalid port number: {}", p))),
        }
    }

    /// Parses the configured sslmode, defaulting to `prefer`.
    pub fn ssl_mode(&self) -> Result<SslMode, QgStatsError> {
        self.ssl_mode
            .as_deref()
            .map_or(Ok(SslMode::default()), SslMode::from_str)
    }

    /// Builds the driver configuration.
    pub fn to_pg_config(&self) -> Result<postgres::Config, QgStatsError> {
        let mut config = postgres::Config::new();
        config
            .host(self.host.as_deref().unwrap_or(DEFAULT_HOST))
            .port(self.port()?)
            .ssl_mode(self.ssl_mode()?.driver_mode())
            .application_name(APPLICATION_NAME);

        if let Some(user) = &self.user {
            config.user(user.as_str());
        }
        if let Some(password) = &self.password {
            config.password(password.as_str());
        }
        if let Some(database) = &self.database {
            config.dbname(database.as_str());
        }
        if !self.connect_timeout.is_zero() {
            config.connect_timeout(self.connect_timeout);
        }

        Ok(config)
    }

    /// Builds the TLS connector, or `None` when TLS is disabled.
    pub fn tls_connector(&self) -> Result<Option<MakeTlsConnector>, QgStatsError> {
        let mode = self.ssl_mode()?;
        if mode == SslMode::Disable {
            return Ok(None);
        }

        let mut builder = TlsConnector::builder();
        builder
            .danger_accept_invalid_certs(!matches!(mode, SslMode::VerifyCa | SslMode::VerifyFull))
            .danger_accept_invalid_hostnames(mode != SslMode::VerifyFull);

        if let Some(path) = &self.ssl_root_cert {
            let pem = read_file(path)?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                QgStatsError::InvalidConfig(format!("sslrootcert {}: {}", path.display(), e))
            })?;
            builder.add_root_certificate(cert);
        }

        match (&self.ssl_cert, &self.ssl_key) {
            (Some(cert_path), Some(key_path)) => {
                let cert = read_file(cert_path)?;
                let key = read_file(key_path)?;
                let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
                    QgStatsError::InvalidConfig(format!("client certificate: {}", e))
                })?;
                builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(QgStatsError::InvalidConfig(
                    "sslcert and sslkey must be set together".to_string(),
                ));
            }
        }

        let connector = builder
            .build()
            .map_err(|e| QgStatsError::InvalidConfig(format!("TLS: {}", e)))?;
        Ok(Some(MakeTlsConnector::new(connector)))
    }

    /// Connection target for logging, without credentials.
    pub fn describe(&self) -> String {
        format!(
            "host={} port={} user={} dbname={} sslmode={}",
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.as_deref().unwrap_or("5432"),
            self.user.as_deref().unwrap_or(""),
            self.database.as_deref().unwrap_or(""),
            self.ssl_mode.as_deref().unwrap_or("prefer"),
        )
    }
}

/// Everything the plugin needs for one collection cycle.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub connection: ConnectionConfig,
    pub filter: Filter,
    pub metric_key_prefix: String,
    pub tempfile: Option<PathBuf>,
}

impl PluginConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            filter: Filter::default(),
            metric_key_prefix: DEFAULT_METRIC_KEY_PREFIX.to_string(),
            tempfile: None,
        }
    }

    /// Restricts aggregation to a queue and/or job type. Empty values match all.
    pub fn with_filter(mut self, queue: Option<String>, job_type: Option<String>) -> Self {
        self.filter = Filter::new(queue, job_type);
        self
    }

    /// Sets the metric key prefix. An empty prefix keeps the default.
    pub fn with_metric_key_prefix(mut self, prefix: Option<String>) -> Self {
        if let Some(prefix) = non_empty(prefix) {
            self.metric_key_prefix = prefix;
        }
        self
    }

    pub fn with_tempfile(mut self, tempfile: Option<PathBuf>) -> Self {
        self.tempfile = tempfile.filter(|p| !p.as_os_str().is_empty());
        self
    }
}

/// Maps empty strings to `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn read_file(path: &Path) -> Result<Vec<u8>, QgStatsError> {
    std::fs::read(path)
        .map_err(|e| QgStatsError::InvalidConfig(format!("{}: {}", path.display(), e)))
}
