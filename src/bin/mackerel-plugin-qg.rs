//! mackerel-plugin-qg - qg/que job queue metrics for mackerel-agent.
//!
//! Prints metric values on stdout, or graph definitions when invoked with
//! `MACKEREL_AGENT_PLUGIN_META` set. Logs go to stderr.
//!
//! Usage:
//!   mackerel-plugin-qg --pghost db --pguser app --pgdatabase jobs
//!   mackerel-plugin-qg --queue mailers --type SendMail
//!
//! Long flags take two dashes. Command lines written for the Go plugin's
//! single-dash form (`-pghost=db`) must be changed to `--pghost=db`.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, Subscriber, debug, error};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use qgstats::config::{DEFAULT_METRIC_KEY_PREFIX, non_empty};
use qgstats::{ConnectionConfig, MackerelReporter, PluginConfig, PostgresSource, QgPlugin};

/// Job queue statistics plugin for mackerel-agent.
#[derive(Parser)]
#[command(name = "mackerel-plugin-qg", about = "qg job queue metrics for mackerel-agent", version)]
struct Args {
    /// Hostname to login to.
    #[arg(long, env = "PGHOST")]
    pghost: Option<String>,

    /// Database port.
    #[arg(long, env = "PGPORT")]
    pgport: Option<String>,

    /// Postgres user. Defaults to $USER.
    #[arg(long, env = "PGUSER")]
    pguser: Option<String>,

    /// Database name.
    #[arg(long, env = "PGDATABASE")]
    pgdatabase: Option<String>,

    /// Postgres password.
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    pgpassword: Option<String>,

    /// Whether to use SSL [disable|allow|prefer|require|verify-ca|verify-full].
    #[arg(long, env = "PGSSLMODE")]
    pgsslmode: Option<String>,

    /// Private key for client certificate (PEM, PKCS#8).
    #[arg(long, env = "PGSSLKEY")]
    pgsslkey: Option<PathBuf>,

    /// Client certificate (PEM).
    #[arg(long, env = "PGSSLCERT")]
    pgsslcert: Option<PathBuf>,

    /// CA for server certificate (PEM).
    #[arg(long, env = "PGSSLROOTCERT")]
    pgsslrootcert: Option<PathBuf>,

    /// Statistics for specific queue.
    #[arg(long)]
    queue: Option<String>,

    /// Statistics for specific job type.
    #[arg(long = "type")]
    job_type: Option<String>,

    /// Metric key prefix.
    #[arg(long, default_value = DEFAULT_METRIC_KEY_PREFIX)]
    metric_key_prefix: String,

    /// Maximum wait for connection, in seconds. 0 waits indefinitely.
    #[arg(long = "connect_timeout", default_value = "5")]
    connect_timeout: u64,

    /// Temp file name.
    #[arg(long)]
    tempfile: Option<PathBuf>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn plugin_config(&self) -> PluginConfig {
        let connection = ConnectionConfig {
            host: non_empty(self.pghost.clone()),
            port: non_empty(self.pgport.clone()),
            user: non_empty(self.pguser.clone())
                .or_else(|| non_empty(std::env::var("USER").ok())),
            password: non_empty(self.pgpassword.clone()),
            database: non_empty(self.pgdatabase.clone()),
            ssl_mode: non_empty(self.pgsslmode.clone()),
            ssl_key: self.pgsslkey.clone().filter(|p| !p.as_os_str().is_empty()),
            ssl_cert: self.pgsslcert.clone().filter(|p| !p.as_os_str().is_empty()),
            ssl_root_cert: self
                .pgsslrootcert
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            connect_timeout: Duration::from_secs(self.connect_timeout),
        };

        PluginConfig::new(connection)
            .with_filter(self.queue.clone(), self.job_type.clone())
            .with_metric_key_prefix(Some(self.metric_key_prefix.clone()))
            .with_tempfile(self.tempfile.clone())
    }
}

/// Builds the log filter for our crates at the requested verbosity.
fn log_filter(verbose: u8, quiet: bool) -> EnvFilter {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for crate_name in ["mackerel_plugin_qg", "qgstats"] {
        if let Ok(directive) = format!("{}={}", crate_name, level).parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Log formatter writing to `writer`. Colours only when `ansi` is set.
fn log_subscriber<W>(filter: EnvFilter, writer: W, ansi: bool) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer)
        .finish()
}

/// Initializes logging on stderr; stdout is reserved for metrics.
///
/// mackerel-agent captures stderr into its own log, so colours are only
/// used on a terminal.
fn init_logging(verbose: u8, quiet: bool) {
    let subscriber = log_subscriber(
        log_filter(verbose, quiet),
        std::io::stderr,
        std::io::stderr().is_terminal(),
    );
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to initialize logging: {}", e);
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = args.plugin_config();
    debug!(
        "connection: {}, filter: {:?}, prefix: {}",
        config.connection.describe(),
        config.filter,
        config.metric_key_prefix
    );

    let reporter = MackerelReporter::new(&config.metric_key_prefix, config.tempfile.clone());
    let mut plugin = QgPlugin::new(PostgresSource::new(config.connection.clone()), &config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = reporter.run(&mut plugin, &mut out) {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured_error_line(ansi: bool) -> String {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = log_subscriber(EnvFilter::new("error"), move || writer.clone(), ansi);
        tracing::subscriber::with_default(subscriber, || error!("PostgreSQL: connection refused"));
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn plain_logs_have_no_escape_codes() {
        let line = captured_error_line(false);
        assert!(line.contains("ERROR"));
        assert!(line.contains("connection refused"));
        assert!(!line.contains('\x1b'), "escape codes in {:?}", line);
    }

    #[test]
    fn terminal_logs_are_coloured() {
        assert!(captured_error_line(true).contains('\x1b'));
    }

    #[test]
    fn long_flags_take_two_dashes() {
        let args = Args::try_parse_from(["mackerel-plugin-qg", "--pghost=db", "--type", "Mail"])
            .unwrap();
        assert_eq!(args.pghost.as_deref(), Some("db"));
        assert_eq!(args.job_type.as_deref(), Some("Mail"));

        assert!(Args::try_parse_from(["mackerel-plugin-qg", "-pghost=db"]).is_err());
    }

    #[test]
    fn connect_timeout_keeps_underscore_name() {
        let args =
            Args::try_parse_from(["mackerel-plugin-qg", "--connect_timeout", "9"]).unwrap();
        assert_eq!(args.connect_timeout, 9);
        assert_eq!(args.metric_key_prefix, DEFAULT_METRIC_KEY_PREFIX);
    }
}
