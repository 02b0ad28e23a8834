//! Mackerel agent plugin protocol output.
//!
//! Two modes:
//! - values: one `name\tvalue\tepoch` line per metric
//! - meta (when `MACKEREL_AGENT_PLUGIN_META` is non-empty): the graph definitions as JSON
//!
//! The last reported values are kept in a tempfile so that metrics flagged
//! `diff` can be reported as a per-minute rate.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::QgStatsError;
use crate::metrics::{GraphDef, MetricValues};
use crate::plugin::Plugin;

/// Environment variable set by mackerel-agent to request graph definitions.
pub const PLUGIN_META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

/// Previous samples older than this are not used for rates.
const DIFF_MAX_INTERVAL_SECS: i64 = 600;

/// Values saved between runs.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct LastValues {
    timestamp: i64,
    values: MetricValues,
}

#[derive(Serialize)]
struct GraphMeta<'a> {
    graphs: BTreeMap<String, &'a GraphDef>,
}

/// Writes plugin output in the Mackerel agent format.
pub struct MackerelReporter {
    tempfile: PathBuf,
}

impl MackerelReporter {
    /// Creates a reporter. Without an explicit tempfile the state is kept in
    /// `$TMPDIR/mackerel-plugin-<prefix>`.
    pub fn new(prefix: &str, tempfile: Option<PathBuf>) -> Self {
        let tempfile = tempfile
            .unwrap_or_else(|| std::env::temp_dir().join(format!("mackerel-plugin-{}", prefix)));
        Self { tempfile }
    }

    pub fn tempfile(&self) -> &Path {
        &self.tempfile
    }

    /// Writes graph definitions or values depending on how the agent invoked us.
    pub fn run<P: Plugin>(&self, plugin: &mut P, out: &mut impl Write) -> Result<(), QgStatsError> {
        self.output(plugin, out, meta_requested())
    }

    fn output<P: Plugin>(
        &self,
        plugin: &mut P,
        out: &mut impl Write,
        meta: bool,
    ) -> Result<(), QgStatsError> {
        if meta {
            self.output_definitions(plugin, out)
        } else {
            self.output_values(plugin, out, Utc::now().timestamp())
        }
    }

    /// Fetches metrics and writes one line per graph metric.
    pub fn output_values<P: Plugin>(
        &self,
        plugin: &mut P,
        out: &mut impl Write,
        now: i64,
    ) -> Result<(), QgStatsError> {
        let values = plugin.fetch_metrics()?;
        let last = self.load_last_values();
        let prefix = plugin.metric_key_prefix().to_string();

        for graph in plugin.graph_definition() {
            for metric in &graph.metrics {
                let Some(value) = values.get(metric.name) else {
                    debug!("no value for {}", metric.name);
                    continue;
                };
                let key = format!("{}.{}.{}", prefix, graph.key, metric.name);

                if metric.diff {
                    match per_minute_rate(last.as_ref(), metric.name, value, now) {
                        Some(rate) => writeln!(out, "{}\t{}\t{}", key, rate, now)?,
                        None => debug!("skipping {}: no usable previous value", key),
                    }
                } else {
                    writeln!(out, "{}\t{}\t{}", key, value, now)?;
                }
            }
        }

        self.save_values(&LastValues {
            timestamp: now,
            values,
        })
    }

    /// Writes the graph definitions as plugin meta JSON.
    pub fn output_definitions<P: Plugin>(
        &self,
        plugin: &P,
        out: &mut impl Write,
    ) -> Result<(), QgStatsError> {
        let prefix = plugin.metric_key_prefix();
        let graphs = plugin.graph_definition();
        let meta = GraphMeta {
            graphs: graphs
                .iter()
                .map(|g| (format!("{}.{}", prefix, g.key), g))
                .collect(),
        };

        writeln!(out, "# mackerel-agent-plugin")?;
        serde_json::to_writer(&mut *out, &meta).map_err(|e| QgStatsError::Report(e.to_string()))?;
        writeln!(out)?;
        Ok(())
    }

    fn load_last_values(&self) -> Option<LastValues> {
        let data = match std::fs::read(&self.tempfile) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cannot read {}: {}", self.tempfile.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&data) {
            Ok(last) => Some(last),
            Err(e) => {
                warn!("ignoring malformed {}: {}", self.tempfile.display(), e);
                None
            }
        }
    }

    /// Replaces the tempfile atomically.
    fn save_values(&self, last: &LastValues) -> Result<(), QgStatsError> {
        let dir = match self.tempfile.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, last).map_err(|e| QgStatsError::Report(e.to_string()))?;
        file.persist(&self.tempfile)
            .map_err(|e| QgStatsError::Report(format!("{}: {}", self.tempfile.display(), e)))?;
        Ok(())
    }
}

/// True when mackerel-agent asks for graph definitions.
pub fn meta_requested() -> bool {
    meta_requested_from(std::env::var_os(PLUGIN_META_ENV))
}

/// Meta mode is on when the variable is set to a non-empty value.
fn meta_requested_from(value: Option<OsString>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// Change per minute since the previous run.
///
/// `None` on first run, after a counter reset, or when the previous sample is
/// missing, too old or not older than `now`.
fn per_minute_rate(last: Option<&LastValues>, name: &str, value: i64, now: i64) -> Option<f64> {
    let last = last?;
    let previous = last.values.get(name)?;
    let interval = now - last.timestamp;
    if interval <= 0 || interval > DIFF_MAX_INTERVAL_SECS || value < previous {
        return None;
    }
    Some((value - previous) as f64 * 60.0 / interval as f64)
}
