//! Plugin interface consumed by the reporter and its job queue implementation.

use tracing::debug;

use crate::aggregate::aggregate;
use crate::config::PluginConfig;
use crate::error::QgStatsError;
use crate::metrics::{GraphDef, MetricValues, qg_graphs};
use crate::model::Filter;
use crate::source::StatsSource;

/// A metrics plugin: a key prefix, its graphs and a way to fetch values.
pub trait Plugin {
    /// Prefix joined to every graph key and metric name.
    fn metric_key_prefix(&self) -> &str;

    /// Graphs reported by this plugin, in output order.
    fn graph_definition(&self) -> Vec<GraphDef>;

    /// Fetches the current metric values.
    fn fetch_metrics(&mut self) -> Result<MetricValues, QgStatsError>;
}

/// Reports aggregated `qg` job statistics.
pub struct QgPlugin<S> {
    source: S,
    filter: Filter,
    prefix: String,
}

impl<S: StatsSource> QgPlugin<S> {
    pub fn new(source: S, config: &PluginConfig) -> Self {
        Self {
            source,
            filter: config.filter.clone(),
            prefix: config.metric_key_prefix.clone(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: StatsSource> Plugin for QgPlugin<S> {
    fn metric_key_prefix(&self) -> &str {
        &self.prefix
    }

    fn graph_definition(&self) -> Vec<GraphDef> {
        qg_graphs(&self.prefix)
    }

    fn fetch_metrics(&mut self) -> Result<MetricValues, QgStatsError> {
        let rows = self.source.fetch()?;
        let stat = aggregate(&rows, &self.filter);
        debug!(
            "aggregated {} rows (queue={:?}, type={:?}): {:?}",
            rows.len(),
            self.filter.queue,
            self.filter.job_type,
            stat
        );
        Ok(MetricValues::from(&stat))
    }
}
