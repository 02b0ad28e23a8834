//! Metric names, values and graph definitions reported for a queue summary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::AggregateStat;

pub const COUNT_TOTAL: &str = "count_total";
pub const COUNT_WORKING: &str = "count_working";
pub const COUNT_ERRORED: &str = "count_errored";
pub const HIGHEST_ERROR_COUNT: &str = "highest_error_count";

/// Named integer metric values, keyed by metric name.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricValues(BTreeMap<String, i64>);

impl MetricValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: i64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl From<&AggregateStat> for MetricValues {
    /// `oldest_run_at` is not reported.
    fn from(stat: &AggregateStat) -> Self {
        let mut values = MetricValues::new();
        values.insert(COUNT_TOTAL, stat.count);
        values.insert(COUNT_WORKING, stat.count_working);
        values.insert(COUNT_ERRORED, stat.count_errored);
        values.insert(HIGHEST_ERROR_COUNT, stat.highest_error_count);
        values
    }
}

/// One line of a graph.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricDef {
    pub name: &'static str,
    pub label: &'static str,
    /// Report the per-minute rate against the previous run instead of the raw value.
    #[serde(skip)]
    pub diff: bool,
    pub stacked: bool,
}

/// A graph grouping several metrics under one key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphDef {
    /// Graph key, joined to the metric key prefix.
    #[serde(skip)]
    pub key: &'static str,
    pub label: String,
    pub unit: &'static str,
    pub metrics: Vec<MetricDef>,
}

/// Graphs for the job queue metrics, labelled with the title-cased prefix.
pub fn qg_graphs(prefix: &str) -> Vec<GraphDef> {
    let label_prefix = title_case(prefix);

    vec![
        GraphDef {
            key: "jobs",
            label: format!("{} Jobs", label_prefix),
            unit: "integer",
            metrics: vec![
                MetricDef {
                    name: COUNT_TOTAL,
                    label: "Total jobs",
                    diff: false,
                    stacked: false,
                },
                MetricDef {
                    name: COUNT_WORKING,
                    label: "Jobs being processed",
                    diff: false,
                    stacked: false,
                },
            ],
        },
        GraphDef {
            key: "errors",
            label: format!("{} Errors", label_prefix),
            unit: "integer",
            metrics: vec![
                MetricDef {
                    name: COUNT_ERRORED,
                    label: "Job failure count",
                    diff: false,
                    stacked: false,
                },
                MetricDef {
                    name: HIGHEST_ERROR_COUNT,
                    label: "Highest error count",
                    diff: false,
                    stacked: false,
                },
            ],
        },
    ]
}

/// Upper-cases the first letter of every word.
///
/// Letters, digits and `_` continue a word; anything else separates words.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}
