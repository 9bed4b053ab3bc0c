//! Static graph definitions for the monitoring agent.
//!
//! One graph template per [`MetricGroup`], named `table.<group>.#`. The `#`
//! is expanded by the agent against the relation segment of each key.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::metrics::MetricGroup;
use crate::metrics::key::KEY_SEPARATOR;

/// Wildcard segment in graph names.
pub const WILDCARD: &str = "#";

/// Display unit of all table graphs.
pub const UNIT_INTEGER: &str = "integer";

/// One field of a graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricDef {
    pub name: &'static str,
    pub label: &'static str,
    /// Rate metric: the agent reports the per-minute change, not the value.
    #[serde(skip)]
    pub diff: bool,
    pub stacked: bool,
}

impl MetricDef {
    const fn counter(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            diff: true,
            stacked: false,
        }
    }

    const fn gauge(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            diff: false,
            stacked: false,
        }
    }
}

/// A graph template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Graph {
    pub label: String,
    pub unit: &'static str,
    pub metrics: Vec<MetricDef>,
}

const SCAN_METRICS: [MetricDef; 4] = [
    MetricDef::counter("seq_scan", "Sequential Scans"),
    MetricDef::counter("seq_tup_read", "Rows Fetched by Sequential Scan"),
    MetricDef::counter("idx_scan", "Index Scans"),
    MetricDef::counter("idx_tup_fetch", "Rows Fetched by Index Scan"),
];

const ROW_METRICS: [MetricDef; 6] = [
    MetricDef::counter("n_tup_ins", "Inserted Rows"),
    MetricDef::counter("n_tup_upd", "Updated Rows"),
    MetricDef::counter("n_tup_del", "Deleted Rows"),
    MetricDef::counter("n_tup_hot_upd", "HOT Updated Rows"),
    MetricDef::gauge("n_live_tup", "Estimated Live Rows"),
    MetricDef::gauge("n_dead_tup", "Estimated Dead Rows"),
];

const VACUUM_METRICS: [MetricDef; 2] = [
    MetricDef::counter("vacuum_count", "Vacuum Counts"),
    MetricDef::counter("autovacuum_count", "Auto Vacuum Counts"),
];

const ANALYZE_METRICS: [MetricDef; 2] = [
    MetricDef::counter("analyze_count", "Analyze Counts"),
    MetricDef::counter("autoanalyze_count", "Auto Analyze Counts"),
];

/// Field descriptors of a group, in display order.
pub fn group_metrics(group: MetricGroup) -> &'static [MetricDef] {
    match group {
        MetricGroup::Scan => &SCAN_METRICS,
        MetricGroup::Row => &ROW_METRICS,
        MetricGroup::Vacuum => &VACUUM_METRICS,
        MetricGroup::Analyze => &ANALYZE_METRICS,
    }
}

fn group_title(group: MetricGroup) -> &'static str {
    match group {
        MetricGroup::Scan => "Table Scans",
        MetricGroup::Row => "Table Rows",
        MetricGroup::Vacuum => "Table Vacuum Counts",
        MetricGroup::Analyze => "Table Analyze Counts",
    }
}

/// Graph name for a group, e.g. `table.scan.#`.
pub fn graph_name(group: MetricGroup) -> String {
    format!("{}{}{}", group.key_prefix(), KEY_SEPARATOR, WILDCARD)
}

/// All graph templates, keyed by graph name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GraphDefinition {
    graphs: BTreeMap<String, Graph>,
}

impl GraphDefinition {
    /// Builds the definitions; labels start with the title-cased prefix.
    pub fn new(prefix: &str) -> Self {
        let label_prefix = title_case(prefix);
        let graphs = MetricGroup::ALL
            .iter()
            .map(|&group| {
                let graph = Graph {
                    label: format!("{} {}", label_prefix, group_title(group)),
                    unit: UNIT_INTEGER,
                    metrics: group_metrics(group).to_vec(),
                };
                (graph_name(group), graph)
            })
            .collect();
        Self { graphs }
    }

    pub fn graphs(&self) -> &BTreeMap<String, Graph> {
        &self.graphs
    }

    pub fn get(&self, name: &str) -> Option<&Graph> {
        self.graphs.get(name)
    }

    /// Finds the field descriptor a concrete metric key belongs to.
    ///
    /// The wildcard matches exactly one non-empty segment.
    pub fn lookup(&self, key: &str) -> Option<&MetricDef> {
        self.graphs.iter().find_map(|(name, graph)| {
            let stem = name.strip_suffix(WILDCARD)?;
            let rest = key.strip_prefix(stem)?;
            let (segment, field) = rest.split_once(KEY_SEPARATOR)?;
            if segment.is_empty() || field.contains(KEY_SEPARATOR) {
                return None;
            }
            graph.metrics.iter().find(|m| m.name == field)
        })
    }
}

/// Upper-cases the first letter of every word.
///
/// Words are separated by anything other than letters, digits and `_`.
pub fn title_case(s: &str) -> String {
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
