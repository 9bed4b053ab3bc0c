//! Normalization of table statistics into metrics.
//!
//! Rows are first grouped into [`TableMetrics`], a two-level container
//! (group, then relation name, then a fixed counter record). Flat string keys
//! of the form `table.<group>.<relation>.<field>` are produced only by
//! [`TableMetrics::to_metric_map`].

pub mod key;

use std::collections::BTreeMap;

use crate::collector::{PgCollectError, StatRow, StatSource};
use key::{encode_segment, metric_key};

/// Flat metric key to value mapping handed to the agent.
pub type MetricMap = BTreeMap<String, f64>;

/// Metric group. Each group is rendered as one graph per relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricGroup {
    Scan,
    Row,
    Vacuum,
    Analyze,
}

impl MetricGroup {
    pub const ALL: [MetricGroup; 4] = [
        MetricGroup::Scan,
        MetricGroup::Row,
        MetricGroup::Vacuum,
        MetricGroup::Analyze,
    ];

    /// Key prefix preceding the relation segment.
    pub fn key_prefix(self) -> &'static str {
        match self {
            MetricGroup::Scan => "table.scan",
            MetricGroup::Row => "table.row",
            MetricGroup::Vacuum => "table.vacuum",
            MetricGroup::Analyze => "table.analyze",
        }
    }
}

/// Fixed counter record for one group of one relation.
pub trait GroupRecord {
    const GROUP: MetricGroup;

    fn from_stat(stat: &StatRow) -> Self;

    /// Field name and value pairs, in graph order.
    fn values(&self) -> Vec<(&'static str, f64)>;
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct ScanCounters {
    pub seq_scan: f64,
    pub seq_tup_read: f64,
    pub idx_scan: f64,
    pub idx_tup_fetch: f64,
}

impl GroupRecord for ScanCounters {
    const GROUP: MetricGroup = MetricGroup::Scan;

    fn from_stat(stat: &StatRow) -> Self {
        Self {
            seq_scan: stat.seq_scan as f64,
            seq_tup_read: stat.seq_tup_read as f64,
            idx_scan: stat.idx_scan as f64,
            idx_tup_fetch: stat.idx_tup_fetch as f64,
        }
    }

    fn values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("seq_scan", self.seq_scan),
            ("seq_tup_read", self.seq_tup_read),
            ("idx_scan", self.idx_scan),
            ("idx_tup_fetch", self.idx_tup_fetch),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct RowCounters {
    pub n_tup_ins: f64,
    pub n_tup_upd: f64,
    pub n_tup_del: f64,
    pub n_tup_hot_upd: f64,
    /// Gauge.
    pub n_live_tup: f64,
    /// Gauge.
    pub n_dead_tup: f64,
}

impl GroupRecord for RowCounters {
    const GROUP: MetricGroup = MetricGroup::Row;

    fn from_stat(stat: &StatRow) -> Self {
        Self {
            n_tup_ins: stat.n_tup_ins as f64,
            n_tup_upd: stat.n_tup_upd as f64,
            n_tup_del: stat.n_tup_del as f64,
            n_tup_hot_upd: stat.n_tup_hot_upd as f64,
            n_live_tup: stat.n_live_tup as f64,
            n_dead_tup: stat.n_dead_tup as f64,
        }
    }

    fn values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("n_tup_ins", self.n_tup_ins),
            ("n_tup_upd", self.n_tup_upd),
            ("n_tup_del", self.n_tup_del),
            ("n_tup_hot_upd", self.n_tup_hot_upd),
            ("n_live_tup", self.n_live_tup),
            ("n_dead_tup", self.n_dead_tup),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct VacuumCounters {
    pub vacuum_count: f64,
    pub autovacuum_count: f64,
}

impl GroupRecord for VacuumCounters {
    const GROUP: MetricGroup = MetricGroup::Vacuum;

    fn from_stat(stat: &StatRow) -> Self {
        Self {
            vacuum_count: stat.vacuum_count as f64,
            autovacuum_count: stat.autovacuum_count as f64,
        }
    }

    fn values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("vacuum_count", self.vacuum_count),
            ("autovacuum_count", self.autovacuum_count),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct AnalyzeCounters {
    pub analyze_count: f64,
    pub autoanalyze_count: f64,
}

impl GroupRecord for AnalyzeCounters {
    const GROUP: MetricGroup = MetricGroup::Analyze;

    fn from_stat(stat: &StatRow) -> Self {
        Self {
            analyze_count: stat.analyze_count as f64,
            autoanalyze_count: stat.autoanalyze_count as f64,
        }
    }

    fn values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("analyze_count", self.analyze_count),
            ("autoanalyze_count", self.autoanalyze_count),
        ]
    }
}

/// Number of metric entries produced per relation.
pub const METRICS_PER_RELATION: usize = 14;

/// Per-group, per-relation counters from one collection run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableMetrics {
    pub scan: BTreeMap<String, ScanCounters>,
    pub row: BTreeMap<String, RowCounters>,
    pub vacuum: BTreeMap<String, VacuumCounters>,
    pub analyze: BTreeMap<String, AnalyzeCounters>,
}

impl TableMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains `source` into a new container.
    ///
    /// On error nothing collected so far is returned.
    pub fn collect(source: &mut dyn StatSource) -> Result<Self, PgCollectError> {
        let mut metrics = TableMetrics::new();
        source.collect_rows(&mut |row: StatRow| metrics.insert(&row))?;
        Ok(metrics)
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a StatRow>) -> Self {
        let mut metrics = TableMetrics::new();
        for row in rows {
            metrics.insert(row);
        }
        metrics
    }

    /// Adds one row. A repeated relation name replaces the earlier values.
    pub fn insert(&mut self, stat: &StatRow) {
        let name = stat.relname.clone();
        self.scan.insert(name.clone(), ScanCounters::from_stat(stat));
        self.row.insert(name.clone(), RowCounters::from_stat(stat));
        self.vacuum.insert(name.clone(), VacuumCounters::from_stat(stat));
        self.analyze.insert(name, AnalyzeCounters::from_stat(stat));
    }

    /// Number of distinct relations.
    pub fn len(&self) -> usize {
        self.scan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan.is_empty()
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.scan.keys().map(String::as_str)
    }

    /// Flattens into `table.<group>.<relation>.<field>` keys.
    ///
    /// The relation segment is escaped with [`encode_segment`], so distinct
    /// relation names never share a key.
    pub fn to_metric_map(&self) -> MetricMap {
        let mut map = MetricMap::new();

        for relname in self.relations() {
            let segment = encode_segment(relname);
            flatten_group(&mut map, &segment, self.scan.get(relname));
            flatten_group(&mut map, &segment, self.row.get(relname));
            flatten_group(&mut map, &segment, self.vacuum.get(relname));
            flatten_group(&mut map, &segment, self.analyze.get(relname));
        }

        map
    }
}

fn flatten_group<R: GroupRecord>(map: &mut MetricMap, segment: &str, record: Option<&R>) {
    let Some(record) = record else {
        return;
    };
    for (field, value) in record.values() {
        map.insert(metric_key(R::GROUP.key_prefix(), segment, field), value);
    }
}
