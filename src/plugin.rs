//! Agent-facing plugin surface.
//!
//! [`Plugin`] ties the collector, the normalizer and the graph definitions
//! together and writes what the monitoring agent reads: either metric lines
//! (`<prefix>.<key>\t<value>\t<timestamp>`) or, in meta mode, the graph
//! definitions as JSON.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tracing::{debug, warn};

use crate::collector::{PgCollectError, PostgresCollector, StatSource};
use crate::config::ConnectionConfig;
use crate::graph::{Graph, GraphDefinition};
use crate::metrics::{MetricMap, TableMetrics};
use crate::rates::{PerMinuteRate, RateCalculator};
use crate::state::{Snapshot, SnapshotStore};

/// Environment variable that switches the agent into definition mode.
pub const PLUGIN_META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

/// First line of the definition output.
pub const PLUGIN_META_HEADER: &str = "# mackerel-agent-plugin";

/// Error type for a plugin run.
#[derive(Debug)]
pub enum PluginError {
    /// Metrics could not be fetched; nothing was written.
    Collect(PgCollectError),
    /// Writing the output failed.
    Io(std::io::Error),
    /// Encoding the graph definitions failed.
    Encode(serde_json::Error),
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::Collect(e) => write!(f, "{}", e),
            PluginError::Io(e) => write!(f, "output error: {}", e),
            PluginError::Encode(e) => write!(f, "graph definition encoding error: {}", e),
        }
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PluginError::Collect(e) => Some(e),
            PluginError::Io(e) => Some(e),
            PluginError::Encode(e) => Some(e),
        }
    }
}

impl From<PgCollectError> for PluginError {
    fn from(e: PgCollectError) -> Self {
        PluginError::Collect(e)
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::Io(e)
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        PluginError::Encode(e)
    }
}

/// Table statistics plugin.
pub struct Plugin<S> {
    prefix: String,
    source: S,
    graphs: GraphDefinition,
}

impl Plugin<PostgresCollector> {
    /// Plugin reading from a live PostgreSQL server.
    pub fn from_config(config: ConnectionConfig) -> Self {
        let prefix = config.prefix().to_string();
        Self::new(prefix, PostgresCollector::new(config))
    }
}

impl<S: StatSource> Plugin<S> {
    pub fn new(prefix: impl Into<String>, source: S) -> Self {
        let prefix = prefix.into();
        let graphs = GraphDefinition::new(&prefix);
        Self {
            prefix,
            source,
            graphs,
        }
    }

    /// Namespace prefix for every emitted key.
    pub fn metric_key_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn graph_definition(&self) -> &GraphDefinition {
        &self.graphs
    }

    /// Runs the collection once and returns the flat metrics.
    pub fn fetch_metrics(&mut self) -> Result<MetricMap, PgCollectError> {
        let metrics = TableMetrics::collect(&mut self.source)?;
        debug!(relations = metrics.len(), "normalized table statistics");
        Ok(metrics.to_metric_map())
    }

    /// Fetches metrics and writes one line per reportable value.
    ///
    /// Rate fields are reported per minute against the snapshot in `store`;
    /// the snapshot is then replaced with the current readings. On fetch
    /// failure nothing is written and the store is left untouched.
    pub fn output_values<W: Write>(
        &mut self,
        now: i64,
        store: &mut dyn SnapshotStore,
        out: &mut W,
    ) -> Result<usize, PluginError> {
        let metrics = self.fetch_metrics()?;

        let previous = match store.load() {
            Ok(previous) => previous,
            Err(e) => {
                warn!("ignoring previous snapshot: {}", e);
                None
            }
        };
        let rates = match &previous {
            Some(prev) => PerMinuteRate::between(prev.timestamp, now),
            None => PerMinuteRate::new(0.0),
        };
        if previous.is_some() && !rates.in_range() {
            warn!(
                elapsed = rates.elapsed_secs(),
                "previous snapshot is too old or from the future, skipping rates"
            );
        }

        let (values, next) = evaluate(&self.graphs, &metrics, previous.as_ref(), &rates, now);

        for (key, value) in &values {
            writeln!(out, "{}.{}\t{:.6}\t{}", self.prefix, key, value, now)?;
        }
        out.flush()?;

        if let Err(e) = store.save(&next) {
            warn!("failed to save snapshot: {}", e);
        }

        Ok(values.len())
    }

    /// Writes the graph definitions for the agent.
    pub fn output_definitions<W: Write>(&self, out: &mut W) -> Result<(), PluginError> {
        let graphs = self
            .graphs
            .graphs()
            .iter()
            .map(|(name, graph)| (format!("{}.{}", self.prefix, name), graph))
            .collect();
        let meta = PluginMeta { graphs };

        writeln!(out, "{}", PLUGIN_META_HEADER)?;
        serde_json::to_writer(&mut *out, &meta)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct PluginMeta<'a> {
    graphs: BTreeMap<String, &'a Graph>,
}

/// Decides the reported value of every key and the snapshot to keep.
///
/// Gauges pass through. Rate fields go through `rates` and are skipped when
/// it yields `None`; their raw readings always go into the next snapshot.
/// Keys no graph claims are dropped.
pub fn evaluate(
    graphs: &GraphDefinition,
    metrics: &MetricMap,
    previous: Option<&Snapshot>,
    rates: &dyn RateCalculator,
    now: i64,
) -> (Vec<(String, f64)>, Snapshot) {
    let mut values = Vec::with_capacity(metrics.len());
    let mut next = Snapshot::new(now);

    for (key, &value) in metrics {
        let Some(def) = graphs.lookup(key) else {
            debug!(key = %key, "no graph for metric key, dropping");
            continue;
        };
        if !def.diff {
            values.push((key.clone(), value));
            continue;
        }

        next.values.insert(key.clone(), value);
        let prev = previous.and_then(|p| p.get(key));
        match rates.rate(value, prev) {
            Some(rate) => values.push((key.clone(), rate)),
            None => {
                if prev.is_some_and(|p| value < p) {
                    debug!(key = %key, "counter seems to be reset");
                }
            }
        }
    }

    (values, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::StatRow;
    use crate::collector::mock::MockStatSource;
    use crate::rates::CounterDelta;
    use crate::state::MemorySnapshotStore;

    fn orders(seq_scan: i64, n_live_tup: i64) -> StatRow {
        StatRow {
            seq_scan,
            n_live_tup,
            ..StatRow::new("orders")
        }
    }

    fn plugin(rows: Vec<StatRow>) -> Plugin<MockStatSource> {
        Plugin::new("postgres", MockStatSource::new(rows))
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn fetch_metrics_returns_flat_map() {
        let mut plugin = plugin(vec![orders(5, 100)]);
        let map = plugin.fetch_metrics().unwrap();
        assert_eq!(map.len(), 14);
        assert_eq!(map["table.scan.orders.seq_scan"], 5.0);
        assert_eq!(plugin.metric_key_prefix(), "postgres");
        assert_eq!(plugin.graph_definition().graphs().len(), 4);
    }

    #[test]
    fn fetch_error_writes_nothing() {
        let err = PgCollectError::ConnectionError(Box::new(std::io::Error::other("down")));
        let mut plugin = Plugin::new("postgres", MockStatSource::failing(vec![orders(1, 1)], err));
        let mut store = MemorySnapshotStore::new();
        let mut out = Vec::new();

        let result = plugin.output_values(1_000, &mut store, &mut out);

        assert!(matches!(result, Err(PluginError::Collect(_))));
        assert!(out.is_empty());
        assert!(store.snapshot().is_none());
    }

    /// Writer whose output pipe has gone away.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    /// Accepts writes but fails to flush them.
    #[derive(Default)]
    struct FailingFlush {
        buf: Vec<u8>,
    }

    impl Write for FailingFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buf.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn write_failure_is_io_error_and_keeps_snapshot() {
        let mut plugin = plugin(vec![orders(5, 100)]);
        let mut store = MemorySnapshotStore::new();

        let result = plugin.output_values(1_000, &mut store, &mut ClosedPipe);

        assert!(matches!(result, Err(PluginError::Io(_))));
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn flush_failure_is_io_error() {
        let mut plugin = plugin(vec![orders(5, 100)]);
        let mut store = MemorySnapshotStore::new();
        let mut out = FailingFlush::default();

        let result = plugin.output_values(1_000, &mut store, &mut out);
        assert!(matches!(result, Err(PluginError::Io(_))));
        assert!(!out.buf.is_empty());
        assert!(store.snapshot().is_none());

        let result = plugin.output_definitions(&mut FailingFlush::default());
        assert!(matches!(result, Err(PluginError::Io(_))));
    }

    #[test]
    fn first_run_emits_only_gauges() {
        let mut plugin = plugin(vec![orders(5, 100)]);
        let mut store = MemorySnapshotStore::new();
        let mut out = Vec::new();

        let written = plugin.output_values(1_000, &mut store, &mut out).unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            lines(&out),
            vec![
                "postgres.table.row.orders.n_dead_tup\t0.000000\t1000",
                "postgres.table.row.orders.n_live_tup\t100.000000\t1000",
            ]
        );
        let saved = store.snapshot().unwrap();
        assert_eq!(saved.timestamp, 1_000);
        assert_eq!(saved.values.len(), 12);
        assert_eq!(saved.get("table.scan.orders.seq_scan"), Some(5.0));
        assert_eq!(saved.get("table.row.orders.n_live_tup"), None);
    }

    #[test]
    fn second_run_reports_per_minute_rates() {
        let mut previous = Snapshot::new(1_000);
        previous
            .values
            .insert("table.scan.orders.seq_scan".to_string(), 5.0);
        let mut store = MemorySnapshotStore::with_snapshot(previous);

        let mut plugin = plugin(vec![orders(35, 100)]);
        let mut out = Vec::new();
        plugin.output_values(1_060, &mut store, &mut out).unwrap();

        let out = lines(&out);
        assert!(out.contains(&"postgres.table.scan.orders.seq_scan\t30.000000\t1060".to_string()));
        assert!(!out.iter().any(|l| l.contains("idx_scan")));
        assert_eq!(store.snapshot().unwrap().timestamp, 1_060);
    }

    #[test]
    fn counter_reset_is_skipped() {
        let mut previous = Snapshot::new(1_000);
        previous
            .values
            .insert("table.scan.orders.seq_scan".to_string(), 500.0);
        let mut store = MemorySnapshotStore::with_snapshot(previous);

        let mut plugin = plugin(vec![orders(3, 100)]);
        let mut out = Vec::new();
        plugin.output_values(1_060, &mut store, &mut out).unwrap();

        assert!(!lines(&out).iter().any(|l| l.contains("seq_scan")));
        assert_eq!(
            store.snapshot().unwrap().get("table.scan.orders.seq_scan"),
            Some(3.0)
        );
    }

    #[test]
    fn stale_snapshot_skips_rates() {
        let mut previous = Snapshot::new(1_000);
        previous
            .values
            .insert("table.scan.orders.seq_scan".to_string(), 1.0);
        let mut store = MemorySnapshotStore::with_snapshot(previous);

        let mut plugin = plugin(vec![orders(2, 100)]);
        let mut out = Vec::new();
        let written = plugin.output_values(1_000 + 3_600, &mut store, &mut out).unwrap();

        assert_eq!(written, 2);
    }

    #[test]
    fn evaluate_with_pluggable_calculator() {
        let graphs = GraphDefinition::new("postgres");
        let metrics = TableMetrics::from_rows(&[orders(10, 4)]).to_metric_map();
        let mut previous = Snapshot::new(0);
        previous
            .values
            .insert("table.scan.orders.seq_scan".to_string(), 4.0);

        let (values, next) = evaluate(&graphs, &metrics, Some(&previous), &CounterDelta, 99);

        assert!(values.contains(&("table.scan.orders.seq_scan".to_string(), 6.0)));
        assert!(values.contains(&("table.row.orders.n_live_tup".to_string(), 4.0)));
        assert_eq!(values.len(), 3);
        assert_eq!(next.timestamp, 99);
    }

    #[test]
    fn evaluate_drops_unclaimed_keys() {
        let graphs = GraphDefinition::new("postgres");
        let mut metrics = MetricMap::new();
        metrics.insert("table.bogus.orders.x".to_string(), 1.0);

        let (values, next) = evaluate(&graphs, &metrics, None, &CounterDelta, 0);
        assert!(values.is_empty());
        assert!(next.values.is_empty());
    }

    #[test]
    fn definitions_output() {
        let plugin = Plugin::new("pg-main", MockStatSource::new(Vec::new()));
        let mut out = Vec::new();
        plugin.output_definitions(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let (header, body) = text.split_once('\n').unwrap();
        assert_eq!(header, PLUGIN_META_HEADER);

        let json: serde_json::Value = serde_json::from_str(body.trim()).unwrap();
        let scan = &json["graphs"]["pg-main.table.scan.#"];
        assert_eq!(scan["label"], "Pg-Main Table Scans");
        assert_eq!(scan["unit"], "integer");
        assert_eq!(scan["metrics"].as_array().unwrap().len(), 4);
        assert_eq!(json["graphs"].as_object().unwrap().len(), 4);
    }
}
