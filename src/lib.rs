//! pgtable-metrics - PostgreSQL table statistics plugin library.
//!
//! Reads `pg_stat_user_tables` once per run and republishes every table's
//! activity counters as flat, namespaced metrics for a monitoring agent:
//! - `collector` - connection and the statistics query
//! - `metrics` - per-table normalization and key construction
//! - `graph` - static graph definitions
//! - `plugin` - agent-facing output, with `rates` and `state` for counters

pub mod collector;
pub mod config;
pub mod graph;
pub mod metrics;
pub mod plugin;
pub mod rates;
pub mod state;
