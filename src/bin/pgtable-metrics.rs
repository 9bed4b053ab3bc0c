//! pgtable-metrics - PostgreSQL table statistics plugin.
//!
//! Prints per-table scan, row, vacuum and analyze metrics for a monitoring
//! agent, one `key\tvalue\ttimestamp` line each. With
//! `MACKEREL_AGENT_PLUGIN_META` set, prints the graph definitions instead.
//!
//! Usage:
//!   pgtable-metrics --database shop
//!   pgtable-metrics --database shop --option "WHERE schemaname = 'public'"
//!   MACKEREL_AGENT_PLUGIN_META=1 pgtable-metrics --metric-key-prefix pg

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use pgtable_metrics::config::{PASSWORD_ENV, RawConfig};
use pgtable_metrics::plugin::{PLUGIN_META_ENV, Plugin};
use pgtable_metrics::state::FileSnapshotStore;

/// PostgreSQL table statistics plugin.
#[derive(Parser)]
#[command(name = "pgtable-metrics", about = "PostgreSQL table statistics plugin", version)]
struct Args {
    /// Hostname.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port.
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// Username.
    #[arg(long, default_value = "postgres")]
    user: String,

    /// Password. Falls back to $PGPASSWORD.
    #[arg(long)]
    password: Option<String>,

    /// Database.
    #[arg(long, default_value = "")]
    database: String,

    /// Query option appended to the statistics query (e.g. "WHERE ...").
    #[arg(long, default_value = "")]
    option: String,

    /// Whether or not to use SSL (disable, prefer, require).
    #[arg(long, default_value = "disable")]
    sslmode: String,

    /// Maximum wait for connection, in seconds.
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Server-side timeout for the statistics query, in seconds (0 = none).
    #[arg(long, default_value_t = 0)]
    query_timeout: u64,

    /// Metric key prefix.
    #[arg(long, default_value = "postgres")]
    metric_key_prefix: String,

    /// Temp file name for the previous counter values.
    /// Default: <tmpdir>/mackerel-plugin-<prefix>-table
    #[arg(long, value_name = "PATH")]
    tempfile: Option<PathBuf>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber on stderr; stdout carries metrics.
fn init_logging(verbose: u8, quiet: bool) {
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
    if let Ok(directive) = format!("pgtable_metrics={}", level).parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = RawConfig {
        host: args.host,
        port: args.port,
        user: args.user,
        password: args.password,
        database: args.database,
        option: args.option,
        sslmode: args.sslmode,
        connect_timeout: args.connect_timeout,
        query_timeout: args.query_timeout,
        prefix: args.metric_key_prefix,
    }
    .resolve(std::env::var(PASSWORD_ENV).ok());

    let tempfile = args
        .tempfile
        .unwrap_or_else(|| FileSnapshotStore::default_path(config.prefix()));

    info!("pgtable-metrics {} starting", env!("CARGO_PKG_VERSION"));
    debug!(
        "Config: host={}, port={}, database={}, prefix={}, tempfile={}",
        config.host(),
        config.port(),
        config.database(),
        config.prefix(),
        tempfile.display()
    );

    let mut plugin = Plugin::from_config(config);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let meta_mode = std::env::var(PLUGIN_META_ENV).is_ok_and(|v| !v.is_empty());
    let result = if meta_mode {
        plugin.output_definitions(&mut out).map(|_| 0)
    } else {
        let mut store = FileSnapshotStore::new(tempfile);
        let now = chrono::Utc::now().timestamp();
        plugin.output_values(now, &mut store, &mut out)
    };

    let result = result.and_then(|written| {
        out.flush()?;
        Ok(written)
    });

    match result {
        Ok(written) => {
            debug!("{} values written", written);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
