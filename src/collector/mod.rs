//! PostgreSQL table statistics collector.
//!
//! Opens one connection per run, issues the `pg_stat_user_tables` query
//! (optionally suffixed with a caller-supplied fragment) and streams the
//! result rows to a sink. The connection is closed before returning, on
//! success and on query failure alike.

pub mod mock;
mod queries;
mod stat_row;

pub use queries::{STAT_USER_TABLES_QUERY, build_stat_user_tables_query};
pub use stat_row::StatRow;

use postgres::Client;
use postgres::NoTls;
use postgres::fallible_iterator::FallibleIterator;
use postgres_native_tls::MakeTlsConnector;
use tracing::debug;

use crate::config::ConnectionConfig;

/// Error type for PostgreSQL collection.
#[derive(Debug)]
pub enum PgCollectError {
    /// Building the connection, connecting or the TLS handshake failed.
    ConnectionError(Box<dyn std::error::Error + Send + Sync>),
    /// The statistics query or reading one of its rows failed.
    QueryError(postgres::Error),
}

impl std::fmt::Display for PgCollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PgCollectError::ConnectionError(e) => match e.downcast_ref::<postgres::Error>() {
                Some(pg) => write!(f, "PostgreSQL: {}", format_postgres_error(pg)),
                None => write!(f, "PostgreSQL: {}", e),
            },
            PgCollectError::QueryError(e) => {
                write!(f, "PostgreSQL query error: {}", format_postgres_error(e))
            }
        }
    }
}

impl std::error::Error for PgCollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PgCollectError::ConnectionError(e) => Some(e.as_ref()),
            PgCollectError::QueryError(e) => Some(e),
        }
    }
}

/// Source of table statistics rows.
///
/// Rows are handed to `sink` one at a time as they are read. Returns the
/// number of rows delivered.
pub trait StatSource {
    fn collect_rows(&mut self, sink: &mut dyn FnMut(StatRow)) -> Result<usize, PgCollectError>;
}

/// Collector backed by a live PostgreSQL connection.
pub struct PostgresCollector {
    config: ConnectionConfig,
}

impl PostgresCollector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Returns the full statistics query for this configuration.
    pub fn query(&self) -> String {
        build_stat_user_tables_query(self.config.option())
    }

    fn connect(&self) -> Result<Client, PgCollectError> {
        let connection_string = self.config.connection_string();
        debug!(
            host = self.config.host(),
            port = self.config.port(),
            database = self.config.database(),
            sslmode = self.config.sslmode(),
            "connecting to PostgreSQL"
        );

        let result = if self.config.tls_disabled() {
            Client::connect(&connection_string, NoTls)
        } else {
            // libpq semantics: require/prefer encrypt without verifying the peer.
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| PgCollectError::ConnectionError(Box::new(e)))?;
            Client::connect(&connection_string, MakeTlsConnector::new(connector))
        };

        result.map_err(|e| PgCollectError::ConnectionError(Box::new(e)))
    }
}

impl StatSource for PostgresCollector {
    fn collect_rows(&mut self, sink: &mut dyn FnMut(StatRow)) -> Result<usize, PgCollectError> {
        let mut client = self.connect()?;
        let query = self.query();
        debug!(query = %query, "querying table statistics");

        let result = stream_rows(&mut client, &query, sink);

        if let Err(e) = client.close() {
            debug!("closing PostgreSQL connection failed: {}", format_postgres_error(&e));
        }

        let count = result.map_err(PgCollectError::QueryError)?;
        debug!(rows = count, "table statistics collected");
        Ok(count)
    }
}

/// Drains the query cursor, mapping each row as it arrives.
fn stream_rows(
    client: &mut Client,
    query: &str,
    sink: &mut dyn FnMut(StatRow),
) -> Result<usize, postgres::Error> {
    let mut rows = client.query_raw(query, std::iter::empty::<i32>())?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        sink(StatRow::from_row(&row)?);
        count += 1;
    }
    Ok(count)
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}
