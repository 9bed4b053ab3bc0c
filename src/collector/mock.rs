//! In-memory stat source for testing without a PostgreSQL server.

use super::{PgCollectError, StatRow, StatSource};

/// Replays a fixed set of rows, or fails with a pre-built error.
pub struct MockStatSource {
    rows: Vec<StatRow>,
    error: Option<PgCollectError>,
}

impl MockStatSource {
    pub fn new(rows: Vec<StatRow>) -> Self {
        Self { rows, error: None }
    }

    /// Source that fails on the next collection, after delivering `rows`.
    pub fn failing(rows: Vec<StatRow>, error: PgCollectError) -> Self {
        Self {
            rows,
            error: Some(error),
        }
    }
}

impl StatSource for MockStatSource {
    fn collect_rows(&mut self, sink: &mut dyn FnMut(StatRow)) -> Result<usize, PgCollectError> {
        for row in &self.rows {
            sink(row.clone());
        }
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self.rows.len()),
        }
    }
}
