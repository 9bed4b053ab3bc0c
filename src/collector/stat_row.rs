//! One row of `pg_stat_user_tables`.

use postgres::Row;
use postgres::types::Type;

/// Per-table activity counters.
///
/// Source: `pg_stat_user_tables`. Counters that come back NULL (for example
/// `idx_scan` on a table without indexes) stay at 0.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StatRow {
    /// Source: `pg_stat_user_tables.relname`
    pub relname: String,

    // scan
    pub seq_scan: i64,
    pub seq_tup_read: i64,
    pub idx_scan: i64,
    pub idx_tup_fetch: i64,

    // row
    pub n_tup_ins: i64,
    pub n_tup_upd: i64,
    pub n_tup_del: i64,
    pub n_tup_hot_upd: i64,
    /// Estimated live rows. Gauge, not a counter.
    pub n_live_tup: i64,
    /// Estimated dead rows. Gauge, not a counter.
    pub n_dead_tup: i64,

    // maintenance
    pub vacuum_count: i64,
    pub autovacuum_count: i64,
    pub analyze_count: i64,
    pub autoanalyze_count: i64,
}

impl StatRow {
    /// Creates an empty row for the given relation.
    pub fn new(relname: impl Into<String>) -> Self {
        Self {
            relname: relname.into(),
            ..Self::default()
        }
    }

    /// Assigns a counter by column name.
    ///
    /// Returns `false` when the column does not correspond to a counter field;
    /// such columns are ignored by the caller.
    pub fn set_counter(&mut self, column: &str, value: Option<i64>) -> bool {
        let slot = match column {
            "seq_scan" => &mut self.seq_scan,
            "seq_tup_read" => &mut self.seq_tup_read,
            "idx_scan" => &mut self.idx_scan,
            "idx_tup_fetch" => &mut self.idx_tup_fetch,
            "n_tup_ins" => &mut self.n_tup_ins,
            "n_tup_upd" => &mut self.n_tup_upd,
            "n_tup_del" => &mut self.n_tup_del,
            "n_tup_hot_upd" => &mut self.n_tup_hot_upd,
            "n_live_tup" => &mut self.n_live_tup,
            "n_dead_tup" => &mut self.n_dead_tup,
            "vacuum_count" => &mut self.vacuum_count,
            "autovacuum_count" => &mut self.autovacuum_count,
            "analyze_count" => &mut self.analyze_count,
            "autoanalyze_count" => &mut self.autoanalyze_count,
            _ => return false,
        };
        *slot = value.unwrap_or(0);
        true
    }

    /// Maps a result row onto the struct by column name.
    ///
    /// Unknown columns are skipped, missing ones keep their default. A known
    /// column whose type cannot be read as an integer is an error.
    pub fn from_row(row: &Row) -> Result<Self, postgres::Error> {
        let mut stat = StatRow::default();

        for (idx, column) in row.columns().iter().enumerate() {
            match classify_column(column.name(), column.type_()) {
                ColumnKind::Relname => {
                    let relname: Option<String> = row.try_get(idx)?;
                    stat.relname = relname.unwrap_or_default();
                }
                ColumnKind::Counter(width) => {
                    let value = width.read(row, idx)?;
                    stat.set_counter(column.name(), value);
                }
                ColumnKind::Ignored => {}
            }
        }

        Ok(stat)
    }
}

/// How a result column is read into a [`StatRow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Relname,
    Counter(IntWidth),
    Ignored,
}

/// Wire width of an integer counter column. All widths widen to `i64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IntWidth {
    Int2,
    Int4,
    Int8,
}

impl IntWidth {
    fn read(self, row: &Row, idx: usize) -> Result<Option<i64>, postgres::Error> {
        match self {
            IntWidth::Int2 => Ok(row.try_get::<_, Option<i16>>(idx)?.map(i64::from)),
            IntWidth::Int4 => Ok(row.try_get::<_, Option<i32>>(idx)?.map(i64::from)),
            IntWidth::Int8 => row.try_get::<_, Option<i64>>(idx),
        }
    }
}

/// Decides from a column's name and type how it is read.
///
/// Counter columns of any other type are read as int8 and fail there.
fn classify_column(name: &str, ty: &Type) -> ColumnKind {
    if name == "relname" {
        return ColumnKind::Relname;
    }
    if !is_counter_column(name) {
        return ColumnKind::Ignored;
    }
    let width = match *ty {
        Type::INT2 => IntWidth::Int2,
        Type::INT4 => IntWidth::Int4,
        _ => IntWidth::Int8,
    };
    ColumnKind::Counter(width)
}

fn is_counter_column(name: &str) -> bool {
    StatRow::default().set_counter(name, None)
}
