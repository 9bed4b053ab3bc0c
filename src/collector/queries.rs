//! SQL for the table statistics view.

/// Base statistics query.
///
/// Selects every column so that rows map leniently by name; the view gains
/// columns between major versions.
pub const STAT_USER_TABLES_QUERY: &str = "SELECT * FROM pg_stat_user_tables";

/// Builds the statistics query with an optional caller-supplied suffix.
///
/// The suffix (a `WHERE`/`ORDER BY` fragment) is appended verbatim after one
/// space. It is trusted and not validated.
pub fn build_stat_user_tables_query(option: Option<&str>) -> String {
    match option {
        Some(suffix) => format!("{} {}", STAT_USER_TABLES_QUERY, suffix),
        None => STAT_USER_TABLES_QUERY.to_string(),
    }
}
