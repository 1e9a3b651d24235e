//! SQLite schema for the cached-values store.
//!
//! One table holds every namespace: flag values, field-trial parameter
//! values, safe-mode snapshot copies and safe-mode bookkeeping. The `kind`
//! column guards reads against cross-kind reuse of a key.

/// DDL for the cached-values table.
///
/// Schema version: 1
pub(crate) const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cached_values (
    key        TEXT PRIMARY KEY,
    kind       TEXT NOT NULL,
    int_value  INTEGER,
    text_value TEXT
);
"#;

/// Booleans, stored as 0/1 in `int_value`.
pub(crate) const KIND_BOOL: &str = "bool";
/// 32-bit integers, stored in `int_value`.
pub(crate) const KIND_INT: &str = "int";
/// 64-bit integers, stored in `int_value`. Doubles travel as their raw
/// IEEE-754 bit pattern under this kind.
pub(crate) const KIND_LONG: &str = "long";
/// UTF-8 strings in `text_value`. Parameter maps travel as one JSON object
/// string under this kind.
pub(crate) const KIND_STRING: &str = "string";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CACHE_SCHEMA).unwrap();
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CACHE_SCHEMA).unwrap();
        conn.execute_batch(CACHE_SCHEMA).unwrap();
    }
}
