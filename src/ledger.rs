//! Applied-migration ledger.
//!
//! A table inside the target database recording which migrations have been
//! committed. A row exists if and only if every statement of the
//! corresponding script was durably committed: [`mark_applied`] is always
//! executed inside the same transaction as the migration body.

use crate::error::{IftttwhError, Result};
use rusqlite::{Connection, params};

/// Ledger table name, persisted state. The schema must stay compatible:
/// auto-incrementing id, unique non-null name, timestamp defaulting to now.
pub const LEDGER_TABLE: &str = "schema_migrations";

/// Create the ledger table if it does not exist. Safe to call on every
/// startup.
///
/// # Errors
///
/// Returns [`IftttwhError::Ledger`] if the table cannot be created.
pub fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )"
    ))
    .map_err(IftttwhError::ledger)
}

/// Check whether a migration name has been recorded as applied.
///
/// # Errors
///
/// Returns [`IftttwhError::Ledger`] if the ledger cannot be read.
pub fn is_applied(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {LEDGER_TABLE} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )
        .map_err(IftttwhError::ledger)?;
    Ok(count > 0)
}

/// Record a migration as applied.
///
/// Must be called on the migration's own transaction so the record commits
/// atomically with the migration body. A rerun is a no-op at the orchestrator
/// level, never a second record; the unique constraint backs that up.
///
/// # Errors
///
/// Returns [`IftttwhError::Ledger`] if the insert fails.
pub fn mark_applied(conn: &Connection, name: &str) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {LEDGER_TABLE} (name) VALUES (?1)"),
        params![name],
    )
    .map_err(IftttwhError::ledger)?;
    Ok(())
}

/// List applied migration names in application order.
///
/// # Errors
///
/// Returns [`IftttwhError::Ledger`] if the ledger cannot be read.
pub fn applied_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("SELECT name FROM {LEDGER_TABLE} ORDER BY id"))
        .map_err(IftttwhError::ledger)?;
    let names = stmt
        .query_map([], |row| row.get(0))
        .map_err(IftttwhError::ledger)?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(IftttwhError::ledger)?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let conn = memory_conn();
        ensure_table(&conn).unwrap();
        ensure_table(&conn).unwrap();
        assert!(applied_names(&conn).unwrap().is_empty());
    }

    #[test]
    fn mark_and_check() {
        let conn = memory_conn();
        ensure_table(&conn).unwrap();

        assert!(!is_applied(&conn, "001_create_tweets").unwrap());
        mark_applied(&conn, "001_create_tweets").unwrap();
        assert!(is_applied(&conn, "001_create_tweets").unwrap());
    }

    #[test]
    fn duplicate_mark_is_rejected_by_unique_constraint() {
        let conn = memory_conn();
        ensure_table(&conn).unwrap();

        mark_applied(&conn, "001_create_tweets").unwrap();
        let err = mark_applied(&conn, "001_create_tweets").unwrap_err();
        assert!(matches!(err, IftttwhError::Ledger { .. }));
    }

    #[test]
    fn applied_names_in_application_order() {
        let conn = memory_conn();
        ensure_table(&conn).unwrap();

        mark_applied(&conn, "002_b").unwrap();
        mark_applied(&conn, "001_a").unwrap();
        assert_eq!(applied_names(&conn).unwrap(), vec!["002_b", "001_a"]);
    }

    #[test]
    fn missing_table_reads_are_ledger_errors() {
        let conn = memory_conn();
        let err = is_applied(&conn, "anything").unwrap_err();
        assert!(matches!(err, IftttwhError::Ledger { .. }));
    }
}
