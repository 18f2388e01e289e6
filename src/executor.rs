//! Migration executor.
//!
//! Applies one migration script inside a single transaction. This is the
//! only place atomicity is guaranteed: every statement runs in file order,
//! the ledger insert is the final statement of the same transaction, and any
//! failure rolls the entire unit back. Never auto-commit per statement.

use crate::error::{IftttwhError, Result};
use crate::ledger;
use crate::scripts::MigrationScript;
use rusqlite::Connection;
use tracing::debug;

/// Result of a successful application.
#[derive(Debug, Clone)]
pub struct Applied {
    /// Migration name, as recorded in the ledger.
    pub name: String,
    /// Total rows changed by the script's statements (e.g. the number of
    /// duplicate rows a de-duplication migration removed).
    pub rows_changed: usize,
}

/// Apply `script` on `conn`: one transaction, all statements, ledger record,
/// commit.
///
/// # Errors
///
/// Returns [`IftttwhError::Execution`] if any statement fails; the
/// transaction is rolled back and neither data nor ledger are modified.
/// Returns [`IftttwhError::Ledger`] if the ledger insert itself fails
/// (also rolled back).
pub fn apply(conn: &mut Connection, script: &MigrationScript) -> Result<Applied> {
    let tx = conn
        .transaction()
        .map_err(|e| IftttwhError::execution(&script.name, e))?;

    let mut rows_changed = 0;
    for statement in &script.statements {
        debug!(migration = %script.name, "executing: {}", statement);
        let changed = tx
            .execute(statement, [])
            .map_err(|e| IftttwhError::execution(&script.name, e))?;
        // sqlite3_changes() is left stale by DDL, so a CREATE INDEX after a
        // DELETE would re-report the delete's count. Only row-modifying
        // statements contribute.
        if modifies_rows(statement) {
            rows_changed += changed;
        }
    }

    // Final statement of the same atomic unit: the ledger record exists
    // iff the migration body committed.
    ledger::mark_applied(&tx, &script.name)?;

    tx.commit()
        .map_err(|e| IftttwhError::execution(&script.name, e))?;

    Ok(Applied {
        name: script.name.clone(),
        rows_changed,
    })
}

/// Whether a statement's `sqlite3_changes()` result is meaningful.
fn modifies_rows(statement: &str) -> bool {
    leading_keyword(statement).is_some_and(|kw| {
        kw.eq_ignore_ascii_case("INSERT")
            || kw.eq_ignore_ascii_case("UPDATE")
            || kw.eq_ignore_ascii_case("DELETE")
            || kw.eq_ignore_ascii_case("REPLACE")
    })
}

/// First keyword of a statement, skipping leading whitespace and comments.
fn leading_keyword(statement: &str) -> Option<&str> {
    let mut rest = statement;
    loop {
        rest = rest.trim_start();
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}
