//! Migration script repository.
//!
//! Enumerates migration files in a directory, parses the ordering key from
//! each filename, and returns them in a deterministic order. Recognized
//! files match `<numeric-prefix>_<slug>.sql` (e.g. `001_create_tweets.sql`);
//! everything else in the directory is ignored.

use crate::error::{IftttwhError, Result};
use crate::sql::split_statements;
use std::path::{Path, PathBuf};

/// A versioned, named unit of schema/data change, read from disk.
///
/// Immutable once created: the repository never mutates or deletes scripts.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    /// Numeric ordering key parsed from the filename prefix.
    pub ordinal: u64,
    /// Migration name: the filename without the `.sql` extension.
    /// This is the identity recorded in the ledger.
    pub name: String,
    /// Absolute-ish path the script was read from.
    pub path: PathBuf,
    /// Ordered SQL statements, split per the grammar in [`crate::sql`].
    pub statements: Vec<String>,
}

/// Discover migration scripts in `dir`, ordered by numeric prefix ascending
/// with ties broken by filename.
///
/// # Errors
///
/// Returns [`IftttwhError::Discovery`] if the directory does not exist or
/// cannot be read, or if a recognized script file cannot be read.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<MigrationScript>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(IftttwhError::discovery(dir, "directory does not exist"));
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| IftttwhError::discovery(dir, e.to_string()))?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IftttwhError::discovery(dir, e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(ToString::to_string)
        else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }
        let Some(ordinal) = parse_ordinal(&name) else {
            continue;
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            IftttwhError::discovery(dir, format!("cannot read '{}': {e}", path.display()))
        })?;

        scripts.push(MigrationScript {
            ordinal,
            name,
            path,
            statements: split_statements(&content),
        });
    }

    scripts.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));
    Ok(scripts)
}

/// Parse the numeric prefix of a `NNN_slug` migration name.
///
/// Requires at least one digit followed by an underscore.
fn parse_ordinal(name: &str) -> Option<u64> {
    let (prefix, _) = name.split_once('_')?;
    if prefix.is_empty() {
        return None;
    }
    prefix.parse().ok()
}
