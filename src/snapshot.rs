//! Database snapshot manager.
//!
//! Copies the database file to a uniquely named backup before a migration
//! risks a mutation, and restores from a named backup on request. The copy
//! is a full file-level copy, capturing the database exactly as it sits on
//! disk (single-process deployment; no concurrent writers during backup).
//!
//! Copies are written to a `.tmp` sibling and renamed into place, so a
//! process killed mid-copy can never leave a partial file that looks like a
//! valid backup. Retention is an operator concern; nothing is pruned here.

use crate::error::{IftttwhError, Result};
use std::path::{Path, PathBuf};

/// Compute the backup path for a migration:
/// `<basename>_<migration_name>.<ext>` in the source's directory.
#[must_use]
pub fn snapshot_path(source: &Path, migration_name: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database");
    let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("db");
    let file_name = format!("{stem}_{migration_name}.{ext}");
    source.with_file_name(file_name)
}

/// Snapshot `source` before applying `migration_name`.
///
/// Returns the backup path. Any stale partial copy from an earlier
/// interrupted run is discarded first.
///
/// # Errors
///
/// Returns [`IftttwhError::Snapshot`] if the source is missing or unreadable,
/// or the destination is not writable.
pub fn snapshot(source: &Path, migration_name: &str) -> Result<PathBuf> {
    let backup = snapshot_path(source, migration_name);
    copy_via_rename(source, &backup).map_err(|e| IftttwhError::snapshot(migration_name, e))?;
    Ok(backup)
}

/// Overwrite `target` with the bytes of `backup`.
///
/// The manual recovery step after a failed migration: copy the
/// pre-migration snapshot back over the database file.
///
/// # Errors
///
/// Returns [`IftttwhError::Path`] if the backup is missing or the target
/// cannot be written.
pub fn restore(backup: &Path, target: &Path) -> Result<()> {
    copy_via_rename(backup, target)
        .map_err(|e| IftttwhError::path_error("restore snapshot to", target, e))?;

    // Stale WAL/SHM sidecars from a previous server process would be
    // replayed into the restored file. Drop them.
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = target.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)
                .map_err(|e| IftttwhError::path_error("remove sidecar of", target, e))?;
        }
    }
    Ok(())
}

/// Full file copy with a temp-file-then-rename commit point.
fn copy_via_rename(source: &Path, dest: &Path) -> std::io::Result<()> {
    if !source.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source file '{}' does not exist", source.display()),
        ));
    }

    let tmp = dest.with_extension("tmp");
    if tmp.exists() {
        std::fs::remove_file(&tmp)?;
    }
    std::fs::copy(source, &tmp)?;
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn snapshot_path_naming() {
        let path = snapshot_path(Path::new("/data/tweets.db"), "002_add_unique_constraint");
        assert_eq!(
            path,
            PathBuf::from("/data/tweets_002_add_unique_constraint.db")
        );
    }

    #[test]
    fn snapshot_copies_bytes_exactly() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tweets.db");
        std::fs::write(&db, b"binary\x00contents\xff").unwrap();

        let backup = snapshot(&db, "001_create_tweets").unwrap();
        assert_eq!(backup, dir.path().join("tweets_001_create_tweets.db"));
        assert_eq!(
            std::fs::read(&backup).unwrap(),
            std::fs::read(&db).unwrap()
        );
    }

    #[test]
    fn snapshot_of_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.db");
        let err = snapshot(&missing, "001_x").unwrap_err();
        assert!(matches!(err, IftttwhError::Snapshot { .. }));
    }

    #[test]
    fn restore_overwrites_target() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tweets.db");
        std::fs::write(&db, b"before").unwrap();

        let backup = snapshot(&db, "001_x").unwrap();
        std::fs::write(&db, b"after: mangled by a failed migration").unwrap();

        restore(&backup, &db).unwrap();
        assert_eq!(std::fs::read(&db).unwrap(), b"before");
    }

    #[test]
    fn stale_partial_copy_is_discarded() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("tweets.db");
        std::fs::write(&db, b"good").unwrap();

        // Simulate a crash mid-copy from a previous run.
        let stale = dir.path().join("tweets_001_x.tmp");
        std::fs::write(&stale, b"partial").unwrap();

        let backup = snapshot(&db, "001_x").unwrap();
        assert_eq!(std::fs::read(&backup).unwrap(), b"good");
        assert!(!stale.exists());
    }
}
