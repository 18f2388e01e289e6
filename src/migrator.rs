//! Migration orchestrator.
//!
//! Composes the script repository, ledger, snapshot manager, and executor:
//! discover scripts, compute the pending set (discovered minus ledger
//! entries, in discovery order), then for each pending script snapshot the
//! database and apply it. Stops at the first failure without restoring the
//! snapshot (restoration is a documented operator step) and without
//! attempting later scripts, since those may assume the failed one
//! succeeded.
//!
//! Single-process model: the orchestrator assumes it is the only writer of
//! the database file for the duration of a run. No cross-migration
//! transaction exists; each script succeeds or fails independently.

use crate::error::Result;
use crate::executor;
use crate::ledger;
use crate::scripts;
use crate::snapshot;
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use crate::executor::Applied;

/// Why a run ended after the listed applied migrations.
#[derive(Debug)]
pub struct MigrationFailure {
    /// Name of the migration that failed.
    pub name: String,
    /// Pre-migration snapshot left on disk for manual recovery, when the
    /// snapshot itself succeeded.
    pub snapshot: Option<PathBuf>,
    /// Underlying cause, bubbled up unmodified.
    pub cause: crate::error::IftttwhError,
}

/// Aggregated outcome of one orchestrator run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Successfully applied migrations, in order.
    pub applied: Vec<Applied>,
    /// Set when the run ended in the failed state; prior applied migrations
    /// stay intact and recorded.
    pub failure: Option<MigrationFailure>,
}

impl MigrationReport {
    /// Whether the run reached the done state (including "nothing pending").
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Migration engine entry point: owns the database path and the script
/// directory, nothing else. State is passed explicitly between components.
#[derive(Debug, Clone)]
pub struct Migrator {
    db_path: PathBuf,
    scripts_dir: PathBuf,
}

impl Migrator {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    /// Run all pending migrations.
    ///
    /// A missing database file is "nothing to migrate yet" (bootstrap
    /// creates a fresh schema later), reported as success with zero applied.
    /// Per-migration snapshot or execution failures end the run and are
    /// reported in the returned [`MigrationReport`]; the caller decides
    /// whether that is fatal.
    ///
    /// # Errors
    ///
    /// Returns an error only for conditions that abort before any mutation:
    /// a bad script directory ([`crate::error::IftttwhError::Discovery`]) or
    /// an unusable ledger ([`crate::error::IftttwhError::Ledger`]).
    pub fn run(&self) -> Result<MigrationReport> {
        if !self.db_path.exists() {
            info!(
                "Database {} does not exist yet, nothing to migrate",
                self.db_path.display()
            );
            return Ok(MigrationReport::default());
        }

        // Discovering
        let discovered = scripts::discover(&self.scripts_dir)?;
        info!(
            "Discovered {} migration script(s) in {}",
            discovered.len(),
            self.scripts_dir.display()
        );

        // Planning
        let mut conn = Connection::open(&self.db_path)?;
        // Snapshots copy the main database file, so commits must land there
        // directly rather than in a WAL sidecar. Switching the journal mode
        // checkpoints and removes any existing WAL.
        conn.pragma_update(None, "journal_mode", "DELETE")?;
        ledger::ensure_table(&conn)?;
        let applied: HashSet<String> = ledger::applied_names(&conn)?.into_iter().collect();
        let pending: Vec<_> = discovered
            .into_iter()
            .filter(|script| !applied.contains(&script.name))
            .collect();

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(MigrationReport::default());
        }

        // Applying(i)
        let mut report = MigrationReport::default();
        for script in pending {
            let backup = match snapshot::snapshot(&self.db_path, &script.name) {
                Ok(path) => path,
                Err(e) => {
                    // Without a snapshot the recovery contract is void;
                    // refuse to apply and stop here.
                    warn!("Snapshot failed for {}: {e}", script.name);
                    report.failure = Some(MigrationFailure {
                        name: script.name,
                        snapshot: None,
                        cause: e,
                    });
                    return Ok(report);
                }
            };

            match executor::apply(&mut conn, &script) {
                Ok(applied) => {
                    info!(
                        "Applied {} ({} row(s) changed)",
                        applied.name, applied.rows_changed
                    );
                    report.applied.push(applied);
                }
                Err(e) => {
                    warn!("Migration {} failed: {e}", script.name);
                    report.failure = Some(MigrationFailure {
                        name: script.name,
                        snapshot: Some(backup),
                        cause: e,
                    });
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }

    /// Restore the pre-migration snapshot for `migration_name` over the
    /// database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot file does not exist or the database
    /// cannot be overwritten.
    pub fn restore(&self, migration_name: &str) -> Result<PathBuf> {
        let backup = snapshot::snapshot_path(&self.db_path, migration_name);
        snapshot::restore(&backup, &self.db_path)?;
        Ok(backup)
    }

    /// The database file this migrator operates on.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
