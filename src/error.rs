//! Custom error types for iftttwh.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use colored::Colorize;
use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for iftttwh operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum IftttwhError {
    // =========================================================================
    // Migration Errors
    // =========================================================================
    /// Migration script directory missing or unreadable.
    /// Fatal: aborts before any mutation.
    #[error("Cannot discover migrations in '{path}': {reason}")]
    Discovery { path: PathBuf, reason: String },

    /// Pre-migration backup could not be made. The engine refuses to apply
    /// a migration without a successful snapshot.
    #[error("Failed to snapshot database for '{migration}': {source}")]
    Snapshot {
        migration: String,
        #[source]
        source: std::io::Error,
    },

    /// A migration statement failed. The whole transaction was rolled back;
    /// no partial schema or data changes survive.
    #[error("Migration '{migration}' failed: {source}")]
    Execution {
        migration: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The applied-migration ledger is unreadable or unwritable.
    /// Fatal: the pending set cannot be computed reliably.
    #[error("Migration ledger error: {source}")]
    Ledger {
        #[source]
        source: rusqlite::Error,
    },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database file not found where one was required.
    #[error("No database found at '{path}'. Run 'iftttwh serve' or 'iftttwh migrate' first.")]
    DatabaseNotFound { path: PathBuf },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // =========================================================================
    // Webhook / Payload Errors
    // =========================================================================
    /// The X-Signature header did not match the payload.
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    /// The webhook payload was not the expected IFTTT JSON shape.
    #[error("Invalid webhook payload: {reason}")]
    InvalidPayload { reason: String },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    Path {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// CSV row could not be parsed.
    #[error("Failed to parse CSV row {row}: {reason}")]
    CsvParse { row: usize, reason: String },

    /// Requested item does not exist.
    #[error("{item_type} '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Wrapped anyhow error for the binary boundary.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for iftttwh operations.
pub type Result<T> = std::result::Result<T, IftttwhError>;

impl IftttwhError {
    /// Create a discovery error.
    pub fn discovery(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a snapshot error.
    pub fn snapshot(migration: impl Into<String>, source: std::io::Error) -> Self {
        Self::Snapshot {
            migration: migration.into(),
            source,
        }
    }

    /// Create an execution error.
    pub fn execution(migration: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Execution {
            migration: migration.into(),
            source,
        }
    }

    /// Create a ledger error.
    pub const fn ledger(source: rusqlite::Error) -> Self {
        Self::Ledger { source }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Path {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Check if this error aborted a migration run before any mutation.
    #[must_use]
    pub const fn is_pre_mutation(&self) -> bool {
        matches!(self, Self::Discovery { .. } | Self::Ledger { .. })
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Discovery { .. } => {
                Some("Check the migrations directory path (paths.migrations or --migrations).")
            }
            Self::Execution { .. } => Some(
                "The pre-migration snapshot is still on disk. Restore it with 'iftttwh restore <migration-name>' before retrying.",
            ),
            Self::DatabaseNotFound { .. } => {
                Some("Run 'iftttwh serve' once to bootstrap the database.")
            }
            Self::InvalidSignature => {
                Some("Verify the shared secret on both the IFTTT applet and this server.")
            }
            _ => None,
        }
    }
}

/// Format an error for terminal display, including its suggestion when
/// one exists.
#[must_use]
pub fn format_error(err: &IftttwhError) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), err);

    if let Some(hint) = err.suggestion() {
        let _ = write!(output, "\n   {} {}", "Hint:".cyan(), hint);
    }

    output
}
