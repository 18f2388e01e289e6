//! iftttwh - IFTTT Twitter webhook receiver and archive
//!
//! This library provides the core functionality for receiving IFTTT webhook
//! deliveries of tweets, storing them in `SQLite`, and searching the archive.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`error`] - Custom error types with rich context
//! - [`migrator`] - Migration orchestrator with pre-migration backups
//! - [`model`] - Tweet and webhook payload models
//! - [`server`] - Axum HTTP server for webhook ingestion and queries
//! - [`storage`] - `SQLite` storage layer

pub mod cli;
pub mod config;
pub mod csv_io;
pub mod date_parser;
pub mod embedder;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod migrator;
pub mod model;
pub mod scripts;
pub mod server;
pub mod snapshot;
pub mod sql;
pub mod storage;

pub use cli::*;
pub use config::Config;
pub use error::{IftttwhError, Result, format_error};
pub use migrator::{MigrationReport, Migrator};
pub use model::*;
pub use storage::Storage;

/// Default database filename
pub const DEFAULT_DB_NAME: &str = "tweets.db";

/// Default migrations directory name
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Standard width for content dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for iftttwh
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("iftttwh")
}

/// Get the default database path
#[must_use]
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Get the default migrations directory.
///
/// Prefers a `migrations/` directory in the current working directory when
/// one exists, falling back to the data directory.
#[must_use]
pub fn default_migrations_dir() -> std::path::PathBuf {
    let local = std::path::PathBuf::from(DEFAULT_MIGRATIONS_DIR);
    if local.is_dir() {
        local
    } else {
        default_data_dir().join(DEFAULT_MIGRATIONS_DIR)
    }
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Truncate text to a display width, appending an ellipsis when cut.
#[must_use]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let head: String = chars.iter().take(max_chars.saturating_sub(3)).collect();
    format!("{head}...")
}
