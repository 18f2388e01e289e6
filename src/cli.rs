//! CLI definitions for iftttwh.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// iftttwh - IFTTT Twitter webhook receiver and archive
#[derive(Parser, Debug)]
#[command(name = "iftttwh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Receive IFTTT Twitter webhooks into a local SQLite archive")]
#[command(long_about = r#"
iftttwh - A small server and CLI for capturing tweets delivered by IFTTT
webhooks into a local SQLite archive.

Features:
  - HMAC-SHA256 signed webhook ingestion
  - Versioned schema migrations with pre-migration backups
  - Keyword and semantic search over the archive
  - CSV import/export for seeding and dumps
  - JSON and human-readable output formats

Quick start:
  1. Point an IFTTT "New tweet" webhook at POST /ifttt/twitter
  2. Run: iftttwh serve
  3. Search: iftttwh search "your query"
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, env = "IFTTTWH_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Directory containing migration scripts
    #[arg(long, env = "IFTTTWH_MIGRATIONS", global = true)]
    pub migrations: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook server
    Serve(ServeArgs),

    /// Apply pending schema migrations
    Migrate,

    /// Restore the database from a migration's backup
    Restore(RestoreArgs),

    /// Import tweets from a CSV file
    Import(ImportArgs),

    /// Export tweets to a CSV file
    Export(ExportArgs),

    /// Show the most recent tweets
    Latest(LatestArgs),

    /// Search the archive
    Search(SearchArgs),

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long, env = "IFTTTWH_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, short = 'p', env = "IFTTTWH_PORT")]
    pub port: Option<u16>,

    /// CSV file to seed the database from at startup
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Require a valid X-Signature on webhook posts
    #[arg(long)]
    pub require_signature: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Name of the migration whose backup to restore (e.g. 002_add_unique_constraint)
    pub migration_name: String,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// CSV file to import
    pub csv: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path
    #[arg(long, short = 'o')]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct LatestArgs {
    /// Maximum number of results
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query (prefix with "from:" to match a user name)
    pub query: String,

    /// Maximum number of results
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,

    /// Rank by embedding similarity instead of keyword match
    #[arg(long, short = 's')]
    pub semantic: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}
