//! Configuration system for iftttwh.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/iftttwh/config.toml`
//! 3. **Environment variables** - `IFTTTWH_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5000
//!
//! [security]
//! require_signature = true
//!
//! [paths]
//! db = "~/.local/share/iftttwh/tweets.db"
//! migrations = "migrations"
//!
//! [search]
//! default_limit = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Main configuration structure for iftttwh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Webhook security configuration.
    pub security: SecurityConfig,
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Search behavior configuration.
    pub search: SearchConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    /// Environment variable: `IFTTTWH_HOST`
    pub host: String,

    /// Listen port.
    /// Environment variable: `IFTTTWH_PORT`
    pub port: u16,
}

/// Webhook security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret for HMAC-SHA256 signature verification.
    /// Environment variable: `IFTTTWH_SECRET` (or the legacy `WEBHOOK_SECRET`)
    pub secret_key: String,

    /// Reject webhook posts without a valid `X-Signature` header.
    pub require_signature: bool,
}

/// Path configuration for database, migrations, and CSV seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `IFTTTWH_DB`
    pub db: Option<PathBuf>,

    /// Directory holding `NNN_slug.sql` migration scripts.
    /// Environment variable: `IFTTTWH_MIGRATIONS`
    pub migrations: Option<PathBuf>,

    /// Optional CSV file loaded at startup when present.
    pub csv: Option<PathBuf>,
}

/// Search behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results to return.
    pub default_limit: usize,

    /// Maximum `limit` a request may ask for.
    pub max_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: "default_secret_key".to_string(),
            require_signature: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/iftttwh/config.toml)
    /// 3. Compiled defaults
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    #[must_use]
    pub fn load_from_file(path: &PathBuf) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("iftttwh").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("IFTTTWH_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("IFTTTWH_PORT") {
            if let Ok(n) = port.parse() {
                self.server.port = n;
            }
        }

        if let Ok(secret) =
            std::env::var("IFTTTWH_SECRET").or_else(|_| std::env::var("WEBHOOK_SECRET"))
        {
            self.security.secret_key = secret;
        }
        if std::env::var("IFTTTWH_REQUIRE_SIGNATURE").is_ok() {
            self.security.require_signature = true;
        }

        if let Ok(db) = std::env::var("IFTTTWH_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(migrations) = std::env::var("IFTTTWH_MIGRATIONS") {
            self.paths.migrations = Some(PathBuf::from(migrations));
        }
        if let Ok(csv) = std::env::var("IFTTTWH_CSV") {
            self.paths.csv = Some(PathBuf::from(csv));
        }

        if let Ok(limit) = std::env::var("IFTTTWH_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.search.default_limit = n;
            }
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        self.server.host = other.server.host;
        self.server.port = other.server.port;

        self.security.secret_key = other.security.secret_key;
        self.security.require_signature = other.security.require_signature;

        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }
        if other.paths.migrations.is_some() {
            self.paths.migrations = other.paths.migrations;
        }
        if other.paths.csv.is_some() {
            self.paths.csv = other.paths.csv;
        }

        self.search.default_limit = other.search.default_limit;
        self.search.max_limit = other.search.max_limit;
    }

    /// Get the database path, using defaults if not configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(crate::default_db_path)
    }

    /// Get the migrations directory, using defaults if not configured.
    #[must_use]
    pub fn migrations_dir(&self) -> PathBuf {
        self.paths
            .migrations
            .clone()
            .unwrap_or_else(crate::default_migrations_dir)
    }

    /// Clamp a requested result limit into the configured range.
    #[must_use]
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.search.default_limit)
            .clamp(1, self.search.max_limit)
    }
}
