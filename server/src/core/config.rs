use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, FACETS_DEFAULT_LIMIT, QUERY_DEFAULT_PER_PAGE,
    QUERY_MAX_PER_PAGE, SQLITE_BUSY_TIMEOUT_SECS, SQLITE_MAX_CONNECTIONS,
};

// =============================================================================
// Blob Storage Mode
// =============================================================================

/// Where blob bytes are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobStorageMode {
    /// Bytes live in the `blobs` table
    #[default]
    Database,
    /// Bytes live on disk; the table only records the checksum
    Filesystem,
    /// Bytes are written to both
    Both,
}

impl BlobStorageMode {
    pub fn uses_database(&self) -> bool {
        matches!(self, Self::Database | Self::Both)
    }

    pub fn uses_filesystem(&self) -> bool {
        matches!(self, Self::Filesystem | Self::Both)
    }
}

impl fmt::Display for BlobStorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobStorageMode::Database => write!(f, "database"),
            BlobStorageMode::Filesystem => write!(f, "filesystem"),
            BlobStorageMode::Both => write!(f, "both"),
        }
    }
}

// =============================================================================
// File Config (JSON)
// =============================================================================

/// Database configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    /// Explicit catalog database path (defaults to `<data_dir>/sqlite/catalog.db`)
    pub path: Option<String>,
    pub max_connections: Option<u32>,
    pub busy_timeout_secs: Option<u64>,
}

/// Blob storage configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BlobsFileConfig {
    pub storage: Option<BlobStorageMode>,
    /// Filesystem root for blobs (defaults to `<data_dir>/blobs`)
    pub path: Option<String>,
}

/// Facets configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FacetsFileConfig {
    pub default_limit: Option<i64>,
}

/// Query configuration section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueryFileConfig {
    pub default_per_page: Option<i64>,
    pub max_per_page: Option<i64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    pub blobs: Option<BlobsFileConfig>,
    pub facets: Option<FacetsFileConfig>,
    pub query: Option<QueryFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(database) = other.database {
            let current = self
                .database
                .get_or_insert_with(DatabaseFileConfig::default);
            if database.path.is_some() {
                tracing::trace!(path = ?database.path, "Merging database.path");
                current.path = database.path;
            }
            if database.max_connections.is_some() {
                tracing::trace!(
                    max_connections = ?database.max_connections,
                    "Merging database.max_connections"
                );
                current.max_connections = database.max_connections;
            }
            if database.busy_timeout_secs.is_some() {
                current.busy_timeout_secs = database.busy_timeout_secs;
            }
        }

        if let Some(blobs) = other.blobs {
            let current = self.blobs.get_or_insert_with(BlobsFileConfig::default);
            if blobs.storage.is_some() {
                tracing::trace!(storage = ?blobs.storage, "Merging blobs.storage");
                current.storage = blobs.storage;
            }
            if blobs.path.is_some() {
                tracing::trace!(path = ?blobs.path, "Merging blobs.path");
                current.path = blobs.path;
            }
        }

        if let Some(facets) = other.facets {
            let current = self.facets.get_or_insert_with(FacetsFileConfig::default);
            if facets.default_limit.is_some() {
                tracing::trace!(default_limit = ?facets.default_limit, "Merging facets.default_limit");
                current.default_limit = facets.default_limit;
            }
        }

        if let Some(query) = other.query {
            let current = self.query.get_or_insert_with(QueryFileConfig::default);
            if query.default_per_page.is_some() {
                current.default_per_page = query.default_per_page;
            }
            if query.max_per_page.is_some() {
                current.max_per_page = query.max_per_page;
            }
        }
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BlobsConfig {
    pub storage: BlobStorageMode,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FacetsConfig {
    pub default_limit: i64,
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub default_per_page: i64,
    pub max_per_page: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: SQLITE_MAX_CONNECTIONS,
            busy_timeout_secs: SQLITE_BUSY_TIMEOUT_SECS,
        }
    }
}

impl Default for FacetsConfig {
    fn default() -> Self {
        Self {
            default_limit: FACETS_DEFAULT_LIMIT,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_per_page: QUERY_DEFAULT_PER_PAGE,
            max_per_page: QUERY_MAX_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Data directory override; `None` resolves from env or platform default
    pub data_dir: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub blobs: BlobsConfig,
    pub facets: FacetsConfig,
    pub query: QueryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: DatabaseConfig::default(),
            blobs: BlobsConfig {
                storage: BlobStorageMode::default(),
                path: None,
            },
            facets: FacetsConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.mediashelf/mediashelf.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::from_layers(file_config, cli);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Self {
        let file_database = file_config.database.unwrap_or_default();
        let file_blobs = file_config.blobs.unwrap_or_default();
        let file_facets = file_config.facets.unwrap_or_default();
        let file_query = file_config.query.unwrap_or_default();

        let db_path = cli
            .db
            .clone()
            .or_else(|| file_database.path.as_deref().map(expand_path));

        let database = DatabaseConfig {
            path: db_path,
            max_connections: file_database
                .max_connections
                .unwrap_or(SQLITE_MAX_CONNECTIONS),
            busy_timeout_secs: file_database
                .busy_timeout_secs
                .unwrap_or(SQLITE_BUSY_TIMEOUT_SECS),
        };

        let blobs = BlobsConfig {
            storage: cli
                .blobs_storage
                .or(file_blobs.storage)
                .unwrap_or_default(),
            path: file_blobs.path.as_deref().map(expand_path),
        };

        let facets = FacetsConfig {
            default_limit: file_facets
                .default_limit
                .filter(|l| *l > 0)
                .unwrap_or(FACETS_DEFAULT_LIMIT),
        };

        let query = QueryConfig {
            default_per_page: file_query
                .default_per_page
                .unwrap_or(QUERY_DEFAULT_PER_PAGE),
            max_per_page: file_query.max_per_page.unwrap_or(QUERY_MAX_PER_PAGE),
        };

        Self {
            data_dir: cli.data_dir.clone(),
            database,
            blobs,
            facets,
            query,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        if self.query.max_per_page < 1 {
            anyhow::bail!("query.max_per_page must be at least 1");
        }
        if self.query.default_per_page < 1 || self.query.default_per_page > self.query.max_per_page
        {
            anyhow::bail!(
                "query.default_per_page must be between 1 and {}",
                self.query.max_per_page
            );
        }
        Ok(())
    }
}

/// Get the profile config path (~/.mediashelf/mediashelf.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
