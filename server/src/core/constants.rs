// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "MediaShelf";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "mediashelf";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".mediashelf";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "mediashelf.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "MEDIASHELF_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "MEDIASHELF_LOG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "MEDIASHELF_DATA_DIR";

/// Environment variable to override the catalog database path
pub const ENV_DB_PATH: &str = "MEDIASHELF_DB";

/// Environment variable for blob storage mode (database, filesystem, both)
pub const ENV_BLOBS_STORAGE: &str = "MEDIASHELF_BLOBS_STORAGE";

// =============================================================================
// SQLite
// =============================================================================

/// Catalog database filename inside the sqlite data subdirectory
pub const SQLITE_DB_FILENAME: &str = "catalog.db";

/// Maximum pooled connections. Facet queries run in parallel, so keep
/// this above the number of facet tasks.
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// Busy timeout before a locked database returns SQLITE_BUSY
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Page cache size (negative = KiB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// WAL pages before an automatic checkpoint
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";

// =============================================================================
// Query Defaults
// =============================================================================

/// Page size when the caller does not specify one
pub const QUERY_DEFAULT_PER_PAGE: i64 = 25;

/// Upper bound for a single page. `per_page = -1` bypasses pagination
/// entirely and is not clamped.
pub const QUERY_MAX_PER_PAGE: i64 = 1000;

// =============================================================================
// Facets
// =============================================================================

/// Rows per labeled facet dimension when the caller passes `limit <= 0`
pub const FACETS_DEFAULT_LIMIT: i64 = 100;

// =============================================================================
// Blobs
// =============================================================================

/// Subdirectory (under the data dir) for filesystem blob storage
pub const BLOBS_DIR_NAME: &str = "blobs";
