use clap::{Args, Parser, Subcommand, ValueEnum};

use std::path::PathBuf;

use super::config::BlobStorageMode;
use crate::data::sqlite::filters::EntityKind;
use super::constants::{ENV_BLOBS_STORAGE, ENV_CONFIG, ENV_DATA_DIR, ENV_DB_PATH};

#[derive(Parser)]
#[command(name = "mediashelf")]
#[command(version, about = "Media catalog query and facet engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Data directory (defaults to the platform data dir)
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,

    /// Catalog database path (overrides config and data dir)
    #[arg(long, global = true, env = ENV_DB_PATH)]
    pub db: Option<PathBuf>,

    /// Blob storage mode (database, filesystem or both)
    #[arg(long, global = true, env = ENV_BLOBS_STORAGE, value_parser = parse_blob_storage_mode)]
    pub blobs_storage: Option<BlobStorageMode>,
}

/// Parse blob storage mode from CLI/env string
fn parse_blob_storage_mode(s: &str) -> Result<BlobStorageMode, String> {
    match s.to_lowercase().as_str() {
        "database" | "db" => Ok(BlobStorageMode::Database),
        "filesystem" | "fs" => Ok(BlobStorageMode::Filesystem),
        "both" => Ok(BlobStorageMode::Both),
        _ => Err(format!(
            "Invalid blob storage mode '{}'. Valid options: database, filesystem, both",
            s
        )),
    }
}

/// Catalog entity kinds addressable from the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityArg {
    Scenes,
    Images,
    Galleries,
    Performers,
    Studios,
    Tags,
    Groups,
}

impl From<EntityArg> for EntityKind {
    fn from(arg: EntityArg) -> Self {
        match arg {
            EntityArg::Scenes => EntityKind::Scenes,
            EntityArg::Images => EntityKind::Images,
            EntityArg::Galleries => EntityKind::Galleries,
            EntityArg::Performers => EntityKind::Performers,
            EntityArg::Studios => EntityKind::Studios,
            EntityArg::Tags => EntityKind::Tags,
            EntityArg::Groups => EntityKind::Groups,
        }
    }
}

/// Filter input shared by query, facets and explain
#[derive(Args, Clone, Debug, Default)]
pub struct FilterArgs {
    /// JSON file containing the entity filter tree (use `-` for stdin)
    #[arg(long, short = 'f')]
    pub filter: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run a filter and print the matching page of ids plus the total count
    Query {
        entity: EntityArg,
        #[command(flatten)]
        filter: FilterArgs,
        /// Free-text search over the entity's search columns
        #[arg(long)]
        q: Option<String>,
        /// Sort key (e.g. title, date, rating, random, tag_count)
        #[arg(long)]
        sort: Option<String>,
        /// Sort direction (asc or desc)
        #[arg(long)]
        direction: Option<String>,
        /// 1-based page number
        #[arg(long)]
        page: Option<i64>,
        /// Page size (-1 for all rows)
        #[arg(long, allow_negative_numbers = true)]
        per_page: Option<i64>,
    },
    /// Compute facet counts for the filtered entities
    Facets {
        entity: EntityArg,
        #[command(flatten)]
        filter: FilterArgs,
        /// Rows per labeled dimension (0 = configured default)
        #[arg(long, default_value_t = 0)]
        limit: i64,
        /// Include the performer-tags dimension (scenes only)
        #[arg(long)]
        performer_tags: bool,
        /// Include the captions dimension (scenes only)
        #[arg(long)]
        captions: bool,
    },
    /// Compile a filter without a database and print the SQL and arguments
    Explain {
        entity: EntityArg,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Blob store maintenance
    Blob {
        #[command(subcommand)]
        command: BlobCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum BlobCommands {
    /// Store a file and print its checksum
    Put { file: PathBuf },
    /// Fetch blob bytes by checksum
    Get {
        checksum: String,
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },
    /// Delete a blob (no-op while an entity still references it)
    Delete { checksum: String },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub blobs_storage: Option<BlobStorageMode>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        data_dir: cli.data_dir,
        db: cli.db,
        blobs_storage: cli.blobs_storage,
    };
    (config, cli.command)
}
