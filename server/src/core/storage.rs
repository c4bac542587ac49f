//! Data directory layout
//!
//! | Type | Windows | macOS | Linux |
//! |------|---------|-------|-------|
//! | Data | `%APPDATA%\MediaShelf\` | `~/Library/Application Support/MediaShelf/` | `$XDG_DATA_HOME/mediashelf/` |
//!
//! The catalog lives in `<data_dir>/sqlite/`. On-disk blobs go to
//! `<data_dir>/blobs/` unless `blobs.path` points elsewhere.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use super::config::AppConfig;
use super::constants::{APP_DOT_FOLDER, APP_NAME, BLOBS_DIR_NAME, ENV_DATA_DIR};
use crate::utils::file::expand_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSubdir {
    Sqlite,
    Blobs,
}

impl DataSubdir {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataSubdir::Sqlite => "sqlite",
            DataSubdir::Blobs => BLOBS_DIR_NAME,
        }
    }
}

/// Where the data directory came from, for the startup log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirSource {
    Cli,
    Env,
    Platform,
    WorkingDir,
}

impl fmt::Display for DataDirSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cli => "cli",
            Self::Env => "env",
            Self::Platform => "platform",
            Self::WorkingDir => "working dir",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppStorage {
    data_dir: PathBuf,
}

impl AppStorage {
    /// Resolve and create the data directory plus the subdirectories `config` needs
    pub async fn init(config: &AppConfig) -> Result<Self> {
        let (data_dir, source) = match &config.data_dir {
            Some(dir) => (dir.clone(), DataDirSource::Cli),
            None => Self::resolve_data_dir(),
        };

        let mut dirs = vec![data_dir.join(DataSubdir::Sqlite.as_str())];
        if config.blobs.storage.uses_filesystem() {
            dirs.push(
                config
                    .blobs
                    .path
                    .clone()
                    .unwrap_or_else(|| data_dir.join(DataSubdir::Blobs.as_str())),
            );
        }
        Self::ensure_directories(&data_dir, &dirs).await?;

        // canonicalize needs the directory to exist
        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);
        tracing::debug!(data_dir = %data_dir.display(), source = %source, "Storage initialized");
        Ok(Self { data_dir })
    }

    /// Data directory from `MEDIASHELF_DATA_DIR`, the platform data dir, or `./.mediashelf`
    pub fn resolve_data_dir() -> (PathBuf, DataDirSource) {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            return (expand_path(&dir), DataDirSource::Env);
        }
        if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            return (proj_dirs.data_dir().to_path_buf(), DataDirSource::Platform);
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        (cwd.join(APP_DOT_FOLDER), DataDirSource::WorkingDir)
    }

    async fn ensure_directories(data_dir: &Path, dirs: &[PathBuf]) -> Result<()> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        for dir in dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path to a subdirectory (canonicalized when it exists)
    pub fn subdir(&self, subdir: DataSubdir) -> PathBuf {
        let path = self.data_dir.join(subdir.as_str());
        path.canonicalize().unwrap_or(path)
    }

    #[cfg(test)]
    pub fn init_for_test(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }
}
