//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::{AppConfig, BlobStorageMode};
pub use storage::{AppStorage, DataSubdir};

// Re-export service types from data layer
pub use crate::data::{SqliteService, TransactionalService};
