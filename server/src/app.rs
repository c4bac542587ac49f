//! Core application

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::CommandFactory;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use crate::core::cli::{self, BlobCommands, Cli, CliConfig, Commands, FilterArgs};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::storage::{AppStorage, DataSubdir};
use crate::data::sqlite::filters::{
    self, EntityKind, GalleryFilter, GroupFilter, ImageFilter, PerformerFilter,
    SceneFilter, SqlArg, StudioFilter, TagFilter,
};
use crate::data::sqlite::repositories::{
    FacetOptions, FindOptions, SortDirection, find_ids, get_facets,
};
use crate::data::{BlobStore, TransactionalService};

/// Run `$body` with `$F` bound to the filter type of `$kind`
macro_rules! with_filter {
    ($kind:expr, $F:ident => $body:expr) => {
        match $kind {
            EntityKind::Scenes => {
                type $F = SceneFilter;
                $body
            }
            EntityKind::Images => {
                type $F = ImageFilter;
                $body
            }
            EntityKind::Galleries => {
                type $F = GalleryFilter;
                $body
            }
            EntityKind::Performers => {
                type $F = PerformerFilter;
                $body
            }
            EntityKind::Studios => {
                type $F = StudioFilter;
                $body
            }
            EntityKind::Tags => {
                type $F = TagFilter;
                $body
            }
            EntityKind::Groups => {
                type $F = GroupFilter;
                $body
            }
        }
    };
}

pub struct CoreApp {
    pub config: AppConfig,
    pub storage: AppStorage,
    pub database: Arc<TransactionalService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let Some(command) = command else {
            Cli::command().print_help()?;
            return Ok(());
        };

        // explain never touches the catalog
        let needs_database = !matches!(command, Commands::Explain { .. });
        let app = Self::init(&cli_config, needs_database).await?;
        let result = app.execute(command).await;
        app.database.close().await;
        result
    }

    async fn init(cli: &CliConfig, needs_database: bool) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let storage = AppStorage::init(&config).await?;

        let database = if needs_database {
            TransactionalService::init(&storage, &config.database)
                .await
                .context("Failed to open catalog database")?
        } else {
            TransactionalService::Detached
        };

        Ok(Self {
            config,
            storage,
            database: Arc::new(database),
        })
    }

    fn init_logging() {
        let default_filter = format!("warn,{}_server=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        // stdout carries command output
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Query {
                entity,
                filter,
                q,
                sort,
                direction,
                page,
                per_page,
            } => {
                let direction = match direction {
                    Some(d) => d.parse::<SortDirection>().map_err(anyhow::Error::msg)?,
                    None => SortDirection::default(),
                };
                let options = FindOptions {
                    q,
                    sort,
                    direction,
                    page,
                    per_page,
                };
                let json = read_filter(&filter).await?;
                print_json(&self.query(entity.into(), &json, &options).await?)
            }
            Commands::Facets {
                entity,
                filter,
                limit,
                performer_tags,
                captions,
            } => {
                let options = FacetOptions {
                    include_performer_tags: performer_tags,
                    include_captions: captions,
                };
                let json = read_filter(&filter).await?;
                print_json(&self.facets(entity.into(), &json, limit, options).await?)
            }
            Commands::Explain { entity, filter } => {
                let json = read_filter(&filter).await?;
                print_json(&explain(entity.into(), &json)?)
            }
            Commands::Blob { command } => self.blob(command).await,
        }
    }

    pub async fn query(&self, kind: EntityKind, json: &str, options: &FindOptions) -> Result<Value> {
        let pool = self.database.pool();
        let result = with_filter!(kind, F => {
            let filter = filters::parse_filter::<F>(json)?;
            find_ids(pool, &filter, options, &self.config.query).await?
        });
        tracing::debug!(entity = %kind, count = result.count, page = result.ids.len(), "Query complete");
        Ok(serde_json::to_value(result)?)
    }

    pub async fn facets(
        &self,
        kind: EntityKind,
        json: &str,
        limit: i64,
        options: FacetOptions,
    ) -> Result<Value> {
        let pool = self.database.pool();
        let result = with_filter!(kind, F => {
            let filter = filters::parse_filter::<F>(json)?;
            get_facets(pool, &filter, limit, options, &self.config.facets).await?
        });
        Ok(serde_json::to_value(result)?)
    }

    fn blob_store(&self) -> BlobStore {
        BlobStore::new(
            self.database.pool().clone(),
            &self.config.blobs,
            self.storage.subdir(DataSubdir::Blobs),
        )
    }

    async fn blob(&self, command: BlobCommands) -> Result<()> {
        let store = self.blob_store();
        match command {
            BlobCommands::Put { file } => {
                let data = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let checksum = store.write(&data).await?;
                println!("{}", checksum);
            }
            BlobCommands::Get { checksum, out } => {
                let data = store.read(&checksum).await?;
                match out {
                    Some(path) => tokio::fs::write(&path, &data)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?,
                    None => {
                        use std::io::Write;
                        std::io::stdout().write_all(&data)?;
                    }
                }
            }
            BlobCommands::Delete { checksum } => {
                let deleted = store.delete(&checksum).await?;
                if !deleted {
                    tracing::info!(checksum = %checksum, "Blob kept (missing or still referenced)");
                }
                print_json(&json!({ "checksum": checksum, "deleted": deleted }))?;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_test(pool: sqlx::SqlitePool, data_dir: std::path::PathBuf) -> Self {
        use crate::data::SqliteService;
        Self {
            config: AppConfig::default(),
            storage: AppStorage::init_for_test(data_dir),
            database: Arc::new(TransactionalService::Sqlite(Arc::new(
                SqliteService::from_pool(pool),
            ))),
        }
    }
}

/// Compile a filter and describe the statement without running it
pub fn explain(kind: EntityKind, json: &str) -> Result<Value> {
    let compiled = with_filter!(kind, F => {
        let filter = filters::parse_filter::<F>(json)?;
        filters::compile(&filter)?
    });
    let args: Vec<Value> = compiled.args().iter().map(arg_json).collect();
    Ok(json!({
        "entity": kind,
        "sql": compiled.to_sql(),
        "args": args,
    }))
}

fn arg_json(arg: &SqlArg) -> Value {
    match arg {
        SqlArg::Null => Value::Null,
        SqlArg::Int(v) => json!(v),
        SqlArg::Float(v) => json!(v),
        SqlArg::Text(v) => json!(v),
    }
}

/// Filter JSON from `--filter`; `-` reads stdin and no flag means the empty filter
async fn read_filter(args: &FilterArgs) -> Result<String> {
    let Some(path) = &args.filter else {
        return Ok(String::new());
    };
    if path == Path::new("-") {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read filter from stdin")?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read filter file {}", path.display()))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataError;
    use crate::data::sqlite::fixtures;

    #[test]
    fn test_explain_renders_sql_and_args() {
        let value = explain(
            EntityKind::Scenes,
            r#"{"title": {"value": "sun", "modifier": "INCLUDES"}}"#,
        )
        .unwrap();
        assert_eq!(value["entity"], "scenes");
        let sql = value["sql"].as_str().unwrap();
        assert!(sql.starts_with("SELECT DISTINCT scenes.id FROM scenes"));
        assert_eq!(value["args"], json!(["%sun%"]));
    }

    #[test]
    fn test_explain_empty_filter() {
        let value = explain(EntityKind::Tags, "").unwrap();
        assert_eq!(value["sql"], "SELECT DISTINCT tags.id FROM tags");
        assert_eq!(value["args"], json!([]));
    }

    #[test]
    fn test_explain_rejects_bad_filter() {
        let err = explain(EntityKind::Performers, r#"{"gender": 7}"#).unwrap_err();
        let data = err.downcast_ref::<DataError>().unwrap();
        assert!(data.is_user_error());
    }

    #[tokio::test]
    async fn test_read_filter_sources() {
        assert_eq!(read_filter(&FilterArgs::default()).await.unwrap(), "");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.json");
        tokio::fs::write(&path, r#"{"organized": true}"#).await.unwrap();
        let args = FilterArgs { filter: Some(path) };
        assert_eq!(read_filter(&args).await.unwrap(), r#"{"organized": true}"#);

        let missing = FilterArgs {
            filter: Some(dir.path().join("missing.json")),
        };
        assert!(read_filter(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_query_and_facets_through_app() {
        let pool = fixtures::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let tag = fixtures::tag(&pool, "Beach").await;
        let a = fixtures::scene(&pool, "Alpha").await;
        let b = fixtures::scene(&pool, "Beta").await;
        fixtures::scene(&pool, "Gamma").await;
        fixtures::tag_scene(&pool, a, tag).await;
        fixtures::tag_scene(&pool, b, tag).await;

        let app = CoreApp::for_test(pool, dir.path().to_path_buf());
        let filter = format!(r#"{{"tags": {{"value": [{}], "modifier": "INCLUDES"}}}}"#, tag);

        let options = FindOptions {
            per_page: Some(1),
            ..Default::default()
        };
        let value = app.query(EntityKind::Scenes, &filter, &options).await.unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["ids"], json!([a]));

        let value = app
            .facets(EntityKind::Scenes, "", 0, FacetOptions::default())
            .await
            .unwrap();
        assert_eq!(value["tags"][0]["label"], "Beach");
        assert_eq!(value["tags"][0]["count"], 2);
    }

    #[tokio::test]
    async fn test_blob_store_uses_blobs_subdir() {
        let pool = fixtures::pool().await;
        let dir = tempfile::tempdir().unwrap();
        let mut app = CoreApp::for_test(pool, dir.path().to_path_buf());
        app.config.blobs.storage = crate::core::config::BlobStorageMode::Filesystem;

        let checksum = app.blob_store().write(b"hello world").await.unwrap();
        assert!(dir.path().join("blobs").join(&checksum[0..2]).is_dir());
    }
}
