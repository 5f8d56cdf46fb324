//! taxograph: command-line front end for the graph query engine.
//!
//! Runs one engine operation per invocation and prints the JSON result on
//! stdout. Logs go to stderr (or `LOG_FILE`).
//!
//! Two backends:
//! - `--seed <file.json>` loads a graph fixture into the in-memory store and
//!   treats every dataset as visible in the catalog (`--visible` narrows it);
//!   writes only last for the invocation
//! - otherwise PostgreSQL at `DATABASE_URL` with the HTTP catalog at
//!   `CATALOG_URL`
//!
//! When PostgreSQL cannot be reached after the configured connect attempts
//! the process exits with status 2.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use taxograph_core::{Error, ResourceRef, ResourceType, TagScope};
use taxograph_db::{Database, GraphSeed, InMemoryGraphStore, PoolConfig};
use taxograph_search::{
    EngineConfig, GraphQueryEngine, HttpResourceDirectory, QueryParams, SimilarityMode,
    StaticDirectory,
};

/// Exit status when the graph store is unreachable.
const EXIT_STORE_UNAVAILABLE: u8 = 2;

#[derive(Parser)]
#[command(name = "taxograph")]
#[command(author, version, about = "Concept-taxonomy dataset search")]
#[command(propagate_version = true)]
struct Cli {
    /// Serve from an in-memory graph loaded from this JSON fixture
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// With --seed: dataset ids the catalog reports as visible (default: all)
    #[arg(long, global = true, value_delimiter = ',')]
    visible: Option<Vec<String>>,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(flatten)]
    params: ParamArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Request parameters shared by every command.
#[derive(Args)]
struct ParamArgs {
    /// Tenant (default: DEFAULT_APPLICATION or "rw")
    #[arg(long, global = true)]
    application: Option<String>,

    /// Comma-separated catalog environments (default: DEFAULT_ENV or "production")
    #[arg(long, global = true)]
    env: Option<String>,

    /// Hierarchy depth for descendant matching (default: 15)
    #[arg(long, global = true, allow_negative_numbers = true)]
    depth: Option<i64>,

    /// Maximum number of results
    #[arg(long, global = true)]
    limit: Option<usize>,

    /// most-viewed | most-favorited, prefix with '-' for descending
    #[arg(long, global = true, allow_hyphen_values = true)]
    sort: Option<String>,
}

impl ParamArgs {
    fn to_params(&self) -> QueryParams {
        QueryParams {
            application: self.application.clone(),
            env: self.env.clone(),
            depth: self.depth,
            limit: self.limit,
            sort: self.sort.clone(),
        }
    }
}

/// A resource given as `KIND ID`.
#[derive(Args)]
struct ResourceArg {
    /// DATASET, WIDGET, LAYER or METADATA
    kind: ResourceType,
    id: String,
}

impl ResourceArg {
    fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.id.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Load a JSON graph fixture into PostgreSQL
    Load {
        /// Fixture file
        file: PathBuf,
    },

    /// Check that the graph store is reachable
    Health,

    /// Datasets matching every concept group
    Search {
        /// Comma-separated OR-group of concept ids (repeat for AND, max 3)
        #[arg(short, long = "group")]
        groups: Vec<String>,
    },

    /// Order datasets by a secondary metric
    Sort {
        /// most-viewed | most-favorited, prefix with '-' for descending
        #[arg(allow_hyphen_values = true)]
        key: String,

        /// Restrict to these dataset ids (default: all datasets)
        #[arg(long, value_delimiter = ',')]
        candidates: Option<Vec<String>>,
    },

    /// Datasets similar to the given ones
    Similar {
        /// Seed dataset ids
        #[arg(required = true, num_args = 1..)]
        datasets: Vec<String>,

        /// Also match tags below the seeds' ancestors
        #[arg(long)]
        descendants: bool,
    },

    /// Datasets with the most favourites
    MostLiked,

    /// Datasets with the most views
    MostViewed,

    /// Datasets a user viewed most
    MostViewedByUser { user: String },

    /// List concepts with the datasets tagged with them
    Concepts {
        /// Comma-separated kinds (TOPIC, DATA_TYPE, TIME_PERIOD, FREQUENCY)
        #[arg(long)]
        includes: Option<String>,

        /// Comma-separated label/synonym terms
        #[arg(long)]
        search: Option<String>,
    },

    /// Concepts tagged to datasets
    DatasetConcepts {
        #[arg(required = true, num_args = 1..)]
        datasets: Vec<String>,
    },

    /// Concepts plus all their ancestors
    Inferred {
        #[arg(required = true, num_args = 1..)]
        concepts: Vec<String>,
    },

    /// Ancestors of concepts
    Ancestors {
        #[arg(required = true, num_args = 1..)]
        concepts: Vec<String>,
    },

    /// Datasets tagged with concepts whose label or synonyms contain a word
    LabelSearch {
        /// Space-separated words
        search: String,
    },

    /// Record a dataset view
    Visit {
        dataset: String,

        #[arg(long)]
        user: Option<String>,
    },

    /// Create a resource
    CreateResource {
        #[command(flatten)]
        resource: ResourceArg,

        /// Owning resource kind
        #[arg(long, requires = "parent_id")]
        parent_kind: Option<ResourceType>,

        /// Owning resource id
        #[arg(long, requires = "parent_kind")]
        parent_id: Option<String>,
    },

    /// Delete a resource and everything belonging to it
    DeleteResource {
        #[command(flatten)]
        resource: ResourceArg,
    },

    /// Add tags to a resource
    Tag {
        #[command(flatten)]
        resource: ResourceArg,

        #[arg(required = true, num_args = 1..)]
        concepts: Vec<String>,
    },

    /// Replace a resource's tags in the application
    ReplaceTags {
        #[command(flatten)]
        resource: ResourceArg,

        #[arg(num_args = 0..)]
        concepts: Vec<String>,
    },

    /// Remove a resource's tags
    ClearTags {
        #[command(flatten)]
        resource: ResourceArg,

        /// Clear tags in every application instead of only --application
        #[arg(long)]
        all_applications: bool,
    },

    /// Mark a resource as a user's favourite
    Favourite {
        user: String,

        #[command(flatten)]
        resource: ResourceArg,
    },

    /// Remove a favourite
    Unfavourite {
        user: String,

        #[command(flatten)]
        resource: ResourceArg,
    },
}

#[derive(Serialize)]
struct Uncache {
    uncache: String,
}

/// Backing store for one invocation.
enum Backend {
    Memory(Arc<InMemoryGraphStore>),
    Postgres(Database),
}

impl Backend {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        if let Some(path) = &cli.seed {
            let seed = read_seed(path)?;
            let store = InMemoryGraphStore::from_seed(&seed)?;
            info!(
                subsystem = "cli",
                seed = %path.display(),
                "Using in-memory graph store"
            );
            return Ok(Backend::Memory(Arc::new(store)));
        }

        let url = cli
            .database_url
            .as_deref()
            .context("DATABASE_URL is not set and no --seed was given")?;
        let db = Database::connect_with_config(url, PoolConfig::from_env()?).await?;
        Ok(Backend::Postgres(db))
    }

    fn engine(&self, cli: &Cli, config: EngineConfig) -> anyhow::Result<GraphQueryEngine> {
        Ok(match self {
            Backend::Memory(store) => {
                let directory = match &cli.visible {
                    Some(ids) => StaticDirectory::with_visible(ids.iter().cloned()),
                    None => StaticDirectory::allow_all(),
                };
                GraphQueryEngine::with_store(store.clone(), Arc::new(directory), config)
            }
            Backend::Postgres(db) => GraphQueryEngine::with_store(
                Arc::new(db.graph.clone()),
                Arc::new(HttpResourceDirectory::from_env()?),
                config,
            ),
        })
    }

    async fn close(&self) {
        if let Backend::Postgres(db) = self {
            db.close().await;
        }
    }
}

fn read_seed(path: &Path) -> anyhow::Result<GraphSeed> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    GraphSeed::from_json(&raw)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_uncache(invalidation: taxograph_core::Invalidation) -> anyhow::Result<()> {
    print_json(&Uncache {
        uncache: invalidation.header_value(),
    })
}

/// Initialize tracing.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: "taxograph=info,...")
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "taxograph=info,taxograph_search=info,taxograph_db=info".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("taxograph.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(Error::StoreUnavailable(reason)) = e.downcast_ref::<Error>() {
                error!(
                    subsystem = "cli",
                    error = %reason,
                    "Graph store unreachable, terminating"
                );
                eprintln!("Error: {:#}", e);
                return ExitCode::from(EXIT_STORE_UNAVAILABLE);
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let backend = Backend::open(&cli).await?;
    let result = dispatch(&cli, &backend).await;
    backend.close().await;
    result
}

async fn dispatch(cli: &Cli, backend: &Backend) -> anyhow::Result<()> {
    // Store-only commands don't need the engine or catalog.
    match (&cli.command, backend) {
        (Commands::Migrate, Backend::Postgres(db)) => {
            db.migrate().await?;
            info!(subsystem = "cli", "Migrations applied");
            return Ok(());
        }
        (Commands::Load { file }, Backend::Postgres(db)) => {
            let seed = read_seed(file)?;
            db.graph.load_seed(&seed).await?;
            info!(
                subsystem = "cli",
                concepts = seed.concepts.len(),
                resources = seed.resources.len(),
                tags = seed.tags.len(),
                "Seed loaded"
            );
            return Ok(());
        }
        (Commands::Migrate | Commands::Load { .. }, Backend::Memory(_)) => {
            anyhow::bail!("this command needs PostgreSQL; drop --seed");
        }
        _ => {}
    }

    let engine = backend.engine(cli, EngineConfig::from_env()?)?;
    let params = cli.params.to_params();

    match &cli.command {
        Commands::Migrate | Commands::Load { .. } => Ok(()),
        Commands::Health => {
            engine.healthcheck().await?;
            if let Backend::Postgres(db) = backend {
                db.healthcheck().await?;
            }
            print_json(&serde_json::json!({ "status": "ok" }))
        }
        Commands::Search { groups } => {
            let groups: Vec<Vec<String>> = groups
                .iter()
                .map(|g| taxograph_core::config::split_list(g))
                .collect();
            print_json(&engine.search_dataset_ids(&groups, &params).await?)
        }
        Commands::Sort { key, candidates } => {
            print_json(&engine.sort_datasets(key, candidates.as_deref()).await?)
        }
        Commands::Similar {
            datasets,
            descendants,
        } => {
            let mode = if *descendants {
                SimilarityMode::DescendantAware
            } else {
                SimilarityMode::Direct
            };
            print_json(&engine.similar_datasets(datasets, mode, &params).await?)
        }
        Commands::MostLiked => print_json(&engine.most_liked_datasets(&params).await?),
        Commands::MostViewed => print_json(&engine.most_viewed(&params).await?),
        Commands::MostViewedByUser { user } => {
            print_json(&engine.most_viewed_by_user(user, &params).await?)
        }
        Commands::Concepts { includes, search } => print_json(
            &engine
                .list_concepts(includes.as_deref(), search.as_deref(), &params)
                .await?,
        ),
        Commands::DatasetConcepts { datasets } => {
            print_json(&engine.concepts_by_datasets(datasets, &params).await?)
        }
        Commands::Inferred { concepts } => {
            print_json(&engine.concepts_inferred(concepts).await?)
        }
        Commands::Ancestors { concepts } => {
            print_json(&engine.concepts_ancestors(concepts).await?)
        }
        Commands::LabelSearch { search } => {
            print_json(&engine.search_by_label_synonyms(search, &params).await?)
        }
        Commands::Visit { dataset, user } => {
            print_uncache(
                engine
                    .visited_dataset(dataset, user.as_deref(), &params)
                    .await?,
            )
        }
        Commands::CreateResource {
            resource,
            parent_kind,
            parent_id,
        } => {
            let parent = match (parent_kind, parent_id) {
                (Some(kind), Some(id)) => Some(ResourceRef::new(*kind, id.clone())),
                _ => None,
            };
            print_uncache(
                engine
                    .create_resource(&resource.to_ref(), parent.as_ref())
                    .await?,
            )
        }
        Commands::DeleteResource { resource } => {
            print_uncache(engine.delete_resource(&resource.to_ref()).await?)
        }
        Commands::Tag { resource, concepts } => print_uncache(
            engine
                .tag_resource(&resource.to_ref(), concepts, &params)
                .await?,
        ),
        Commands::ReplaceTags { resource, concepts } => print_uncache(
            engine
                .replace_tags(&resource.to_ref(), concepts, &params)
                .await?,
        ),
        Commands::ClearTags {
            resource,
            all_applications,
        } => {
            let scope = if *all_applications {
                TagScope::AllApplications
            } else {
                TagScope::Application(
                    params
                        .application
                        .clone()
                        .unwrap_or_else(|| engine.config().default_application.clone()),
                )
            };
            print_uncache(engine.clear_tags(&resource.to_ref(), &scope).await?)
        }
        Commands::Favourite { user, resource } => print_uncache(
            engine
                .add_favourite(user, &resource.to_ref(), &params)
                .await?,
        ),
        Commands::Unfavourite { user, resource } => print_uncache(
            engine
                .remove_favourite(user, &resource.to_ref(), &params)
                .await?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_groups_and_global_params() {
        let cli = Cli::try_parse_from([
            "taxograph",
            "--seed",
            "graph.json",
            "search",
            "-g",
            "water,river",
            "-g",
            "drought",
            "--depth",
            "3",
            "--sort",
            "-most-viewed",
        ])
        .unwrap();
        match &cli.command {
            Commands::Search { groups } => assert_eq!(groups, &["water,river", "drought"]),
            _ => panic!("expected search"),
        }
        let params = cli.params.to_params();
        assert_eq!(params.depth, Some(3));
        assert_eq!(params.sort.as_deref(), Some("-most-viewed"));
        assert_eq!(cli.seed, Some(PathBuf::from("graph.json")));
    }

    #[test]
    fn test_resource_arguments_parse_kind() {
        let cli = Cli::try_parse_from([
            "taxograph",
            "create-resource",
            "widget",
            "w1",
            "--parent-kind",
            "dataset",
            "--parent-id",
            "d1",
        ])
        .unwrap();
        match cli.command {
            Commands::CreateResource {
                resource,
                parent_kind,
                parent_id,
            } => {
                assert_eq!(resource.to_ref(), ResourceRef::new(ResourceType::Widget, "w1"));
                assert_eq!(parent_kind, Some(ResourceType::Dataset));
                assert_eq!(parent_id.as_deref(), Some("d1"));
            }
            _ => panic!("expected create-resource"),
        }
    }

    #[test]
    fn test_demo_fixture_loads_into_memory_store() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/demo-graph.json");
        let seed = read_seed(&path).unwrap();
        assert_eq!(seed.concepts.len(), 7);
        assert!(InMemoryGraphStore::from_seed(&seed).is_ok());
    }

    #[test]
    fn test_sort_key_may_start_with_hyphen() {
        let cli = Cli::try_parse_from(["taxograph", "sort", "-most-favorited"]).unwrap();
        match cli.command {
            Commands::Sort { key, candidates } => {
                assert_eq!(key, "-most-favorited");
                assert!(candidates.is_none());
            }
            _ => panic!("expected sort"),
        }
    }
}
