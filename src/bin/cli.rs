//! catalog-sync CLI
//!
//! Local execution entry point for sync runs, feed loads and index queries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog_sync::{
    error::{AppError, Result},
    feed,
    models::{Config, RunReport},
    pipeline::{self, BulkWriteOrchestrator, SnapshotGuard, SyncMode, SyncRunner},
    services::{CatalogCollector, CatalogEndpoints},
    storage::{
        DocumentStore, ElasticsearchIndex, LocalDocumentStore, LocalSearchIndex,
        MemoryDocumentStore, SearchIndex, default_title_schema,
    },
    transport::{HttpTransport, create_async_client},
    utils::log as console,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

const REPORT_FILE: &str = "run_report.json";

/// catalog-sync - Catalog Synchronization Pipeline
#[derive(Parser, Debug)]
#[command(
    name = "catalog-sync",
    version,
    about = "Mirror an upstream catalog into a document store and search index"
)]
struct Cli {
    /// Directory holding config.toml, local sinks and the run report
    #[arg(short, long, default_value = "storage")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect the catalog, reconcile and apply the delta
    Sync,

    /// Collect and reconcile without writing
    Plan {
        /// Number of pending deletes to list
        #[arg(long, default_value_t = 10)]
        show: usize,
    },

    /// Upsert the bibliographic TSV feed
    Feed {
        /// Feed file (default: feed.path from config)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Download the export into the feed file first (default: feed.url)
        #[arg(long)]
        url: Option<String>,
    },

    /// Create the search index if missing
    EnsureIndex,

    /// Phrase search over indexed titles
    Search {
        query: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Validate configuration and environment
    Validate,

    /// Show the last run report
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C.
fn install_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping after in-flight requests");
            token.cancel();
        }
    });
}

/// Resolve a configured path against the data directory.
fn resolve(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

fn build_store(config: &Config, data_dir: &Path) -> Arc<dyn DocumentStore> {
    match config.store.backend.as_str() {
        "memory" => Arc::new(MemoryDocumentStore::new()),
        _ => Arc::new(LocalDocumentStore::new(resolve(data_dir, &config.store.root))),
    }
}

fn build_index(
    config: &Config,
    data_dir: &Path,
    client: &reqwest::Client,
    password: Option<String>,
) -> Result<Option<Arc<dyn SearchIndex>>> {
    let index: Arc<dyn SearchIndex> = match config.search.backend.as_str() {
        "disabled" => return Ok(None),
        "elasticsearch" => {
            let password = password.ok_or_else(|| {
                AppError::config("search backend elasticsearch requires a password")
            })?;
            Arc::new(ElasticsearchIndex::new(client.clone(), &config.search, password))
        }
        _ => Arc::new(LocalSearchIndex::new(resolve(data_dir, &config.store.root))),
    };
    Ok(Some(index))
}

fn load_schema(config: &Config, data_dir: &Path) -> Result<serde_json::Value> {
    match &config.search.schema_path {
        Some(path) => {
            let content = std::fs::read_to_string(resolve(data_dir, path))?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(default_title_schema()),
    }
}

fn build_orchestrator(
    config: &Config,
    data_dir: &Path,
    client: &reqwest::Client,
    password: Option<String>,
) -> Result<BulkWriteOrchestrator> {
    let store = build_store(config, data_dir);
    let index = build_index(config, data_dir, client, password)?;
    Ok(BulkWriteOrchestrator::new(
        store,
        index,
        config.search.index.clone(),
        config.writer.clone(),
    )
    .with_schema(load_schema(config, data_dir)?))
}

fn build_runner(config: &Config, data_dir: &Path) -> Result<SyncRunner> {
    let secrets = config.require_secrets()?;
    let client = create_async_client(&config.catalog)?;
    let transport = Arc::new(HttpTransport::new(client.clone()));
    let endpoints = CatalogEndpoints::new(&config.catalog, &secrets);
    let collector = CatalogCollector::new(transport, endpoints, &config.catalog);
    let orchestrator = build_orchestrator(
        config,
        data_dir,
        &client,
        secrets.elasticsearch_password.clone(),
    )?;

    Ok(SyncRunner::new(
        collector,
        orchestrator,
        SnapshotGuard::new(config.guard.clone()),
        config.catalog.categories.clone(),
        config.store.catalog_collection.clone(),
    ))
}

fn save_report(data_dir: &Path, report: &RunReport) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(data_dir.join(REPORT_FILE), json)?;
    Ok(())
}

fn report_summary(report: &RunReport) {
    let mut total = report.store_writes.clone();
    total.merge(&report.index_writes);

    let mut items = vec![
        ("State", report.state.to_string()),
        ("Snapshot", report.snapshot_count.to_string()),
        ("Persisted", report.previous_count.to_string()),
        ("Upserts", report.upsert_count.to_string()),
        ("Deletes", report.delete_count.to_string()),
        (
            "Store writes",
            format!(
                "{} ops in {} flushes",
                report.store_writes.written, report.store_writes.flushes
            ),
        ),
        (
            "Index writes",
            format!(
                "{} docs in {} flushes",
                report.index_writes.written, report.index_writes.flushes
            ),
        ),
        (
            "Total",
            format!("{} ops, {} bytes, {} failed", total.written, total.bytes, total.failed),
        ),
    ];
    if let Some(secs) = report.duration_secs() {
        items.push(("Duration", format!("{secs}s")));
    }
    if let Some(error) = &report.error {
        items.push(("Error", error.clone()));
    }
    console::summary("Sync run", &items);
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.data_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    log::info!("Loaded configuration from {}", cli.data_dir.display());

    let cancel = CancellationToken::new();
    install_interrupt(cancel.clone());

    match cli.command {
        Command::Sync => {
            config.validate()?;
            console::header("catalog-sync: sync");
            let runner = build_runner(&config, &cli.data_dir)?;

            let outcome = runner.run(SyncMode::Apply, &cancel).await;
            save_report(&cli.data_dir, &outcome.report)?;
            report_summary(&outcome.report);
            outcome.result?;
        }

        Command::Plan { show } => {
            config.validate()?;
            console::header("catalog-sync: plan");
            let runner = build_runner(&config, &cli.data_dir)?;

            let outcome = runner.run(SyncMode::Plan, &cancel).await;
            report_summary(&outcome.report);
            let delta = outcome.result?;
            for (i, id) in delta.to_delete.iter().take(show).enumerate() {
                console::sub_item(i + 1 == show.min(delta.to_delete.len()), &format!("delete {id}"));
            }
        }

        Command::Feed { path, url } => {
            config.validate()?;
            console::header("catalog-sync: feed");
            let client = create_async_client(&config.catalog)?;
            let orchestrator =
                build_orchestrator(&config, &cli.data_dir, &client, config.search_password()?)?;
            let path = path.unwrap_or_else(|| resolve(&cli.data_dir, &config.feed.path));

            if let Some(url) = url.or_else(|| config.feed.url.clone()) {
                feed::download_feed(&client, &url, &path).await?;
            }

            let report = pipeline::run_feed_load(
                &orchestrator,
                &path,
                config.feed.delimiter,
                &config.store.feed_collection,
                config.writer.queue_capacity,
                &cancel,
            )
            .await?;
            console::summary(
                "Feed load",
                &[
                    ("Rows", report.read.to_string()),
                    ("Skipped", report.failed.to_string()),
                    ("Store writes", report.store.written.to_string()),
                    ("Index writes", report.index.written.to_string()),
                ],
            );
        }

        Command::EnsureIndex => {
            let client = create_async_client(&config.catalog)?;
            let orchestrator =
                build_orchestrator(&config, &cli.data_dir, &client, config.search_password()?)?;
            if config.search.backend == "disabled" {
                return Err(AppError::config("search backend is disabled"));
            }
            orchestrator.ensure_index().await?;
            log::info!("Index {} is ready", config.search.index);
        }

        Command::Search { query, limit } => {
            let client = create_async_client(&config.catalog)?;
            let index = build_index(&config, &cli.data_dir, &client, config.search_password()?)?
                .ok_or_else(|| AppError::config("search backend is disabled"))?;
            let hits = index.search(&config.search.index, &query, limit).await?;

            log::info!("{} results for \"{}\"", hits.len(), query);
            for (i, item) in hits.iter().enumerate() {
                console::sub_item(
                    i + 1 == hits.len(),
                    &format!("{} ({}) [{}]", item.title, item.year, item.id),
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({} categories)", config.catalog.categories.len());

            match config.require_secrets() {
                Ok(secrets) => log::info!("✓ Secrets present: {:?}", secrets),
                Err(e) => log::warn!("{}", e),
            }
            load_schema(&config, &cli.data_dir)?;
            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Data directory: {}", cli.data_dir.display());
            let report_path = cli.data_dir.join(REPORT_FILE);
            match std::fs::read_to_string(&report_path) {
                Ok(content) => {
                    let report: RunReport = serde_json::from_str(&content)?;
                    log::info!("Last run started {}", report.start_time);
                    report_summary(&report);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::info!("No run report found yet.");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
