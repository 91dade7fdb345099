//! webrecall entry point: wires storage, embedder, and fetch client into
//! the engine, then serves the HTTP API or the MCP stdio loop.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use webrecall_api::AppState;
use webrecall_core::batch::BatchOptions;
use webrecall_core::embed::{EmbeddingProvider, HashEmbedder, HttpEmbedder};
use webrecall_core::engine::RecallEngine;
use webrecall_core::fetch::CrawlClient;
use webrecall_core::storage::ContentStore;
use webrecall_core::RuntimeConfig;
use webrecall_mcp::{RemoteClient, ToolBackend};
use webrecall_storage_sqlite::{SqliteStorage, SyncConfig};

#[derive(Parser)]
#[command(name = "webrecall", version, about = "Crawl-backed semantic memory service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve,
    /// Serve the MCP tool interface on stdin/stdout
    Mcp,
    /// Recrawl a file of URLs (one per line) through the ingestion pipeline
    Batch {
        /// Path to the URL list
        file: PathBuf,
        /// Bound on concurrent ingestions
        #[arg(long, default_value_t = 10)]
        max_concurrent: usize,
        /// Comma-separated tags applied to every page
        #[arg(long)]
        tags: Option<String>,
    },
}

async fn build_engine(config: &RuntimeConfig) -> anyhow::Result<(Arc<RecallEngine>, Arc<SqliteStorage>)> {
    let storage = if config.use_memory_db {
        SqliteStorage::open_memory(&config.db_path, SyncConfig::default()).await?
    } else {
        SqliteStorage::open_direct(&config.db_path).await?
    };
    let storage = Arc::new(storage);

    let embedder: Arc<dyn EmbeddingProvider> = match &config.embedder_url {
        Some(endpoint) => Arc::new(HttpEmbedder::new(endpoint, "all-MiniLM-L6-v2")?),
        None => Arc::new(HashEmbedder::new()),
    };
    info!(model = embedder.model_name(), "embedding provider ready");

    let fetcher = Arc::new(CrawlClient::new(&config.crawler_url)?);

    let engine = RecallEngine::new(
        Arc::clone(&storage) as Arc<dyn ContentStore>,
        embedder,
        fetcher,
        config,
    )
    .await?;
    Ok((Arc::new(engine), storage))
}

async fn run_serve(config: RuntimeConfig) -> anyhow::Result<()> {
    let (engine, storage) = build_engine(&config).await?;
    let state = AppState::new(engine, config.api_key.clone(), config.rate_limit_per_minute);

    let serve = webrecall_api::serve(state, &config.server_host, config.server_port);
    tokio::select! {
        result = serve => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    storage.shutdown().await?;
    Ok(())
}

async fn run_mcp(config: RuntimeConfig) -> anyhow::Result<()> {
    if config.is_server {
        let (engine, storage) = build_engine(&config).await?;
        webrecall_mcp::serve_stdio(ToolBackend::Local(engine)).await?;
        storage.shutdown().await?;
    } else {
        let base_url = config
            .remote_api_url
            .clone()
            .context("REMOTE_API_URL is required when IS_SERVER=false")?;
        let api_key = config.remote_api_key.clone().unwrap_or_default();
        let client = RemoteClient::new(base_url, api_key)?;
        webrecall_mcp::serve_stdio(ToolBackend::Remote(client)).await?;
    }
    Ok(())
}

async fn run_batch(
    config: RuntimeConfig,
    file: PathBuf,
    max_concurrent: usize,
    tags: Option<String>,
) -> anyhow::Result<()> {
    let (engine, storage) = build_engine(&config).await?;
    let options = BatchOptions {
        max_concurrent,
        tags: tags
            .as_deref()
            .map(webrecall_core::validate::tags)
            .transpose()?
            .unwrap_or_default(),
        ..BatchOptions::default()
    };
    let report = engine.batch_crawl_file(&file, options).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    storage.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RuntimeConfig::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(config).await,
        Command::Mcp => run_mcp(config).await,
        Command::Batch {
            file,
            max_concurrent,
            tags,
        } => run_batch(config, file, max_concurrent, tags).await,
    }
}
