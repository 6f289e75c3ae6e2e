//! CLI entry point for Healthmind.
//!
//! Wires the store, LLM gateway, tool catalog, chat orchestrator, OCR
//! client, and ingestion worker pool into the web server. Heavy lifting
//! lives in the `healthmind-*` library crates; this binary only resolves
//! configuration and starts things in the right order.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use healthmind_gateway::LlmGateway;
use healthmind_ingest::{IngestionWorkerPool, OcrClient};
use healthmind_orchestrator::{ChatConfig, ChatOrchestrator};
use healthmind_store::{Database, HealthStore};
use healthmind_tools::HealthToolCatalog;
use healthmind_web::{AppState, WebServer};

use crate::cli::{Cli, Commands};
use crate::config::Config;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(bind, port).await,
        Commands::Setup => cmd_setup().await,
        Commands::Status => cmd_status().await,
    }
}

async fn build_state(config: &Config) -> Result<AppState> {
    tokio::fs::create_dir_all(&config.upload_dir).await.context("failed to create upload directory")?;
    if let Some(parent) = config.store_path.parent() {
        tokio::fs::create_dir_all(parent).await.context("failed to create store directory")?;
    }

    let db = Database::open_and_migrate(config.store_path.clone()).await.context("failed to open database")?;
    let store = HealthStore::new(db);
    info!(path = %config.store_path.display(), "store initialized");

    let gateway = LlmGateway::new(config.inference_host.clone(), config.inference_timeout).context("failed to create LLM gateway")?;
    let tools = Arc::new(HealthToolCatalog::new());
    let orchestrator = Arc::new(ChatOrchestrator::new(store.clone(), gateway.clone(), tools.clone(), ChatConfig::new(config.chat_model.clone())));

    let ocr = OcrClient::new(config.ocr_service_url.clone()).context("failed to create OCR client")?;
    let ingestion =
        Arc::new(IngestionWorkerPool::start(store.clone(), gateway.clone(), ocr, config.extraction_model.clone(), config.worker_count));
    info!(workers = config.worker_count, "ingestion worker pool started");

    Ok(AppState {
        store,
        gateway: Arc::new(gateway),
        tools,
        orchestrator,
        ingestion,
        upload_dir: config.upload_dir.clone(),
        chat_model: config.chat_model.clone(),
        extraction_model: config.extraction_model.clone(),
    })
}

async fn cmd_serve(bind: Option<String>, port: Option<u16>) -> Result<()> {
    init_tracing("info");
    info!("starting Healthmind");

    let mut config = Config::from_env();
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let state = build_state(&config).await?;

    println!();
    println!("  Healthmind v{}", env!("CARGO_PKG_VERSION"));
    println!("  Chat model:       {}", config.chat_model);
    println!("  Extraction model: {}", config.extraction_model);
    println!("  Listening on:     http://{addr}");
    println!();

    WebServer::new(addr, state).start().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

async fn cmd_setup() -> Result<()> {
    init_tracing("info");

    println!();
    println!("  Healthmind Setup");
    println!("  ================");
    println!();

    let config = Config::from_env();
    let db = Database::open_and_migrate(config.store_path.clone()).await.context("failed to initialize database")?;
    drop(db);
    println!("  [+] Database initialized at {}", config.store_path.display());

    tokio::fs::create_dir_all(&config.upload_dir).await.context("failed to create upload directory")?;
    println!("  [+] Upload directory ready at {}", config.upload_dir.display());

    println!("  [=] Inference host: {}", config.inference_host);
    println!("  [=] OCR service:    {}", config.ocr_service_url);
    println!();
    println!("  Setup complete! Run `healthmind serve` to start.");
    println!();

    Ok(())
}

async fn cmd_status() -> Result<()> {
    init_tracing("warn");

    println!();
    println!("  Healthmind Status");
    println!("  =================");
    println!();

    let config = Config::from_env();

    if config.store_path.exists() {
        println!("  Database:    OK ({})", config.store_path.display());
    } else {
        println!("  Database:    NOT INITIALIZED (run `healthmind setup`)");
    }

    if config.upload_dir.exists() {
        println!("  Uploads dir: OK ({})", config.upload_dir.display());
    } else {
        println!("  Uploads dir: MISSING (run `healthmind setup`)");
    }

    let gateway = LlmGateway::new(config.inference_host.clone(), config.inference_timeout).context("failed to create LLM gateway")?;
    let health = gateway.health_check(&config.chat_model, &config.extraction_model).await;
    if health.reachable {
        println!("  Inference:   OK ({})", config.inference_host);
    } else {
        println!("  Inference:   UNREACHABLE ({})", config.inference_host);
    }

    println!();
    Ok(())
}
