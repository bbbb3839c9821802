//! The Agentry server — load config, open storage, wire the registries,
//! and serve the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use agentry_config::AppConfig;
use agentry_context::StrategyRegistry;
use agentry_engine::ChatService;
use agentry_gateway::AppState;
use agentry_providers::{OllamaProvider, ProviderRegistry};
use agentry_storage::SqliteStorage;
use agentry_tools::{Executor, builtin_registry};

#[derive(Parser)]
#[command(
    name = "agentry",
    about = "Agentry — AI agent backend with tool orchestration",
    version
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;

    init_tracing(&config, cli.verbose);

    info!("starting Agentry server");

    // Storage
    ensure_data_dir(&config.database.path)?;
    let storage = SqliteStorage::new(&config.database.path)
        .await
        .context("failed to initialize storage")?;
    let stores = storage.stores();

    // Context strategies
    let strategies = Arc::new(StrategyRegistry::new());

    // LLM providers
    let mut providers = ProviderRegistry::new();
    if let Some(provider_cfg) = config.providers.get("ollama") {
        providers.register(Arc::new(OllamaProvider::new(Some(&provider_cfg.base_url))));
        info!(base_url = %provider_cfg.base_url, "registered Ollama provider");
    }
    let providers = Arc::new(providers);

    // Tools
    let registry = Arc::new(builtin_registry().context("failed to register built-in tools")?);
    info!(count = registry.count(), "registered built-in tools");
    let executor = Executor::new(registry, Duration::from_secs(config.tools.timeout_secs));

    // Engine + gateway
    let chat = Arc::new(ChatService::new(
        stores.clone(),
        providers,
        strategies,
        executor,
    ));
    let app = agentry_gateway::router(Arc::new(AppState { stores, chat }));

    let address = config.address();
    info!(%address, "server listening");

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn ensure_data_dir(db_path: &str) -> anyhow::Result<()> {
    if db_path.starts_with("sqlite:") {
        return Ok(());
    }
    if let Some(dir) = std::path::Path::new(db_path).parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }
    Ok(())
}
