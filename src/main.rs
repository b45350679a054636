//! metaquery server
//!
//! Binary entry point: loads configuration, registers the configured HTTP
//! backends, and serves the query API.

use anyhow::Context;
use clap::Parser;
use metaquery::api::{ApiConfig, AppState};
use metaquery::config::{generate_default_config, Config};
use metaquery::datasource::{DatasourceRegistry, HttpDatasource, HttpDatasourceConfig};
use metaquery::scheduler::QueryScheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "metaquery", version, about = "Meta-query orchestration server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => Config::load_default(),
    };

    init_logging(&config);

    tracing::info!("metaquery v{}", env!("CARGO_PKG_VERSION"));

    // Register configured backends
    let registry = Arc::new(DatasourceRegistry::new());
    for backend in &config.backends {
        let datasource = HttpDatasource::new(HttpDatasourceConfig {
            base_url: backend.url.clone(),
            query_path: backend.query_path.clone(),
            request_timeout_ms: backend.request_timeout_ms,
        })
        .with_context(|| format!("building HTTP client for backend '{}'", backend.name))?;
        registry.register(&backend.name, Arc::new(datasource));
    }
    tracing::info!(
        backends = registry.len(),
        scheduler = %config.scheduler.name,
        "backend registry ready"
    );

    let scheduler = Arc::new(QueryScheduler::new(
        config.scheduler.name.clone(),
        Arc::clone(&registry),
    ));

    let api_config = ApiConfig {
        host: config.api.host.clone(),
        port: config.api.port,
        max_body_size: config.api.max_body_size,
    };
    let state = AppState::new(scheduler, registry, api_config.clone());

    metaquery::api::serve(state, &api_config)
        .await
        .context("API server failed")?;

    Ok(())
}

/// Initialize logging from the configuration
fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| format!("metaquery={}", config.logging.level)),
    );

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
