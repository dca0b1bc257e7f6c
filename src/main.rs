mod config;
mod error;
mod gitcli;
mod github;
mod health;
mod http;
mod model;
mod normalize;
mod reconcile;
mod service;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::github::GitHubClient;
use crate::service::clone::CliCommitService;
use crate::service::remote::ApiCommitService;
use crate::service::CommitService;
use crate::store::{CommitStore, SqliteStore};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "commitcache", about = "Git commit history caching service")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "commitcache.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<CommitService>,
    pub store: Arc<dyn CommitStore>,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .http_listen
        .parse()
        .context("invalid http_listen address")?;

    let app = http::handler::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // ---- Config ----
    let config = Arc::new(config::load_config(&cli.config)?);
    tracing::info!(config_path = %cli.config, "starting commitcache");

    // ---- Commit store ----
    let store: Arc<dyn CommitStore> = Arc::new(SqliteStore::connect(&config.database.path).await?);

    // ---- HTTP client ----
    let http_client = reqwest::Client::builder()
        .user_agent("commitcache/0.1")
        .build()
        .context("failed to build reqwest client")?;

    // ---- Retrieval paths ----
    let source = Arc::new(GitHubClient::new(http_client, &config.github));
    let api = ApiCommitService::new(source, Arc::clone(&store), config.github.clone());
    let cli_path = CliCommitService::new(Arc::clone(&store), config.github.clone(), config.clone);

    let service = Arc::new(CommitService::new(
        api,
        cli_path,
        config.resilience,
        config.github.force_use_cli,
    ));
    tracing::info!(
        force_use_cli = config.github.force_use_cli,
        max_pages = config.github.max_pages,
        "retrieval paths initialised"
    );

    // ---- Serve ----
    let state = AppState {
        config: Arc::clone(&config),
        service,
        store,
    };

    run_http_server(state).await?;

    tracing::info!("commitcache shut down cleanly");
    Ok(())
}
