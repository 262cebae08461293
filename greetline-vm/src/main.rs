//! greetline-vm - SMS-configured voicemail greeting service
//!
//! Serves the telephony provider's webhooks on the configured bind address
//! (default 127.0.0.1:5740).

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use greetline_common::config::{resolve_config_path, GreetlineConfig};
use greetline_common::db::init_database;
use greetline_vm::{build_router, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "greetline-vm", version, about = "Voicemail greeting service")]
struct Args {
    /// Config file (overrides GREETLINE_CONFIG and the default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The log level comes from the config file, so load it before tracing
    let config_path = resolve_config_path(args.config.as_deref())
        .ok_or_else(|| anyhow!("No configuration file found; pass --config or set GREETLINE_CONFIG"))?;
    let config = GreetlineConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    // RUST_LOG takes precedence over logging.level
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| EnvFilter::try_new(&config.logging.level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Build identification first, before any database delay
    info!(
        "Starting greetline-vm v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Configuration: {}", config_path.display());

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let bind_address = config.server.bind_address.clone();
    let public_base_url = config.server.public_base_url.clone();
    let state = AppState::with_live_providers(config, pool)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("greetline-vm listening on http://{}", bind_address);
    info!("Provider webhooks expected at {}", public_base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("greetline-vm stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
