mod api;
mod cli;
mod generation;
mod reload;
mod router;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use logpush_rules::loader::ConfigLoader;

use crate::cli::{Cli, Command};
use crate::generation::{Delivery, Generation};
use crate::state::AppState;

/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn serve(mut loader: ConfigLoader, watch: bool) -> anyhow::Result<()> {
    let config = loader
        .load()
        .with_context(|| format!("loading {}", loader.path().display()))?;
    init_tracing(&config.log_level);
    config.log_summary();

    let address = config.address.clone();
    let delivery = Delivery::live();
    let generation = Generation::start(config, &delivery).context("invalid configuration")?;
    let state = Arc::new(AppState::new(Arc::new(generation)));

    let shutdown = CancellationToken::new();
    let reload_task = if watch {
        let updates = loader.watch()?;
        info!(path = %loader.path().display(), "watching config for changes");
        Some(tokio::spawn(reload::watch_config(
            Arc::clone(&state),
            updates,
            delivery.clone(),
            shutdown.clone(),
        )))
    } else {
        None
    };

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!("Server listening on http://{}", address);

    axum::serve(listener, router::build_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Some(task) = reload_task {
        if let Err(e) = task.await {
            error!(error = %e, "reload task ended abnormally");
        }
    }

    state.current().await.retire().await;
    info!("shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logpush_core::config::load_dotenv();
    let cli = Cli::parse();
    let loader = ConfigLoader::new(&cli.config);

    match cli.command() {
        Command::Check => {
            init_tracing("warn");
            cli::check(&loader)
        }
        Command::Serve => serve(loader, cli.watch).await,
    }
}
