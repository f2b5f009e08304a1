//! Configuration hot reload.
//!
//! Each configuration forwarded by the file watcher becomes a new
//! generation. The old generation is retired in the background so its
//! flush tasks can deliver what they still hold.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use logpush_core::Config;

use crate::generation::{Delivery, Generation};
use crate::state::AppState;

/// Apply configurations from `updates` until `shutdown` fires or the
/// watcher goes away.
pub async fn watch_config(
    state: Arc<AppState>,
    mut updates: mpsc::UnboundedReceiver<Config>,
    delivery: Delivery,
    shutdown: CancellationToken,
) {
    loop {
        let config = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = updates.recv() => match next {
                Some(config) => config,
                None => {
                    warn!("config watcher closed, hot reload disabled");
                    break;
                }
            },
        };

        apply(&state, config, &delivery).await;
    }
}

/// Swap in a generation built from `config`. Returns `false` and keeps the
/// current generation when `config` does not validate.
pub async fn apply(state: &AppState, config: Config, delivery: &Delivery) -> bool {
    let current = state.current().await;
    if config.address != current.config.address {
        warn!(
            current = %current.config.address,
            requested = %config.address,
            "listen address changes need a restart"
        );
    }

    let next = match Generation::start(config, delivery) {
        Ok(next) => Arc::new(next),
        Err(e) => {
            error!(error = %e, generation = %current.id, "reloaded config rejected, keeping previous generation");
            return false;
        }
    };

    let previous = state.swap(Arc::clone(&next)).await;
    info!(previous = %previous.id, current = %next.id, "configuration reloaded");

    // requests still holding `previous` after this point have their events dropped by `ingest`
    tokio::spawn(async move { previous.retire().await });
    true
}
