use std::sync::Arc;

use tokio::sync::RwLock;

use crate::generation::Generation;

/// Shared server state: the active configuration generation.
///
/// Handlers clone the `Arc` and release the lock before dispatching, so a
/// reload never waits on in-flight requests.
pub struct AppState {
    generation: RwLock<Arc<Generation>>,
}

impl AppState {
    pub fn new(generation: Arc<Generation>) -> Self {
        Self {
            generation: RwLock::new(generation),
        }
    }

    pub async fn current(&self) -> Arc<Generation> {
        Arc::clone(&*self.generation.read().await)
    }

    /// Install `next` and return the generation it replaced.
    pub async fn swap(&self, next: Arc<Generation>) -> Arc<Generation> {
        let mut guard = self.generation.write().await;
        std::mem::replace(&mut *guard, next)
    }
}
