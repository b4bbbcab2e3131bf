//! Application state shared across request handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Shared application state.
///
/// Passed to the health handlers via Axum's state extractor and updated by
/// the resync watcher.
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Default)]
struct AppStateInner {
    ready: AtomicBool,
    last_resync: RwLock<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the first resync has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Record a completed resync. The first one marks the process ready.
    pub async fn mark_synced(&self) {
        *self.inner.last_resync.write().await = Some(Utc::now());
        self.inner.ready.store(true, Ordering::SeqCst);
    }

    pub async fn last_resync(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_resync.read().await
    }
}
