//! Shutdown signalling.
//!
//! The process holds a single `watch::Sender<bool>`; every long-running task
//! gets a receiver and stops once the value flips to `true`.

use std::future::Future;

use tokio::sync::watch;

use crate::cluster::{ClusterError, ClusterResult};

/// Returns true once shutdown has been signalled.
pub fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolve when shutdown is signalled or the sender is dropped.
pub async fn signalled(shutdown: &watch::Receiver<bool>) {
    let mut shutdown = shutdown.clone();
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Run a cluster call, abandoning it with [`ClusterError::Cancelled`] if
/// shutdown is signalled first.
///
/// A dropped sender does not cancel; the call simply runs to completion.
pub async fn cancellable<T, F>(shutdown: &watch::Receiver<bool>, call: F) -> ClusterResult<T>
where
    F: Future<Output = ClusterResult<T>>,
{
    if is_shutdown(shutdown) {
        return Err(ClusterError::Cancelled);
    }

    let mut shutdown = shutdown.clone();
    tokio::select! {
        biased;
        Ok(_) = shutdown.wait_for(|stop| *stop) => Err(ClusterError::Cancelled),
        result = call => result,
    }
}
