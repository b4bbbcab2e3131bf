//! Deduplicating work queue of pod keys.
//!
//! A key is held at most once in the queue and is never handed to two
//! consumers at the same time. Adding a key that is being processed marks it
//! dirty; it goes back on the queue when processing finishes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use zonecost_events::ObjectKey;

use crate::shutdown::signalled;

#[derive(Debug, Default)]
struct QueueInner {
    order: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
}

/// Work queue shared by the worker loop and its tasks.
#[derive(Debug, Default)]
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key unless it is already queued.
    pub async fn add(&self, key: ObjectKey) {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.contains(&key) {
            inner.dirty.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.order.push_back(key);
            self.notify.notify_one();
        }
    }

    /// Queue a key after `delay`, unless shutdown comes first.
    pub fn add_after(
        self: &Arc<Self>,
        key: ObjectKey,
        delay: Duration,
        shutdown: &watch::Receiver<bool>,
    ) {
        let queue = Arc::clone(self);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.add(key).await,
                _ = signalled(&shutdown) => {}
            }
        });
    }

    /// Wait for the next key and mark it in flight.
    ///
    /// Cancel safe: a key is only taken once the future completes.
    pub async fn pop(&self) -> ObjectKey {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.order.pop_front() {
                    inner.queued.remove(&key);
                    inner.in_flight.insert(key.clone());
                    return key;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Finish processing a key, requeueing it if it was added meanwhile.
    pub async fn done(&self, key: &ObjectKey) {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(key);
        if inner.dirty.remove(key) && inner.queued.insert(key.clone()) {
            inner.order.push_back(key.clone());
            self.notify.notify_one();
        }
    }

    /// Keys waiting to be processed.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.order.len()
    }

    /// True when nothing is queued and nothing is in flight.
    pub async fn is_idle(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.order.is_empty() && inner.in_flight.is_empty()
    }
}
