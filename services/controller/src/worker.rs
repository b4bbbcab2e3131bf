//! Allocation worker.
//!
//! Turns cluster events into pod keys, and processes keys with bounded
//! parallelism. Failed keys are retried according to the error's
//! [`Disposition`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use zonecost_events::{ChangeKind, ClusterEvent, ObjectKey, Replica, Workload};
use zonecost_reconcile::{
    AllocationError, AllocationResult, Disposition, RetryTracker, DEFAULT_BASE_DELAY,
    DEFAULT_MAX_DELAY,
};

use crate::cluster::ClusterReader;
use crate::filter;
use crate::queue::WorkQueue;
use crate::registry::{AllocatorRegistry, Outcome};
use crate::shutdown::{cancellable, signalled};

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Keys processed at the same time.
    pub max_concurrent: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Event-driven allocation worker.
pub struct AllocationWorker {
    reader: Arc<dyn ClusterReader>,
    registry: Arc<AllocatorRegistry>,
    queue: Arc<WorkQueue>,
    retries: Mutex<RetryTracker<ObjectKey>>,
    max_concurrent: usize,
}

impl AllocationWorker {
    pub fn new(
        reader: Arc<dyn ClusterReader>,
        registry: Arc<AllocatorRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            reader,
            registry,
            queue: Arc::new(WorkQueue::new()),
            retries: Mutex::new(RetryTracker::new(config.base_delay, config.max_delay)),
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Consume events and process keys until shutdown.
    ///
    /// If the event channel closes first, keys already queued are processed
    /// before returning; delayed retries are abandoned.
    #[instrument(skip_all)]
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ClusterEvent>,
        shutdown: watch::Receiver<bool>,
    ) {
        info!(max_concurrent = self.max_concurrent, "Starting allocation worker");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut events_open = true;

        loop {
            if !events_open && tasks.is_empty() && self.queue.is_idle().await {
                info!("Event channel closed and queue drained");
                break;
            }

            tokio::select! {
                biased;
                _ = signalled(&shutdown) => {
                    info!("Allocation worker shutting down");
                    break;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "allocation task failed");
                    }
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event, &shutdown).await,
                    None => events_open = false,
                },
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    // Holding a permit, wait for a key (or anything else).
                    tokio::select! {
                        biased;
                        _ = signalled(&shutdown) => break,
                        key = self.queue.pop() => {
                            let worker = Arc::clone(&self);
                            let shutdown = shutdown.clone();
                            tasks.spawn(async move {
                                worker.process_key(key, &shutdown).await;
                                drop(permit);
                            });
                        }
                        Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                            if let Err(e) = result {
                                warn!(error = %e, "allocation task failed");
                            }
                        }
                        event = events.recv(), if events_open => match event {
                            Some(event) => self.handle_event(event, &shutdown).await,
                            None => events_open = false,
                        },
                    }
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "allocation task failed");
            }
        }
        info!("Allocation worker stopped");
    }

    /// Route one cluster event.
    pub async fn handle_event(&self, event: ClusterEvent, shutdown: &watch::Receiver<bool>) {
        match event {
            ClusterEvent::Replica(e) => match e.kind {
                ChangeKind::Applied => self.on_replica_applied(&e.replica).await,
                ChangeKind::Deleted => {
                    self.registry.release(e.replica.uid).await;
                    self.retries.lock().await.clear(&e.replica.key);
                }
            },
            ClusterEvent::Workload(e) => match e.kind {
                ChangeKind::Applied => self.on_workload_applied(&e.workload, shutdown).await,
                ChangeKind::Deleted => debug!(deployment = %e.workload.key, "deployment deleted"),
            },
        }
    }

    async fn on_replica_applied(&self, replica: &Replica) {
        if replica.has_deletion_cost() {
            self.registry.observe(replica).await;
        }
        if filter::accepts_replica(replica) {
            self.queue.add(replica.key.clone()).await;
        }
    }

    /// Requeue every eligible pod of a deployment that was changed, which is
    /// how pods of a newly opted-in deployment get picked up.
    async fn on_workload_applied(&self, workload: &Workload, shutdown: &watch::Receiver<bool>) {
        if !workload.is_opted_in() {
            return;
        }

        let groups = match cancellable(
            shutdown,
            self.reader.list_groups_for_workload(workload.uid),
        )
        .await
        {
            Ok(groups) => groups,
            Err(e) => {
                warn!(deployment = %workload.key, error = %e, "failed to list replica sets");
                return;
            }
        };

        let mut requeued = 0usize;
        for group in groups {
            let replicas =
                match cancellable(shutdown, self.reader.list_replicas_in_group(group.uid)).await {
                    Ok(replicas) => replicas,
                    Err(e) => {
                        warn!(replicaset = %group.key, error = %e, "failed to list pods");
                        continue;
                    }
                };
            for replica in replicas {
                if filter::requeue_on_workload_change(&replica, workload) {
                    self.queue.add(replica.key).await;
                    requeued += 1;
                }
            }
        }
        debug!(deployment = %workload.key, requeued, "requeued pods for deployment");
    }

    #[instrument(skip_all, fields(namespace = %key.namespace, pod = %key.name))]
    async fn process_key(&self, key: ObjectKey, shutdown: &watch::Receiver<bool>) {
        match self.reconcile(&key, shutdown).await {
            Ok(outcome) => {
                self.retries.lock().await.clear(&key);
                debug!(?outcome, "processed pod");
            }
            Err(err) => self.handle_error(&key, err, shutdown).await,
        }
        self.queue.done(&key).await;
    }

    async fn reconcile(
        &self,
        key: &ObjectKey,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<Outcome> {
        let replica = cancellable(shutdown, self.reader.get_replica(key)).await?;

        if replica.has_deletion_cost() {
            self.registry.observe(&replica).await;
            return Ok(Outcome::AlreadyAssigned);
        }
        if !filter::accepts_replica(&replica) {
            return Ok(Outcome::Skipped);
        }

        let workload = cancellable(shutdown, self.reader.workload_for(&replica)).await?;
        if !filter::accepts(&replica, &workload) {
            return Ok(Outcome::Skipped);
        }

        self.registry.dispatch(&replica, &workload, shutdown).await
    }

    async fn handle_error(
        &self,
        key: &ObjectKey,
        err: AllocationError,
        shutdown: &watch::Receiver<bool>,
    ) {
        let disposition = err.disposition();
        match disposition {
            Disposition::Drop => {
                self.retries.lock().await.clear(key);
                match &err {
                    AllocationError::OwnerMissing(_) => {
                        warn!(error = %err, %disposition, "dropping pod")
                    }
                    _ => debug!(error = %err, %disposition, "dropping pod"),
                }
            }
            Disposition::RequeueNow => {
                // Only the first conflict in a row is retried at once; the
                // allocator has refreshed the pod by then.
                let (repeated, delay) = {
                    let mut retries = self.retries.lock().await;
                    let repeated = retries.failures(key) > 0;
                    (repeated, retries.record_failure(key.clone()))
                };
                if repeated {
                    warn!(error = %err, %disposition, ?delay, "pod keeps conflicting, retrying later");
                    self.queue.add_after(key.clone(), delay, shutdown);
                } else {
                    debug!(error = %err, %disposition, "requeueing pod");
                    self.queue.add(key.clone()).await;
                }
            }
            Disposition::Backoff => {
                let delay = self.retries.lock().await.record_failure(key.clone());
                warn!(
                    error = %err,
                    %disposition,
                    ?delay,
                    "allocation failed, retrying later"
                );
                self.queue.add_after(key.clone(), delay, shutdown);
            }
        }
    }
}
