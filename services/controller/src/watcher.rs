//! Periodic resync against the API server.
//!
//! Each pass lists pods, replica sets, deployments and nodes, replaces the
//! store's contents, and turns what changed into [`ClusterEvent`]s for the
//! worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument};
use zonecost_events::{ClusterEvent, Node, Replica, ReplicaGroup, Workload};

use crate::cluster::{ClusterResult, ClusterStore};
use crate::kube::KubeClient;
use crate::state::AppState;

/// Full listings of the kinds the controller tracks.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_replicas(&self) -> ClusterResult<Vec<Replica>>;
    async fn list_groups(&self) -> ClusterResult<Vec<ReplicaGroup>>;
    async fn list_workloads(&self) -> ClusterResult<Vec<Workload>>;
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>>;
}

#[async_trait]
impl ClusterSource for KubeClient {
    async fn list_replicas(&self) -> ClusterResult<Vec<Replica>> {
        self.list_pods().await
    }

    async fn list_groups(&self) -> ClusterResult<Vec<ReplicaGroup>> {
        self.list_replica_sets().await
    }

    async fn list_workloads(&self) -> ClusterResult<Vec<Workload>> {
        self.list_deployments().await
    }

    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        KubeClient::list_nodes(self).await
    }
}

/// Counts from one resync pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResyncStats {
    pub replicas_applied: usize,
    pub replicas_deleted: usize,
    pub workloads_applied: usize,
    pub workloads_deleted: usize,
    pub groups_changed: usize,
    pub nodes_changed: usize,
}

/// Keeps the [`ClusterStore`] in step with the API server.
pub struct ResyncWatcher {
    source: Arc<dyn ClusterSource>,
    store: Arc<ClusterStore>,
    events: mpsc::Sender<ClusterEvent>,
    state: AppState,
    interval: Duration,
}

impl ResyncWatcher {
    pub fn new(
        source: Arc<dyn ClusterSource>,
        store: Arc<ClusterStore>,
        events: mpsc::Sender<ClusterEvent>,
        state: AppState,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            events,
            state,
            interval,
        }
    }

    /// Resync immediately, then every interval, until shutdown.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting resync watcher"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.resync().await {
                        Ok(stats) => {
                            self.state.mark_synced().await;
                            if stats != ResyncStats::default() {
                                debug!(?stats, "resync complete");
                            }
                        }
                        Err(e) => error!(error = %e, "Resync failed"),
                    }
                    if self.events.is_closed() {
                        info!("Event channel closed, resync watcher stopping");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Resync watcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one pass. Nothing is applied unless all four listings succeed.
    pub async fn resync(&self) -> ClusterResult<ResyncStats> {
        let (nodes, groups, workloads, replicas) = tokio::try_join!(
            self.source.list_nodes(),
            self.source.list_groups(),
            self.source.list_workloads(),
            self.source.list_replicas(),
        )?;

        let mut stats = ResyncStats {
            nodes_changed: self.store.sync_nodes(nodes).await.applied.len(),
            groups_changed: self.store.sync_groups(groups).await.applied.len(),
            ..Default::default()
        };

        // Owners first so the worker can walk the chain for new pods.
        let workload_delta = self.store.sync_workloads(workloads).await;
        let replica_delta = self.store.sync_replicas(replicas).await;

        stats.workloads_applied = workload_delta.applied.len();
        stats.workloads_deleted = workload_delta.deleted.len();
        stats.replicas_applied = replica_delta.applied.len();
        stats.replicas_deleted = replica_delta.deleted.len();

        let events = workload_delta
            .applied
            .into_iter()
            .map(ClusterEvent::workload_applied)
            .chain(
                workload_delta
                    .deleted
                    .into_iter()
                    .map(ClusterEvent::workload_deleted),
            )
            .chain(
                replica_delta
                    .applied
                    .into_iter()
                    .map(ClusterEvent::replica_applied),
            )
            .chain(
                replica_delta
                    .deleted
                    .into_iter()
                    .map(ClusterEvent::replica_deleted),
            );

        for event in events {
            if self.events.send(event).await.is_err() {
                break;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterError, ClusterReader};
    use tokio::sync::Mutex;
    use zonecost_events::{ChangeKind, ObjectKey};
    use zonecost_id::{GroupUid, ReplicaUid, WorkloadUid};

    #[derive(Default)]
    struct StaticSource {
        replicas: Mutex<Vec<Replica>>,
        groups: Mutex<Vec<ReplicaGroup>>,
        workloads: Mutex<Vec<Workload>>,
        nodes: Mutex<Vec<Node>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl ClusterSource for StaticSource {
        async fn list_replicas(&self) -> ClusterResult<Vec<Replica>> {
            if *self.fail.lock().await {
                return Err(ClusterError::Transport("connection refused".into()));
            }
            Ok(self.replicas.lock().await.clone())
        }

        async fn list_groups(&self) -> ClusterResult<Vec<ReplicaGroup>> {
            Ok(self.groups.lock().await.clone())
        }

        async fn list_workloads(&self) -> ClusterResult<Vec<Workload>> {
            Ok(self.workloads.lock().await.clone())
        }

        async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
            Ok(self.nodes.lock().await.clone())
        }
    }

    fn setup() -> (
        Arc<StaticSource>,
        Arc<ClusterStore>,
        ResyncWatcher,
        mpsc::Receiver<ClusterEvent>,
    ) {
        let source = Arc::new(StaticSource::default());
        let store = Arc::new(ClusterStore::new());
        let (tx, rx) = mpsc::channel(64);
        let watcher = ResyncWatcher::new(
            source.clone(),
            store.clone(),
            tx,
            AppState::new(),
            Duration::from_secs(30),
        );
        (source, store, watcher, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ClusterEvent>) -> Vec<ClusterEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_resync_emits_changes_only() {
        let (source, store, watcher, mut rx) = setup();
        let deploy = Workload::new(WorkloadUid::new(), ObjectKey::new("default", "web")).opted_in();
        let rs = ReplicaGroup::new(GroupUid::new(), ObjectKey::new("default", "web-5d8"))
            .owned_by(&deploy);
        let pod = Replica::new(ReplicaUid::new(), ObjectKey::new("default", "web-1")).owned_by(&rs);

        *source.workloads.lock().await = vec![deploy.clone()];
        *source.groups.lock().await = vec![rs.clone()];
        *source.replicas.lock().await = vec![pod.clone()];
        *source.nodes.lock().await = vec![Node::new("node-a").in_zone("a")];

        let stats = watcher.resync().await.unwrap();
        assert_eq!(stats.replicas_applied, 1);
        assert_eq!(stats.workloads_applied, 1);
        assert_eq!(stats.groups_changed, 1);
        assert_eq!(stats.nodes_changed, 1);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ClusterEvent::workload_applied(deploy.clone()),
                ClusterEvent::replica_applied(pod.clone()),
            ]
        );
        assert_eq!(store.workload_for(&pod).await.unwrap(), deploy);

        // Nothing changed.
        assert_eq!(watcher.resync().await.unwrap(), ResyncStats::default());
        assert!(drain(&mut rx).is_empty());

        // Pod removed.
        source.replicas.lock().await.clear();
        let stats = watcher.resync().await.unwrap();
        assert_eq!(stats.replicas_deleted, 1);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), ChangeKind::Deleted);
        assert_eq!(events[0].object_key(), &pod.key);
    }

    #[tokio::test]
    async fn test_failed_listing_applies_nothing() {
        let (source, store, watcher, mut rx) = setup();
        *source.nodes.lock().await = vec![Node::new("node-a")];
        *source.fail.lock().await = true;

        assert!(watcher.resync().await.is_err());
        assert!(store.get_node("node-a").await.is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_run_marks_ready_and_stops() {
        let (_source, _store, watcher, _rx) = setup();
        let state = watcher.state.clone();
        let (tx, shutdown) = watch::channel(false);

        let handle = tokio::spawn(async move { watcher.run(shutdown).await });
        for _ in 0..50 {
            if state.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.is_ready());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
