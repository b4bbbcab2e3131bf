//! In-process cluster for tests and local runs.
//!
//! `FakeCluster` plays both the API server and the watcher: it holds the
//! authoritative pods and a [`ClusterStore`] snapshot that reads are served
//! from. With write lag enabled, patches land in the authoritative state but
//! stay invisible to reads until [`FakeCluster::flush`], which reproduces the
//! stale-list window the allocation engine has to tolerate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use zonecost_events::{annotations, Node, ObjectKey, Replica, ReplicaGroup, Workload};
use zonecost_id::{GroupUid, WorkloadUid};

use super::{ClusterError, ClusterReader, ClusterResult, ClusterStore, ReplicaWriter};

/// Cluster double backed by a [`ClusterStore`].
pub struct FakeCluster {
    store: Arc<ClusterStore>,

    /// Pods as the API server has them.
    live: Mutex<HashMap<ObjectKey, Replica>>,

    /// Pods patched since the last flush.
    unflushed: Mutex<HashSet<ObjectKey>>,

    write_lag: AtomicBool,

    /// Errors returned by upcoming patches, oldest first.
    failures: Mutex<VecDeque<ClusterError>>,

    patch_delay: Mutex<Option<Duration>>,

    patches: AtomicU64,
    next_version: AtomicU64,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            store: Arc::new(ClusterStore::new()),
            live: Mutex::new(HashMap::new()),
            unflushed: Mutex::new(HashSet::new()),
            write_lag: AtomicBool::new(false),
            failures: Mutex::new(VecDeque::new()),
            patch_delay: Mutex::new(None),
            patches: AtomicU64::new(0),
            next_version: AtomicU64::new(1000),
        }
    }

    /// Snapshot that reads are served from.
    pub fn store(&self) -> Arc<ClusterStore> {
        Arc::clone(&self.store)
    }

    /// When enabled, successful patches are not visible to reads until
    /// [`flush`](Self::flush).
    pub fn set_write_lag(&self, enabled: bool) {
        self.write_lag.store(enabled, Ordering::SeqCst);
    }

    /// Hold each patch for `delay` before applying it.
    pub async fn set_patch_delay(&self, delay: Option<Duration>) {
        *self.patch_delay.lock().await = delay;
    }

    /// Fail the next patch with `error`. Queued errors are consumed in order.
    pub async fn fail_next_patch(&self, error: ClusterError) {
        self.failures.lock().await.push_back(error);
    }

    /// Number of patch attempts, including failed ones.
    pub fn patch_count(&self) -> u64 {
        self.patches.load(Ordering::SeqCst)
    }

    /// Publish every patch made since the last flush. Returns the pods that
    /// became visible.
    pub async fn flush(&self) -> Vec<Replica> {
        let keys: Vec<ObjectKey> = self.unflushed.lock().await.drain().collect();
        let live = self.live.lock().await;
        let mut published = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(replica) = live.get(&key) {
                self.store.upsert_replica(replica.clone()).await;
                published.push(replica.clone());
            }
        }
        debug!(count = published.len(), "flushed pending writes");
        published
    }

    /// The pod as the API server currently has it, regardless of lag.
    pub async fn live_replica(&self, key: &ObjectKey) -> Option<Replica> {
        self.live.lock().await.get(key).cloned()
    }

    pub async fn add_replica(&self, replica: Replica) {
        self.live
            .lock()
            .await
            .insert(replica.key.clone(), replica.clone());
        self.store.upsert_replica(replica).await;
    }

    /// Change a pod on the API server without touching the snapshot, as an
    /// unrelated controller would. Returns the new version.
    pub async fn touch_live(&self, key: &ObjectKey) -> Option<Replica> {
        let mut live = self.live.lock().await;
        let replica = live.get_mut(key)?;
        replica.resource_version = self.next_version().into();
        Some(replica.clone())
    }

    pub async fn remove_replica(&self, key: &ObjectKey) -> Option<Replica> {
        self.live.lock().await.remove(key);
        self.unflushed.lock().await.remove(key);
        self.store.remove_replica(key).await
    }

    pub async fn add_group(&self, group: ReplicaGroup) {
        self.store.upsert_group(group).await;
    }

    pub async fn add_workload(&self, workload: Workload) {
        self.store.upsert_workload(workload).await;
    }

    pub async fn add_node(&self, node: Node) {
        self.store.upsert_node(node).await;
    }

    /// Make a pod visible to reads now, or at the next flush under write lag.
    async fn publish(&self, replica: Replica) {
        if self.write_lag.load(Ordering::SeqCst) {
            self.unflushed.lock().await.insert(replica.key);
        } else {
            self.store.upsert_replica(replica).await;
        }
    }

    fn next_version(&self) -> String {
        self.next_version.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterReader for FakeCluster {
    async fn get_replica(&self, key: &ObjectKey) -> ClusterResult<Replica> {
        self.store.get_replica(key).await
    }

    async fn list_replicas_in_group(&self, group: GroupUid) -> ClusterResult<Vec<Replica>> {
        self.store.list_replicas_in_group(group).await
    }

    async fn get_group(&self, key: &ObjectKey) -> ClusterResult<ReplicaGroup> {
        self.store.get_group(key).await
    }

    async fn list_groups_for_workload(
        &self,
        workload: WorkloadUid,
    ) -> ClusterResult<Vec<ReplicaGroup>> {
        self.store.list_groups_for_workload(workload).await
    }

    async fn get_workload(&self, key: &ObjectKey) -> ClusterResult<Workload> {
        self.store.get_workload(key).await
    }

    async fn get_node(&self, name: &str) -> ClusterResult<Node> {
        self.store.get_node(name).await
    }

    async fn record(&self, replica: Replica) {
        self.publish(replica).await;
    }
}

#[async_trait]
impl ReplicaWriter for FakeCluster {
    async fn fetch_replica(&self, key: &ObjectKey) -> ClusterResult<Replica> {
        self.live
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("pod", key))
    }

    async fn patch_deletion_cost(&self, replica: &Replica, cost: i32) -> ClusterResult<Replica> {
        self.patches.fetch_add(1, Ordering::SeqCst);

        let delay = *self.patch_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }

        let updated = {
            let mut live = self.live.lock().await;
            let current = live
                .get_mut(&replica.key)
                .filter(|current| current.uid == replica.uid)
                .ok_or_else(|| ClusterError::not_found("pod", &replica.key))?;

            if current.resource_version != replica.resource_version {
                return Err(ClusterError::Conflict(format!(
                    "pod {} is at version {}, not {}",
                    replica.key,
                    current.resource_version.as_str(),
                    replica.resource_version.as_str()
                )));
            }

            current
                .annotations
                .insert(annotations::POD_DELETION_COST.to_string(), cost.to_string());
            current.resource_version = self.next_version().into();
            current.clone()
        };

        self.publish(updated.clone()).await;

        debug!(pod = %updated.key, cost, "patched deletion cost");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonecost_id::ReplicaUid;

    fn pod(name: &str) -> Replica {
        Replica::new(ReplicaUid::new(), ObjectKey::new("default", name))
    }

    #[tokio::test]
    async fn test_patch_applies_and_bumps_version() {
        let cluster = FakeCluster::new();
        let p = pod("web-1");
        cluster.add_replica(p.clone()).await;

        let updated = cluster.patch_deletion_cost(&p, 42).await.unwrap();
        assert_eq!(updated.deletion_cost(), Some(42));
        assert_ne!(updated.resource_version, p.resource_version);
        assert_eq!(cluster.get_replica(&p.key).await.unwrap(), updated);
        assert_eq!(cluster.patch_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let cluster = FakeCluster::new();
        let p = pod("web-1");
        cluster.add_replica(p.clone()).await;
        cluster.patch_deletion_cost(&p, 42).await.unwrap();

        let err = cluster.patch_deletion_cost(&p, 41).await.unwrap_err();
        assert!(matches!(err, ClusterError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_write_lag_hides_patch_until_flush() {
        let cluster = FakeCluster::new();
        cluster.set_write_lag(true);
        let p = pod("web-1");
        cluster.add_replica(p.clone()).await;

        cluster.patch_deletion_cost(&p, 42).await.unwrap();
        assert_eq!(cluster.get_replica(&p.key).await.unwrap().deletion_cost(), None);
        assert_eq!(
            cluster.live_replica(&p.key).await.unwrap().deletion_cost(),
            Some(42)
        );

        let published = cluster.flush().await;
        assert_eq!(published.len(), 1);
        assert_eq!(
            cluster.get_replica(&p.key).await.unwrap().deletion_cost(),
            Some(42)
        );
    }

    #[tokio::test]
    async fn test_touch_live_leaves_snapshot_behind() {
        let cluster = FakeCluster::new();
        let p = pod("web-1");
        cluster.add_replica(p.clone()).await;

        let touched = cluster.touch_live(&p.key).await.unwrap();
        assert_eq!(cluster.fetch_replica(&p.key).await.unwrap(), touched);
        assert_eq!(cluster.get_replica(&p.key).await.unwrap(), p);

        cluster.record(touched.clone()).await;
        assert_eq!(cluster.get_replica(&p.key).await.unwrap(), touched);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let cluster = FakeCluster::new();
        let p = pod("web-1");
        cluster.add_replica(p.clone()).await;
        cluster
            .fail_next_patch(ClusterError::Transport("connection reset".into()))
            .await;

        assert!(matches!(
            cluster.patch_deletion_cost(&p, 1).await,
            Err(ClusterError::Transport(_))
        ));
        assert!(cluster.patch_deletion_cost(&p, 1).await.is_ok());
        assert_eq!(cluster.patch_count(), 2);
    }

    #[tokio::test]
    async fn test_patch_missing_pod() {
        let cluster = FakeCluster::new();
        let err = cluster.patch_deletion_cost(&pod("ghost"), 1).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound { kind: "pod", .. }));
    }
}
