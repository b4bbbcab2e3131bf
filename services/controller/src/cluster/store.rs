//! Indexed in-memory snapshot of the cluster.
//!
//! The store is what the allocation engine reads. It is refreshed by the
//! resync watcher (or directly by the fake cluster) and can trail the API
//! server by up to one resync interval, which is the staleness the pending
//! assignments exist to cover.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use zonecost_events::{Node, ObjectKey, Replica, ReplicaGroup, Workload};
use zonecost_id::{GroupUid, WorkloadUid};

use super::{ClusterError, ClusterReader, ClusterResult};

/// Changes produced by replacing one kind's contents wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<T> {
    /// Objects that are new or differ from what was stored.
    pub applied: Vec<T>,
    /// Objects that were stored but are no longer present.
    pub deleted: Vec<T>,
}

impl<T> Default for Delta<T> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T> Delta<T> {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    replicas: HashMap<ObjectKey, Replica>,
    replicas_by_group: HashMap<GroupUid, BTreeSet<ObjectKey>>,
    groups: HashMap<ObjectKey, ReplicaGroup>,
    groups_by_workload: HashMap<WorkloadUid, BTreeSet<ObjectKey>>,
    workloads: HashMap<ObjectKey, Workload>,
    nodes: HashMap<String, Node>,
}

impl StoreInner {
    fn upsert_replica(&mut self, replica: Replica) -> bool {
        let key = replica.key.clone();
        let new_group = replica.group.as_ref().map(|g| g.uid);
        match self.replicas.insert(key.clone(), replica) {
            Some(old) => {
                let old_group = old.group.as_ref().map(|g| g.uid);
                if old_group != new_group {
                    unindex(&mut self.replicas_by_group, old_group, &key);
                    index(&mut self.replicas_by_group, new_group, &key);
                }
                Some(&old) != self.replicas.get(&key)
            }
            None => {
                index(&mut self.replicas_by_group, new_group, &key);
                true
            }
        }
    }

    fn remove_replica(&mut self, key: &ObjectKey) -> Option<Replica> {
        let old = self.replicas.remove(key)?;
        unindex(
            &mut self.replicas_by_group,
            old.group.as_ref().map(|g| g.uid),
            key,
        );
        Some(old)
    }

    fn upsert_group(&mut self, group: ReplicaGroup) -> bool {
        let key = group.key.clone();
        let new_owner = group.workload.as_ref().map(|w| w.uid);
        match self.groups.insert(key.clone(), group) {
            Some(old) => {
                let old_owner = old.workload.as_ref().map(|w| w.uid);
                if old_owner != new_owner {
                    unindex(&mut self.groups_by_workload, old_owner, &key);
                    index(&mut self.groups_by_workload, new_owner, &key);
                }
                Some(&old) != self.groups.get(&key)
            }
            None => {
                index(&mut self.groups_by_workload, new_owner, &key);
                true
            }
        }
    }

    fn remove_group(&mut self, key: &ObjectKey) -> Option<ReplicaGroup> {
        let old = self.groups.remove(key)?;
        unindex(
            &mut self.groups_by_workload,
            old.workload.as_ref().map(|w| w.uid),
            key,
        );
        Some(old)
    }
}

fn index<U: std::hash::Hash + Eq>(
    idx: &mut HashMap<U, BTreeSet<ObjectKey>>,
    owner: Option<U>,
    key: &ObjectKey,
) {
    if let Some(owner) = owner {
        idx.entry(owner).or_default().insert(key.clone());
    }
}

fn unindex<U: std::hash::Hash + Eq>(
    idx: &mut HashMap<U, BTreeSet<ObjectKey>>,
    owner: Option<U>,
    key: &ObjectKey,
) {
    if let Some(owner) = owner {
        if let Some(keys) = idx.get_mut(&owner) {
            keys.remove(key);
            if keys.is_empty() {
                idx.remove(&owner);
            }
        }
    }
}

/// In-memory cluster snapshot with owner indexes.
#[derive(Debug, Default)]
pub struct ClusterStore {
    inner: RwLock<StoreInner>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pod. Returns true if the stored pod changed.
    pub async fn upsert_replica(&self, replica: Replica) -> bool {
        self.inner.write().await.upsert_replica(replica)
    }

    pub async fn remove_replica(&self, key: &ObjectKey) -> Option<Replica> {
        self.inner.write().await.remove_replica(key)
    }

    pub async fn upsert_group(&self, group: ReplicaGroup) -> bool {
        self.inner.write().await.upsert_group(group)
    }

    pub async fn remove_group(&self, key: &ObjectKey) -> Option<ReplicaGroup> {
        self.inner.write().await.remove_group(key)
    }

    pub async fn upsert_workload(&self, workload: Workload) -> bool {
        let mut inner = self.inner.write().await;
        let key = workload.key.clone();
        let changed = inner.workloads.get(&key) != Some(&workload);
        inner.workloads.insert(key, workload);
        changed
    }

    pub async fn remove_workload(&self, key: &ObjectKey) -> Option<Workload> {
        self.inner.write().await.workloads.remove(key)
    }

    pub async fn upsert_node(&self, node: Node) -> bool {
        let mut inner = self.inner.write().await;
        let changed = inner.nodes.get(&node.name) != Some(&node);
        inner.nodes.insert(node.name.clone(), node);
        changed
    }

    pub async fn remove_node(&self, name: &str) -> Option<Node> {
        self.inner.write().await.nodes.remove(name)
    }

    /// Replace all pods with a fresh listing.
    pub async fn sync_replicas(&self, replicas: Vec<Replica>) -> Delta<Replica> {
        let mut inner = self.inner.write().await;
        let mut stale: HashSet<ObjectKey> = inner.replicas.keys().cloned().collect();
        let mut delta = Delta::default();

        for replica in replicas {
            stale.remove(&replica.key);
            if inner.upsert_replica(replica.clone()) {
                delta.applied.push(replica);
            }
        }
        for key in stale {
            if let Some(old) = inner.remove_replica(&key) {
                delta.deleted.push(old);
            }
        }
        delta
    }

    /// Replace all replica sets with a fresh listing.
    pub async fn sync_groups(&self, groups: Vec<ReplicaGroup>) -> Delta<ReplicaGroup> {
        let mut inner = self.inner.write().await;
        let mut stale: HashSet<ObjectKey> = inner.groups.keys().cloned().collect();
        let mut delta = Delta::default();

        for group in groups {
            stale.remove(&group.key);
            if inner.upsert_group(group.clone()) {
                delta.applied.push(group);
            }
        }
        for key in stale {
            if let Some(old) = inner.remove_group(&key) {
                delta.deleted.push(old);
            }
        }
        delta
    }

    /// Replace all deployments with a fresh listing.
    pub async fn sync_workloads(&self, workloads: Vec<Workload>) -> Delta<Workload> {
        let mut inner = self.inner.write().await;
        let mut stale: HashSet<ObjectKey> = inner.workloads.keys().cloned().collect();
        let mut delta = Delta::default();

        for workload in workloads {
            stale.remove(&workload.key);
            if inner.workloads.get(&workload.key) != Some(&workload) {
                inner.workloads.insert(workload.key.clone(), workload.clone());
                delta.applied.push(workload);
            }
        }
        for key in stale {
            if let Some(old) = inner.workloads.remove(&key) {
                delta.deleted.push(old);
            }
        }
        delta
    }

    /// Replace all nodes with a fresh listing.
    pub async fn sync_nodes(&self, nodes: Vec<Node>) -> Delta<Node> {
        let mut inner = self.inner.write().await;
        let mut stale: HashSet<String> = inner.nodes.keys().cloned().collect();
        let mut delta = Delta::default();

        for node in nodes {
            stale.remove(&node.name);
            if inner.nodes.get(&node.name) != Some(&node) {
                inner.nodes.insert(node.name.clone(), node.clone());
                delta.applied.push(node);
            }
        }
        for name in stale {
            if let Some(old) = inner.nodes.remove(&name) {
                delta.deleted.push(old);
            }
        }
        delta
    }

    pub async fn replica_count(&self) -> usize {
        self.inner.read().await.replicas.len()
    }
}

#[async_trait]
impl ClusterReader for ClusterStore {
    async fn get_replica(&self, key: &ObjectKey) -> ClusterResult<Replica> {
        self.inner
            .read()
            .await
            .replicas
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("pod", key))
    }

    async fn list_replicas_in_group(&self, group: GroupUid) -> ClusterResult<Vec<Replica>> {
        let inner = self.inner.read().await;
        let Some(keys) = inner.replicas_by_group.get(&group) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| inner.replicas.get(k).cloned())
            .collect())
    }

    async fn get_group(&self, key: &ObjectKey) -> ClusterResult<ReplicaGroup> {
        self.inner
            .read()
            .await
            .groups
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("replicaset", key))
    }

    async fn list_groups_for_workload(
        &self,
        workload: WorkloadUid,
    ) -> ClusterResult<Vec<ReplicaGroup>> {
        let inner = self.inner.read().await;
        let Some(keys) = inner.groups_by_workload.get(&workload) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| inner.groups.get(k).cloned())
            .collect())
    }

    async fn get_workload(&self, key: &ObjectKey) -> ClusterResult<Workload> {
        self.inner
            .read()
            .await
            .workloads
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("deployment", key))
    }

    async fn get_node(&self, name: &str) -> ClusterResult<Node> {
        self.inner
            .read()
            .await
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::not_found("node", name))
    }

    async fn record(&self, replica: Replica) {
        self.upsert_replica(replica).await;
    }
}
