//! Zone allocator.
//!
//! Picks a deletion cost for a pod that is unique among the pods of its
//! replica set in the same zone. The pod list comes from a snapshot that may
//! trail recent writes, so costs this process has chosen but not yet seen
//! come back are tracked in [`PendingAssignments`] and treated as claimed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use zonecost_events::{Replica, Workload};
use zonecost_id::ReplicaUid;
use zonecost_reconcile::{
    AllocationError, AllocationResult, CostPool, EmptyRange, PendingAssignments, MAX_COST,
    MIN_COST,
};

use super::resolve_zone;
use crate::cluster::{ClusterError, ClusterReader, ReplicaWriter};
use crate::registry::{Allocator, Outcome};
use crate::shutdown::cancellable;

/// Types handled by the zone allocator. Empty is the default.
const ZONE_TYPES: &[&str] = &["zone", ""];

/// Per-pod deletion-cost allocation within a zone.
pub struct ZoneAllocator {
    reader: Arc<dyn ClusterReader>,
    writer: Arc<dyn ReplicaWriter>,
    pending: Arc<PendingAssignments<ReplicaUid>>,
    min_cost: i32,
    max_cost: i32,
}

impl ZoneAllocator {
    pub fn new(
        reader: Arc<dyn ClusterReader>,
        writer: Arc<dyn ReplicaWriter>,
        pending: Arc<PendingAssignments<ReplicaUid>>,
    ) -> Self {
        Self {
            reader,
            writer,
            pending,
            min_cost: MIN_COST,
            max_cost: MAX_COST,
        }
    }

    /// Restrict allocation to `[min, max]`.
    pub fn with_cost_range(mut self, min: i32, max: i32) -> Result<Self, EmptyRange> {
        if min > max {
            return Err(EmptyRange { min, max });
        }
        self.min_cost = min;
        self.max_cost = max;
        Ok(self)
    }

    pub fn pending(&self) -> &Arc<PendingAssignments<ReplicaUid>> {
        &self.pending
    }

    /// Drop the pending entry for a pod that now carries its cost.
    ///
    /// Returns the value that was pending, if any.
    pub async fn observe(&self, replica: &Replica) -> Option<i32> {
        if !replica.has_deletion_cost() {
            return None;
        }
        let cleared = self.pending.delete(&replica.uid).await;
        if let Some(pending) = cleared {
            if replica.deletion_cost() != Some(pending) {
                debug!(
                    pod = %replica.key,
                    pending,
                    "observed cost differs from pending assignment"
                );
            }
        }
        cleared
    }

    /// Forget any pending entry for a deleted pod.
    pub async fn release(&self, uid: ReplicaUid) -> Option<i32> {
        self.pending.delete(&uid).await
    }

    /// Allocate and write a deletion cost for `replica`.
    #[instrument(
        skip_all,
        fields(pod = %replica.key, deployment = %workload.key)
    )]
    pub async fn process(
        &self,
        replica: &Replica,
        workload: &Workload,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<Outcome> {
        if replica.has_deletion_cost() {
            self.observe(replica).await;
            return Ok(Outcome::AlreadyAssigned);
        }
        if replica.is_deleting() {
            return Ok(Outcome::Deleting);
        }

        let mut zones = ZoneCache::default();
        let zone = self
            .zone_of(replica, workload, &mut zones, shutdown)
            .await?;

        let Some(group) = &replica.group else {
            return Err(ClusterError::OwnerMissing {
                kind: "pod",
                name: replica.key.to_string(),
                owner: "replicaset",
            }
            .into());
        };
        let siblings = cancellable(shutdown, self.reader.list_replicas_in_group(group.uid)).await?;

        let mut pool = CostPool::with_range(self.min_cost, self.max_cost);
        let mut in_zone = 0usize;
        for sibling in siblings.iter().filter(|s| s.uid != replica.uid) {
            if self.zone_of(sibling, workload, &mut zones, shutdown).await? != zone {
                continue;
            }
            in_zone += 1;
            match sibling.deletion_cost() {
                Some(cost) => pool.add(cost),
                None => {
                    if let Some(cost) = self.pending.get(&sibling.uid).await {
                        pool.add(cost);
                    }
                }
            }
        }

        let cost = pool.find_next_free()?;
        debug!(zone = %zone, siblings = in_zone, claimed = pool.len() - 1, cost, "chose deletion cost");

        self.pending.set(replica.uid, cost).await;

        match cancellable(shutdown, self.writer.patch_deletion_cost(replica, cost)).await {
            Ok(updated) => {
                info!(zone = %zone, cost, "assigned deletion cost");
                self.reader.record(updated).await;
                Ok(Outcome::Assigned { cost, zone })
            }
            Err(ClusterError::Conflict(msg)) => {
                if self.resolve_conflict(replica, cost, shutdown).await? {
                    return Ok(Outcome::AlreadyAssigned);
                }
                Err(AllocationError::Conflict(msg))
            }
            Err(err @ ClusterError::Rejected(_)) => {
                self.pending.delete(&replica.uid).await;
                Err(err.into())
            }
            Err(err) => {
                if err != ClusterError::Cancelled {
                    warn!(error = %err, cost, "failed to write deletion cost");
                }
                Err(err.into())
            }
        }
    }

    /// Re-read a pod whose write conflicted and fold it into the snapshot.
    ///
    /// Returns true if the pod already carries a cost: an earlier write of
    /// ours the snapshot has not caught up with, or someone else's. That cost
    /// stays pending so siblings keep treating it as claimed. Otherwise the
    /// pending entry is dropped and the pod should be retried against the
    /// fresh version.
    async fn resolve_conflict(
        &self,
        replica: &Replica,
        attempted: i32,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<bool> {
        let fresh = match cancellable(shutdown, self.writer.fetch_replica(&replica.key)).await {
            Ok(fresh) if fresh.uid == replica.uid => fresh,
            Ok(_) | Err(ClusterError::NotFound { .. }) => {
                self.pending.delete(&replica.uid).await;
                return Err(ClusterError::not_found("pod", &replica.key).into());
            }
            // Fresh state unknown, keep pending.
            Err(err) => return Err(err.into()),
        };

        let assigned = fresh.has_deletion_cost();
        let held = fresh.deletion_cost();
        debug!(
            attempted,
            held,
            version = fresh.resource_version.as_str(),
            "write conflicted, refreshed pod"
        );
        self.reader.record(fresh).await;

        match held {
            Some(cost) => self.pending.set(replica.uid, cost).await,
            None => {
                self.pending.delete(&replica.uid).await;
            }
        }
        Ok(assigned)
    }

    /// Zone of the node hosting `replica`. A pod that is not scheduled, or
    /// whose node is gone, is in the empty zone.
    async fn zone_of(
        &self,
        replica: &Replica,
        workload: &Workload,
        zones: &mut ZoneCache,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<String> {
        let Some(node_name) = replica.node_name.as_deref() else {
            return Ok(String::new());
        };
        if let Some(zone) = zones.0.get(node_name) {
            return Ok(zone.clone());
        }

        let node = match cancellable(shutdown, self.reader.get_node(node_name)).await {
            Ok(node) => Some(node),
            Err(ClusterError::NotFound { .. }) => None,
            Err(err) => return Err(AllocationError::from(err)),
        };
        let zone = resolve_zone(node.as_ref(), workload);
        zones.0.insert(node_name.to_string(), zone.clone());
        Ok(zone)
    }
}

/// Node zones resolved during one allocation.
#[derive(Default)]
struct ZoneCache(HashMap<String, String>);

#[async_trait]
impl Allocator for ZoneAllocator {
    fn name(&self) -> &'static str {
        "zone"
    }

    fn accepted_types(&self) -> &[&'static str] {
        ZONE_TYPES
    }

    async fn process(
        &self,
        replica: &Replica,
        workload: &Workload,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<Outcome> {
        ZoneAllocator::process(self, replica, workload, shutdown).await
    }

    async fn observe(&self, replica: &Replica) {
        ZoneAllocator::observe(self, replica).await;
    }

    async fn release(&self, uid: ReplicaUid) {
        ZoneAllocator::release(self, uid).await;
    }
}

impl std::fmt::Debug for ZoneAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneAllocator")
            .field("min_cost", &self.min_cost)
            .field("max_cost", &self.max_cost)
            .finish_non_exhaustive()
    }
}
