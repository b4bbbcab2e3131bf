//! Cluster access used by the allocation engine.
//!
//! Reads go through [`ClusterReader`], which in production is the
//! [`ClusterStore`] snapshot refreshed by the resync watcher and may lag the
//! API server. Writes go through [`ReplicaWriter`], which in production is the
//! Kubernetes REST client and is conditional on the pod's resource version.

mod fake;
mod store;

use async_trait::async_trait;
use thiserror::Error;
use zonecost_events::{Node, ObjectKey, Replica, ReplicaGroup, Workload};
use zonecost_id::{GroupUid, WorkloadUid};
use zonecost_reconcile::AllocationError;

pub use fake::FakeCluster;
pub use store::{ClusterStore, Delta};

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors returned by cluster reads and writes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} has no controlling {owner}")]
    OwnerMissing {
        kind: &'static str,
        name: String,
        owner: &'static str,
    },

    /// The object changed since the caller read it.
    #[error("conflict updating {0}")]
    Conflict(String),

    /// The API server refused the request as invalid.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("API request failed: {0}")]
    Transport(String),

    /// The API server returned an object we could not convert.
    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("cancelled")]
    Cancelled,
}

impl ClusterError {
    pub fn not_found(kind: &'static str, name: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

impl From<ClusterError> for AllocationError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound { .. } => AllocationError::NotFound(err.to_string()),
            ClusterError::OwnerMissing { .. } => AllocationError::OwnerMissing(err.to_string()),
            ClusterError::Conflict(msg) => AllocationError::Conflict(msg),
            ClusterError::Cancelled => AllocationError::Cancelled,
            ClusterError::Rejected(_) | ClusterError::Transport(_) | ClusterError::Invalid(_) => {
                AllocationError::TransientIo(err.to_string())
            }
        }
    }
}

/// Read access to pods, replica sets, deployments and nodes.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get_replica(&self, key: &ObjectKey) -> ClusterResult<Replica>;

    /// Pods whose controlling owner is the given replica set.
    async fn list_replicas_in_group(&self, group: GroupUid) -> ClusterResult<Vec<Replica>>;

    async fn get_group(&self, key: &ObjectKey) -> ClusterResult<ReplicaGroup>;

    /// Replica sets whose controlling owner is the given deployment.
    async fn list_groups_for_workload(&self, workload: WorkloadUid)
        -> ClusterResult<Vec<ReplicaGroup>>;

    async fn get_workload(&self, key: &ObjectKey) -> ClusterResult<Workload>;

    async fn get_node(&self, name: &str) -> ClusterResult<Node>;

    /// Fold a pod read from or written to the API server into the snapshot
    /// behind this reader. Readers without a snapshot ignore it.
    async fn record(&self, _replica: Replica) {}

    /// Walk pod → replica set → deployment.
    ///
    /// Fails with `OwnerMissing` if either hop has no controlling owner, and
    /// with `NotFound` if the referenced owner no longer exists or has been
    /// replaced by a different object of the same name.
    async fn workload_for(&self, replica: &Replica) -> ClusterResult<Workload> {
        let Some(group_ref) = &replica.group else {
            return Err(ClusterError::OwnerMissing {
                kind: "pod",
                name: replica.key.to_string(),
                owner: "replicaset",
            });
        };

        let group_key = ObjectKey::new(&replica.key.namespace, &group_ref.name);
        let group = self.get_group(&group_key).await?;
        if group.uid != group_ref.uid {
            return Err(ClusterError::not_found("replicaset", &group_key));
        }

        let Some(workload_ref) = &group.workload else {
            return Err(ClusterError::OwnerMissing {
                kind: "replicaset",
                name: group_key.to_string(),
                owner: "deployment",
            });
        };

        let workload_key = ObjectKey::new(&group.key.namespace, &workload_ref.name);
        let workload = self.get_workload(&workload_key).await?;
        if workload.uid != workload_ref.uid {
            return Err(ClusterError::not_found("deployment", &workload_key));
        }

        Ok(workload)
    }
}

/// Direct access to pods on the API server.
#[async_trait]
pub trait ReplicaWriter: Send + Sync {
    /// Read the pod from the API server, bypassing any snapshot.
    async fn fetch_replica(&self, key: &ObjectKey) -> ClusterResult<Replica>;

    /// Merge the deletion-cost annotation onto the pod.
    ///
    /// The write is conditional on `replica.resource_version`; if the pod has
    /// changed since it was read the call fails with `Conflict`. Returns the
    /// pod as stored after the write.
    async fn patch_deletion_cost(&self, replica: &Replica, cost: i32) -> ClusterResult<Replica>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let not_found: AllocationError = ClusterError::not_found("pod", "default/web-1").into();
        assert!(not_found.is_not_found());

        let owner: AllocationError = ClusterError::OwnerMissing {
            kind: "pod",
            name: "default/web-1".into(),
            owner: "replicaset",
        }
        .into();
        assert_eq!(
            owner,
            AllocationError::OwnerMissing("pod default/web-1 has no controlling replicaset".into())
        );

        let rejected: AllocationError = ClusterError::Rejected("bad value".into()).into();
        assert!(matches!(rejected, AllocationError::TransientIo(_)));

        let cancelled: AllocationError = ClusterError::Cancelled.into();
        assert_eq!(cancelled, AllocationError::Cancelled);
    }
}
