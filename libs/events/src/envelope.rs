//! Change events delivered to the allocation worker.

use serde::{Deserialize, Serialize};

use crate::types::{ObjectKey, Replica, Workload};

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The object was created or modified.
    Applied,
    /// The object is gone from the API server.
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Applied => write!(f, "applied"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A pod changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEvent {
    pub kind: ChangeKind,
    pub replica: Replica,
}

/// A deployment changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadEvent {
    pub kind: ChangeKind,
    pub workload: Workload,
}

/// A cluster change, tagged by object kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum ClusterEvent {
    Replica(ReplicaEvent),
    Workload(WorkloadEvent),
}

impl ClusterEvent {
    pub fn replica_applied(replica: Replica) -> Self {
        Self::Replica(ReplicaEvent {
            kind: ChangeKind::Applied,
            replica,
        })
    }

    pub fn replica_deleted(replica: Replica) -> Self {
        Self::Replica(ReplicaEvent {
            kind: ChangeKind::Deleted,
            replica,
        })
    }

    pub fn workload_applied(workload: Workload) -> Self {
        Self::Workload(WorkloadEvent {
            kind: ChangeKind::Applied,
            workload,
        })
    }

    pub fn workload_deleted(workload: Workload) -> Self {
        Self::Workload(WorkloadEvent {
            kind: ChangeKind::Deleted,
            workload,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Replica(e) => e.kind,
            Self::Workload(e) => e.kind,
        }
    }

    /// Key of the object the event is about.
    pub fn object_key(&self) -> &ObjectKey {
        match self {
            Self::Replica(e) => &e.replica.key,
            Self::Workload(e) => &e.workload.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonecost_id::{ReplicaUid, WorkloadUid};

    #[test]
    fn test_event_serialization_is_tagged() {
        let workload = Workload::new(WorkloadUid::new(), ObjectKey::new("default", "web"));
        let json = serde_json::to_value(ClusterEvent::workload_applied(workload)).unwrap();
        assert_eq!(json["object"], "workload");
        assert_eq!(json["kind"], "applied");
    }

    #[test]
    fn test_event_accessors() {
        let replica = Replica::new(ReplicaUid::new(), ObjectKey::new("default", "web-1"));
        let event = ClusterEvent::replica_deleted(replica);
        assert_eq!(event.kind(), ChangeKind::Deleted);
        assert_eq!(event.object_key().to_string(), "default/web-1");
    }
}
