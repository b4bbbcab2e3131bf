//! Snapshots of the cluster objects in a pod's ownership chain.
//!
//! Only the fields the controller reads are modelled. Conversion from the
//! API server's JSON lives in the controller's `kube` module.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zonecost_id::{GroupUid, ReplicaUid, ResourceVersion, WorkloadUid};

use crate::annotations;

// =============================================================================
// Object Keys
// =============================================================================

/// Namespaced name of an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Owner References
// =============================================================================

/// Reference from a pod to its controlling replica set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupRef {
    pub uid: GroupUid,
    pub name: String,
}

/// Reference from a replica set to its controlling deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub uid: WorkloadUid,
    pub name: String,
}

// =============================================================================
// Replica (Pod)
// =============================================================================

/// Pod lifecycle phase as reported in `status.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReplicaPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl ReplicaPhase {
    /// Parses the API server's phase string. Unrecognised values map to
    /// [`ReplicaPhase::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub uid: ReplicaUid,
    pub key: ObjectKey,
    pub resource_version: ResourceVersion,

    /// Node the pod is bound to; `None` until scheduled.
    pub node_name: Option<String>,

    pub phase: ReplicaPhase,

    /// `Ready` condition is `True`.
    pub ready: bool,

    pub deletion_timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Controlling replica set, if any.
    pub group: Option<GroupRef>,
}

impl Replica {
    /// Creates an unscheduled, pending pod with no owner.
    pub fn new(uid: ReplicaUid, key: ObjectKey) -> Self {
        Self {
            uid,
            key,
            resource_version: ResourceVersion::new("1"),
            node_name: None,
            phase: ReplicaPhase::Pending,
            ready: false,
            deletion_timestamp: None,
            annotations: BTreeMap::new(),
            group: None,
        }
    }

    /// Binds the pod to a node.
    pub fn on_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = Some(node_name.into());
        self
    }

    /// Marks the pod running with its `Ready` condition true.
    pub fn running_ready(mut self) -> Self {
        self.phase = ReplicaPhase::Running;
        self.ready = true;
        self
    }

    /// Sets the controlling replica set.
    pub fn owned_by(mut self, group: &ReplicaGroup) -> Self {
        self.group = Some(GroupRef {
            uid: group.uid,
            name: group.key.name.clone(),
        });
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_version(mut self, version: impl Into<ResourceVersion>) -> Self {
        self.resource_version = version.into();
        self
    }

    /// Marks the pod as being deleted.
    pub fn deleting_at(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }

    /// Returns true if the pod has a deletion timestamp.
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Returns true if the pod is in phase `Running` and `Ready`.
    pub fn is_running_and_ready(&self) -> bool {
        self.phase == ReplicaPhase::Running && self.ready
    }

    /// Returns true if the deletion-cost annotation is present at all, even
    /// with a value that does not parse.
    pub fn has_deletion_cost(&self) -> bool {
        self.annotations.contains_key(annotations::POD_DELETION_COST)
    }

    /// Returns the deletion cost if the annotation holds a valid integer.
    pub fn deletion_cost(&self) -> Option<i32> {
        self.annotations
            .get(annotations::POD_DELETION_COST)
            .and_then(|v| v.trim().parse().ok())
    }
}

// =============================================================================
// Replica Group (ReplicaSet)
// =============================================================================

/// Snapshot of a replica set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaGroup {
    pub uid: GroupUid,
    pub key: ObjectKey,
    pub resource_version: ResourceVersion,

    /// Controlling deployment, if any.
    pub workload: Option<WorkloadRef>,
}

impl ReplicaGroup {
    pub fn new(uid: GroupUid, key: ObjectKey) -> Self {
        Self {
            uid,
            key,
            resource_version: ResourceVersion::new("1"),
            workload: None,
        }
    }

    /// Sets the controlling deployment.
    pub fn owned_by(mut self, workload: &Workload) -> Self {
        self.workload = Some(WorkloadRef {
            uid: workload.uid,
            name: workload.key.name.clone(),
        });
        self
    }
}

// =============================================================================
// Workload (Deployment)
// =============================================================================

/// Snapshot of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub uid: WorkloadUid,
    pub key: ObjectKey,
    pub resource_version: ResourceVersion,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Workload {
    pub fn new(uid: WorkloadUid, key: ObjectKey) -> Self {
        Self {
            uid,
            key,
            resource_version: ResourceVersion::new("1"),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Sets the opt-in annotation to `"true"`.
    pub fn opted_in(self) -> Self {
        self.with_annotation(annotations::ENABLED, "true")
    }

    /// Returns true only if the opt-in annotation is exactly `"true"`.
    pub fn is_opted_in(&self) -> bool {
        self.annotations
            .get(annotations::ENABLED)
            .is_some_and(|v| v == "true")
    }

    /// Node label overriding the default zone label.
    pub fn spread_by(&self) -> Option<&str> {
        self.annotations.get(annotations::SPREAD_BY).map(String::as_str)
    }

    /// Allocation algorithm name; empty when unset.
    pub fn allocator_type(&self) -> &str {
        self.annotations
            .get(annotations::ALLOCATOR_TYPE)
            .map(String::as_str)
            .unwrap_or("")
    }
}

// =============================================================================
// Node
// =============================================================================

/// Snapshot of a node. Nodes are cluster scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub resource_version: ResourceVersion,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_version: ResourceVersion::new("1"),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Shorthand for a node carrying the standard zone label.
    pub fn in_zone(self, zone: impl Into<String>) -> Self {
        self.with_label(annotations::TOPOLOGY_ZONE, zone)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}
