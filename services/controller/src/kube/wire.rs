//! Kubernetes JSON shapes and their conversion to the resource model.
//!
//! Only the fields the controller reads are declared; serde ignores the rest.
//! Owner references are resolved here, once: the controlling `ReplicaSet`
//! reference becomes [`Replica::group`] and the controlling `Deployment`
//! reference becomes [`ReplicaGroup::workload`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use zonecost_events::{
    GroupRef, Node, ObjectKey, Replica, ReplicaGroup, ReplicaPhase, Workload, WorkloadRef,
};
use zonecost_id::{GroupUid, ReplicaUid, ResourceVersion, WorkloadUid};

use crate::cluster::ClusterError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub uid: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// The controlling owner reference, if it is of `kind`.
    fn controller_of_kind(&self, kind: &str) -> Option<&OwnerReference> {
        self.owner_references
            .iter()
            .find(|o| o.controller == Some(true) && o.kind == kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub controller: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default, rename = "continue")]
    pub continue_token: Option<String>,
    #[serde(default)]
    pub resource_version: Option<String>,
}

/// Any `*List` response.
#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    #[serde(default = "empty_list_meta")]
    pub metadata: ListMeta,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

fn empty_list_meta() -> ListMeta {
    ListMeta {
        continue_token: None,
        resource_version: None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicaSet {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeObject {
    pub metadata: ObjectMeta,
}

/// Kubernetes `Status` body returned with API errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

fn parse_uid<T>(
    parse: impl FnOnce(&str) -> Result<T, zonecost_id::IdError>,
    value: &str,
) -> Result<T, ClusterError> {
    parse(value).map_err(|e| ClusterError::Invalid(e.to_string()))
}

impl TryFrom<Pod> for Replica {
    type Error = ClusterError;

    fn try_from(pod: Pod) -> Result<Self, Self::Error> {
        let meta = pod.metadata;
        let group = match meta.controller_of_kind("ReplicaSet") {
            Some(owner) => Some(GroupRef {
                uid: parse_uid(GroupUid::parse, &owner.uid)?,
                name: owner.name.clone(),
            }),
            None => None,
        };
        let ready = pod
            .status
            .conditions
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True");

        Ok(Replica {
            uid: parse_uid(ReplicaUid::parse, &meta.uid)?,
            key: meta.key(),
            resource_version: ResourceVersion::new(meta.resource_version),
            node_name: pod.spec.node_name.filter(|n| !n.is_empty()),
            phase: pod
                .status
                .phase
                .as_deref()
                .map(ReplicaPhase::parse)
                .unwrap_or_default(),
            ready,
            deletion_timestamp: meta.deletion_timestamp,
            annotations: meta.annotations,
            group,
        })
    }
}

impl TryFrom<ReplicaSet> for ReplicaGroup {
    type Error = ClusterError;

    fn try_from(rs: ReplicaSet) -> Result<Self, Self::Error> {
        let meta = rs.metadata;
        let workload = match meta.controller_of_kind("Deployment") {
            Some(owner) => Some(WorkloadRef {
                uid: parse_uid(WorkloadUid::parse, &owner.uid)?,
                name: owner.name.clone(),
            }),
            None => None,
        };
        Ok(ReplicaGroup {
            uid: parse_uid(GroupUid::parse, &meta.uid)?,
            key: meta.key(),
            resource_version: ResourceVersion::new(meta.resource_version),
            workload,
        })
    }
}

impl TryFrom<Deployment> for Workload {
    type Error = ClusterError;

    fn try_from(deploy: Deployment) -> Result<Self, Self::Error> {
        let meta = deploy.metadata;
        Ok(Workload {
            uid: parse_uid(WorkloadUid::parse, &meta.uid)?,
            key: meta.key(),
            resource_version: ResourceVersion::new(meta.resource_version),
            annotations: meta.annotations,
        })
    }
}

impl From<NodeObject> for Node {
    fn from(node: NodeObject) -> Self {
        Node {
            name: node.metadata.name,
            resource_version: ResourceVersion::new(node.metadata.resource_version),
            labels: node.metadata.labels,
        }
    }
}
