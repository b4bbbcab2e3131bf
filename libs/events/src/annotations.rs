//! Annotation and label keys shared by the controller.

/// Pod annotation consumed by the ReplicaSet controller when picking pods to
/// remove on scale-down. Lower cost is removed first.
pub const POD_DELETION_COST: &str = "controller.kubernetes.io/pod-deletion-cost";

/// Deployment annotation that opts the deployment in. Only the exact value
/// `"true"` enables allocation.
pub const ENABLED: &str = "pod-deletion-cost.lablabs.io/enabled";

/// Deployment annotation naming the node label used as the zone key.
pub const SPREAD_BY: &str = "pod-deletion-cost.lablabs.io/spread-by";

/// Deployment annotation selecting the allocation algorithm.
pub const ALLOCATOR_TYPE: &str = "pod-deletion-cost.lablabs.io/type";

/// Well-known node label carrying the topology zone.
pub const TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";
