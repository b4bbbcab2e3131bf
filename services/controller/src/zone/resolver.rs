//! Zone resolution for a pod's hosting node.

use zonecost_events::{annotations, Node, Workload};

/// Zone a pod on `node` belongs to, for the given deployment.
///
/// The deployment's spread-by label wins when the node carries it; otherwise
/// the standard topology label is used. Never fails: a missing node or
/// missing labels yield the empty zone, so unscheduled and unlabelled pods
/// are grouped together.
pub fn resolve_zone(node: Option<&Node>, workload: &Workload) -> String {
    let Some(node) = node else {
        return String::new();
    };

    workload
        .spread_by()
        .and_then(|key| node.label(key))
        .or_else(|| node.label(annotations::TOPOLOGY_ZONE))
        .unwrap_or_default()
        .to_string()
}
