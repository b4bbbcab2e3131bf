//! Which pods are eligible for allocation.

use zonecost_events::{Replica, Workload};

/// Pod-only checks, applied before looking up the owning deployment.
///
/// A pod qualifies if it has no deletion cost yet and is either being deleted
/// or running and ready.
pub fn accepts_replica(replica: &Replica) -> bool {
    !replica.has_deletion_cost() && (replica.is_deleting() || replica.is_running_and_ready())
}

/// Full check for a pod and its deployment.
pub fn accepts(replica: &Replica, workload: &Workload) -> bool {
    workload.is_opted_in() && accepts_replica(replica)
}

/// Whether a pod should be requeued when its deployment changes: the same
/// check as [`accepts`], so pods that are not ready yet wait for their own
/// update.
pub fn requeue_on_workload_change(replica: &Replica, workload: &Workload) -> bool {
    accepts(replica, workload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use zonecost_events::{annotations, ObjectKey, ReplicaPhase};
    use zonecost_id::{ReplicaUid, WorkloadUid};

    fn replica(phase: ReplicaPhase, ready: bool, deleting: bool, cost: Option<&str>) -> Replica {
        let mut r = Replica::new(ReplicaUid::new(), ObjectKey::new("default", "web-1"));
        r.phase = phase;
        r.ready = ready;
        if deleting {
            r = r.deleting_at(chrono::Utc::now());
        }
        if let Some(cost) = cost {
            r = r.with_annotation(annotations::POD_DELETION_COST, cost);
        }
        r
    }

    fn workload(enabled: Option<&str>) -> Workload {
        let w = Workload::new(WorkloadUid::new(), ObjectKey::new("default", "web"));
        match enabled {
            Some(v) => w.with_annotation(annotations::ENABLED, v),
            None => w,
        }
    }

    #[rstest]
    #[case::running_ready(ReplicaPhase::Running, true, false, None, true)]
    #[case::running_not_ready(ReplicaPhase::Running, false, false, None, false)]
    #[case::pending(ReplicaPhase::Pending, false, false, None, false)]
    #[case::deleting_not_ready(ReplicaPhase::Running, false, true, None, true)]
    #[case::assigned(ReplicaPhase::Running, true, false, Some("100"), false)]
    #[case::malformed_cost_counts_as_assigned(ReplicaPhase::Running, true, false, Some("abc"), false)]
    #[case::deleting_assigned(ReplicaPhase::Running, true, true, Some("100"), false)]
    fn test_accepts_replica(
        #[case] phase: ReplicaPhase,
        #[case] ready: bool,
        #[case] deleting: bool,
        #[case] cost: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(accepts_replica(&replica(phase, ready, deleting, cost)), expected);
    }

    #[rstest]
    #[case::enabled(Some("true"), true)]
    #[case::disabled(Some("false"), false)]
    #[case::wrong_case(Some("TRUE"), false)]
    #[case::absent(None, false)]
    fn test_accepts_requires_opt_in(#[case] enabled: Option<&str>, #[case] expected: bool) {
        let r = replica(ReplicaPhase::Running, true, false, None);
        assert_eq!(accepts(&r, &workload(enabled)), expected);
    }

    #[rstest]
    #[case::ready(ReplicaPhase::Running, true, false, None, Some("true"), true)]
    #[case::not_ready(ReplicaPhase::Running, false, false, None, Some("true"), false)]
    #[case::pending(ReplicaPhase::Pending, false, false, None, Some("true"), false)]
    #[case::deleting(ReplicaPhase::Running, false, true, None, Some("true"), true)]
    #[case::assigned(ReplicaPhase::Running, true, false, Some("5"), Some("true"), false)]
    #[case::not_opted_in(ReplicaPhase::Running, true, false, None, None, false)]
    fn test_requeue_on_workload_change(
        #[case] phase: ReplicaPhase,
        #[case] ready: bool,
        #[case] deleting: bool,
        #[case] cost: Option<&str>,
        #[case] enabled: Option<&str>,
        #[case] expected: bool,
    ) {
        assert_eq!(
            requeue_on_workload_change(&replica(phase, ready, deleting, cost), &workload(enabled)),
            expected
        );
    }
}
