//! Allocation strategies keyed by the deployment's type annotation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};
use zonecost_events::{Replica, Workload};
use zonecost_id::ReplicaUid;
use zonecost_reconcile::AllocationResult;

/// What an allocation call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The pod already carries a deletion cost.
    AlreadyAssigned,
    /// The pod is being deleted.
    Deleting,
    /// A cost was chosen and written.
    Assigned { cost: i32, zone: String },
    /// No allocator handles this deployment.
    Skipped,
}

/// A deletion-cost allocation strategy.
#[async_trait]
pub trait Allocator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Values of the type annotation this allocator handles.
    fn accepted_types(&self) -> &[&'static str];

    async fn process(
        &self,
        replica: &Replica,
        workload: &Workload,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<Outcome>;

    /// Note that `replica` was seen; drops in-flight state it makes obsolete.
    async fn observe(&self, _replica: &Replica) {}

    /// Forget in-flight state for a deleted pod.
    async fn release(&self, _uid: ReplicaUid) {}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("allocator type {kind:?} already registered by {existing}")]
    Duplicate {
        kind: String,
        existing: &'static str,
    },
}

/// Allocators by accepted type.
#[derive(Default)]
pub struct AllocatorRegistry {
    by_type: HashMap<String, Arc<dyn Allocator>>,
    allocators: Vec<Arc<dyn Allocator>>,
}

impl AllocatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an allocator for every type it accepts.
    ///
    /// Nothing is registered if any of its types is already taken.
    pub fn register(&mut self, allocator: Arc<dyn Allocator>) -> Result<(), RegistryError> {
        for kind in allocator.accepted_types() {
            if let Some(existing) = self.by_type.get(*kind) {
                return Err(RegistryError::Duplicate {
                    kind: kind.to_string(),
                    existing: existing.name(),
                });
            }
        }
        for kind in allocator.accepted_types() {
            self.by_type.insert(kind.to_string(), Arc::clone(&allocator));
        }
        self.allocators.push(allocator);
        Ok(())
    }

    /// Allocator handling `kind`, if any.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Allocator>> {
        self.by_type.get(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.allocators.is_empty()
    }

    /// Registered allocator names, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.allocators.iter().map(|a| a.name()).collect()
    }

    /// Run the allocator for the deployment's type.
    ///
    /// Deployments that are not opted in, or whose type has no allocator,
    /// are skipped without error.
    pub async fn dispatch(
        &self,
        replica: &Replica,
        workload: &Workload,
        shutdown: &watch::Receiver<bool>,
    ) -> AllocationResult<Outcome> {
        if !workload.is_opted_in() {
            debug!(deployment = %workload.key, "deployment not opted in");
            return Ok(Outcome::Skipped);
        }

        let kind = workload.allocator_type();
        let Some(allocator) = self.get(kind) else {
            debug!(deployment = %workload.key, kind, "no allocator for type");
            return Ok(Outcome::Skipped);
        };

        allocator.process(replica, workload, shutdown).await
    }

    pub async fn observe(&self, replica: &Replica) {
        for allocator in &self.allocators {
            allocator.observe(replica).await;
        }
    }

    pub async fn release(&self, uid: ReplicaUid) {
        for allocator in &self.allocators {
            allocator.release(uid).await;
        }
    }
}

impl std::fmt::Debug for AllocatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatorRegistry")
            .field("allocators", &self.names())
            .finish()
    }
}

/// Whether the zone allocator should be registered for the configured
/// algorithm list. An empty list enables it; unknown names are logged.
pub fn zone_enabled(algorithms: &[String]) -> bool {
    if algorithms.is_empty() {
        return true;
    }
    let mut enabled = false;
    for name in algorithms {
        match name.as_str() {
            "zone" => enabled = true,
            other => warn!(algorithm = other, "unknown allocation algorithm ignored"),
        }
    }
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zonecost_events::{annotations, ObjectKey};
    use zonecost_id::WorkloadUid;

    struct Counting {
        name: &'static str,
        types: &'static [&'static str],
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str, types: &'static [&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                types,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Allocator for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn accepted_types(&self) -> &[&'static str] {
            self.types
        }

        async fn process(
            &self,
            _replica: &Replica,
            _workload: &Workload,
            _shutdown: &watch::Receiver<bool>,
        ) -> AllocationResult<Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Assigned {
                cost: 1,
                zone: String::new(),
            })
        }
    }

    fn replica() -> Replica {
        Replica::new(ReplicaUid::new(), ObjectKey::new("default", "web-1"))
    }

    fn workload() -> Workload {
        Workload::new(WorkloadUid::new(), ObjectKey::new("default", "web"))
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = AllocatorRegistry::new();
        registry.register(Counting::new("zone", &["zone", ""])).unwrap();

        let err = registry
            .register(Counting::new("other", &["spread", ""]))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                kind: String::new(),
                existing: "zone",
            }
        );
        // Nothing from the rejected allocator was registered.
        assert!(registry.get("spread").is_none());
        assert_eq!(registry.names(), vec!["zone"]);
    }

    #[tokio::test]
    async fn test_dispatch_by_type() {
        let zone = Counting::new("zone", &["zone", ""]);
        let mut registry = AllocatorRegistry::new();
        registry.register(zone.clone()).unwrap();
        let (_tx, shutdown) = watch::channel(false);

        let default_type = workload().opted_in();
        assert!(matches!(
            registry.dispatch(&replica(), &default_type, &shutdown).await,
            Ok(Outcome::Assigned { .. })
        ));

        let unknown = workload()
            .opted_in()
            .with_annotation(annotations::ALLOCATOR_TYPE, "random");
        assert_eq!(
            registry.dispatch(&replica(), &unknown, &shutdown).await,
            Ok(Outcome::Skipped)
        );

        assert_eq!(
            registry.dispatch(&replica(), &workload(), &shutdown).await,
            Ok(Outcome::Skipped)
        );
        assert_eq!(zone.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zone_enabled() {
        assert!(zone_enabled(&[]));
        assert!(zone_enabled(&["zone".to_string()]));
        assert!(zone_enabled(&["bogus".to_string(), "zone".to_string()]));
        assert!(!zone_enabled(&["bogus".to_string()]));
    }
}
