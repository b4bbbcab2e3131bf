//! Deletion-cost allocation primitives.
//!
//! This library holds the pieces of the allocation engine that do not touch
//! the cluster:
//!
//! - **Cost pool**: the set of deletion costs already claimed in one zone of
//!   one replica set, and the descending search for the next free value.
//! - **Pending assignments**: costs this process decided but cannot yet see
//!   through list queries.
//! - **Error classification**: how the worker reacts to each failure.
//!
//! # Invariants
//!
//! - A pool never hands out the same value twice
//! - The search order is deterministic given the claimed set
//! - Pending assignments are hints, never a source of truth

mod error;
mod pending;
mod pool;
mod retry;

pub use error::{AllocationError, AllocationResult, Disposition};
pub use pending::PendingAssignments;
pub use pool::{CostPool, EmptyRange, MAX_COST, MIN_COST};
pub use retry::{RetryTracker, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
