//! # zonecost-id
//!
//! Typed identities for the cluster objects the zonecost controller touches.
//!
//! ## Design Principles
//!
//! - UIDs are assigned by the API server and never change for the lifetime
//!   of an object; names can be reused after deletion, UIDs cannot
//! - Each object kind gets its own UID type so a pod UID can never be passed
//!   where a replica set UID is expected
//! - Parsing is strict: the canonical form is a hyphenated UUID
//!
//! ## Identity Types
//!
//! - [`ReplicaUid`]: a pod
//! - [`GroupUid`]: a replica set (the direct owner of pods)
//! - [`WorkloadUid`]: a deployment (the owner of replica sets)
//! - [`ResourceVersion`]: the opaque optimistic-concurrency token

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export uuid for consumers that need raw UUID operations
pub use uuid::Uuid;
