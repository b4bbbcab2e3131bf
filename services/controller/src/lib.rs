//! # zonecost-controller
//!
//! Assigns `controller.kubernetes.io/pod-deletion-cost` to the pods of
//! opted-in deployments so that scale-down removes pods evenly across zones.
//!
//! Within one replica set, pods in the same zone receive distinct costs,
//! handed out from `i32::MAX` downward. Pods in different zones are ranked
//! independently and may share a value.
//!
//! ## Layout
//!
//! - [`cluster`]: read/write traits, the in-memory snapshot, a fake cluster
//! - [`kube`]: REST client for the Kubernetes API
//! - [`watcher`]: periodic resync feeding the snapshot and the event channel
//! - [`worker`]: event routing, work queue, retries
//! - [`registry`]: allocation strategies by deployment type
//! - [`zone`]: the zone allocator

pub mod api;
pub mod cluster;
pub mod config;
pub mod filter;
pub mod kube;
pub mod queue;
pub mod registry;
pub mod shutdown;
pub mod state;
pub mod watcher;
pub mod worker;
pub mod zone;
