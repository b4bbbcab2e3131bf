//! # zonecost-events
//!
//! Cluster object model and change events for the zonecost controller.
//!
//! ## Design Principles
//!
//! - Objects are snapshots: every field reflects what the API server last
//!   reported, including the resource version the snapshot was taken at
//! - Ownership is typed: a pod points at its replica set through
//!   [`GroupRef`], a replica set at its deployment through [`WorkloadRef`];
//!   owner-reference kinds are matched once, when wire objects are converted
//! - Events are tagged: [`ClusterEvent`] carries exactly one of two payload
//!   shapes, decided at ingestion
//!
//! ## Annotation Conventions
//!
//! See [`annotations`] for the keys read from deployments and nodes and the
//! key written onto pods.

pub mod annotations;
mod envelope;
mod types;

pub use envelope::*;
pub use types::*;
