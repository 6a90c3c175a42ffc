#![warn(missing_docs)]

//! Stowage replication engine: cross-cluster replication of projects,
//! repositories, packages, files and metadata between artifact clusters.
//!
//! A [`driver::ReplicaTaskDriver`] walks a task and hands each unit to a
//! [`replicator::Replicator`]. Failed units land in the failure store and are
//! replayed by [`retry::RetryService`]; federation transfers are tracked and
//! resumed by [`tracking::FederationTrackingService`].

pub mod cache;
pub mod client;
pub mod config;
pub mod consistency;
pub mod context;
pub mod directory;
pub mod driver;
pub mod error;
pub mod failure;
pub mod filter;
pub mod mapping;
pub mod model;
pub mod push;
pub mod replicator;
pub mod request;
pub mod retry;
pub mod store;
pub mod tracking;
pub mod transfer;

#[cfg(test)]
#[allow(missing_docs)]
mod testing;

pub use config::ReplicationConfig;
pub use driver::{ReplicaRecord, ReplicaScope, ReplicaTaskDriver, RunStatus};
pub use error::{ReplError, ReplResult};
pub use replicator::{Replicator, ReplicatorKind};
