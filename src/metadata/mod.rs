//! Metadata Service Module
//!
//! The leader's map of file name -> replica set, and the loop that keeps it
//! honest.
//!
//! ## Responsibilities
//! 1. **Lookups**: get/list/delete resolve a replica set; search matches names by regex.
//! 2. **Allocation**: a put of a new name recruits up to `R` nodes (least loaded
//!    first) and pushes the assignment before answering.
//! 3. **Reconciliation**: every period the leader collects reports from alive
//!    nodes, rebuilds the index, promotes a complete servant where the master
//!    vanished, recruits replacements, and pushes the result to every owner.
//! 4. **Tombstones**: a file being deleted is removed from surveillance until
//!    its primary releases it.
//!
//! ## Components
//! - **`types`**: `FileInfo`, `ClusterInfo`, `FileIndex` and the pure conversions between views.
//! - **`service`**: request-path operations.
//! - **`reconcile`**: the collect/repair/push cycle.
//! - **`remote`**: `LeaderLink`, the caller-side handle on the current leader.

pub mod handlers;
pub mod protocol;
pub mod reconcile;
pub mod remote;
pub mod service;
pub mod types;
