//! SDFS: a self-managing replicated file store.
//!
//! This library crate holds every subsystem; the `sdfs` binary (`main.rs`)
//! runs a node or acts as a command-line client against one.
//!
//! ## Architecture Modules
//! - **`transfer`**: length-prefixed TCP streams that move whole files between
//!   nodes, plus per-transmission completion tracking.
//! - **`arbiter`**: per-file readers/writer admission with bounded reader
//!   concurrency and a writer starvation bound.
//! - **`master`**: the per-file primary-replica coordinator.
//! - **`node`**: the per-node host of file masters and of the replica report.
//! - **`metadata`**: the leader-hosted file -> replica-set authority and its
//!   reconciliation loop.
//! - **`client`**: GET/PUT/DELETE/LIST/SEARCH and multi-file fetch helpers.
//! - **`cluster`**: membership and leader-election boundaries.
//! - **`config`**, **`error`**, **`rpc`**, **`server`**: configuration, the
//!   shared error type, inter-node calls and node assembly.

pub mod arbiter;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod master;
pub mod metadata;
pub mod node;
pub mod rpc;
pub mod server;
pub mod transfer;
