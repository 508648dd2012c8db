//! Node File Service Module
//!
//! Runs on every node. It owns the local replica report that the leader
//! collects, applies the assignments the leader pushes back (creating,
//! refreshing or dropping file masters and pulling missing replicas), deletes
//! local copies on a primary's order, and serves reads a primary offloads.
//! Primary-replica calls (`/file/...`) are routed to the matching
//! `FileMaster`.

pub mod handlers;
pub mod protocol;
pub mod report;
pub mod service;
