//! Client Library Module
//!
//! `SdfsClient` resolves replica sets through the leader's metadata service
//! and then talks to the primary directly:
//!
//! - **put**: allocate (or look up) the replica set, obtain a transmission id
//!   from the primary, upload, then wait for the fan-out to servants.
//! - **get**: wait briefly if the primary is still receiving its upload, ask it
//!   to stream the file here, watch the local tracker for completion.
//! - **delete / list / search**: thin wrappers over the metadata service.
//! - **fetch_and_concat(_with_prefix)**: append several files into one local file.
//!
//! The `/sdfs/...` facade lets the command line drive these operations on a node.

pub mod handlers;
pub mod library;
pub mod protocol;
