//! File Master Module
//!
//! One `FileMaster` exists per file whose primary replica lives on this node.
//! It serialises operations on that file through an access arbiter and drives
//! the transfers:
//!
//! - **read**: admitted as a read; a random servant serves it when it can,
//!   otherwise the primary streams the file itself.
//! - **write**: admitted as a write; waits for the client upload, then fans the
//!   file out to every servant and marks the transmission globally complete.
//! - **replicate**: admitted as a read; copies the file to a recovering servant.
//! - **delete**: admitted as a write; tombstone, local delete, servant deletes,
//!   tombstone release.

pub mod file_master;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
