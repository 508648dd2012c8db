//! Access Arbiter Module
//!
//! Per-file readers/writer admission for the file master.
//!
//! ## Rules
//! - At most [`scheduler::MAX_READERS`] reads run at once; a write runs alone.
//! - Requests queue in arrival order. A blocked writer at the head lets a
//!   queued read through while readers are already active, but only
//!   [`scheduler::STARVATION_BOUND`] times; after that every read waits
//!   behind it.
//! - Every request is resolved: granted, or failed with `Timeout` at its
//!   deadline.
//! - Admission yields an [`scheduler::AccessGuard`]; dropping it releases the
//!   slot and admits whoever is next.

pub mod scheduler;

#[cfg(test)]
mod tests;
