//! Cluster Boundary Module
//!
//! SDFS consumes two collaborators it does not implement itself: a membership
//! layer that knows which nodes are alive, and a leader-election layer that
//! names the node hosting the metadata service.
//!
//! ## Contents
//! - **`types`**: node identity and addressing shared by every component.
//! - **`membership`**: the `Membership` trait and a heartbeat-probing
//!   implementation over a configured peer list (Alive -> Suspect -> Dead).
//! - **`election`**: the `LeaderElection` trait and a deterministic
//!   lowest-alive-id rule.

pub mod election;
pub mod membership;
pub mod types;

#[cfg(test)]
pub mod testing;

#[cfg(test)]
mod tests;
