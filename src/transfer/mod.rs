//! Transfer Protocol Module
//!
//! Moves one whole file between two nodes over a dedicated TCP stream.
//!
//! ## Wire Format
//! ```text
//! [u64 LE id_len][id][u64 LE name_len][name][u8 receiver_tag][u8 write_mode][raw bytes...]
//! ```
//! There is no acknowledgement frame. The body ends when the sender closes its
//! write half; the receiver then fsyncs the destination and marks the
//! transmission id locally complete in its [`progress::TransmissionTracker`].
//!
//! ## Components
//! - **`types`**: receiver tags, write modes and the frame header codec.
//! - **`receiver`**: accept loop writing inbound streams into the tag's directory.
//! - **`sender`**: streams a local file to a remote receiver.
//! - **`progress`**: per-transmission completion tracking and id generation.

pub mod progress;
pub mod receiver;
pub mod sender;
pub mod types;
