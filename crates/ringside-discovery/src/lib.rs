//! Ringside discovery layer.
//!
//! This crate synchronizes cluster state over an existing ring-membership
//! protocol. It publishes versioned metadata snapshots with acknowledgement
//! tracking, piggybacks small per-resource state onto the membership
//! protocol's per-node state slots, and exposes blocking-wait primitives for
//! initial-state and metadata-version convergence.

pub mod ack;
pub mod coordinator;
pub mod error;
pub mod latch;
pub mod local;
pub mod resource_state;
pub mod traits;
pub mod types;
pub mod version;

pub use error::DiscoveryError;

// Re-export the pieces most callers compose directly
pub use ack::{AckTracker, PublishOutcome, PublishReceipt};
pub use coordinator::DiscoveryCoordinator;
pub use latch::StateLatch;
pub use local::LocalMembership;
pub use resource_state::ResourceStateRegistry;
pub use traits::{AckSink, Membership, MembershipListener};
pub use version::VersionWaiter;

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
