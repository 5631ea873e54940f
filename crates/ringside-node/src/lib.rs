//! Ringside node lifecycle.
//!
//! This crate fuses a ring-membership subsystem and a versioned
//! cluster-metadata store into one node lifecycle: a bootstrap sequencer
//! intercepts three checkpoints in the ring's own startup and initializes
//! the metadata store at exactly the first safe point, and a daemon drives
//! the strict setup → start → external-services ordering.

pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod error;
pub mod metadata;
pub mod ring;
pub mod standalone;
pub mod telemetry;

pub use bootstrap::{BootstrapSequencer, CheckpointOutcome, Phase};
pub use config::NodeConfig;
pub use daemon::{ManagementHook, NodeDaemon};
pub use error::NodeError;
pub use metadata::{MetadataClient, MetadataNode, MetadataNodeConfig, MetadataNodeFactory};
pub use ring::{RingSubsystem, StartupHooks};
pub use standalone::{StandaloneMetadataFactory, StandaloneRing};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
