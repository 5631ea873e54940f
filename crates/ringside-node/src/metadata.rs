//! Trait seams for the versioned metadata store.

use crate::error::NodeError;
use ringside_discovery::types::ClusterMetadataState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration handed to the metadata store when it is built.
///
/// Every field is derived from the ring subsystem's own identity and network
/// settings, never configured independently — a node must present one
/// identity to both subsystems.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataNodeConfig {
    pub cluster_name: String,
    pub node_name: String,
    pub bind_address: SocketAddr,
    pub data_dir: PathBuf,
}

/// Read access to the running metadata store.
pub trait MetadataClient: Send + Sync {
    /// The current local metadata snapshot.
    fn state(&self) -> ClusterMetadataState;
}

/// A built metadata-store node.
pub trait MetadataNode: Send + Sync {
    /// Recover local state and create the administrative namespace if it is
    /// absent (idempotently: a concurrent creator must not fail this call).
    /// Blocks until local primary-resource recovery completes; the node is
    /// internally consistent afterwards but not yet externally reachable.
    fn activate(&self) -> Result<(), NodeError>;

    /// Open the externally facing services (HTTP/API layer).
    fn start(&self) -> Result<(), NodeError>;

    /// Shut the node down. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// A client handle, or `None` once the node is closed.
    fn client(&self) -> Option<Arc<dyn MetadataClient>>;
}

/// Builds metadata-store nodes from a derived configuration.
pub trait MetadataNodeFactory: Send + Sync {
    fn build(&self, config: MetadataNodeConfig) -> Result<Arc<dyn MetadataNode>, NodeError>;
}
