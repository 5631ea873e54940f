//! Trait seams for the membership protocol.
//!
//! The gossip transport, failure detector, and wire encoding live behind the
//! `Membership` trait. The discovery layer composes these operations; it
//! never looks inside them.

use crate::{error::DiscoveryError, types::*};
use std::sync::Arc;

/// Handle for a registered membership listener.
pub type ListenerId = u64;

/// Events delivered by the membership protocol to the discovery layer.
///
/// Both callbacks fire on membership delivery threads; implementations must
/// not block for long.
pub trait MembershipListener: Send + Sync {
    /// The membership protocol has processed its first cluster state.
    fn initial_state_processed(&self);

    /// A metadata snapshot at `version` has been applied locally.
    fn metadata_applied(&self, version: MetadataVersion);
}

/// Receives per-node acknowledgements for an in-flight publish.
pub trait AckSink: Send + Sync {
    fn node_acked(&self, node: &NodeId);
}

/// The ring-membership protocol, as consumed by the discovery layer.
///
/// Implementations exchange small per-node application state through their
/// own anti-entropy mechanism; `write_node_state` mutates only the local
/// node's slots and peers observe the change after normal propagation delay.
pub trait Membership: Send + Sync {
    /// Start the protocol. Listener registration must happen before this.
    fn start(&self) -> Result<(), DiscoveryError>;

    /// Stop exchanging state. Idempotent.
    fn stop(&self);

    /// Release transport resources. Idempotent; implies `stop`.
    fn close(&self);

    fn add_listener(&self, listener: Arc<dyn MembershipListener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    fn local_node(&self) -> MemberNode;

    fn node_description(&self) -> String;

    /// Submit a metadata snapshot to the cluster. Acknowledgements are
    /// reported per node through `ack`.
    fn publish(
        &self,
        state: ClusterMetadataState,
        ack: Arc<dyn AckSink>,
    ) -> Result<(), DiscoveryError>;

    /// Read a raw application-state slot from any member's state map.
    /// Returns `None` when the node or key is unknown; no network round trip.
    fn read_node_state(&self, node: &NodeId, key: &str) -> Option<Vec<u8>>;

    /// Install (or with `None`, remove) a slot in the local node's
    /// application-state map. Writes to different keys must not stall each
    /// other.
    fn write_node_state(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), DiscoveryError>;

    /// Upper bound on a single application-state value, in bytes.
    fn max_state_value_len(&self) -> usize;
}
