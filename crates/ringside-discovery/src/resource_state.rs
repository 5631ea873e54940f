//! Per-resource state riding inside gossip.
//!
//! Small `{resource_id, state}` records are stored in the local node's
//! application-state map and propagated by the membership protocol's own
//! anti-entropy exchange. This is a best-effort, eventually consistent
//! channel, explicitly weaker than the acknowledgement-tracked publish path.

use crate::{
    error::DiscoveryError,
    traits::Membership,
    types::{NodeId, ResourceState, ResourceStateRecord},
};
use std::sync::Arc;
use tracing::debug;

/// Namespace prefix for resource-state keys in the per-node state map.
const STATE_KEY_PREFIX: &str = "resource.";

/// Reads and writes per-resource state through the membership protocol.
pub struct ResourceStateRegistry {
    membership: Arc<dyn Membership>,
}

impl ResourceStateRegistry {
    pub fn new(membership: Arc<dyn Membership>) -> Self {
        Self { membership }
    }

    fn state_key(resource_id: &str) -> String {
        format!("{STATE_KEY_PREFIX}{resource_id}")
    }

    /// Look up `resource_id`'s state as gossiped by `node`.
    ///
    /// Returns `default` when the slot is absent or malformed; a peer
    /// gossiping garbage must never destabilize the local node.
    pub fn read(&self, node: &NodeId, resource_id: &str, default: ResourceState) -> ResourceState {
        let key = Self::state_key(resource_id);
        let Some(raw) = self.membership.read_node_state(node, &key) else {
            return default;
        };
        match serde_json::from_slice::<ResourceStateRecord>(&raw) {
            Ok(record) if record.resource_id == resource_id => record.state,
            Ok(record) => {
                debug!(
                    node = %node,
                    key,
                    found = %record.resource_id,
                    "resource state record does not match its key, using default"
                );
                default
            }
            Err(e) => {
                debug!(node = %node, key, error = %e, "malformed resource state, using default");
                default
            }
        }
    }

    /// Install `state` for `resource_id` in the local node's state map.
    ///
    /// Peers observe the change through normal gossip propagation. Must be
    /// kept within the transport's per-key size limit.
    pub fn write(&self, resource_id: &str, state: ResourceState) -> Result<(), DiscoveryError> {
        let key = Self::state_key(resource_id);
        let record = ResourceStateRecord {
            resource_id: resource_id.to_string(),
            state,
            written_at: chrono::Utc::now(),
        };
        let payload = serde_json::to_vec(&record)
            .map_err(|e| DiscoveryError::from_serde_error(e, "resource state"))?;
        let max = self.membership.max_state_value_len();
        if payload.len() > max {
            return Err(DiscoveryError::StateTooLarge {
                key,
                len: payload.len(),
                max,
            });
        }
        self.membership.write_node_state(&key, Some(payload))
    }

    /// Remove `resource_id`'s slot, for decommissioned resources.
    pub fn remove(&self, resource_id: &str) -> Result<(), DiscoveryError> {
        self.membership
            .write_node_state(&Self::state_key(resource_id), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalMembership;
    use crate::types::MemberNode;

    fn registry() -> (ResourceStateRegistry, Arc<LocalMembership>, NodeId) {
        let local = MemberNode::new(
            NodeId::from("n1"),
            "node_127.0.0.1".to_string(),
            "127.0.0.1:9300".parse().unwrap(),
        );
        let membership = Arc::new(LocalMembership::new(local.clone()));
        (
            ResourceStateRegistry::new(Arc::clone(&membership) as Arc<dyn Membership>),
            membership,
            local.id,
        )
    }

    #[test]
    fn test_write_then_read_returns_state() {
        let (registry, _membership, local) = registry();
        registry.write("orders", ResourceState::Started).unwrap();
        assert_eq!(
            registry.read(&local, "orders", ResourceState::Unassigned),
            ResourceState::Started
        );
    }

    #[test]
    fn test_absent_state_returns_default() {
        let (registry, _membership, local) = registry();
        assert_eq!(
            registry.read(&local, "missing", ResourceState::Unassigned),
            ResourceState::Unassigned
        );
    }

    #[test]
    fn test_remove_restores_default() {
        let (registry, _membership, local) = registry();
        registry.write("orders", ResourceState::Started).unwrap();
        registry.remove("orders").unwrap();
        assert_eq!(
            registry.read(&local, "orders", ResourceState::Unassigned),
            ResourceState::Unassigned
        );
    }

    #[test]
    fn test_malformed_peer_state_returns_default() {
        let (registry, membership, local) = registry();
        membership
            .write_node_state("resource.orders", Some(b"not json".to_vec()))
            .unwrap();
        assert_eq!(
            registry.read(&local, "orders", ResourceState::Initializing),
            ResourceState::Initializing
        );
    }

    #[test]
    fn test_overwrite_replaces_state() {
        let (registry, _membership, local) = registry();
        registry.write("orders", ResourceState::Initializing).unwrap();
        registry.write("orders", ResourceState::Started).unwrap();
        assert_eq!(
            registry.read(&local, "orders", ResourceState::Unassigned),
            ResourceState::Started
        );
    }

    #[test]
    fn test_unknown_node_returns_default() {
        let (registry, _membership, _local) = registry();
        assert_eq!(
            registry.read(&NodeId::from("other"), "orders", ResourceState::Unassigned),
            ResourceState::Unassigned
        );
    }
}
