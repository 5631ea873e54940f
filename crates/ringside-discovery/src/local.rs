//! In-process loopback membership.
//!
//! A single-node realization of the [`Membership`] seam, used by standalone
//! deployments and tests. There is no network: the first processed state is
//! delivered synchronously on `start`, a publish applies locally and is
//! acknowledged by the local node, and per-node state slots live in
//! per-key-concurrent maps.

use crate::{
    error::DiscoveryError,
    traits::{AckSink, ListenerId, Membership, MembershipListener},
    types::{ClusterMetadataState, MemberNode, NodeId},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Gossip transports bound small per-key values; mirror a conservative limit.
const MAX_STATE_VALUE_LEN: usize = 64 * 1024;

pub struct LocalMembership {
    local: MemberNode,
    started: AtomicBool,
    closed: AtomicBool,
    listeners: Mutex<HashMap<ListenerId, Arc<dyn MembershipListener>>>,
    next_listener_id: AtomicU64,
    /// Local node's application-state slots, per-key granularity.
    local_state: DashMap<String, Vec<u8>>,
    /// Peer slots observed through gossip; seeded directly in tests.
    peer_state: DashMap<(NodeId, String), Vec<u8>>,
    applied: Mutex<Option<ClusterMetadataState>>,
}

impl LocalMembership {
    pub fn new(local: MemberNode) -> Self {
        Self {
            local,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
            local_state: DashMap::new(),
            peer_state: DashMap::new(),
            applied: Mutex::new(None),
        }
    }

    /// The snapshot most recently applied through `publish`.
    pub fn applied_state(&self) -> Option<ClusterMetadataState> {
        self.applied.lock().clone()
    }

    /// Seed a peer's gossiped slot, as if it had propagated here.
    pub fn seed_peer_state(&self, node: NodeId, key: &str, value: Vec<u8>) {
        self.peer_state.insert((node, key.to_string()), value);
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn MembershipListener>> {
        self.listeners.lock().values().cloned().collect()
    }
}

impl Membership for LocalMembership {
    fn start(&self) -> Result<(), DiscoveryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DiscoveryError::from_transport_error(
                "membership is closed",
                "start",
            ));
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        // A single-node ring converges instantly: the first processed state
        // event fires on the starting thread.
        for listener in self.snapshot_listeners() {
            listener.initial_state_processed();
        }
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.stop();
        self.closed.store(true, Ordering::SeqCst);
    }

    fn add_listener(&self, listener: Arc<dyn MembershipListener>) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(id, listener);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id);
    }

    fn local_node(&self) -> MemberNode {
        self.local.clone()
    }

    fn node_description(&self) -> String {
        self.local.description()
    }

    fn publish(
        &self,
        state: ClusterMetadataState,
        ack: Arc<dyn AckSink>,
    ) -> Result<(), DiscoveryError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(DiscoveryError::from_transport_error(
                "membership not started",
                "publish",
            ));
        }
        let version = state.version;
        {
            let mut applied = self.applied.lock();
            // versions observed locally never regress
            if applied.as_ref().is_none_or(|s| s.version < version) {
                *applied = Some(state);
            } else {
                debug!(%version, "ignoring publish older than applied state");
                return Ok(());
            }
        }
        for listener in self.snapshot_listeners() {
            listener.metadata_applied(version);
        }
        ack.node_acked(&self.local.id);
        Ok(())
    }

    fn read_node_state(&self, node: &NodeId, key: &str) -> Option<Vec<u8>> {
        if *node == self.local.id {
            self.local_state.get(key).map(|v| v.clone())
        } else {
            self.peer_state
                .get(&(node.clone(), key.to_string()))
                .map(|v| v.clone())
        }
    }

    fn write_node_state(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), DiscoveryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DiscoveryError::from_transport_error(
                "membership is closed",
                "write_node_state",
            ));
        }
        match value {
            Some(value) => {
                self.local_state.insert(key.to_string(), value);
            }
            None => {
                self.local_state.remove(key);
            }
        }
        Ok(())
    }

    fn max_state_value_len(&self) -> usize {
        MAX_STATE_VALUE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataVersion;

    fn membership() -> LocalMembership {
        LocalMembership::new(MemberNode::new(
            NodeId::from("n1"),
            "node_127.0.0.1".to_string(),
            "127.0.0.1:9300".parse().unwrap(),
        ))
    }

    struct RecordingListener {
        initial: AtomicBool,
        last_version: AtomicU64,
    }

    impl MembershipListener for RecordingListener {
        fn initial_state_processed(&self) {
            self.initial.store(true, Ordering::SeqCst);
        }

        fn metadata_applied(&self, version: MetadataVersion) {
            self.last_version.store(version.0, Ordering::SeqCst);
        }
    }

    struct NullSink;

    impl AckSink for NullSink {
        fn node_acked(&self, _node: &NodeId) {}
    }

    #[test]
    fn test_start_fires_initial_state() {
        let membership = membership();
        let listener = Arc::new(RecordingListener {
            initial: AtomicBool::new(false),
            last_version: AtomicU64::new(0),
        });
        membership.add_listener(Arc::clone(&listener) as Arc<dyn MembershipListener>);
        membership.start().unwrap();
        assert!(listener.initial.load(Ordering::SeqCst));
    }

    #[test]
    fn test_publish_before_start_fails() {
        let membership = membership();
        let state = ClusterMetadataState::initial("test-cluster");
        let result = membership.publish(state, Arc::new(NullSink));
        assert!(matches!(result, Err(DiscoveryError::Transport { .. })));
    }

    #[test]
    fn test_publish_applies_and_notifies() {
        let membership = membership();
        let listener = Arc::new(RecordingListener {
            initial: AtomicBool::new(false),
            last_version: AtomicU64::new(0),
        });
        membership.add_listener(Arc::clone(&listener) as Arc<dyn MembershipListener>);
        membership.start().unwrap();

        let state = ClusterMetadataState::initial("test-cluster").with_master(NodeId::from("n1"));
        membership.publish(state.clone(), Arc::new(NullSink)).unwrap();

        assert_eq!(membership.applied_state(), Some(state));
        assert_eq!(listener.last_version.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_publish_is_ignored() {
        let membership = membership();
        membership.start().unwrap();

        let v1 = ClusterMetadataState::initial("test-cluster").with_master(NodeId::from("n1"));
        let v2 = v1.with_master(NodeId::from("n1"));
        membership.publish(v2.clone(), Arc::new(NullSink)).unwrap();
        membership.publish(v1, Arc::new(NullSink)).unwrap();

        assert_eq!(membership.applied_state(), Some(v2));
    }

    #[test]
    fn test_state_after_close_is_rejected() {
        let membership = membership();
        membership.close();
        assert!(membership.write_node_state("k", Some(vec![1])).is_err());
        assert!(membership.start().is_err());
    }

    #[test]
    fn test_peer_state_is_isolated_from_local() {
        let membership = membership();
        membership.write_node_state("k", Some(vec![1])).unwrap();
        membership.seed_peer_state(NodeId::from("n2"), "k", vec![2]);

        assert_eq!(
            membership.read_node_state(&NodeId::from("n1"), "k"),
            Some(vec![1])
        );
        assert_eq!(
            membership.read_node_state(&NodeId::from("n2"), "k"),
            Some(vec![2])
        );
        assert_eq!(membership.read_node_state(&NodeId::from("n3"), "k"), None);
    }
}
