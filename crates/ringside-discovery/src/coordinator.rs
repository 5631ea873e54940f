//! Discovery coordination over the membership protocol.

use crate::{
    ack::{AckTracker, PublishReceipt},
    error::DiscoveryError,
    latch::StateLatch,
    resource_state::ResourceStateRegistry,
    traits::{ListenerId, Membership, MembershipListener},
    types::*,
    version::VersionWaiter,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait for the first processed membership state.
pub const DEFAULT_INITIAL_STATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Key under which the locally applied metadata version is piggybacked into
/// the per-node gossip state, so peers can observe convergence without a
/// dedicated round trip.
const METADATA_VERSION_KEY: &str = "metadata.version";

#[derive(serde::Serialize, serde::Deserialize)]
struct VersionSlot {
    state_id: String,
    version: MetadataVersion,
}

/// Orchestrates membership-protocol start/stop and cluster-state publication.
///
/// The coordinator owns one `AckTracker`, one `VersionWaiter`, and one
/// initial-state latch for its lifetime. `publish` and
/// `await_metadata_version` are deliberately decoupled: a writer returns as
/// soon as its ack policy resolves, while any reader can independently block
/// on the version it cares about.
pub struct DiscoveryCoordinator {
    membership: Arc<dyn Membership>,
    resource_states: ResourceStateRegistry,
    acks: AckTracker,
    versions: Arc<VersionWaiter>,
    initial_state: Arc<StateLatch>,
    listener_id: Mutex<Option<ListenerId>>,
    /// Highest version written into the local gossip slot; like observed
    /// versions, the gossiped version never regresses.
    gossiped: Mutex<MetadataVersion>,
    started: AtomicBool,
    initial_state_timeout: Duration,
    no_master_block: ClusterBlock,
}

struct CoordinatorListener {
    initial_state: Arc<StateLatch>,
    versions: Arc<VersionWaiter>,
}

impl MembershipListener for CoordinatorListener {
    fn initial_state_processed(&self) {
        self.initial_state.signal();
    }

    fn metadata_applied(&self, version: MetadataVersion) {
        self.versions.advance(version);
    }
}

impl DiscoveryCoordinator {
    pub fn new(membership: Arc<dyn Membership>, initial_state_timeout: Duration) -> Self {
        Self {
            resource_states: ResourceStateRegistry::new(Arc::clone(&membership)),
            membership,
            acks: AckTracker::new(),
            versions: Arc::new(VersionWaiter::new()),
            initial_state: Arc::new(StateLatch::new()),
            listener_id: Mutex::new(None),
            gossiped: Mutex::new(MetadataVersion::default()),
            started: AtomicBool::new(false),
            initial_state_timeout,
            no_master_block: ClusterBlock::no_master(),
        }
    }

    /// Register the initial-state listener and start the membership
    /// protocol. Returns immediately; readiness is observed separately via
    /// [`await_initial_state`](Self::await_initial_state). Idempotent.
    pub fn start(&self) -> Result<(), DiscoveryError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("discovery coordinator already started");
            return Ok(());
        }
        let listener = Arc::new(CoordinatorListener {
            initial_state: Arc::clone(&self.initial_state),
            versions: Arc::clone(&self.versions),
        });
        let id = self.membership.add_listener(listener);
        *self.listener_id.lock() = Some(id);
        self.membership.start()?;
        info!("{}", self.membership.node_description());
        Ok(())
    }

    /// Block until the membership protocol has processed its first cluster
    /// state, using the configured timeout. Never errors on timeout.
    pub fn wait_for_initial_state(&self) -> bool {
        self.await_initial_state(self.initial_state_timeout)
    }

    /// Block for at most `timeout` until initial state has been processed.
    /// A zero timeout polls without blocking.
    pub fn await_initial_state(&self, timeout: Duration) -> bool {
        let received = self.initial_state.wait(timeout);
        if !received {
            warn!(
                "waited for {timeout:?} and no initial state was set by the membership protocol"
            );
        }
        received
    }

    /// Submit a metadata snapshot to the cluster and track acknowledgements
    /// against `policy`. The returned receipt resolves when all expected
    /// nodes acknowledge or the policy deadline elapses; partial publishes
    /// are reported, never retried here.
    ///
    /// Fails with [`DiscoveryError::NotStarted`] before `start()` completes;
    /// nothing is sent in that case.
    pub fn publish(
        &self,
        state: ClusterMetadataState,
        policy: AckPolicy,
    ) -> Result<PublishReceipt, DiscoveryError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(DiscoveryError::NotStarted);
        }
        let receipt = self.acks.track(policy.expected, policy.timeout);
        let sink = self.acks.sink_for(receipt.publish_id());
        let slot = VersionSlot {
            state_id: state.state_id.clone(),
            version: state.version,
        };
        self.membership.publish(state, sink)?;

        // Piggyback the published version into the local gossip slot so
        // peers observe convergence through normal anti-entropy exchange.
        // Best effort: a failed slot write does not fail the publish. A
        // concurrent publisher carrying a lower version must not regress
        // the slot, so the write is guarded like observed versions are.
        let mut gossiped = self.gossiped.lock();
        if slot.version > *gossiped {
            match serde_json::to_vec(&slot) {
                Ok(payload) => {
                    match self
                        .membership
                        .write_node_state(METADATA_VERSION_KEY, Some(payload))
                    {
                        Ok(()) => *gossiped = slot.version,
                        Err(e) => {
                            warn!(error = %e, "failed to gossip published metadata version")
                        }
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode metadata version slot"),
            }
        } else {
            debug!(version = %slot.version, "not gossiping version below the slot's current value");
        }
        Ok(receipt)
    }

    /// Block until the locally observed metadata version reaches `version`
    /// or `timeout` elapses. Safe to call concurrently with `publish`, and
    /// before publication has begun.
    pub fn await_metadata_version(&self, version: MetadataVersion, timeout: Duration) -> bool {
        self.versions.wait_for(version, timeout)
    }

    /// The highest metadata version observed so far.
    pub fn observed_version(&self) -> MetadataVersion {
        self.versions.current()
    }

    /// The metadata version `node` last gossiped, if any.
    pub fn gossiped_version(&self, node: &NodeId) -> Option<MetadataVersion> {
        let raw = self.membership.read_node_state(node, METADATA_VERSION_KEY)?;
        match serde_json::from_slice::<VersionSlot>(&raw) {
            Ok(slot) => Some(slot.version),
            Err(e) => {
                debug!(node = %node, error = %e, "malformed metadata version slot");
                None
            }
        }
    }

    pub fn local_node(&self) -> MemberNode {
        self.membership.local_node()
    }

    pub fn node_description(&self) -> String {
        self.membership.node_description()
    }

    pub fn no_master_block(&self) -> &ClusterBlock {
        &self.no_master_block
    }

    /// Read `resource_id`'s gossiped state on `node`, with `default` on
    /// absence or malformed data.
    pub fn read_resource_state(
        &self,
        node: &NodeId,
        resource_id: &str,
        default: ResourceState,
    ) -> ResourceState {
        self.resource_states.read(node, resource_id, default)
    }

    /// Gossip the local state of `resource_id`.
    pub fn write_resource_state(
        &self,
        resource_id: &str,
        state: ResourceState,
    ) -> Result<(), DiscoveryError> {
        self.resource_states.write(resource_id, state)
    }

    /// Drop `resource_id`'s gossiped state.
    pub fn remove_resource_state(&self, resource_id: &str) -> Result<(), DiscoveryError> {
        self.resource_states.remove(resource_id)
    }

    /// Deregister the listener and stop the membership protocol. Idempotent.
    pub fn stop(&self) {
        if self
            .started
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if let Some(id) = self.listener_id.lock().take() {
            self.membership.remove_listener(id);
        }
        self.membership.stop();
    }

    /// Stop and release the membership transport. Idempotent.
    pub fn close(&self) {
        self.stop();
        self.membership.close();
    }
}
