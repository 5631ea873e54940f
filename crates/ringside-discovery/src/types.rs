//! Core types for discovery and cluster-state synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// Setting key for the initial-state wait timeout.
pub const SETTING_INITIAL_STATE_TIMEOUT: &str = "discovery.initial_state_timeout";
/// Setting key for the deterministic node-id seed.
pub const SETTING_DISCOVERY_SEED: &str = "discovery.id.seed";

/// Unique identifier for a member of the ring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member identity as observed through the membership protocol.
///
/// Owned by the membership subsystem; the discovery layer only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNode {
    pub id: NodeId,
    pub name: String,
    pub address: SocketAddr,
}

impl MemberNode {
    pub fn new(id: NodeId, name: String, address: SocketAddr) -> Self {
        Self { id, name, address }
    }

    /// Human-readable description, used in startup logging.
    pub fn description(&self) -> String {
        format!("{}[{}]{{{}}}", self.name, self.id, self.address)
    }
}

/// Monotonically increasing metadata version.
///
/// Versions are globally unique and totally ordered; per node, observed
/// versions never regress.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MetadataVersion(pub u64);

impl MetadataVersion {
    pub fn next(self) -> MetadataVersion {
        MetadataVersion(self.0 + 1)
    }
}

impl From<u64> for MetadataVersion {
    fn from(v: u64) -> Self {
        MetadataVersion(v)
    }
}

impl From<MetadataVersion> for u64 {
    fn from(v: MetadataVersion) -> Self {
        v.0
    }
}

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Block id carried by the no-master sentinel.
pub const NO_MASTER_BLOCK_ID: u32 = 2;

/// A sentinel attached to metadata state marking a cluster-level restriction.
///
/// The no-master block is present exactly while the discovery layer has not
/// completed initial-state convergence or has lost its master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBlock {
    pub id: u32,
    pub reason: String,
}

impl ClusterBlock {
    pub fn no_master() -> Self {
        Self {
            id: NO_MASTER_BLOCK_ID,
            reason: "no master".to_string(),
        }
    }
}

/// A versioned, immutable snapshot of global cluster configuration.
///
/// Each publish produces a new snapshot with `version = previous.version + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetadataState {
    pub version: MetadataVersion,
    pub state_id: String,
    pub cluster_name: String,
    pub master: Option<NodeId>,
    pub blocks: Vec<ClusterBlock>,
}

impl ClusterMetadataState {
    /// Initial snapshot: version 0, no master known, no-master block set.
    pub fn initial(cluster_name: &str) -> Self {
        Self {
            version: MetadataVersion(0),
            state_id: Uuid::new_v4().to_string(),
            cluster_name: cluster_name.to_string(),
            master: None,
            blocks: vec![ClusterBlock::no_master()],
        }
    }

    /// Derive the successor snapshot with an incremented version, the given
    /// master, and the no-master block cleared.
    pub fn with_master(&self, master: NodeId) -> Self {
        Self {
            version: self.version.next(),
            state_id: Uuid::new_v4().to_string(),
            cluster_name: self.cluster_name.clone(),
            master: Some(master),
            blocks: self
                .blocks
                .iter()
                .filter(|b| b.id != NO_MASTER_BLOCK_ID)
                .cloned()
                .collect(),
        }
    }

    /// Derive the successor snapshot with the master dropped and the
    /// no-master block reinstated.
    pub fn without_master(&self) -> Self {
        let mut blocks = self.blocks.clone();
        if !self.has_block(NO_MASTER_BLOCK_ID) {
            blocks.push(ClusterBlock::no_master());
        }
        Self {
            version: self.version.next(),
            state_id: Uuid::new_v4().to_string(),
            cluster_name: self.cluster_name.clone(),
            master: None,
            blocks,
        }
    }

    pub fn has_block(&self, id: u32) -> bool {
        self.blocks.iter().any(|b| b.id == id)
    }
}

/// Observable state of a local resource, exchanged through gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Unassigned => "unassigned",
            ResourceState::Initializing => "initializing",
            ResourceState::Started => "started",
            ResourceState::Relocating => "relocating",
        };
        write!(f, "{s}")
    }
}

/// Wire record for a resource's state inside a per-node gossip slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStateRecord {
    pub resource_id: String,
    pub state: ResourceState,
    /// When the owning node last wrote this slot; diagnostic only, never
    /// compared across nodes.
    pub written_at: DateTime<Utc>,
}

/// The node set and deadline against which a publish's acknowledgements are
/// measured.
#[derive(Debug, Clone)]
pub struct AckPolicy {
    pub expected: HashSet<NodeId>,
    pub timeout: Duration,
}

impl AckPolicy {
    pub fn new(expected: HashSet<NodeId>, timeout: Duration) -> Self {
        Self { expected, timeout }
    }
}

/// Generate a node id, deterministically when a seed is configured.
///
/// A configured `discovery.id.seed` yields the same id on every run, which
/// keeps node identity stable across restarts in test clusters.
pub fn generate_node_id(seed: Option<u64>) -> NodeId {
    let uuid = match seed {
        Some(seed) => {
            let hi = splitmix64(seed);
            let lo = splitmix64(hi);
            Uuid::from_u64_pair(hi, lo)
        }
        None => Uuid::new_v4(),
    };
    NodeId(uuid.simple().to_string())
}

/// Derive a node name from the bind address when none is configured.
pub fn build_node_name(address: &SocketAddr) -> String {
    format!("node_{}", address.ip())
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
