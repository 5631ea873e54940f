//! Node configuration.

use crate::error::NodeError;
use ringside_discovery::types::{MemberNode, generate_node_id};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_bind_address() -> SocketAddr {
    "127.0.0.1:9300".parse().expect("valid default address")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_initial_state_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// Recognized node options.
///
/// Cluster name, node name, and bind address feed both subsystems from one
/// source of truth; that is what keeps the ring identity and the metadata
/// store identity from splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub cluster_name: String,
    /// Derived from the bind address when absent.
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Native-bootstrap flags; logged at startup and honored where the
    /// platform supports them.
    #[serde(default)]
    pub mlockall: bool,
    #[serde(default = "default_true")]
    pub seccomp: bool,
    #[serde(default = "default_true")]
    pub ctrl_handler: bool,
    #[serde(default = "default_initial_state_timeout_ms")]
    pub initial_state_timeout_ms: u64,
    /// Deterministic node-id seed; random id when absent.
    #[serde(default)]
    pub gossip_seed: Option<u64>,
}

impl NodeConfig {
    pub fn new(cluster_name: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            node_name: None,
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            mlockall: false,
            seccomp: true,
            ctrl_handler: true,
            initial_state_timeout_ms: default_initial_state_timeout_ms(),
            gossip_seed: None,
        }
    }

    /// Load configuration from a YAML (or JSON) file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::from_io_error(e, "config loading"))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let config: NodeConfig = match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| NodeError::Config {
                context: "JSON config parsing".to_string(),
                reason: e.to_string(),
            })?,
            _ => serde_yaml::from_str(&content).map_err(|e| NodeError::Config {
                context: "YAML config parsing".to_string(),
                reason: e.to_string(),
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.cluster_name.trim().is_empty() {
            return Err(NodeError::Config {
                context: "validation".to_string(),
                reason: "cluster_name must not be empty".to_string(),
            });
        }
        if let Some(name) = &self.node_name
            && name.trim().is_empty()
        {
            return Err(NodeError::Config {
                context: "validation".to_string(),
                reason: "node_name must not be empty when set".to_string(),
            });
        }
        Ok(())
    }

    /// Effective node name: configured, or derived from the bind address.
    pub fn effective_node_name(&self) -> String {
        self.node_name
            .clone()
            .unwrap_or_else(|| ringside_discovery::types::build_node_name(&self.bind_address))
    }

    pub fn initial_state_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_state_timeout_ms)
    }

    /// The identity this node presents to the membership protocol.
    ///
    /// A configured `gossip_seed` makes the id stable across restarts.
    pub fn local_member(&self) -> MemberNode {
        MemberNode::new(
            generate_node_id(self.gossip_seed),
            self.effective_node_name(),
            self.bind_address,
        )
    }
}
