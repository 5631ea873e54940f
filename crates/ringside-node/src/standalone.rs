//! Single-process realization of the subsystem seams.
//!
//! `StandaloneRing` plays the ring subsystem for one-node deployments: its
//! durable state is just the administrative-namespace marker under the data
//! directory, and its checkpoints fire synchronously during `setup`. The
//! in-memory metadata node keeps a local snapshot and persists nothing but
//! that marker. Real clustered deployments plug their own implementations
//! into the same traits.

use crate::{
    config::NodeConfig,
    error::NodeError,
    metadata::{MetadataClient, MetadataNode, MetadataNodeConfig, MetadataNodeFactory},
    ring::{RingSubsystem, StartupHooks},
};
use parking_lot::RwLock;
use ringside_discovery::types::ClusterMetadataState;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Marker file whose presence means a previous run completed metadata-store
/// initialization.
pub fn admin_namespace_marker(data_dir: &Path) -> PathBuf {
    data_dir.join("admin").join("namespace")
}

/// Ring subsystem for a single-node process.
pub struct StandaloneRing {
    cluster_name: String,
    bind_address: SocketAddr,
    data_dir: PathBuf,
    started: AtomicBool,
}

impl StandaloneRing {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            cluster_name: config.cluster_name.clone(),
            bind_address: config.bind_address,
            data_dir: config.data_dir.clone(),
            started: AtomicBool::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl RingSubsystem for StandaloneRing {
    fn setup(&self, hooks: Arc<dyn StartupHooks>) -> Result<(), NodeError> {
        // Fresh-ness is decided once, up front: the before_recover hook may
        // itself create the namespace.
        let fresh = !self.admin_namespace_exists();

        hooks.before_recover();
        if fresh {
            debug!("fresh node, running ring bootstrap");
            hooks.before_bootstrap();
        }
        hooks.before_startup_complete();
        Ok(())
    }

    fn start(&self) -> Result<(), NodeError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    fn admin_namespace_exists(&self) -> bool {
        admin_namespace_marker(&self.data_dir).exists()
    }

    fn cluster_name(&self) -> String {
        self.cluster_name.clone()
    }

    fn listen_address(&self) -> SocketAddr {
        self.bind_address
    }
}

/// Builds in-memory metadata nodes.
pub struct StandaloneMetadataFactory;

impl MetadataNodeFactory for StandaloneMetadataFactory {
    fn build(&self, config: MetadataNodeConfig) -> Result<Arc<dyn MetadataNode>, NodeError> {
        Ok(Arc::new(StandaloneMetadataNode {
            state: RwLock::new(ClusterMetadataState::initial(&config.cluster_name)),
            config,
            activated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

struct StandaloneMetadataNode {
    config: MetadataNodeConfig,
    state: RwLock<ClusterMetadataState>,
    activated: AtomicBool,
    closed: AtomicBool,
}

impl MetadataNode for StandaloneMetadataNode {
    fn activate(&self) -> Result<(), NodeError> {
        let marker = admin_namespace_marker(&self.config.data_dir);
        if let Some(parent) = marker.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NodeError::from_metadata_error(e, "creating admin namespace"))?;
        }
        // Create-if-absent: a marker left by a previous run, or raced in by
        // a concurrent bootstrapper, is not an error.
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&marker)
            .map_err(|e| NodeError::from_metadata_error(e, "creating admin namespace"))?;
        self.activated.store(true, Ordering::SeqCst);
        debug!(node = %self.config.node_name, "local metadata recovery complete");
        Ok(())
    }

    fn start(&self) -> Result<(), NodeError> {
        if !self.activated.load(Ordering::SeqCst) {
            return Err(NodeError::from_metadata_error(
                "node was not activated",
                "starting external services",
            ));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn client(&self) -> Option<Arc<dyn MetadataClient>> {
        if self.is_closed() {
            return None;
        }
        Some(Arc::new(SnapshotClient {
            state: self.state.read().clone(),
        }))
    }
}

struct SnapshotClient {
    state: ClusterMetadataState,
}

impl MetadataClient for SnapshotClient {
    fn state(&self) -> ClusterMetadataState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> NodeConfig {
        let mut config = NodeConfig::new("standalone-test");
        config.data_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_namespace_marker_survives_restart() {
        let dir = TempDir::new().unwrap();
        let ring = StandaloneRing::new(&config(&dir));
        assert!(!ring.admin_namespace_exists());

        let factory = StandaloneMetadataFactory;
        let node = factory
            .build(MetadataNodeConfig {
                cluster_name: "standalone-test".to_string(),
                node_name: "node_127.0.0.1".to_string(),
                bind_address: "127.0.0.1:9300".parse().unwrap(),
                data_dir: dir.path().to_path_buf(),
            })
            .unwrap();
        node.activate().unwrap();

        assert!(ring.admin_namespace_exists());
        // a second ring over the same data dir sees the namespace
        assert!(StandaloneRing::new(&config(&dir)).admin_namespace_exists());
    }

    #[test]
    fn test_activate_is_idempotent_over_existing_marker() {
        let dir = TempDir::new().unwrap();
        let factory = StandaloneMetadataFactory;
        let build = |_| {
            factory
                .build(MetadataNodeConfig {
                    cluster_name: "standalone-test".to_string(),
                    node_name: "node_127.0.0.1".to_string(),
                    bind_address: "127.0.0.1:9300".parse().unwrap(),
                    data_dir: dir.path().to_path_buf(),
                })
                .unwrap()
        };
        build(()).activate().unwrap();
        build(()).activate().unwrap();
    }

    #[test]
    fn test_start_requires_activation() {
        let dir = TempDir::new().unwrap();
        let node = StandaloneMetadataFactory
            .build(MetadataNodeConfig {
                cluster_name: "standalone-test".to_string(),
                node_name: "node_127.0.0.1".to_string(),
                bind_address: "127.0.0.1:9300".parse().unwrap(),
                data_dir: dir.path().to_path_buf(),
            })
            .unwrap();
        assert!(node.start().is_err());
        node.activate().unwrap();
        node.start().unwrap();
    }

    #[test]
    fn test_client_is_none_after_close() {
        let dir = TempDir::new().unwrap();
        let node = StandaloneMetadataFactory
            .build(MetadataNodeConfig {
                cluster_name: "standalone-test".to_string(),
                node_name: "node_127.0.0.1".to_string(),
                bind_address: "127.0.0.1:9300".parse().unwrap(),
                data_dir: dir.path().to_path_buf(),
            })
            .unwrap();
        node.activate().unwrap();
        assert!(node.client().is_some());
        node.close();
        assert!(node.client().is_none());
    }
}
