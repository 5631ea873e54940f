//! Bootstrap sequencing across the two subsystems.
//!
//! The sequencer registers itself into the ring subsystem's startup as three
//! named checkpoints and initializes the metadata store at the first one
//! whose guard holds — before log replay when a previous run left the
//! administrative namespace behind, before ring bootstrap on a fresh node,
//! or as a last resort just before startup completes. Initialization runs at
//! most once per process, and a failed attempt is never retried.

use crate::{
    config::NodeConfig,
    error::NodeError,
    metadata::{MetadataClient, MetadataNode, MetadataNodeConfig, MetadataNodeFactory},
    ring::{RingSubsystem, StartupHooks},
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::{debug, info, warn};

/// Where the sequencer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Initializing,
    Ready,
    Failed,
}

impl Phase {
    fn from_u8(raw: u8) -> Phase {
        match raw {
            1 => Phase::Initializing,
            2 => Phase::Ready,
            3 => Phase::Failed,
            _ => Phase::NotStarted,
        }
    }
}

/// What a checkpoint did when it fired.
///
/// Failures are contained here: the ring subsystem's own startup must never
/// be aborted by a metadata-store problem, so a checkpoint reports `Failed`
/// instead of propagating.
#[derive(Debug)]
pub enum CheckpointOutcome {
    /// This checkpoint performed the initialization.
    Initialized,
    /// An earlier checkpoint (or concurrent caller) already attempted it.
    AlreadyAttempted,
    /// The checkpoint's guard did not hold; nothing to do.
    Skipped,
    /// The attempt ran here and failed; the metadata store stays unstarted
    /// for this process lifetime.
    Failed { error: NodeError },
}

/// Drives metadata-store initialization from the ring's startup checkpoints.
pub struct BootstrapSequencer {
    ring: Arc<dyn RingSubsystem>,
    factory: Arc<dyn MetadataNodeFactory>,
    config: NodeConfig,
    /// At-most-once guard for the initialization attempt. Checkpoints may
    /// fire from different threads, so this is a compare-and-set, not a
    /// plain flag read.
    init_attempted: AtomicBool,
    external_started: AtomicBool,
    phase: AtomicU8,
    node: Mutex<Option<Arc<dyn MetadataNode>>>,
}

impl BootstrapSequencer {
    pub fn new(
        ring: Arc<dyn RingSubsystem>,
        factory: Arc<dyn MetadataNodeFactory>,
        config: NodeConfig,
    ) -> Self {
        Self {
            ring,
            factory,
            config,
            init_attempted: AtomicBool::new(false),
            external_started: AtomicBool::new(false),
            phase: AtomicU8::new(0),
            node: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// The running metadata node, if initialization succeeded.
    pub fn metadata_node(&self) -> Option<Arc<dyn MetadataNode>> {
        self.node.lock().clone()
    }

    /// A metadata client, or `None` while the store is absent or closed.
    pub fn client(&self) -> Option<Arc<dyn MetadataClient>> {
        let node = self.metadata_node()?;
        if node.is_closed() {
            return None;
        }
        node.client()
    }

    /// Start the metadata store's externally facing services. Called exactly
    /// once, after ring start, regardless of which checkpoint initialized
    /// the store. A store that never initialized degrades to unavailable
    /// rather than failing the node.
    pub fn start_external_services(&self) -> Result<(), NodeError> {
        if self
            .external_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        match self.metadata_node() {
            Some(node) => {
                node.start()?;
                info!("metadata store external services started");
                Ok(())
            }
            None => {
                warn!(
                    "metadata store was never initialized; external services remain unavailable"
                );
                Ok(())
            }
        }
    }

    /// Close the metadata node, if one is running.
    pub fn close_metadata(&self) {
        if let Some(node) = self.node.lock().take() {
            node.close();
        }
    }

    /// Run the initialization action: derive the metadata-store config from
    /// the ring's identity, build the node, and block until local recovery
    /// completes. At most one caller performs this.
    fn initialize(&self) -> CheckpointOutcome {
        if self
            .init_attempted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return CheckpointOutcome::AlreadyAttempted;
        }
        self.phase.store(1, Ordering::SeqCst);
        match self.try_initialize() {
            Ok(()) => {
                self.phase.store(2, Ordering::SeqCst);
                CheckpointOutcome::Initialized
            }
            Err(error) => {
                self.phase.store(3, Ordering::SeqCst);
                CheckpointOutcome::Failed { error }
            }
        }
    }

    fn try_initialize(&self) -> Result<(), NodeError> {
        let metadata_config = MetadataNodeConfig {
            cluster_name: self.ring.cluster_name(),
            node_name: self.config.effective_node_name(),
            bind_address: self.ring.listen_address(),
            data_dir: self.config.data_dir.clone(),
        };
        let node = self.factory.build(metadata_config)?;
        // Blocks until local primary-resource recovery completes. The store
        // can index afterwards, but is not externally reachable yet.
        node.activate()?;
        *self.node.lock() = Some(node);
        debug!("metadata store ready to index (external services not yet started)");
        Ok(())
    }

    fn report(&self, checkpoint: &str, outcome: CheckpointOutcome) {
        match outcome {
            CheckpointOutcome::Initialized => {
                info!(checkpoint, "metadata store initialized");
            }
            CheckpointOutcome::AlreadyAttempted => {
                debug!(checkpoint, "metadata store initialization already attempted");
            }
            CheckpointOutcome::Skipped => {
                debug!(checkpoint, "checkpoint guard not met, skipping");
            }
            CheckpointOutcome::Failed { error } => {
                warn!(checkpoint, %error, "metadata store initialization failed; continuing ring startup");
            }
        }
    }
}

impl StartupHooks for BootstrapSequencer {
    fn before_recover(&self) {
        // A surviving admin namespace means a previous run completed
        // initialization; start the store now so log replay can use it.
        if self.ring.admin_namespace_exists() {
            debug!("starting metadata store before log replay (admin namespace exists)");
            let outcome = self.initialize();
            self.report("before_recover", outcome);
        } else {
            self.report("before_recover", CheckpointOutcome::Skipped);
        }
    }

    fn before_bootstrap(&self) {
        // Fresh node joining for the first time: this run creates the admin
        // namespace.
        if !self.init_attempted.load(Ordering::SeqCst) {
            debug!("starting metadata store before ring bootstrap (creating admin namespace)");
            let outcome = self.initialize();
            self.report("before_bootstrap", outcome);
        } else {
            self.report("before_bootstrap", CheckpointOutcome::AlreadyAttempted);
        }
    }

    fn before_startup_complete(&self) {
        // Last resort: neither prior checkpoint fired (no prior namespace,
        // no bootstrap).
        if !self.init_attempted.load(Ordering::SeqCst) {
            debug!("starting metadata store before startup completes");
            let outcome = self.initialize();
            self.report("before_startup_complete", outcome);
        } else {
            self.report("before_startup_complete", CheckpointOutcome::AlreadyAttempted);
        }
    }
}
