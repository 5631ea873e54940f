//! The node daemon: one explicitly constructed orchestrator per process.

use crate::{
    bootstrap::{BootstrapSequencer, Phase},
    config::NodeConfig,
    error::NodeError,
    metadata::{MetadataClient, MetadataNodeFactory},
    ring::{RingSubsystem, StartupHooks},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

/// Local monitoring/management registration. Failure to install it is
/// logged and startup proceeds.
pub trait ManagementHook: Send + Sync {
    fn register(&self) -> Result<(), NodeError>;

    fn unregister(&self) {}
}

/// Owns both subsystems and drives the strict startup ordering:
/// ring setup (which fires the bootstrap checkpoints) → ring start →
/// metadata-store external services. Each step blocks until complete.
pub struct NodeDaemon {
    ring: Arc<dyn RingSubsystem>,
    sequencer: Arc<BootstrapSequencer>,
    management: Option<Arc<dyn ManagementHook>>,
    activated: AtomicBool,
    stopped: AtomicBool,
    stop_on_drop: AtomicBool,
}

impl NodeDaemon {
    pub fn new(
        ring: Arc<dyn RingSubsystem>,
        factory: Arc<dyn MetadataNodeFactory>,
        config: NodeConfig,
    ) -> Self {
        let sequencer = Arc::new(BootstrapSequencer::new(Arc::clone(&ring), factory, config));
        Self {
            ring,
            sequencer,
            management: None,
            activated: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_on_drop: AtomicBool::new(false),
        }
    }

    pub fn with_management(mut self, hook: Arc<dyn ManagementHook>) -> Self {
        self.management = Some(hook);
        self
    }

    /// Bring the node up. Returns once both subsystems have completed
    /// startup; any unrecoverable failure propagates to the caller.
    ///
    /// With `add_shutdown_hook`, dropping the daemon stops it (the stand-in
    /// for a process shutdown hook).
    pub fn activate(&self, add_shutdown_hook: bool) -> Result<(), NodeError> {
        self.stop_on_drop.store(add_shutdown_hook, Ordering::SeqCst);
        if self
            .activated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("node already activated");
            return Ok(());
        }

        if let Some(management) = &self.management
            && let Err(e) = management.register()
        {
            // the node can run unmonitored
            error!(error = %e, "failed to register management interface");
        }

        // Fires before_recover / before_bootstrap / before_startup_complete,
        // which initialize the metadata store at the right point.
        self.ring
            .setup(Arc::clone(&self.sequencer) as Arc<dyn StartupHooks>)?;
        // Complete the ring's own start.
        self.ring.start()?;
        // Open the metadata store's public services, exactly once.
        self.sequencer.start_external_services()?;

        info!("node startup complete");
        Ok(())
    }

    /// Synchronous teardown: metadata store first, then the ring. Idempotent.
    pub fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.sequencer.close_metadata();
        self.ring.stop();
        if let Some(management) = &self.management {
            management.unregister();
        }
        info!("node stopped");
    }

    /// Full teardown, for process exit paths.
    pub fn destroy(&self) {
        self.stop();
    }

    /// A metadata client, or `None` while the store is not running.
    pub fn client(&self) -> Option<Arc<dyn MetadataClient>> {
        self.sequencer.client()
    }

    pub fn phase(&self) -> Phase {
        self.sequencer.phase()
    }

    pub fn sequencer(&self) -> &Arc<BootstrapSequencer> {
        &self.sequencer
    }
}

impl Drop for NodeDaemon {
    fn drop(&mut self) {
        if self.stop_on_drop.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}
