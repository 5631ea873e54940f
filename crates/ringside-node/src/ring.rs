//! Trait seams for the ring-membership subsystem's lifecycle.
//!
//! The ring's durable log, bootstrap protocol, and failure detector are
//! external; the node crate only drives their lifecycle and receives control
//! at three named checkpoints during `setup`.

use crate::error::NodeError;
use std::net::SocketAddr;
use std::sync::Arc;

/// Named checkpoints in the ring subsystem's startup sequence.
///
/// `setup` invokes these in order: `before_recover` ahead of durable-log
/// replay, `before_bootstrap` only when this node joins the ring for the
/// first time, and `before_startup_complete` just before the ring declares
/// itself started. Implementations must contain their own failures; a
/// checkpoint must never abort ring startup.
pub trait StartupHooks: Send + Sync {
    fn before_recover(&self);
    fn before_bootstrap(&self);
    fn before_startup_complete(&self);
}

/// The ring-membership subsystem's lifecycle, as driven by the node daemon.
pub trait RingSubsystem: Send + Sync {
    /// Run the ring's full setup: log replay and, on a fresh node, ring
    /// bootstrap. Fires the registered hooks at the documented points and
    /// blocks until setup completes.
    fn setup(&self, hooks: Arc<dyn StartupHooks>) -> Result<(), NodeError>;

    /// Complete the ring's start. Blocks until the ring is serving.
    fn start(&self) -> Result<(), NodeError>;

    /// Leave the ring and stop. Idempotent.
    fn stop(&self);

    /// Whether the metadata store's administrative namespace survives from a
    /// previous run. Checked at `before_recover`; a concurrent bootstrap may
    /// still create it between this check and namespace creation, so
    /// creation must itself be create-if-absent.
    fn admin_namespace_exists(&self) -> bool;

    /// Cluster name, the shared source of truth for both subsystems.
    fn cluster_name(&self) -> String;

    /// The ring's bind address; the metadata store binds relative to it.
    fn listen_address(&self) -> SocketAddr;
}
