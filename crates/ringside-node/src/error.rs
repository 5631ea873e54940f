//! Error types and the fatal startup banner.

use ringside_discovery::DiscoveryError;
use std::collections::HashSet;
use std::fmt;

/// Process exit status for unrecoverable startup failures.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 3;

/// Main error type for node lifecycle operations.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeError {
    /// Invalid or unreadable configuration.
    Config {
        context: String,
        reason: String,
    },
    /// The ring subsystem failed during setup or start.
    Ring {
        context: String,
        reason: String,
    },
    /// The metadata store failed to build, recover, or start.
    Metadata {
        context: String,
        reason: String,
    },
    /// The metadata store never initialized in this process lifetime.
    MetadataUnavailable,
    /// The local management interface could not be installed.
    Management {
        reason: String,
    },
    Discovery(DiscoveryError),
    /// Several underlying failures surfaced from one operation.
    Composite {
        context: String,
        reasons: Vec<String>,
    },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Config { context, reason } => {
                write!(f, "Configuration error in {context}: {reason}")
            }
            NodeError::Ring { context, reason } => {
                write!(f, "Ring subsystem error in {context}: {reason}")
            }
            NodeError::Metadata { context, reason } => {
                write!(f, "Metadata store error in {context}: {reason}")
            }
            NodeError::MetadataUnavailable => {
                write!(f, "Metadata store is not running")
            }
            NodeError::Management { reason } => {
                write!(f, "Management registration failed: {reason}")
            }
            NodeError::Discovery(e) => write!(f, "{e}"),
            NodeError::Composite { context, reasons } => {
                write!(f, "{} failures in {context}", reasons.len())
            }
        }
    }
}

impl std::error::Error for NodeError {}

impl From<DiscoveryError> for NodeError {
    fn from(e: DiscoveryError) -> Self {
        NodeError::Discovery(e)
    }
}

impl NodeError {
    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        NodeError::Config {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_ring_error(e: impl fmt::Display, context: &str) -> Self {
        NodeError::Ring {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_metadata_error(e: impl fmt::Display, context: &str) -> Self {
        NodeError::Metadata {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    /// Root-cause messages, one per underlying failure.
    fn root_causes(&self) -> Vec<String> {
        match self {
            NodeError::Composite { reasons, .. } => reasons.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Build the structured, versioned banner printed before a fatal exit.
///
/// Duplicate underlying messages are collapsed and the survivors numbered,
/// so a dependency graph that fails the same way many times reads as one
/// cause.
pub fn build_error_banner(stage: &str, error: &NodeError) -> String {
    let mut banner = format!(
        "{{{}}}: {} failed ...\n",
        env!("CARGO_PKG_VERSION"),
        stage
    );
    let mut seen = HashSet::new();
    let mut counter = 1;
    for cause in error.root_causes() {
        if !seen.insert(cause.clone()) {
            continue;
        }
        banner.push_str(&format!("{counter}) {cause}\n"));
        counter += 1;
    }
    banner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NodeError::Config {
            context: "loading".to_string(),
            reason: "missing cluster name".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration error in loading: missing cluster name"
        );

        assert_eq!(
            NodeError::MetadataUnavailable.to_string(),
            "Metadata store is not running"
        );
    }

    #[test]
    fn test_discovery_error_conversion() {
        let error: NodeError = DiscoveryError::NotStarted.into();
        assert_eq!(error, NodeError::Discovery(DiscoveryError::NotStarted));
    }

    #[test]
    fn test_banner_is_versioned_and_numbered() {
        let error = NodeError::Metadata {
            context: "activate".to_string(),
            reason: "recovery failed".to_string(),
        };
        let banner = build_error_banner("Initialization", &error);
        assert!(banner.starts_with(&format!("{{{}}}", env!("CARGO_PKG_VERSION"))));
        assert!(banner.contains("Initialization failed ..."));
        assert!(banner.contains("1) Metadata store error in activate: recovery failed"));
    }

    #[test]
    fn test_banner_deduplicates_composite_causes() {
        let error = NodeError::Composite {
            context: "injection".to_string(),
            reasons: vec![
                "missing binding".to_string(),
                "missing binding".to_string(),
                "bad module".to_string(),
            ],
        };
        let banner = build_error_banner("Setup", &error);
        assert!(banner.contains("1) missing binding"));
        assert!(banner.contains("2) bad module"));
        assert!(!banner.contains("3)"));
    }
}
