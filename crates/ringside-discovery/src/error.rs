//! Error types for discovery operations.

use std::fmt;

/// Main error type for discovery and cluster-state synchronization.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    /// The coordinator has not completed `start()`.
    NotStarted,
    /// Membership transport failure.
    Transport {
        context: String,
        reason: String,
    },
    /// Payload could not be encoded or decoded.
    Serialization {
        context: String,
        reason: String,
    },
    /// A per-node state payload exceeds the transport's per-key limit.
    StateTooLarge {
        key: String,
        len: usize,
        max: usize,
    },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NotStarted => {
                write!(f, "Discovery coordinator is not started")
            }
            DiscoveryError::Transport { context, reason } => {
                write!(f, "Transport error in {context}: {reason}")
            }
            DiscoveryError::Serialization { context, reason } => {
                write!(f, "Serialization error in {context}: {reason}")
            }
            DiscoveryError::StateTooLarge { key, len, max } => {
                write!(
                    f,
                    "Node state for key '{key}' is {len} bytes, exceeding the {max} byte limit"
                )
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl DiscoveryError {
    /// Whether the caller could have avoided this error (as opposed to a
    /// transport-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DiscoveryError::NotStarted | DiscoveryError::StateTooLarge { .. }
        )
    }

    pub fn from_serde_error(e: impl fmt::Display, context: &str) -> Self {
        DiscoveryError::Serialization {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_transport_error(e: impl fmt::Display, context: &str) -> Self {
        DiscoveryError::Transport {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DiscoveryError::NotStarted;
        assert_eq!(error.to_string(), "Discovery coordinator is not started");

        let error = DiscoveryError::StateTooLarge {
            key: "resource.orders".to_string(),
            len: 2048,
            max: 1024,
        };
        assert_eq!(
            error.to_string(),
            "Node state for key 'resource.orders' is 2048 bytes, exceeding the 1024 byte limit"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(DiscoveryError::NotStarted.is_client_error());
        assert!(
            !DiscoveryError::from_transport_error("connection refused", "publish")
                .is_client_error()
        );
    }

    #[test]
    fn test_from_serde_error() {
        let json_error = serde_json::from_str::<u64>("not-a-number").unwrap_err();
        let error = DiscoveryError::from_serde_error(json_error, "resource state");
        match error {
            DiscoveryError::Serialization { context, .. } => {
                assert_eq!(context, "resource state");
            }
            _ => panic!("Unexpected error type"),
        }
    }
}
