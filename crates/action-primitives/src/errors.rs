//! Error types for action primitives

use action_locator::LocatorError;
use shelver_core_types::{HostError, NodeId};
use thiserror::Error;

/// Error types for action primitive operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The awaited condition did not hold within the bound
    #[error("Condition not met within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Operation was cancelled by the caller
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Node left the document before it could be used
    #[error("Node detached: {0}")]
    Detached(NodeId),

    /// The tree host cannot service requests
    #[error("Tree host unavailable: {0}")]
    HostUnavailable(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Timeout { .. })
    }

    /// Whether the error should stop the whole run rather than one target
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ActionError::HostUnavailable(_) | ActionError::Internal(_)
        )
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::HostUnavailable(_) | ActionError::Internal(_) => 3,
            ActionError::Interrupted(_) => 2,
            ActionError::Timeout { .. } | ActionError::Detached(_) => 1,
        }
    }
}

impl From<HostError> for ActionError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Detached(node) => ActionError::Detached(node),
            HostError::Unavailable(reason) => ActionError::HostUnavailable(reason),
        }
    }
}

impl From<LocatorError> for ActionError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::HostUnavailable(reason) => ActionError::HostUnavailable(reason),
            other => ActionError::Internal(other.to_string()),
        }
    }
}
