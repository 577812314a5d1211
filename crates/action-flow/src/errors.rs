//! Sequencer error types

use action_locator::LocatorError;
use action_primitives::ActionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that stop a whole run
#[derive(Debug, Error)]
pub enum FlowError {
    /// The tree host became unusable
    #[error("Host unavailable: {0}")]
    Host(String),

    /// Sequencer configuration rejected before the run started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FlowError::InvalidConfig(_) => ErrorSeverity::Medium,
            FlowError::Host(_) | FlowError::Internal(_) => ErrorSeverity::Critical,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Why a single target did not settle
///
/// Recorded on the target's outcome; never stops the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetError {
    /// Overlay did not become ready in time
    #[error("Overlay not ready after {timeout_ms}ms")]
    OverlayTimeout { timeout_ms: u64 },

    /// No option in the overlay carries the label
    #[error("No option labelled {label:?}")]
    LabelNotFound { label: String },

    /// An option matched but the overlay has no confirm control
    #[error("Confirm control missing")]
    ConfirmControlMissing,

    /// Trigger left the tree before its turn
    #[error("Trigger detached")]
    TriggerDetached,

    /// Option or confirm control left the tree between lookup and activation
    #[error("Overlay control detached")]
    ControlDetached,

    /// A previous overlay never closed and no new one appeared beside it
    #[error("No new overlay beside the stale one within {timeout_ms}ms")]
    StaleOverlay { timeout_ms: u64 },
}

impl TargetError {
    /// Whether rerunning the target could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TargetError::OverlayTimeout { .. }
                | TargetError::StaleOverlay { .. }
                | TargetError::ControlDetached
        )
    }
}

impl From<ActionError> for FlowError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::HostUnavailable(reason) => FlowError::Host(reason),
            other => FlowError::Internal(other.to_string()),
        }
    }
}

impl From<LocatorError> for FlowError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::HostUnavailable(reason) => FlowError::Host(reason),
            LocatorError::InvalidSelector(err) => FlowError::InvalidConfig(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_error_serializes_with_kind_tag() {
        let err = TargetError::OverlayTimeout { timeout_ms: 1000 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "overlay_timeout");
        assert_eq!(json["timeout_ms"], 1000);

        let back: TargetError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_host_failure_maps_to_flow_error() {
        let err: FlowError = ActionError::HostUnavailable("bridge closed".into()).into();
        assert!(matches!(err, FlowError::Host(ref reason) if reason == "bridge closed"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
