//! Core data types for action primitives

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Execution context for action primitives
///
/// Carries the cancellation token of the enclosing run and a label used to
/// correlate log lines of one target.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Correlation label for tracing
    pub action_id: String,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,
}

impl ExecCtx {
    /// Create a new execution context
    pub fn new(action_id: impl Into<String>, cancel_token: CancellationToken) -> Self {
        Self {
            action_id: action_id.into(),
            cancel_token,
        }
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// How a wait came to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Condition already held when the wait started; no watch was armed
    PreCheck,

    /// Condition held on the re-check right after the watch was armed
    PostArm,

    /// A mutation batch made the condition hold
    Mutation,
}

/// Successful wait result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waited<T> {
    /// Value produced by the check
    pub value: T,

    /// Which path resolved the wait
    pub resolution: Resolution,

    /// Mutation batches observed before resolving
    pub batches: u32,

    /// Time spent waiting
    pub elapsed: Duration,
}

impl<T> Waited<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}
