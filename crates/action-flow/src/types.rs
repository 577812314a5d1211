//! Core types for the action sequencer

use crate::errors::{FlowError, TargetError};
use action_locator::NodeQuery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelver_core_types::{NodeId, Selector};
use std::fmt;
use std::time::Duration;

/// Sequencer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Overlay container; its presence means the overlay is ready
    pub container: NodeQuery,

    /// Candidate option nodes, searched inside the container
    pub options: Selector,

    /// Confirm control, searched inside the container
    pub confirm: NodeQuery,

    /// Bound on each overlay wait
    pub overlay_timeout_ms: u64,

    /// Pause after a confirm activation before the next target
    pub settle_delay_ms: u64,

    /// Wait for a leftover overlay to close before activating a trigger
    pub guard_stale_overlay: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            container: NodeQuery::id("gs_md_albl-d"),
            options: Selector::tag("a")
                .with_class("gs_cb_gen")
                .with_class("gs_in_cb")
                .with_class("gs_in_cbb"),
            confirm: NodeQuery::id("gs_lbd_apl"),
            overlay_timeout_ms: 1000,
            settle_delay_ms: 500,
            guard_stale_overlay: true,
        }
    }
}

impl SequencerConfig {
    pub fn overlay_timeout(&self) -> Duration {
        Duration::from_millis(self.overlay_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Reject settings that would make every wait fail instantly
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.overlay_timeout_ms == 0 {
            return Err(FlowError::InvalidConfig(
                "overlay_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Progress of the target currently being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    Idle,
    Triggered,
    AwaitingOverlay,
    Selecting,
    Confirming,
}

impl fmt::Display for TargetPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetPhase::Idle => "idle",
            TargetPhase::Triggered => "triggered",
            TargetPhase::AwaitingOverlay => "awaiting_overlay",
            TargetPhase::Selecting => "selecting",
            TargetPhase::Confirming => "confirming",
        };
        f.write_str(name)
    }
}

/// Terminal state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    /// Label selected and confirmed
    Settled,

    /// Overlay was ready but no option carried the label
    Skipped,

    /// Target could not be completed
    Failed,
}

/// Outcome record for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    /// Position in the snapshot
    pub index: usize,

    /// Trigger node
    pub node: NodeId,

    /// Terminal state
    pub state: TargetState,

    /// Reason for `Skipped` and `Failed`
    pub error: Option<TargetError>,

    /// Time spent on this target in milliseconds
    pub latency_ms: u64,
}

impl TargetOutcome {
    pub fn settled(index: usize, node: NodeId) -> Self {
        Self {
            index,
            node,
            state: TargetState::Settled,
            error: None,
            latency_ms: 0,
        }
    }

    pub fn skipped(index: usize, node: NodeId, error: TargetError) -> Self {
        Self {
            index,
            node,
            state: TargetState::Skipped,
            error: Some(error),
            latency_ms: 0,
        }
    }

    pub fn failed(index: usize, node: NodeId, error: TargetError) -> Self {
        Self {
            index,
            node,
            state: TargetState::Failed,
            error: Some(error),
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Label applied, `None` for activation sweeps
    pub label: Option<String>,

    /// Per-target outcomes in snapshot order
    pub outcomes: Vec<TargetOutcome>,

    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Run stopped early on caller cancellation
    pub cancelled: bool,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,

    /// Total latency in milliseconds
    pub latency_ms: u64,
}

impl RunSummary {
    /// Create an empty summary stamped with the current time
    pub fn new(label: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            label,
            outcomes: Vec::new(),
            settled: 0,
            skipped: 0,
            failed: 0,
            cancelled: false,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
        }
    }

    /// Append an outcome and update the counters
    pub fn record(&mut self, outcome: TargetOutcome) {
        match outcome.state {
            TargetState::Settled => self.settled += 1,
            TargetState::Skipped => self.skipped += 1,
            TargetState::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Mark as finished
    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at).num_milliseconds().max(0) as u64;
    }

    /// Number of targets with an outcome
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcome states in snapshot order
    pub fn states(&self) -> Vec<TargetState> {
        self.outcomes.iter().map(|outcome| outcome.state).collect()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} targets: {} settled, {} skipped, {} failed",
            self.total(),
            self.settled,
            self.skipped,
            self.failed
        )?;
        if let Some(label) = &self.label {
            write!(f, " (label {:?})", label)?;
        }
        if self.cancelled {
            f.write_str(", cancelled")?;
        }
        write!(f, " in {}ms", self.latency_ms)
    }
}
