//! Activation sweep
//!
//! Activates every node of a snapshot in order with a fixed pause between
//! activations. No overlay is involved.

use crate::errors::{FlowError, TargetError};
use crate::types::{RunSummary, TargetOutcome};
use action_primitives::{ActionError, ActionPrimitives, ExecCtx};
use shelver_core_types::NodeId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ActivationSweep {
    primitives: Arc<dyn ActionPrimitives>,
    delay: Duration,
}

impl ActivationSweep {
    pub fn new(primitives: Arc<dyn ActionPrimitives>, delay: Duration) -> Self {
        Self { primitives, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Activate `targets` one at a time
    pub async fn run(
        &self,
        targets: &[NodeId],
        cancel: &CancellationToken,
    ) -> Result<RunSummary, FlowError> {
        info!(targets = targets.len(), delay_ms = self.delay.as_millis() as u64, "Starting sweep");
        let mut summary = RunSummary::new(None);
        let mut cancelled = false;

        for (index, &target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let ctx = ExecCtx::new(format!("sweep-{}", index), cancel.child_token());
            if index > 0 && self.primitives.pause(&ctx, self.delay).await.is_err() {
                cancelled = true;
                break;
            }

            let started = Instant::now();
            let outcome = match self.primitives.activate(&ctx, target) {
                Ok(()) => TargetOutcome::settled(index, target),
                Err(ActionError::Detached(_)) => {
                    warn!(index, node = %target, "Sweep target detached");
                    TargetOutcome::failed(index, target, TargetError::TriggerDetached)
                }
                Err(ActionError::Interrupted(_)) => {
                    cancelled = true;
                    break;
                }
                Err(err) => return Err(err.into()),
            };
            summary.record(outcome.with_latency(started.elapsed()));
        }

        summary.finish(cancelled);
        info!(summary = %summary, "Sweep finished");
        Ok(summary)
    }
}
