//! Sequencer implementation

use crate::errors::{FlowError, TargetError};
use crate::types::*;
use action_locator::{LocatorError, NodeLocator, NodePredicate};
use action_primitives::{ActionError, ActionPrimitives, ExecCtx};
use async_trait::async_trait;
use shelver_core_types::NodeId;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Sequencer trait
#[async_trait]
pub trait Sequencer: Send + Sync {
    /// Process `triggers` one at a time, in order, applying `label` to each
    async fn run(
        &self,
        triggers: &[NodeId],
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, FlowError>;

    /// Active settings
    fn config(&self) -> &SequencerConfig;
}

/// Default sequencer: trigger, await overlay, select, confirm, settle
pub struct ActionSequencer {
    primitives: Arc<dyn ActionPrimitives>,
    config: SequencerConfig,
}

/// Why a target stopped without producing an outcome
enum Halt {
    Cancelled,
    Fatal(FlowError),
}

impl From<LocatorError> for Halt {
    fn from(err: LocatorError) -> Self {
        Halt::Fatal(err.into())
    }
}

fn escalate(err: ActionError) -> Halt {
    match err {
        ActionError::Interrupted(_) => Halt::Cancelled,
        other => Halt::Fatal(other.into()),
    }
}

/// Outcome of one target, before settling
struct Step {
    outcome: TargetOutcome,
    /// Confirm control was activated; the host needs the settle delay
    confirmed: bool,
}

impl Step {
    fn unconfirmed(outcome: TargetOutcome) -> Self {
        Self {
            outcome,
            confirmed: false,
        }
    }
}

impl ActionSequencer {
    /// Create a new sequencer; rejects invalid settings
    pub fn new(
        primitives: Arc<dyn ActionPrimitives>,
        config: SequencerConfig,
    ) -> Result<Self, FlowError> {
        config.validate()?;
        Ok(Self { primitives, config })
    }

    /// Activate a node; `Ok(false)` when it left the tree
    fn press(&self, ctx: &ExecCtx, node: NodeId) -> Result<bool, Halt> {
        match self.primitives.activate(ctx, node) {
            Ok(()) => Ok(true),
            Err(ActionError::Detached(_)) => Ok(false),
            Err(err) => Err(escalate(err)),
        }
    }

    /// First option in `overlay` whose trimmed text equals `label`
    fn select_option(
        &self,
        locator: &dyn NodeLocator,
        overlay: NodeId,
        label: &str,
    ) -> Result<Option<NodeId>, LocatorError> {
        let candidates = locator.find(
            overlay,
            &NodePredicate::Structural(self.config.options.clone()),
        )?;
        for &candidate in &candidates {
            if locator.text(candidate)?.as_deref() == Some(label) {
                return Ok(Some(candidate));
            }
        }
        debug!(candidates = candidates.len(), label, "No option carries the label");
        Ok(None)
    }

    async fn execute_target(
        &self,
        ctx: &ExecCtx,
        index: usize,
        trigger: NodeId,
        label: &str,
    ) -> Result<Step, Halt> {
        let locator = self.primitives.locator();
        let document = self.primitives.document();
        let container = &self.config.container;
        let timeout = self.config.overlay_timeout();
        let mut phase = TargetPhase::Idle;
        trace!(index, %phase, "Target started");

        // A previous overlay that never closed stays in the tree; the new one
        // must then be told apart from it.
        let mut stale = None;
        if self.config.guard_stale_overlay {
            if let Some(open) = locator.resolve(document, container)? {
                debug!(index, node = %open, "Previous overlay still open, waiting for it to close");
                match self
                    .primitives
                    .wait_for_absence(ctx, document, container, timeout)
                    .await
                {
                    Ok(_) => {}
                    Err(ActionError::Timeout { timeout_ms }) => {
                        warn!(
                            index,
                            node = %open,
                            timeout_ms,
                            "Previous overlay never closed, ignoring it"
                        );
                        stale = Some(open);
                    }
                    Err(err) => return Err(escalate(err)),
                }
            }
        }

        if !self.press(ctx, trigger)? {
            warn!(index, node = %trigger, "Trigger detached before its turn");
            return Ok(Step::unconfirmed(TargetOutcome::failed(
                index,
                trigger,
                TargetError::TriggerDetached,
            )));
        }
        phase = TargetPhase::Triggered;
        trace!(index, %phase);

        phase = TargetPhase::AwaitingOverlay;
        trace!(index, %phase);
        let waited = match stale {
            Some(stale) => {
                self.primitives
                    .wait_for_replacement(ctx, document, container, stale, timeout)
                    .await
            }
            None => {
                self.primitives
                    .wait_for_element(ctx, document, container, timeout)
                    .await
            }
        };
        let overlay = match waited {
            Ok(waited) => {
                debug!(
                    index,
                    resolution = ?waited.resolution,
                    batches = waited.batches,
                    elapsed_ms = waited.elapsed.as_millis() as u64,
                    "Overlay ready"
                );
                waited.into_value()
            }
            Err(ActionError::Timeout { timeout_ms }) => {
                warn!(index, timeout_ms, "Overlay never became ready");
                let error = match stale {
                    Some(_) => TargetError::StaleOverlay { timeout_ms },
                    None => TargetError::OverlayTimeout { timeout_ms },
                };
                return Ok(Step::unconfirmed(TargetOutcome::failed(index, trigger, error)));
            }
            Err(err) => return Err(escalate(err)),
        };

        phase = TargetPhase::Selecting;
        trace!(index, %phase);
        let option = self.select_option(locator.as_ref(), overlay, label)?;
        if let Some(option) = option {
            if !self.press(ctx, option)? {
                return Ok(Step::unconfirmed(TargetOutcome::failed(
                    index,
                    trigger,
                    TargetError::ControlDetached,
                )));
            }
        }

        phase = TargetPhase::Confirming;
        trace!(index, %phase);
        let not_found = || TargetError::LabelNotFound {
            label: label.to_string(),
        };
        let Some(confirm) = locator.resolve(overlay, &self.config.confirm)? else {
            let outcome = match option {
                Some(_) => TargetOutcome::failed(index, trigger, TargetError::ConfirmControlMissing),
                None => {
                    warn!(index, "Overlay has neither the label nor a confirm control");
                    TargetOutcome::skipped(index, trigger, not_found())
                }
            };
            return Ok(Step::unconfirmed(outcome));
        };

        if !self.press(ctx, confirm)? {
            return Ok(Step::unconfirmed(TargetOutcome::failed(
                index,
                trigger,
                TargetError::ControlDetached,
            )));
        }

        let outcome = match option {
            Some(_) => TargetOutcome::settled(index, trigger),
            None => TargetOutcome::skipped(index, trigger, not_found()),
        };
        Ok(Step {
            outcome,
            confirmed: true,
        })
    }
}

#[async_trait]
impl Sequencer for ActionSequencer {
    async fn run(
        &self,
        triggers: &[NodeId],
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, FlowError> {
        info!(targets = triggers.len(), label, "Starting run");
        let mut summary = RunSummary::new(Some(label.to_string()));
        let mut cancelled = false;

        for (index, &trigger) in triggers.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let ctx = ExecCtx::new(format!("target-{}", index), cancel.child_token());
            let started = Instant::now();

            let step = match self.execute_target(&ctx, index, trigger, label).await {
                Ok(step) => step,
                Err(Halt::Cancelled) => {
                    info!(index, "Run cancelled mid-target");
                    cancelled = true;
                    break;
                }
                Err(Halt::Fatal(err)) => {
                    warn!(index, completed = summary.total(), error = %err, "Run aborted");
                    return Err(err);
                }
            };

            let outcome = step.outcome.with_latency(started.elapsed());
            info!(
                index,
                node = %trigger,
                state = ?outcome.state,
                error = ?outcome.error,
                latency_ms = outcome.latency_ms,
                "Target finished"
            );
            summary.record(outcome);

            if step.confirmed
                && self
                    .primitives
                    .pause(&ctx, self.config.settle_delay())
                    .await
                    .is_err()
            {
                info!(index, "Run cancelled while settling");
                cancelled = true;
                break;
            }
        }

        summary.finish(cancelled);
        info!(summary = %summary, "Run finished");
        Ok(summary)
    }

    fn config(&self) -> &SequencerConfig {
        &self.config
    }
}
