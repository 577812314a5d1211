//! Shelver
//!
//! Saves every search result on a page into a labelled library by driving the
//! host's save dialog one result at a time, and removes entries with the
//! matching delete sweep. The host tree is anything implementing
//! [`TreeHost`]; `shelver-tree-memory` provides an in-memory one.

pub mod config;
pub mod telemetry;

pub use action_flow::{
    ActionSequencer, ActivationSweep, FlowError, RunSummary, Sequencer, SequencerConfig,
    TargetError, TargetOutcome, TargetState,
};
pub use config::{LoggingConfig, ShelverConfig};
pub use shelver_core_types::{HostError, NodeId, TreeHost};
pub use telemetry::init_tracing;

use action_locator::NodePredicate;
use action_primitives::{ActionPrimitives, DefaultActionPrimitives};
use anyhow::{Context, Result};
use shelver_core_types::Selector;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Apply `label` to every save trigger currently on the page
pub async fn save_to_library(
    host: Arc<dyn TreeHost>,
    config: &ShelverConfig,
    label: &str,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;
    let primitives = Arc::new(DefaultActionPrimitives::new(host));
    let triggers = snapshot(primitives.as_ref(), &config.selectors.trigger)?;
    info!(triggers = triggers.len(), label, "Saving results to library");

    let sequencer = ActionSequencer::new(primitives, config.sequencer_config())?;
    let summary = sequencer.run(&triggers, label, cancel).await?;
    info!(summary = %summary, "Save finished");
    Ok(summary)
}

/// Activate every delete trigger currently on the page
pub async fn sweep(
    host: Arc<dyn TreeHost>,
    config: &ShelverConfig,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;
    let primitives = Arc::new(DefaultActionPrimitives::new(host));
    let targets = snapshot(primitives.as_ref(), &config.sweep.trigger)?;
    info!(targets = targets.len(), "Sweeping");

    let summary = ActivationSweep::new(primitives, config.sweep.delay())
        .run(&targets, cancel)
        .await?;
    Ok(summary)
}

/// Matching nodes under the document root, taken once per run
fn snapshot(primitives: &dyn ActionPrimitives, selector: &Selector) -> Result<Vec<NodeId>> {
    primitives
        .locator()
        .find(
            primitives.document(),
            &NodePredicate::Structural(selector.clone()),
        )
        .with_context(|| format!("Failed to snapshot {}", selector))
}
