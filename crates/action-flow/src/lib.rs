//! Action sequencing layer
//!
//! Drives a snapshot of trigger nodes one at a time through
//! trigger, overlay wait, label selection and confirmation, and records an
//! outcome per target. Also hosts the plain activation sweep.

pub mod errors;
pub mod executor;
pub mod sweep;
pub mod types;

pub use errors::{ErrorSeverity, FlowError, TargetError};
pub use executor::{ActionSequencer, Sequencer};
pub use sweep::ActivationSweep;
pub use types::{RunSummary, SequencerConfig, TargetOutcome, TargetPhase, TargetState};
