//! Action primitives - the await points of a sequenced run
//!
//! This crate provides the building blocks the sequencer composes:
//! - `activate`: simulate a user trigger on a node
//! - `wait_for`: mutation-driven wait for a readiness check, with an
//!   immediate pre-check, a resolved-once guard, a timeout and cooperative
//!   cancellation
//! - `pause`: cancellable settle delay
//! - checks over locator queries (element present / element gone)

pub mod errors;
mod locator;
mod primitives;
pub mod types;
mod waiting;

pub use errors::*;
pub use locator::*;
pub use primitives::*;
pub use types::*;
pub use waiting::*;
