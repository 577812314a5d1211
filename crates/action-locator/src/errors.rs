//! Error types for the locator

use shelver_core_types::{HostError, SelectorError};
use thiserror::Error;

/// Locator error enumeration
///
/// "Nothing matched" is never an error; lookups return an empty result for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// The tree host cannot answer queries at all
    #[error("Tree host unavailable: {0}")]
    HostUnavailable(String),

    /// Selector text could not be parsed
    #[error("Invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::HostUnavailable(_) => 3,
            LocatorError::InvalidSelector(_) => 2,
        }
    }
}

/// Detached nodes count as "no match"; anything else is a real failure.
pub(crate) fn absorb_detached(err: HostError) -> Result<(), LocatorError> {
    match err {
        HostError::Detached(_) => Ok(()),
        HostError::Unavailable(reason) => Err(LocatorError::HostUnavailable(reason)),
    }
}
