//! Error types shared by strategies, the search driver and stateful runners.

use thiserror::Error;

use crate::config::SettingsError;

/// Structural mismatch between canonical data and the strategy asked to read it.
///
/// Never fatal: callers fall back to fresh generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad data: {0}")]
pub struct BadData(pub String);

impl BadData {
    /// Create a bad data error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Comprehensive error type for searching, replaying and shrinking
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuarryError {
    /// The system under test is defined in a way that can never make progress
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// A drawn value turned out to be inapplicable; the candidate does not count
    #[error("Unsatisfied assumption: {0}")]
    UnsatisfiedAssumption(String),

    /// Every candidate drawn was rejected as inapplicable
    #[error("Unable to satisfy assumptions after {examples} examples")]
    Unsatisfiable { examples: usize },

    /// The search finished without any candidate matching the condition
    #[error("No examples found satisfying the condition after {examples} examples")]
    NoSuchExample { examples: usize },

    /// Behavioral failure of the system under test
    #[error("Failed: {0}")]
    Failed(String),

    /// A failure reproduced during search but not on confirmation
    #[error("Flaky: {0}")]
    Flaky(String),

    /// Malformed canonical data
    #[error(transparent)]
    BadData(#[from] BadData),

    /// Invalid settings
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl QuarryError {
    /// Create an invalid definition error
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition(message.into())
    }

    /// Create a behavioral failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Create an unsatisfied assumption error
    pub fn unsatisfied(message: impl Into<String>) -> Self {
        Self::UnsatisfiedAssumption(message.into())
    }

    /// Whether this error, raised while running a system, is a failure of
    /// that system rather than a problem with how it was defined or configured
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            QuarryError::InvalidDefinition(_)
                | QuarryError::UnsatisfiedAssumption(_)
                | QuarryError::Settings(_)
        )
    }
}

/// Reject the current candidate unless `condition` holds.
///
/// Returned as an error so operations can `?` it; the search driver skips
/// the candidate rather than counting it as a failure.
pub fn assume(condition: bool) -> Result<(), QuarryError> {
    if condition {
        Ok(())
    } else {
        Err(QuarryError::unsatisfied("assume(false)"))
    }
}
