//! Configuration types for controlling search, shrinking and stateful runs.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::database::ExampleDatabase;

/// Hard upper bound on the number of steps in a single stateful run
pub const MAX_STEP_COUNT: usize = 1_000_000;

/// Multiplier applied to the default step count to reject implausible data
pub const IMPLAUSIBILITY_FACTOR: usize = 1000;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// Invalid number of examples (must be > 0)
    #[error("Invalid max_examples: {0} (must be > 0)")]
    InvalidMaxExamples(usize),
    /// Iteration budget smaller than the example budget
    #[error("Invalid max_iterations: {iterations} (must be >= max_examples = {examples})")]
    InvalidMaxIterations { iterations: usize, examples: usize },
    /// Invalid timeout (must be > 0)
    #[error("Invalid timeout (must be > 0)")]
    InvalidTimeout,
    /// Step count outside `0..=MAX_STEP_COUNT`
    #[error("Invalid stateful_step_count: {0} (must be <= {MAX_STEP_COUNT})")]
    InvalidStepCount(usize),
}

/// How much the engine reports while searching
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

/// Settings for a search
#[derive(Debug, Clone)]
pub struct Settings {
    /// Number of satisfying examples to try before giving up
    pub max_examples: usize,
    /// Total draws allowed, including ones rejected as inapplicable
    pub max_iterations: usize,
    /// Maximum number of accepted shrinks
    pub max_shrinks: usize,
    /// Wall-clock budget for a whole search, checked between candidates
    pub timeout: Duration,
    /// Optional seed for reproducible searches
    pub seed: Option<u64>,
    /// Number of steps to run a stateful program for before giving up on it breaking
    pub stateful_step_count: usize,
    /// Reporting level
    pub verbosity: Verbosity,
    /// Where minimal examples are saved and replayed from
    pub database: Option<Arc<dyn ExampleDatabase>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_examples: 200,
            max_iterations: 1000,
            max_shrinks: 500,
            timeout: Duration::from_secs(60),
            seed: None,
            stateful_step_count: 50,
            verbosity: Verbosity::Normal,
            database: None,
        }
    }
}

impl Settings {
    /// Validate the settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_examples == 0 {
            return Err(SettingsError::InvalidMaxExamples(self.max_examples));
        }
        if self.max_iterations < self.max_examples {
            return Err(SettingsError::InvalidMaxIterations {
                iterations: self.max_iterations,
                examples: self.max_examples,
            });
        }
        if self.timeout.is_zero() {
            return Err(SettingsError::InvalidTimeout);
        }
        if self.stateful_step_count > MAX_STEP_COUNT {
            return Err(SettingsError::InvalidStepCount(self.stateful_step_count));
        }
        Ok(())
    }

    /// Set the number of examples
    pub fn with_max_examples(mut self, max_examples: usize) -> Self {
        self.max_examples = max_examples;
        self.max_iterations = self.max_iterations.max(max_examples);
        self
    }

    /// Set the number of accepted shrinks
    pub fn with_max_shrinks(mut self, max_shrinks: usize) -> Self {
        self.max_shrinks = max_shrinks;
        self
    }

    /// Set the search timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fix the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the stateful run length
    pub fn with_step_count(mut self, steps: usize) -> Self {
        self.stateful_step_count = steps;
        self
    }

    /// Set the verbosity
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Attach an example database
    pub fn with_database(mut self, database: Arc<dyn ExampleDatabase>) -> Self {
        self.database = Some(database);
        self
    }

    /// Largest step count accepted when reading persisted runs
    pub fn implausible_step_count(&self) -> usize {
        self.stateful_step_count
            .saturating_mul(IMPLAUSIBILITY_FACTOR)
            .min(MAX_STEP_COUNT)
    }
}

thread_local! {
    static DEFAULT_SETTINGS: RefCell<Settings> = RefCell::new(Settings::default());
}

/// Current default settings for this thread
pub fn default_settings() -> Settings {
    DEFAULT_SETTINGS.with(|settings| settings.borrow().clone())
}

/// Replace the default settings for this thread
pub fn set_default_settings(settings: Settings) -> Result<(), SettingsError> {
    settings.validate()?;
    DEFAULT_SETTINGS.with(|current| *current.borrow_mut() = settings);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_examples, 200);
        assert_eq!(settings.max_shrinks, 500);
        assert_eq!(settings.stateful_step_count, 50);
        assert_eq!(settings.verbosity, Verbosity::Normal);
        assert!(settings.seed.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let settings = Settings {
            max_examples: 0,
            ..Settings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidMaxExamples(0))
        );

        let settings = Settings::default().with_timeout(Duration::ZERO);
        assert_eq!(settings.validate(), Err(SettingsError::InvalidTimeout));

        let settings = Settings::default().with_step_count(MAX_STEP_COUNT + 1);
        assert_eq!(
            settings.validate(),
            Err(SettingsError::InvalidStepCount(MAX_STEP_COUNT + 1))
        );

        let settings = Settings {
            max_iterations: 10,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidMaxIterations { .. })
        ));
    }

    #[test]
    fn test_implausible_step_count() {
        assert_eq!(Settings::default().implausible_step_count(), 50_000);
        let huge = Settings::default().with_step_count(5_000);
        assert_eq!(huge.implausible_step_count(), MAX_STEP_COUNT);
    }

    #[test]
    fn test_thread_defaults() {
        let original = default_settings();
        set_default_settings(Settings::default().with_step_count(7)).unwrap();
        assert_eq!(default_settings().stateful_step_count, 7);

        assert!(set_default_settings(Settings::default().with_max_examples(0)).is_err());
        assert_eq!(default_settings().stateful_step_count, 7);

        set_default_settings(original).unwrap();
    }
}
