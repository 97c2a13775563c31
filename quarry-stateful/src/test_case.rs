//! One cached, zero-argument failing test per machine type.

use std::fmt;
use std::marker::PhantomData;

use quarry::{QuarryError, verbose_report, with_verbosity};

use crate::machine::{GenericStateMachine, replay_on_fresh, short_type_name};
use crate::registry;

/// Message carried by [`QuarryError::Flaky`] when confirmation passes
pub const FLAKY_MESSAGE: &str = "Run failed initially but succeeded on a second try";

/// The test for machine type `M`
pub struct StateMachineTestCase<M> {
    name: String,
    _machine: PhantomData<fn() -> M>,
}

impl<M: GenericStateMachine> StateMachineTestCase<M> {
    fn new() -> Self {
        Self {
            name: format!("{}.TestCase", short_type_name::<M>()),
            _machine: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Search for a breaking run and confirm it.
    ///
    /// Passes when no breaking run is found. Otherwise the run is replayed
    /// on a fresh machine with every step reported, and its failure is
    /// returned. A run that no longer fails is reported as
    /// [`QuarryError::Flaky`].
    pub fn run(&self) -> Result<(), QuarryError> {
        let breaker = match M::find_breaking_runner() {
            Ok(breaker) => breaker,
            Err(QuarryError::NoSuchExample { .. }) => return Ok(()),
            Err(error) => return Err(error),
        };
        tracing::debug!(test = %self.name, runner = %breaker, "confirming breaking run");

        with_verbosity(M::settings().verbosity, || {
            match replay_on_fresh::<M>(&breaker, true) {
                Err(error) => {
                    verbose_report(|| format!("{} reproduced: {}", breaker, error));
                    Err(error)
                }
                Ok(()) => Err(QuarryError::Flaky(FLAKY_MESSAGE.to_string())),
            }
        })
    }
}

impl<M> fmt::Debug for StateMachineTestCase<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineTestCase")
            .field("name", &self.name)
            .finish()
    }
}

/// The test case for `M`, built once per process
pub fn test_case<M: GenericStateMachine>() -> &'static StateMachineTestCase<M> {
    registry::cached::<M, StateMachineTestCase<M>>(StateMachineTestCase::new)
}
