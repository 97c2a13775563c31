//! The contract every explorable system implements.

use std::fmt::Debug;
use std::panic;

use quarry::{
    BoxedStrategy, QuarryError, Settings, Verbosity, current_verbosity, default_settings, find,
    report, verbose_report, with_verbosity,
};

use crate::runner::{StateMachineRunner, StateMachineSearchStrategy, panic_message};

/// A system explored one step at a time.
///
/// Each run builds a fresh instance with [`create`](Self::create), then
/// repeatedly asks it for a strategy over its next step and executes a step
/// drawn from it. Any error other than an invalid definition or unsatisfied
/// assumption, or any panic, counts as the failure being searched for. This
/// includes errors and panics from `create`.
pub trait GenericStateMachine: Sized + 'static {
    /// A single operation on the system
    type Step: Debug + 'static;

    /// Build a fresh instance for one run
    fn create() -> Result<Self, QuarryError>;

    /// Strategy for the next step. Queried before every step, so it may
    /// depend on everything executed so far.
    fn steps(&self) -> Result<BoxedStrategy<Self::Step>, QuarryError>;

    /// Execute one step
    fn execute_step(&mut self, step: Self::Step) -> Result<(), QuarryError>;

    /// Report `step`, numbered from 1, just before it executes
    fn print_step(&self, step_number: usize, step: &Self::Step) {
        report(&format!("Step #{}: {:?}", step_number, step));
    }

    /// Called exactly once at the end of every run, however it ended
    fn teardown(&mut self) {}

    /// Settings used when searching this machine
    fn settings() -> Settings {
        default_settings()
    }

    /// Search for a run that breaks this machine and shrink it.
    ///
    /// Returns `NoSuchExample` when no breaking run was found.
    fn find_breaking_runner() -> Result<StateMachineRunner, QuarryError> {
        let settings = Self::settings();
        settings.validate()?;
        let strategy = StateMachineSearchStrategy::new(
            std::any::type_name::<Self>(),
            settings.stateful_step_count,
        );

        with_verbosity(settings.verbosity, || {
            let print_steps = current_verbosity() >= Verbosity::Debug;
            find(
                &strategy,
                |runner: &StateMachineRunner| is_breaking_run::<Self>(runner, print_steps),
                &settings,
            )
        })
    }
}

/// Build a fresh `M` and replay `runner` on it.
///
/// Construction is part of the run: a panic in `create` is a failure.
pub(crate) fn replay_on_fresh<M: GenericStateMachine>(
    runner: &StateMachineRunner,
    print_steps: bool,
) -> Result<(), QuarryError> {
    match panic::catch_unwind(M::create) {
        Ok(machine) => runner.run(&mut machine?, print_steps),
        Err(payload) => Err(QuarryError::failed(panic_message(payload.as_ref()))),
    }
}

/// Replay `runner` on a fresh machine, reporting whether it failed
fn is_breaking_run<M: GenericStateMachine>(
    runner: &StateMachineRunner,
    print_steps: bool,
) -> Result<bool, QuarryError> {
    match replay_on_fresh::<M>(runner, print_steps) {
        Ok(()) => Ok(false),
        Err(error) if error.is_failure() => {
            tracing::debug!(%error, runner = %runner, "run broke the machine");
            verbose_report(|| format!("{} failed: {}", runner, error));
            Ok(true)
        }
        Err(error) => Err(error),
    }
}

/// `type_name` of `T` with module paths stripped from every segment
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut short = String::with_capacity(full.len());
    for token in full.split_inclusive(|c: char| "<>,;&()[] ".contains(c)) {
        let (path, delimiter) = match token.char_indices().last() {
            Some((at, c)) if "<>,;&()[] ".contains(c) => token.split_at(at),
            _ => (token, ""),
        };
        short.push_str(path.rsplit("::").next().unwrap_or(path));
        short.push_str(delimiter);
    }
    short
}
