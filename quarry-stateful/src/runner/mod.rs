//! The run record: a seeded, replayable script of steps.
//!
//! A [`StateMachineRunner`] is what the search driver generates and shrinks.
//! It holds two seeds, a step count and a record of what each step index
//! produced. Replaying it against a fresh machine reproduces the same steps,
//! as long as the machine itself is deterministic.

mod shrinking;
mod strategy;

pub use shrinking::DiscardConfig;
pub use strategy::StateMachineSearchStrategy;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use quarry::rng::{next_seed, seeded_rng};
use quarry::{Basic, BasicStrategy, QuarryError};

use crate::machine::GenericStateMachine;

/// What one step index produced: the strategy that drew it, if known, and
/// its canonical data
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub strategy: Option<Arc<dyn BasicStrategy>>,
    pub data: Basic,
}

/// One record slot. `None` is a tombstone: the index is skipped, but keeps
/// its position so later indices keep their seeds.
pub type RecordEntry = Option<StepRecord>;

/// Derive `n` per-index template seeds from `starting`.
///
/// The sequence for a smaller `n` is always a prefix of the one for a larger
/// `n`.
pub fn seeds(starting: u64, n: usize) -> Vec<u64> {
    let mut rng = seeded_rng(starting);
    (0..n).map(|_| next_seed(&mut rng)).collect()
}

/// A seeded, partially replayable run of a state machine
#[derive(Clone)]
pub struct StateMachineRunner {
    parameter_seed: u64,
    template_seed: u64,
    n_steps: usize,
    templates: Rc<[u64]>,
    // Shared with clones: replaying a clone fills in the original's record
    record: Rc<RefCell<Vec<RecordEntry>>>,
}

impl StateMachineRunner {
    /// A runner with an empty record: every step is drawn fresh
    pub fn new(parameter_seed: u64, template_seed: u64, n_steps: usize) -> Self {
        Self::with_entries(parameter_seed, template_seed, n_steps, Vec::new())
    }

    pub(crate) fn with_entries(
        parameter_seed: u64,
        template_seed: u64,
        n_steps: usize,
        record: Vec<RecordEntry>,
    ) -> Self {
        Self {
            parameter_seed,
            template_seed,
            n_steps,
            templates: seeds(template_seed, n_steps).into(),
            record: Rc::new(RefCell::new(record)),
        }
    }

    /// A new runner with the same seeds, `n_steps` and its own copy of `record`
    pub(crate) fn derive(&self, n_steps: usize, record: Vec<RecordEntry>) -> Self {
        let templates = if n_steps <= self.templates.len() {
            self.templates.clone()
        } else {
            seeds(self.template_seed, n_steps).into()
        };
        Self {
            parameter_seed: self.parameter_seed,
            template_seed: self.template_seed,
            n_steps,
            templates,
            record: Rc::new(RefCell::new(record)),
        }
    }

    pub fn parameter_seed(&self) -> u64 {
        self.parameter_seed
    }

    pub fn template_seed(&self) -> u64 {
        self.template_seed
    }

    /// Number of step indices this run visits
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// Template seed for each step index
    pub fn templates(&self) -> &[u64] {
        &self.templates
    }

    /// A copy of the current record
    pub fn entries(&self) -> Vec<RecordEntry> {
        self.record.borrow().clone()
    }

    /// Canonical data of every record slot, `None` for tombstones
    pub fn recorded_steps(&self) -> Vec<Option<Basic>> {
        self.record
            .borrow()
            .iter()
            .map(|entry| entry.as_ref().map(|step| step.data.clone()))
            .collect()
    }

    /// Length of the record, which may differ from `n_steps`
    pub fn record_len(&self) -> usize {
        self.record.borrow().len()
    }

    /// Non-tombstone slots among the first `n_steps`
    pub fn live_steps(&self) -> usize {
        self.record
            .borrow()
            .iter()
            .take(self.n_steps)
            .filter(|entry| entry.is_some())
            .count()
    }

    /// Replay this run against `machine`.
    ///
    /// Recorded steps are replayed when the machine's current strategy still
    /// accepts them; anything else is drawn fresh from this run's seeds and
    /// written back into the record. `teardown` runs exactly once whatever
    /// happens, and a panic escaping a step becomes [`QuarryError::Failed`].
    pub fn run<M: GenericStateMachine>(
        &self,
        machine: &mut M,
        print_steps: bool,
    ) -> Result<(), QuarryError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_steps(machine, print_steps)));
        machine.teardown();
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(QuarryError::failed(panic_message(payload.as_ref()))),
        }
    }

    fn run_steps<M: GenericStateMachine>(
        &self,
        machine: &mut M,
        print_steps: bool,
    ) -> Result<(), QuarryError> {
        let mut executed = 0;
        for index in 0..self.n_steps {
            let strategy = machine.steps()?;

            let stored = self.record.borrow().get(index).cloned();
            let replayed = match stored {
                Some(None) => continue,
                Some(Some(entry)) => match strategy.reify_basic(&entry.data) {
                    Ok(step) => Some((entry.data, step)),
                    Err(error) => {
                        tracing::trace!(index, %error, "recorded step no longer valid, drawing fresh");
                        None
                    }
                },
                None => None,
            };
            let (data, step) = match replayed {
                Some(replayed) => replayed,
                None => strategy.draw(
                    &mut seeded_rng(self.parameter_seed),
                    &mut seeded_rng(self.templates[index]),
                ),
            };

            self.persist(
                index,
                StepRecord {
                    strategy: Some(strategy.as_basic()),
                    data,
                },
            );

            executed += 1;
            if print_steps {
                machine.print_step(executed, &step);
            }
            machine.execute_step(step)?;
        }
        Ok(())
    }

    /// Overwrite slot `index`, or append when it is the next slot
    fn persist(&self, index: usize, entry: StepRecord) {
        let mut record = self.record.borrow_mut();
        match record.get_mut(index) {
            Some(slot) => *slot = Some(entry),
            None => record.push(Some(entry)),
        }
    }
}

impl fmt::Display for StateMachineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateMachineRunner({}/{} steps)",
            self.live_steps(),
            self.n_steps
        )
    }
}

impl fmt::Debug for StateMachineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineRunner")
            .field("parameter_seed", &self.parameter_seed)
            .field("template_seed", &self.template_seed)
            .field("n_steps", &self.n_steps)
            .field("record", &self.recorded_steps())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}
