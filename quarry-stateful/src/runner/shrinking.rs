//! Shrink moves over run records.
//!
//! Every move builds new runners with their own records; none mutate the
//! runner they were given. Moves may be applied to runners other than the
//! one they were built for.

use std::iter;

use quarry::{Basic, Simplifier, Simplify};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use super::{RecordEntry, StateMachineRunner, StepRecord};

/// Tunables for the discard moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscardConfig {
    /// Live entries required before bulk discards are tried
    pub min_live: usize,
    /// Number of escalating discard probabilities
    pub levels: usize,
    /// Random maskings tried per level
    pub trials: usize,
    /// Maximum single-index discards per pass
    pub single_deletes: usize,
}

impl Default for DiscardConfig {
    fn default() -> Self {
        Self {
            min_live: 10,
            levels: 7,
            trials: 10,
            single_deletes: 10,
        }
    }
}

/// Shorten the run, or skip a prefix of it
pub(crate) struct CutSteps;

impl Simplify<StateMachineRunner> for CutSteps {
    fn name(&self) -> String {
        "cut_steps".to_string()
    }

    fn simplify<'a>(
        &'a self,
        _rng: &'a mut dyn RngCore,
        runner: &StateMachineRunner,
    ) -> Box<dyn Iterator<Item = StateMachineRunner> + 'a> {
        let entries = runner.entries();
        let n_steps = runner.n_steps();
        let mut candidates = Vec::new();

        if entries.len() < n_steps {
            candidates.push(runner.derive(entries.len(), entries.clone()));
        }

        let mut mid = 0;
        loop {
            let next_mid = (n_steps + mid) / 2;
            if next_mid == mid {
                break;
            }
            mid = next_mid;
            candidates.push(runner.derive(mid, entries.clone()));

            let mut skipped = entries.clone();
            let prefix = mid.min(skipped.len());
            skipped[..prefix].fill(None);
            candidates.push(runner.derive(n_steps, skipped));
        }

        Box::new(candidates.into_iter())
    }
}

/// Tombstone random subsets of live entries with rising probability
pub(crate) struct RandomDiscards {
    pub(crate) config: DiscardConfig,
}

impl Simplify<StateMachineRunner> for RandomDiscards {
    fn name(&self) -> String {
        "random_discards".to_string()
    }

    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        runner: &StateMachineRunner,
    ) -> Box<dyn Iterator<Item = StateMachineRunner> + 'a> {
        let entries = runner.entries();
        let live = entries.iter().filter(|entry| entry.is_some()).count();
        if live < self.config.min_live {
            return Box::new(iter::empty());
        }

        let runner = runner.clone();
        let DiscardConfig { levels, trials, .. } = self.config;
        let mut attempts = (1..=levels).flat_map(move |level| iter::repeat_n(level, trials));

        Box::new(iter::from_fn(move || {
            let level = attempts.next()?;
            let masked: Vec<RecordEntry> = entries
                .iter()
                .map(|entry| match entry {
                    Some(_) if rng.gen_range(0..=9) <= level => None,
                    other => other.clone(),
                })
                .collect();
            Some(runner.derive(runner.n_steps(), masked))
        }))
    }
}

/// Tombstone single live entries, visited in random order
pub(crate) struct DeleteElements {
    pub(crate) limit: usize,
}

impl Simplify<StateMachineRunner> for DeleteElements {
    fn name(&self) -> String {
        "delete_elements".to_string()
    }

    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        runner: &StateMachineRunner,
    ) -> Box<dyn Iterator<Item = StateMachineRunner> + 'a> {
        let entries = runner.entries();
        let mut indices: Vec<usize> = (0..entries.len()).collect();
        indices.shuffle(rng);

        let candidates: Vec<StateMachineRunner> = indices
            .into_iter()
            .filter(|&index| entries[index].is_some())
            .take(self.limit)
            .map(|index| {
                let mut record = entries.clone();
                record[index] = None;
                runner.derive(runner.n_steps(), record)
            })
            .collect();
        Box::new(candidates.into_iter())
    }
}

/// Applies a move of one step's own strategy to that step's recorded data
pub(crate) struct ConvertedSimplifier {
    pub(crate) index: usize,
    pub(crate) inner: Simplifier<Basic>,
}

impl Simplify<StateMachineRunner> for ConvertedSimplifier {
    fn name(&self) -> String {
        format!("step {}: {}", self.index, self.inner.name())
    }

    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        runner: &StateMachineRunner,
    ) -> Box<dyn Iterator<Item = StateMachineRunner> + 'a> {
        let entries = runner.entries();
        let Some(Some(StepRecord { strategy, data })) = entries.get(self.index).cloned() else {
            return Box::new(iter::empty());
        };

        let runner = runner.clone();
        let index = self.index;
        Box::new(self.inner.simplify(rng, &data).map(move |simpler| {
            let mut record = entries.clone();
            record[index] = Some(StepRecord {
                strategy: strategy.clone(),
                data: simpler,
            });
            runner.derive(runner.n_steps(), record)
        }))
    }
}
