//! Run records as a search strategy.

use std::rc::Rc;

use quarry::basic::{check_integer, check_length, check_list, check_u64};
use quarry::{BadData, Basic, SearchStrategy, Simplifier, default_settings};
use rand::RngCore;

use super::shrinking::{ConvertedSimplifier, CutSteps, DeleteElements, RandomDiscards};
use super::{DiscardConfig, RecordEntry, StateMachineRunner, StepRecord};

/// Strategy whose templates and values are [`StateMachineRunner`]s
///
/// Serialized form: `[parameter_seed, template_seed, n_steps, steps]`, where
/// each element of `steps` is `null` for a tombstone or a one-element list
/// wrapping that step's own data.
#[derive(Debug, Clone)]
pub struct StateMachineSearchStrategy {
    machine: &'static str,
    program_size: usize,
    discard: DiscardConfig,
}

impl StateMachineSearchStrategy {
    /// Strategy for runs of `program_size` steps against the machine named `machine`
    pub fn new(machine: &'static str, program_size: usize) -> Self {
        Self {
            machine,
            program_size,
            discard: DiscardConfig::default(),
        }
    }

    pub fn with_discard_config(mut self, discard: DiscardConfig) -> Self {
        self.discard = discard;
        self
    }
}

impl SearchStrategy for StateMachineSearchStrategy {
    type Parameter = u64;
    type Template = StateMachineRunner;
    type Value = StateMachineRunner;

    fn draw_parameter(&self, rng: &mut dyn RngCore) -> u64 {
        rng.next_u64()
    }

    fn draw_template(&self, rng: &mut dyn RngCore, parameter: &u64) -> StateMachineRunner {
        StateMachineRunner::new(*parameter, rng.next_u64(), self.program_size)
    }

    fn reify(&self, template: &StateMachineRunner) -> StateMachineRunner {
        template.clone()
    }

    fn to_basic(&self, template: &StateMachineRunner) -> Basic {
        let steps = template
            .recorded_steps()
            .into_iter()
            .map(|entry| match entry {
                Some(data) => Basic::Array(vec![data]),
                None => Basic::Null,
            })
            .collect();
        Basic::Array(vec![
            Basic::from(template.parameter_seed()),
            Basic::from(template.template_seed()),
            Basic::from(template.n_steps()),
            Basic::Array(steps),
        ])
    }

    fn from_basic(&self, data: &Basic) -> Result<StateMachineRunner, BadData> {
        let fields = check_length(4, data)?;
        let parameter_seed = check_u64(&fields[0])?;
        let template_seed = check_u64(&fields[1])?;
        let n_steps = check_integer(&fields[2])?;
        let steps = check_list(&fields[3])?;

        if n_steps < 0 {
            return Err(BadData::new(format!(
                "Invalid negative number of steps: {}",
                n_steps
            )));
        }
        let ceiling = default_settings().implausible_step_count();
        let n_steps = match usize::try_from(n_steps) {
            Ok(n) if n <= ceiling => n,
            _ => {
                return Err(BadData::new(format!(
                    "Implausibly large number of steps: {}",
                    n_steps
                )));
            }
        };

        let record = steps
            .iter()
            .map(|step| -> Result<RecordEntry, BadData> {
                if step.is_null() {
                    return Ok(None);
                }
                let wrapped = check_length(1, step)?;
                Ok(Some(StepRecord {
                    strategy: None,
                    data: wrapped[0].clone(),
                }))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StateMachineRunner::with_entries(
            parameter_seed,
            template_seed,
            n_steps,
            record,
        ))
    }

    fn simplifiers(
        &self,
        rng: &mut dyn RngCore,
        template: &StateMachineRunner,
    ) -> Vec<Simplifier<StateMachineRunner>> {
        let mut simplifiers: Vec<Simplifier<StateMachineRunner>> = vec![
            Rc::new(CutSteps),
            Rc::new(RandomDiscards {
                config: self.discard,
            }),
            Rc::new(DeleteElements {
                limit: self.discard.single_deletes,
            }),
        ];

        for (index, entry) in template.entries().into_iter().enumerate() {
            let Some(StepRecord {
                strategy: Some(strategy),
                data,
            }) = entry
            else {
                continue;
            };
            for inner in strategy.basic_simplifiers(rng, &data) {
                simplifiers.push(Rc::new(ConvertedSimplifier { index, inner }));
            }
        }

        tracing::trace!(
            machine = self.machine,
            count = simplifiers.len(),
            "enumerated run simplifiers"
        );
        simplifiers
    }
}
