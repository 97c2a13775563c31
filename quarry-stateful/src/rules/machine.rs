//! Rule-based machines: the explorable-system contract built from rules.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::rc::Rc;

use quarry::basic::{check_length, check_list, check_u64};
use quarry::primitives::shrink_index;
use quarry::rng::seeded_rng;
use quarry::{
    BadData, Basic, BoxedStrategy, QuarryError, SearchStrategy, Settings, Simplifier, Simplify,
    boxed, default_settings, report, simplifier_fn,
};
use rand::{Rng, RngCore};

use super::{Argument, Arguments, Rule, RuleSet, rules_for};
use crate::machine::{GenericStateMachine, short_type_name};
use crate::runner::StateMachineRunner;
use crate::test_case::{StateMachineTestCase, test_case};

/// A machine described by rules.
///
/// Implementors hold the model state the rules act on. Running and shrinking
/// go through [`RuleMachine`], which tracks bundles and produced values.
pub trait RuleBasedStateMachine: Default + Sized + 'static {
    /// Type of the values rules take as arguments and produce
    type Value: Clone + Debug + Send + Sync + 'static;

    /// Declare this machine's rules. Called once per process.
    fn define_rules(rules: &mut RuleSet<Self>);

    /// Called exactly once at the end of every run
    fn teardown(&mut self) {}

    fn settings() -> Settings {
        default_settings()
    }

    /// Search for a breaking sequence of rule applications
    fn find_breaking_runner() -> Result<StateMachineRunner, QuarryError> {
        RuleMachine::<Self>::find_breaking_runner()
    }

    /// The cached failing-test entry point for this machine
    fn test_case() -> &'static StateMachineTestCase<RuleMachine<Self>> {
        test_case::<RuleMachine<Self>>()
    }
}

/// Reference to a value a rule produced, rendered as `v1`, `v2`, ...
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0 + 1)
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A rule application with its arguments bound
pub struct RuleStep<M: RuleBasedStateMachine> {
    rule: &'static Rule<M>,
    arguments: Vec<(String, StepArgument<M::Value>)>,
}

#[derive(Debug, Clone)]
enum StepArgument<V> {
    Reference(Handle),
    Literal(V),
}

impl<M: RuleBasedStateMachine> RuleStep<M> {
    pub fn rule(&self) -> &'static Rule<M> {
        self.rule
    }

    fn render_arguments(&self) -> String {
        self.arguments
            .iter()
            .map(|(name, argument)| match argument {
                StepArgument::Reference(handle) => format!("{}={}", name, handle),
                StepArgument::Literal(value) => format!("{}={:?}", name, value),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<M: RuleBasedStateMachine> Debug for RuleStep<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.rule.name(), self.render_arguments())
    }
}

/// Runs a [`RuleBasedStateMachine`]: owns its model, bundles and produced values
pub struct RuleMachine<M: RuleBasedStateMachine> {
    model: M,
    rules: &'static [Rule<M>],
    bundles: BTreeMap<String, Vec<Handle>>,
    values: Vec<M::Value>,
}

impl<M: RuleBasedStateMachine> RuleMachine<M> {
    /// A fresh machine. Fails when `M` declares no rules.
    pub fn new() -> Result<Self, QuarryError> {
        let rules = rules_for::<M>();
        if rules.is_empty() {
            return Err(QuarryError::invalid_definition(format!(
                "Type {} defines no rules",
                short_type_name::<M>()
            )));
        }
        Ok(Self {
            model: M::default(),
            rules,
            bundles: BTreeMap::new(),
            values: Vec::new(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Handles currently in `name`
    pub fn bundle(&self, name: &str) -> &[Handle] {
        self.bundles.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The value behind `handle`
    pub fn value(&self, handle: Handle) -> Option<&M::Value> {
        self.values.get(handle.0)
    }

    fn is_eligible(&self, rule: &Rule<M>) -> bool {
        rule.required_bundles()
            .all(|bundle| !self.bundle(bundle).is_empty())
    }
}

impl<M: RuleBasedStateMachine> Debug for RuleMachine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", short_type_name::<M>(), self.bundles)
    }
}

impl<M: RuleBasedStateMachine> GenericStateMachine for RuleMachine<M> {
    type Step = RuleStep<M>;

    fn create() -> Result<Self, QuarryError> {
        Self::new()
    }

    fn steps(&self) -> Result<BoxedStrategy<RuleStep<M>>, QuarryError> {
        let candidates: Vec<usize> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| self.is_eligible(rule))
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return Err(QuarryError::invalid_definition(format!(
                "No progress can be made from state {:?}",
                self
            )));
        }

        let bundles = candidates
            .iter()
            .flat_map(|&index| self.rules[index].required_bundles())
            .map(|name| (name.to_string(), self.bundle(name).to_vec()))
            .collect();
        Ok(boxed(RuleStepStrategy {
            rules: self.rules,
            candidates,
            bundles,
        }))
    }

    fn execute_step(&mut self, step: RuleStep<M>) -> Result<(), QuarryError> {
        let rule = step.rule;
        let mut arguments = Arguments::default();
        for (name, argument) in step.arguments {
            let value = match argument {
                StepArgument::Literal(value) => value,
                StepArgument::Reference(handle) => {
                    self.value(handle).cloned().ok_or_else(|| {
                        QuarryError::invalid_definition(format!("unknown value {}", handle))
                    })?
                }
            };
            arguments.push(name, value);
        }

        let result = rule.call(&mut self.model, &arguments)?;
        if rule.targets().is_empty() {
            return Ok(());
        }
        let value = result.ok_or_else(|| {
            QuarryError::invalid_definition(format!(
                "Rule {} has targets but returned no value",
                rule.name()
            ))
        })?;
        let handle = Handle(self.values.len());
        self.values.push(value);
        for target in rule.targets() {
            self.bundles.entry(target.clone()).or_default().push(handle);
        }
        Ok(())
    }

    fn print_step(&self, step_number: usize, step: &RuleStep<M>) {
        let assignment = if step.rule.targets().is_empty() {
            String::new()
        } else {
            format!("{} = ", Handle(self.values.len()))
        };
        report(&format!("Step #{}: {}{:?}", step_number, assignment, step));
    }

    fn teardown(&mut self) {
        self.model.teardown();
    }

    fn settings() -> Settings {
        M::settings()
    }
}

/// Draws one eligible rule and its arguments
struct RuleStepStrategy<M: RuleBasedStateMachine> {
    rules: &'static [Rule<M>],
    candidates: Vec<usize>,
    // Contents of every bundle a candidate reads, as of this step
    bundles: BTreeMap<String, Vec<Handle>>,
}

impl<M: RuleBasedStateMachine> Debug for RuleStepStrategy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .candidates
            .iter()
            .map(|&index| self.rules[index].name())
            .collect();
        f.debug_struct("RuleStepStrategy")
            .field("rules", &names)
            .field("bundles", &self.bundles)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct StepTemplate<V> {
    rule: usize,
    arguments: Vec<ArgumentTemplate<V>>,
}

#[derive(Debug, Clone)]
enum ArgumentTemplate<V> {
    Reference { position: usize, handle: Handle },
    Literal { data: Basic, value: V },
}

impl<M: RuleBasedStateMachine> RuleStepStrategy<M> {
    fn bundle(&self, name: &str) -> &[Handle] {
        self.bundles.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn read_argument(
        &self,
        argument: &Argument<M::Value>,
        data: &Basic,
    ) -> Result<ArgumentTemplate<M::Value>, BadData> {
        match argument {
            Argument::Bundle(bundle) => {
                let position = usize::try_from(check_u64(data)?)
                    .map_err(|_| BadData::new("bundle position out of range"))?;
                let handle = self
                    .bundle(bundle.name())
                    .get(position)
                    .copied()
                    .ok_or_else(|| BadData::new(format!("{} has no value at {}", bundle, position)))?;
                Ok(ArgumentTemplate::Reference { position, handle })
            }
            Argument::Strategy(strategy) => Ok(ArgumentTemplate::Literal {
                data: data.clone(),
                value: strategy.reify_basic(data)?,
            }),
        }
    }

    /// Per-rule weights, fixed by the parameter for a whole run
    fn weights(&self, parameter: u64) -> Vec<f64> {
        let mut rng = seeded_rng(parameter);
        let all: Vec<f64> = self.rules.iter().map(|_| rng.gen_range(0.1..1.0)).collect();
        self.candidates.iter().map(|&index| all[index]).collect()
    }

    fn choose_rule(&self, rng: &mut dyn RngCore, parameter: u64) -> usize {
        let weights = self.weights(parameter);
        let mut remaining = rng.gen_range(0.0..weights.iter().sum::<f64>());
        for (position, weight) in weights.iter().enumerate() {
            if remaining < *weight {
                return self.candidates[position];
            }
            remaining -= weight;
        }
        self.candidates[self.candidates.len() - 1]
    }
}

impl<M: RuleBasedStateMachine> SearchStrategy for RuleStepStrategy<M> {
    type Parameter = u64;
    type Template = StepTemplate<M::Value>;
    type Value = RuleStep<M>;

    fn draw_parameter(&self, rng: &mut dyn RngCore) -> u64 {
        rng.next_u64()
    }

    fn draw_template(&self, rng: &mut dyn RngCore, parameter: &u64) -> Self::Template {
        let rule = self.choose_rule(rng, *parameter);
        let arguments = self.rules[rule]
            .arguments()
            .iter()
            .enumerate()
            .map(|(position, (_, argument))| match argument {
                Argument::Bundle(bundle) => {
                    let handles = self.bundle(bundle.name());
                    let position = rng.gen_range(0..handles.len());
                    ArgumentTemplate::Reference {
                        position,
                        handle: handles[position],
                    }
                }
                Argument::Strategy(strategy) => {
                    let mut parameter_rng =
                        seeded_rng(parameter.wrapping_add(position as u64 + 1));
                    let (data, value) = strategy.draw(&mut parameter_rng, rng);
                    ArgumentTemplate::Literal { data, value }
                }
            })
            .collect();
        StepTemplate { rule, arguments }
    }

    fn reify(&self, template: &Self::Template) -> RuleStep<M> {
        let rule = &self.rules[template.rule];
        let arguments = rule
            .arguments()
            .iter()
            .zip(&template.arguments)
            .map(|((name, _), argument)| {
                let argument = match argument {
                    ArgumentTemplate::Reference { handle, .. } => StepArgument::Reference(*handle),
                    ArgumentTemplate::Literal { value, .. } => StepArgument::Literal(value.clone()),
                };
                (name.clone(), argument)
            })
            .collect();
        RuleStep { rule, arguments }
    }

    fn to_basic(&self, template: &Self::Template) -> Basic {
        let arguments = template
            .arguments
            .iter()
            .map(|argument| match argument {
                ArgumentTemplate::Reference { position, .. } => Basic::from(*position),
                ArgumentTemplate::Literal { data, .. } => data.clone(),
            })
            .collect();
        Basic::Array(vec![Basic::from(template.rule), Basic::Array(arguments)])
    }

    fn from_basic(&self, data: &Basic) -> Result<Self::Template, BadData> {
        let fields = check_length(2, data)?;
        let rule = usize::try_from(check_u64(&fields[0])?)
            .map_err(|_| BadData::new("rule index out of range"))?;
        if !self.candidates.contains(&rule) {
            return Err(BadData::new(format!("rule {} is not applicable", rule)));
        }
        let declared = self.rules[rule].arguments();
        let values = check_list(&fields[1])?;
        if values.len() != declared.len() {
            return Err(BadData::new(format!(
                "expected {} arguments but got {}",
                declared.len(),
                values.len()
            )));
        }

        let arguments = declared
            .iter()
            .zip(values)
            .map(|((_, argument), data)| self.read_argument(argument, data))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StepTemplate { rule, arguments })
    }

    fn simplifiers(
        &self,
        rng: &mut dyn RngCore,
        template: &Self::Template,
    ) -> Vec<Simplifier<Self::Template>> {
        let mut simplifiers = Vec::new();
        let declared = self.rules[template.rule].arguments();
        for (index, ((_, argument), current)) in
            declared.iter().zip(&template.arguments).enumerate()
        {
            match (argument, current) {
                (Argument::Bundle(bundle), ArgumentTemplate::Reference { .. }) => {
                    let handles = self.bundle(bundle.name()).to_vec();
                    simplifiers.push(earlier_reference(index, handles));
                }
                (Argument::Strategy(strategy), ArgumentTemplate::Literal { data, .. }) => {
                    for inner in strategy.basic_simplifiers(rng, data) {
                        simplifiers.push(Rc::new(LiteralArgument {
                            index,
                            strategy: strategy.clone(),
                            inner,
                        }) as Simplifier<Self::Template>);
                    }
                }
                _ => {}
            }
        }
        simplifiers
    }
}

/// Point bundle argument `index` at an earlier value in its bundle
fn earlier_reference<V: Clone + 'static>(
    index: usize,
    handles: Vec<Handle>,
) -> Simplifier<StepTemplate<V>> {
    simplifier_fn("earlier_reference", move |_rng, template: &StepTemplate<V>| {
        let Some(ArgumentTemplate::Reference { position, .. }) = template.arguments.get(index)
        else {
            return Vec::new();
        };
        shrink_index(*position)
            .into_iter()
            .filter_map(|position| {
                let handle = *handles.get(position)?;
                let mut simpler = template.clone();
                simpler.arguments[index] = ArgumentTemplate::Reference { position, handle };
                Some(simpler)
            })
            .collect()
    })
}

/// Applies a move of an argument's own strategy to that argument
struct LiteralArgument<V> {
    index: usize,
    strategy: BoxedStrategy<V>,
    inner: Simplifier<Basic>,
}

impl<V: Clone + 'static> Simplify<StepTemplate<V>> for LiteralArgument<V> {
    fn name(&self) -> String {
        format!("argument {}: {}", self.index, self.inner.name())
    }

    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        template: &StepTemplate<V>,
    ) -> Box<dyn Iterator<Item = StepTemplate<V>> + 'a> {
        let Some(ArgumentTemplate::Literal { data, .. }) = template.arguments.get(self.index)
        else {
            return Box::new(std::iter::empty());
        };
        let template = template.clone();
        Box::new(self.inner.simplify(rng, data).filter_map(move |data| {
            let value = self.strategy.reify_basic(&data).ok()?;
            let mut simpler = template.clone();
            simpler.arguments[self.index] = ArgumentTemplate::Literal { data, value };
            Some(simpler)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Bundle;
    use quarry::{integers, with_reporter};
    use std::cell::RefCell;

    #[derive(Default)]
    struct Pairs {
        created: usize,
    }

    impl RuleBasedStateMachine for Pairs {
        type Value = i64;

        fn define_rules(rules: &mut RuleSet<Self>) {
            let numbers = Bundle::new("numbers");
            rules
                .rule("make")
                .target(&numbers)
                .arg("n", integers(0i64, 10))
                .operation(|model: &mut Pairs, args| {
                    model.created += 1;
                    Ok(Some(*args.require("n")?))
                });
            rules
                .rule("sum")
                .target("sums")
                .bundle_arg("a", &numbers)
                .bundle_arg("b", &numbers)
                .operation(|_: &mut Pairs, args| {
                    Ok(Some(args.require("a")? + args.require("b")?))
                });
        }
    }

    fn rule_names(machine: &RuleMachine<Pairs>) -> Vec<String> {
        let strategy = machine.steps().unwrap();
        let mut rng = seeded_rng(0);
        (0..200)
            .map(|seed| {
                let (_, step) = strategy.draw(&mut seeded_rng(seed), &mut rng);
                step.rule().name().to_string()
            })
            .collect()
    }

    #[test]
    fn test_rules_needing_empty_bundles_are_excluded() {
        let machine = RuleMachine::<Pairs>::new().unwrap();
        assert!(rule_names(&machine).iter().all(|name| name == "make"));
    }

    #[test]
    fn test_bundles_fill_and_unlock_rules() {
        let mut machine = RuleMachine::<Pairs>::new().unwrap();
        let strategy = machine.steps().unwrap();
        let make = strategy.reify_basic(&serde_json::json!([0, [3]])).unwrap();
        machine.execute_step(make).unwrap();

        assert_eq!(machine.bundle("numbers"), &[Handle(0)]);
        assert_eq!(machine.value(Handle(0)), Some(&3));
        assert_eq!(machine.model().created, 1);
        assert!(rule_names(&machine).iter().any(|name| name == "sum"));

        let strategy = machine.steps().unwrap();
        let sum = strategy.reify_basic(&serde_json::json!([1, [0, 0]])).unwrap();
        machine.execute_step(sum).unwrap();
        assert_eq!(machine.bundle("sums"), &[Handle(1)]);
        assert_eq!(machine.value(Handle(1)), Some(&6));
        assert_eq!(format!("{:?}", machine), "Pairs({\"numbers\": [v1], \"sums\": [v2]})");
    }

    #[test]
    fn test_ineligible_rule_data_is_rejected() {
        let machine = RuleMachine::<Pairs>::new().unwrap();
        let strategy = machine.steps().unwrap();
        assert!(strategy.check_basic(&serde_json::json!([1, [0, 0]])).is_err());
        assert!(strategy.check_basic(&serde_json::json!([0, [11]])).is_err());
        assert!(strategy.check_basic(&serde_json::json!([0, [10]])).is_ok());
    }

    #[test]
    fn test_print_step_names_handles() {
        let mut machine = RuleMachine::<Pairs>::new().unwrap();
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        with_reporter(
            move |line| sink.borrow_mut().push(line.to_string()),
            || {
                let strategy = machine.steps().unwrap();
                let make = strategy.reify_basic(&serde_json::json!([0, [4]])).unwrap();
                machine.print_step(1, &make);
                machine.execute_step(make).unwrap();

                let strategy = machine.steps().unwrap();
                let sum = strategy.reify_basic(&serde_json::json!([1, [0, 0]])).unwrap();
                machine.print_step(2, &sum);
            },
        );
        assert_eq!(
            *lines.borrow(),
            vec!["Step #1: v1 = make(n=4)", "Step #2: v2 = sum(a=v1, b=v1)"]
        );
    }

    #[test]
    fn test_reference_simplifier_moves_to_earlier_values() {
        let mut machine = RuleMachine::<Pairs>::new().unwrap();
        for n in [1, 2, 3] {
            let strategy = machine.steps().unwrap();
            let make = strategy.reify_basic(&serde_json::json!([0, [n]])).unwrap();
            machine.execute_step(make).unwrap();
        }
        let strategy = machine.steps().unwrap();
        let mut rng = seeded_rng(0);
        let data = serde_json::json!([1, [2, 0]]);
        let simplifiers = strategy.basic_simplifiers(&mut rng, &data);
        let candidates: Vec<Basic> = simplifiers
            .iter()
            .flat_map(|s| s.simplify(&mut seeded_rng(0), &data).collect::<Vec<_>>())
            .collect();
        assert_eq!(
            candidates,
            vec![serde_json::json!([1, [0, 0]]), serde_json::json!([1, [1, 0]])]
        );
    }
}
