//! Declarative rules over named value pools.
//!
//! A rule-based machine declares its rules once, through a [`RuleSet`]. Each
//! rule has an operation, named arguments drawn either from a strategy or
//! from a [`Bundle`] of values earlier rules produced, and the bundles its
//! own result is added to.

mod machine;

pub use machine::{Handle, RuleBasedStateMachine, RuleMachine, RuleStep};

use std::fmt;
use std::sync::Arc;

use quarry::{BoxedStrategy, QuarryError, SearchStrategy, boxed};

use crate::registry;

/// A named pool of values produced during a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bundle {
    name: String,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for Bundle {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bundle({})", self.name)
    }
}

/// Where a rule argument comes from
pub enum Argument<V> {
    /// A value previously added to the bundle
    Bundle(Bundle),
    /// A fresh value drawn from the strategy
    Strategy(BoxedStrategy<V>),
}

impl<V> Clone for Argument<V> {
    fn clone(&self) -> Self {
        match self {
            Argument::Bundle(bundle) => Argument::Bundle(bundle.clone()),
            Argument::Strategy(strategy) => Argument::Strategy(strategy.clone()),
        }
    }
}

impl<V> fmt::Debug for Argument<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Bundle(bundle) => write!(f, "{}", bundle),
            Argument::Strategy(strategy) => write!(f, "{:?}", strategy),
        }
    }
}

/// Resolved argument values, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments<V> {
    values: Vec<(String, V)>,
}

impl<V> Default for Arguments<V> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<V> Arguments<V> {
    pub(crate) fn push(&mut self, name: impl Into<String>, value: V) {
        self.values.push((name.into(), value));
    }

    /// The value bound to `name`
    pub fn get(&self, name: &str) -> Option<&V> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// The value bound to `name`, or an invalid-definition error
    pub fn require(&self, name: &str) -> Result<&V, QuarryError> {
        self.get(name)
            .ok_or_else(|| QuarryError::invalid_definition(format!("no argument named {}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A rule's operation: returns the value to add to the rule's targets, if any
pub type Operation<M, V> =
    Arc<dyn Fn(&mut M, &Arguments<V>) -> Result<Option<V>, QuarryError> + Send + Sync>;

/// A single rule
pub struct Rule<M: RuleBasedStateMachine> {
    name: String,
    targets: Vec<String>,
    arguments: Vec<(String, Argument<M::Value>)>,
    operation: Operation<M, M::Value>,
}

impl<M: RuleBasedStateMachine> Rule<M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bundles the result is added to
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn arguments(&self) -> &[(String, Argument<M::Value>)] {
        &self.arguments
    }

    /// Names of the bundles this rule reads from
    pub fn required_bundles(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().filter_map(|(_, argument)| match argument {
            Argument::Bundle(bundle) => Some(bundle.name()),
            Argument::Strategy(_) => None,
        })
    }

    pub(crate) fn call(
        &self,
        model: &mut M,
        arguments: &Arguments<M::Value>,
    ) -> Result<Option<M::Value>, QuarryError> {
        (self.operation)(model, arguments)
    }
}

impl<M: RuleBasedStateMachine> fmt::Debug for Rule<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// The rules of one machine type
pub struct RuleSet<M: RuleBasedStateMachine> {
    rules: Vec<Rule<M>>,
}

impl<M: RuleBasedStateMachine> Default for RuleSet<M> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<M: RuleBasedStateMachine> RuleSet<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start declaring a rule; it is added once its operation is given
    pub fn rule(&mut self, name: impl Into<String>) -> RuleBuilder<'_, M> {
        RuleBuilder {
            set: self,
            name: name.into(),
            targets: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Add a fully described rule
    pub fn define_rule<F>(
        &mut self,
        name: impl Into<String>,
        targets: Vec<String>,
        arguments: Vec<(String, Argument<M::Value>)>,
        operation: F,
    ) where
        F: Fn(&mut M, &Arguments<M::Value>) -> Result<Option<M::Value>, QuarryError>
            + Send
            + Sync
            + 'static,
    {
        self.rules.push(Rule {
            name: name.into(),
            targets,
            arguments,
            operation: Arc::new(operation),
        });
    }

    pub fn rules(&self) -> &[Rule<M>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builder for one rule
pub struct RuleBuilder<'a, M: RuleBasedStateMachine> {
    set: &'a mut RuleSet<M>,
    name: String,
    targets: Vec<String>,
    arguments: Vec<(String, Argument<M::Value>)>,
}

impl<M: RuleBasedStateMachine> RuleBuilder<'_, M> {
    /// Add the result to `bundle`, given as a [`Bundle`] or by name
    pub fn target(mut self, bundle: impl AsRef<str>) -> Self {
        self.targets.push(bundle.as_ref().to_string());
        self
    }

    pub fn targets<I>(mut self, bundles: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.targets
            .extend(bundles.into_iter().map(|b| b.as_ref().to_string()));
        self
    }

    /// Draw argument `name` from `strategy`
    pub fn arg<S>(mut self, name: impl Into<String>, strategy: S) -> Self
    where
        S: SearchStrategy<Value = M::Value>,
    {
        self.arguments
            .push((name.into(), Argument::Strategy(boxed(strategy))));
        self
    }

    /// Draw argument `name` from a value already in `bundle`
    pub fn bundle_arg(mut self, name: impl Into<String>, bundle: impl AsRef<str>) -> Self {
        self.arguments
            .push((name.into(), Argument::Bundle(Bundle::new(bundle.as_ref()))));
        self
    }

    /// Give the rule's operation and add the rule
    pub fn operation<F>(self, operation: F)
    where
        F: Fn(&mut M, &Arguments<M::Value>) -> Result<Option<M::Value>, QuarryError>
            + Send
            + Sync
            + 'static,
    {
        self.set
            .define_rule(self.name, self.targets, self.arguments, operation);
    }
}

/// The rules of `M`, built on first use and cached for the process lifetime
pub fn rules_for<M: RuleBasedStateMachine>() -> &'static [Rule<M>] {
    registry::cached::<M, RuleSet<M>>(|| {
        let mut rules = RuleSet::new();
        M::define_rules(&mut rules);
        tracing::debug!(
            machine = std::any::type_name::<M>(),
            rules = rules.len(),
            "registered rules"
        );
        rules
    })
    .rules()
}
