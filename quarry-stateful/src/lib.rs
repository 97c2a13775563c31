//! # Quarry Stateful
//!
//! Stateful testing on top of `quarry`: instead of single values, search for
//! sequences of operations that break a system, then shrink them to a short
//! reproducible script.
//!
//! Systems implement [`GenericStateMachine`] directly, or describe rules over
//! named value pools with [`RuleBasedStateMachine`].
//!
//! ## Quick Example
//!
//! ```rust
//! use quarry_stateful::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter {
//!     value: i64,
//! }
//!
//! impl RuleBasedStateMachine for Counter {
//!     type Value = i64;
//!
//!     fn define_rules(rules: &mut RuleSet<Self>) {
//!         rules
//!             .rule("add")
//!             .arg("n", integers(0i64, 10))
//!             .operation(|counter: &mut Counter, args| {
//!                 counter.value += *args.require("n")?;
//!                 Ok(None)
//!             });
//!     }
//!
//!     fn settings() -> Settings {
//!         Settings::default().with_seed(0).with_max_examples(20)
//!     }
//! }
//!
//! // Adding non-negative numbers never breaks anything
//! Counter::test_case().run().unwrap();
//! ```

pub mod machine;
pub mod registry;
pub mod rules;
pub mod runner;
pub mod test_case;

pub use machine::GenericStateMachine;
pub use rules::{
    Argument, Arguments, Bundle, Handle, Rule, RuleBasedStateMachine, RuleBuilder, RuleMachine,
    RuleSet, RuleStep, rules_for,
};
pub use runner::{DiscardConfig, StateMachineRunner, StateMachineSearchStrategy, StepRecord, seeds};
pub use test_case::{StateMachineTestCase, test_case};

/// Re-exports for convenient imports
pub mod prelude {
    pub use crate::machine::GenericStateMachine;
    pub use crate::rules::{Arguments, Bundle, RuleBasedStateMachine, RuleMachine, RuleSet};
    pub use crate::runner::StateMachineRunner;
    pub use crate::state_machine_test;
    pub use quarry::{
        BoxedStrategy, QuarryError, Settings, Verbosity, booleans, boxed, integers, just,
        sampled_from,
    };
}

/// Define a `#[test]` that searches the given machine type for a breaking run.
///
/// ```rust,ignore
/// state_machine_test!(stack_never_breaks, RuleMachine<Stack>);
/// ```
#[macro_export]
macro_rules! state_machine_test {
    ($name:ident, $machine:ty) => {
        #[test]
        fn $name() {
            if let Err(error) = $crate::test_case::<$machine>().run() {
                panic!("{}", error);
            }
        }
    };
}
