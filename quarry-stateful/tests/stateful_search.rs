//! End-to-end searches over rule-based and generic machines.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, LazyLock};

use quarry::search::find;
use quarry::{ExampleDatabase, InMemoryDatabase, SearchStrategy, assume, with_reporter};
use quarry_stateful::prelude::*;
use quarry_stateful::test_case::FLAKY_MESSAGE;
use quarry_stateful::{StateMachineSearchStrategy, test_case};

fn capture(f: impl FnOnce()) -> Vec<String> {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    with_reporter(move |line| sink.borrow_mut().push(line.to_string()), f);
    lines.take()
}

/// `push` adds ever smaller negative numbers; `pop` fails on any negative number
fn push_pop_rules<M>(rules: &mut RuleSet<M>, next: fn(&mut M) -> i64)
where
    M: RuleBasedStateMachine<Value = i64>,
{
    let values = Bundle::new("values");
    rules
        .rule("push")
        .target(&values)
        .operation(move |machine: &mut M, _| Ok(Some(next(machine))));
    rules
        .rule("pop")
        .bundle_arg("value", &values)
        .operation(|_: &mut M, args| {
            let value = *args.require("value")?;
            if value < 0 {
                return Err(QuarryError::failed(format!("popped {}", value)));
            }
            Ok(None)
        });
}

#[derive(Default)]
struct PushPop {
    next: i64,
}

impl RuleBasedStateMachine for PushPop {
    type Value = i64;

    fn define_rules(rules: &mut RuleSet<Self>) {
        push_pop_rules(rules, |machine: &mut PushPop| {
            machine.next -= 1;
            machine.next
        });
    }

    fn settings() -> Settings {
        Settings::default().with_seed(17).with_step_count(10)
    }
}

fn replay_lines<M: GenericStateMachine>(runner: &StateMachineRunner) -> Vec<String> {
    capture(|| {
        let mut machine = M::create().unwrap();
        let _ = runner.run(&mut machine, true);
    })
}

#[test]
fn test_push_pop_shrinks_to_two_steps() {
    let runner = PushPop::find_breaking_runner().unwrap();
    assert_eq!(runner.live_steps(), 2);

    let mut machine = RuleMachine::<PushPop>::create().unwrap();
    assert_eq!(
        runner.run(&mut machine, false),
        Err(QuarryError::failed("popped -1"))
    );
    assert_eq!(
        replay_lines::<RuleMachine<PushPop>>(&runner),
        vec!["Step #1: v1 = push()", "Step #2: pop(value=v1)"]
    );
}

#[test]
fn test_test_case_reports_the_minimal_failure() {
    let case = PushPop::test_case();
    assert_eq!(case.name(), "RuleMachine<PushPop>.TestCase");

    let lines = capture(|| {
        assert_eq!(case.run(), Err(QuarryError::failed("popped -1")));
    });
    assert_eq!(lines, vec!["Step #1: v1 = push()", "Step #2: pop(value=v1)"]);
    assert!(std::ptr::eq(case, PushPop::test_case()));
}

#[test]
fn test_replay_is_identical_on_fresh_machines() {
    let runner = StateMachineRunner::new(5, 9, 10);
    let first = replay_lines::<RuleMachine<PushPop>>(&runner);
    let second = replay_lines::<RuleMachine<PushPop>>(&runner);
    let fresh = replay_lines::<RuleMachine<PushPop>>(&StateMachineRunner::new(5, 9, 10));
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first, fresh);
}

#[test]
fn test_serialized_runner_replays_the_same_steps() {
    let strategy = StateMachineSearchStrategy::new("PushPop", 10);
    let runner = StateMachineRunner::new(21, 22, 10);
    let original = replay_lines::<RuleMachine<PushPop>>(&runner);

    let restored = strategy.from_basic(&strategy.to_basic(&runner)).unwrap();
    assert_eq!(replay_lines::<RuleMachine<PushPop>>(&restored), original);
}

#[derive(Default)]
struct NoRules;

impl RuleBasedStateMachine for NoRules {
    type Value = ();

    fn define_rules(_rules: &mut RuleSet<Self>) {}
}

#[test]
fn test_zero_rules_is_an_invalid_definition() {
    let expected = QuarryError::invalid_definition("Type NoRules defines no rules");
    assert_eq!(RuleMachine::<NoRules>::create().unwrap_err(), expected);
    assert_eq!(NoRules::find_breaking_runner().unwrap_err(), expected);
    assert_eq!(NoRules::test_case().run(), Err(expected));
}

#[derive(Default)]
struct Stuck;

impl RuleBasedStateMachine for Stuck {
    type Value = i64;

    fn define_rules(rules: &mut RuleSet<Self>) {
        rules
            .rule("consume")
            .bundle_arg("item", "never_filled")
            .operation(|_: &mut Stuck, _| Ok(None));
    }
}

#[test]
fn test_no_progress_is_an_invalid_definition() {
    let machine = RuleMachine::<Stuck>::create().unwrap();
    assert_eq!(
        machine.steps().err(),
        Some(QuarryError::invalid_definition(
            "No progress can be made from state Stuck({})"
        ))
    );
    assert!(matches!(
        Stuck::find_breaking_runner(),
        Err(QuarryError::InvalidDefinition(_))
    ));
}

/// Fails on every step unless its steps are being reported
struct Fickle {
    reporting: Cell<bool>,
}

impl GenericStateMachine for Fickle {
    type Step = bool;

    fn create() -> Result<Self, QuarryError> {
        Ok(Fickle {
            reporting: Cell::new(false),
        })
    }

    fn steps(&self) -> Result<BoxedStrategy<bool>, QuarryError> {
        Ok(boxed(booleans()))
    }

    fn execute_step(&mut self, _step: bool) -> Result<(), QuarryError> {
        if self.reporting.get() {
            Ok(())
        } else {
            Err(QuarryError::failed("not watched"))
        }
    }

    fn print_step(&self, _step_number: usize, _step: &bool) {
        self.reporting.set(true);
    }

    fn settings() -> Settings {
        Settings::default().with_seed(4).with_step_count(5)
    }
}

#[test]
fn test_failure_that_does_not_reproduce_is_flaky() {
    let runner = Fickle::find_breaking_runner().unwrap();
    assert_eq!(runner.live_steps(), 1);
    assert_eq!(
        test_case::<Fickle>().run(),
        Err(QuarryError::Flaky(FLAKY_MESSAGE.to_string()))
    );
}

#[derive(Default)]
struct SavedPushPop {
    next: i64,
}

static DATABASE: LazyLock<Arc<InMemoryDatabase>> = LazyLock::new(|| Arc::new(InMemoryDatabase::new()));

impl RuleBasedStateMachine for SavedPushPop {
    type Value = i64;

    fn define_rules(rules: &mut RuleSet<Self>) {
        push_pop_rules(rules, |machine: &mut SavedPushPop| {
            machine.next -= 1;
            machine.next
        });
    }

    fn settings() -> Settings {
        Settings::default()
            .with_seed(99)
            .with_step_count(10)
            .with_database(DATABASE.clone())
    }
}

#[test]
fn test_minimal_run_is_saved_and_replayed() {
    let strategy = StateMachineSearchStrategy::new(std::any::type_name::<RuleMachine<SavedPushPop>>(), 10);
    let first = SavedPushPop::find_breaking_runner().unwrap();
    let key = format!("{:?}", strategy);
    assert_eq!(DATABASE.fetch(&key), vec![strategy.to_basic(&first)]);

    let second = SavedPushPop::find_breaking_runner().unwrap();
    assert_eq!(strategy.to_basic(&second), strategy.to_basic(&first));
}

#[test]
fn test_search_driver_accepts_the_run_strategy_directly() {
    let strategy = StateMachineSearchStrategy::new("PushPop", 10);
    let settings = Settings::default().with_seed(5);
    let runner = find(
        &strategy,
        |runner: &StateMachineRunner| {
            let mut machine = RuleMachine::<PushPop>::create()?;
            Ok(runner.run(&mut machine, false).is_err())
        },
        &settings,
    )
    .unwrap();
    assert_eq!(runner.live_steps(), 2);
}

/// Seven is never a valid input; anything above 90 breaks the machine
#[derive(Default)]
struct NoSevens;

impl RuleBasedStateMachine for NoSevens {
    type Value = u32;

    fn define_rules(rules: &mut RuleSet<Self>) {
        rules
            .rule("check")
            .arg("x", integers(0u32, 100))
            .operation(|_: &mut NoSevens, args| {
                let x = *args.require("x")?;
                assume(x != 7)?;
                if x > 90 {
                    return Err(QuarryError::failed(format!("{} is too large", x)));
                }
                Ok(None)
            });
    }

    fn settings() -> Settings {
        Settings::default().with_seed(3).with_step_count(10)
    }
}

#[test]
fn test_inapplicable_steps_are_skipped_not_failures() {
    let runner = NoSevens::find_breaking_runner().unwrap();
    assert_eq!(runner.live_steps(), 1);

    let mut machine = RuleMachine::<NoSevens>::create().unwrap();
    assert_eq!(
        runner.run(&mut machine, false),
        Err(QuarryError::failed("91 is too large"))
    );
    assert_eq!(
        NoSevens::test_case().run(),
        Err(QuarryError::failed("91 is too large"))
    );
}

/// Every step it is offered is inapplicable
struct OnlySevens {
    teardowns: usize,
}

impl GenericStateMachine for OnlySevens {
    type Step = u32;

    fn create() -> Result<Self, QuarryError> {
        Ok(OnlySevens { teardowns: 0 })
    }

    fn steps(&self) -> Result<BoxedStrategy<u32>, QuarryError> {
        Ok(boxed(just(7u32)))
    }

    fn execute_step(&mut self, step: u32) -> Result<(), QuarryError> {
        assume(step != 7)
    }

    fn teardown(&mut self) {
        self.teardowns += 1;
    }

    fn settings() -> Settings {
        Settings::default().with_seed(4).with_step_count(3)
    }
}

#[test]
fn test_inapplicable_step_reaches_the_caller_unchanged() {
    let mut machine = OnlySevens::create().unwrap();
    let runner = StateMachineRunner::new(1, 2, 3);
    assert!(matches!(
        runner.run(&mut machine, false),
        Err(QuarryError::UnsatisfiedAssumption(_))
    ));
    assert_eq!(machine.teardowns, 1);

    assert!(matches!(
        OnlySevens::find_breaking_runner(),
        Err(QuarryError::Unsatisfiable { .. })
    ));
}

#[derive(Default)]
struct Counter {
    total: i64,
}

impl RuleBasedStateMachine for Counter {
    type Value = i64;

    fn define_rules(rules: &mut RuleSet<Self>) {
        rules
            .rule("add")
            .arg("amount", integers(0i64, 100))
            .operation(|counter: &mut Counter, args| {
                counter.total += *args.require("amount")?;
                assert!(counter.total >= 0);
                Ok(None)
            });
    }

    fn settings() -> Settings {
        Settings::default().with_seed(8).with_max_examples(25).with_step_count(8)
    }
}

state_machine_test!(counter_never_goes_negative, RuleMachine<Counter>);
