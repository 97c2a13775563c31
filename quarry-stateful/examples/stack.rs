//! Example: finding a bug in a bounded stack with a rule-based machine
//!
//! The stack silently drops pushes once it holds three items. The machine
//! keeps a model of what the stack should contain and checks every `pop`
//! against it; the search finds and shrinks a failing sequence.

use quarry_stateful::prelude::*;

/// A stack that forgets pushes beyond its capacity
#[derive(Debug, Default)]
struct BoundedStack {
    items: Vec<i64>,
}

impl BoundedStack {
    const CAPACITY: usize = 3;

    fn push(&mut self, item: i64) {
        if self.items.len() < Self::CAPACITY {
            self.items.push(item);
        }
    }

    fn pop(&mut self) -> Option<i64> {
        self.items.pop()
    }
}

#[derive(Debug, Default)]
struct StackMachine {
    stack: BoundedStack,
    model: Vec<i64>,
}

impl RuleBasedStateMachine for StackMachine {
    type Value = i64;

    fn define_rules(rules: &mut RuleSet<Self>) {
        let pushed = Bundle::new("pushed");

        rules
            .rule("push")
            .target(&pushed)
            .arg("item", integers(-100i64, 100))
            .operation(|machine: &mut StackMachine, args| {
                let item = *args.require("item")?;
                machine.stack.push(item);
                machine.model.push(item);
                Ok(Some(item))
            });

        rules
            .rule("pop")
            .operation(|machine: &mut StackMachine, _| {
                let actual = machine.stack.pop();
                let expected = machine.model.pop();
                if actual != expected {
                    return Err(QuarryError::failed(format!(
                        "popped {:?} but expected {:?}",
                        actual, expected
                    )));
                }
                Ok(None)
            });

        rules
            .rule("push_again")
            .target(&pushed)
            .bundle_arg("item", &pushed)
            .operation(|machine: &mut StackMachine, args| {
                let item = *args.require("item")?;
                machine.stack.push(item);
                machine.model.push(item);
                Ok(Some(item))
            });
    }

    fn settings() -> Settings {
        Settings::default().with_seed(2024).with_step_count(30)
    }
}

fn main() {
    println!("=== Bounded stack ===\n");

    match StackMachine::test_case().run() {
        Ok(()) => println!("\nNo failing sequence found"),
        Err(error) => println!("\nMinimal failing sequence above: {}", error),
    }
}
