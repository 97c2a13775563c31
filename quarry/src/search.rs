//! Minimal-counterexample search.
//!
//! [`find`] draws candidates from a strategy until one satisfies a condition,
//! then greedily applies the strategy's shrink moves, keeping any simpler
//! candidate that still satisfies it. The result is locally minimal: no
//! single move from it reproduces the condition.

use std::collections::HashSet;
use std::time::Instant;

use rand::RngCore;

use crate::basic::Basic;
use crate::config::Settings;
use crate::error::QuarryError;
use crate::reporting::{debug_report, verbose_report};
use crate::rng::create_rng;
use crate::strategy::SearchStrategy;

/// Outcome of evaluating one candidate
enum Verdict {
    Matched,
    Rejected,
    Skipped,
}

/// Tracks evaluated candidates and the search budget
struct Tracker<'a, F> {
    condition: F,
    settings: &'a Settings,
    seen: HashSet<String>,
    started: Instant,
}

impl<F> Tracker<'_, F> {
    fn timed_out(&self) -> bool {
        self.started.elapsed() >= self.settings.timeout
    }

    /// Returns `false` if this canonical form was evaluated before
    fn first_visit(&mut self, basic: &Basic) -> bool {
        self.seen.insert(basic.to_string())
    }
}

impl<F> Tracker<'_, F> {
    fn evaluate<V>(&mut self, value: &V) -> Result<Verdict, QuarryError>
    where
        F: FnMut(&V) -> Result<bool, QuarryError>,
    {
        match (self.condition)(value) {
            Ok(true) => Ok(Verdict::Matched),
            Ok(false) => Ok(Verdict::Rejected),
            Err(QuarryError::UnsatisfiedAssumption(_)) => Ok(Verdict::Skipped),
            Err(error) => Err(error),
        }
    }
}

/// Key under which examples for `strategy` are stored
pub fn database_key<S: SearchStrategy>(strategy: &S) -> String {
    format!("{:?}", strategy)
}

/// Find a locally minimal template whose value satisfies `condition`.
///
/// `condition` returns `Ok(true)` on a match and `Ok(false)` otherwise. An
/// `UnsatisfiedAssumption` error skips the candidate; any other error aborts
/// the search and is returned as is.
pub fn find<S, F>(strategy: &S, condition: F, settings: &Settings) -> Result<S::Template, QuarryError>
where
    S: SearchStrategy,
    F: FnMut(&S::Value) -> Result<bool, QuarryError>,
{
    settings.validate()?;
    let mut rng = create_rng(settings.seed);
    let mut tracker = Tracker {
        condition,
        settings,
        seen: HashSet::new(),
        started: Instant::now(),
    };

    let key = database_key(strategy);
    let best = match replay_saved(strategy, &mut tracker, &key)? {
        Some(saved) => saved,
        None => generate(strategy, &mut tracker, &mut rng)?,
    };

    let minimal = shrink(strategy, &mut tracker, &mut rng, best)?;
    if let Some(database) = &settings.database {
        database.save(&key, &strategy.to_basic(&minimal));
    }
    Ok(minimal)
}

fn replay_saved<S, F>(
    strategy: &S,
    tracker: &mut Tracker<'_, F>,
    key: &str,
) -> Result<Option<S::Template>, QuarryError>
where
    S: SearchStrategy,
    F: FnMut(&S::Value) -> Result<bool, QuarryError>,
{
    let Some(database) = &tracker.settings.database else {
        return Ok(None);
    };
    for saved in database.fetch(key) {
        let template = match strategy.from_basic(&saved) {
            Ok(template) => template,
            Err(error) => {
                tracing::debug!(%error, "discarding unreadable saved example");
                database.delete(key, &saved);
                continue;
            }
        };
        tracker.first_visit(&saved);
        if let Verdict::Matched = tracker.evaluate(&strategy.reify(&template))? {
            tracing::debug!("saved example still matches");
            return Ok(Some(template));
        }
    }
    Ok(None)
}

fn generate<S, F>(
    strategy: &S,
    tracker: &mut Tracker<'_, F>,
    rng: &mut dyn RngCore,
) -> Result<S::Template, QuarryError>
where
    S: SearchStrategy,
    F: FnMut(&S::Value) -> Result<bool, QuarryError>,
{
    let settings = tracker.settings;
    let mut satisfied = 0;
    let mut skipped = 0;

    for iteration in 0..settings.max_iterations {
        if satisfied >= settings.max_examples || tracker.timed_out() {
            break;
        }
        let parameter = strategy.draw_parameter(rng);
        let template = strategy.draw_template(rng, &parameter);
        if !tracker.first_visit(&strategy.to_basic(&template)) {
            continue;
        }
        match tracker.evaluate(&strategy.reify(&template))? {
            Verdict::Matched => {
                tracing::debug!(iteration, satisfied, "found matching example");
                verbose_report(|| format!("Found a matching example after {} tries", iteration + 1));
                return Ok(template);
            }
            Verdict::Rejected => satisfied += 1,
            Verdict::Skipped => skipped += 1,
        }
    }

    tracing::debug!(satisfied, skipped, "search exhausted");
    if satisfied == 0 && skipped > 0 {
        Err(QuarryError::Unsatisfiable { examples: skipped })
    } else {
        Err(QuarryError::NoSuchExample {
            examples: satisfied,
        })
    }
}

fn shrink<S, F>(
    strategy: &S,
    tracker: &mut Tracker<'_, F>,
    rng: &mut dyn RngCore,
    mut best: S::Template,
) -> Result<S::Template, QuarryError>
where
    S: SearchStrategy,
    F: FnMut(&S::Value) -> Result<bool, QuarryError>,
{
    let max_shrinks = tracker.settings.max_shrinks;
    let mut shrinks = 0;

    'improved: while shrinks < max_shrinks && !tracker.timed_out() {
        for simplifier in strategy.simplifiers(rng, &best) {
            let mut candidates = simplifier.simplify(rng, &best);
            while let Some(candidate) = candidates.next() {
                if tracker.timed_out() {
                    break 'improved;
                }
                if !tracker.first_visit(&strategy.to_basic(&candidate)) {
                    continue;
                }
                // Inapplicable candidates are skipped rather than aborting the move
                if let Verdict::Matched = tracker.evaluate(&strategy.reify(&candidate))? {
                    shrinks += 1;
                    tracing::debug!(shrinks, simplifier = %simplifier.name(), "accepted simplification");
                    debug_report(|| format!("Shrink #{} via {}", shrinks, simplifier.name()));
                    drop(candidates);
                    best = candidate;
                    continue 'improved;
                }
            }
        }
        break;
    }

    verbose_report(|| format!("Shrunk example {} times", shrinks));
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::database::{ExampleDatabase, InMemoryDatabase};
    use crate::error::assume;
    use crate::primitives::integers;
    use std::sync::Arc;

    fn settings() -> Settings {
        Settings::default().with_seed(1234)
    }

    #[test]
    fn test_find_shrinks_to_boundary() {
        let found = find(&integers(0i64, 10_000), |x| Ok(*x >= 137), &settings()).unwrap();
        assert_eq!(found, 137);
    }

    #[test]
    fn test_find_no_such_example() {
        let result = find(&integers(0i64, 100), |x| Ok(*x > 100), &settings());
        assert!(matches!(result, Err(QuarryError::NoSuchExample { .. })));
    }

    #[test]
    fn test_find_unsatisfiable() {
        let result = find(
            &integers(0i64, 100),
            |_| assume(false).map(|_| true),
            &settings(),
        );
        assert!(matches!(result, Err(QuarryError::Unsatisfiable { .. })));
    }

    #[test]
    fn test_shrink_skips_inapplicable_candidates() {
        let mut offered_zero = false;
        let found = find(
            &integers(0i64, 1000),
            |x| {
                if *x == 0 {
                    offered_zero = true;
                }
                assume(*x != 0)?;
                Ok(true)
            },
            &settings(),
        )
        .unwrap();
        assert!(offered_zero);
        assert_eq!(found, 1);
    }

    #[test]
    fn test_find_propagates_fatal_errors() {
        let result = find(
            &integers(0i64, 100),
            |_| Err(QuarryError::invalid_definition("broken")),
            &settings(),
        );
        assert_eq!(result, Err(QuarryError::invalid_definition("broken")));
    }

    #[test]
    fn test_find_rejects_invalid_settings() {
        let bad = Settings::default().with_max_examples(0);
        let result = find(&integers(0i64, 100), |_| Ok(true), &bad);
        assert!(matches!(result, Err(QuarryError::Settings(_))));
    }

    #[test]
    fn test_find_saves_and_replays_examples() {
        let database = Arc::new(InMemoryDatabase::new());
        let settings = settings().with_database(database.clone());
        let strategy = integers(0i64, 1000);

        let first = find(&strategy, |x| Ok(*x >= 500), &settings).unwrap();
        assert_eq!(first, 500);
        assert_eq!(database.fetch(&database_key(&strategy)), vec![Basic::from(500)]);

        let mut calls = 0;
        let second = find(
            &strategy,
            |x| {
                calls += 1;
                Ok(*x >= 500)
            },
            &settings,
        )
        .unwrap();
        assert_eq!(second, 500);
        // The saved example is already minimal: replay plus failed shrinks only
        assert!(calls < 20);
    }
}
