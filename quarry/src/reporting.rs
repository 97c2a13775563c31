//! User-facing reporting.
//!
//! Messages go to the innermost reporter installed on this thread with
//! [`with_reporter`], or to stdout when none is installed. Internal
//! diagnostics use `tracing` instead.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{Verbosity, default_settings};

type Reporter = Rc<dyn Fn(&str)>;

thread_local! {
    static REPORTERS: RefCell<Vec<Reporter>> = const { RefCell::new(Vec::new()) };
    static VERBOSITY: RefCell<Vec<Verbosity>> = const { RefCell::new(Vec::new()) };
}

/// Pops the reporter stack even if the wrapped closure unwinds
struct ReporterGuard;

impl Drop for ReporterGuard {
    fn drop(&mut self) {
        REPORTERS.with(|reporters| {
            reporters.borrow_mut().pop();
        });
    }
}

struct VerbosityGuard;

impl Drop for VerbosityGuard {
    fn drop(&mut self) {
        VERBOSITY.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with `reporter` receiving every report made on this thread
pub fn with_reporter<R>(reporter: impl Fn(&str) + 'static, f: impl FnOnce() -> R) -> R {
    REPORTERS.with(|reporters| reporters.borrow_mut().push(Rc::new(reporter)));
    let _guard = ReporterGuard;
    f()
}

/// Run `f` with the reporting level overridden
pub fn with_verbosity<R>(verbosity: Verbosity, f: impl FnOnce() -> R) -> R {
    VERBOSITY.with(|stack| stack.borrow_mut().push(verbosity));
    let _guard = VerbosityGuard;
    f()
}

/// The reporting level currently in effect
pub fn current_verbosity() -> Verbosity {
    VERBOSITY
        .with(|stack| stack.borrow().last().copied())
        .unwrap_or_else(|| default_settings().verbosity)
}

/// Report a message unless running quietly
pub fn report(message: &str) {
    if current_verbosity() == Verbosity::Quiet {
        return;
    }
    let reporter = REPORTERS.with(|reporters| reporters.borrow().last().cloned());
    match reporter {
        Some(reporter) => reporter(message),
        None => println!("{}", message),
    }
}

/// Report a lazily built message at verbose level or above
pub fn verbose_report(message: impl FnOnce() -> String) {
    if current_verbosity() >= Verbosity::Verbose {
        report(&message());
    }
}

/// Report a lazily built message at debug level
pub fn debug_report(message: impl FnOnce() -> String) {
    if current_verbosity() >= Verbosity::Debug {
        report(&message());
    }
}
