#![allow(clippy::result_large_err)]

//! # Quarry - search strategies and counterexample search
//!
//! Quarry draws structured test data through a template protocol: every
//! strategy draws a parameter, then a template shaped by it, serializes that
//! template to canonical [`Basic`] data and enumerates shrink moves over it.
//! [`find`] combines these into a search for a minimal example satisfying a
//! condition.
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry::{Settings, find, integers};
//!
//! let settings = Settings::default().with_seed(7);
//! let found = find(&integers(0i64, 1000), |x| Ok(*x >= 10), &settings).unwrap();
//! assert_eq!(found, 10);
//! ```

pub mod basic;
pub mod config;
pub mod database;
pub mod error;
pub mod primitives;
pub mod reporting;
pub mod rng;
pub mod search;
pub mod strategy;

pub use basic::Basic;
pub use config::{
    MAX_STEP_COUNT, Settings, SettingsError, Verbosity, default_settings, set_default_settings,
};
pub use database::{ExampleDatabase, InMemoryDatabase};
pub use error::{BadData, QuarryError, assume};
pub use primitives::{booleans, integers, just, sampled_from};
pub use reporting::{current_verbosity, report, verbose_report, with_reporter, with_verbosity};
pub use search::find;
pub use strategy::{
    BasicStrategy, BoxedStrategy, DynStrategy, SearchStrategy, Simplifier, Simplify, boxed,
    simplifier_fn,
};
