//! Leaf strategies: integers, booleans, constants and sampling.
//!
//! These exist to feed rule arguments and tests; each one simplifies toward
//! its "simplest" value (zero, `false`, the first element).

use std::fmt::Debug;

use num_traits::{FromPrimitive, PrimInt, ToPrimitive};
use rand::distributions::uniform::SampleUniform;
use rand::{Rng, RngCore};

use crate::basic::{Basic, check_bool, check_integer, integer_to_basic};
use crate::error::BadData;
use crate::strategy::{SearchStrategy, Simplifier, simplifier_fn};

/// Magnitude of the window drawn from when an integer parameter favors small values
const SMALL_WINDOW: i128 = 16;

/// Integers drawn uniformly from an inclusive range
#[derive(Debug, Clone, Copy)]
pub struct Integers<T> {
    start: T,
    end: T,
}

/// Create a strategy for integers in `start..=end`
///
/// # Panics
///
/// Panics if `start > end`.
pub fn integers<T>(start: T, end: T) -> Integers<T>
where
    T: PrimInt + Debug,
{
    assert!(start <= end, "integers({:?}, {:?}): empty range", start, end);
    Integers { start, end }
}

impl<T> Integers<T>
where
    T: PrimInt + ToPrimitive,
{
    fn bounds(&self) -> (i128, i128) {
        (
            self.start.to_i128().unwrap_or(i128::MIN),
            self.end.to_i128().unwrap_or(i128::MAX),
        )
    }

    /// Zero when in range, otherwise the bound closest to it
    fn simplest(&self) -> i128 {
        let (lo, hi) = self.bounds();
        0i128.clamp(lo, hi)
    }
}

impl<T> SearchStrategy for Integers<T>
where
    T: PrimInt + ToPrimitive + FromPrimitive + SampleUniform + Debug + Send + Sync + 'static,
{
    /// Whether to favor small magnitudes for this run
    type Parameter = bool;
    type Template = T;
    type Value = T;

    fn draw_parameter(&self, rng: &mut dyn RngCore) -> bool {
        rng.gen_bool(0.5)
    }

    fn draw_template(&self, rng: &mut dyn RngCore, small: &bool) -> T {
        if *small {
            let (lo, hi) = self.bounds();
            let lo = lo.max(-SMALL_WINDOW);
            let hi = hi.min(SMALL_WINDOW);
            if lo <= hi {
                return T::from_i128(rng.gen_range(lo..=hi)).unwrap_or(self.start);
            }
        }
        rng.gen_range(self.start..=self.end)
    }

    fn reify(&self, template: &T) -> T {
        *template
    }

    fn to_basic(&self, template: &T) -> Basic {
        integer_to_basic(template.to_i128().unwrap_or_default())
    }

    fn from_basic(&self, data: &Basic) -> Result<T, BadData> {
        let value = check_integer(data)?;
        let (lo, hi) = self.bounds();
        if value < lo || value > hi {
            return Err(BadData::new(format!(
                "{} outside of range [{}, {}]",
                value, lo, hi
            )));
        }
        T::from_i128(value).ok_or_else(|| BadData::new(format!("{} does not fit", value)))
    }

    fn simplifiers(&self, _rng: &mut dyn RngCore, _template: &T) -> Vec<Simplifier<T>> {
        let target = self.simplest();
        vec![simplifier_fn("shrink_integer", move |_rng, value: &T| {
            value
                .to_i128()
                .map(|v| shrink_towards(v, target))
                .unwrap_or_default()
                .into_iter()
                .filter_map(T::from_i128)
                .collect()
        })]
    }
}

/// Candidates strictly between `value` and `target` (inclusive of target),
/// most aggressive first
fn shrink_towards(value: i128, target: i128) -> Vec<i128> {
    if value == target {
        return Vec::new();
    }
    let mut candidates = vec![target];
    let mut distance = (value - target) / 2;
    while distance != 0 {
        let candidate = value - distance;
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
        distance /= 2;
    }
    candidates
}

/// Booleans with a per-run bias
#[derive(Debug, Clone, Copy, Default)]
pub struct Booleans;

/// Create a strategy for booleans
pub fn booleans() -> Booleans {
    Booleans
}

impl SearchStrategy for Booleans {
    /// Probability of `true`
    type Parameter = f64;
    type Template = bool;
    type Value = bool;

    fn draw_parameter(&self, rng: &mut dyn RngCore) -> f64 {
        rng.gen_range(0.0..1.0)
    }

    fn draw_template(&self, rng: &mut dyn RngCore, probability: &f64) -> bool {
        rng.gen_bool(*probability)
    }

    fn reify(&self, template: &bool) -> bool {
        *template
    }

    fn to_basic(&self, template: &bool) -> Basic {
        Basic::Bool(*template)
    }

    fn from_basic(&self, data: &Basic) -> Result<bool, BadData> {
        check_bool(data)
    }

    fn simplifiers(&self, _rng: &mut dyn RngCore, _template: &bool) -> Vec<Simplifier<bool>> {
        vec![simplifier_fn("shrink_bool", |_rng, value: &bool| {
            if *value { vec![false] } else { Vec::new() }
        })]
    }
}

/// A strategy that always produces the same value
#[derive(Debug, Clone)]
pub struct Just<T> {
    value: T,
}

/// Create a strategy that always produces `value`
pub fn just<T>(value: T) -> Just<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    Just { value }
}

impl<T> SearchStrategy for Just<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    type Parameter = ();
    type Template = ();
    type Value = T;

    fn draw_parameter(&self, _rng: &mut dyn RngCore) {}

    fn draw_template(&self, _rng: &mut dyn RngCore, _parameter: &()) {}

    fn reify(&self, _template: &()) -> T {
        self.value.clone()
    }

    fn to_basic(&self, _template: &()) -> Basic {
        Basic::Null
    }

    fn from_basic(&self, data: &Basic) -> Result<(), BadData> {
        if data.is_null() {
            Ok(())
        } else {
            Err(BadData::new(format!("expected null but got {}", data)))
        }
    }
}

/// Uniform choice among a fixed list of values
#[derive(Debug, Clone)]
pub struct SampledFrom<T> {
    values: Vec<T>,
}

/// Create a strategy choosing among `values`
///
/// # Panics
///
/// Panics if `values` is empty.
pub fn sampled_from<T>(values: Vec<T>) -> SampledFrom<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    assert!(!values.is_empty(), "sampled_from requires at least one value");
    SampledFrom { values }
}

impl<T> SearchStrategy for SampledFrom<T>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    type Parameter = ();
    type Template = usize;
    type Value = T;

    fn draw_parameter(&self, _rng: &mut dyn RngCore) {}

    fn draw_template(&self, rng: &mut dyn RngCore, _parameter: &()) -> usize {
        rng.gen_range(0..self.values.len())
    }

    fn reify(&self, template: &usize) -> T {
        self.values[*template].clone()
    }

    fn to_basic(&self, template: &usize) -> Basic {
        Basic::from(*template)
    }

    fn from_basic(&self, data: &Basic) -> Result<usize, BadData> {
        let index = check_integer(data)?;
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.values.len())
            .ok_or_else(|| {
                BadData::new(format!(
                    "index {} out of range for {} values",
                    index,
                    self.values.len()
                ))
            })
    }

    fn simplifiers(&self, _rng: &mut dyn RngCore, _template: &usize) -> Vec<Simplifier<usize>> {
        vec![simplifier_fn("shrink_index", |_rng, index: &usize| {
            shrink_index(*index)
        })]
    }
}

/// Earlier indices, most aggressive first
pub fn shrink_index(index: usize) -> Vec<usize> {
    shrink_towards(index as i128, 0)
        .into_iter()
        .filter_map(|i| usize::try_from(i).ok())
        .collect()
}
