//! The search-strategy protocol.
//!
//! A strategy never hands out values directly. It draws a *template* from a
//! parameter (stable "kind of value") and an RNG (the specific instance),
//! serializes templates to canonical [`Basic`] data, and enumerates shrink
//! moves over templates. Values are only materialized by [`SearchStrategy::reify`].

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use rand::RngCore;

use crate::basic::Basic;
use crate::error::BadData;

/// A named shrink move: maps one template to a lazy sequence of simpler ones
pub trait Simplify<T> {
    /// Human-readable name, used in diagnostics
    fn name(&self) -> String;

    /// Produce candidate simplifications of `template`
    ///
    /// Implementations must not assume `template` is the one the move was
    /// created from; the driver reuses moves across sibling candidates.
    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        template: &T,
    ) -> Box<dyn Iterator<Item = T> + 'a>;
}

/// Shared handle to a shrink move
pub type Simplifier<T> = Rc<dyn Simplify<T>>;

/// A strategy for searching a space of values
pub trait SearchStrategy: Debug + Send + Sync + 'static {
    /// Shape shared by every template drawn during one run
    type Parameter;
    /// Serializable intermediate form
    type Template: Clone + 'static;
    /// Concrete value handed to the code under test
    type Value: 'static;

    /// Draw a parameter
    fn draw_parameter(&self, rng: &mut dyn RngCore) -> Self::Parameter;

    /// Draw a template shaped by `parameter`
    fn draw_template(&self, rng: &mut dyn RngCore, parameter: &Self::Parameter)
    -> Self::Template;

    /// Convert a template into a concrete value
    fn reify(&self, template: &Self::Template) -> Self::Value;

    /// Serialize a template to canonical form
    fn to_basic(&self, template: &Self::Template) -> Basic;

    /// Read a template back from canonical form, validating its structure
    fn from_basic(&self, data: &Basic) -> Result<Self::Template, BadData>;

    /// Shrink moves for `template`, in priority order
    fn simplifiers(
        &self,
        _rng: &mut dyn RngCore,
        _template: &Self::Template,
    ) -> Vec<Simplifier<Self::Template>> {
        Vec::new()
    }

    /// Map reified values through `f`; templates and shrinking are unchanged
    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Value) -> U + Send + Sync + 'static,
        U: 'static,
    {
        Map {
            strategy: self,
            mapper: f,
        }
    }
}

/// A strategy that maps values from one type to another
pub struct Map<S, F> {
    strategy: S,
    mapper: F,
}

impl<S: Debug, F> Debug for Map<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Map").field(&self.strategy).finish()
    }
}

impl<S, F, U> SearchStrategy for Map<S, F>
where
    S: SearchStrategy,
    F: Fn(S::Value) -> U + Send + Sync + 'static,
    U: 'static,
{
    type Parameter = S::Parameter;
    type Template = S::Template;
    type Value = U;

    fn draw_parameter(&self, rng: &mut dyn RngCore) -> Self::Parameter {
        self.strategy.draw_parameter(rng)
    }

    fn draw_template(
        &self,
        rng: &mut dyn RngCore,
        parameter: &Self::Parameter,
    ) -> Self::Template {
        self.strategy.draw_template(rng, parameter)
    }

    fn reify(&self, template: &Self::Template) -> Self::Value {
        (self.mapper)(self.strategy.reify(template))
    }

    fn to_basic(&self, template: &Self::Template) -> Basic {
        self.strategy.to_basic(template)
    }

    fn from_basic(&self, data: &Basic) -> Result<Self::Template, BadData> {
        self.strategy.from_basic(data)
    }

    fn simplifiers(
        &self,
        rng: &mut dyn RngCore,
        template: &Self::Template,
    ) -> Vec<Simplifier<Self::Template>> {
        self.strategy.simplifiers(rng, template)
    }
}

/// A shrink move backed by a closure returning its candidates eagerly
pub struct FnSimplifier<T, F> {
    name: &'static str,
    f: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> Simplify<T> for FnSimplifier<T, F>
where
    T: 'static,
    F: Fn(&mut dyn RngCore, &T) -> Vec<T>,
{
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        template: &T,
    ) -> Box<dyn Iterator<Item = T> + 'a> {
        Box::new((self.f)(rng, template).into_iter())
    }
}

/// Build a shrink move from a closure
pub fn simplifier_fn<T, F>(name: &'static str, f: F) -> Simplifier<T>
where
    T: 'static,
    F: Fn(&mut dyn RngCore, &T) -> Vec<T> + 'static,
{
    Rc::new(FnSimplifier {
        name,
        f,
        _marker: PhantomData,
    })
}

/// A strategy viewed purely through canonical data.
///
/// This is what a run record keeps for each step: enough to validate a
/// payload and to enumerate shrink moves on it, without knowing its types.
pub trait BasicStrategy: Debug + Send + Sync {
    /// Check that `data` is a valid template for this strategy
    fn check_basic(&self, data: &Basic) -> Result<(), BadData>;

    /// Shrink moves on canonical data. Invalid data yields no moves.
    fn basic_simplifiers(&self, rng: &mut dyn RngCore, data: &Basic) -> Vec<Simplifier<Basic>>;
}

/// A type-erased strategy producing values of type `V`
pub trait DynStrategy<V>: BasicStrategy {
    /// Draw a parameter from `parameter_rng`, then a template from
    /// `template_rng`, returning the canonical form and the reified value
    fn draw(&self, parameter_rng: &mut dyn RngCore, template_rng: &mut dyn RngCore) -> (Basic, V);

    /// Reify a value straight from canonical data
    fn reify_basic(&self, data: &Basic) -> Result<V, BadData>;

    /// Forget the value type
    fn as_basic(self: Arc<Self>) -> Arc<dyn BasicStrategy>;
}

/// Shared, type-erased strategy
pub type BoxedStrategy<V> = Arc<dyn DynStrategy<V>>;

/// Erase the template and parameter types of a strategy
pub fn boxed<S: SearchStrategy>(strategy: S) -> BoxedStrategy<S::Value> {
    Arc::new(Erased {
        inner: Arc::new(strategy),
    })
}

struct Erased<S> {
    inner: Arc<S>,
}

impl<S: Debug> Debug for Erased<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl<S: SearchStrategy> BasicStrategy for Erased<S> {
    fn check_basic(&self, data: &Basic) -> Result<(), BadData> {
        self.inner.from_basic(data).map(drop)
    }

    fn basic_simplifiers(&self, rng: &mut dyn RngCore, data: &Basic) -> Vec<Simplifier<Basic>> {
        let Ok(template) = self.inner.from_basic(data) else {
            return Vec::new();
        };
        self.inner
            .simplifiers(rng, &template)
            .into_iter()
            .map(|inner| {
                Rc::new(BasicSimplifier {
                    strategy: self.inner.clone(),
                    inner,
                }) as Simplifier<Basic>
            })
            .collect()
    }
}

impl<S: SearchStrategy> DynStrategy<S::Value> for Erased<S> {
    fn draw(
        &self,
        parameter_rng: &mut dyn RngCore,
        template_rng: &mut dyn RngCore,
    ) -> (Basic, S::Value) {
        let parameter = self.inner.draw_parameter(parameter_rng);
        let template = self.inner.draw_template(template_rng, &parameter);
        (self.inner.to_basic(&template), self.inner.reify(&template))
    }

    fn reify_basic(&self, data: &Basic) -> Result<S::Value, BadData> {
        self.inner.from_basic(data).map(|t| self.inner.reify(&t))
    }

    fn as_basic(self: Arc<Self>) -> Arc<dyn BasicStrategy> {
        self
    }
}

/// Lifts a template-level move to canonical data
struct BasicSimplifier<S: SearchStrategy> {
    strategy: Arc<S>,
    inner: Simplifier<S::Template>,
}

impl<S: SearchStrategy> Simplify<Basic> for BasicSimplifier<S> {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn simplify<'a>(
        &'a self,
        rng: &'a mut dyn RngCore,
        data: &Basic,
    ) -> Box<dyn Iterator<Item = Basic> + 'a> {
        match self.strategy.from_basic(data) {
            Ok(template) => Box::new(
                self.inner
                    .simplify(rng, &template)
                    .map(move |t| self.strategy.to_basic(&t)),
            ),
            Err(_) => Box::new(std::iter::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::integers;
    use crate::rng::seeded_rng;
    use serde_json::json;

    #[test]
    fn test_map_keeps_templates() {
        let strategy = integers(0i64, 10).map(|x| x * 2);
        let mut rng = seeded_rng(1);
        let parameter = strategy.draw_parameter(&mut rng);
        let template = strategy.draw_template(&mut rng, &parameter);

        assert_eq!(strategy.reify(&template), template * 2);
        assert_eq!(strategy.from_basic(&strategy.to_basic(&template)), Ok(template));
    }

    #[test]
    fn test_boxed_draw_is_seed_addressable() {
        let strategy = boxed(integers(-1000i64, 1000));
        let first = strategy.draw(&mut seeded_rng(3), &mut seeded_rng(9));
        let second = strategy.draw(&mut seeded_rng(3), &mut seeded_rng(9));
        assert_eq!(first, second);
        assert_eq!(strategy.reify_basic(&first.0), Ok(first.1));
    }

    #[test]
    fn test_boxed_rejects_bad_data() {
        let strategy = boxed(integers(0i64, 10));
        assert!(strategy.reify_basic(&json!("nope")).is_err());
        assert!(strategy.check_basic(&json!(11)).is_err());
        assert!(strategy.check_basic(&json!(4)).is_ok());
    }

    #[test]
    fn test_basic_simplifiers_round_trip() {
        let strategy = boxed(integers(0i64, 100));
        let mut rng = seeded_rng(0);
        let moves = strategy.basic_simplifiers(&mut rng, &json!(40));
        assert!(!moves.is_empty());

        let candidates: Vec<Basic> = moves[0].simplify(&mut rng, &json!(40)).collect();
        assert_eq!(candidates.first(), Some(&json!(0)));
        assert!(candidates.iter().all(|c| strategy.check_basic(c).is_ok()));

        // A move reused on data it cannot read yields nothing
        assert_eq!(moves[0].simplify(&mut rng, &json!([1])).count(), 0);
        assert!(strategy.basic_simplifiers(&mut rng, &json!(null)).is_empty());
    }
}
