//! Process-wide, per-type cache.
//!
//! Rule sets and test cases are built once for each concrete machine type
//! and live for the rest of the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

type Entries = HashMap<(TypeId, TypeId), &'static (dyn Any + Send + Sync)>;

static REGISTRY: OnceLock<Mutex<Entries>> = OnceLock::new();

/// Return the `T` cached for owner type `K`, building it with `init` on first use.
///
/// `init` runs without the registry lock held, so it may itself consult the
/// registry. If two threads race, the first value stored wins.
pub fn cached<K: 'static, T: Any + Send + Sync>(init: impl FnOnce() -> T) -> &'static T {
    let registry = REGISTRY.get_or_init(Default::default);
    let key = (TypeId::of::<K>(), TypeId::of::<T>());

    let existing = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .copied();
    let entry = match existing {
        Some(entry) => entry,
        None => {
            let value = init();
            *registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert_with(|| Box::leak(Box::new(value)))
        }
    };

    match entry.downcast_ref::<T>() {
        Some(value) => value,
        None => unreachable!("registry entries are keyed by their own type"),
    }
}
