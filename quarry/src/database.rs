//! Example database interface.
//!
//! Minimal examples are stored in canonical form under a key derived from the
//! strategy that produced them, so a later search can start from a known
//! failure. Storage engines live outside this crate; an in-memory backend is
//! provided for tests and process-local reuse.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use crate::basic::Basic;

/// Storage for canonical examples, keyed by strategy
pub trait ExampleDatabase: Debug + Send + Sync {
    /// Save a value under `key`. Saving an existing value is a no-op.
    fn save(&self, key: &str, value: &Basic);

    /// Fetch every value stored under `key`
    fn fetch(&self, key: &str) -> Vec<Basic>;

    /// Remove a value stored under `key`
    fn delete(&self, key: &str, value: &Basic);
}

/// Process-local example database
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    data: Mutex<HashMap<String, Vec<Basic>>>,
}

impl InMemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with at least one stored value
    pub fn len(&self) -> usize {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|values| !values.is_empty())
            .count()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExampleDatabase for InMemoryDatabase {
    fn save(&self, key: &str, value: &Basic) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let values = data.entry(key.to_string()).or_default();
        if !values.contains(value) {
            values.push(value.clone());
        }
    }

    fn fetch(&self, key: &str) -> Vec<Basic> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn delete(&self, key: &str, value: &Basic) {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(values) = data.get_mut(key) {
            values.retain(|stored| stored != value);
        }
    }
}
