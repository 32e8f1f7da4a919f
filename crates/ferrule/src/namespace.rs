use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::value::Value;

/// Insertion-ordered string-keyed map used for dicts, type namespaces and instance attributes.
pub type Dict = IndexMap<Arc<str>, Value, ahash::RandomState>;

/// A shared, mutable name table: module globals, the builtins module, class-body locals.
///
/// Cloning shares the table; all functions defined in a module see the same globals.
#[derive(Debug, Clone, Default)]
pub struct Namespace(Arc<RwLock<Dict>>);

impl Namespace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<Arc<str>>, value: Value) {
        self.0.write().insert(name.into(), value);
    }

    /// Removes a binding, returning the old value.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.write().shift_remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.read().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Copy of the current bindings.
    #[must_use]
    pub fn snapshot(&self) -> Dict {
        self.0.read().clone()
    }

    /// Whether both handles refer to the same table.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Dict> for Namespace {
    fn from(dict: Dict) -> Self {
        Self(Arc::new(RwLock::new(dict)))
    }
}
