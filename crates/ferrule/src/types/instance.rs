use parking_lot::RwLock;

use crate::{namespace::Dict, types::TypeId, value::Value};

/// An instance of a user-defined class or an exception class.
#[derive(Debug)]
pub struct Instance {
    type_id: TypeId,
    attrs: RwLock<Dict>,
}

impl Instance {
    #[must_use]
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            attrs: RwLock::new(Dict::default()),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.read().get(name).cloned()
    }

    pub fn set_attr(&self, name: &str, value: Value) {
        self.attrs.write().insert(name.into(), value);
    }

    /// Removes an attribute, returning whether it was present.
    pub fn remove_attr(&self, name: &str) -> bool {
        self.attrs.write().shift_remove(name).is_some()
    }

    /// Copy of the instance dictionary.
    #[must_use]
    pub fn attrs(&self) -> Dict {
        self.attrs.read().clone()
    }
}
