//! Type objects and the registry that owns them.
//!
//! Types live in an arena addressed by stable [`TypeId`]s. Each type records its direct bases,
//! its MRO, and its namespace; the registry additionally keeps a reverse index from a base to its
//! direct subclasses so namespace changes can invalidate the lookup caches of every descendant.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{exception_private::ExcType, namespace::Dict, types::BuiltinType, value::Value};

/// Stable handle of a type in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A class: builtin, exception or user-defined.
#[derive(Debug)]
pub struct TypeObject {
    name: Arc<str>,
    bases: Vec<TypeId>,
    mro: Vec<TypeId>,
    namespace: Dict,
    subclasses: Vec<TypeId>,
    alive: bool,
    builtin: Option<BuiltinType>,
    exc_type: Option<ExcType>,
    /// Memoized MRO lookups, including misses.
    cache: Mutex<AHashMap<Arc<str>, Option<Value>>>,
}

impl TypeObject {
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn bases(&self) -> &[TypeId] {
        &self.bases
    }

    /// Method resolution order, starting with the type itself.
    #[must_use]
    pub fn mro(&self) -> &[TypeId] {
        &self.mro
    }

    #[must_use]
    pub fn namespace(&self) -> &Dict {
        &self.namespace
    }

    #[must_use]
    pub fn builtin(&self) -> Option<BuiltinType> {
        self.builtin
    }

    /// The builtin exception class this type is, if it is one.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        self.exc_type
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Parameters for registering a new type.
#[derive(Debug)]
pub(crate) struct NewType {
    pub name: Arc<str>,
    pub bases: Vec<TypeId>,
    pub namespace: Dict,
    pub builtin: Option<BuiltinType>,
    pub exc_type: Option<ExcType>,
}

/// Arena of all types known to a runtime.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<TypeObject>,
}

impl TypeRegistry {
    /// Id the next inserted type will receive.
    #[must_use]
    pub fn next_id(&self) -> TypeId {
        TypeId(u32::try_from(self.types.len()).unwrap_or(u32::MAX))
    }

    /// Registers a type whose MRO has already been computed, updating the subclass index.
    pub(crate) fn insert(&mut self, new: NewType, mro: Vec<TypeId>) -> TypeId {
        let id = self.next_id();
        for &base in &new.bases {
            self.types[base.index()].subclasses.push(id);
        }
        self.types.push(TypeObject {
            name: new.name,
            bases: new.bases,
            mro,
            namespace: new.namespace,
            subclasses: Vec::new(),
            alive: true,
            builtin: new.builtin,
            exc_type: new.exc_type,
            cache: Mutex::new(AHashMap::new()),
        });
        id
    }

    #[must_use]
    pub fn get(&self, id: TypeId) -> &TypeObject {
        &self.types[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolves `name` along the MRO of `id`.
    pub fn lookup(&self, id: TypeId, name: &str) -> Option<Value> {
        let ty = self.get(id);
        if let Some(hit) = ty.cache.lock().get(name) {
            return hit.clone();
        }
        let found = ty
            .mro
            .iter()
            .find_map(|&class| self.get(class).namespace.get(name).cloned());
        ty.cache.lock().insert(name.into(), found.clone());
        found
    }

    /// Sets an attribute in the type's own namespace and invalidates dependent caches.
    pub fn set_attr(&mut self, id: TypeId, name: Arc<str>, value: Value) {
        self.invalidate(id, &name);
        self.types[id.index()].namespace.insert(name, value);
    }

    /// Removes an attribute from the type's own namespace, returning whether it existed.
    pub fn remove_attr(&mut self, id: TypeId, name: &str) -> bool {
        self.invalidate(id, name);
        self.types[id.index()].namespace.shift_remove(name).is_some()
    }

    /// Drops the cached lookup of `name` in `id` and all of its transitive subclasses.
    fn invalidate(&self, id: TypeId, name: &str) {
        let mut visited = AHashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let ty = self.get(current);
            ty.cache.lock().remove(name);
            pending.extend(ty.subclasses.iter().copied());
        }
    }

    /// Live direct subclasses of `id`.
    #[must_use]
    pub fn subclasses(&self, id: TypeId) -> Vec<TypeId> {
        self.get(id)
            .subclasses
            .iter()
            .copied()
            .filter(|&sub| self.get(sub).alive)
            .collect()
    }

    /// Marks a type as dead.
    ///
    /// The slot is kept so outstanding ids stay valid; instances of a retired type still work.
    /// The type stays linked under its bases so invalidation still reaches it and the live
    /// subclasses below it; [`subclasses`](Self::subclasses) hides it.
    pub fn retire(&mut self, id: TypeId) {
        self.types[id.index()].alive = false;
    }

    /// Whether `sub` has `sup` in its MRO.
    #[must_use]
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        sub == sup || self.get(sub).mro.contains(&sup)
    }

    #[must_use]
    pub fn mro(&self, id: TypeId) -> &[TypeId] {
        &self.get(id).mro
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(registry: &mut TypeRegistry, name: &str, bases: &[TypeId]) -> TypeId {
        let id = registry.next_id();
        let mut mro = vec![id];
        for &base in bases {
            for &class in registry.mro(base) {
                if !mro.contains(&class) {
                    mro.push(class);
                }
            }
        }
        registry.insert(
            NewType {
                name: name.into(),
                bases: bases.to_vec(),
                namespace: Dict::default(),
                builtin: None,
                exc_type: None,
            },
            mro,
        )
    }

    #[test]
    fn assignment_invalidates_subclass_caches() {
        let mut registry = TypeRegistry::default();
        let base = add(&mut registry, "Base", &[]);
        let mid = add(&mut registry, "Mid", &[base]);
        let leaf = add(&mut registry, "Leaf", &[mid]);

        assert!(registry.lookup(leaf, "x").is_none());
        registry.set_attr(base, "x".into(), Value::Int(1));
        assert_eq!(registry.lookup(leaf, "x"), Some(Value::Int(1)));

        registry.set_attr(mid, "x".into(), Value::Int(2));
        assert_eq!(registry.lookup(leaf, "x"), Some(Value::Int(2)));
        assert_eq!(registry.lookup(base, "x"), Some(Value::Int(1)));

        assert!(registry.remove_attr(mid, "x"));
        assert_eq!(registry.lookup(leaf, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn retired_types_leave_the_subclass_index() {
        let mut registry = TypeRegistry::default();
        let base = add(&mut registry, "Base", &[]);
        let a = add(&mut registry, "A", &[base]);
        let b = add(&mut registry, "B", &[base]);
        assert_eq!(registry.subclasses(base), vec![a, b]);
        registry.retire(a);
        assert_eq!(registry.subclasses(base), vec![b]);
        assert!(!registry.get(a).is_alive());
        assert!(registry.is_subtype(a, base));
    }
}
