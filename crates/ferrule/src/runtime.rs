//! The runtime context shared by every VM: type registry, builtin types and the builtins
//! namespace.
//!
//! A `Runtime` is `Send + Sync`; independent VMs on different threads may execute against the
//! same runtime. The registry sits behind a reader/writer lock so a type attribute assignment
//! (which also invalidates subclass lookup caches) is atomic with respect to concurrent lookups.

use std::sync::Arc;

use parking_lot::RwLock;
use strum::IntoEnumIterator;

use crate::{
    builtins,
    exception_private::{ExcType, RaisedException, RunResult},
    function::NativeFunction,
    namespace::{Dict, Namespace},
    types::{
        BuiltinType, Instance, TypeId, TypeRegistry,
        mro::linearize,
        r#type::NewType,
    },
    value::Value,
};

/// Everything a VM needs that outlives a single execution.
#[derive(Debug)]
pub struct Runtime {
    types: RwLock<TypeRegistry>,
    builtins: Namespace,
    /// Indexed by `BuiltinType as usize`.
    builtin_ids: Vec<TypeId>,
    /// Indexed by `ExcType as usize`.
    exc_ids: Vec<TypeId>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Builds the builtin type hierarchy and the builtins namespace.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = TypeRegistry::default();

        let mut builtin_ids: Vec<TypeId> = Vec::new();
        for builtin in BuiltinType::iter() {
            let id = registry.next_id();
            let bases: Vec<TypeId> = builtin.parent().map(|p| builtin_ids[p as usize]).into_iter().collect();
            let mut mro = vec![id];
            if let Some(&base) = bases.first() {
                mro.extend_from_slice(registry.mro(base));
            }
            let namespace = native_namespace(builtins::type_methods(builtin));
            registry.insert(
                NewType {
                    name: <&'static str>::from(builtin).into(),
                    bases,
                    namespace,
                    builtin: Some(builtin),
                    exc_type: None,
                },
                mro,
            );
            builtin_ids.push(id);
        }

        let object = builtin_ids[BuiltinType::Object as usize];
        let mut exc_ids: Vec<TypeId> = Vec::new();
        for exc_type in ExcType::iter() {
            let id = registry.next_id();
            let base = exc_type.parent().map_or(object, |p| exc_ids[p as usize]);
            let mut mro = vec![id];
            mro.extend_from_slice(registry.mro(base));
            registry.insert(
                NewType {
                    name: <&'static str>::from(exc_type).into(),
                    bases: vec![base],
                    namespace: Dict::default(),
                    builtin: None,
                    exc_type: Some(exc_type),
                },
                mro,
            );
            exc_ids.push(id);
        }

        let builtins = Namespace::new();
        for function in builtins::FUNCTIONS {
            builtins.set(function.name, Value::Native(*function));
        }
        for builtin in builtins::EXPOSED_TYPES {
            builtins.set(<&'static str>::from(*builtin), Value::Type(builtin_ids[*builtin as usize]));
        }
        for exc_type in ExcType::iter() {
            builtins.set(<&'static str>::from(exc_type), Value::Type(exc_ids[exc_type as usize]));
        }

        Self {
            types: RwLock::new(registry),
            builtins,
            builtin_ids,
            exc_ids,
        }
    }

    /// The `builtins` namespace consulted after module globals.
    #[must_use]
    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    #[must_use]
    pub fn builtin_type(&self, builtin: BuiltinType) -> TypeId {
        self.builtin_ids[builtin as usize]
    }

    #[must_use]
    pub fn exc_type_id(&self, exc_type: ExcType) -> TypeId {
        self.exc_ids[exc_type as usize]
    }

    /// The class of a value.
    #[must_use]
    pub fn type_of(&self, value: &Value) -> TypeId {
        match value {
            Value::Instance(instance) => instance.type_id(),
            other => other
                .builtin_type()
                .map_or_else(|| self.builtin_type(BuiltinType::Object), |b| self.builtin_type(b)),
        }
    }

    #[must_use]
    pub fn type_name(&self, id: TypeId) -> Arc<str> {
        self.types.read().get(id).name().clone()
    }

    /// The builtin type `id` stands for, if it is one (not a subclass of one).
    #[must_use]
    pub fn type_builtin(&self, id: TypeId) -> Option<BuiltinType> {
        self.types.read().get(id).builtin()
    }

    /// Whether `id` was registered by the runtime rather than created by a class statement.
    #[must_use]
    pub fn is_builtin_type(&self, id: TypeId) -> bool {
        let types = self.types.read();
        let class = types.get(id);
        class.builtin().is_some() || class.exc_type().is_some()
    }

    /// Name of a value's class, for error messages.
    #[must_use]
    pub fn value_type_name(&self, value: &Value) -> Arc<str> {
        self.type_name(self.type_of(value))
    }

    #[must_use]
    pub fn bases(&self, id: TypeId) -> Vec<TypeId> {
        self.types.read().get(id).bases().to_vec()
    }

    #[must_use]
    pub fn mro(&self, id: TypeId) -> Vec<TypeId> {
        self.types.read().mro(id).to_vec()
    }

    #[must_use]
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        self.types.read().is_subtype(sub, sup)
    }

    #[must_use]
    pub fn is_instance(&self, value: &Value, id: TypeId) -> bool {
        self.is_subtype(self.type_of(value), id)
    }

    /// Live direct subclasses.
    #[must_use]
    pub fn subclasses(&self, id: TypeId) -> Vec<TypeId> {
        self.types.read().subclasses(id)
    }

    /// Marks a type as no longer reachable, unlinking it from the subclass index.
    pub fn retire_type(&self, id: TypeId) {
        self.types.write().retire(id);
    }

    /// Attribute lookup along the MRO, without descriptor binding.
    #[must_use]
    pub fn lookup_in_type(&self, id: TypeId, name: &str) -> Option<Value> {
        self.types.read().lookup(id, name)
    }

    /// Assigns a class attribute; subclass lookups observe the change immediately.
    pub fn set_type_attr(&self, id: TypeId, name: impl Into<Arc<str>>, value: Value) {
        self.types.write().set_attr(id, name.into(), value);
    }

    pub fn delete_type_attr(&self, id: TypeId, name: &str) -> RunResult<()> {
        let removed = self.types.write().remove_attr(id, name);
        if removed {
            Ok(())
        } else {
            Err(ExcType::attribute_error(&self.type_name(id), name))
        }
    }

    /// The builtin exception class a type is or derives from.
    #[must_use]
    pub fn type_exc_type(&self, id: TypeId) -> Option<ExcType> {
        let types = self.types.read();
        types.mro(id).iter().find_map(|&class| types.get(class).exc_type())
    }

    /// The builtin exception class of an exception instance.
    #[must_use]
    pub fn builtin_exc_type_of(&self, value: &Value) -> Option<ExcType> {
        match value {
            Value::Instance(instance) => self.type_exc_type(instance.type_id()),
            _ => None,
        }
    }

    /// Whether `id` is `BaseException` or one of its subclasses.
    #[must_use]
    pub fn is_exception_type(&self, id: TypeId) -> bool {
        self.is_subtype(id, self.exc_type_id(ExcType::BaseException))
    }

    /// Creates a class from `class name(*bases): namespace`.
    ///
    /// Fails with `TypeError` if a base is not subclassable or the bases admit no consistent MRO;
    /// nothing is registered in that case.
    pub fn create_type(&self, name: &str, bases: &[TypeId], namespace: Dict) -> RunResult<TypeId> {
        let mut types = self.types.write();
        for &base in bases {
            let base_type = types.get(base);
            if let Some(builtin) = base_type.builtin()
                && !builtin.is_subclassable()
            {
                return Err(ExcType::type_error(format_args!(
                    "type '{}' is not an acceptable base type",
                    base_type.name()
                )));
            }
        }
        let this = types.next_id();
        let object = self.builtin_type(BuiltinType::Object);
        let mro = linearize(
            this,
            bases,
            object,
            |base| types.mro(base).to_vec(),
            |id| types.get(id).name().to_string(),
        )?;
        let bases = if bases.is_empty() { vec![object] } else { bases.to_vec() };
        Ok(types.insert(
            NewType {
                name: name.into(),
                bases,
                namespace,
                builtin: None,
                exc_type: None,
            },
            mro,
        ))
    }

    /// A new exception instance of class `id` with the given constructor arguments.
    ///
    /// `StopIteration` instances also carry their first argument as `value`.
    #[must_use]
    pub fn new_exception(&self, id: TypeId, args: Vec<Value>) -> Value {
        let instance = Instance::new(id);
        if self.is_subtype(id, self.exc_type_id(ExcType::StopIteration)) {
            instance.set_attr("value", args.first().cloned().unwrap_or(Value::None));
        }
        instance.set_attr("args", Value::tuple(args));
        Value::Instance(Arc::new(instance))
    }

    /// Materializes a raised exception as an instance.
    #[must_use]
    pub fn exception_value(&self, exc: &RaisedException) -> Value {
        match exc {
            RaisedException::Object(value) => value.clone(),
            RaisedException::Simple(simple) => {
                let args = simple.message().map(|m| vec![Value::str(m)]).unwrap_or_default();
                self.new_exception(self.exc_type_id(simple.exc_type()), args)
            }
        }
    }

    /// `str()` of an exception instance: empty, the single argument, or the argument tuple.
    #[must_use]
    pub fn exception_str(&self, value: &Value) -> String {
        let Value::Instance(instance) = value else {
            return value.py_str(self);
        };
        match instance.get_attr("args") {
            Some(Value::Tuple(args)) => match &*args {
                [] => String::new(),
                [single] => single.py_str(self),
                _ => Value::Tuple(args.clone()).py_repr(self),
            },
            Some(other) => other.py_str(self),
            None => String::new(),
        }
    }
}

fn native_namespace(functions: &[NativeFunction]) -> Dict {
    functions
        .iter()
        .map(|function| (Arc::from(function.name), Value::Native(*function)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_hierarchy_is_registered() {
        let rt = Runtime::new();
        let int = rt.builtin_type(BuiltinType::Int);
        let bool_ = rt.builtin_type(BuiltinType::Bool);
        assert!(rt.is_subtype(bool_, int));
        assert_eq!(&*rt.type_name(rt.type_of(&Value::Bool(true))), "bool");
        let zde = rt.exc_type_id(ExcType::ZeroDivisionError);
        assert!(rt.is_subtype(zde, rt.exc_type_id(ExcType::ArithmeticError)));
        assert!(rt.is_exception_type(zde));
    }

    #[test]
    fn builtin_types_reject_subclassing() {
        let rt = Runtime::new();
        let list = rt.builtin_type(BuiltinType::List);
        let err = rt.create_type("L", &[list], Dict::default()).unwrap_err();
        let exc = err.into_exception(&rt);
        assert_eq!(exc.message(), Some("type 'list' is not an acceptable base type"));
    }

    #[test]
    fn user_exception_classes_resolve_builtin_kind() {
        let rt = Runtime::new();
        let base = rt.exc_type_id(ExcType::ValueError);
        let custom = rt.create_type("MyError", &[base], Dict::default()).unwrap();
        let exc = rt.new_exception(custom, vec![Value::str("boom")]);
        assert_eq!(rt.builtin_exc_type_of(&exc), Some(ExcType::ValueError));
        assert_eq!(rt.exception_str(&exc), "boom");
    }
}
