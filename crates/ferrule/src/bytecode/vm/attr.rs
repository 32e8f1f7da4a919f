//! Attribute access and descriptor binding.
//!
//! Lookup on an instance consults the instance dictionary first, then the class MRO. Class
//! attributes found that way are bound: functions become bound methods, `staticmethod` unwraps,
//! `classmethod` binds to the class and `property` runs its getter. Assignment goes to the
//! instance dictionary unless the class defines a property of that name.

use std::sync::Arc;

use super::VM;
use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::BoundMethod,
    io::PrintWriter,
    resource::ResourceTracker,
    tracer::VmTracer,
    types::TypeId,
    value::Value,
};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// Calls the special method `name` of an instance's class, if the class defines one.
    ///
    /// Returns `None` for values that are not instances and for classes without the method.
    pub(super) fn call_special(&mut self, receiver: &Value, name: &str, args: Vec<Value>) -> RunResult<Option<Value>> {
        self.call_special_args(receiver, name, ArgValues::positional(args))
    }

    pub(super) fn call_special_args(
        &mut self,
        receiver: &Value,
        name: &str,
        args: ArgValues,
    ) -> RunResult<Option<Value>> {
        let Value::Instance(instance) = receiver else {
            return Ok(None);
        };
        let type_id = instance.type_id();
        let Some(method) = self.runtime.lookup_in_type(type_id, name) else {
            return Ok(None);
        };
        let bound = self.bind_descriptor(receiver, type_id, method)?;
        self.call_value(&bound, args).map(Some)
    }

    /// Binds a class attribute found on `type_id` to `receiver`.
    pub(super) fn bind_descriptor(&mut self, receiver: &Value, type_id: TypeId, attr: Value) -> RunResult<Value> {
        match attr {
            Value::Function(_) | Value::Native(_) => Ok(Value::BoundMethod(Arc::new(BoundMethod::new(
                receiver.clone(),
                attr,
            )))),
            Value::StaticMethod(inner) => Ok((*inner).clone()),
            Value::ClassMethod(inner) => Ok(Value::BoundMethod(Arc::new(BoundMethod::new(
                Value::Type(type_id),
                (*inner).clone(),
            )))),
            Value::Property(property) => match &property.getter {
                Some(getter) => self.call_value(getter, ArgValues::one(receiver.clone())),
                None => Err(ExcType::attribute_error_msg("unreadable attribute")),
            },
            other => Ok(other),
        }
    }

    /// `obj.name`
    pub(super) fn load_attr(&mut self, obj: &Value, name: &str) -> RunResult<Value> {
        match obj {
            Value::Instance(instance) => {
                if let Some(value) = instance.get_attr(name) {
                    return Ok(value);
                }
                let type_id = instance.type_id();
                if name == "__class__" {
                    return Ok(Value::Type(type_id));
                }
                if let Some(attr) = self.runtime.lookup_in_type(type_id, name) {
                    return self.bind_descriptor(obj, type_id, attr);
                }
                if let Some(value) = self.call_special(obj, "__getattr__", vec![Value::str(name)])? {
                    return Ok(value);
                }
                Err(ExcType::attribute_error(&self.runtime.type_name(type_id), name))
            }
            Value::Type(id) => self.load_type_attr(*id, name),
            Value::Function(function) if name == "__name__" => Ok(Value::str(function.name())),
            Value::Native(native) if name == "__name__" => Ok(Value::str(native.name)),
            Value::Range(range) => match name {
                "start" => Ok(Value::Int(range.start)),
                "stop" => Ok(Value::Int(range.stop)),
                "step" => Ok(Value::Int(range.step)),
                _ => self.load_builtin_attr(obj, name),
            },
            Value::Slice(slice) => {
                let bound = |b: Option<i64>| b.map_or(Value::None, Value::Int);
                match name {
                    "start" => Ok(bound(slice.start)),
                    "stop" => Ok(bound(slice.stop)),
                    "step" => Ok(bound(slice.step)),
                    _ => self.load_builtin_attr(obj, name),
                }
            }
            _ => self.load_builtin_attr(obj, name),
        }
    }

    /// Methods of builtin values, bound to the receiver.
    fn load_builtin_attr(&mut self, obj: &Value, name: &str) -> RunResult<Value> {
        let type_id = self.runtime.type_of(obj);
        match self.runtime.lookup_in_type(type_id, name) {
            Some(attr) => self.bind_descriptor(obj, type_id, attr),
            None => Err(ExcType::attribute_error(&self.runtime.type_name(type_id), name)),
        }
    }

    /// Attribute access on a class object: functions come back unbound.
    fn load_type_attr(&mut self, id: TypeId, name: &str) -> RunResult<Value> {
        match name {
            "__name__" => return Ok(Value::str(self.runtime.type_name(id))),
            "__bases__" => {
                let bases = self.runtime.bases(id).into_iter().map(Value::Type).collect();
                return Ok(Value::tuple(bases));
            }
            "__mro__" => {
                let mro = self.runtime.mro(id).into_iter().map(Value::Type).collect();
                return Ok(Value::tuple(mro));
            }
            _ => {}
        }
        match self.runtime.lookup_in_type(id, name) {
            Some(Value::ClassMethod(inner)) => Ok(Value::BoundMethod(Arc::new(BoundMethod::new(
                Value::Type(id),
                (*inner).clone(),
            )))),
            Some(Value::StaticMethod(inner)) => Ok((*inner).clone()),
            Some(attr) => Ok(attr),
            None => Err(ExcType::attribute_error_msg(format_args!(
                "type object '{}' has no attribute '{name}'",
                self.runtime.type_name(id)
            ))),
        }
    }

    /// `obj.name = value`
    pub(super) fn store_attr(&mut self, obj: &Value, name: &str, value: Value) -> RunResult<()> {
        match obj {
            Value::Instance(instance) => {
                if let Some(Value::Property(property)) = self.runtime.lookup_in_type(instance.type_id(), name) {
                    let Some(setter) = &property.setter else {
                        return Err(ExcType::attribute_error_msg("can't set attribute"));
                    };
                    self.call_value(setter, ArgValues::positional([obj.clone(), value]))?;
                    return Ok(());
                }
                instance.set_attr(name, value);
                Ok(())
            }
            Value::Type(id) => {
                self.check_mutable_type(*id, name)?;
                self.runtime.set_type_attr(*id, name, value);
                Ok(())
            }
            other => Err(ExcType::attribute_error(&self.runtime.value_type_name(other), name)),
        }
    }

    /// `del obj.name`
    pub(super) fn delete_attr(&mut self, obj: &Value, name: &str) -> RunResult<()> {
        match obj {
            Value::Instance(instance) => {
                let type_id = instance.type_id();
                if let Some(Value::Property(property)) = self.runtime.lookup_in_type(type_id, name) {
                    let Some(deleter) = &property.deleter else {
                        return Err(ExcType::attribute_error_msg("can't delete attribute"));
                    };
                    self.call_value(deleter, ArgValues::one(obj.clone()))?;
                    return Ok(());
                }
                if instance.remove_attr(name) {
                    Ok(())
                } else {
                    Err(ExcType::attribute_error(&self.runtime.type_name(type_id), name))
                }
            }
            Value::Type(id) => {
                self.check_mutable_type(*id, name)?;
                self.runtime.delete_type_attr(*id, name)
            }
            other => Err(ExcType::attribute_error(&self.runtime.value_type_name(other), name)),
        }
    }

    fn check_mutable_type(&self, id: TypeId, name: &str) -> RunResult<()> {
        if self.runtime.is_builtin_type(id) {
            return Err(ExcType::type_error(format_args!(
                "cannot set '{name}' attribute of immutable type '{}'",
                self.runtime.type_name(id)
            )));
        }
        Ok(())
    }
}
