//! Implementation of the isinstance() and issubclass() builtin functions.

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::CallContext,
    runtime::Runtime,
    types::TypeId,
    value::Value,
};

/// Implementation of the isinstance() builtin function.
///
/// `classinfo` is a class or a (possibly nested) tuple of classes; the check walks the MRO of
/// the object's class, so instances of subclasses match their bases.
pub(super) fn builtin_isinstance(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (obj, classinfo) = args.get_two_args("isinstance")?;
    let runtime = ctx.runtime();
    let class = runtime.type_of(&obj);
    match subclass_check(runtime, class, &classinfo) {
        Some(result) => Ok(Value::Bool(result)),
        None => Err(ExcType::type_error(
            "isinstance() arg 2 must be a type or tuple of types",
        )),
    }
}

/// Implementation of the issubclass() builtin function.
pub(super) fn builtin_issubclass(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (cls, classinfo) = args.get_two_args("issubclass")?;
    let Value::Type(class) = cls else {
        return Err(ExcType::type_error("issubclass() arg 1 must be a class"));
    };
    match subclass_check(ctx.runtime(), class, &classinfo) {
        Some(result) => Ok(Value::Bool(result)),
        None => Err(ExcType::type_error(
            "issubclass() arg 2 must be a class or tuple of classes",
        )),
    }
}

/// `None` when `classinfo` contains something other than classes.
fn subclass_check(runtime: &Runtime, class: TypeId, classinfo: &Value) -> Option<bool> {
    match classinfo {
        Value::Type(id) => Some(runtime.is_subtype(class, *id)),
        Value::Tuple(items) => {
            let mut found = false;
            for item in items.iter() {
                found |= subclass_check(runtime, class, item)?;
            }
            Some(found)
        }
        _ => None,
    }
}
