//! getattr(), setattr() and hasattr().

use std::sync::Arc;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::CallContext,
    value::Value,
};

pub(super) fn builtin_getattr(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let positional = args.into_positional("getattr")?;
    let (obj, name, default) = match <[Value; 3]>::try_from(positional) {
        Ok([obj, name, default]) => (obj, name, Some(default)),
        Err(positional) => match <[Value; 2]>::try_from(positional) {
            Ok([obj, name]) => (obj, name, None),
            Err(positional) => {
                return Err(ExcType::type_error(format_args!(
                    "getattr expected 2 or 3 arguments, got {}",
                    positional.len()
                )));
            }
        },
    };
    let name = attr_name(&name)?;
    match (ctx.get_attr(&obj, &name), default) {
        (Err(err), Some(default)) if err.is_exc(ctx.runtime(), ExcType::AttributeError) => Ok(default),
        (result, _) => result,
    }
}

pub(super) fn builtin_setattr(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let positional = args.into_positional("setattr")?;
    let count = positional.len();
    let Ok([obj, name, value]) = <[Value; 3]>::try_from(positional) else {
        return Err(ExcType::type_error(format_args!(
            "setattr expected 3 arguments, got {count}"
        )));
    };
    let name = attr_name(&name)?;
    ctx.set_attr(&obj, &name, value)?;
    Ok(Value::None)
}

pub(super) fn builtin_hasattr(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (obj, name) = args.get_two_args("hasattr")?;
    let name = attr_name(&name)?;
    match ctx.get_attr(&obj, &name) {
        Ok(_) => Ok(Value::Bool(true)),
        Err(err) if err.is_exc(ctx.runtime(), ExcType::AttributeError) => Ok(Value::Bool(false)),
        Err(err) => Err(err),
    }
}

fn attr_name(name: &Value) -> RunResult<Arc<str>> {
    match name {
        Value::Str(s) => Ok(s.clone()),
        _ => Err(ExcType::type_error("attribute name must be string")),
    }
}
