//! `property.getter`, `property.setter` and `property.deleter`.
//!
//! Each returns a copy of the property with one accessor replaced, so the decorator forms
//! `@x.setter` rebind the class attribute to a property that carries both functions.

use std::sync::Arc;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::{CallContext, NativeFunction, Property},
    value::Value,
};

pub(super) const METHODS: &[NativeFunction] = &[
    NativeFunction::new("getter", property_getter),
    NativeFunction::new("setter", property_setter),
    NativeFunction::new("deleter", property_deleter),
];

fn property_getter(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    replace_accessor(args, "getter", |property, function| property.getter = Some(function))
}

fn property_setter(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    replace_accessor(args, "setter", |property, function| property.setter = Some(function))
}

fn property_deleter(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    replace_accessor(args, "deleter", |property, function| property.deleter = Some(function))
}

fn replace_accessor(args: ArgValues, name: &str, apply: fn(&mut Property, Value)) -> RunResult<Value> {
    let (receiver, function) = args.get_two_args(name)?;
    let Value::Property(property) = receiver else {
        return Err(ExcType::type_error(format_args!(
            "descriptor '{name}' requires a 'property' object"
        )));
    };
    let mut updated = (*property).clone();
    apply(&mut updated, function);
    Ok(Value::Property(Arc::new(updated)))
}
