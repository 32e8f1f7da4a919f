//! len(), iter(), next(), repr() and the methods of builtin iterators.

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult, SimpleException},
    function::{CallContext, NativeFunction},
    value::Value,
};

pub(super) const ITERATOR_METHODS: &[NativeFunction] = &[
    NativeFunction::new("__next__", iterator_next),
    NativeFunction::new("__iter__", iterator_iter),
];

pub(super) fn builtin_len(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("len")?;
    let len = ctx.length(&value)?;
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

pub(super) fn builtin_iter(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("iter")?;
    ctx.get_iter(&value)
}

/// `next(iterator[, default])`: the default is returned instead of raising `StopIteration`.
pub(super) fn builtin_next(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (iterator, default) = args.get_one_two_args("next")?;
    match (ctx.advance(&iterator)?, default) {
        (Some(item), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(SimpleException::new(ExcType::StopIteration, None).into()),
    }
}

pub(super) fn builtin_repr(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one_arg("repr")?;
    Ok(Value::str(ctx.to_repr(&value)?))
}

fn iterator_next(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let iterator = args.get_one_arg("__next__")?;
    ctx.advance(&iterator)?
        .ok_or_else(|| SimpleException::new(ExcType::StopIteration, None).into())
}

fn iterator_iter(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    args.get_one_arg("__iter__")
}
