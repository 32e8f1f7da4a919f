//! Implementation of the print() builtin function.

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::CallContext,
    value::Value,
};

/// Implementation of the print() builtin function.
///
/// Supports the `sep` and `end` keyword arguments; `None` selects the defaults (a space and a
/// newline). Each positional argument is converted with `str()` before anything is written.
pub(super) fn builtin_print(ctx: &mut dyn CallContext, mut args: ArgValues) -> RunResult<Value> {
    let sep = text_option(ctx, args.take_keyword("sep"), "sep")?;
    let end = text_option(ctx, args.take_keyword("end"), "end")?;
    if let Some((name, _)) = args.keywords.first() {
        return Err(ExcType::type_error(format_args!(
            "'{name}' is an invalid keyword argument for print()"
        )));
    }

    let mut parts = Vec::with_capacity(args.count());
    for value in &args.positional {
        parts.push(ctx.to_str(value)?);
    }
    ctx.print(&parts, sep.as_deref().unwrap_or(" "), end.as_deref().unwrap_or("\n"))?;
    Ok(Value::None)
}

fn text_option(ctx: &dyn CallContext, value: Option<Value>, name: &str) -> RunResult<Option<String>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.to_string())),
        Some(other) => Err(ExcType::type_error(format_args!(
            "{name} must be None or a string, not {}",
            ctx.runtime().value_type_name(&other)
        ))),
    }
}
