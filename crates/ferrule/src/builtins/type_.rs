//! Constructors of the builtin types, reached by calling a builtin type object.

use std::sync::Arc;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::{CallContext, Property},
    namespace::Dict,
    types::{BuiltinType, Range, SliceValue, TypeId, bytes, dict},
    value::{Value, str_repr},
};

/// `int(...)`, `list(...)`, `type(...)` and friends.
pub(crate) fn construct(ctx: &mut dyn CallContext, builtin: BuiltinType, args: ArgValues) -> RunResult<Value> {
    match builtin {
        BuiltinType::Int => construct_int(args),
        BuiltinType::Float => construct_float(args),
        BuiltinType::Bool => match args.get_zero_one_arg("bool")? {
            Some(value) => Ok(Value::Bool(ctx.is_truthy(&value)?)),
            None => Ok(Value::Bool(false)),
        },
        BuiltinType::Str => match args.get_zero_one_arg("str")? {
            Some(value) => Ok(Value::str(ctx.to_str(&value)?)),
            None => Ok(Value::str("")),
        },
        BuiltinType::Bytes => {
            let source = args.get_zero_one_arg("bytes")?;
            bytes::construct(ctx, source, false)
        }
        BuiltinType::ByteArray => {
            let source = args.get_zero_one_arg("bytearray")?;
            bytes::construct(ctx, source, true)
        }
        BuiltinType::Tuple | BuiltinType::List => {
            let items = match args.get_zero_one_arg(<&'static str>::from(builtin))? {
                Some(iterable) => ctx.collect(&iterable)?,
                None => Vec::new(),
            };
            ctx.track_allocation()?;
            Ok(if builtin == BuiltinType::Tuple {
                Value::tuple(items)
            } else {
                Value::list(items)
            })
        }
        BuiltinType::Dict => construct_dict(ctx, args),
        BuiltinType::Range => construct_range(ctx, args),
        BuiltinType::Slice => construct_slice(ctx, args),
        BuiltinType::StaticMethod => {
            let function = args.get_one_arg("staticmethod")?;
            Ok(Value::StaticMethod(Arc::new(function)))
        }
        BuiltinType::ClassMethod => {
            let function = args.get_one_arg("classmethod")?;
            Ok(Value::ClassMethod(Arc::new(function)))
        }
        BuiltinType::Property => construct_property(args),
        BuiltinType::Type => construct_type(ctx, args),
        BuiltinType::NoneType => {
            args.check_zero_args("NoneType")?;
            Ok(Value::None)
        }
        other => Err(ExcType::type_error(format_args!("cannot create '{other}' instances"))),
    }
}

fn construct_int(args: ArgValues) -> RunResult<Value> {
    let (value, base) = args.get_zero_one_two_args("int")?;
    let Some(value) = value else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = base {
        let Value::Str(text) = &value else {
            return Err(ExcType::type_error("int() can't convert non-string with explicit base"));
        };
        let radix = base
            .as_int()
            .and_then(|b| u32::try_from(b).ok())
            .filter(|b| (2..=36).contains(b))
            .ok_or_else(|| ExcType::value_error("int() base must be >= 2 and <= 36"))?;
        return parse_int(text, radix);
    }
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(ExcType::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() {
                return Err(ExcType::overflow_error("cannot convert float infinity to integer"));
            }
            let truncated = f.trunc();
            if truncated < -9.223_372_036_854_776e18 || truncated >= 9.223_372_036_854_776e18 {
                return Err(ExcType::overflow_error("int too large to convert"));
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::Str(text) => parse_int(&text, 10),
        other => Err(ExcType::type_error(format_args!(
            "int() argument must be a string or a number, not '{}'",
            other.builtin_type().map_or("object", <&'static str>::from)
        ))),
    }
}

fn parse_int(text: &str, radix: u32) -> RunResult<Value> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    i64::from_str_radix(&cleaned, radix).map(Value::Int).map_err(|_| {
        ExcType::value_error(format_args!(
            "invalid literal for int() with base {radix}: {}",
            str_repr(text)
        ))
    })
}

fn construct_float(args: ArgValues) -> RunResult<Value> {
    let Some(value) = args.get_zero_one_arg("float")? else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(b)))),
        Value::Str(text) => text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ExcType::value_error(format_args!("could not convert string to float: {}", str_repr(&text)))
        }),
        other => Err(ExcType::type_error(format_args!(
            "float() argument must be a string or a number, not '{}'",
            other.builtin_type().map_or("object", <&'static str>::from)
        ))),
    }
}

fn construct_dict(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let ArgValues { positional, keywords } = args;
    if positional.len() > 1 {
        return Err(ExcType::type_error(format_args!(
            "dict expected at most 1 argument, got {}",
            positional.len()
        )));
    }
    let mut entries = Dict::default();
    if let Some(source) = positional.first() {
        entries.extend(dict::entries_from(ctx, source)?);
    }
    entries.extend(keywords);
    ctx.track_allocation()?;
    Ok(Value::dict(entries))
}

fn construct_range(ctx: &dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let bounds = args.into_positional("range")?;
    let int = |value: &Value| {
        value.as_int().ok_or_else(|| {
            ExcType::type_error(format_args!(
                "'{}' object cannot be interpreted as an integer",
                ctx.runtime().value_type_name(value)
            ))
        })
    };
    let range = match bounds.as_slice() {
        [stop] => Range::new(0, int(stop)?, 1)?,
        [start, stop] => Range::new(int(start)?, int(stop)?, 1)?,
        [start, stop, step] => Range::new(int(start)?, int(stop)?, int(step)?)?,
        [] => return Err(ExcType::type_error("range expected at least 1 argument, got 0")),
        more => {
            return Err(ExcType::type_error(format_args!(
                "range expected at most 3 arguments, got {}",
                more.len()
            )));
        }
    };
    Ok(Value::Range(range))
}

fn construct_slice(ctx: &dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let bounds = args.into_positional("slice")?;
    let bound = |value: &Value| match value {
        Value::None => Ok(None),
        other => other.as_int().map(Some).ok_or_else(|| {
            ExcType::type_error(format_args!(
                "slice indices must be integers or None, not '{}'",
                ctx.runtime().value_type_name(other)
            ))
        }),
    };
    let slice = match bounds.as_slice() {
        [stop] => SliceValue::new(None, bound(stop)?, None),
        [start, stop] => SliceValue::new(bound(start)?, bound(stop)?, None),
        [start, stop, step] => SliceValue::new(bound(start)?, bound(stop)?, bound(step)?),
        other => {
            return Err(ExcType::type_error(format_args!(
                "slice expected 1 to 3 arguments, got {}",
                other.len()
            )));
        }
    };
    Ok(Value::Slice(slice))
}

/// `property(fget=None, fset=None, fdel=None, doc=None)`
fn construct_property(mut args: ArgValues) -> RunResult<Value> {
    let mut slots: [Option<Value>; 3] = [None, None, None];
    for (slot, name) in slots.iter_mut().zip(["fget", "fset", "fdel"]) {
        *slot = args.take_keyword(name);
    }
    // the docstring is accepted and dropped
    args.take_keyword("doc");
    args.check_no_kwargs("property")?;
    if args.count() > 4 {
        return Err(ExcType::type_error(format_args!(
            "property expected at most 4 arguments, got {}",
            args.count()
        )));
    }
    for (slot, value) in slots.iter_mut().zip(args.positional) {
        if slot.is_some() {
            return Err(ExcType::type_error("property() got multiple values for an accessor"));
        }
        *slot = Some(value);
    }
    let [getter, setter, deleter] = slots.map(|slot| slot.filter(|value| !value.is_none()));
    Ok(Value::Property(Arc::new(Property::new(getter, setter, deleter))))
}

/// `type(obj)` or `type(name, bases, namespace)`.
fn construct_type(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let positional = args.into_positional("type")?;
    match positional.as_slice() {
        [obj] => Ok(Value::Type(ctx.runtime().type_of(obj))),
        [Value::Str(name), Value::Tuple(bases), Value::Dict(namespace)] => {
            let bases = bases
                .iter()
                .map(|base| match base {
                    Value::Type(id) => Ok(*id),
                    _ => Err(ExcType::type_error("type() bases must be types")),
                })
                .collect::<RunResult<Vec<TypeId>>>()?;
            let namespace = namespace.lock().clone();
            ctx.track_allocation()?;
            ctx.runtime().create_type(name, &bases, namespace).map(Value::Type)
        }
        [_, _, _] => Err(ExcType::type_error(
            "type() argument 1 must be str, argument 2 a tuple, argument 3 a dict",
        )),
        _ => Err(ExcType::type_error("type() takes 1 or 3 arguments")),
    }
}
