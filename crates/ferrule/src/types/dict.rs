//! `dict` methods and key handling.
//!
//! Dict keys are restricted to strings; ordering follows insertion.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::{CallContext, NativeFunction},
    namespace::Dict,
    runtime::Runtime,
    value::Value,
};

pub(crate) const METHODS: &[NativeFunction] = &[
    NativeFunction::new("get", dict_get),
    NativeFunction::new("keys", dict_keys),
    NativeFunction::new("values", dict_values),
    NativeFunction::new("items", dict_items),
    NativeFunction::new("pop", dict_pop),
    NativeFunction::new("setdefault", dict_setdefault),
    NativeFunction::new("update", dict_update),
    NativeFunction::new("clear", dict_clear),
    NativeFunction::new("copy", dict_copy),
];

type DictRef = Arc<Mutex<Dict>>;

/// Validates a dict key.
pub(crate) fn dict_key(runtime: &Runtime, key: &Value) -> RunResult<Arc<str>> {
    match key {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ExcType::type_error(format_args!(
            "dict keys must be str, not '{}'",
            runtime.value_type_name(other)
        ))),
    }
}

/// `d[key]`
pub(crate) fn get_item(runtime: &Runtime, dict: &DictRef, key: &Value) -> RunResult<Value> {
    let key = dict_key(runtime, key)?;
    dict.lock().get(&key).cloned().ok_or_else(|| ExcType::key_error(&key))
}

/// `del d[key]`
pub(crate) fn del_item(runtime: &Runtime, dict: &DictRef, key: &Value) -> RunResult<()> {
    let key = dict_key(runtime, key)?;
    let removed = dict.lock().shift_remove(&key);
    removed.map(drop).ok_or_else(|| ExcType::key_error(&key))
}

/// Entries of a mapping argument: another dict, or an iterable of key/value pairs.
pub(crate) fn entries_from(ctx: &mut dyn CallContext, source: &Value) -> RunResult<Vec<(Arc<str>, Value)>> {
    if let Value::Dict(other) = source {
        return Ok(other.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    }
    let mut entries = Vec::new();
    for pair in ctx.collect(source)? {
        let items = ctx.collect(&pair)?;
        let [key, value] = <[Value; 2]>::try_from(items).map_err(|items| {
            ExcType::value_error(format_args!(
                "dictionary update sequence element has length {}; 2 is required",
                items.len()
            ))
        })?;
        entries.push((dict_key(ctx.runtime(), &key)?, value));
    }
    Ok(entries)
}

fn split_receiver(args: ArgValues, name: &str) -> RunResult<(DictRef, ArgValues)> {
    let mut rest = args;
    match rest.positional.first() {
        Some(Value::Dict(dict)) => {
            let dict = dict.clone();
            rest.positional.remove(0);
            Ok((dict, rest))
        }
        _ => Err(ExcType::type_error(format_args!(
            "descriptor '{name}' requires a 'dict' object"
        ))),
    }
}

fn dict_get(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "get")?;
    let (key, default) = rest.get_one_two_args("get")?;
    let key = dict_key(ctx.runtime(), &key)?;
    let found = dict.lock().get(&key).cloned();
    Ok(found.or(default).unwrap_or(Value::None))
}

fn dict_keys(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "keys")?;
    rest.check_zero_args("keys")?;
    ctx.track_allocation()?;
    let keys = dict.lock().keys().map(|k| Value::Str(k.clone())).collect();
    Ok(Value::list(keys))
}

fn dict_values(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "values")?;
    rest.check_zero_args("values")?;
    ctx.track_allocation()?;
    let values = dict.lock().values().cloned().collect();
    Ok(Value::list(values))
}

fn dict_items(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "items")?;
    rest.check_zero_args("items")?;
    ctx.track_allocation()?;
    let items = dict
        .lock()
        .iter()
        .map(|(k, v)| Value::tuple(vec![Value::Str(k.clone()), v.clone()]))
        .collect();
    Ok(Value::list(items))
}

fn dict_pop(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "pop")?;
    let (key, default) = rest.get_one_two_args("pop")?;
    let key = dict_key(ctx.runtime(), &key)?;
    let removed = dict.lock().shift_remove(&key);
    removed.or(default).ok_or_else(|| ExcType::key_error(&key))
}

fn dict_setdefault(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "setdefault")?;
    let (key, default) = rest.get_one_two_args("setdefault")?;
    let key = dict_key(ctx.runtime(), &key)?;
    let value = dict.lock().entry(key).or_insert(default.unwrap_or(Value::None)).clone();
    Ok(value)
}

fn dict_update(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, mut rest) = split_receiver(args, "update")?;
    let keywords = std::mem::take(&mut rest.keywords);
    let mut entries = match rest.get_zero_one_arg("update")? {
        Some(source) => entries_from(ctx, &source)?,
        None => Vec::new(),
    };
    entries.extend(keywords);
    dict.lock().extend(entries);
    Ok(Value::None)
}

fn dict_clear(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "clear")?;
    rest.check_zero_args("clear")?;
    let old = std::mem::take(&mut *dict.lock());
    drop(old);
    Ok(Value::None)
}

fn dict_copy(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (dict, rest) = split_receiver(args, "copy")?;
    rest.check_zero_args("copy")?;
    ctx.track_allocation()?;
    let copy = dict.lock().clone();
    Ok(Value::dict(copy))
}
