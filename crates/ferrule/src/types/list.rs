//! `list` methods and subscripts for lists, tuples and strings.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::{CallContext, NativeFunction},
    types::slice::{clamp_insert_index, normalize_index},
    value::Value,
};

pub(crate) const METHODS: &[NativeFunction] = &[
    NativeFunction::new("append", list_append),
    NativeFunction::new("extend", list_extend),
    NativeFunction::new("insert", list_insert),
    NativeFunction::new("pop", list_pop),
    NativeFunction::new("remove", list_remove),
    NativeFunction::new("index", list_index),
    NativeFunction::new("count", list_count),
    NativeFunction::new("reverse", list_reverse),
    NativeFunction::new("clear", list_clear),
    NativeFunction::new("copy", list_copy),
];

type ListRef = Arc<Mutex<Vec<Value>>>;

fn split_receiver(args: ArgValues, name: &str) -> RunResult<(ListRef, ArgValues)> {
    let mut rest = args;
    match rest.positional.first() {
        Some(Value::List(list)) => {
            let list = list.clone();
            rest.positional.remove(0);
            Ok((list, rest))
        }
        _ => Err(ExcType::type_error(format_args!(
            "descriptor '{name}' requires a 'list' object"
        ))),
    }
}

fn int_arg(value: &Value) -> RunResult<i64> {
    value
        .as_int()
        .ok_or_else(|| ExcType::type_error("'int' object expected for list index"))
}

fn list_append(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "append")?;
    let item = rest.get_one_arg("append")?;
    list.lock().push(item);
    Ok(Value::None)
}

fn list_extend(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "extend")?;
    let source = rest.get_one_arg("extend")?;
    let items = ctx.collect(&source)?;
    list.lock().extend(items);
    Ok(Value::None)
}

fn list_insert(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "insert")?;
    let (index, item) = rest.get_two_args("insert")?;
    let index = int_arg(&index)?;
    let mut list = list.lock();
    let position = clamp_insert_index(index, list.len());
    list.insert(position, item);
    Ok(Value::None)
}

fn list_pop(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "pop")?;
    let index = rest.get_zero_one_arg("pop")?.map(|i| int_arg(&i)).transpose()?;
    let mut list = list.lock();
    if list.is_empty() {
        return Err(ExcType::index_error("pop from empty list"));
    }
    let position =
        normalize_index(index.unwrap_or(-1), list.len()).ok_or_else(|| ExcType::index_error("pop index out of range"))?;
    Ok(list.remove(position))
}

/// Position of the first element equal to `needle`; compares on a snapshot since `__eq__` may
/// run user code that touches the list.
fn find(ctx: &mut dyn CallContext, list: &ListRef, needle: &Value) -> RunResult<Option<usize>> {
    let snapshot = list.lock().clone();
    for (i, item) in snapshot.iter().enumerate() {
        if ctx.equals(item, needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn list_remove(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "remove")?;
    let needle = rest.get_one_arg("remove")?;
    let Some(position) = find(ctx, &list, &needle)? else {
        return Err(ExcType::value_error("list.remove(x): x not in list"));
    };
    let mut list = list.lock();
    if position < list.len() {
        list.remove(position);
    }
    Ok(Value::None)
}

fn list_index(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "index")?;
    let needle = rest.get_one_arg("index")?;
    match find(ctx, &list, &needle)? {
        Some(position) => Ok(Value::Int(i64::try_from(position).unwrap_or(i64::MAX))),
        None => {
            let repr = ctx.to_repr(&needle)?;
            Err(ExcType::value_error(format_args!("{repr} is not in list")))
        }
    }
}

fn list_count(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "count")?;
    let needle = rest.get_one_arg("count")?;
    let snapshot = list.lock().clone();
    let mut count = 0;
    for item in &snapshot {
        if ctx.equals(item, &needle)? {
            count += 1;
        }
    }
    Ok(Value::Int(count))
}

fn list_reverse(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "reverse")?;
    rest.check_zero_args("reverse")?;
    list.lock().reverse();
    Ok(Value::None)
}

fn list_clear(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "clear")?;
    rest.check_zero_args("clear")?;
    // dropped outside the lock
    let old = std::mem::take(&mut *list.lock());
    drop(old);
    Ok(Value::None)
}

fn list_copy(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (list, rest) = split_receiver(args, "copy")?;
    rest.check_zero_args("copy")?;
    ctx.track_allocation()?;
    let items = list.lock().clone();
    Ok(Value::list(items))
}

/// Resolves an integer subscript against `len`.
pub(crate) fn item_index(index: &Value, len: usize, kind: &str) -> RunResult<usize> {
    let Some(int) = index.as_int() else {
        return Err(ExcType::type_error(format_args!(
            "{kind} indices must be integers or slices"
        )));
    };
    normalize_index(int, len).ok_or_else(|| ExcType::index_error(format_args!("{kind} index out of range")))
}

/// `seq[index]` for tuples, lists and strings given as a slice of items.
pub(crate) fn get_item(items: &[Value], index: &Value, kind: &str) -> RunResult<Value> {
    match index {
        Value::Slice(slice) => {
            let indices = slice.indices(items.len())?;
            let picked: Vec<Value> = indices.positions().map(|i| items[i].clone()).collect();
            Ok(if kind == "tuple" {
                Value::tuple(picked)
            } else {
                Value::list(picked)
            })
        }
        other => Ok(items[item_index(other, items.len(), kind)?].clone()),
    }
}

/// `s[index]` for strings, indexing by character.
pub(crate) fn str_get_item(s: &str, index: &Value) -> RunResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    match index {
        Value::Slice(slice) => {
            let indices = slice.indices(chars.len())?;
            Ok(Value::str(indices.positions().map(|i| chars[i]).collect::<String>()))
        }
        other => Ok(Value::str(chars[item_index(other, chars.len(), "string")?].to_string())),
    }
}

/// `list[index] = value`; slice assignment accepts any iterable.
pub(crate) fn set_item(ctx: &mut dyn CallContext, list: &ListRef, index: &Value, value: Value) -> RunResult<()> {
    match index {
        Value::Slice(slice) => {
            let source = ctx.collect(&value)?;
            let mut items = list.lock();
            let indices = slice.indices(items.len())?;
            if indices.step == 1 {
                let start = indices.start.max(0).unsigned_abs().min(items.len());
                let stop = indices.stop.max(0).unsigned_abs().clamp(start, items.len());
                items.splice(start..stop, source);
                return Ok(());
            }
            if source.len() != indices.len {
                return Err(ExcType::value_error(format_args!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    source.len(),
                    indices.len
                )));
            }
            for (position, item) in indices.positions().zip(source) {
                items[position] = item;
            }
            Ok(())
        }
        other => {
            let mut items = list.lock();
            let position = item_index(other, items.len(), "list assignment")?;
            items[position] = value;
            Ok(())
        }
    }
}

/// `del list[index]`
pub(crate) fn del_item(list: &ListRef, index: &Value) -> RunResult<()> {
    let mut items = list.lock();
    match index {
        Value::Slice(slice) => {
            let indices = slice.indices(items.len())?;
            let mut doomed: Vec<usize> = indices.positions().collect();
            doomed.sort_unstable();
            for position in doomed.into_iter().rev() {
                items.remove(position);
            }
        }
        other => {
            let position = item_index(other, items.len(), "list assignment")?;
            items.remove(position);
        }
    }
    Ok(())
}
