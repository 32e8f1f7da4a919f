//! `bytes` and `bytearray` as seen from Python code: methods, subscripts and conversions.
//!
//! Storage management lives in [`ByteBuffer`]; this module only translates Python-level
//! arguments into buffer operations.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    args::ArgValues,
    exception_private::{ExcType, RunResult},
    function::{CallContext, NativeFunction},
    types::{
        ByteBuffer,
        slice::{clamp_insert_index, normalize_index},
    },
    value::Value,
};

/// Methods shared by `bytes` and `bytearray`.
pub(crate) const BYTES_METHODS: &[NativeFunction] = &[NativeFunction::new("decode", bytes_decode)];

pub(crate) const BYTEARRAY_METHODS: &[NativeFunction] = &[
    NativeFunction::new("append", bytearray_append),
    NativeFunction::new("extend", bytearray_extend),
    NativeFunction::new("insert", bytearray_insert),
    NativeFunction::new("pop", bytearray_pop),
    NativeFunction::new("remove", bytearray_remove),
    NativeFunction::new("reverse", bytearray_reverse),
    NativeFunction::new("clear", bytearray_clear),
    NativeFunction::new("copy", bytearray_copy),
    NativeFunction::new("decode", bytes_decode),
];

/// Converts an int-like value to a byte.
pub(crate) fn byte_value(value: &Value) -> RunResult<u8> {
    let Some(int) = value.as_int() else {
        return Err(ExcType::type_error("an integer is required"));
    };
    u8::try_from(int).map_err(|_| ExcType::value_error("byte must be in range(0, 256)"))
}

/// Bytes from a bytes-like object or an iterable of ints.
pub(crate) fn bytes_from_value(ctx: &mut dyn CallContext, value: &Value) -> RunResult<Vec<u8>> {
    if let Some(data) = value.byte_contents() {
        return Ok(data);
    }
    if matches!(value, Value::Str(_)) {
        return Err(ExcType::type_error("string argument without an encoding"));
    }
    ctx.collect(value)?.iter().map(byte_value).collect()
}

/// `bytes(x)` / `bytearray(x)` constructor argument handling.
pub(crate) fn construct(ctx: &mut dyn CallContext, source: Option<Value>, mutable: bool) -> RunResult<Value> {
    let data = match &source {
        None => Vec::new(),
        Some(Value::Int(n)) => {
            let n = usize::try_from(*n).map_err(|_| ExcType::value_error("negative count"))?;
            vec![0; n]
        }
        Some(value) => bytes_from_value(ctx, value)?,
    };
    ctx.track_allocation()?;
    Ok(if mutable {
        Value::bytearray(&data)
    } else {
        Value::bytes(&data)
    })
}

/// `b[index]` for ints and slices.
pub(crate) fn get_item(buffer: &ByteBuffer, index: &Value) -> RunResult<Value> {
    match index {
        Value::Slice(slice) => {
            let indices = slice.indices(buffer.len())?;
            let sliced = buffer.slice(indices.start, indices.stop, indices.step)?;
            Ok(if sliced.is_mutable() {
                Value::ByteArray(Arc::new(Mutex::new(sliced)))
            } else {
                Value::Bytes(Arc::new(sliced))
            })
        }
        other => {
            let position = checked_index(buffer, other)?;
            Ok(Value::Int(i64::from(buffer.get(position)?)))
        }
    }
}

/// `b[index] = value` on a bytearray; slice assignment takes any bytes-like or int iterable.
pub(crate) fn set_item(
    ctx: &mut dyn CallContext,
    target: &Arc<Mutex<ByteBuffer>>,
    index: &Value,
    value: &Value,
) -> RunResult<()> {
    match index {
        Value::Slice(slice) => {
            let source = bytes_from_value(ctx, value)?;
            let mut buffer = target.lock();
            let indices = slice.indices(buffer.len())?;
            buffer.assign_slice(indices.start, indices.stop, indices.step, &source)?;
            Ok(())
        }
        other => {
            let byte = byte_value(value)?;
            let mut buffer = target.lock();
            let position = checked_index(&buffer, other)?;
            buffer.set(position, byte)?;
            Ok(())
        }
    }
}

/// `del b[index]` on a bytearray.
pub(crate) fn del_item(target: &Arc<Mutex<ByteBuffer>>, index: &Value) -> RunResult<()> {
    let mut buffer = target.lock();
    match index {
        Value::Slice(slice) => {
            let indices = slice.indices(buffer.len())?;
            buffer.delete_slice(indices.start, indices.stop, indices.step)?;
        }
        other => {
            let position = checked_index(&buffer, other)?;
            buffer.delete(position)?;
        }
    }
    Ok(())
}

fn checked_index(buffer: &ByteBuffer, index: &Value) -> RunResult<usize> {
    let Some(int) = index.as_int() else {
        return Err(ExcType::type_error("byte indices must be integers or slices"));
    };
    normalize_index(int, buffer.len()).ok_or_else(|| ExcType::index_error("index out of range"))
}

fn receiver(args: &ArgValues, name: &str) -> RunResult<Arc<Mutex<ByteBuffer>>> {
    match args.positional.first() {
        Some(Value::ByteArray(buffer)) => Ok(buffer.clone()),
        _ => Err(ExcType::type_error(format_args!(
            "descriptor '{name}' requires a 'bytearray' object"
        ))),
    }
}

/// Splits `(self, *rest)` for method natives.
fn split_receiver(args: ArgValues, name: &str) -> RunResult<(Arc<Mutex<ByteBuffer>>, ArgValues)> {
    let buffer = receiver(&args, name)?;
    let mut rest = args;
    rest.positional.remove(0);
    Ok((buffer, rest))
}

fn bytearray_append(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "append")?;
    let byte = byte_value(&rest.get_one_arg("append")?)?;
    buffer.lock().append(byte)?;
    Ok(Value::None)
}

fn bytearray_extend(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "extend")?;
    let source = rest.get_one_arg("extend")?;
    // collected before locking: the source may be the buffer itself
    let data = bytes_from_value(ctx, &source)?;
    buffer.lock().extend(&data)?;
    Ok(Value::None)
}

fn bytearray_insert(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "insert")?;
    let (index, item) = rest.get_two_args("insert")?;
    let Some(index) = index.as_int() else {
        return Err(ExcType::type_error("an integer is required"));
    };
    let byte = byte_value(&item)?;
    let mut buffer = buffer.lock();
    let position = clamp_insert_index(index, buffer.len());
    buffer.insert(position, byte)?;
    Ok(Value::None)
}

fn bytearray_pop(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "pop")?;
    let index = rest.get_zero_one_arg("pop")?;
    let mut buffer = buffer.lock();
    if buffer.is_empty() {
        return Err(ExcType::index_error("pop from empty bytearray"));
    }
    let index = match index {
        None => -1,
        Some(value) => value
            .as_int()
            .ok_or_else(|| ExcType::type_error("an integer is required"))?,
    };
    let position = normalize_index(index, buffer.len()).ok_or_else(|| ExcType::index_error("pop index out of range"))?;
    Ok(Value::Int(i64::from(buffer.pop(position)?)))
}

fn bytearray_remove(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "remove")?;
    let byte = byte_value(&rest.get_one_arg("remove")?)?;
    let mut buffer = buffer.lock();
    let position = buffer
        .as_slice()
        .iter()
        .position(|&b| b == byte)
        .ok_or_else(|| ExcType::value_error("value not found in bytearray"))?;
    buffer.delete(position)?;
    Ok(Value::None)
}

fn bytearray_reverse(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "reverse")?;
    rest.check_zero_args("reverse")?;
    buffer.lock().reverse()?;
    Ok(Value::None)
}

fn bytearray_clear(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "clear")?;
    rest.check_zero_args("clear")?;
    buffer.lock().clear()?;
    Ok(Value::None)
}

fn bytearray_copy(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (buffer, rest) = split_receiver(args, "copy")?;
    rest.check_zero_args("copy")?;
    ctx.track_allocation()?;
    let copy = buffer.lock().to_mutable();
    Ok(Value::ByteArray(Arc::new(Mutex::new(copy))))
}

/// `b.decode()`: UTF-8 only.
fn bytes_decode(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let mut args = args;
    if args.positional.is_empty() {
        return Err(ExcType::type_error("descriptor 'decode' needs an argument"));
    }
    let this = args.positional.remove(0);
    args.check_zero_args("decode")?;
    let data = this
        .byte_contents()
        .ok_or_else(|| ExcType::type_error("descriptor 'decode' requires a bytes-like object"))?;
    let text = String::from_utf8(data).map_err(|e| {
        ExcType::value_error(format_args!(
            "'utf-8' codec can't decode byte at position {}",
            e.utf8_error().valid_up_to()
        ))
    })?;
    Ok(Value::str(text))
}
