//! Subscripting, container construction, unpacking and the iteration protocol.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{ResumeValue, VM};
use crate::{
    exception_private::{ExcType, RunError, RunResult},
    function::CallContext,
    io::PrintWriter,
    namespace::Dict,
    resource::ResourceTracker,
    tracer::VmTracer,
    types::{ByteSource, GeneratorStep, IterState, Range, bytes, dict, list},
    value::Value,
};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// `container[key]`
    pub(super) fn get_item(&mut self, container: &Value, key: &Value) -> RunResult<Value> {
        match container {
            Value::List(items) => list::get_item(&items.lock(), key, "list"),
            Value::Tuple(items) => list::get_item(items, key, "tuple"),
            Value::Str(s) => list::str_get_item(s, key),
            Value::Bytes(buffer) => bytes::get_item(buffer, key),
            Value::ByteArray(buffer) => bytes::get_item(&buffer.lock(), key),
            Value::Dict(entries) => dict::get_item(self.runtime, entries, key),
            Value::Range(range) => range_get_item(*range, key),
            Value::Instance(_) => match self.call_special(container, "__getitem__", vec![key.clone()])? {
                Some(value) => Ok(value),
                None => Err(self.unsupported(container, "is not subscriptable")),
            },
            other => Err(self.unsupported(other, "is not subscriptable")),
        }
    }

    /// `container[key] = value`
    pub(super) fn set_item(&mut self, container: &Value, key: &Value, value: Value) -> RunResult<()> {
        match container {
            Value::List(items) => list::set_item(self, items, key, value),
            Value::ByteArray(buffer) => bytes::set_item(self, buffer, key, &value),
            Value::Dict(entries) => {
                let key = dict::dict_key(self.runtime, key)?;
                entries.lock().insert(key, value);
                Ok(())
            }
            Value::Instance(_) => match self.call_special(container, "__setitem__", vec![key.clone(), value])? {
                Some(_) => Ok(()),
                None => Err(self.unsupported(container, "does not support item assignment")),
            },
            other => Err(self.unsupported(other, "does not support item assignment")),
        }
    }

    /// `del container[key]`
    pub(super) fn del_item(&mut self, container: &Value, key: &Value) -> RunResult<()> {
        match container {
            Value::List(items) => list::del_item(items, key),
            Value::ByteArray(buffer) => bytes::del_item(buffer, key),
            Value::Dict(entries) => dict::del_item(self.runtime, entries, key),
            Value::Instance(_) => match self.call_special(container, "__delitem__", vec![key.clone()])? {
                Some(_) => Ok(()),
                None => Err(self.unsupported(container, "doesn't support item deletion")),
            },
            other => Err(self.unsupported(other, "doesn't support item deletion")),
        }
    }

    fn unsupported(&self, value: &Value, what: &str) -> RunError {
        ExcType::type_error(format_args!(
            "'{}' object {what}",
            self.runtime.value_type_name(value)
        ))
    }

    /// `BuildMap`: `flat` alternates keys and values.
    pub(super) fn build_map(&mut self, flat: Vec<Value>) -> RunResult<Value> {
        let mut entries = Dict::default();
        let mut flat = flat.into_iter();
        while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
            entries.insert(dict::dict_key(self.runtime, &key)?, value);
        }
        self.track_allocation()?;
        Ok(Value::dict(entries))
    }

    /// `UnpackSequence(n)`: exactly `n` items, in order.
    pub(super) fn unpack(&mut self, seq: &Value, expected: usize) -> RunResult<Vec<Value>> {
        let items = self.collect(seq)?;
        match items.len() {
            n if n == expected => Ok(items),
            n if n > expected => Err(ExcType::value_error(format_args!(
                "too many values to unpack (expected {expected})"
            ))),
            n => Err(ExcType::value_error(format_args!(
                "not enough values to unpack (expected {expected}, got {n})"
            ))),
        }
    }

    /// `iter(value)`
    pub(super) fn iter_value(&mut self, value: &Value) -> RunResult<Value> {
        let state = match value {
            Value::List(list) => IterState::List {
                list: list.clone(),
                index: 0,
            },
            Value::Tuple(items) => IterState::Tuple {
                items: items.clone(),
                index: 0,
            },
            Value::Str(s) => IterState::Chars {
                chars: s.chars().collect(),
                index: 0,
            },
            Value::Bytes(buffer) => IterState::Bytes {
                source: ByteSource::Fixed(buffer.clone()),
                index: 0,
            },
            Value::ByteArray(buffer) => IterState::Bytes {
                source: ByteSource::Shared(buffer.clone()),
                index: 0,
            },
            Value::Dict(entries) => IterState::DictKeys {
                keys: entries.lock().keys().cloned().collect(),
                index: 0,
            },
            Value::Range(range) => IterState::Range {
                range: *range,
                index: 0,
            },
            Value::Iterator(_) | Value::Generator(_) => return Ok(value.clone()),
            Value::Instance(_) => {
                return match self.call_special(value, "__iter__", Vec::new())? {
                    Some(iterator) => Ok(iterator),
                    None => Err(self.unsupported(value, "is not iterable")),
                };
            }
            other => return Err(self.unsupported(other, "is not iterable")),
        };
        self.track_allocation()?;
        Ok(Value::Iterator(Arc::new(Mutex::new(state))))
    }

    /// `next(iterator)`; `None` once exhausted.
    pub(super) fn next_value(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        match iterator {
            Value::Iterator(state) => Ok(state.lock().next_item()),
            Value::Generator(generator) => match self.resume_gen(generator, ResumeValue::Send(Value::None))? {
                GeneratorStep::Yielded(value) => Ok(Some(value)),
                GeneratorStep::Returned(_) => Ok(None),
            },
            Value::Instance(_) => match self.call_special(iterator, "__next__", Vec::new()) {
                Ok(Some(value)) => Ok(Some(value)),
                Ok(None) => Err(self.unsupported(iterator, "is not an iterator")),
                Err(err) if err.is_exc(self.runtime, ExcType::StopIteration) => Ok(None),
                Err(err) => Err(err),
            },
            other => Err(self.unsupported(other, "is not an iterator")),
        }
    }
}

/// `range[index]`; slicing a range gives another range.
fn range_get_item(range: Range, key: &Value) -> RunResult<Value> {
    match key {
        Value::Slice(slice) => {
            let indices = slice.indices(range.len())?;
            let step = range.step.saturating_mul(indices.step as i64);
            let start = range.start.saturating_add((indices.start as i64).saturating_mul(range.step));
            let stop = start.saturating_add((indices.len as i64).saturating_mul(step));
            Ok(Value::Range(Range::new(start, stop, step)?))
        }
        other => {
            let position = list::item_index(other, range.len(), "range object")?;
            range
                .get(position)
                .map(Value::Int)
                .ok_or_else(|| ExcType::index_error("range object index out of range"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SliceValue;

    fn ints(range: Range) -> Vec<i64> {
        (0..range.len()).filter_map(|i| range.get(i)).collect()
    }

    #[test]
    fn range_slices_stay_ranges() {
        let range = Range::new(0, 10, 1).unwrap();
        let Value::Range(sliced) =
            range_get_item(range, &Value::Slice(SliceValue::new(Some(2), Some(8), Some(2)))).unwrap()
        else {
            panic!("expected a range");
        };
        assert_eq!(ints(sliced), vec![2, 4, 6]);

        let Value::Range(reversed) =
            range_get_item(range, &Value::Slice(SliceValue::new(None, None, Some(-3)))).unwrap()
        else {
            panic!("expected a range");
        };
        assert_eq!(ints(reversed), vec![9, 6, 3, 0]);
    }

    #[test]
    fn range_index_bounds() {
        let range = Range::new(5, 0, -1).unwrap();
        assert!(matches!(range_get_item(range, &Value::Int(-1)).unwrap(), Value::Int(1)));
        assert!(range_get_item(range, &Value::Int(5)).is_err());
    }
}
