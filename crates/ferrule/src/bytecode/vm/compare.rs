//! Comparisons, membership, truthiness and `len`.

use super::VM;
use crate::{
    exception_private::{ExcType, RunError, RunResult},
    io::PrintWriter,
    ops::{self, CompareOp},
    resource::ResourceTracker,
    tracer::VmTracer,
    value::Value,
};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// `lhs <op> rhs`
    pub(super) fn compare(&mut self, op: CompareOp, lhs: &Value, rhs: &Value) -> RunResult<bool> {
        match op {
            CompareOp::Is => return Ok(lhs.is_identical(rhs)),
            CompareOp::IsNot => return Ok(!lhs.is_identical(rhs)),
            CompareOp::In => return self.contains(rhs, lhs),
            CompareOp::NotIn => return self.contains(rhs, lhs).map(|found| !found),
            CompareOp::Eq => return self.eq_values(lhs, rhs),
            CompareOp::Ne => {
                for (receiver, other) in [(lhs, rhs), (rhs, lhs)] {
                    if let Some(result) = self.call_special(receiver, "__ne__", vec![other.clone()])? {
                        return self.truthy(&result);
                    }
                }
                return self.eq_values(lhs, rhs).map(|eq| !eq);
            }
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {}
        }

        if let Some(result) = ops::compare_op(op, lhs, rhs) {
            return Ok(result);
        }
        if let Some((forward, reflected)) = op.dunders() {
            if let Some(result) = self.call_special(lhs, forward, vec![rhs.clone()])? {
                return self.truthy(&result);
            }
            if let Some(result) = self.call_special(rhs, reflected, vec![lhs.clone()])? {
                return self.truthy(&result);
            }
        }
        Err(ExcType::type_error(format_args!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            self.runtime.value_type_name(lhs),
            self.runtime.value_type_name(rhs)
        )))
    }

    /// `a == b`, preferring a user `__eq__` on either side.
    pub(super) fn eq_values(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        if let Some(result) = self.call_special(a, "__eq__", vec![b.clone()])? {
            return self.truthy(&result);
        }
        if let Some(result) = self.call_special(b, "__eq__", vec![a.clone()])? {
            return self.truthy(&result);
        }
        Ok(a.py_eq(b))
    }

    /// `item in container`
    fn contains(&mut self, container: &Value, item: &Value) -> RunResult<bool> {
        if let Some(result) = self.call_special(container, "__contains__", vec![item.clone()])? {
            return self.truthy(&result);
        }
        if let Some(found) = ops::contains(container, item)? {
            return Ok(found);
        }
        let items = match container {
            Value::List(_) | Value::Tuple(_) => container.sequence_items().unwrap_or_default(),
            Value::Iterator(_) | Value::Generator(_) | Value::Instance(_) => {
                let iterator = self.iter_value(container)?;
                while let Some(candidate) = self.next_value(&iterator)? {
                    if candidate.is_identical(item) || self.eq_values(&candidate, item)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            other => {
                return Err(ExcType::type_error(format_args!(
                    "argument of type '{}' is not iterable",
                    self.runtime.value_type_name(other)
                )));
            }
        };
        for candidate in &items {
            if candidate.is_identical(item) || self.eq_values(candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Truth value: `__bool__`, then `__len__`, then true for instances.
    pub(super) fn truthy(&mut self, value: &Value) -> RunResult<bool> {
        if !matches!(value, Value::Instance(_)) {
            return Ok(value.py_bool());
        }
        if let Some(result) = self.call_special(value, "__bool__", Vec::new())? {
            return match result {
                Value::Bool(b) => Ok(b),
                other => Err(ExcType::type_error(format_args!(
                    "__bool__ should return bool, returned {}",
                    self.runtime.value_type_name(&other)
                ))),
            };
        }
        let type_id = self.runtime.type_of(value);
        if self.runtime.lookup_in_type(type_id, "__len__").is_some() {
            return self.len_of(value).map(|len| len > 0);
        }
        Ok(true)
    }

    /// `len(value)`
    pub(super) fn len_of(&mut self, value: &Value) -> RunResult<usize> {
        let len = match value {
            Value::Str(s) => s.chars().count(),
            Value::Bytes(b) => b.len(),
            Value::ByteArray(b) => b.lock().len(),
            Value::Tuple(items) => items.len(),
            Value::List(items) => items.lock().len(),
            Value::Dict(dict) => dict.lock().len(),
            Value::Range(range) => range.len(),
            Value::Instance(_) => match self.call_special(value, "__len__", Vec::new())? {
                Some(Value::Int(n)) => usize::try_from(n)
                    .map_err(|_| ExcType::value_error("__len__() should return >= 0"))?,
                Some(Value::Bool(b)) => usize::from(b),
                Some(other) => {
                    return Err(ExcType::type_error(format_args!(
                        "'{}' object cannot be interpreted as an integer",
                        self.runtime.value_type_name(&other)
                    )));
                }
                None => return Err(self.no_len(value)),
            },
            other => return Err(self.no_len(other)),
        };
        Ok(len)
    }

    fn no_len(&self, value: &Value) -> RunError {
        ExcType::type_error(format_args!(
            "object of type '{}' has no len()",
            self.runtime.value_type_name(value)
        ))
    }
}
