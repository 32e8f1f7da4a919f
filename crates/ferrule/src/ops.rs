//! Operator dispatch tables for builtin operands.
//!
//! Operands are first normalized into an [`Operands`] pair, then a closed match on the operator
//! kind computes the result. Returning `Ok(None)` means "not supported for these builtin
//! operands"; the VM then tries `__op__`/`__rop__` on instances before raising `TypeError`.

use std::{cmp::Ordering, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

use crate::{
    exception_private::{ExcType, RunError, RunResult},
    types::ByteBuffer,
    value::Value,
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// Operator symbol, for error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "** or pow()",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        }
    }

    /// `__add__`-style method name.
    #[must_use]
    pub fn dunder(self) -> &'static str {
        match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::TrueDiv => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::Pow => "__pow__",
            Self::LShift => "__lshift__",
            Self::RShift => "__rshift__",
            Self::And => "__and__",
            Self::Or => "__or__",
            Self::Xor => "__xor__",
        }
    }

    /// Reflected method name, tried on the right operand.
    #[must_use]
    pub fn reflected_dunder(self) -> &'static str {
        match self {
            Self::Add => "__radd__",
            Self::Sub => "__rsub__",
            Self::Mul => "__rmul__",
            Self::TrueDiv => "__rtruediv__",
            Self::FloorDiv => "__rfloordiv__",
            Self::Mod => "__rmod__",
            Self::Pow => "__rpow__",
            Self::LShift => "__rlshift__",
            Self::RShift => "__rrshift__",
            Self::And => "__rand__",
            Self::Or => "__ror__",
            Self::Xor => "__rxor__",
        }
    }

    /// In-place method name, tried first by `InplaceOp`.
    #[must_use]
    pub fn inplace_dunder(self) -> &'static str {
        match self {
            Self::Add => "__iadd__",
            Self::Sub => "__isub__",
            Self::Mul => "__imul__",
            Self::TrueDiv => "__itruediv__",
            Self::FloorDiv => "__ifloordiv__",
            Self::Mod => "__imod__",
            Self::Pow => "__ipow__",
            Self::LShift => "__ilshift__",
            Self::RShift => "__irshift__",
            Self::And => "__iand__",
            Self::Or => "__ior__",
            Self::Xor => "__ixor__",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

impl UnaryOp {
    #[must_use]
    pub fn dunder(self) -> Option<&'static str> {
        match self {
            Self::Neg => Some("__neg__"),
            Self::Pos => Some("__pos__"),
            Self::Invert => Some("__invert__"),
            Self::Not => None,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "unary -",
            Self::Pos => "unary +",
            Self::Not => "not",
            Self::Invert => "unary ~",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }

    /// Rich comparison method name and its reflection.
    #[must_use]
    pub fn dunders(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Lt => Some(("__lt__", "__gt__")),
            Self::Le => Some(("__le__", "__ge__")),
            Self::Eq => Some(("__eq__", "__eq__")),
            Self::Ne => Some(("__ne__", "__ne__")),
            Self::Gt => Some(("__gt__", "__lt__")),
            Self::Ge => Some(("__ge__", "__le__")),
            Self::In | Self::NotIn | Self::Is | Self::IsNot => None,
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::In | Self::NotIn | Self::Is | Self::IsNot => false,
        }
    }
}

/// A pair of builtin operands after coercion.
enum Operands {
    Ints(i64, i64),
    Floats(f64, f64),
    Strs(String, String),
    /// Left operand keeps its mutability for the result.
    Bytes(ByteBuffer, Vec<u8>),
    /// Two sequences of the same kind; `true` for tuples.
    Seqs(Vec<Value>, Vec<Value>, bool),
    /// A sequence (or string/bytes) and a repeat count.
    Repeat(Value, i64),
    Other,
}

impl Operands {
    fn of(a: &Value, b: &Value) -> Self {
        if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
            return Self::Ints(x, y);
        }
        if (matches!(a, Value::Float(_)) || matches!(b, Value::Float(_)))
            && let (Some(x), Some(y)) = (a.as_f64(), b.as_f64())
        {
            return Self::Floats(x, y);
        }
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => Self::Strs(x.to_string(), y.to_string()),
            (Value::Bytes(x), Value::Bytes(_) | Value::ByteArray(_)) => {
                Self::Bytes((**x).clone(), b.byte_contents().unwrap_or_default())
            }
            (Value::ByteArray(x), Value::Bytes(_) | Value::ByteArray(_)) => {
                let left = x.lock().clone();
                Self::Bytes(left, b.byte_contents().unwrap_or_default())
            }
            (Value::Tuple(_), Value::Tuple(_)) | (Value::List(_), Value::List(_)) => {
                let tuple = matches!(a, Value::Tuple(_));
                match (a.sequence_items(), b.sequence_items()) {
                    (Some(x), Some(y)) => Self::Seqs(x, y, tuple),
                    _ => Self::Other,
                }
            }
            (Value::Str(_) | Value::Bytes(_) | Value::ByteArray(_) | Value::Tuple(_) | Value::List(_), count) => {
                count.as_int().map_or(Self::Other, |n| Self::Repeat(a.clone(), n))
            }
            (count, Value::Str(_) | Value::Bytes(_) | Value::ByteArray(_) | Value::Tuple(_) | Value::List(_)) => {
                count.as_int().map_or(Self::Other, |n| Self::Repeat(b.clone(), n))
            }
            _ => Self::Other,
        }
    }
}

fn overflow() -> RunError {
    ExcType::overflow_error("integer overflow")
}

/// Python floor division for ints.
fn floor_div(a: i64, b: i64) -> RunResult<i64> {
    if b == 0 {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    Ok(if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q })
}

/// Python modulo for ints: the result takes the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> RunResult<i64> {
    if b == 0 {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    let r = a.checked_rem(b).unwrap_or(0);
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn float_mod(a: f64, b: f64) -> RunResult<f64> {
    if b == 0.0 {
        return Err(ExcType::zero_division("float modulo"));
    }
    let r = a % b;
    Ok(if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r })
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> RunResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::TrueDiv => {
            if b == 0 {
                return Err(ExcType::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => floor_div(a, b)?,
        BinaryOp::Mod => floor_mod(a, b)?,
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
        BinaryOp::LShift => {
            let shift = u32::try_from(b).map_err(|_| ExcType::value_error("negative shift count"))?;
            if a == 0 {
                0
            } else {
                let shifted = a.checked_shl(shift).ok_or_else(overflow)?;
                if shifted >> shift != a {
                    return Err(overflow());
                }
                shifted
            }
        }
        BinaryOp::RShift => {
            let shift = u32::try_from(b).map_err(|_| ExcType::value_error("negative shift count"))?;
            a >> shift.min(63)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
    };
    Ok(Value::Int(result))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> RunResult<Option<Value>> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::TrueDiv => {
            if b == 0.0 {
                return Err(ExcType::zero_division("float division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(ExcType::zero_division("float divmod()"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => float_mod(a, b)?,
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
            }
            a.powf(b)
        }
        BinaryOp::LShift | BinaryOp::RShift | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => return Ok(None),
    };
    Ok(Some(Value::Float(result)))
}

fn repeat_count(n: i64, item_len: usize) -> RunResult<usize> {
    let count = usize::try_from(n.max(0)).unwrap_or(0);
    if count.checked_mul(item_len).is_none_or(|total| total > isize::MAX.unsigned_abs()) {
        return Err(ExcType::overflow_error("repeated sequence is too long"));
    }
    Ok(count)
}

/// Element count a sequence repetition `a * b` would produce, if it is one.
///
/// The VM consults the resource tracker before building large results.
#[must_use]
pub fn repeat_result_len(a: &Value, b: &Value) -> Option<usize> {
    let (seq, n) = match Operands::of(a, b) {
        Operands::Repeat(seq, n) => (seq, n),
        _ => return None,
    };
    let len = match &seq {
        Value::Str(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::ByteArray(b) => b.lock().len(),
        Value::Tuple(items) => items.len(),
        Value::List(items) => items.lock().len(),
        _ => return None,
    };
    Some(len.saturating_mul(usize::try_from(n.max(0)).unwrap_or(0)))
}

fn repeat(value: &Value, n: i64) -> RunResult<Option<Value>> {
    let result = match value {
        Value::Str(s) => Value::str(s.repeat(repeat_count(n, s.len())?)),
        Value::Bytes(b) => Value::Bytes(b.repeat(repeat_count(n, b.len())?).into()),
        Value::ByteArray(b) => {
            let buffer = b.lock().clone();
            let repeated = buffer.repeat(repeat_count(n, buffer.len())?);
            Value::ByteArray(Arc::new(Mutex::new(repeated)))
        }
        Value::Tuple(_) | Value::List(_) => {
            let items = value.sequence_items().unwrap_or_default();
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            if matches!(value, Value::Tuple(_)) {
                Value::tuple(out)
            } else {
                Value::list(out)
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Computes `a <op> b` for builtin operands.
pub fn binary_op(op: BinaryOp, a: &Value, b: &Value) -> RunResult<Option<Value>> {
    match Operands::of(a, b) {
        Operands::Ints(x, y) => {
            if matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
                && let (Value::Bool(p), Value::Bool(q)) = (a, b)
            {
                let result = match op {
                    BinaryOp::And => p & q,
                    BinaryOp::Or => p | q,
                    _ => p ^ q,
                };
                return Ok(Some(Value::Bool(result)));
            }
            int_op(op, x, y).map(Some)
        }
        Operands::Floats(x, y) => float_op(op, x, y),
        Operands::Strs(x, y) => Ok((op == BinaryOp::Add).then(|| Value::str(x + &y))),
        Operands::Bytes(left, right) => Ok((op == BinaryOp::Add).then(|| {
            let joined = left.concat(&right);
            if joined.is_mutable() {
                Value::ByteArray(Arc::new(Mutex::new(joined)))
            } else {
                Value::Bytes(joined.into())
            }
        })),
        Operands::Seqs(mut x, y, tuple) => Ok((op == BinaryOp::Add).then(|| {
            x.extend(y);
            if tuple { Value::tuple(x) } else { Value::list(x) }
        })),
        Operands::Repeat(seq, n) => {
            if op == BinaryOp::Mul {
                repeat(&seq, n)
            } else {
                Ok(None)
            }
        }
        Operands::Other => Ok(None),
    }
}

/// In-place `a <op>= b` for mutable builtin containers: `list += iterable items`,
/// `bytearray += bytes`, `list *= n`. Returns `false` when not applicable, in which case the
/// regular binary operation is used and the target rebound.
pub fn inplace_op(op: BinaryOp, a: &Value, b: &Value) -> RunResult<bool> {
    match (op, a) {
        (BinaryOp::Add, Value::List(list)) => {
            let Some(items) = b.sequence_items() else {
                return Ok(false);
            };
            list.lock().extend(items);
            Ok(true)
        }
        (BinaryOp::Add, Value::ByteArray(buffer)) => {
            let Some(data) = b.byte_contents() else {
                return Ok(false);
            };
            buffer.lock().extend(&data)?;
            Ok(true)
        }
        (BinaryOp::Mul, Value::List(list)) => {
            let Some(n) = b.as_int() else {
                return Ok(false);
            };
            let mut items = list.lock();
            let count = repeat_count(n, items.len())?;
            let original = std::mem::take(&mut *items);
            for _ in 0..count {
                items.extend(original.iter().cloned());
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Computes `<op> a` for builtin operands; `Not` is handled by the VM through truthiness.
pub fn unary_op(op: UnaryOp, a: &Value) -> RunResult<Option<Value>> {
    if op == UnaryOp::Not {
        return Ok(Some(Value::Bool(!a.py_bool())));
    }
    if let Some(i) = a.as_int() {
        let result = match op {
            UnaryOp::Neg => i.checked_neg().ok_or_else(overflow)?,
            UnaryOp::Invert => !i,
            UnaryOp::Pos | UnaryOp::Not => i,
        };
        return Ok(Some(Value::Int(result)));
    }
    match (op, a) {
        (UnaryOp::Neg, Value::Float(f)) => Ok(Some(Value::Float(-f))),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Some(Value::Float(*f))),
        _ => Ok(None),
    }
}

/// Ordering of builtin operands, `None` if they are not orderable against each other.
fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match Operands::of(a, b) {
        Operands::Ints(x, y) => Some(x.cmp(&y)),
        Operands::Floats(x, y) => x.partial_cmp(&y),
        Operands::Strs(x, y) => Some(x.cmp(&y)),
        Operands::Bytes(x, y) => Some(x.as_slice().cmp(y.as_slice())),
        Operands::Seqs(x, y, _) => {
            for (p, q) in x.iter().zip(&y) {
                if !p.py_eq(q) {
                    return ordering(p, q);
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        Operands::Repeat(..) | Operands::Other => None,
    }
}

/// Evaluates a rich comparison for builtin operands.
///
/// `==`/`!=` always succeed (falling back to identity); ordering comparisons between
/// unorderable builtins return `None`.
#[must_use]
pub fn compare_op(op: CompareOp, a: &Value, b: &Value) -> Option<bool> {
    match op {
        CompareOp::Eq => Some(a.py_eq(b)),
        CompareOp::Ne => Some(!a.py_eq(b)),
        CompareOp::Is => Some(a.is_identical(b)),
        CompareOp::IsNot => Some(!a.is_identical(b)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            // NaN compares false against everything
            if let Operands::Floats(x, y) = Operands::of(a, b)
                && (x.is_nan() || y.is_nan())
            {
                return Some(false);
            }
            ordering(a, b).map(|o| op.accepts(o))
        }
        CompareOp::In | CompareOp::NotIn => None,
    }
}

/// `item in container` for containers whose membership needs no user code.
///
/// Lists and tuples are excluded: their elements may define `__eq__`.
pub fn contains(container: &Value, item: &Value) -> RunResult<Option<bool>> {
    let found = match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => haystack.contains(&**needle),
            _ => return Err(ExcType::type_error("'in <string>' requires string as left operand")),
        },
        Value::Bytes(_) | Value::ByteArray(_) => {
            let haystack = container.byte_contents().unwrap_or_default();
            if let Some(byte) = item.as_int() {
                u8::try_from(byte).is_ok_and(|b| haystack.contains(&b))
            } else if let Some(needle) = item.byte_contents() {
                needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle.as_slice())
            } else {
                return Err(ExcType::type_error("a bytes-like object is required"));
            }
        }
        Value::Dict(dict) => match item {
            Value::Str(key) => dict.lock().contains_key(key),
            _ => false,
        },
        Value::Range(range) => match item.as_int() {
            Some(n) => {
                let offset = i128::from(n) - i128::from(range.start);
                let in_bounds = if range.step > 0 {
                    n >= range.start && n < range.stop
                } else {
                    n <= range.start && n > range.stop
                };
                in_bounds && offset % i128::from(range.step) == 0
            }
            None => false,
        },
        _ => return Ok(None),
    };
    Ok(Some(found))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn add(a: Value, b: Value) -> Value {
        binary_op(BinaryOp::Add, &a, &b).unwrap().unwrap()
    }

    #[test]
    fn int_arithmetic_follows_python_rounding() {
        assert_eq!(binary_op(BinaryOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(), Some(Value::Int(-4)));
        assert_eq!(binary_op(BinaryOp::Mod, &Value::Int(-7), &Value::Int(2)).unwrap(), Some(Value::Int(1)));
        assert_eq!(binary_op(BinaryOp::Mod, &Value::Int(7), &Value::Int(-2)).unwrap(), Some(Value::Int(-1)));
        assert_eq!(binary_op(BinaryOp::TrueDiv, &Value::Int(1), &Value::Int(2)).unwrap(), Some(Value::Float(0.5)));
    }

    #[test]
    fn division_by_zero_and_overflow() {
        assert!(binary_op(BinaryOp::TrueDiv, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(binary_op(BinaryOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).is_err());
        assert!(binary_op(BinaryOp::Pow, &Value::Int(2), &Value::Int(64)).is_err());
    }

    #[test]
    fn sequences_concatenate_and_repeat() {
        assert_eq!(add(Value::str("ab"), Value::str("cd")), Value::str("abcd"));
        let joined = add(Value::bytearray(b"ab"), Value::bytes(b"c"));
        assert!(matches!(joined, Value::ByteArray(_)));
        assert_eq!(joined.byte_contents().unwrap(), b"abc");
        let repeated = binary_op(BinaryOp::Mul, &Value::Int(2), &Value::tuple(vec![Value::Int(1)]))
            .unwrap()
            .unwrap();
        assert_eq!(repeated, Value::tuple(vec![Value::Int(1), Value::Int(1)]));
        assert_eq!(binary_op(BinaryOp::Sub, &Value::str("a"), &Value::str("b")).unwrap(), None);
    }

    #[test]
    fn comparisons() {
        assert_eq!(compare_op(CompareOp::Lt, &Value::Int(1), &Value::Float(1.5)), Some(true));
        assert_eq!(compare_op(CompareOp::Ge, &Value::str("b"), &Value::str("a")), Some(true));
        assert_eq!(compare_op(CompareOp::Lt, &Value::Int(1), &Value::str("a")), None);
        assert_eq!(compare_op(CompareOp::Lt, &Value::Float(f64::NAN), &Value::Int(1)), Some(false));
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(compare_op(CompareOp::Lt, &a, &b), Some(true));
    }

    #[test]
    fn membership() {
        assert_eq!(contains(&Value::str("hello"), &Value::str("ell")).unwrap(), Some(true));
        assert_eq!(contains(&Value::bytes(b"abc"), &Value::Int(98)).unwrap(), Some(true));
        let r = Value::Range(crate::types::Range::new(0, 10, 3).unwrap());
        assert_eq!(contains(&r, &Value::Int(9)).unwrap(), Some(true));
        assert_eq!(contains(&r, &Value::Int(8)).unwrap(), Some(false));
        assert_eq!(contains(&Value::list(Vec::new()), &Value::Int(1)).unwrap(), None);
    }
}
