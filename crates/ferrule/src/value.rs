use std::{fmt::Write as _, sync::Arc};

use parking_lot::Mutex;

use crate::{
    bytecode::Code,
    exception_private::RawStackFrame,
    function::{BoundMethod, Cell, Function, NativeFunction, Property},
    namespace::Dict,
    runtime::Runtime,
    types::{BuiltinType, ByteBuffer, Generator, Instance, IterState, Range, SliceValue, TypeId},
};

/// Nesting depth after which `repr` stops descending into containers.
const MAX_REPR_DEPTH: usize = 64;

/// A runtime value.
///
/// Scalars are stored inline; everything else is shared through an `Arc`, with mutable
/// containers behind `parking_lot` locks so values can cross threads.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Immutable byte string.
    Bytes(Arc<ByteBuffer>),
    /// Mutable byte array.
    ByteArray(Arc<Mutex<ByteBuffer>>),
    Tuple(Arc<[Value]>),
    List(Arc<Mutex<Vec<Value>>>),
    /// Insertion-ordered mapping with string keys.
    Dict(Arc<Mutex<Dict>>),
    Range(Range),
    Slice(SliceValue),
    Type(TypeId),
    Instance(Arc<Instance>),
    Function(Arc<Function>),
    /// A builtin function implemented in Rust.
    Native(NativeFunction),
    BoundMethod(Arc<BoundMethod>),
    StaticMethod(Arc<Value>),
    ClassMethod(Arc<Value>),
    Property(Arc<Property>),
    Cell(Arc<Cell>),
    Code(Arc<Code>),
    Iterator(Arc<Mutex<IterState>>),
    Generator(Arc<Generator>),
    /// Traceback entries collected while an exception propagated, innermost first.
    Traceback(Arc<[RawStackFrame]>),
}

impl Value {
    #[must_use]
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Self::Str(s.into())
    }

    #[must_use]
    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(items.into())
    }

    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Arc::new(Mutex::new(items)))
    }

    #[must_use]
    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Arc::new(Mutex::new(dict)))
    }

    #[must_use]
    pub fn bytes(data: &[u8]) -> Self {
        Self::Bytes(Arc::new(ByteBuffer::immutable_from(data)))
    }

    #[must_use]
    pub fn bytearray(data: &[u8]) -> Self {
        Self::ByteArray(Arc::new(Mutex::new(ByteBuffer::mutable_from(data))))
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Integer value of ints and bools.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value of ints, bools and floats as a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Snapshot of the contents of `bytes` or `bytearray` values.
    #[must_use]
    pub fn byte_contents(&self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b.as_slice().to_vec()),
            Self::ByteArray(b) => Some(b.lock().as_slice().to_vec()),
            _ => None,
        }
    }

    /// Snapshot of the elements of tuples and lists.
    #[must_use]
    pub fn sequence_items(&self) -> Option<Vec<Self>> {
        match self {
            Self::Tuple(items) => Some(items.to_vec()),
            Self::List(items) => Some(items.lock().clone()),
            _ => None,
        }
    }

    /// The builtin type of this value, `None` for instances of user classes.
    #[must_use]
    pub fn builtin_type(&self) -> Option<BuiltinType> {
        let ty = match self {
            Self::None => BuiltinType::NoneType,
            Self::Bool(_) => BuiltinType::Bool,
            Self::Int(_) => BuiltinType::Int,
            Self::Float(_) => BuiltinType::Float,
            Self::Str(_) => BuiltinType::Str,
            Self::Bytes(_) => BuiltinType::Bytes,
            Self::ByteArray(_) => BuiltinType::ByteArray,
            Self::Tuple(_) => BuiltinType::Tuple,
            Self::List(_) => BuiltinType::List,
            Self::Dict(_) => BuiltinType::Dict,
            Self::Range(_) => BuiltinType::Range,
            Self::Slice(_) => BuiltinType::Slice,
            Self::Type(_) => BuiltinType::Type,
            Self::Instance(_) => return None,
            Self::Function(_) => BuiltinType::Function,
            Self::Native(_) => BuiltinType::BuiltinFunction,
            Self::BoundMethod(_) => BuiltinType::Method,
            Self::StaticMethod(_) => BuiltinType::StaticMethod,
            Self::ClassMethod(_) => BuiltinType::ClassMethod,
            Self::Property(_) => BuiltinType::Property,
            Self::Cell(_) => BuiltinType::Cell,
            Self::Code(_) => BuiltinType::Code,
            Self::Iterator(_) => BuiltinType::Iterator,
            Self::Generator(_) => BuiltinType::Generator,
            Self::Traceback(_) => BuiltinType::Traceback,
        };
        Some(ty)
    }

    /// Truthiness for values that do not need to run user code.
    ///
    /// Instances are always true here; the VM consults `__bool__`/`__len__` first.
    #[must_use]
    pub fn py_bool(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::ByteArray(b) => !b.lock().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::List(items) => !items.lock().is_empty(),
            Self::Dict(d) => !d.lock().is_empty(),
            Self::Range(r) => r.len() != 0,
            _ => true,
        }
    }

    /// Identity comparison (`is`).
    ///
    /// Scalars compare by value; shared objects by pointer.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => Arc::ptr_eq(a, b),
            (Self::Bytes(a), Self::Bytes(b)) => Arc::ptr_eq(a, b),
            (Self::ByteArray(a), Self::ByteArray(b)) => Arc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Arc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Arc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Arc::ptr_eq(a, b),
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => a.name == b.name,
            (Self::BoundMethod(a), Self::BoundMethod(b)) => Arc::ptr_eq(a, b),
            (Self::StaticMethod(a), Self::StaticMethod(b)) | (Self::ClassMethod(a), Self::ClassMethod(b)) => {
                Arc::ptr_eq(a, b)
            }
            (Self::Property(a), Self::Property(b)) => Arc::ptr_eq(a, b),
            (Self::Cell(a), Self::Cell(b)) => Arc::ptr_eq(a, b),
            (Self::Code(a), Self::Code(b)) => Arc::ptr_eq(a, b),
            (Self::Iterator(a), Self::Iterator(b)) => Arc::ptr_eq(a, b),
            (Self::Generator(a), Self::Generator(b)) => Arc::ptr_eq(a, b),
            (Self::Traceback(a), Self::Traceback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Structural equality (`==`) for values that do not need to run user code.
    ///
    /// Containers are snapshotted before comparing so self-referencing structures never try to
    /// take the same lock twice. Instances compare by identity; the VM dispatches `__eq__`
    /// before falling back to this.
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.as_int(), other.as_int()) {
            return a == b;
        }
        match (self, other) {
            (Self::Float(_) | Self::Int(_) | Self::Bool(_), Self::Float(_) | Self::Int(_) | Self::Bool(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(_) | Self::ByteArray(_), Self::Bytes(_) | Self::ByteArray(_)) => {
                self.byte_contents() == other.byte_contents()
            }
            (Self::Tuple(_), Self::Tuple(_)) | (Self::List(_), Self::List(_)) => {
                if self.is_identical(other) {
                    return true;
                }
                let (Some(left), Some(right)) = (self.sequence_items(), other.sequence_items()) else {
                    return false;
                };
                left.len() == right.len() && left.iter().zip(&right).all(|(a, b)| a.py_eq(b))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let left = a.lock().clone();
                let right = b.lock().clone();
                left.len() == right.len()
                    && left
                        .iter()
                        .all(|(key, value)| right.get(key).is_some_and(|other| value.py_eq(other)))
            }
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::Slice(a), Self::Slice(b)) => a == b,
            (Self::BoundMethod(a), Self::BoundMethod(b)) => {
                a.receiver.is_identical(&b.receiver) && a.function.is_identical(&b.function)
            }
            _ => self.is_identical(other),
        }
    }

    /// `repr()` for values that do not need to run user code.
    #[must_use]
    pub fn py_repr(&self, runtime: &Runtime) -> String {
        let mut out = String::new();
        self.repr_into(runtime, &mut out, 0);
        out
    }

    /// `str()` for values that do not need to run user code.
    #[must_use]
    pub fn py_str(&self, runtime: &Runtime) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::Instance(_) if runtime.builtin_exc_type_of(self).is_some() => runtime.exception_str(self),
            _ => self.py_repr(runtime),
        }
    }

    fn repr_into(&self, runtime: &Runtime, out: &mut String, depth: usize) {
        if depth > MAX_REPR_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Float(f) => out.push_str(&float_repr(*f)),
            Self::Str(s) => out.push_str(&str_repr(s)),
            Self::Bytes(b) => out.push_str(&bytes_repr(b.as_slice())),
            Self::ByteArray(b) => {
                let data = b.lock().as_slice().to_vec();
                let _ = write!(out, "bytearray({})", bytes_repr(&data));
            }
            Self::Tuple(items) => {
                out.push('(');
                Self::repr_items(items, runtime, out, depth);
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Self::List(items) => {
                let items = items.lock().clone();
                out.push('[');
                Self::repr_items(&items, runtime, out, depth);
                out.push(']');
            }
            Self::Dict(d) => {
                let entries = d.lock().clone();
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&str_repr(key));
                    out.push_str(": ");
                    value.repr_into(runtime, out, depth + 1);
                }
                out.push('}');
            }
            Self::Range(r) => {
                let _ = write!(out, "{r}");
            }
            Self::Slice(s) => {
                let _ = write!(out, "{s}");
            }
            Self::Type(id) => {
                let _ = write!(out, "<class '{}'>", runtime.type_name(*id));
            }
            Self::Instance(instance) => {
                let type_name = runtime.type_name(instance.type_id());
                if runtime.builtin_exc_type_of(self).is_some() {
                    let args = instance.get_attr("args").unwrap_or_else(|| Self::tuple(Vec::new()));
                    let _ = write!(out, "{type_name}");
                    match &args {
                        Self::Tuple(items) if items.len() == 1 => {
                            out.push('(');
                            items[0].repr_into(runtime, out, depth + 1);
                            out.push(')');
                        }
                        Self::Tuple(items) if items.is_empty() => out.push_str("()"),
                        other => other.repr_into(runtime, out, depth + 1),
                    }
                } else {
                    let _ = write!(out, "<{type_name} object>");
                }
            }
            Self::Function(f) => {
                let _ = write!(out, "<function {}>", f.name());
            }
            Self::Native(n) => {
                let _ = write!(out, "<built-in function {}>", n.name);
            }
            Self::BoundMethod(m) => {
                let _ = write!(out, "<bound method {}>", m.function_name());
            }
            Self::StaticMethod(_) => out.push_str("<staticmethod object>"),
            Self::ClassMethod(_) => out.push_str("<classmethod object>"),
            Self::Property(_) => out.push_str("<property object>"),
            Self::Cell(_) => out.push_str("<cell>"),
            Self::Code(code) => {
                let _ = write!(out, "<code object {}>", code.name());
            }
            Self::Iterator(_) => out.push_str("<iterator object>"),
            Self::Generator(g) => {
                let _ = write!(out, "<generator object {}>", g.name());
            }
            Self::Traceback(_) => out.push_str("<traceback object>"),
        }
    }

    fn repr_items(items: &[Self], runtime: &Runtime, out: &mut String, depth: usize) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            item.repr_into(runtime, out, depth + 1);
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

/// Python-style float formatting: integral values keep a trailing `.0`, large and tiny values use
/// exponent notation with an explicit sign.
#[must_use]
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let formatted = format!("{f:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if exp.starts_with('-') => format!("{mantissa}e-{:0>2}", &exp[1..]),
            Some((mantissa, exp)) => format!("{mantissa}e+{exp:0>2}"),
            None => formatted,
        };
    }
    if f.fract() == 0.0 { format!("{f:.1}") } else { format!("{f}") }
}

fn pick_quote(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double { '"' } else { '\'' }
}

/// `repr()` of a string.
#[must_use]
pub fn str_repr(s: &str) -> String {
    let quote = pick_quote(s.contains('\''), s.contains('"'));
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `repr()` of a byte string, including the `b` prefix.
#[must_use]
pub fn bytes_repr(data: &[u8]) -> String {
    let quote = pick_quote(data.contains(&b'\''), data.contains(&b'"'));
    let mut out = String::with_capacity(data.len() + 3);
    out.push('b');
    out.push(quote);
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if char::from(b) == quote => {
                out.push('\\');
                out.push(quote);
            }
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_formatting() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.5), "0.5");
        assert_eq!(float_repr(-2.25), "-2.25");
        assert_eq!(float_repr(1e20), "1e+20");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn string_quoting() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(bytes_repr(b"a\x00b"), "b'a\\x00b'");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&Value::str("1")));
        assert!(Value::bytes(b"ab").py_eq(&Value::bytearray(b"ab")));
    }

    #[test]
    fn self_referencing_list_equality_terminates() {
        let list = Value::list(Vec::new());
        if let Value::List(items) = &list {
            items.lock().push(list.clone());
        }
        assert!(list.py_eq(&list.clone()));
    }
}
