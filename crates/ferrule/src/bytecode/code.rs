//! Code objects: the immutable instruction stream plus the tables it indexes into.
//!
//! A [`Code`] is produced by [`CodeBuilder`](super::CodeBuilder) (or deserialized with
//! [`Code::from_bytes`]) and shared through an `Arc` by every function object and frame created
//! from it.

use std::{fmt, sync::Arc, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A compile-time constant.
///
/// Constants are restricted to values that can be serialized; they are materialized into
/// [`Value`]s once per code object, on first use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Bytes(Vec<u8>),
    Tuple(Vec<Constant>),
    /// Body of a nested function or class.
    Code(Arc<Code>),
}

impl Constant {
    fn to_value(&self) -> Value {
        match self {
            Self::None => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::Str(s) => Value::Str(s.clone()),
            Self::Bytes(data) => Value::bytes(data),
            Self::Tuple(items) => Value::tuple(items.iter().map(Self::to_value).collect()),
            Self::Code(code) => Value::Code(code.clone()),
        }
    }

    /// Whether two constants may share a pool slot.
    ///
    /// Stricter than `==`: `1`, `1.0` and `True` compare equal but must stay distinct, as must
    /// `0.0` and `-0.0`.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y)),
            (Self::Code(a), Self::Code(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Constant {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Constant {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Constant {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<Code> for Constant {
    fn from(code: Code) -> Self {
        Self::Code(Arc::new(code))
    }
}

/// Code object flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeFlags(u8);

impl CodeFlags {
    /// Calling the function creates a generator instead of running the body.
    pub const GENERATOR: Self = Self(1);
    /// The slot after the named parameters receives surplus positional arguments as a tuple.
    pub const VARARGS: Self = Self(1 << 1);
    /// The next slot receives surplus keyword arguments as a dict.
    pub const VARKEYWORDS: Self = Self(1 << 2);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Maps bytecode offsets to source lines.
///
/// Stored as `(offset delta, line delta)` byte pairs, one pair per point where the line changes.
/// Offsets only grow; line deltas are signed so loops that jump back to an earlier line still
/// encode compactly. Large deltas are split across several pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTable {
    deltas: Vec<(u8, i8)>,
}

impl LineTable {
    /// Records that the instruction at `offset_delta` bytes past the previous entry starts
    /// `line_delta` lines after it.
    pub(crate) fn push(&mut self, mut offset_delta: usize, mut line_delta: i64) {
        while offset_delta > usize::from(u8::MAX) {
            self.deltas.push((u8::MAX, 0));
            offset_delta -= usize::from(u8::MAX);
        }
        while line_delta > i64::from(i8::MAX) {
            self.deltas.push((offset_delta as u8, i8::MAX));
            offset_delta = 0;
            line_delta -= i64::from(i8::MAX);
        }
        while line_delta < i64::from(i8::MIN) {
            self.deltas.push((offset_delta as u8, i8::MIN));
            offset_delta = 0;
            line_delta -= i64::from(i8::MIN);
        }
        self.deltas.push((offset_delta as u8, line_delta as i8));
    }

    /// Source line of the instruction at `offset`.
    #[must_use]
    pub fn line_for(&self, offset: usize, first_line: u32) -> u32 {
        let mut line = i64::from(first_line);
        let mut address = 0usize;
        for &(offset_delta, line_delta) in &self.deltas {
            address += usize::from(offset_delta);
            if address > offset {
                break;
            }
            line += i64::from(line_delta);
        }
        u32::try_from(line.max(0)).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// A compiled function body.
#[derive(Serialize, Deserialize)]
pub struct Code {
    pub(super) name: Arc<str>,
    pub(super) bytecode: Vec<u8>,
    pub(super) constants: Vec<Constant>,
    /// Global, attribute and class-body names.
    pub(super) names: Vec<Arc<str>>,
    /// Local slot names; parameters come first.
    pub(super) varnames: Vec<Arc<str>>,
    /// Locals captured by nested functions.
    pub(super) cellvars: Vec<Arc<str>>,
    /// Cells received from the enclosing function.
    pub(super) freevars: Vec<Arc<str>>,
    pub(super) line_table: LineTable,
    pub(super) first_line: u32,
    pub(super) stack_size: u16,
    pub(super) arg_count: u16,
    pub(super) flags: CodeFlags,
    #[serde(skip)]
    values: OnceLock<Vec<Value>>,
}

impl Code {
    #[expect(clippy::too_many_arguments, reason = "only called by CodeBuilder::build")]
    pub(super) fn new(
        name: Arc<str>,
        bytecode: Vec<u8>,
        constants: Vec<Constant>,
        names: Vec<Arc<str>>,
        varnames: Vec<Arc<str>>,
        cellvars: Vec<Arc<str>>,
        freevars: Vec<Arc<str>>,
        line_table: LineTable,
        first_line: u32,
        stack_size: u16,
        arg_count: u16,
        flags: CodeFlags,
    ) -> Self {
        Self {
            name,
            bytecode,
            constants,
            names,
            varnames,
            cellvars,
            freevars,
            line_table,
            first_line,
            stack_size,
            arg_count,
            flags,
            values: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    #[must_use]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// The constant pool as runtime values, built on first access.
    pub(crate) fn constant_values(&self) -> &[Value] {
        self.values
            .get_or_init(|| self.constants.iter().map(Constant::to_value).collect())
    }

    #[must_use]
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    #[must_use]
    pub fn varnames(&self) -> &[Arc<str>] {
        &self.varnames
    }

    #[must_use]
    pub fn cellvars(&self) -> &[Arc<str>] {
        &self.cellvars
    }

    #[must_use]
    pub fn freevars(&self) -> &[Arc<str>] {
        &self.freevars
    }

    /// Name of cell-or-free slot `index`, cells first.
    #[must_use]
    pub fn deref_name(&self, index: usize) -> Option<&str> {
        let name = if index < self.cellvars.len() {
            self.cellvars.get(index)
        } else {
            self.freevars.get(index - self.cellvars.len())
        };
        name.map(|name| &**name)
    }

    #[must_use]
    pub fn line_table(&self) -> &LineTable {
        &self.line_table
    }

    #[must_use]
    pub fn first_line(&self) -> u32 {
        self.first_line
    }

    /// Source line of the instruction starting at `offset`.
    #[must_use]
    pub fn line_for(&self, offset: usize) -> u32 {
        self.line_table.line_for(offset, self.first_line)
    }

    /// Upper bound on the value-stack depth of any frame running this code.
    #[must_use]
    pub fn stack_size(&self) -> usize {
        usize::from(self.stack_size)
    }

    /// Number of named positional parameters.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        usize::from(self.arg_count)
    }

    #[must_use]
    pub fn flags(&self) -> CodeFlags {
        self.flags
    }

    #[must_use]
    pub fn is_generator(&self) -> bool {
        self.flags.contains(CodeFlags::GENERATOR)
    }

    /// Serializes the code object (including nested code constants).
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes a code object written by [`Code::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Code")
            .field("name", &self.name)
            .field("bytecode_len", &self.bytecode.len())
            .field("constants", &self.constants.len())
            .field("stack_size", &self.stack_size)
            .field("arg_count", &self.arg_count)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Code {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.bytecode == other.bytecode
            && self.constants == other.constants
            && self.names == other.names
            && self.varnames == other.varnames
            && self.cellvars == other.cellvars
            && self.freevars == other.freevars
            && self.line_table == other.line_table
            && self.first_line == other.first_line
            && self.stack_size == other.stack_size
            && self.arg_count == other.arg_count
            && self.flags == other.flags
    }
}
