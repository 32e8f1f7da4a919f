use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{
    args::ArgValues,
    bytecode::{Code, ResumeValue},
    exception_private::RunResult,
    namespace::Namespace,
    runtime::Runtime,
    types::{Generator, GeneratorStep},
    value::Value,
};

/// Services the interpreter offers to native functions.
///
/// Builtins receive `&mut dyn CallContext` so they can call back into user code (dunder methods,
/// callables passed as arguments, generator resumption) without knowing the VM's type
/// parameters.
pub trait CallContext {
    fn runtime(&self) -> &Runtime;

    /// Calls any callable value.
    fn call(&mut self, callable: &Value, args: ArgValues) -> RunResult<Value>;

    /// `iter(value)`
    fn get_iter(&mut self, value: &Value) -> RunResult<Value>;

    /// Advances an iterator; `None` means exhausted.
    fn advance(&mut self, iterator: &Value) -> RunResult<Option<Value>>;

    /// `str(value)`, running `__str__` when defined.
    fn to_str(&mut self, value: &Value) -> RunResult<String>;

    /// `repr(value)`, running `__repr__` when defined.
    fn to_repr(&mut self, value: &Value) -> RunResult<String>;

    /// `obj.name`, with descriptor binding.
    fn get_attr(&mut self, obj: &Value, name: &str) -> RunResult<Value>;

    /// `obj.name = value`, honouring property setters.
    fn set_attr(&mut self, obj: &Value, name: &str, value: Value) -> RunResult<()>;

    /// `a == b`, running `__eq__` when defined.
    fn equals(&mut self, a: &Value, b: &Value) -> RunResult<bool>;

    /// `bool(value)`, running `__bool__`/`__len__` when defined.
    fn is_truthy(&mut self, value: &Value) -> RunResult<bool>;

    /// `len(value)`, running `__len__` when defined.
    fn length(&mut self, value: &Value) -> RunResult<usize>;

    /// Writes already formatted print arguments to the VM's output.
    fn print(&mut self, parts: &[String], sep: &str, end: &str) -> RunResult<()>;

    /// Resumes a generator with a sent value or a thrown exception.
    fn resume_generator(&mut self, generator: &Arc<Generator>, value: ResumeValue) -> RunResult<GeneratorStep>;

    /// Charges one allocation against the resource tracker.
    fn track_allocation(&mut self) -> RunResult<()>;

    /// Drains an iterable into a vector.
    fn collect(&mut self, iterable: &Value) -> RunResult<Vec<Value>> {
        if let Some(items) = iterable.sequence_items() {
            return Ok(items);
        }
        let iterator = self.get_iter(iterable)?;
        let mut items = Vec::new();
        while let Some(item) = self.advance(&iterator)? {
            items.push(item);
        }
        Ok(items)
    }
}

/// Signature of builtin functions and builtin methods.
///
/// Methods receive their receiver as the first positional argument.
pub type NativeFn = fn(&mut dyn CallContext, ArgValues) -> RunResult<Value>;

/// A named builtin function.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeFunction {
    #[must_use]
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A closure cell shared between a defining frame and the functions that capture it.
#[derive(Debug, Default)]
pub struct Cell(Mutex<Option<Value>>);

impl Cell {
    #[must_use]
    pub fn new(value: Option<Value>) -> Self {
        Self(Mutex::new(value))
    }

    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.0.lock().clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.lock() = Some(value);
    }

    /// Unbinds the cell, returning whether it was bound.
    pub fn clear(&self) -> bool {
        self.0.lock().take().is_some()
    }
}

/// A user-defined function: code plus the environment it was created in.
#[derive(Debug)]
pub struct Function {
    code: Arc<Code>,
    globals: Namespace,
    defaults: Vec<Value>,
    closure: Vec<Arc<Cell>>,
}

impl Function {
    #[must_use]
    pub fn new(code: Arc<Code>, globals: Namespace, defaults: Vec<Value>, closure: Vec<Arc<Cell>>) -> Self {
        Self {
            code,
            globals,
            defaults,
            closure,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.code.name()
    }

    #[must_use]
    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }

    #[must_use]
    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// Default values for the trailing positional parameters.
    #[must_use]
    pub fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    #[must_use]
    pub fn closure(&self) -> &[Arc<Cell>] {
        &self.closure
    }
}

/// A callable bound to a receiver, produced by attribute lookup.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Value,
}

impl BoundMethod {
    #[must_use]
    pub fn new(receiver: Value, function: Value) -> Self {
        Self { receiver, function }
    }

    #[must_use]
    pub fn function_name(&self) -> &str {
        match &self.function {
            Value::Function(f) => f.name(),
            Value::Native(n) => n.name,
            _ => "?",
        }
    }
}

/// A `property(fget, fset, fdel)` descriptor.
#[derive(Debug, Clone, Default)]
pub struct Property {
    pub getter: Option<Value>,
    pub setter: Option<Value>,
    pub deleter: Option<Value>,
}

impl Property {
    #[must_use]
    pub fn new(getter: Option<Value>, setter: Option<Value>, deleter: Option<Value>) -> Self {
        Self {
            getter,
            setter,
            deleter,
        }
    }
}
