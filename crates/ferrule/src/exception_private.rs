use std::{borrow::Cow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    exception_public::{Exception, StackFrame},
    runtime::Runtime,
    value::Value,
};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Builtin exception classes.
///
/// Every variant is materialized as a real type in the [`Runtime`] type registry, so user classes
/// can inherit from them and `except` clauses match through the ordinary MRO subtype check.
///
/// Variants are declared parents-first: iterating in declaration order always visits a class
/// after its base, which is what registry construction relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
pub enum ExcType {
    /// Root of the hierarchy.
    BaseException,
    SystemExit,
    KeyboardInterrupt,
    /// Thrown into a generator by `close()`.
    GeneratorExit,
    /// Base class for all ordinary exceptions.
    Exception,
    StopIteration,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    FloatingPointError,
    OverflowError,
    ZeroDivisionError,

    AssertionError,
    AttributeError,
    BufferError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    MemoryError,

    // --- NameError hierarchy ---
    NameError,
    /// Local variable read before assignment.
    UnboundLocalError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    NotImplementedError,
    RecursionError,

    TimeoutError,
    TypeError,
    ValueError,
}

impl ExcType {
    /// Direct base class of this exception type, `None` for `BaseException`.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        let parent = match self {
            Self::BaseException => return None,
            Self::SystemExit | Self::KeyboardInterrupt | Self::GeneratorExit | Self::Exception => Self::BaseException,
            Self::FloatingPointError | Self::OverflowError | Self::ZeroDivisionError => Self::ArithmeticError,
            Self::IndexError | Self::KeyError => Self::LookupError,
            Self::UnboundLocalError => Self::NameError,
            Self::NotImplementedError | Self::RecursionError => Self::RuntimeError,
            _ => Self::Exception,
        };
        Some(parent)
    }

    /// Whether `self` would be caught by `except handler:`.
    ///
    /// Only consults the builtin hierarchy; user-defined subclasses go through the registry.
    #[must_use]
    pub fn is_subclass_of(self, handler: Self) -> bool {
        let mut current = Some(self);
        while let Some(exc_type) = current {
            if exc_type == handler {
                return true;
            }
            current = exc_type.parent();
        }
        false
    }

    #[must_use]
    pub(crate) fn type_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    #[must_use]
    pub(crate) fn value_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    #[must_use]
    pub(crate) fn index_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::IndexError, msg).into()
    }

    #[must_use]
    pub(crate) fn runtime_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::RuntimeError, msg).into()
    }

    #[must_use]
    pub(crate) fn overflow_error(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::OverflowError, msg).into()
    }

    #[must_use]
    pub(crate) fn zero_division(msg: &'static str) -> RunError {
        SimpleException::new_msg(Self::ZeroDivisionError, msg).into()
    }

    /// `'list' object has no attribute 'foo'`
    #[must_use]
    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format_args!("'{type_name}' object has no attribute '{attr}'"),
        )
        .into()
    }

    /// An `AttributeError` with a free-form message.
    #[must_use]
    pub(crate) fn attribute_error_msg(msg: impl fmt::Display) -> RunError {
        SimpleException::new_msg(Self::AttributeError, msg).into()
    }

    #[must_use]
    pub(crate) fn name_error(name: &str) -> RunError {
        SimpleException::new_msg(Self::NameError, format_args!("name '{name}' is not defined")).into()
    }

    #[must_use]
    pub(crate) fn key_error(key: &str) -> RunError {
        SimpleException::new_msg(Self::KeyError, format_args!("'{key}'")).into()
    }

    /// Used when an object is called, iterated, or subscripted in a way its type does not support.
    #[must_use]
    pub(crate) fn not_supported(type_name: &str, what: &str) -> RunError {
        Self::type_error(format_args!("'{type_name}' object {what}"))
    }
}

/// An exception raised by native code before it is materialized as an instance.
///
/// Builtins and the byte buffer raise these cheaply; the VM converts them into a real exception
/// instance only if a handler needs to see the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleException {
    exc_type: ExcType,
    message: Option<String>,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType, message: Option<String>) -> Self {
        Self { exc_type, message }
    }

    #[must_use]
    pub fn new_msg(exc_type: ExcType, message: impl fmt::Display) -> Self {
        Self {
            exc_type,
            message: Some(message.to_string()),
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) if !msg.is_empty() => write!(f, "{}: {msg}", self.exc_type),
            _ => write!(f, "{}", self.exc_type),
        }
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(ExceptionRaise::new(RaisedException::Simple(exc))))
    }
}

/// One traceback entry: the function an exception passed through and the line it was on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStackFrame {
    pub function: Arc<str>,
    pub line: u32,
}

/// The payload of a raised exception.
#[derive(Debug, Clone)]
pub enum RaisedException {
    /// Raised from native code, not yet turned into an instance.
    Simple(SimpleException),
    /// An exception instance (always a `Value::Instance` whose type derives from `BaseException`).
    Object(Value),
}

/// A raised exception together with the traceback accumulated while it propagates.
///
/// Traceback entries are appended innermost first, one per frame the exception leaves.
#[derive(Debug, Clone)]
pub struct ExceptionRaise {
    pub exc: RaisedException,
    pub traceback: Vec<RawStackFrame>,
}

impl ExceptionRaise {
    #[must_use]
    pub fn new(exc: RaisedException) -> Self {
        Self {
            exc,
            traceback: Vec::new(),
        }
    }

    /// Builtin class the exception is or derives from.
    #[must_use]
    pub fn exc_type(&self, runtime: &Runtime) -> ExcType {
        match &self.exc {
            RaisedException::Simple(simple) => simple.exc_type,
            RaisedException::Object(value) => runtime.builtin_exc_type_of(value).unwrap_or(ExcType::Exception),
        }
    }

    /// Whether the raised exception is an instance of the builtin class `exc_type` (or a subclass).
    #[must_use]
    pub fn is(&self, runtime: &Runtime, exc_type: ExcType) -> bool {
        match &self.exc {
            RaisedException::Simple(simple) => simple.exc_type.is_subclass_of(exc_type),
            RaisedException::Object(value) => runtime.is_instance(value, runtime.exc_type_id(exc_type)),
        }
    }

    /// Human-readable message derived from the exception's arguments.
    #[must_use]
    pub fn message(&self, runtime: &Runtime) -> Option<String> {
        match &self.exc {
            RaisedException::Simple(simple) => simple.message.clone(),
            RaisedException::Object(value) => {
                let text = runtime.exception_str(value);
                (!text.is_empty()).then_some(text)
            }
        }
    }

    pub(crate) fn push_frame(&mut self, frame: RawStackFrame) {
        self.traceback.push(frame);
    }
}

/// Errors that terminate or unwind execution.
#[derive(Debug, Clone)]
pub enum RunError {
    /// Interpreter consistency violation: stack underflow, a control marker escaping its frame,
    /// malformed bytecode. Never caught by handlers.
    Internal(Cow<'static, str>),
    /// An ordinary exception that `except` clauses can handle.
    Exc(Box<ExceptionRaise>),
    /// Resource-limit violations; propagate straight to the host.
    UncatchableExc(Box<ExceptionRaise>),
}

impl RunError {
    #[must_use]
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// Raises an exception instance.
    #[must_use]
    pub fn raise_object(value: Value) -> Self {
        Self::Exc(Box::new(ExceptionRaise::new(RaisedException::Object(value))))
    }

    /// Whether this is a catchable exception of class `exc_type` (or a subclass).
    #[must_use]
    pub fn is_exc(&self, runtime: &Runtime, exc_type: ExcType) -> bool {
        matches!(self, Self::Exc(raise) if raise.is(runtime, exc_type))
    }

    /// Converts into the public exception representation handed to hosts.
    #[must_use]
    pub fn into_exception(self, runtime: &Runtime) -> Exception {
        match self {
            Self::Internal(msg) => Exception::internal(msg.into_owned()),
            Self::Exc(raise) | Self::UncatchableExc(raise) => {
                let exc_type = raise.exc_type(runtime);
                let type_name = match &raise.exc {
                    RaisedException::Simple(simple) => simple.exc_type.to_string(),
                    RaisedException::Object(value) => runtime.type_name(runtime.type_of(value)).to_string(),
                };
                let message = raise.message(runtime);
                // most recent call last
                let traceback = raise
                    .traceback
                    .iter()
                    .rev()
                    .map(|frame| StackFrame::new(frame.function.to_string(), frame.line))
                    .collect();
                Exception::new(Some(exc_type), type_name, message, traceback)
            }
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Exc(raise) | Self::UncatchableExc(raise) => match &raise.exc {
                RaisedException::Simple(simple) => write!(f, "{simple}"),
                RaisedException::Object(_) => f.write_str("exception instance"),
            },
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_hierarchy() {
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::GeneratorExit.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::ValueError));
    }

    #[test]
    fn simple_display() {
        let exc = SimpleException::new_msg(ExcType::ValueError, "bad value");
        assert_eq!(exc.to_string(), "ValueError: bad value");
        let bare = SimpleException::new(ExcType::StopIteration, None);
        assert_eq!(bare.to_string(), "StopIteration");
    }
}
