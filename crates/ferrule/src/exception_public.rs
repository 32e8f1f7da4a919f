use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exception_private::ExcType;

/// A frame in an exception traceback, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub function: String,
    pub line: u32,
}

impl StackFrame {
    #[must_use]
    pub fn new(function: String, line: u32) -> Self {
        Self { function, line }
    }
}

/// An uncaught exception as reported to the host.
///
/// Produced by [`RunError::into_exception`](crate::RunError::into_exception). Carries the class
/// name (which may be a user-defined subclass), the nearest builtin exception class, the message,
/// and the traceback in "most recent call last" order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    exc_type: Option<ExcType>,
    type_name: String,
    message: Option<String>,
    traceback: Vec<StackFrame>,
}

impl Exception {
    #[must_use]
    pub fn new(exc_type: Option<ExcType>, type_name: String, message: Option<String>, traceback: Vec<StackFrame>) -> Self {
        Self {
            exc_type,
            type_name,
            message,
            traceback,
        }
    }

    /// Interpreter failure that is not a language-level exception.
    #[must_use]
    pub fn internal(message: String) -> Self {
        Self {
            exc_type: None,
            type_name: "InternalError".to_owned(),
            message: Some(message),
            traceback: Vec::new(),
        }
    }

    /// Builtin exception class this exception is or derives from; `None` for internal errors.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        self.exc_type
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn traceback(&self) -> &[StackFrame] {
        &self.traceback
    }

    /// The final `Type: message` line of the traceback.
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.message {
            Some(msg) => format!("{}: {msg}", self.type_name),
            None => self.type_name.clone(),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.traceback.is_empty() {
            writeln!(f, "Traceback (most recent call last):")?;
            for frame in &self.traceback {
                writeln!(f, "  line {}, in {}", frame.line, frame.function)?;
            }
        }
        f.write_str(&self.summary())
    }
}

impl std::error::Error for Exception {}
