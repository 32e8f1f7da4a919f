use std::{
    borrow::Cow,
    io::{self, Write as _},
};

use crate::exception_public::Exception;

/// Sink for output produced by the `print()` builtin.
///
/// Implement this to capture or redirect program output. [`StdPrint`] writes to stdout.
pub trait PrintWriter {
    /// Writes the text of a single printed argument, without separators or terminator.
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception>;

    /// Writes a separator or terminator string.
    fn stdout_push(&mut self, end: &str) -> Result<(), Exception>;
}

/// `PrintWriter` that writes to the process's stdout through a buffer.
///
/// The buffer is flushed on drop.
#[derive(Debug, Default)]
pub struct StdPrint {
    buffer: String,
}

impl StdPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.buffer.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: &str) -> Result<(), Exception> {
        self.buffer.push_str(end);
        Ok(())
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(self.buffer.as_bytes());
        let _ = stdout.flush();
    }
}

/// A `PrintWriter` that collects all output into a string.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.0.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: &str) -> Result<(), Exception> {
        self.0.push_str(end);
        Ok(())
    }
}

/// `PrintWriter` that discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> Result<(), Exception> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: &str) -> Result<(), Exception> {
        Ok(())
    }
}
