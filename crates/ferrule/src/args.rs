use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    exception_private::{ExcType, RunError, RunResult},
    value::Value,
};

/// Arguments for a call: positional values plus keyword pairs in call order.
///
/// Most calls pass a handful of positional arguments, so they are stored inline.
#[derive(Debug, Clone, Default)]
pub struct ArgValues {
    pub positional: SmallVec<[Value; 4]>,
    pub keywords: Vec<(Arc<str>, Value)>,
}

impl ArgValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keywords: Vec::new(),
        }
    }

    #[must_use]
    pub fn one(value: Value) -> Self {
        Self::positional([value])
    }

    /// Adds a keyword argument.
    #[must_use]
    pub fn with_keyword(mut self, name: impl Into<Arc<str>>, value: Value) -> Self {
        self.keywords.push((name.into(), value));
        self
    }

    /// Prepends a receiver, used when calling bound methods.
    pub fn prepend(&mut self, receiver: Value) {
        self.positional.insert(0, receiver);
    }

    /// Number of positional arguments.
    #[must_use]
    pub fn count(&self) -> usize {
        self.positional.len()
    }

    /// Removes and returns a keyword argument by name.
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(key, _)| &**key == name)?;
        Some(self.keywords.remove(index).1)
    }

    pub fn check_no_kwargs(&self, name: &str) -> RunResult<()> {
        if self.keywords.is_empty() {
            Ok(())
        } else {
            Err(ExcType::type_error(format_args!("{name}() takes no keyword arguments")))
        }
    }

    pub fn check_zero_args(self, name: &str) -> RunResult<()> {
        self.check_no_kwargs(name)?;
        match self.count() {
            0 => Ok(()),
            n => Err(ExcType::type_error(format_args!("{name}() takes no arguments ({n} given)"))),
        }
    }

    pub fn get_one_arg(self, name: &str) -> RunResult<Value> {
        self.check_no_kwargs(name)?;
        let [a] = self.exact::<1>(name)?;
        Ok(a)
    }

    pub fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        self.check_no_kwargs(name)?;
        let [a, b] = self.exact::<2>(name)?;
        Ok((a, b))
    }

    pub fn get_zero_one_arg(self, name: &str) -> RunResult<Option<Value>> {
        self.check_no_kwargs(name)?;
        let count = self.count();
        let mut it = self.positional.into_iter();
        match count {
            0 | 1 => Ok(it.next()),
            _ => Err(at_most(name, 1, count)),
        }
    }

    pub fn get_one_two_args(self, name: &str) -> RunResult<(Value, Option<Value>)> {
        self.check_no_kwargs(name)?;
        let count = self.count();
        let mut it = self.positional.into_iter();
        match (it.next(), count) {
            (Some(a), 1 | 2) => Ok((a, it.next())),
            (None, _) => Err(ExcType::type_error(format_args!(
                "{name} expected at least 1 argument, got 0"
            ))),
            _ => Err(at_most(name, 2, count)),
        }
    }

    pub fn get_zero_one_two_args(self, name: &str) -> RunResult<(Option<Value>, Option<Value>)> {
        self.check_no_kwargs(name)?;
        let count = self.count();
        if count > 2 {
            return Err(at_most(name, 2, count));
        }
        let mut it = self.positional.into_iter();
        Ok((it.next(), it.next()))
    }

    /// Positional arguments as a vector, rejecting keywords.
    pub fn into_positional(self, name: &str) -> RunResult<Vec<Value>> {
        self.check_no_kwargs(name)?;
        Ok(self.positional.into_vec())
    }

    fn exact<const N: usize>(self, name: &str) -> RunResult<[Value; N]> {
        let count = self.count();
        <[Value; N]>::try_from(self.positional.into_vec()).map_err(|_| {
            if N == 1 {
                ExcType::type_error(format_args!("{name}() takes exactly one argument ({count} given)"))
            } else {
                ExcType::type_error(format_args!("{name} expected {N} arguments, got {count}"))
            }
        })
    }
}

fn at_most(name: &str, max: usize, count: usize) -> RunError {
    ExcType::type_error(format_args!("{name} expected at most {max} arguments, got {count}"))
}
