//! Iterators over builtin containers.
//!
//! Generators and instances implementing `__next__` are advanced by the VM; everything that can
//! be stepped without running user code is an [`IterState`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    types::{ByteBuffer, Range},
    value::Value,
};

#[derive(Debug)]
pub enum IterState {
    /// Live view over a list: items appended during iteration are visited.
    List { list: Arc<Mutex<Vec<Value>>>, index: usize },
    Tuple { items: Arc<[Value]>, index: usize },
    Chars { chars: Vec<char>, index: usize },
    /// Live view over a bytearray, or a fixed bytes object.
    Bytes { source: ByteSource, index: usize },
    /// Keys captured when iteration started.
    DictKeys { keys: Vec<Arc<str>>, index: usize },
    Range { range: Range, index: usize },
}

#[derive(Debug)]
pub enum ByteSource {
    Fixed(Arc<ByteBuffer>),
    Shared(Arc<Mutex<ByteBuffer>>),
}

impl IterState {
    /// Returns the next item, or `None` when exhausted.
    pub fn next_item(&mut self) -> Option<Value> {
        match self {
            Self::List { list, index } => {
                let item = list.lock().get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            Self::Tuple { items, index } => {
                let item = items.get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            Self::Chars { chars, index } => {
                let c = *chars.get(*index)?;
                *index += 1;
                Some(Value::str(c.to_string()))
            }
            Self::Bytes { source, index } => {
                let byte = match source {
                    ByteSource::Fixed(buffer) => buffer.get(*index).ok(),
                    ByteSource::Shared(buffer) => buffer.lock().get(*index).ok(),
                }?;
                *index += 1;
                Some(Value::Int(i64::from(byte)))
            }
            Self::DictKeys { keys, index } => {
                let key = keys.get(*index)?.clone();
                *index += 1;
                Some(Value::Str(key))
            }
            Self::Range { range, index } => {
                let item = range.get(*index)?;
                *index += 1;
                Some(Value::Int(item))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_iteration_sees_appends() {
        let list = Arc::new(Mutex::new(vec![Value::Int(1)]));
        let mut state = IterState::List {
            list: list.clone(),
            index: 0,
        };
        assert_eq!(state.next_item(), Some(Value::Int(1)));
        list.lock().push(Value::Int(2));
        assert_eq!(state.next_item(), Some(Value::Int(2)));
        assert_eq!(state.next_item(), None);
    }

    #[test]
    fn bytes_yield_ints() {
        let mut state = IterState::Bytes {
            source: ByteSource::Fixed(Arc::new(ByteBuffer::immutable_from(b"AB"))),
            index: 0,
        };
        assert_eq!(state.next_item(), Some(Value::Int(65)));
        assert_eq!(state.next_item(), Some(Value::Int(66)));
        assert_eq!(state.next_item(), None);
    }
}
