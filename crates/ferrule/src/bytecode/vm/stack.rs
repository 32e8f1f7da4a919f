//! The per-frame operand stack.

use crate::{
    exception_private::{RunError, RunResult},
    value::Value,
};

/// Control-transfer markers pushed while a finally or with handler runs.
///
/// `EndFinally` pops the marker and resumes whatever was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwindMarker {
    /// The protected body completed normally.
    Normal,
    /// An exception is pending; the traceback and value sit beneath the marker.
    Exception,
    /// A return is pending; the return value sits beneath the marker.
    Return,
    Break,
    /// `continue` is pending; execution resumes at `target` once the handler finishes.
    Continue { target: usize },
}

/// One operand stack entry.
#[derive(Debug, Clone)]
pub enum StackSlot {
    Value(Value),
    Marker(UnwindMarker),
}

fn underflow() -> RunError {
    RunError::internal("value stack underflow")
}

fn marker_as_value() -> RunError {
    RunError::internal("unwind marker used as a value")
}

/// Operand stack with a capacity fixed by the code object's stack bound.
#[derive(Debug, Default)]
pub struct ValueStack {
    slots: Vec<StackSlot>,
    capacity: usize,
}

impl ValueStack {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, value: Value) {
        self.push_slot(StackSlot::Value(value));
    }

    pub fn push_marker(&mut self, marker: UnwindMarker) {
        self.push_slot(StackSlot::Marker(marker));
    }

    pub fn push_slot(&mut self, slot: StackSlot) {
        debug_assert!(
            self.slots.len() < self.capacity,
            "value stack exceeds its declared bound of {}",
            self.capacity
        );
        self.slots.push(slot);
    }

    pub fn pop_slot(&mut self) -> RunResult<StackSlot> {
        self.slots.pop().ok_or_else(underflow)
    }

    /// Pops a value; a marker on top is an internal error.
    pub fn pop(&mut self) -> RunResult<Value> {
        match self.pop_slot()? {
            StackSlot::Value(value) => Ok(value),
            StackSlot::Marker(_) => Err(marker_as_value()),
        }
    }

    /// Slot `depth` positions below the top (0 is the top).
    pub fn peek_slot(&self, depth: usize) -> RunResult<&StackSlot> {
        let index = self.index_of(depth)?;
        Ok(&self.slots[index])
    }

    pub fn peek(&self, depth: usize) -> RunResult<&Value> {
        match self.peek_slot(depth)? {
            StackSlot::Value(value) => Ok(value),
            StackSlot::Marker(_) => Err(marker_as_value()),
        }
    }

    /// Replaces the slot `depth` positions below the top.
    pub fn set_at(&mut self, depth: usize, value: Value) -> RunResult<()> {
        let index = self.index_of(depth)?;
        self.slots[index] = StackSlot::Value(value);
        Ok(())
    }

    /// Pops `n` values, returned in the order they were pushed.
    pub fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        let start = self.slots.len().checked_sub(n).ok_or_else(underflow)?;
        self.slots
            .drain(start..)
            .map(|slot| match slot {
                StackSlot::Value(value) => Ok(value),
                StackSlot::Marker(_) => Err(marker_as_value()),
            })
            .collect()
    }

    pub fn dup_top(&mut self) -> RunResult<()> {
        let top = self.peek_slot(0)?.clone();
        self.push_slot(top);
        Ok(())
    }

    /// Duplicates the top `n` slots, keeping their order.
    pub fn dup_top_n(&mut self, n: usize) -> RunResult<()> {
        let start = self.slots.len().checked_sub(n).ok_or_else(underflow)?;
        for i in start..start + n {
            let slot = self.slots[i].clone();
            self.push_slot(slot);
        }
        Ok(())
    }

    /// Moves the top slot down `n - 1` positions: `[a, b, c]` with `n = 3` becomes `[c, a, b]`.
    pub fn rotate_top(&mut self, n: usize) -> RunResult<()> {
        let start = self.slots.len().checked_sub(n).ok_or_else(underflow)?;
        if n > 1 {
            self.slots[start..].rotate_right(1);
        }
        Ok(())
    }

    /// Removes the slot `depth` positions below the top.
    pub fn remove_at(&mut self, depth: usize) -> RunResult<StackSlot> {
        let index = self.index_of(depth)?;
        Ok(self.slots.remove(index))
    }

    /// Drops every slot above `level`.
    pub fn truncate(&mut self, level: usize) {
        self.slots.truncate(level);
    }

    /// Moves the contents out, leaving the stack empty. Used when a generator suspends.
    pub fn take_snapshot(&mut self) -> Vec<StackSlot> {
        std::mem::take(&mut self.slots)
    }

    /// Reinstates contents saved by [`take_snapshot`](Self::take_snapshot).
    pub fn restore_snapshot(&mut self, slots: Vec<StackSlot>) {
        debug_assert!(self.slots.is_empty(), "restoring over a live stack");
        self.slots = slots;
        self.slots.reserve(self.capacity.saturating_sub(self.slots.len()));
    }

    fn index_of(&self, depth: usize) -> RunResult<usize> {
        self.slots
            .len()
            .checked_sub(depth + 1)
            .ok_or_else(underflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(stack: &mut ValueStack) -> Vec<i64> {
        stack
            .take_snapshot()
            .into_iter()
            .map(|slot| match slot {
                StackSlot::Value(v) => v.as_int().unwrap(),
                StackSlot::Marker(_) => -1,
            })
            .collect()
    }

    fn stack_of(values: &[i64]) -> ValueStack {
        let mut stack = ValueStack::with_capacity(8);
        for &v in values {
            stack.push(Value::Int(v));
        }
        stack
    }

    #[test]
    fn pop_n_keeps_push_order() {
        let mut stack = stack_of(&[1, 2, 3]);
        let popped = stack.pop_n(2).unwrap();
        assert_eq!(popped, vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(stack.len(), 1);
        assert!(stack.pop_n(2).is_err());
    }

    #[test]
    fn rotate_and_dup() {
        let mut stack = stack_of(&[1, 2, 3]);
        stack.rotate_top(3).unwrap();
        assert_eq!(ints(&mut stack), vec![3, 1, 2]);

        let mut stack = stack_of(&[1, 2]);
        stack.dup_top_n(2).unwrap();
        assert_eq!(ints(&mut stack), vec![1, 2, 1, 2]);
    }

    #[test]
    fn underflow_is_internal_error() {
        let mut stack = ValueStack::with_capacity(1);
        assert!(matches!(stack.pop(), Err(RunError::Internal(_))));
        assert!(matches!(stack.peek(0), Err(RunError::Internal(_))));
    }

    #[test]
    fn markers_are_not_values() {
        let mut stack = ValueStack::with_capacity(2);
        stack.push_marker(UnwindMarker::Break);
        assert!(stack.peek(0).is_err());
        assert!(matches!(stack.pop(), Err(RunError::Internal(_))));
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut stack = stack_of(&[1, 2, 3]);
        let saved = stack.take_snapshot();
        assert!(stack.is_empty());
        stack.restore_snapshot(saved);
        stack.push(Value::Int(4));
        assert_eq!(ints(&mut stack), vec![1, 2, 3, 4]);
    }
}
