//! Arithmetic and bitwise operators, falling back to special methods on instances.

use super::VM;
use crate::{
    exception_private::{ExcType, RunResult},
    function::CallContext,
    io::PrintWriter,
    ops::{self, BinaryOp, UnaryOp},
    resource::{LARGE_RESULT_THRESHOLD, ResourceTracker},
    tracer::VmTracer,
    value::Value,
};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// `lhs <op> rhs`
    ///
    /// Builtin operands are handled directly; otherwise `lhs.__op__(rhs)` and then
    /// `rhs.__rop__(lhs)` are tried, and the first one defined wins.
    pub(super) fn binary(&mut self, op: BinaryOp, lhs: &Value, rhs: &Value) -> RunResult<Value> {
        if op == BinaryOp::Mul
            && let Some(len) = ops::repeat_result_len(lhs, rhs)
            && len > LARGE_RESULT_THRESHOLD
        {
            self.tracker.check_large_result(len.saturating_mul(size_of::<Value>()))?;
        }
        if let Some(result) = ops::binary_op(op, lhs, rhs)? {
            self.track_allocation()?;
            return Ok(result);
        }
        if let Some(result) = self.call_special(lhs, op.dunder(), vec![rhs.clone()])? {
            return Ok(result);
        }
        if let Some(result) = self.call_special(rhs, op.reflected_dunder(), vec![lhs.clone()])? {
            return Ok(result);
        }
        Err(ExcType::type_error(format_args!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            self.runtime.value_type_name(lhs),
            self.runtime.value_type_name(rhs)
        )))
    }

    /// `lhs <op>= rhs`: mutates `lhs` when it supports that, otherwise rebinds to `lhs <op> rhs`.
    pub(super) fn inplace(&mut self, op: BinaryOp, lhs: Value, rhs: &Value) -> RunResult<Value> {
        if ops::inplace_op(op, &lhs, rhs)? {
            return Ok(lhs);
        }
        if op == BinaryOp::Add
            && let Value::List(list) = &lhs
        {
            // any iterable extends a list
            let items = self.collect(rhs)?;
            list.lock().extend(items);
            return Ok(lhs);
        }
        if let Some(result) = self.call_special(&lhs, op.inplace_dunder(), vec![rhs.clone()])? {
            return Ok(result);
        }
        self.binary(op, &lhs, rhs)
    }

    /// `<op> operand`
    pub(super) fn unary(&mut self, op: UnaryOp, operand: &Value) -> RunResult<Value> {
        if op == UnaryOp::Not {
            return Ok(Value::Bool(!self.truthy(operand)?));
        }
        if let Some(result) = ops::unary_op(op, operand)? {
            return Ok(result);
        }
        if let Some(dunder) = op.dunder()
            && let Some(result) = self.call_special(operand, dunder, Vec::new())?
        {
            return Ok(result);
        }
        Err(ExcType::type_error(format_args!(
            "bad operand type for {}: '{}'",
            op.symbol(),
            self.runtime.value_type_name(operand)
        )))
    }
}
