//! Bytecode virtual machine.
//!
//! The VM executes one [`Frame`] at a time with an operand stack and a block stack per frame.
//! Calls into user functions recurse through [`VM::execute_frame`]; the call depth is bounded by
//! the resource tracker. Control transfers that leave normal sequencing (exceptions, `return`,
//! `break`, `continue`) run the unwind procedure in [`exceptions`], which consults the block stack
//! for the nearest handler before the transfer escapes to the caller.

mod attr;
mod binary;
mod block;
mod call;
mod collections;
mod compare;
mod exceptions;
mod frame;
mod stack;

use std::{borrow::Cow, sync::Arc};

pub use block::{Block, BlockKind, BlockStack};
pub use exceptions::build_exception;
use exceptions::Why;
pub use frame::Frame;
pub use stack::{StackSlot, UnwindMarker, ValueStack};

use crate::{
    args::ArgValues,
    bytecode::{code::Code, op::Opcode},
    exception_private::{ExcType, ExceptionRaise, RaisedException, RunError, RunResult, SimpleException},
    exception_public::Exception,
    function::{CallContext, Cell, Function},
    io::PrintWriter,
    ops::{BinaryOp, CompareOp, UnaryOp},
    resource::ResourceTracker,
    runtime::Runtime,
    tracer::{FrameExitKind, NoopTracer, VmTracer},
    types::{Generator, GeneratorStep, SliceValue},
    value::Value,
};

/// How a frame execution ended without an exception.
#[derive(Debug, Clone)]
pub enum FrameExit {
    Return(Value),
    /// Suspended at a `yield`; the frame can be resumed with [`VM::resume_frame`].
    Yield(Value),
}

/// What a suspended frame is resumed with.
#[derive(Debug, Clone)]
pub enum ResumeValue {
    /// Becomes the result of the `yield` expression.
    Send(Value),
    /// An exception instance raised at the suspension point.
    Throw(Value),
}

/// Outcome of a single instruction that leaves normal sequencing.
enum Step {
    Yield(Value),
    Unwind(Why),
}

/// The interpreter.
///
/// Borrows the shared [`Runtime`] plus the host's resource tracker and print sink for the duration
/// of an execution. The tracer is owned so callers can inspect it afterwards with
/// [`VM::into_tracer`].
#[derive(Debug)]
pub struct VM<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer = NoopTracer> {
    runtime: &'a Runtime,
    tracker: &'a mut T,
    print: &'a mut P,
    tracer: Tr,
    /// Number of frames currently executing.
    depth: usize,
    /// Traceback and value of the exception the innermost handler is processing.
    handling: Option<(Value, Value)>,
}

impl<'a, T: ResourceTracker, P: PrintWriter> VM<'a, T, P> {
    pub fn new(runtime: &'a Runtime, tracker: &'a mut T, print: &'a mut P) -> Self {
        Self::with_tracer(runtime, tracker, print, NoopTracer)
    }
}

impl<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'a, T, P, Tr> {
    pub fn with_tracer(runtime: &'a Runtime, tracker: &'a mut T, print: &'a mut P, tracer: Tr) -> Self {
        Self {
            runtime,
            tracker,
            print,
            tracer,
            depth: 0,
            handling: None,
        }
    }

    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Runs a frame from its current instruction until it returns, yields or raises.
    pub fn execute_frame(&mut self, frame: &mut Frame) -> RunResult<FrameExit> {
        frame.started = true;
        self.enter_frame(frame, None)
    }

    /// Continues a frame suspended by [`FrameExit::Yield`], or starts a generator frame.
    ///
    /// A sent value becomes the result of the pending `yield`; a thrown exception is raised at the
    /// suspension point. A frame that has not started yet accepts only `Send(None)` or a throw.
    pub fn resume_frame(&mut self, frame: &mut Frame, value: ResumeValue) -> RunResult<FrameExit> {
        if !frame.started {
            let pending = match value {
                ResumeValue::Send(Value::None) => None,
                ResumeValue::Send(_) => {
                    return Err(ExcType::type_error(
                        "can't send non-None value to a just-started generator",
                    ));
                }
                ResumeValue::Throw(exc) => Some(Why::Exception(thrown(exc))),
            };
            frame.started = true;
            return self.enter_frame(frame, pending);
        }
        let Some(saved) = frame.saved_stack.take() else {
            return Err(RunError::internal("resumed a frame that is not suspended"));
        };
        frame.stack.restore_snapshot(saved);
        self.tracer.on_resume(frame.stack.len());
        let pending = match value {
            ResumeValue::Send(sent) => {
                frame.stack.push(sent);
                None
            }
            ResumeValue::Throw(exc) => Some(Why::Exception(thrown(exc))),
        };
        self.enter_frame(frame, pending)
    }

    fn enter_frame(&mut self, frame: &mut Frame, pending: Option<Why>) -> RunResult<FrameExit> {
        self.tracker.check_recursion_depth(self.depth)?;
        self.depth += 1;
        self.tracer.on_call(frame.code.name(), self.depth);
        let outer_handling = self.handling.clone();

        let result = self.run_frame(frame, pending);

        self.handling = outer_handling;
        if let Ok(FrameExit::Yield(_)) = &result {
            frame.saved_stack = Some(frame.stack.take_snapshot());
        }
        self.depth -= 1;
        self.tracer.on_return(self.depth);
        result
    }

    fn run_frame(&mut self, frame: &mut Frame, mut pending: Option<Why>) -> RunResult<FrameExit> {
        loop {
            let why = match pending.take() {
                Some(why) => why,
                None => match self.step(frame) {
                    Ok(None) => continue,
                    Ok(Some(Step::Yield(value))) => return Ok(FrameExit::Yield(value)),
                    Ok(Some(Step::Unwind(why))) => why,
                    Err(RunError::Exc(raise)) => Why::Exception(raise),
                    Err(err) => {
                        frame.stack.truncate(0);
                        frame.blocks.clear();
                        self.tracer.on_frame_exit(FrameExitKind::Raise, 0);
                        return Err(err);
                    }
                },
            };
            if let Some(exit) = self.unwind(frame, why)? {
                return Ok(exit);
            }
        }
    }

    /// Fetches and executes one instruction.
    fn step(&mut self, frame: &mut Frame) -> RunResult<Option<Step>> {
        self.tracker.check_time()?;
        let (op, arg) = fetch(frame)?;
        self.tracer
            .on_instruction(frame.instr_start, op, frame.stack.len(), self.depth);
        let index = usize::from(arg);

        match op {
            Opcode::Nop => {}
            Opcode::PopTop => {
                frame.stack.pop_slot()?;
            }
            Opcode::RotTwo => frame.stack.rotate_top(2)?,
            Opcode::RotThree => frame.stack.rotate_top(3)?,
            Opcode::RotFour => frame.stack.rotate_top(4)?,
            Opcode::RotN => frame.stack.rotate_top(index)?,
            Opcode::DupTop => frame.stack.dup_top()?,
            Opcode::DupTopN => frame.stack.dup_top_n(index)?,

            Opcode::LoadConst => {
                let value = frame
                    .code
                    .constant_values()
                    .get(index)
                    .cloned()
                    .ok_or_else(|| RunError::internal("constant index out of range"))?;
                frame.stack.push(value);
            }
            Opcode::LoadFast => {
                let value = match frame.locals.get(index) {
                    Some(Some(value)) => value.clone(),
                    Some(None) => return Err(unbound_local(&frame.code, index)),
                    None => return Err(RunError::internal("local slot out of range")),
                };
                frame.stack.push(value);
            }
            Opcode::StoreFast => {
                let value = frame.stack.pop()?;
                *local_slot(frame, index)? = Some(value);
            }
            Opcode::DeleteFast => {
                if local_slot(frame, index)?.take().is_none() {
                    return Err(unbound_local(&frame.code, index));
                }
            }
            Opcode::LoadGlobal => {
                let name = name_at(&frame.code, index)?;
                let value = frame
                    .globals
                    .get(&name)
                    .or_else(|| self.runtime.builtins().get(&name))
                    .ok_or_else(|| ExcType::name_error(&name))?;
                frame.stack.push(value);
            }
            Opcode::StoreGlobal => {
                let name = name_at(&frame.code, index)?;
                let value = frame.stack.pop()?;
                frame.globals.set(name, value);
            }
            Opcode::DeleteGlobal => {
                let name = name_at(&frame.code, index)?;
                if frame.globals.remove(&name).is_none() {
                    return Err(ExcType::name_error(&name));
                }
            }
            Opcode::LoadName => {
                let name = name_at(&frame.code, index)?;
                let value = frame
                    .names
                    .as_ref()
                    .and_then(|names| names.get(&name))
                    .or_else(|| frame.globals.get(&name))
                    .or_else(|| self.runtime.builtins().get(&name))
                    .ok_or_else(|| ExcType::name_error(&name))?;
                frame.stack.push(value);
            }
            Opcode::StoreName => {
                let name = name_at(&frame.code, index)?;
                let value = frame.stack.pop()?;
                frame.names.as_ref().unwrap_or(&frame.globals).set(name, value);
            }
            Opcode::DeleteName => {
                let name = name_at(&frame.code, index)?;
                if frame.names.as_ref().unwrap_or(&frame.globals).remove(&name).is_none() {
                    return Err(ExcType::name_error(&name));
                }
            }
            Opcode::LoadDeref => {
                let cell = cell_at(frame, index)?;
                let Some(value) = cell.get() else {
                    return Err(unbound_deref(&frame.code, index));
                };
                frame.stack.push(value);
            }
            Opcode::StoreDeref => {
                let value = frame.stack.pop()?;
                cell_at(frame, index)?.set(value);
            }
            Opcode::LoadClosure => {
                let cell = cell_at(frame, index)?.clone();
                frame.stack.push(Value::Cell(cell));
            }

            Opcode::LoadAttr => {
                let name = name_at(&frame.code, index)?;
                let obj = frame.stack.pop()?;
                let value = self.load_attr(&obj, &name)?;
                frame.stack.push(value);
            }
            Opcode::StoreAttr => {
                let name = name_at(&frame.code, index)?;
                let obj = frame.stack.pop()?;
                let value = frame.stack.pop()?;
                self.store_attr(&obj, &name, value)?;
            }
            Opcode::DeleteAttr => {
                let name = name_at(&frame.code, index)?;
                let obj = frame.stack.pop()?;
                self.delete_attr(&obj, &name)?;
            }
            Opcode::BinarySubscr => {
                let key = frame.stack.pop()?;
                let container = frame.stack.pop()?;
                let value = self.get_item(&container, &key)?;
                frame.stack.push(value);
            }
            Opcode::StoreSubscr => {
                let key = frame.stack.pop()?;
                let container = frame.stack.pop()?;
                let value = frame.stack.pop()?;
                self.set_item(&container, &key, value)?;
            }
            Opcode::DeleteSubscr => {
                let key = frame.stack.pop()?;
                let container = frame.stack.pop()?;
                self.del_item(&container, &key)?;
            }

            Opcode::BinaryOp => {
                let kind = operator(arg, BinaryOp::from_repr)?;
                let rhs = frame.stack.pop()?;
                let lhs = frame.stack.pop()?;
                let result = self.binary(kind, &lhs, &rhs)?;
                frame.stack.push(result);
            }
            Opcode::InplaceOp => {
                let kind = operator(arg, BinaryOp::from_repr)?;
                let rhs = frame.stack.pop()?;
                let lhs = frame.stack.pop()?;
                let result = self.inplace(kind, lhs, &rhs)?;
                frame.stack.push(result);
            }
            Opcode::UnaryOp => {
                let kind = operator(arg, UnaryOp::from_repr)?;
                let operand = frame.stack.pop()?;
                let result = self.unary(kind, &operand)?;
                frame.stack.push(result);
            }
            Opcode::CompareOp => {
                let kind = operator(arg, CompareOp::from_repr)?;
                let rhs = frame.stack.pop()?;
                let lhs = frame.stack.pop()?;
                let result = self.compare(kind, &lhs, &rhs)?;
                frame.stack.push(Value::Bool(result));
            }

            Opcode::BuildTuple => {
                let items = frame.stack.pop_n(index)?;
                self.track_allocation()?;
                frame.stack.push(Value::tuple(items));
            }
            Opcode::BuildList => {
                let items = frame.stack.pop_n(index)?;
                self.track_allocation()?;
                frame.stack.push(Value::list(items));
            }
            Opcode::BuildMap => {
                let flat = frame.stack.pop_n(2 * index)?;
                let dict = self.build_map(flat)?;
                frame.stack.push(dict);
            }
            Opcode::BuildSlice => {
                let bounds = frame.stack.pop_n(index)?;
                frame.stack.push(build_slice(&bounds)?);
            }
            Opcode::UnpackSequence => {
                let seq = frame.stack.pop()?;
                let items = self.unpack(&seq, index)?;
                for item in items.into_iter().rev() {
                    frame.stack.push(item);
                }
            }
            Opcode::BuildClass => {
                let class = self.build_class(frame)?;
                frame.stack.push(class);
            }
            Opcode::MakeFunction => {
                let code = pop_code(frame)?;
                let defaults = frame.stack.pop_n(index)?;
                self.track_allocation()?;
                let function = Function::new(code, frame.globals.clone(), defaults, Vec::new());
                frame.stack.push(Value::Function(Arc::new(function)));
            }
            Opcode::MakeClosure => {
                let code = pop_code(frame)?;
                let cells = frame.stack.pop()?;
                let defaults = frame.stack.pop_n(index)?;
                let closure = closure_cells(&cells)?;
                self.track_allocation()?;
                let function = Function::new(code, frame.globals.clone(), defaults, closure);
                frame.stack.push(Value::Function(Arc::new(function)));
            }

            Opcode::Jump => frame.ip = index,
            Opcode::PopJumpIfFalse => {
                let cond = frame.stack.pop()?;
                if !self.truthy(&cond)? {
                    frame.ip = index;
                }
            }
            Opcode::PopJumpIfTrue => {
                let cond = frame.stack.pop()?;
                if self.truthy(&cond)? {
                    frame.ip = index;
                }
            }
            Opcode::JumpIfFalseOrPop => {
                let cond = frame.stack.peek(0)?.clone();
                if self.truthy(&cond)? {
                    frame.stack.pop()?;
                } else {
                    frame.ip = index;
                }
            }
            Opcode::JumpIfTrueOrPop => {
                let cond = frame.stack.peek(0)?.clone();
                if self.truthy(&cond)? {
                    frame.ip = index;
                } else {
                    frame.stack.pop()?;
                }
            }
            Opcode::GetIter => {
                let iterable = frame.stack.pop()?;
                let iterator = self.iter_value(&iterable)?;
                frame.stack.push(iterator);
            }
            Opcode::ForIter => {
                let iterator = frame.stack.peek(0)?.clone();
                match self.next_value(&iterator)? {
                    Some(item) => frame.stack.push(item),
                    None => {
                        frame.stack.pop()?;
                        frame.ip = index;
                    }
                }
            }
            Opcode::BreakLoop => return Ok(Some(Step::Unwind(Why::Break))),
            Opcode::ContinueLoop => return Ok(Some(Step::Unwind(Why::Continue(index)))),

            Opcode::SetupLoop => self.push_block(frame, BlockKind::Loop, index)?,
            Opcode::SetupExcept => self.push_block(frame, BlockKind::Except, index)?,
            Opcode::SetupFinally => self.push_block(frame, BlockKind::Finally, index)?,
            Opcode::SetupWith => self.setup_with(frame, index)?,
            Opcode::PopBlock => {
                let block = frame
                    .blocks
                    .pop()
                    .ok_or_else(|| RunError::internal("PopBlock with no open block"))?;
                frame.stack.truncate(block.level);
                self.tracer.on_block_pop(block.kind);
            }
            Opcode::BeginFinally => frame.stack.push_marker(UnwindMarker::Normal),
            Opcode::EndFinally => {
                if let Some(why) = end_finally(frame)? {
                    return Ok(Some(Step::Unwind(why)));
                }
            }
            Opcode::WithCleanup => self.with_cleanup(frame)?,
            Opcode::JumpIfNotExcMatch => {
                let candidate = frame.stack.pop()?;
                if !matches!(frame.stack.peek_slot(0)?, StackSlot::Marker(UnwindMarker::Exception)) {
                    return Err(RunError::internal("JumpIfNotExcMatch outside an exception handler"));
                }
                let exc = frame.stack.peek(1)?.clone();
                if !self.exception_matches(&exc, &candidate)? {
                    frame.ip = index;
                }
            }

            Opcode::ReturnValue => {
                let value = frame.stack.pop()?;
                return Ok(Some(Step::Unwind(Why::Return(value))));
            }
            Opcode::YieldValue => {
                let depth = frame.stack.len();
                let value = frame.stack.pop()?;
                self.tracer.on_frame_exit(FrameExitKind::Yield, depth);
                return Ok(Some(Step::Yield(value)));
            }
            Opcode::RaiseVarargs => return self.raise_varargs(frame, index).map(|why| Some(Step::Unwind(why))),

            Opcode::CallFunction
            | Opcode::CallFunctionVar
            | Opcode::CallFunctionKw
            | Opcode::CallFunctionVarKw => {
                let result = self.call_from_stack(frame, op, arg)?;
                frame.stack.push(result);
            }
        }
        Ok(None)
    }

    fn push_block(&mut self, frame: &mut Frame, kind: BlockKind, handler: usize) -> RunResult<()> {
        let level = frame.stack.len();
        frame.blocks.push(Block { kind, handler, level })?;
        self.tracer.on_block_push(kind, level);
        Ok(())
    }

    /// `str(value)`
    pub(super) fn str_of(&mut self, value: &Value) -> RunResult<String> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            Value::Instance(_) => {
                if let Some(result) = self.call_special(value, "__str__", Vec::new())? {
                    return self.expect_str(result, "__str__");
                }
                if self.runtime.builtin_exc_type_of(value).is_some() {
                    return Ok(self.runtime.exception_str(value));
                }
                self.repr_of(value)
            }
            other => Ok(other.py_str(self.runtime)),
        }
    }

    /// `repr(value)`
    pub(super) fn repr_of(&mut self, value: &Value) -> RunResult<String> {
        if let Some(result) = self.call_special(value, "__repr__", Vec::new())? {
            return self.expect_str(result, "__repr__");
        }
        Ok(value.py_repr(self.runtime))
    }

    fn expect_str(&self, result: Value, method: &str) -> RunResult<String> {
        match result {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ExcType::type_error(format_args!(
                "{method} returned non-string (type {})",
                self.runtime.value_type_name(&other)
            ))),
        }
    }

    fn write_output(&mut self, parts: &[String], sep: &str, end: &str) -> RunResult<()> {
        let failed = |err: Exception| RunError::internal(format!("print failed: {err}"));
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.print.stdout_push(sep).map_err(failed)?;
            }
            self.print.stdout_write(Cow::Borrowed(part)).map_err(failed)?;
        }
        self.print.stdout_push(end).map_err(failed)
    }
}

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> CallContext for VM<'_, T, P, Tr> {
    fn runtime(&self) -> &Runtime {
        self.runtime
    }

    fn call(&mut self, callable: &Value, args: ArgValues) -> RunResult<Value> {
        self.call_value(callable, args)
    }

    fn get_iter(&mut self, value: &Value) -> RunResult<Value> {
        self.iter_value(value)
    }

    fn advance(&mut self, iterator: &Value) -> RunResult<Option<Value>> {
        self.next_value(iterator)
    }

    fn to_str(&mut self, value: &Value) -> RunResult<String> {
        self.str_of(value)
    }

    fn to_repr(&mut self, value: &Value) -> RunResult<String> {
        self.repr_of(value)
    }

    fn get_attr(&mut self, obj: &Value, name: &str) -> RunResult<Value> {
        self.load_attr(obj, name)
    }

    fn set_attr(&mut self, obj: &Value, name: &str, value: Value) -> RunResult<()> {
        self.store_attr(obj, name, value)
    }

    fn equals(&mut self, a: &Value, b: &Value) -> RunResult<bool> {
        self.eq_values(a, b)
    }

    fn is_truthy(&mut self, value: &Value) -> RunResult<bool> {
        self.truthy(value)
    }

    fn length(&mut self, value: &Value) -> RunResult<usize> {
        self.len_of(value)
    }

    fn print(&mut self, parts: &[String], sep: &str, end: &str) -> RunResult<()> {
        self.write_output(parts, sep, end)
    }

    fn resume_generator(&mut self, generator: &Arc<Generator>, value: ResumeValue) -> RunResult<GeneratorStep> {
        self.resume_gen(generator, value)
    }

    fn track_allocation(&mut self) -> RunResult<()> {
        self.tracker.on_allocate(|| size_of::<Value>())?;
        Ok(())
    }
}

/// Decodes the instruction at `frame.ip` and advances past it.
fn fetch(frame: &mut Frame) -> RunResult<(Opcode, u16)> {
    let bytecode = frame.code.bytecode();
    let start = frame.ip;
    let Some(&byte) = bytecode.get(start) else {
        return Err(RunError::internal("instruction pointer ran past the end of the code"));
    };
    let op = Opcode::try_from(byte).map_err(|byte| RunError::internal(format!("invalid opcode {byte} at {start}")))?;
    let arg = if op.has_arg() {
        match bytecode.get(start + 1..start + 3) {
            Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
            _ => return Err(RunError::internal(format!("truncated operand at {start}"))),
        }
    } else {
        0
    };
    frame.instr_start = start;
    frame.ip = start + op.size();
    Ok((op, arg))
}

fn operator<K>(arg: u16, from_repr: fn(u8) -> Option<K>) -> RunResult<K> {
    u8::try_from(arg)
        .ok()
        .and_then(from_repr)
        .ok_or_else(|| RunError::internal(format!("invalid operator kind {arg}")))
}

fn name_at(code: &Code, index: usize) -> RunResult<Arc<str>> {
    code.names()
        .get(index)
        .cloned()
        .ok_or_else(|| RunError::internal("name index out of range"))
}

fn local_slot(frame: &mut Frame, index: usize) -> RunResult<&mut Option<Value>> {
    frame
        .locals
        .get_mut(index)
        .ok_or_else(|| RunError::internal("local slot out of range"))
}

fn cell_at(frame: &Frame, index: usize) -> RunResult<&Arc<Cell>> {
    frame
        .cells
        .get(index)
        .ok_or_else(|| RunError::internal("cell index out of range"))
}

fn unbound_local(code: &Code, index: usize) -> RunError {
    let name = code.varnames().get(index).map_or("?", |name| &**name);
    SimpleException::new_msg(
        ExcType::UnboundLocalError,
        format_args!("local variable '{name}' referenced before assignment"),
    )
    .into()
}

fn unbound_deref(code: &Code, index: usize) -> RunError {
    let name = code.deref_name(index).unwrap_or("?");
    if index < code.cellvars().len() {
        SimpleException::new_msg(
            ExcType::UnboundLocalError,
            format_args!("local variable '{name}' referenced before assignment"),
        )
        .into()
    } else {
        SimpleException::new_msg(
            ExcType::NameError,
            format_args!("free variable '{name}' referenced before assignment in enclosing scope"),
        )
        .into()
    }
}

fn pop_code(frame: &mut Frame) -> RunResult<Arc<Code>> {
    match frame.stack.pop()? {
        Value::Code(code) => Ok(code),
        _ => Err(RunError::internal("function creation without a code object")),
    }
}

fn closure_cells(cells: &Value) -> RunResult<Vec<Arc<Cell>>> {
    let Value::Tuple(items) = cells else {
        return Err(RunError::internal("closure is not a tuple of cells"));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Cell(cell) => Ok(cell.clone()),
            _ => Err(RunError::internal("closure is not a tuple of cells")),
        })
        .collect()
}

fn build_slice(bounds: &[Value]) -> RunResult<Value> {
    let bound = |value: Option<&Value>| match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Int(i)) => Ok(Some(*i)),
        Some(Value::Bool(b)) => Ok(Some(i64::from(*b))),
        Some(_) => Err(ExcType::type_error("slice indices must be integers or None")),
    };
    if !(2..=3).contains(&bounds.len()) {
        return Err(RunError::internal("BuildSlice takes 2 or 3 operands"));
    }
    let slice = SliceValue::new(bound(bounds.first())?, bound(bounds.get(1))?, bound(bounds.get(2))?);
    Ok(Value::Slice(slice))
}

/// Wraps an exception instance thrown into a suspended frame.
fn thrown(exc: Value) -> Box<ExceptionRaise> {
    Box::new(ExceptionRaise::new(RaisedException::Object(exc)))
}

/// `EndFinally`: resumes whatever control transfer the finally handler interrupted.
fn end_finally(frame: &mut Frame) -> RunResult<Option<Why>> {
    match frame.stack.pop_slot()? {
        StackSlot::Marker(UnwindMarker::Normal) => Ok(None),
        StackSlot::Marker(UnwindMarker::Exception) => {
            let value = frame.stack.pop()?;
            let traceback = frame.stack.pop()?;
            Ok(Some(Why::Reraise(exceptions::with_traceback(value, &traceback))))
        }
        StackSlot::Marker(UnwindMarker::Return) => Ok(Some(Why::Return(frame.stack.pop()?))),
        StackSlot::Marker(UnwindMarker::Break) => Ok(Some(Why::Break)),
        StackSlot::Marker(UnwindMarker::Continue { target }) => Ok(Some(Why::Continue(target))),
        StackSlot::Value(_) => Err(RunError::internal("EndFinally found a value instead of an unwind marker")),
    }
}
