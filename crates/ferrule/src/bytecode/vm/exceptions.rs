//! Exception raising, handler matching and the unwind procedure.

use std::sync::Arc;

use super::{Block, BlockKind, Frame, FrameExit, StackSlot, UnwindMarker, VM};
use crate::{
    args::ArgValues,
    exception_private::{ExcType, ExceptionRaise, RaisedException, RawStackFrame, RunError, RunResult},
    function::CallContext,
    io::PrintWriter,
    resource::ResourceTracker,
    tracer::{FrameExitKind, UnwindReason, VmTracer},
    value::Value,
};

/// A pending control transfer that is looking for a block to handle it.
#[derive(Debug)]
pub(super) enum Why {
    /// Freshly raised in this frame (or propagated out of a callee).
    Exception(Box<ExceptionRaise>),
    /// Re-raised after a handler declined it; the traceback already names this frame.
    Reraise(Box<ExceptionRaise>),
    Return(Value),
    Break,
    /// `continue`, resuming at the loop's continue target.
    Continue(usize),
}

impl Why {
    fn reason(&self) -> UnwindReason {
        match self {
            Self::Exception(_) => UnwindReason::Exception,
            Self::Reraise(_) => UnwindReason::Reraise,
            Self::Return(_) => UnwindReason::Return,
            Self::Break => UnwindReason::Break,
            Self::Continue(_) => UnwindReason::Continue,
        }
    }
}

/// Builds the exception a `raise` statement raises.
///
/// `kind` is an exception class or instance. A class is instantiated with `value` as its
/// argument (a tuple spreads into several arguments, `None` means none) unless `value` is already
/// an instance of it.
pub fn build_exception(ctx: &mut dyn CallContext, kind: Value, value: Option<Value>) -> RunResult<Value> {
    let runtime = ctx.runtime();
    match &kind {
        Value::Type(id) if runtime.is_exception_type(*id) => {
            let args = match value {
                Some(value @ Value::Instance(_)) if runtime.is_instance(&value, *id) => return Ok(value),
                None | Some(Value::None) => ArgValues::new(),
                Some(Value::Tuple(items)) => ArgValues::positional(items.iter().cloned()),
                Some(value) => ArgValues::one(value),
            };
            ctx.call(&kind, args)
        }
        Value::Instance(_) if runtime.builtin_exc_type_of(&kind).is_some() => match value {
            None | Some(Value::None) => Ok(kind),
            Some(_) => Err(ExcType::type_error("instance exception may not have a separate value")),
        },
        _ => Err(ExcType::type_error("exceptions must derive from BaseException")),
    }
}

/// An exception raise carrying the traceback entries saved in a `Value::Traceback`.
pub(super) fn with_traceback(value: Value, traceback: &Value) -> Box<ExceptionRaise> {
    let mut raise = ExceptionRaise::new(RaisedException::Object(value));
    if let Value::Traceback(entries) = traceback {
        raise.traceback = entries.to_vec();
    }
    Box::new(raise)
}

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// Pops blocks until one handles `why`.
    ///
    /// Returns `None` when a handler took over (execution continues at `frame.ip`), or the frame's
    /// exit when a return left the outermost block. An exception no block handles is returned as
    /// an error after the value stack has been drained.
    pub(super) fn unwind(&mut self, frame: &mut Frame, mut why: Why) -> RunResult<Option<FrameExit>> {
        self.tracer.on_unwind(why.reason(), frame.blocks.depth());
        if let Why::Exception(raise) = &mut why {
            raise.push_frame(RawStackFrame {
                function: Arc::from(frame.code.name()),
                line: frame.current_line(),
            });
        }

        while let Some(block) = frame.blocks.pop() {
            self.tracer.on_block_pop(block.kind);

            if block.kind == BlockKind::Loop
                && let Why::Continue(target) = why
            {
                // the loop is still running
                frame.blocks.push(block)?;
                self.tracer.on_block_push(block.kind, block.level);
                frame.ip = target;
                return Ok(None);
            }
            frame.stack.truncate(block.level);

            why = match (block.kind, why) {
                (BlockKind::Loop, Why::Break) => {
                    frame.ip = block.handler;
                    return Ok(None);
                }
                (BlockKind::Except | BlockKind::Finally | BlockKind::With, Why::Exception(raise) | Why::Reraise(raise)) => {
                    self.enter_handler(frame, &block, *raise);
                    return Ok(None);
                }
                (BlockKind::Finally | BlockKind::With, Why::Return(value)) => {
                    frame.stack.push(value);
                    frame.stack.push_marker(UnwindMarker::Return);
                    frame.ip = block.handler;
                    return Ok(None);
                }
                (BlockKind::Finally | BlockKind::With, Why::Break) => {
                    frame.stack.push_marker(UnwindMarker::Break);
                    frame.ip = block.handler;
                    return Ok(None);
                }
                (BlockKind::Finally | BlockKind::With, Why::Continue(target)) => {
                    frame.stack.push_marker(UnwindMarker::Continue { target });
                    frame.ip = block.handler;
                    return Ok(None);
                }
                (_, unhandled) => unhandled,
            };
        }

        match why {
            Why::Return(value) => {
                self.tracer
                    .on_frame_exit(FrameExitKind::Return, frame.stack.len() + 1);
                frame.stack.truncate(0);
                Ok(Some(FrameExit::Return(value)))
            }
            Why::Exception(raise) | Why::Reraise(raise) => {
                frame.stack.truncate(0);
                self.tracer.on_frame_exit(FrameExitKind::Raise, 0);
                Err(RunError::Exc(raise))
            }
            Why::Break => Err(RunError::internal("'break' escaped its frame")),
            Why::Continue(_) => Err(RunError::internal("'continue' escaped its frame")),
        }
    }

    /// Pushes traceback, value and the exception marker, then jumps to the handler.
    fn enter_handler(&mut self, frame: &mut Frame, block: &Block, raise: ExceptionRaise) {
        let value = self.runtime.exception_value(&raise.exc);
        let traceback = Value::Traceback(raise.traceback.into());
        self.handling = Some((traceback.clone(), value.clone()));
        frame.stack.push(traceback);
        frame.stack.push(value);
        frame.stack.push_marker(UnwindMarker::Exception);
        frame.ip = block.handler;
    }

    /// `RaiseVarargs(argc)`
    pub(super) fn raise_varargs(&mut self, frame: &mut Frame, argc: usize) -> RunResult<Why> {
        let raise = match argc {
            0 => {
                let Some((traceback, value)) = &self.handling else {
                    return Err(ExcType::runtime_error("No active exception to reraise"));
                };
                return Ok(Why::Reraise(with_traceback(value.clone(), traceback)));
            }
            1 => {
                let kind = frame.stack.pop()?;
                Box::new(ExceptionRaise::new(RaisedException::Object(build_exception(self, kind, None)?)))
            }
            2 => {
                let value = frame.stack.pop()?;
                let kind = frame.stack.pop()?;
                Box::new(ExceptionRaise::new(RaisedException::Object(build_exception(
                    self,
                    kind,
                    Some(value),
                )?)))
            }
            3 => {
                let traceback = frame.stack.pop()?;
                let value = frame.stack.pop()?;
                let kind = frame.stack.pop()?;
                let exc = build_exception(self, kind, Some(value))?;
                with_traceback(exc, &traceback)
            }
            _ => return Err(RunError::internal("RaiseVarargs takes at most 3 operands")),
        };
        Ok(Why::Exception(raise))
    }

    /// Whether the exception instance `exc` is caught by `except candidate:`.
    pub(super) fn exception_matches(&self, exc: &Value, candidate: &Value) -> RunResult<bool> {
        match candidate {
            Value::Type(id) if self.runtime.is_exception_type(*id) => Ok(self.runtime.is_instance(exc, *id)),
            Value::Tuple(items) => {
                for item in items.iter() {
                    if self.exception_matches(exc, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Err(ExcType::type_error(
                "catching classes that do not inherit from BaseException is not allowed",
            )),
        }
    }

    /// `SetupWith(handler)`: enters the context manager on top of the stack.
    ///
    /// Leaves `__exit__` beneath the new block's level and the result of `__enter__` on top.
    pub(super) fn setup_with(&mut self, frame: &mut Frame, handler: usize) -> RunResult<()> {
        let manager = frame.stack.pop()?;
        let enter = self.load_attr(&manager, "__enter__")?;
        let exit = self.load_attr(&manager, "__exit__")?;
        let entered = self.call_value(&enter, ArgValues::new())?;
        frame.stack.push(exit);
        self.push_block(frame, BlockKind::With, handler)?;
        frame.stack.push(entered);
        Ok(())
    }

    /// `WithCleanup`: calls `__exit__` for whatever ended the `with` body.
    ///
    /// A truthy result for an exception silences it: the exception triple is replaced by a
    /// normal-completion marker so the following `EndFinally` falls through.
    pub(super) fn with_cleanup(&mut self, frame: &mut Frame) -> RunResult<()> {
        let marker = match frame.stack.peek_slot(0)? {
            StackSlot::Marker(marker) => *marker,
            StackSlot::Value(_) => return Err(RunError::internal("WithCleanup without an unwind marker")),
        };
        let exit_depth = match marker {
            UnwindMarker::Exception => 3,
            UnwindMarker::Return => 2,
            UnwindMarker::Normal | UnwindMarker::Break | UnwindMarker::Continue { .. } => 1,
        };
        let StackSlot::Value(exit) = frame.stack.remove_at(exit_depth)? else {
            return Err(RunError::internal("WithCleanup found no __exit__"));
        };

        if marker != UnwindMarker::Exception {
            self.call_value(&exit, ArgValues::positional([Value::None, Value::None, Value::None]))?;
            return Ok(());
        }
        let value = frame.stack.peek(1)?.clone();
        let traceback = frame.stack.peek(2)?.clone();
        let kind = Value::Type(self.runtime.type_of(&value));
        let result = self.call_value(&exit, ArgValues::positional([kind, value, traceback]))?;
        if self.truthy(&result)? {
            for _ in 0..3 {
                frame.stack.pop_slot()?;
            }
            frame.stack.push_marker(UnwindMarker::Normal);
        }
        Ok(())
    }
}
