//! Generator objects.
//!
//! Calling a generator function creates a [`Generator`] holding a fully bound but not yet started
//! frame. Each resumption takes the frame out, runs it until the next `yield` or the end of the
//! body, and puts it back while suspended.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    args::ArgValues,
    bytecode::{Frame, ResumeValue, build_exception},
    exception_private::{ExcType, RunError, RunResult},
    function::{CallContext, NativeFunction},
    value::Value,
};

pub(crate) const METHODS: &[NativeFunction] = &[
    NativeFunction::new("send", generator_send),
    NativeFunction::new("throw", generator_throw),
    NativeFunction::new("close", generator_close),
    NativeFunction::new("__next__", generator_next),
    NativeFunction::new("__iter__", generator_iter),
];

/// Generator execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created; the body has not run yet.
    New,
    /// Suspended at a `yield`.
    Suspended,
    /// Currently executing; resuming again raises `ValueError`.
    Running,
    /// Returned or raised; further resumption is exhausted.
    Finished,
}

/// Outcome of resuming a generator.
#[derive(Debug, Clone)]
pub enum GeneratorStep {
    Yielded(Value),
    /// The body returned; the value becomes `StopIteration.value`.
    Returned(Value),
}

#[derive(Debug)]
struct GeneratorInner {
    state: GeneratorState,
    frame: Option<Box<Frame>>,
}

/// A suspended generator function.
#[derive(Debug)]
pub struct Generator {
    name: Arc<str>,
    inner: Mutex<GeneratorInner>,
}

impl Generator {
    #[must_use]
    pub fn new(name: Arc<str>, frame: Frame) -> Self {
        Self {
            name,
            inner: Mutex::new(GeneratorInner {
                state: GeneratorState::New,
                frame: Some(Box::new(frame)),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> GeneratorState {
        self.inner.lock().state
    }

    /// Marks the generator running and takes its frame.
    ///
    /// Returns the state it was in; the frame is `None` unless it was `New` or `Suspended`.
    pub(crate) fn start_running(&self) -> (GeneratorState, Option<Box<Frame>>) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        match previous {
            GeneratorState::New | GeneratorState::Suspended => {
                inner.state = GeneratorState::Running;
                (previous, inner.frame.take())
            }
            GeneratorState::Running | GeneratorState::Finished => (previous, None),
        }
    }

    /// Stores the frame back after a `yield`.
    pub(crate) fn suspend(&self, frame: Box<Frame>) {
        let mut inner = self.inner.lock();
        inner.state = GeneratorState::Suspended;
        inner.frame = Some(frame);
    }

    /// Marks the generator finished and drops its frame.
    pub(crate) fn finish(&self) {
        let mut inner = self.inner.lock();
        inner.state = GeneratorState::Finished;
        inner.frame = None;
    }
}

fn split_receiver(args: ArgValues, name: &str) -> RunResult<(Arc<Generator>, ArgValues)> {
    let mut rest = args;
    match rest.positional.first() {
        Some(Value::Generator(generator)) => {
            let generator = generator.clone();
            rest.positional.remove(0);
            Ok((generator, rest))
        }
        _ => Err(ExcType::type_error(format_args!(
            "descriptor '{name}' requires a 'generator' object"
        ))),
    }
}

/// Maps a resumption outcome to the value `send`/`throw` return.
fn step_result(ctx: &mut dyn CallContext, step: GeneratorStep) -> RunResult<Value> {
    match step {
        GeneratorStep::Yielded(value) => Ok(value),
        GeneratorStep::Returned(value) => {
            let args = if value.is_none() { Vec::new() } else { vec![value] };
            let runtime = ctx.runtime();
            let exc = runtime.new_exception(runtime.exc_type_id(ExcType::StopIteration), args);
            Err(RunError::raise_object(exc))
        }
    }
}

fn generator_send(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (generator, rest) = split_receiver(args, "send")?;
    let value = rest.get_one_arg("send")?;
    let step = ctx.resume_generator(&generator, ResumeValue::Send(value))?;
    step_result(ctx, step)
}

fn generator_next(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (generator, rest) = split_receiver(args, "__next__")?;
    rest.check_zero_args("__next__")?;
    let step = ctx.resume_generator(&generator, ResumeValue::Send(Value::None))?;
    step_result(ctx, step)
}

fn generator_iter(_ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (generator, rest) = split_receiver(args, "__iter__")?;
    rest.check_zero_args("__iter__")?;
    Ok(Value::Generator(generator))
}

/// `gen.throw(type[, value])` or `gen.throw(instance)`
fn generator_throw(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (generator, rest) = split_receiver(args, "throw")?;
    let (kind, value) = rest.get_one_two_args("throw")?;
    let exc = build_exception(ctx, kind, value)?;
    let step = ctx.resume_generator(&generator, ResumeValue::Throw(exc))?;
    step_result(ctx, step)
}

/// Throws `GeneratorExit` at the suspension point; the generator must not yield again.
fn generator_close(ctx: &mut dyn CallContext, args: ArgValues) -> RunResult<Value> {
    let (generator, rest) = split_receiver(args, "close")?;
    rest.check_zero_args("close")?;
    if matches!(generator.state(), GeneratorState::New | GeneratorState::Finished) {
        generator.finish();
        return Ok(Value::None);
    }
    let runtime = ctx.runtime();
    let exit = runtime.new_exception(runtime.exc_type_id(ExcType::GeneratorExit), Vec::new());
    match ctx.resume_generator(&generator, ResumeValue::Throw(exit)) {
        Ok(GeneratorStep::Yielded(_)) => Err(ExcType::runtime_error("generator ignored GeneratorExit")),
        Ok(GeneratorStep::Returned(_)) => Ok(Value::None),
        Err(err)
            if err.is_exc(ctx.runtime(), ExcType::GeneratorExit) || err.is_exc(ctx.runtime(), ExcType::StopIteration) =>
        {
            Ok(Value::None)
        }
        Err(err) => Err(err),
    }
}
