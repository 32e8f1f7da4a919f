#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "slice positions are non-negative once resolved")]
#![expect(clippy::cast_possible_wrap, reason = "lengths never exceed isize::MAX")]

mod args;
mod builtins;
mod bytecode;
mod exception_private;
mod exception_public;
mod function;
mod io;
mod namespace;
mod ops;
mod resource;
mod runtime;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    args::ArgValues,
    bytecode::{
        Block, BlockKind, BlockStack, BuildError, Code, CodeBuilder, CodeFlags, Constant, Frame, FrameExit,
        HAVE_ARGUMENT, JumpLabel, LineTable, Opcode, ResumeValue, StackSlot, UnwindMarker, VM, ValueStack,
        build_exception, constant_repr, disassemble, split_call_arg,
    },
    exception_private::{ExcType, ExceptionRaise, RawStackFrame, RunError, RunResult, SimpleException},
    exception_public::{Exception, StackFrame},
    function::{BoundMethod, CallContext, Cell, Function, NativeFn, NativeFunction, Property},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    namespace::{Dict, Namespace},
    ops::{BinaryOp, CompareOp, UnaryOp},
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LARGE_RESULT_THRESHOLD, LimitedTracker, MAX_BLOCK_DEPTH,
        MAX_INHERITANCE_DEPTH, MAX_MRO_LENGTH, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    runtime::Runtime,
    tracer::{
        CoverageTracer, FrameExitKind, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer,
        TraceEvent, UnwindReason, VmTracer,
    },
    types::{
        BufferError, BuiltinType, ByteBuffer, Generator, GeneratorState, GeneratorStep, Instance, Range, SliceValue,
        TypeId,
    },
    value::Value,
};
