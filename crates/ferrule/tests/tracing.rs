//! Tracers observe the VM through its hooks without changing execution.

use std::sync::Arc;

use ferrule::{
    BinaryOp, BlockKind, Code, CodeBuilder, Constant, CoverageTracer, FrameExitKind, Frame, FrameExit, Namespace,
    NoLimitTracker, NoPrint, Opcode, ProfilingTracer, RecordingTracer, Runtime, TraceEvent, UnwindReason, VM, Value,
    VmTracer,
};
use pretty_assertions::assert_eq;

fn run_traced<Tr: VmTracer>(code: Code, tracer: Tr) -> (Value, Tr) {
    let runtime = Runtime::new();
    let mut tracker = NoLimitTracker;
    let mut print = NoPrint;
    let mut frame = Frame::new(Arc::new(code), Namespace::new());
    let mut vm = VM::with_tracer(&runtime, &mut tracker, &mut print, tracer);
    let Ok(FrameExit::Return(value)) = vm.execute_frame(&mut frame) else {
        panic!("module did not return");
    };
    (value, vm.into_tracer())
}

#[test]
fn records_every_instruction_of_a_module() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(1);
    b.load_const(2);
    b.emit_arg(Opcode::BinaryOp, BinaryOp::Add as u16);
    b.emit(Opcode::ReturnValue);

    let (value, tracer) = run_traced(b.build().unwrap(), RecordingTracer::new());
    assert_eq!(value, Value::Int(3));
    assert_eq!(
        tracer.into_events(),
        vec![
            TraceEvent::Call {
                func_name: "<module>".to_owned(),
                depth: 1,
            },
            TraceEvent::Instruction {
                ip: 0,
                opcode: Opcode::LoadConst,
                stack_depth: 0,
            },
            TraceEvent::Instruction {
                ip: 3,
                opcode: Opcode::LoadConst,
                stack_depth: 1,
            },
            TraceEvent::Instruction {
                ip: 6,
                opcode: Opcode::BinaryOp,
                stack_depth: 2,
            },
            TraceEvent::Instruction {
                ip: 9,
                opcode: Opcode::ReturnValue,
                stack_depth: 1,
            },
            TraceEvent::Unwind {
                reason: UnwindReason::Return,
                open_blocks: 0,
            },
            TraceEvent::FrameExit {
                kind: FrameExitKind::Return,
                stack_depth: 1,
            },
            TraceEvent::Return { depth: 0 },
        ]
    );
}

/// ```text
/// try:
///     1 // 0
/// except ZeroDivisionError:
///     return 'caught'
/// ```
#[test]
fn records_unwinding_into_an_except_block() {
    let mut b = CodeBuilder::new("<module>");
    let handler = b.emit_jump(Opcode::SetupExcept);
    b.load_const(1);
    b.load_const(0);
    b.emit_arg(Opcode::BinaryOp, BinaryOp::FloorDiv as u16);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopBlock);
    let end = b.emit_jump(Opcode::Jump);
    b.patch_jump(handler);
    b.emit_name(Opcode::LoadName, "ZeroDivisionError");
    let no_match = b.emit_jump(Opcode::JumpIfNotExcMatch);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopTop);
    b.load_const("caught");
    b.emit(Opcode::ReturnValue);
    b.patch_jump(no_match);
    b.emit(Opcode::EndFinally);
    b.patch_jump(end);
    b.load_const(Constant::None);
    b.emit(Opcode::ReturnValue);

    let (value, tracer) = run_traced(b.build().unwrap(), RecordingTracer::new());
    assert_eq!(value, Value::str("caught"));
    let control: Vec<_> = tracer
        .into_events()
        .into_iter()
        .filter(|event| !matches!(event, TraceEvent::Instruction { .. } | TraceEvent::Call { .. } | TraceEvent::Return { .. }))
        .collect();
    assert_eq!(
        control,
        vec![
            TraceEvent::BlockPush {
                kind: BlockKind::Except,
                level: 0,
            },
            TraceEvent::Unwind {
                reason: UnwindReason::Exception,
                open_blocks: 1,
            },
            TraceEvent::BlockPop { kind: BlockKind::Except },
            TraceEvent::Unwind {
                reason: UnwindReason::Return,
                open_blocks: 0,
            },
            TraceEvent::FrameExit {
                kind: FrameExitKind::Return,
                stack_depth: 1,
            },
        ]
    );
}

#[test]
fn recording_limit_caps_the_log() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(1);
    b.load_const(2);
    b.emit_arg(Opcode::BinaryOp, BinaryOp::Add as u16);
    b.emit(Opcode::ReturnValue);

    let (_, tracer) = run_traced(b.build().unwrap(), RecordingTracer::with_limit(2));
    assert_eq!(tracer.events().len(), 2);
}

/// ```text
/// def f():
///     return 5
/// return f()
/// ```
#[test]
fn profiling_counts_calls_and_opcodes() {
    let mut f = CodeBuilder::new("f");
    f.load_const(5);
    f.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(f.build().unwrap());
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_name(Opcode::StoreName, "f");
    b.emit_name(Opcode::LoadName, "f");
    b.emit_call(Opcode::CallFunction, 0, 0);
    b.emit(Opcode::ReturnValue);

    let (value, tracer) = run_traced(b.build().unwrap(), ProfilingTracer::new());
    assert_eq!(value, Value::Int(5));
    let report = tracer.report();
    assert_eq!(report.total_calls, 2);
    assert_eq!(report.max_depth, 2);
    assert_eq!(report.total_instructions, 8);
    assert_eq!(report.total_unwinds, 2);
    assert!(report.opcode_counts.contains(&(Opcode::ReturnValue, 2)));
    assert!(report.opcode_counts.contains(&(Opcode::CallFunction, 1)));
    assert!(report.to_string().contains("Total instructions: 8"));
}

/// ```text
/// if False:
///     print('unreachable')
/// ```
#[test]
fn coverage_skips_untaken_branch() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(false);
    let skip = b.emit_jump(Opcode::PopJumpIfFalse);
    let body = b.current_offset();
    b.emit_name(Opcode::LoadName, "print");
    b.load_const("unreachable");
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::PopTop);
    b.patch_jump(skip);
    b.load_const(Constant::None);
    b.emit(Opcode::ReturnValue);

    let (_, tracer) = run_traced(b.build().unwrap(), CoverageTracer::new());
    assert!(!tracer.covered_ips().contains(&body));
    assert!(tracer.covered_ips().contains(&0));
    assert_eq!(tracer.coverage_count(), 4);
}
