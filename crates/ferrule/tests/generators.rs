//! Driving generators from the host: send, throw, close and their edge cases.

use std::sync::Arc;

use ferrule::{
    ArgValues, CallContext, Code, CodeBuilder, CollectStringPrint, Constant, ExcType, Frame, FrameExit, Generator,
    GeneratorState, GeneratorStep, Namespace, NoLimitTracker, Opcode, ResumeValue, Runtime, VM, Value,
};

/// Runs a module that binds `name` to a function built from `code`, and returns the function.
fn define(runtime: &Runtime, name: &str, code: Code) -> Value {
    let mut module = CodeBuilder::new("<module>");
    module.load_const(code);
    module.emit_arg(Opcode::MakeFunction, 0);
    module.emit_name(Opcode::StoreName, name);
    module.load_const(Constant::None);
    module.emit(Opcode::ReturnValue);

    let mut frame = Frame::new(Arc::new(module.build().unwrap()), Namespace::new());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(runtime, &mut tracker, &mut print);
    assert!(matches!(vm.execute_frame(&mut frame), Ok(FrameExit::Return(Value::None))));
    frame.globals().get(name).unwrap()
}

fn as_generator(value: Value) -> Arc<Generator> {
    match value {
        Value::Generator(generator) => generator,
        other => panic!("expected a generator, got {other:?}"),
    }
}

fn yielded(step: GeneratorStep) -> Value {
    match step {
        GeneratorStep::Yielded(value) => value,
        GeneratorStep::Returned(value) => panic!("generator returned {value:?}"),
    }
}

/// ```text
/// def echo():
///     received = yield 1
///     yield received
///     return 'done'
/// ```
fn echo() -> Code {
    let mut g = CodeBuilder::new("echo").generator();
    g.load_const(1);
    g.emit(Opcode::YieldValue);
    g.emit_local(Opcode::StoreFast, "received");
    g.emit_local(Opcode::LoadFast, "received");
    g.emit(Opcode::YieldValue);
    g.emit(Opcode::PopTop);
    g.load_const("done");
    g.emit(Opcode::ReturnValue);
    g.build().unwrap()
}

/// ```text
/// def guarded():
///     try:
///         yield 1
///     except ValueError:
///         yield 'handled'
/// ```
fn guarded() -> Code {
    let mut g = CodeBuilder::new("guarded").generator();
    let handler = g.emit_jump(Opcode::SetupExcept);
    g.load_const(1);
    g.emit(Opcode::YieldValue);
    g.emit(Opcode::PopTop);
    g.emit(Opcode::PopBlock);
    let end = g.emit_jump(Opcode::Jump);
    g.patch_jump(handler);
    g.emit_name(Opcode::LoadGlobal, "ValueError");
    let no_match = g.emit_jump(Opcode::JumpIfNotExcMatch);
    g.emit(Opcode::PopTop);
    g.emit(Opcode::PopTop);
    g.emit(Opcode::PopTop);
    g.load_const("handled");
    g.emit(Opcode::YieldValue);
    g.emit(Opcode::PopTop);
    let after = g.emit_jump(Opcode::Jump);
    g.patch_jump(no_match);
    g.emit(Opcode::EndFinally);
    g.patch_jump(end);
    g.patch_jump(after);
    g.load_const(Constant::None);
    g.emit(Opcode::ReturnValue);
    g.build().unwrap()
}

#[test]
fn send_round_trip() {
    let runtime = Runtime::new();
    let function = define(&runtime, "echo", echo());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = as_generator(vm.call(&function, ArgValues::new()).unwrap());
    assert_eq!(generator.state(), GeneratorState::New);

    let first = vm.resume_generator(&generator, ResumeValue::Send(Value::None)).unwrap();
    assert_eq!(yielded(first), Value::Int(1));
    assert_eq!(generator.state(), GeneratorState::Suspended);

    let second = vm
        .resume_generator(&generator, ResumeValue::Send(Value::str("ping")))
        .unwrap();
    assert_eq!(yielded(second), Value::str("ping"));

    match vm.resume_generator(&generator, ResumeValue::Send(Value::None)).unwrap() {
        GeneratorStep::Returned(value) => assert_eq!(value, Value::str("done")),
        GeneratorStep::Yielded(value) => panic!("unexpected yield of {value:?}"),
    }
    assert_eq!(generator.state(), GeneratorState::Finished);

    // an exhausted generator keeps reporting exhaustion
    assert!(matches!(
        vm.resume_generator(&generator, ResumeValue::Send(Value::None)),
        Ok(GeneratorStep::Returned(Value::None))
    ));
}

#[test]
fn just_started_generator_rejects_values() {
    let runtime = Runtime::new();
    let function = define(&runtime, "echo", echo());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = as_generator(vm.call(&function, ArgValues::new()).unwrap());
    let err = vm
        .resume_generator(&generator, ResumeValue::Send(Value::Int(5)))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: can't send non-None value to a just-started generator"
    );
    assert_eq!(generator.state(), GeneratorState::New);
}

#[test]
fn send_method_raises_stop_iteration_with_value() {
    let runtime = Runtime::new();
    let function = define(&runtime, "echo", echo());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = vm.call(&function, ArgValues::new()).unwrap();
    let send = vm.get_attr(&generator, "send").unwrap();
    assert_eq!(vm.call(&send, ArgValues::one(Value::None)).unwrap(), Value::Int(1));
    assert_eq!(vm.call(&send, ArgValues::one(Value::Int(2))).unwrap(), Value::Int(2));

    let err = vm.call(&send, ArgValues::one(Value::None)).unwrap_err();
    assert!(err.is_exc(&runtime, ExcType::StopIteration));
    let exc = err.into_exception(&runtime);
    assert_eq!(exc.summary(), "StopIteration: done");
}

#[test]
fn thrown_exception_is_caught_inside() {
    let runtime = Runtime::new();
    let function = define(&runtime, "guarded", guarded());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = as_generator(vm.call(&function, ArgValues::new()).unwrap());
    yielded(vm.resume_generator(&generator, ResumeValue::Send(Value::None)).unwrap());

    let error = runtime.new_exception(runtime.exc_type_id(ExcType::ValueError), vec![Value::str("bad")]);
    let step = vm.resume_generator(&generator, ResumeValue::Throw(error)).unwrap();
    assert_eq!(yielded(step), Value::str("handled"));

    let close = vm.get_attr(&Value::Generator(generator.clone()), "close").unwrap();
    assert_eq!(vm.call(&close, ArgValues::new()).unwrap(), Value::None);
    assert_eq!(generator.state(), GeneratorState::Finished);
}

#[test]
fn uncaught_throw_finishes_generator() {
    let runtime = Runtime::new();
    let function = define(&runtime, "guarded", guarded());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = as_generator(vm.call(&function, ArgValues::new()).unwrap());
    yielded(vm.resume_generator(&generator, ResumeValue::Send(Value::None)).unwrap());

    let error = runtime.new_exception(runtime.exc_type_id(ExcType::KeyError), vec![Value::str("k")]);
    let err = vm.resume_generator(&generator, ResumeValue::Throw(error)).unwrap_err();
    assert!(err.is_exc(&runtime, ExcType::KeyError));
    assert_eq!(generator.state(), GeneratorState::Finished);
}

/// A generator that yields again after `GeneratorExit` makes `close()` fail.
///
/// ```text
/// def stubborn():
///     while True:
///         try:
///             yield 1
///         except GeneratorExit:
///             pass
/// ```
#[test]
fn close_rejects_ignored_generator_exit() {
    let mut g = CodeBuilder::new("stubborn").generator();
    let exit = g.emit_jump(Opcode::SetupLoop);
    let head = g.current_offset();
    let handler = g.emit_jump(Opcode::SetupExcept);
    g.load_const(1);
    g.emit(Opcode::YieldValue);
    g.emit(Opcode::PopTop);
    g.emit(Opcode::PopBlock);
    g.emit_jump_to(Opcode::Jump, head);
    g.patch_jump(handler);
    g.emit(Opcode::PopTop);
    g.emit(Opcode::PopTop);
    g.emit(Opcode::PopTop);
    g.emit_jump_to(Opcode::Jump, head);
    g.patch_jump(exit);
    g.load_const(Constant::None);
    g.emit(Opcode::ReturnValue);

    let runtime = Runtime::new();
    let function = define(&runtime, "stubborn", g.build().unwrap());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = vm.call(&function, ArgValues::new()).unwrap();
    let next = vm.get_attr(&generator, "__next__").unwrap();
    assert_eq!(vm.call(&next, ArgValues::new()).unwrap(), Value::Int(1));

    let close = vm.get_attr(&generator, "close").unwrap();
    let err = vm.call(&close, ArgValues::new()).unwrap_err();
    assert_eq!(err.to_string(), "RuntimeError: generator ignored GeneratorExit");
}

/// `raise StopIteration` inside a generator body surfaces as `RuntimeError`.
#[test]
fn stop_iteration_inside_body_becomes_runtime_error() {
    let mut g = CodeBuilder::new("leaky").generator();
    g.emit_name(Opcode::LoadGlobal, "StopIteration");
    g.emit_arg(Opcode::RaiseVarargs, 1);

    let runtime = Runtime::new();
    let function = define(&runtime, "leaky", g.build().unwrap());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = as_generator(vm.call(&function, ArgValues::new()).unwrap());
    let err = vm
        .resume_generator(&generator, ResumeValue::Send(Value::None))
        .unwrap_err();
    assert_eq!(err.to_string(), "RuntimeError: generator raised StopIteration");
    assert_eq!(generator.state(), GeneratorState::Finished);
}

/// A `for` loop over a generator consumes every yielded value.
///
/// ```text
/// def countdown(n):
///     while n:
///         yield n
///         n -= 1
/// return list(countdown(3))
/// ```
#[test]
fn list_drains_generator() {
    let mut g = CodeBuilder::new("countdown").with_args(&["n"]).generator();
    let exit = g.emit_jump(Opcode::SetupLoop);
    let head = g.current_offset();
    g.emit_local(Opcode::LoadFast, "n");
    let done = g.emit_jump(Opcode::PopJumpIfFalse);
    g.emit_local(Opcode::LoadFast, "n");
    g.emit(Opcode::YieldValue);
    g.emit(Opcode::PopTop);
    g.emit_local(Opcode::LoadFast, "n");
    g.load_const(1);
    g.emit_arg(Opcode::InplaceOp, ferrule::BinaryOp::Sub as u16);
    g.emit_local(Opcode::StoreFast, "n");
    g.emit_jump_to(Opcode::Jump, head);
    g.patch_jump(done);
    g.emit(Opcode::PopBlock);
    g.patch_jump(exit);
    g.load_const(Constant::None);
    g.emit(Opcode::ReturnValue);

    let runtime = Runtime::new();
    let function = define(&runtime, "countdown", g.build().unwrap());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);

    let generator = vm.call(&function, ArgValues::one(Value::Int(3))).unwrap();
    let list = runtime.builtins().get("list").unwrap();
    let drained = vm.call(&list, ArgValues::one(generator)).unwrap();
    assert_eq!(drained.py_repr(&runtime), "[3, 2, 1]");
}

/// Values pushed before a `yield` are still on the operand stack after each resumption, with
/// the sent value on top.
///
/// ```text
/// def pending():
///     return ('a', 'b', 'c', (yield 'first'), (yield 'second'))
/// ```
#[test]
fn operand_stack_survives_suspension() {
    let mut g = CodeBuilder::new("pending").generator();
    g.load_const("a");
    g.load_const("b");
    g.load_const("c");
    g.load_const("first");
    g.emit(Opcode::YieldValue);
    g.load_const("second");
    g.emit(Opcode::YieldValue);
    g.emit_arg(Opcode::BuildTuple, 5);
    g.emit(Opcode::ReturnValue);

    let runtime = Runtime::new();
    let function = define(&runtime, "pending", g.build().unwrap());
    let mut tracker = NoLimitTracker;
    let mut print = CollectStringPrint::new();
    let mut vm = VM::new(&runtime, &mut tracker, &mut print);
    let generator = as_generator(vm.call(&function, ArgValues::new()).unwrap());

    let first = vm.resume_generator(&generator, ResumeValue::Send(Value::None)).unwrap();
    assert_eq!(yielded(first), Value::str("first"));
    let second = vm.resume_generator(&generator, ResumeValue::Send(Value::str("one"))).unwrap();
    assert_eq!(yielded(second), Value::str("second"));
    match vm.resume_generator(&generator, ResumeValue::Send(Value::str("two"))).unwrap() {
        GeneratorStep::Returned(value) => assert_eq!(value.py_repr(&runtime), "('a', 'b', 'c', 'one', 'two')"),
        GeneratorStep::Yielded(value) => panic!("unexpected yield of {value:?}"),
    }
}
