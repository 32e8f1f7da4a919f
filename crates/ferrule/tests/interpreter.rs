//! End-to-end execution of hand-assembled module code.
//!
//! Each test assembles the bytecode a compiler would emit for a short program (shown in the
//! test's doc comment), runs it as a module frame and checks the printed output together with the
//! returned value or the uncaught exception.

use std::sync::Arc;

use ferrule::{
    BinaryOp, Code, CodeBuilder, CollectStringPrint, CompareOp, Constant, Exception, Frame, FrameExit, LimitedTracker,
    Namespace, NoLimitTracker, Opcode, ResourceLimits, ResourceTracker, Runtime, VM,
};
use pretty_assertions::assert_eq;

/// Result of running a module: the repr of the returned value or the uncaught exception, plus
/// everything printed.
struct Outcome {
    result: Result<String, Exception>,
    output: String,
}

fn run(code: Code) -> Outcome {
    run_with(code, NoLimitTracker)
}

fn run_with(code: Code, mut tracker: impl ResourceTracker) -> Outcome {
    let runtime = Runtime::new();
    let mut print = CollectStringPrint::new();
    let mut frame = Frame::new(Arc::new(code), Namespace::new());
    let result = {
        let mut vm = VM::new(&runtime, &mut tracker, &mut print);
        vm.execute_frame(&mut frame)
    };
    let result = match result {
        Ok(FrameExit::Return(value)) => Ok(value.py_repr(&runtime)),
        Ok(FrameExit::Yield(_)) => panic!("module code yielded"),
        Err(err) => Err(err.into_exception(&runtime)),
    };
    Outcome {
        result,
        output: print.into_output(),
    }
}

fn binary(b: &mut CodeBuilder, op: BinaryOp) {
    b.emit_arg(Opcode::BinaryOp, op as u16);
}

fn compare(b: &mut CodeBuilder, op: CompareOp) {
    b.emit_arg(Opcode::CompareOp, op as u16);
}

/// `print(<const>)` as a statement.
fn print_const(b: &mut CodeBuilder, value: impl Into<Constant>) {
    b.emit_name(Opcode::LoadName, "print");
    b.load_const(value);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::PopTop);
}

fn return_none(b: &mut CodeBuilder) {
    b.load_const(Constant::None);
    b.emit(Opcode::ReturnValue);
}

/// Binds a function built from `code` to `name` in the current namespace.
fn define(b: &mut CodeBuilder, name: &str, code: Code) {
    b.load_const(code);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit_name(Opcode::StoreName, name);
}

/// `class <name>(<bases>): <body>`
fn define_class(b: &mut CodeBuilder, name: &str, bases: &[&str], body: Code) {
    b.load_const(name);
    for base in bases {
        b.emit_name(Opcode::LoadName, base);
    }
    b.emit_arg(Opcode::BuildTuple, bases.len() as u16);
    b.load_const(body);
    b.emit_arg(Opcode::MakeFunction, 0);
    b.emit(Opcode::BuildClass);
    b.emit_name(Opcode::StoreName, name);
}

/// A method body returning a constant string.
fn method_returning(name: &str, value: &str) -> Code {
    let mut m = CodeBuilder::new(name).with_args(&["self"]);
    m.load_const(value);
    m.emit(Opcode::ReturnValue);
    m.build().unwrap()
}

/// `print(2 + 3 * 4)`
#[test]
fn arithmetic_and_print() {
    let mut b = CodeBuilder::new("<module>");
    b.emit_name(Opcode::LoadName, "print");
    b.load_const(2);
    b.load_const(3);
    b.load_const(4);
    binary(&mut b, BinaryOp::Mul);
    binary(&mut b, BinaryOp::Add);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::PopTop);
    return_none(&mut b);

    let outcome = run(b.build().unwrap());
    assert_eq!(outcome.output, "14\n");
    assert_eq!(outcome.result.unwrap(), "None");
}

/// ```text
/// 1  x = 10
/// 2
/// 3  x // 0
/// ```
#[test]
fn uncaught_exception_reports_line() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(10);
    b.emit_name(Opcode::StoreName, "x");
    b.set_line(3);
    b.emit_name(Opcode::LoadName, "x");
    b.load_const(0);
    binary(&mut b, BinaryOp::FloorDiv);
    b.emit(Opcode::PopTop);
    return_none(&mut b);

    let exc = run(b.build().unwrap()).result.unwrap_err();
    assert_eq!(exc.summary(), "ZeroDivisionError: integer division or modulo by zero");
    assert_eq!(exc.traceback().len(), 1);
    assert_eq!(exc.traceback()[0].function, "<module>");
    assert_eq!(exc.traceback()[0].line, 3);
}

/// ```text
/// try:
///     1 // 0
/// except ZeroDivisionError:
///     return 'caught'
/// ```
#[test]
fn except_catches_matching_class() {
    let outcome = run(try_divide_except("ZeroDivisionError"));
    assert_eq!(outcome.result.unwrap(), "'caught'");
}

/// A handler for an unrelated class re-raises the original exception.
#[test]
fn except_reraises_non_matching_exception() {
    let exc = run(try_divide_except("ValueError")).result.unwrap_err();
    assert_eq!(exc.summary(), "ZeroDivisionError: integer division or modulo by zero");
}

/// Base classes catch their subclasses.
#[test]
fn except_matches_base_class() {
    let outcome = run(try_divide_except("ArithmeticError"));
    assert_eq!(outcome.result.unwrap(), "'caught'");
}

fn try_divide_except(class: &str) -> Code {
    let mut b = CodeBuilder::new("<module>");
    let handler = b.emit_jump(Opcode::SetupExcept);
    b.load_const(1);
    b.load_const(0);
    binary(&mut b, BinaryOp::FloorDiv);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopBlock);
    let end = b.emit_jump(Opcode::Jump);

    b.patch_jump(handler);
    b.emit_name(Opcode::LoadName, class);
    let no_match = b.emit_jump(Opcode::JumpIfNotExcMatch);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopTop);
    b.load_const("caught");
    b.emit(Opcode::ReturnValue);
    b.patch_jump(no_match);
    b.emit(Opcode::EndFinally);

    b.patch_jump(end);
    return_none(&mut b);
    b.build().unwrap()
}

/// ```text
/// try:
///     return 'body'
/// finally:
///     print('cleanup')
/// ```
#[test]
fn finally_runs_before_return() {
    let mut b = CodeBuilder::new("<module>");
    let finally = b.emit_jump(Opcode::SetupFinally);
    b.load_const("body");
    b.emit(Opcode::ReturnValue);
    b.patch_jump(finally);
    print_const(&mut b, "cleanup");
    b.emit(Opcode::EndFinally);
    return_none(&mut b);

    let outcome = run(b.build().unwrap());
    assert_eq!(outcome.output, "cleanup\n");
    assert_eq!(outcome.result.unwrap(), "'body'");
}

/// ```text
/// try:
///     x = 1 / 0
/// finally:
///     print('cleanup')
/// ```
#[test]
fn finally_runs_once_while_exception_propagates() {
    let mut b = CodeBuilder::new("<module>");
    let finally = b.emit_jump(Opcode::SetupFinally);
    b.load_const(1);
    b.load_const(0);
    binary(&mut b, BinaryOp::TrueDiv);
    b.emit_name(Opcode::StoreName, "x");
    b.emit(Opcode::PopBlock);
    b.emit(Opcode::BeginFinally);
    b.patch_jump(finally);
    print_const(&mut b, "cleanup");
    b.emit(Opcode::EndFinally);
    return_none(&mut b);

    let outcome = run(b.build().unwrap());
    assert_eq!(outcome.output, "cleanup\n");
    assert_eq!(outcome.result.unwrap_err().summary(), "ZeroDivisionError: division by zero");
}

/// ```text
/// raise ValueError('boom')
/// ```
#[test]
fn raise_instance_with_message() {
    let mut b = CodeBuilder::new("<module>");
    b.emit_name(Opcode::LoadName, "ValueError");
    b.load_const("boom");
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit_arg(Opcode::RaiseVarargs, 1);

    let exc = run(b.build().unwrap()).result.unwrap_err();
    assert_eq!(exc.summary(), "ValueError: boom");
    assert_eq!(exc.to_string(), "Traceback (most recent call last):\n  line 1, in <module>\nValueError: boom");
}

/// ```text
/// total = 0
/// for i in range(10):
///     if i == 5:
///         break
///     total += i
/// return total
/// ```
#[test]
fn for_loop_with_break() {
    let mut b = CodeBuilder::new("<module>");
    b.load_const(0);
    b.emit_name(Opcode::StoreName, "total");
    let exit = b.emit_jump(Opcode::SetupLoop);
    b.emit_name(Opcode::LoadName, "range");
    b.load_const(10);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::GetIter);
    let head = b.current_offset();
    let exhausted = b.emit_jump(Opcode::ForIter);
    b.emit_name(Opcode::StoreName, "i");
    b.emit_name(Opcode::LoadName, "i");
    b.load_const(5);
    compare(&mut b, CompareOp::Eq);
    let accumulate = b.emit_jump(Opcode::PopJumpIfFalse);
    b.emit(Opcode::BreakLoop);
    b.patch_jump(accumulate);
    b.emit_name(Opcode::LoadName, "total");
    b.emit_name(Opcode::LoadName, "i");
    b.emit_arg(Opcode::InplaceOp, BinaryOp::Add as u16);
    b.emit_name(Opcode::StoreName, "total");
    b.emit_jump_to(Opcode::Jump, head);
    b.patch_jump(exhausted);
    b.emit(Opcode::PopBlock);
    b.patch_jump(exit);
    b.emit_name(Opcode::LoadName, "total");
    b.emit(Opcode::ReturnValue);

    assert_eq!(run(b.build().unwrap()).result.unwrap(), "10");
}

/// `continue` inside `try` runs the `finally` body, then resumes the loop.
///
/// ```text
/// for i in range(3):
///     try:
///         if i == 1:
///             continue
///         print(i)
///     finally:
///         print('f')
/// ```
#[test]
fn continue_through_finally() {
    let mut b = CodeBuilder::new("<module>");
    let exit = b.emit_jump(Opcode::SetupLoop);
    b.emit_name(Opcode::LoadName, "range");
    b.load_const(3);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::GetIter);
    let head = b.current_offset();
    let exhausted = b.emit_jump(Opcode::ForIter);
    b.emit_name(Opcode::StoreName, "i");
    let finally = b.emit_jump(Opcode::SetupFinally);
    b.emit_name(Opcode::LoadName, "i");
    b.load_const(1);
    compare(&mut b, CompareOp::Eq);
    let body = b.emit_jump(Opcode::PopJumpIfFalse);
    b.emit_jump_to(Opcode::ContinueLoop, head);
    b.patch_jump(body);
    b.emit_name(Opcode::LoadName, "print");
    b.emit_name(Opcode::LoadName, "i");
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopBlock);
    b.emit(Opcode::BeginFinally);
    b.patch_jump(finally);
    print_const(&mut b, "f");
    b.emit(Opcode::EndFinally);
    b.emit_jump_to(Opcode::Jump, head);
    b.patch_jump(exhausted);
    b.emit(Opcode::PopBlock);
    b.patch_jump(exit);
    return_none(&mut b);

    let outcome = run(b.build().unwrap());
    assert_eq!(outcome.output, "0\nf\nf\n2\nf\n");
}

/// A context manager whose `__exit__` returns true swallows the exception.
///
/// ```text
/// class Quiet:
///     def __enter__(self): return 'entered'
///     def __exit__(self, kind, value, tb):
///         print(kind)
///         return True
///
/// with Quiet() as entered:
///     1 // 0
/// return entered
/// ```
#[test]
fn with_statement_silences_exception() {
    let mut exit = CodeBuilder::new("__exit__").with_args(&["self", "kind", "value", "tb"]);
    exit.emit_name(Opcode::LoadGlobal, "print");
    exit.emit_local(Opcode::LoadFast, "kind");
    exit.emit_call(Opcode::CallFunction, 1, 0);
    exit.emit(Opcode::PopTop);
    exit.load_const(true);
    exit.emit(Opcode::ReturnValue);

    let mut body = CodeBuilder::new("Quiet");
    define(&mut body, "__enter__", method_returning("__enter__", "entered"));
    define(&mut body, "__exit__", exit.build().unwrap());
    return_none(&mut body);

    let mut b = CodeBuilder::new("<module>");
    define_class(&mut b, "Quiet", &[], body.build().unwrap());
    b.emit_name(Opcode::LoadName, "Quiet");
    b.emit_call(Opcode::CallFunction, 0, 0);
    let cleanup = b.emit_jump(Opcode::SetupWith);
    b.emit_name(Opcode::StoreName, "entered");
    b.load_const(1);
    b.load_const(0);
    binary(&mut b, BinaryOp::FloorDiv);
    b.emit(Opcode::PopTop);
    b.emit(Opcode::PopBlock);
    b.emit(Opcode::BeginFinally);
    b.patch_jump(cleanup);
    b.emit(Opcode::WithCleanup);
    b.emit(Opcode::EndFinally);
    b.emit_name(Opcode::LoadName, "entered");
    b.emit(Opcode::ReturnValue);

    let outcome = run(b.build().unwrap());
    assert_eq!(outcome.output, "<class 'ZeroDivisionError'>\n");
    assert_eq!(outcome.result.unwrap(), "'entered'");
}

/// Method lookup follows the C3 order of a diamond.
///
/// ```text
/// class A:
///     def who(self): return 'A'
/// class B(A): pass
/// class C(A):
///     def who(self): return 'C'
/// class D(B, C): pass
/// return D().who()
/// ```
#[test]
fn diamond_method_resolution() {
    let mut a = CodeBuilder::new("A");
    define(&mut a, "who", method_returning("who", "A"));
    return_none(&mut a);
    let mut c = CodeBuilder::new("C");
    define(&mut c, "who", method_returning("who", "C"));
    return_none(&mut c);
    let empty = |name: &str| {
        let mut body = CodeBuilder::new(name);
        return_none(&mut body);
        body.build().unwrap()
    };

    let mut b = CodeBuilder::new("<module>");
    define_class(&mut b, "A", &[], a.build().unwrap());
    define_class(&mut b, "B", &["A"], empty("B"));
    define_class(&mut b, "C", &["A"], c.build().unwrap());
    define_class(&mut b, "D", &["B", "C"], empty("D"));
    b.emit_name(Opcode::LoadName, "D");
    b.emit_call(Opcode::CallFunction, 0, 0);
    b.emit_name(Opcode::LoadAttr, "who");
    b.emit_call(Opcode::CallFunction, 0, 0);
    b.emit(Opcode::ReturnValue);

    assert_eq!(run(b.build().unwrap()).result.unwrap(), "'C'");
}

/// `__init__` stores instance state that a property reads back.
///
/// ```text
/// class Box:
///     def __init__(self, v): self.v = v
///     size = property(get_size)   # get_size(self): return self.v * 2
/// return Box(21).size
/// ```
#[test]
fn init_and_property() {
    let mut init = CodeBuilder::new("__init__").with_args(&["self", "v"]);
    init.emit_local(Opcode::LoadFast, "v");
    init.emit_local(Opcode::LoadFast, "self");
    init.emit_name(Opcode::StoreAttr, "v");
    return_none(&mut init);

    let mut getter = CodeBuilder::new("get_size").with_args(&["self"]);
    getter.emit_local(Opcode::LoadFast, "self");
    getter.emit_name(Opcode::LoadAttr, "v");
    getter.load_const(2);
    binary(&mut getter, BinaryOp::Mul);
    getter.emit(Opcode::ReturnValue);

    let mut body = CodeBuilder::new("Box");
    define(&mut body, "__init__", init.build().unwrap());
    body.emit_name(Opcode::LoadName, "property");
    body.load_const(getter.build().unwrap());
    body.emit_arg(Opcode::MakeFunction, 0);
    body.emit_call(Opcode::CallFunction, 1, 0);
    body.emit_name(Opcode::StoreName, "size");
    return_none(&mut body);

    let mut b = CodeBuilder::new("<module>");
    define_class(&mut b, "Box", &[], body.build().unwrap());
    b.emit_name(Opcode::LoadName, "Box");
    b.load_const(21);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit_name(Opcode::LoadAttr, "size");
    b.emit(Opcode::ReturnValue);

    assert_eq!(run(b.build().unwrap()).result.unwrap(), "42");
}

/// Assigning to a property without a setter fails.
#[test]
fn property_without_setter_is_read_only() {
    let mut getter = CodeBuilder::new("get").with_args(&["self"]);
    getter.load_const(1);
    getter.emit(Opcode::ReturnValue);

    let mut body = CodeBuilder::new("Fixed");
    body.emit_name(Opcode::LoadName, "property");
    body.load_const(getter.build().unwrap());
    body.emit_arg(Opcode::MakeFunction, 0);
    body.emit_call(Opcode::CallFunction, 1, 0);
    body.emit_name(Opcode::StoreName, "one");
    return_none(&mut body);

    let mut b = CodeBuilder::new("<module>");
    define_class(&mut b, "Fixed", &[], body.build().unwrap());
    b.load_const(2);
    b.emit_name(Opcode::LoadName, "Fixed");
    b.emit_call(Opcode::CallFunction, 0, 0);
    b.emit_name(Opcode::StoreAttr, "one");
    return_none(&mut b);

    let exc = run(b.build().unwrap()).result.unwrap_err();
    assert_eq!(exc.summary(), "AttributeError: can't set attribute");
}

/// ```text
/// def f(n): return f(n + 1)
/// f(0)
/// ```
#[test]
fn unbounded_recursion_raises_recursion_error() {
    let mut f = CodeBuilder::new("f").with_args(&["n"]);
    f.emit_name(Opcode::LoadGlobal, "f");
    f.emit_local(Opcode::LoadFast, "n");
    f.load_const(1);
    binary(&mut f, BinaryOp::Add);
    f.emit_call(Opcode::CallFunction, 1, 0);
    f.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "f", f.build().unwrap());
    b.emit_name(Opcode::LoadName, "f");
    b.load_const(0);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit(Opcode::ReturnValue);

    let limits = ResourceLimits::new().max_recursion_depth(Some(50));
    let exc = run_with(b.build().unwrap(), LimitedTracker::new(limits))
        .result
        .unwrap_err();
    assert_eq!(exc.summary(), "RecursionError: maximum recursion depth exceeded");
}

/// ```text
/// b = bytearray(b'abcdefghijklmnopqrst')
/// b[2:12:2] = b'ABCDE'
/// return b
/// ```
#[test]
fn bytearray_extended_slice_assignment() {
    let mut b = CodeBuilder::new("<module>");
    b.emit_name(Opcode::LoadName, "bytearray");
    b.load_const(Constant::Bytes(b"abcdefghijklmnopqrst".to_vec()));
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit_name(Opcode::StoreName, "b");
    b.load_const(Constant::Bytes(b"ABCDE".to_vec()));
    b.emit_name(Opcode::LoadName, "b");
    b.load_const(2);
    b.load_const(12);
    b.load_const(2);
    b.emit_arg(Opcode::BuildSlice, 3);
    b.emit(Opcode::StoreSubscr);
    b.emit_name(Opcode::LoadName, "b");
    b.emit(Opcode::ReturnValue);

    assert_eq!(
        run(b.build().unwrap()).result.unwrap(),
        "bytearray(b'abAdBfChDjElmnopqrst')"
    );
}

/// A size mismatch in extended slice assignment raises and leaves the buffer intact.
#[test]
fn bytearray_extended_slice_size_mismatch() {
    let mut b = CodeBuilder::new("<module>");
    b.emit_name(Opcode::LoadName, "bytearray");
    b.load_const(Constant::Bytes(b"abcdef".to_vec()));
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit_name(Opcode::StoreName, "b");
    b.load_const(Constant::Bytes(b"XY".to_vec()));
    b.emit_name(Opcode::LoadName, "b");
    b.load_const(Constant::None);
    b.load_const(Constant::None);
    b.load_const(2);
    b.emit_arg(Opcode::BuildSlice, 3);
    b.emit(Opcode::StoreSubscr);
    return_none(&mut b);

    let exc = run(b.build().unwrap()).result.unwrap_err();
    assert_eq!(
        exc.summary(),
        "ValueError: attempt to assign bytes of size 2 to extended slice of size 3"
    );
}

/// Keyword arguments and defaults bind by name.
///
/// ```text
/// def f(a, b=10): return a - b
/// return f(b=1, a=5)
/// ```
#[test]
fn keyword_arguments_and_defaults() {
    let mut f = CodeBuilder::new("f").with_args(&["a", "b"]);
    f.emit_local(Opcode::LoadFast, "a");
    f.emit_local(Opcode::LoadFast, "b");
    binary(&mut f, BinaryOp::Sub);
    f.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    b.load_const(10);
    b.load_const(f.build().unwrap());
    b.emit_arg(Opcode::MakeFunction, 1);
    b.emit_name(Opcode::StoreName, "f");
    b.emit_name(Opcode::LoadName, "f");
    b.load_const("b");
    b.load_const(1);
    b.load_const("a");
    b.load_const(5);
    b.emit_call(Opcode::CallFunction, 0, 2);
    b.emit_name(Opcode::LoadName, "f");
    b.load_const(7);
    b.emit_call(Opcode::CallFunction, 1, 0);
    b.emit_arg(Opcode::BuildTuple, 2);
    b.emit(Opcode::ReturnValue);

    assert_eq!(run(b.build().unwrap()).result.unwrap(), "(4, -3)");
}

/// Closures share a cell with the enclosing function.
///
/// ```text
/// def outer():
///     count = 0
///     def bump():
///         nonlocal count
///         count += 1
///         return count
///     bump(); return bump()
/// ```
#[test]
fn closure_shares_cell() {
    let mut bump = CodeBuilder::new("bump");
    let count = bump.freevar("count");
    bump.emit_arg(Opcode::LoadDeref, count);
    bump.load_const(1);
    bump.emit_arg(Opcode::InplaceOp, BinaryOp::Add as u16);
    bump.emit_arg(Opcode::StoreDeref, count);
    bump.emit_arg(Opcode::LoadDeref, count);
    bump.emit(Opcode::ReturnValue);

    let mut outer = CodeBuilder::new("outer");
    let cell = outer.cellvar("count");
    outer.load_const(0);
    outer.emit_arg(Opcode::StoreDeref, cell);
    outer.emit_arg(Opcode::LoadClosure, cell);
    outer.emit_arg(Opcode::BuildTuple, 1);
    outer.load_const(bump.build().unwrap());
    outer.emit_arg(Opcode::MakeClosure, 0);
    outer.emit_local(Opcode::StoreFast, "bump");
    outer.emit_local(Opcode::LoadFast, "bump");
    outer.emit_call(Opcode::CallFunction, 0, 0);
    outer.emit(Opcode::PopTop);
    outer.emit_local(Opcode::LoadFast, "bump");
    outer.emit_call(Opcode::CallFunction, 0, 0);
    outer.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "outer", outer.build().unwrap());
    b.emit_name(Opcode::LoadName, "outer");
    b.emit_call(Opcode::CallFunction, 0, 0);
    b.emit(Opcode::ReturnValue);

    assert_eq!(run(b.build().unwrap()).result.unwrap(), "2");
}

/// Reading a local before assignment.
#[test]
fn unbound_local() {
    let mut f = CodeBuilder::new("f");
    f.emit_local(Opcode::LoadFast, "x");
    f.emit(Opcode::ReturnValue);

    let mut b = CodeBuilder::new("<module>");
    define(&mut b, "f", f.build().unwrap());
    b.emit_name(Opcode::LoadName, "f");
    b.emit_call(Opcode::CallFunction, 0, 0);
    b.emit(Opcode::ReturnValue);

    let exc = run(b.build().unwrap()).result.unwrap_err();
    assert_eq!(exc.exc_type(), Some(ferrule::ExcType::UnboundLocalError));
    assert_eq!(exc.traceback().len(), 2);
    assert_eq!(exc.traceback()[1].function, "f");
}
