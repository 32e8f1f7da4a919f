//! Builder for assembling code objects.
//!
//! `CodeBuilder` encodes opcodes and operands, manages forward jumps that need patching, records
//! source lines, and on [`CodeBuilder::build`] computes the value-stack bound by walking every
//! reachable path through the instruction stream.
//!
//! ```
//! use ferrule::{CodeBuilder, Constant, Opcode};
//!
//! let mut b = CodeBuilder::new("<module>");
//! b.load_const(Constant::Int(2));
//! b.load_const(Constant::Int(3));
//! b.emit_arg(Opcode::BinaryOp, ferrule::BinaryOp::Add as u16);
//! b.emit(Opcode::ReturnValue);
//! let code = b.build().unwrap();
//! assert_eq!(code.stack_size(), 2);
//! ```

use std::{fmt, sync::Arc};

use ahash::AHashSet;

use super::{
    code::{Code, CodeFlags, Constant, LineTable},
    op::{Opcode, split_call_arg},
};

/// A forward jump awaiting its target; resolve it with [`CodeBuilder::patch_jump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "forward jumps must be patched"]
pub struct JumpLabel(usize);

/// Reasons [`CodeBuilder::build`] rejects an instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A table index or jump target does not fit in a `u16` operand.
    OperandOverflow { offset: usize },
    /// A jump or handler lands outside the code or inside an instruction.
    BadJumpTarget { offset: usize, target: usize },
    /// Some path pops more values than the stack holds.
    StackUnderflow { offset: usize },
    /// Some path needs more than `u16::MAX` stack slots.
    StackTooDeep { offset: usize },
    /// Execution can run past the last instruction.
    FallsOffEnd,
    /// A jump label was emitted but never patched.
    UnpatchedJump { offset: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperandOverflow { offset } => write!(f, "operand at offset {offset} does not fit in 16 bits"),
            Self::BadJumpTarget { offset, target } => {
                write!(f, "instruction at offset {offset} jumps to invalid target {target}")
            }
            Self::StackUnderflow { offset } => write!(f, "stack underflow at offset {offset}"),
            Self::StackTooDeep { offset } => write!(f, "stack too deep at offset {offset}"),
            Self::FallsOffEnd => f.write_str("execution falls off the end of the code"),
            Self::UnpatchedJump { offset } => write!(f, "jump at offset {offset} was never patched"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Assembles a [`Code`] object.
#[derive(Debug)]
pub struct CodeBuilder {
    name: Arc<str>,
    bytecode: Vec<u8>,
    /// Instruction start offsets in emission order.
    instruction_offsets: Vec<usize>,
    constants: Vec<Constant>,
    names: Vec<Arc<str>>,
    varnames: Vec<Arc<str>>,
    cellvars: Vec<Arc<str>>,
    freevars: Vec<Arc<str>>,
    line_table: LineTable,
    first_line: u32,
    current_line: u32,
    /// Line and offset of the last line-table entry.
    recorded_line: u32,
    recorded_offset: usize,
    arg_count: u16,
    flags: CodeFlags,
    unpatched: AHashSet<usize>,
    error: Option<BuildError>,
}

impl CodeBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            bytecode: Vec::new(),
            instruction_offsets: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            cellvars: Vec::new(),
            freevars: Vec::new(),
            line_table: LineTable::default(),
            first_line: 1,
            current_line: 1,
            recorded_line: 1,
            recorded_offset: 0,
            arg_count: 0,
            flags: CodeFlags::default(),
            unpatched: AHashSet::new(),
            error: None,
        }
    }

    /// Sets the line of the first instruction. Call before emitting anything.
    #[must_use]
    pub fn with_first_line(mut self, line: u32) -> Self {
        self.first_line = line;
        self.current_line = line;
        self.recorded_line = line;
        self
    }

    /// Declares the named positional parameters. They occupy the first local slots.
    #[must_use]
    pub fn with_args(mut self, names: &[&str]) -> Self {
        debug_assert!(self.varnames.is_empty(), "parameters must be declared before other locals");
        self.varnames = names.iter().map(|&name| Arc::from(name)).collect();
        self.arg_count = self.index(names.len());
        self
    }

    /// Declares a `*args` parameter collecting surplus positional arguments.
    #[must_use]
    pub fn with_varargs(mut self, name: &str) -> Self {
        self.varnames.push(name.into());
        self.flags.insert(CodeFlags::VARARGS);
        self
    }

    /// Declares a `**kwargs` parameter collecting surplus keyword arguments.
    #[must_use]
    pub fn with_varkeywords(mut self, name: &str) -> Self {
        self.varnames.push(name.into());
        self.flags.insert(CodeFlags::VARKEYWORDS);
        self
    }

    /// Marks the code as a generator body.
    #[must_use]
    pub fn generator(mut self) -> Self {
        self.flags.insert(CodeFlags::GENERATOR);
        self
    }

    /// Sets the source line for subsequently emitted instructions.
    pub fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    /// Emits an instruction without an operand.
    pub fn emit(&mut self, op: Opcode) {
        debug_assert!(!op.has_arg(), "{op} needs an operand");
        self.start_instruction();
        self.bytecode.push(op as u8);
    }

    /// Emits an instruction with a 16-bit operand.
    pub fn emit_arg(&mut self, op: Opcode, arg: u16) {
        debug_assert!(op.has_arg(), "{op} takes no operand");
        self.start_instruction();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&arg.to_le_bytes());
    }

    /// Emits a jump (or block setup) whose target is not known yet.
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        debug_assert!(op.is_jump(), "{op} is not a jump");
        let label = JumpLabel(self.bytecode.len());
        self.emit_arg(op, 0);
        self.unpatched.insert(label.0);
        label
    }

    /// Points a forward jump at the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.current_offset();
        let operand = self.index(target);
        self.bytecode[label.0 + 1..label.0 + 3].copy_from_slice(&operand.to_le_bytes());
        self.unpatched.remove(&label.0);
    }

    /// Emits a jump to a known offset, typically backwards to a loop head.
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        debug_assert!(op.is_jump(), "{op} is not a jump");
        let operand = self.index(target);
        self.emit_arg(op, operand);
    }

    /// Offset the next instruction will be emitted at.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    /// Adds a constant to the pool, reusing an identical entry.
    pub fn add_const(&mut self, constant: impl Into<Constant>) -> u16 {
        let constant = constant.into();
        if let Some(i) = self.constants.iter().position(|c| c.same_as(&constant)) {
            return self.index(i);
        }
        self.constants.push(constant);
        self.index(self.constants.len() - 1)
    }

    /// Index of a global/attribute name, added on first use.
    pub fn add_name(&mut self, name: &str) -> u16 {
        Self::intern(&mut self.names, name, &mut self.error)
    }

    /// Slot of a local variable, allocated on first use.
    pub fn local(&mut self, name: &str) -> u16 {
        Self::intern(&mut self.varnames, name, &mut self.error)
    }

    /// Declares a local captured by nested functions; returns its deref index.
    ///
    /// Cell variables must be declared before free variables.
    pub fn cellvar(&mut self, name: &str) -> u16 {
        debug_assert!(self.freevars.is_empty(), "cell variables must precede free variables");
        Self::intern(&mut self.cellvars, name, &mut self.error)
    }

    /// Declares a variable received from the enclosing function; returns its deref index.
    pub fn freevar(&mut self, name: &str) -> u16 {
        let index = Self::intern(&mut self.freevars, name, &mut self.error);
        self.index(self.cellvars.len() + usize::from(index))
    }

    /// `LoadConst` of a (deduplicated) constant.
    pub fn load_const(&mut self, constant: impl Into<Constant>) {
        let index = self.add_const(constant);
        self.emit_arg(Opcode::LoadConst, index);
    }

    /// Emits an opcode whose operand is a name-table index.
    pub fn emit_name(&mut self, op: Opcode, name: &str) {
        let index = self.add_name(name);
        self.emit_arg(op, index);
    }

    /// Emits an opcode whose operand is a local slot.
    pub fn emit_local(&mut self, op: Opcode, name: &str) {
        let slot = self.local(name);
        self.emit_arg(op, slot);
    }

    /// `CallFunction` with the given positional and keyword-pair counts.
    pub fn emit_call(&mut self, op: Opcode, positional: u8, keywords: u8) {
        self.emit_arg(op, u16::from_le_bytes([positional, keywords]));
    }

    /// Finishes the code object, validating jumps and computing the stack bound.
    pub fn build(self) -> Result<Code, BuildError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if let Some(&offset) = self.unpatched.iter().min() {
            return Err(BuildError::UnpatchedJump { offset });
        }
        let stack_size = max_stack_depth(&self.bytecode, &self.instruction_offsets)?;
        Ok(Code::new(
            self.name,
            self.bytecode,
            self.constants,
            self.names,
            self.varnames,
            self.cellvars,
            self.freevars,
            self.line_table,
            self.first_line,
            stack_size,
            self.arg_count,
            self.flags,
        ))
    }

    fn start_instruction(&mut self) {
        let offset = self.bytecode.len();
        if self.current_line != self.recorded_line {
            self.line_table.push(
                offset - self.recorded_offset,
                i64::from(self.current_line) - i64::from(self.recorded_line),
            );
            self.recorded_line = self.current_line;
            self.recorded_offset = offset;
        }
        self.instruction_offsets.push(offset);
    }

    /// Converts a table index or offset into an operand, remembering the first overflow.
    fn index(&mut self, value: usize) -> u16 {
        u16::try_from(value).unwrap_or_else(|_| {
            self.error.get_or_insert(BuildError::OperandOverflow {
                offset: self.bytecode.len(),
            });
            0
        })
    }

    fn intern(table: &mut Vec<Arc<str>>, name: &str, error: &mut Option<BuildError>) -> u16 {
        let index = table.iter().position(|n| &**n == name).unwrap_or_else(|| {
            table.push(name.into());
            table.len() - 1
        });
        u16::try_from(index).unwrap_or_else(|_| {
            error.get_or_insert(BuildError::OperandOverflow { offset: 0 });
            0
        })
    }
}

/// Stack behaviour of one instruction.
struct Effect {
    /// Slots the instruction needs on the stack.
    needs: i32,
    /// Depth change when execution continues with the next instruction.
    fall: Option<i32>,
    /// Depth change at the jump target (or handler, for block setups).
    jump: Option<i32>,
}

impl Effect {
    fn seq(needs: i32, fall: i32) -> Self {
        Self {
            needs,
            fall: Some(fall),
            jump: None,
        }
    }
}

fn stack_effect(op: Opcode, arg: u16) -> Effect {
    let n = i32::from(arg);
    let call = |extra: i32| {
        let (positional, keywords) = split_call_arg(arg);
        let args = positional as i32 + 2 * keywords as i32 + extra;
        Effect::seq(args + 1, -args)
    };
    match op {
        Opcode::Nop | Opcode::PopBlock => Effect::seq(0, 0),
        Opcode::PopTop => Effect::seq(1, -1),
        Opcode::RotTwo => Effect::seq(2, 0),
        Opcode::RotThree => Effect::seq(3, 0),
        Opcode::RotFour => Effect::seq(4, 0),
        Opcode::RotN => Effect::seq(n, 0),
        Opcode::DupTop => Effect::seq(1, 1),
        Opcode::DupTopN => Effect::seq(n, n),
        Opcode::BinarySubscr => Effect::seq(2, -1),
        Opcode::StoreSubscr => Effect::seq(3, -3),
        Opcode::DeleteSubscr => Effect::seq(2, -2),
        Opcode::GetIter | Opcode::UnaryOp | Opcode::LoadAttr => Effect::seq(1, 0),
        Opcode::ReturnValue => Effect {
            needs: 1,
            fall: None,
            jump: None,
        },
        Opcode::RaiseVarargs => Effect {
            needs: n,
            fall: None,
            jump: None,
        },
        Opcode::BreakLoop => Effect {
            needs: 0,
            fall: None,
            jump: None,
        },
        Opcode::YieldValue => Effect::seq(1, 0),
        // A finally body is entered with one marker (normal exit), two slots (return) or three
        // (exception). Every entry is modelled as the three-slot case, so all paths reach the
        // body at the same depth and `EndFinally` removes exactly what it was handed.
        Opcode::EndFinally => Effect::seq(3, -3),
        Opcode::WithCleanup => Effect::seq(2, -1),
        Opcode::BeginFinally => Effect::seq(0, 3),
        Opcode::BuildClass => Effect::seq(3, -2),
        Opcode::LoadConst
        | Opcode::LoadFast
        | Opcode::LoadGlobal
        | Opcode::LoadDeref
        | Opcode::LoadClosure
        | Opcode::LoadName => Effect::seq(0, 1),
        Opcode::StoreFast | Opcode::StoreGlobal | Opcode::StoreDeref | Opcode::StoreName | Opcode::DeleteAttr => {
            Effect::seq(1, -1)
        }
        Opcode::DeleteFast | Opcode::DeleteGlobal | Opcode::DeleteName => Effect::seq(0, 0),
        Opcode::StoreAttr => Effect::seq(2, -2),
        Opcode::BinaryOp | Opcode::InplaceOp | Opcode::CompareOp => Effect::seq(2, -1),
        Opcode::BuildTuple | Opcode::BuildList | Opcode::BuildSlice => Effect::seq(n, 1 - n),
        Opcode::BuildMap => Effect::seq(2 * n, 1 - 2 * n),
        Opcode::UnpackSequence => Effect::seq(1, n - 1),
        Opcode::Jump => Effect {
            needs: 0,
            fall: None,
            jump: Some(0),
        },
        Opcode::ContinueLoop => Effect {
            needs: 0,
            fall: None,
            jump: Some(0),
        },
        Opcode::PopJumpIfFalse | Opcode::PopJumpIfTrue => Effect {
            needs: 1,
            fall: Some(-1),
            jump: Some(-1),
        },
        Opcode::JumpIfFalseOrPop | Opcode::JumpIfTrueOrPop => Effect {
            needs: 1,
            fall: Some(-1),
            jump: Some(0),
        },
        Opcode::ForIter => Effect {
            needs: 1,
            fall: Some(1),
            jump: Some(-1),
        },
        Opcode::JumpIfNotExcMatch => Effect {
            needs: 2,
            fall: Some(-1),
            jump: Some(-1),
        },
        Opcode::SetupLoop => Effect {
            needs: 0,
            fall: Some(0),
            jump: Some(0),
        },
        // handlers start with traceback, value and marker pushed above the block level
        Opcode::SetupExcept | Opcode::SetupFinally => Effect {
            needs: 0,
            fall: Some(0),
            jump: Some(3),
        },
        Opcode::SetupWith => Effect {
            needs: 1,
            fall: Some(1),
            jump: Some(3),
        },
        Opcode::CallFunction => call(0),
        Opcode::CallFunctionVar | Opcode::CallFunctionKw => call(1),
        Opcode::CallFunctionVarKw => call(2),
        Opcode::MakeFunction => Effect::seq(n + 1, -n),
        Opcode::MakeClosure => Effect::seq(n + 2, -(n + 1)),
    }
}

/// Longest value stack any path through `bytecode` can build, starting from an empty stack.
///
/// Every reachable instruction is visited with the largest depth any predecessor hands it, so the
/// bound never underestimates.
fn max_stack_depth(bytecode: &[u8], starts: &[usize]) -> Result<u16, BuildError> {
    let is_start = |offset: usize| starts.binary_search(&offset).is_ok();
    let mut depth_at: Vec<Option<i32>> = vec![None; bytecode.len()];
    let mut worklist = vec![(0usize, 0i32)];
    let mut max = 0i32;
    if bytecode.is_empty() {
        return Err(BuildError::FallsOffEnd);
    }
    while let Some((offset, depth)) = worklist.pop() {
        if offset >= bytecode.len() {
            return Err(BuildError::FallsOffEnd);
        }
        match depth_at[offset] {
            Some(seen) if seen >= depth => continue,
            _ => depth_at[offset] = Some(depth),
        }
        let Ok(op) = Opcode::try_from(bytecode[offset]) else {
            return Err(BuildError::BadJumpTarget { offset, target: offset });
        };
        let arg = if op.has_arg() {
            u16::from_le_bytes([bytecode[offset + 1], bytecode[offset + 2]])
        } else {
            0
        };
        let effect = stack_effect(op, arg);
        if depth < effect.needs {
            return Err(BuildError::StackUnderflow { offset });
        }
        let mut follow = |target: usize, delta: i32| {
            let next = depth + delta;
            if next > i32::from(u16::MAX) {
                return Err(BuildError::StackTooDeep { offset });
            }
            max = max.max(next);
            worklist.push((target, next));
            Ok(())
        };
        if let Some(delta) = effect.jump {
            let target = usize::from(arg);
            if !is_start(target) {
                return Err(BuildError::BadJumpTarget { offset, target });
            }
            follow(target, delta)?;
        }
        if let Some(delta) = effect.fall {
            follow(offset + op.size(), delta)?;
        }
    }
    Ok(max as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_depth() {
        let mut b = CodeBuilder::new("f");
        b.load_const(1);
        b.load_const(2);
        b.load_const(3);
        b.emit_arg(Opcode::BuildTuple, 3);
        b.emit(Opcode::ReturnValue);
        let code = b.build().unwrap();
        assert_eq!(code.stack_size(), 3);
        assert_eq!(code.constants().len(), 3);
    }

    #[test]
    fn constants_and_names_are_deduplicated() {
        let mut b = CodeBuilder::new("f");
        assert_eq!(b.add_const(7), b.add_const(7));
        assert_ne!(b.add_const(1), b.add_const(true));
        assert_eq!(b.add_name("x"), b.add_name("x"));
        assert_eq!(b.local("a"), 0);
        assert_eq!(b.local("b"), 1);
        assert_eq!(b.local("a"), 0);
    }

    #[test]
    fn exception_handler_depth_includes_unwind_slots() {
        // try: pass / except: pass
        let mut b = CodeBuilder::new("f");
        let handler = b.emit_jump(Opcode::SetupExcept);
        b.emit(Opcode::PopBlock);
        let end = b.emit_jump(Opcode::Jump);
        b.patch_jump(handler);
        b.emit(Opcode::PopTop);
        b.emit(Opcode::PopTop);
        b.emit(Opcode::PopTop);
        b.patch_jump(end);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        assert_eq!(b.build().unwrap().stack_size(), 3);
    }

    #[test]
    fn loops_with_finally_do_not_grow_the_bound() {
        // while True: try: pass finally: pass
        let mut b = CodeBuilder::new("f");
        let exit = b.emit_jump(Opcode::SetupLoop);
        let head = b.current_offset();
        let finally = b.emit_jump(Opcode::SetupFinally);
        b.emit(Opcode::PopBlock);
        b.emit(Opcode::BeginFinally);
        b.patch_jump(finally);
        b.emit(Opcode::EndFinally);
        b.emit_jump_to(Opcode::Jump, head);
        b.patch_jump(exit);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        assert_eq!(b.build().unwrap().stack_size(), 3);
    }

    #[test]
    fn finally_inside_for_keeps_the_iterator() {
        // for _ in x: try: pass finally: pass
        let mut b = CodeBuilder::new("f");
        let exit = b.emit_jump(Opcode::SetupLoop);
        b.load_const(Constant::None);
        b.emit(Opcode::GetIter);
        let head = b.current_offset();
        let exhausted = b.emit_jump(Opcode::ForIter);
        b.emit(Opcode::PopTop);
        let finally = b.emit_jump(Opcode::SetupFinally);
        b.emit(Opcode::PopBlock);
        b.emit(Opcode::BeginFinally);
        b.patch_jump(finally);
        b.emit(Opcode::EndFinally);
        b.emit_jump_to(Opcode::Jump, head);
        b.patch_jump(exhausted);
        b.emit(Opcode::PopBlock);
        b.patch_jump(exit);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        // the iterator stays below the finally body on both ways in
        assert_eq!(b.build().unwrap().stack_size(), 4);
    }

    #[test]
    fn rejects_underflow_and_missing_return() {
        let mut b = CodeBuilder::new("f");
        b.emit(Opcode::PopTop);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        assert_eq!(b.build().unwrap_err(), BuildError::StackUnderflow { offset: 0 });

        let mut b = CodeBuilder::new("f");
        b.load_const(Constant::None);
        assert_eq!(b.build().unwrap_err(), BuildError::FallsOffEnd);
    }

    #[test]
    fn rejects_unpatched_and_misaligned_jumps() {
        let mut b = CodeBuilder::new("f");
        let _label = b.emit_jump(Opcode::Jump);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        assert_eq!(b.build().unwrap_err(), BuildError::UnpatchedJump { offset: 0 });

        let mut b = CodeBuilder::new("f");
        b.emit_jump_to(Opcode::Jump, 4);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        assert_eq!(b.build().unwrap_err(), BuildError::BadJumpTarget { offset: 0, target: 4 });
    }

    #[test]
    fn line_table_follows_set_line() {
        let mut b = CodeBuilder::new("f").with_first_line(10);
        b.load_const(1);
        b.set_line(12);
        b.emit(Opcode::PopTop);
        b.load_const(Constant::None);
        b.emit(Opcode::ReturnValue);
        let code = b.build().unwrap();
        assert_eq!(code.line_for(0), 10);
        assert_eq!(code.line_for(3), 12);
        assert_eq!(code.line_for(5), 12);
    }
}
