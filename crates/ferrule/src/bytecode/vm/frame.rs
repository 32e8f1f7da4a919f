//! Activation records.

use std::sync::Arc;

use super::{
    block::BlockStack,
    stack::{StackSlot, ValueStack},
};
use crate::{
    bytecode::code::{Code, CodeFlags},
    function::Cell,
    namespace::Namespace,
    value::Value,
};

/// One execution of a code object.
///
/// Created on call and dropped on return or unwind; a generator keeps its frame alive between
/// `yield` and the next resumption.
#[derive(Debug)]
pub struct Frame {
    pub(crate) code: Arc<Code>,
    /// Offset of the next instruction to fetch.
    pub(crate) ip: usize,
    /// Offset of the instruction currently executing.
    pub(crate) instr_start: usize,
    pub(crate) locals: Vec<Option<Value>>,
    /// Cell variables followed by free variables.
    pub(crate) cells: Vec<Arc<Cell>>,
    pub(crate) globals: Namespace,
    /// Name table for `LoadName`/`StoreName`; module frames use their globals.
    pub(crate) names: Option<Namespace>,
    pub(crate) stack: ValueStack,
    pub(crate) blocks: BlockStack,
    /// Operand stack contents while suspended at a `yield`.
    pub(crate) saved_stack: Option<Vec<StackSlot>>,
    pub(crate) started: bool,
}

impl Frame {
    /// A module-level frame: names resolve against `globals`, then builtins.
    #[must_use]
    pub fn new(code: Arc<Code>, globals: Namespace) -> Self {
        let locals = vec![None; code.varnames().len()];
        Self::build(code, globals, None, locals, &[])
    }

    /// A frame whose `LoadName`/`StoreName` use a separate name table, as class bodies do.
    #[must_use]
    pub fn with_names(code: Arc<Code>, globals: Namespace, names: Namespace) -> Self {
        let locals = vec![None; code.varnames().len()];
        Self::build(code, globals, Some(names), locals, &[])
    }

    /// A function frame with bound parameters and the closure of the function object.
    pub(crate) fn for_function(
        code: Arc<Code>,
        globals: Namespace,
        locals: Vec<Option<Value>>,
        closure: &[Arc<Cell>],
    ) -> Self {
        Self::build(code, globals, None, locals, closure)
    }

    /// A class body frame: names go to the class namespace, free variables to the closure.
    pub(crate) fn for_class_body(code: Arc<Code>, globals: Namespace, names: Namespace, closure: &[Arc<Cell>]) -> Self {
        let locals = vec![None; code.varnames().len()];
        Self::build(code, globals, Some(names), locals, closure)
    }

    fn build(
        code: Arc<Code>,
        globals: Namespace,
        names: Option<Namespace>,
        locals: Vec<Option<Value>>,
        closure: &[Arc<Cell>],
    ) -> Self {
        let flags = code.flags();
        let param_count = code.arg_count()
            + usize::from(flags.contains(CodeFlags::VARARGS))
            + usize::from(flags.contains(CodeFlags::VARKEYWORDS));
        // parameters captured by nested functions start out holding the argument
        let params = &code.varnames()[..param_count.min(code.varnames().len())];
        let mut cells: Vec<Arc<Cell>> = code
            .cellvars()
            .iter()
            .map(|name| {
                let initial = params
                    .iter()
                    .position(|param| param == name)
                    .and_then(|slot| locals[slot].clone());
                Arc::new(Cell::new(initial))
            })
            .collect();
        cells.extend(closure.iter().cloned());
        let stack = ValueStack::with_capacity(code.stack_size());
        Self {
            code,
            ip: 0,
            instr_start: 0,
            locals,
            cells,
            globals,
            names,
            stack,
            blocks: BlockStack::default(),
            saved_stack: None,
            started: false,
        }
    }

    #[must_use]
    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }

    #[must_use]
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Source line of the instruction executing (or last executed).
    #[must_use]
    pub fn current_line(&self) -> u32 {
        self.code.line_for(self.instr_start)
    }

    #[must_use]
    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// Current value of a local variable.
    #[must_use]
    pub fn local(&self, name: &str) -> Option<Value> {
        let slot = self.code.varnames().iter().position(|n| &**n == name)?;
        self.locals[slot].clone()
    }

    /// Live operand stack depth; the saved depth while suspended.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.saved_stack.as_ref().map_or(self.stack.len(), Vec::len)
    }

    #[must_use]
    pub fn block_depth(&self) -> usize {
        self.blocks.depth()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }
}
