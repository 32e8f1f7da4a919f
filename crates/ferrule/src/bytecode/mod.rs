//! Bytecode representation and execution.
//!
//! # Module Structure
//!
//! - `op` - Opcode definitions and operand encoding
//! - `code` - Code objects with their constant, name and line tables
//! - `builder` - `CodeBuilder` for emitting bytecode with symbolic jump labels
//! - `dis` - Disassembler
//! - `vm` - The virtual machine

pub use builder::{BuildError, CodeBuilder, JumpLabel};
pub use code::{Code, CodeFlags, Constant, LineTable};
pub use dis::{constant_repr, disassemble};
pub use op::{HAVE_ARGUMENT, Opcode, split_call_arg};
pub use vm::{
    Block, BlockKind, BlockStack, Frame, FrameExit, ResumeValue, StackSlot, UnwindMarker, VM, ValueStack,
    build_exception,
};

mod builder;
pub(crate) mod code;
mod dis;
pub(crate) mod op;
mod vm;
