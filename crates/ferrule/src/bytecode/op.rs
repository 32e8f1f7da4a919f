//! Opcode definitions.
//!
//! Instructions are one opcode byte, followed by a little-endian `u16` operand for opcodes at or
//! above [`HAVE_ARGUMENT`]. Jump operands are absolute byte offsets into the code object.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

/// Opcodes numbered at or above this carry a two-byte operand.
pub const HAVE_ARGUMENT: u8 = 64;

#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromRepr, Display, IntoStaticStr, Serialize, Deserialize,
)]
pub enum Opcode {
    // === stack manipulation ===
    Nop = 0,
    /// Discards the top slot (value or unwind marker).
    PopTop = 1,
    RotTwo = 2,
    /// `[a, b, c]` -> `[c, a, b]`
    RotThree = 3,
    DupTop = 4,
    RotFour = 5,

    // === subscripts and iteration ===
    /// `TOS1[TOS]`
    BinarySubscr = 20,
    /// `TOS1[TOS] = TOS2`
    StoreSubscr = 21,
    /// `del TOS1[TOS]`
    DeleteSubscr = 22,
    GetIter = 25,

    // === frame exits and block control ===
    ReturnValue = 30,
    YieldValue = 31,
    /// Pops the innermost block and drains the value stack to its level.
    PopBlock = 32,
    /// Resumes whatever the innermost finally/with handler interrupted.
    EndFinally = 33,
    /// Calls a context manager's `__exit__` for the unwind marker on top of the stack.
    WithCleanup = 34,
    BreakLoop = 35,
    /// Pushes the "fell through normally" marker in front of a finally body.
    BeginFinally = 36,
    /// Pops a class body function, a bases tuple and a name; pushes the new class.
    BuildClass = 40,

    // === opcodes with an operand ===
    LoadConst = 64,
    LoadFast = 65,
    StoreFast = 66,
    DeleteFast = 67,
    LoadGlobal = 68,
    StoreGlobal = 69,
    DeleteGlobal = 70,
    LoadDeref = 71,
    StoreDeref = 72,
    /// Pushes the cell object itself, for building closures.
    LoadClosure = 73,
    LoadAttr = 74,
    /// `TOS.name = TOS1`
    StoreAttr = 75,
    DeleteAttr = 76,
    /// Class-body / module name lookup: local namespace, then globals, then builtins.
    LoadName = 77,
    StoreName = 78,
    DeleteName = 79,

    /// Operand is a [`BinaryOp`](crate::ops::BinaryOp).
    BinaryOp = 80,
    /// In-place variant; mutable sequences are updated without rebinding.
    InplaceOp = 81,
    /// Operand is a [`UnaryOp`](crate::ops::UnaryOp).
    UnaryOp = 82,
    /// Operand is a [`CompareOp`](crate::ops::CompareOp).
    CompareOp = 83,

    BuildTuple = 90,
    BuildList = 91,
    /// Pops `n` key/value pairs.
    BuildMap = 92,
    /// Operand 2 or 3: number of bounds on the stack.
    BuildSlice = 93,
    UnpackSequence = 94,
    DupTopN = 95,
    /// Moves TOS down to position `n`.
    RotN = 96,

    Jump = 100,
    PopJumpIfFalse = 101,
    PopJumpIfTrue = 102,
    /// Jumps (keeping TOS) if it is false, otherwise pops it.
    JumpIfFalseOrPop = 103,
    JumpIfTrueOrPop = 104,
    /// Pushes the next item, or pops the exhausted iterator and jumps.
    ForIter = 105,
    /// `continue` from inside a try block; operand is the loop's continue target.
    ContinueLoop = 106,
    /// Pops a class or tuple of classes and jumps if the pending exception does not match.
    JumpIfNotExcMatch = 107,

    SetupLoop = 110,
    SetupExcept = 111,
    SetupFinally = 112,
    SetupWith = 113,

    /// Operand 0..=3: number of raise arguments on the stack.
    RaiseVarargs = 120,

    /// Operand: low byte positional count, high byte keyword-pair count.
    CallFunction = 130,
    /// As `CallFunction`, plus a trailing `*args` sequence.
    CallFunctionVar = 131,
    /// As `CallFunction`, plus a trailing `**kwargs` dict.
    CallFunctionKw = 132,
    /// Both `*args` and `**kwargs`.
    CallFunctionVarKw = 133,

    /// Pops a code object and `n` defaults.
    MakeFunction = 140,
    /// Pops a code object, a tuple of cells and `n` defaults.
    MakeClosure = 141,
}

impl Opcode {
    #[must_use]
    pub fn has_arg(self) -> bool {
        self as u8 >= HAVE_ARGUMENT
    }

    /// Encoded size of the instruction in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        if self.has_arg() { 3 } else { 1 }
    }

    /// Whether the operand is an absolute jump target.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::PopJumpIfFalse
                | Self::PopJumpIfTrue
                | Self::JumpIfFalseOrPop
                | Self::JumpIfTrueOrPop
                | Self::ForIter
                | Self::ContinueLoop
                | Self::JumpIfNotExcMatch
                | Self::SetupLoop
                | Self::SetupExcept
                | Self::SetupFinally
                | Self::SetupWith
        )
    }

    /// Whether execution never continues with the next instruction.
    #[must_use]
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::ReturnValue | Self::RaiseVarargs | Self::BreakLoop | Self::ContinueLoop
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_repr(byte).ok_or(byte)
    }
}

/// Splits a call operand into positional and keyword-pair counts.
#[must_use]
pub fn split_call_arg(arg: u16) -> (usize, usize) {
    let [positional, keywords] = arg.to_le_bytes();
    (usize::from(positional), usize::from(keywords))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_boundary() {
        assert!(!Opcode::BuildClass.has_arg());
        assert!(Opcode::LoadConst.has_arg());
        assert_eq!(Opcode::PopTop.size(), 1);
        assert_eq!(Opcode::Jump.size(), 3);
    }

    #[test]
    fn decode_roundtrip_and_invalid() {
        assert_eq!(Opcode::try_from(107), Ok(Opcode::JumpIfNotExcMatch));
        assert_eq!(Opcode::try_from(255), Err(255));
    }

    #[test]
    fn call_operand_split() {
        assert_eq!(split_call_arg(0x0203), (3, 2));
    }
}
