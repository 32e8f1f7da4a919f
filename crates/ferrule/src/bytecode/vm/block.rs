//! Protected regions active in a frame.

use smallvec::SmallVec;
use strum::IntoStaticStr;

use crate::{
    exception_private::{RunError, RunResult},
    resource::MAX_BLOCK_DEPTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub enum BlockKind {
    /// `break` jumps to the handler; `continue` keeps the block.
    Loop,
    /// Entered only for exceptions.
    Except,
    /// Entered for every way of leaving the body.
    Finally,
    /// As `Finally`, with the context manager's `__exit__` beneath the block level.
    With,
}

/// A block marker: where to go on unwind and how far to drain the value stack first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub handler: usize,
    pub level: usize,
}

#[derive(Debug, Default)]
pub struct BlockStack {
    blocks: SmallVec<[Block; 4]>,
}

impl BlockStack {
    pub fn push(&mut self, block: Block) -> RunResult<()> {
        if self.blocks.len() >= MAX_BLOCK_DEPTH {
            return Err(RunError::internal("too many statically nested blocks"));
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Block> {
        self.blocks.pop()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    #[must_use]
    pub fn has_open(&self) -> bool {
        !self.blocks.is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
