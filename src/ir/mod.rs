//! Intermediate representation: control-flow graphs of basic blocks.
//!
//! One [`Cfg`] per source function. The CFG owns its blocks in an arena and
//! hands out [`BlockId`] handles; successor edges are handles into the same
//! arena, so loop back-edges (a block targeting itself) carry no ownership
//! and cannot form reference cycles.

pub mod instr;
pub mod symbols;

pub use instr::{BinOp, CmpOp, Instr, Operand};
pub use symbols::{ScopeId, StorageType, Symbol, SymbolTable, WORD_SIZE};

use crate::error::SemanticError;

/// Reserved label of the frame set-up block created at function entry.
pub const PROLOGUE_LABEL: &str = "prologue";
/// Reserved label of the terminal return block.
pub const EPILOGUE_LABEL: &str = "epilogue";

/// Stable handle to a block in its CFG's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// A straight-line instruction sequence with at most two successor edges.
///
/// `exit_true == None` marks the terminal epilogue block. A present
/// `exit_false` alongside `exit_true` is a two-way conditional branch;
/// `exit_true` alone is an unconditional jump.
#[derive(Debug)]
pub struct BasicBlock {
    pub label: String,
    pub scope: ScopeId,
    pub instrs: Vec<Instr>,
    pub exit_true: Option<BlockId>,
    pub exit_false: Option<BlockId>,
}

impl BasicBlock {
    fn new(label: String, scope: ScopeId) -> Self {
        Self {
            label,
            scope,
            instrs: Vec::new(),
            exit_true: None,
            exit_false: None,
        }
    }
}

/// Control-flow graph and symbol state for one function.
///
/// Mutated freely during lowering, then read-only once handed to the code
/// generator. Blocks are kept in insertion order; by construction the block
/// at index 0 is the prologue and index 1 is the body entry, labeled with
/// the function's name.
#[derive(Debug)]
pub struct Cfg {
    pub name: String,
    blocks: Vec<BasicBlock>,
    pub symbols: SymbolTable,
    errors: Vec<SemanticError>,
}

impl Cfg {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            symbols: SymbolTable::new(),
            errors: Vec::new(),
        }
    }

    pub fn add_block(&mut self, label: impl Into<String>, scope: ScopeId) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(label.into(), scope));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn label_of(&self, id: BlockId) -> &str {
        &self.blocks[id.0].label
    }

    pub fn push_instr(&mut self, block: BlockId, instr: Instr) {
        self.blocks[block.0].instrs.push(instr);
    }

    /// Records a source error and lets lowering continue, so one run can
    /// surface several independent mistakes.
    pub fn record_error(&mut self, error: SemanticError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[SemanticError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
