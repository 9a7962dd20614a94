//! The three-address instruction set.
//!
//! Instructions are pure data: the lowering pass appends them to basic
//! blocks and the code generator pattern-matches them into assembly. Every
//! identifier operand is an [`Operand`] pairing the name with the scope it
//! was resolved against when the instruction was built, so emission never
//! has to reconstruct scope information.

use super::symbols::ScopeId;
use super::BlockId;

/// An identifier plus the scope it resolves in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub name: String,
    pub scope: ScopeId,
}

impl Operand {
    pub fn new(name: impl Into<String>, scope: ScopeId) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Comparison primitives. `<` and `>` share `Lt` with operands swapped at
/// the construction site; `!=` is synthesized from `Eq` against a zero
/// constant and so never appears as its own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Load `src` into the return register.
    Ret { src: Operand },
    /// Store an integer constant into `dst`.
    LoadConst { dst: Operand, value: i64 },
    /// `dst := src`.
    Copy { dst: Operand, src: Operand },
    /// `dst := lhs op rhs`.
    Binary {
        op: BinOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    /// `dst := lhs op rhs`, result encoded as 0/1.
    Compare {
        op: CmpOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    /// `dst := (src == 0)`, encoded as 0/1.
    Not { dst: Operand, src: Operand },
    /// `dst := -src`.
    Neg { dst: Operand, src: Operand },
    /// `dst := callee(args..)`; at most six arguments.
    Call {
        dst: Operand,
        callee: String,
        args: Vec<Operand>,
    },
    /// Store the incoming argument registers into the parameter slots.
    BindParams { params: Vec<Operand> },
    /// Compare `src` against zero; the owning block's branch resolution
    /// consumes the flags.
    Test { src: Operand },
    Jump { target: BlockId },
    JumpIfZero { target: BlockId },
    JumpIfNotZero { target: BlockId },
}

impl Instr {
    /// Branch resolution consults this flag on a block's last instruction to
    /// decide between a conditional pair of jumps and a single `jmp`.
    pub fn is_comparison(&self) -> bool {
        matches!(self, Instr::Test { .. })
    }
}
