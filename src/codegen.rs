//! Code generation: lower CFGs into AT&T x86-64 assembly text.
//!
//! A single pass walks each CFG's blocks in insertion order. Every value
//! lives in a stack slot addressed relative to `%rbp`; `%eax` is the only
//! scratch register, and the System V argument registers carry call
//! arguments. Block bodies emit instruction by instruction, then each
//! block's successor edges are resolved into jumps exactly once.

use miette::Diagnostic;
use thiserror::Error;

use crate::error::SemanticError;
use crate::ir::{
    BasicBlock, BinOp, Cfg, CmpOp, Instr, Operand, EPILOGUE_LABEL, PROLOGUE_LABEL,
};

/// System V AMD64 argument registers (32-bit halves), in position order.
const ARG_REGISTERS: [&str; 6] = ["%edi", "%esi", "%edx", "%ecx", "%r8d", "%r9d"];

/// Scratch stack bytes reserved around a call, per argument.
const CALL_SCRATCH_BYTES: usize = 96;

/// The fail-fast gate's batch report: every error recorded on every CFG,
/// surfaced together. No assembly is produced for the program.
#[derive(Debug, Error, Diagnostic)]
#[error("semantic errors prevented code generation")]
pub struct RejectedProgram {
    #[related]
    pub errors: Vec<SemanticError>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum CodegenError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rejected(#[from] RejectedProgram),
    /// An operand that no declaration reaches. Lowering validates every use
    /// site, so hitting this means the CFG was built by hand and built
    /// wrong.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    /// A non-epilogue block without a successor; every such block must have
    /// `exit_true` set by construction.
    #[error("basic block `{0}` has no successor")]
    MissingExit(String),
}

/// Generate assembly for a whole program, one function after another.
///
/// If any CFG carries recorded errors the entire program is rejected and
/// every message is reported in one batch; the caller maps the `Err` onto a
/// non-zero process outcome.
pub fn generate_program(cfgs: &[Cfg]) -> Result<String, CodegenError> {
    let recorded: Vec<SemanticError> = cfgs
        .iter()
        .flat_map(|cfg| cfg.errors().iter().cloned())
        .collect();
    if !recorded.is_empty() {
        return Err(RejectedProgram { errors: recorded }.into());
    }

    let mut asm = String::new();
    for cfg in cfgs {
        generate_cfg(cfg, &mut asm)?;
    }
    Ok(asm)
}

fn generate_cfg(cfg: &Cfg, asm: &mut String) -> Result<(), CodegenError> {
    for (index, block) in cfg.blocks().iter().enumerate() {
        if block.label == PROLOGUE_LABEL || block.label == EPILOGUE_LABEL {
            continue;
        }
        asm.push_str(&format!("\n.globl {}\n{}:\n", block.label, block.label));
        if index == 1 {
            // Body entry: the frame goes up right under the function label.
            emit_prologue(asm);
        }
        emit_block(cfg, block, asm)?;
    }
    Ok(())
}

fn emit_prologue(asm: &mut String) {
    asm.push_str("    pushq %rbp\n");
    asm.push_str("    movq %rsp, %rbp\n");
}

fn emit_epilogue(asm: &mut String) {
    asm.push_str("    popq %rbp\n");
    asm.push_str("    ret\n");
}

/// Emit a block's instructions, then resolve its edges: an epilogue
/// successor becomes the function epilogue, a two-way branch after a
/// comparison becomes `je` + `jmp`, anything else a single `jmp`.
fn emit_block(cfg: &Cfg, block: &BasicBlock, asm: &mut String) -> Result<(), CodegenError> {
    for instr in &block.instrs {
        emit_instr(cfg, instr, asm)?;
    }
    let ended_in_comparison = block.instrs.last().is_some_and(Instr::is_comparison);

    let Some(exit_true) = block.exit_true else {
        return Err(CodegenError::MissingExit(block.label.clone()));
    };
    if cfg.label_of(exit_true) == EPILOGUE_LABEL {
        emit_epilogue(asm);
        return Ok(());
    }
    match block.exit_false {
        Some(exit_false) if ended_in_comparison => {
            asm.push_str(&format!("    je {}\n", cfg.label_of(exit_false)));
            asm.push_str(&format!("    jmp {}\n", cfg.label_of(exit_true)));
        }
        _ => {
            asm.push_str(&format!("    jmp {}\n", cfg.label_of(exit_true)));
        }
    }
    Ok(())
}

/// Stack slot of an operand, via the scope it was resolved against.
fn slot(cfg: &Cfg, operand: &Operand) -> Result<i32, CodegenError> {
    cfg.symbols
        .offset_of(operand.scope, &operand.name)
        .ok_or_else(|| CodegenError::UnknownVariable(operand.name.clone()))
}

fn emit_instr(cfg: &Cfg, instr: &Instr, asm: &mut String) -> Result<(), CodegenError> {
    match instr {
        Instr::Ret { src } => {
            let src = slot(cfg, src)?;
            asm.push_str(&format!("    movl -{src}(%rbp), %eax\n"));
        }
        Instr::LoadConst { dst, value } => {
            let dst = slot(cfg, dst)?;
            asm.push_str(&format!("    movl ${value}, -{dst}(%rbp)\n"));
        }
        Instr::Copy { dst, src } => {
            let dst = slot(cfg, dst)?;
            let src = slot(cfg, src)?;
            asm.push_str(&format!("    movl -{src}(%rbp), %eax\n"));
            asm.push_str(&format!("    movl %eax, -{dst}(%rbp)\n"));
        }
        Instr::Binary { op, dst, lhs, rhs } => {
            let dst = slot(cfg, dst)?;
            let lhs = slot(cfg, lhs)?;
            let rhs = slot(cfg, rhs)?;
            asm.push_str(&format!("    movl -{lhs}(%rbp), %eax\n"));
            match op {
                BinOp::Add => asm.push_str(&format!("    addl -{rhs}(%rbp), %eax\n")),
                BinOp::Sub => asm.push_str(&format!("    subl -{rhs}(%rbp), %eax\n")),
                BinOp::Mul => asm.push_str(&format!("    imull -{rhs}(%rbp), %eax\n")),
                BinOp::Div => {
                    asm.push_str("    cltd\n");
                    asm.push_str(&format!("    idivl -{rhs}(%rbp)\n"));
                }
            }
            asm.push_str(&format!("    movl %eax, -{dst}(%rbp)\n"));
        }
        Instr::Compare { op, dst, lhs, rhs } => {
            emit_compare(cfg, *op, dst, lhs, rhs, asm)?;
        }
        Instr::Not { dst, src } => {
            let dst = slot(cfg, dst)?;
            let src = slot(cfg, src)?;
            asm.push_str(&format!("    movl -{src}(%rbp), %eax\n"));
            asm.push_str("    cmpl $0, %eax\n");
            asm.push_str("    sete %al\n");
            asm.push_str("    movzbl %al, %eax\n");
            asm.push_str(&format!("    movl %eax, -{dst}(%rbp)\n"));
        }
        Instr::Neg { dst, src } => {
            let dst = slot(cfg, dst)?;
            let src = slot(cfg, src)?;
            asm.push_str(&format!("    movl -{src}(%rbp), %eax\n"));
            asm.push_str("    neg %eax\n");
            asm.push_str(&format!("    movl %eax, -{dst}(%rbp)\n"));
        }
        Instr::Call { dst, callee, args } => {
            emit_call(cfg, dst, callee, args, asm)?;
        }
        Instr::BindParams { params } => {
            // Mirror of the call sequence: spill the argument registers into
            // the parameter slots, highest register first so no read is
            // clobbered by an earlier store.
            for (position, param) in params.iter().enumerate().rev() {
                let offset = slot(cfg, param)?;
                asm.push_str(&format!(
                    "    movl {}, -{offset}(%rbp)\n",
                    ARG_REGISTERS[position]
                ));
            }
        }
        Instr::Test { src } => {
            let src = slot(cfg, src)?;
            asm.push_str(&format!("    cmpl $0, -{src}(%rbp)\n"));
        }
        Instr::Jump { target } => {
            asm.push_str(&format!("    jmp {}\n", cfg.label_of(*target)));
        }
        Instr::JumpIfZero { target } => {
            asm.push_str(&format!("    je {}\n", cfg.label_of(*target)));
        }
        Instr::JumpIfNotZero { target } => {
            asm.push_str(&format!("    jne {}\n", cfg.label_of(*target)));
        }
    }
    Ok(())
}

fn emit_compare(
    cfg: &Cfg,
    op: CmpOp,
    dst: &Operand,
    lhs: &Operand,
    rhs: &Operand,
    asm: &mut String,
) -> Result<(), CodegenError> {
    let dst = slot(cfg, dst)?;
    let lhs = slot(cfg, lhs)?;
    let rhs = slot(cfg, rhs)?;
    match op {
        CmpOp::Eq => {
            asm.push_str(&format!("    movl -{lhs}(%rbp), %eax\n"));
            asm.push_str(&format!("    cmpl -{rhs}(%rbp), %eax\n"));
            asm.push_str("    sete %al\n");
        }
        CmpOp::Lt => {
            // lhs < rhs computed as !(rhs <= lhs): set the inverted
            // predicate, then compare the 0/1 result against zero.
            asm.push_str(&format!("    movl -{lhs}(%rbp), %eax\n"));
            asm.push_str(&format!("    cmpl %eax, -{rhs}(%rbp)\n"));
            asm.push_str("    setle %al\n");
            asm.push_str("    movzbl %al, %eax\n");
            asm.push_str("    cmpl $0, %eax\n");
            asm.push_str("    sete %al\n");
        }
        CmpOp::Le => {
            asm.push_str(&format!("    movl -{lhs}(%rbp), %eax\n"));
            asm.push_str(&format!("    cmpl -{rhs}(%rbp), %eax\n"));
            asm.push_str("    setle %al\n");
        }
    }
    asm.push_str("    movzbl %al, %eax\n");
    asm.push_str(&format!("    movl %eax, -{dst}(%rbp)\n"));
    Ok(())
}

fn emit_call(
    cfg: &Cfg,
    dst: &Operand,
    callee: &str,
    args: &[Operand],
    asm: &mut String,
) -> Result<(), CodegenError> {
    let dst = slot(cfg, dst)?;
    let scratch = args.len() * CALL_SCRATCH_BYTES;
    asm.push_str(&format!("    subq ${scratch}, %rsp\n"));
    // Highest-position argument first, mirroring BindParams.
    for (position, arg) in args.iter().enumerate().rev() {
        let offset = slot(cfg, arg)?;
        asm.push_str(&format!(
            "    movl -{offset}(%rbp), {}\n",
            ARG_REGISTERS[position]
        ));
    }
    asm.push_str(&format!("    call {callee}\n"));
    asm.push_str(&format!("    addq ${scratch}, %rsp\n"));
    asm.push_str(&format!("    movl %eax, -{dst}(%rbp)\n"));
    Ok(())
}
