//! Lowering: abstract syntax into control-flow graphs.
//!
//! The pass runs in two steps. A collection pass maps every function name to
//! its arity so call sites can be validated even when the callee is defined
//! later in the file. The lowering pass then builds one [`Cfg`] per
//! function, threading its mutable position (current block, current scope,
//! scope counter) through an explicit [`FnBuilder`] rather than ambient
//! state.
//!
//! Source errors (redeclaration, undeclared or uninitialized use, wrong
//! argument count) are recorded on the owning CFG and lowering continues.
//! Structural problems -- more than six parameters or arguments, duplicate
//! function definitions -- abort the whole run with a [`ProgramError`].

use std::collections::HashMap;

use crate::ast::{
    AssignStmt, BinaryExpr, BinaryOp, Block, CallExpr, Expr, Function, Ident, IfStmt, Program,
    Stmt, UnaryOp, WhileStmt,
};
use crate::error::{ProgramError, SemanticError};
use crate::ir::{
    BinOp, BlockId, Cfg, CmpOp, Instr, Operand, ScopeId, EPILOGUE_LABEL, PROLOGUE_LABEL,
};

/// Calls pass arguments in registers only; the stack is never used.
pub const MAX_CALL_ARGS: usize = 6;

/// Maps every function to its declared arity. Runs before any body is
/// lowered so forward calls validate like backward ones.
pub fn collect_function_arities(program: &Program) -> Result<HashMap<String, usize>, ProgramError> {
    let mut table = HashMap::new();
    for func in &program.functions {
        let arity = func.params.len();
        if arity > MAX_CALL_ARGS {
            return Err(ProgramError::too_many_params(&func.name, arity));
        }
        if table.insert(func.name.item.clone(), arity).is_some() {
            return Err(ProgramError::duplicate_function(&func.name));
        }
    }
    Ok(table)
}

/// Lower a whole program to one CFG per function.
pub fn lower_program(program: &Program) -> Result<Vec<Cfg>, ProgramError> {
    let functions = collect_function_arities(program)?;
    let mut cfgs = Vec::with_capacity(program.functions.len());
    for func in &program.functions {
        cfgs.push(lower_function(func, &functions)?);
    }
    Ok(cfgs)
}

fn lower_function(
    func: &Function,
    functions: &HashMap<String, usize>,
) -> Result<Cfg, ProgramError> {
    let mut cfg = Cfg::new(func.name.item.clone());
    cfg.symbols.create_scope(ScopeId::ROOT);

    let prologue = cfg.add_block(PROLOGUE_LABEL, ScopeId::ROOT);
    let entry = cfg.add_block(func.name.item.clone(), ScopeId::ROOT);
    let epilogue = cfg.add_block(EPILOGUE_LABEL, ScopeId::ROOT);
    cfg.block_mut(prologue).exit_true = Some(entry);
    cfg.block_mut(entry).exit_true = Some(epilogue);

    let mut builder = FnBuilder {
        cfg,
        functions,
        current_block: entry,
        current_scope: ScopeId::ROOT,
        scope_count: 1,
    };

    if !func.params.is_empty() {
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            builder
                .cfg
                .symbols
                .declare(ScopeId::ROOT, &param.item, true, false);
            params.push(Operand::new(param.item.clone(), ScopeId::ROOT));
        }
        builder.push(Instr::BindParams { params });
    }

    // The function body's braces do not open a nested scope; only interior
    // blocks do.
    builder.lower_stmts(&func.body)?;
    Ok(builder.cfg)
}

/// Mutable lowering position for one function.
struct FnBuilder<'a> {
    cfg: Cfg,
    functions: &'a HashMap<String, usize>,
    current_block: BlockId,
    current_scope: ScopeId,
    /// Scope levels minted so far; also seeds control-structure labels.
    scope_count: u32,
}

impl FnBuilder<'_> {
    fn push(&mut self, instr: Instr) {
        self.cfg.push_instr(self.current_block, instr);
    }

    fn new_temp(&mut self) -> Operand {
        let name = self.cfg.symbols.new_temporary(self.current_scope, "tmp");
        Operand::new(name, self.current_scope)
    }

    fn lower_stmts(&mut self, block: &Block) -> Result<(), ProgramError> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), ProgramError> {
        match stmt {
            Stmt::Declare(decl) => {
                for name in &decl.names {
                    self.declare_local(name, false);
                }
                Ok(())
            }
            Stmt::Let(stmt) => {
                self.declare_local(&stmt.name, true);
                let dst = Operand::new(stmt.name.item.clone(), self.current_scope);
                let src = self.lower_expr(&stmt.expr)?;
                self.push(Instr::Copy { dst, src });
                Ok(())
            }
            Stmt::Assign(stmt) => self.lower_assign(stmt),
            Stmt::Return(stmt) => {
                let src = self.lower_expr(&stmt.expr)?;
                self.push(Instr::Ret { src });
                Ok(())
            }
            Stmt::If(stmt) => self.lower_if(stmt),
            Stmt::While(stmt) => self.lower_while(stmt),
            Stmt::Block(inner) => self.lower_nested_block(inner),
            Stmt::Expr(stmt) => {
                self.lower_expr(&stmt.expr)?;
                Ok(())
            }
        }
    }

    /// Declares `name` in the current scope, recording a redeclaration error
    /// when the exact scope already has it. Shadowing an outer scope is
    /// legal and allocates a fresh slot.
    fn declare_local(&mut self, name: &Ident, initialized: bool) {
        if self.cfg.symbols.exists_in_scope(self.current_scope, &name.item) {
            self.cfg.record_error(SemanticError::redeclared(name));
        } else {
            self.cfg
                .symbols
                .declare(self.current_scope, &name.item, initialized, false);
        }
    }

    /// The target is resolved (and flagged initialized) before the value is
    /// lowered, so `x = x + 1` on an uninitialized `x` reports nothing --
    /// the write is what initializes it.
    fn lower_assign(&mut self, stmt: &AssignStmt) -> Result<(), ProgramError> {
        let name = &stmt.name;
        let scope = if self.cfg.symbols.exists_in_scope(self.current_scope, &name.item) {
            self.cfg.symbols.mark_initialized(self.current_scope, &name.item);
            self.current_scope
        } else if let Some(found) = self.cfg.symbols.resolve_scope(self.current_scope, &name.item)
        {
            self.cfg.symbols.mark_initialized(found, &name.item);
            found
        } else {
            self.cfg.record_error(SemanticError::undeclared(name));
            self.current_scope
        };
        let dst = Operand::new(name.item.clone(), scope);
        let src = self.lower_expr(&stmt.expr)?;
        self.push(Instr::Copy { dst, src });
        Ok(())
    }

    fn lower_nested_block(&mut self, block: &Block) -> Result<(), ProgramError> {
        let enclosing = self.current_scope;
        self.scope_count += 1;
        let scope = ScopeId(self.scope_count);
        self.cfg.symbols.create_scope(scope);
        self.cfg.symbols.set_parent(scope, enclosing);
        self.current_scope = scope;
        self.lower_stmts(block)?;
        self.current_scope = enclosing;
        Ok(())
    }

    fn lower_if(&mut self, stmt: &IfStmt) -> Result<(), ProgramError> {
        let cond = self.lower_expr(&stmt.cond)?;
        self.push(Instr::Test { src: cond });

        let seed = self.scope_count;
        let cond_block = self.current_block;
        let then_id = self
            .cfg
            .add_block(format!("{}_then{seed}", self.cfg.name), self.current_scope);
        let endif_id = self
            .cfg
            .add_block(format!("{}_endif{seed}", self.cfg.name), self.current_scope);

        // The join block inherits the condition block's exits, then the
        // condition block is rewired onto the two arms.
        let (exit_true, exit_false) = {
            let cond_block = self.cfg.block(cond_block);
            (cond_block.exit_true, cond_block.exit_false)
        };
        {
            let endif = self.cfg.block_mut(endif_id);
            endif.exit_true = exit_true;
            endif.exit_false = exit_false;
        }
        self.cfg.block_mut(cond_block).exit_true = Some(then_id);
        self.cfg.block_mut(then_id).exit_true = Some(endif_id);

        if let Some(else_block) = &stmt.else_block {
            let else_id = self
                .cfg
                .add_block(format!("{}_else{seed}", self.cfg.name), self.current_scope);
            self.cfg.block_mut(else_id).exit_true = Some(endif_id);
            self.cfg.block_mut(cond_block).exit_false = Some(else_id);
            self.current_block = else_id;
            self.lower_nested_block(else_block)?;
        } else {
            // No else arm: the false edge goes straight to the join so the
            // condition still decides whether the then arm runs.
            self.cfg.block_mut(cond_block).exit_false = Some(endif_id);
        }

        self.current_block = then_id;
        self.lower_nested_block(&stmt.then_block)?;
        self.current_block = endif_id;
        Ok(())
    }

    fn lower_while(&mut self, stmt: &WhileStmt) -> Result<(), ProgramError> {
        let seed = self.scope_count;
        let entry_block = self.current_block;
        let while_id = self
            .cfg
            .add_block(format!("{}_while{seed}", self.cfg.name), self.current_scope);
        let endwhile_id = self.cfg.add_block(
            format!("{}_endwhile{seed}", self.cfg.name),
            self.current_scope,
        );

        let (exit_true, exit_false) = {
            let entry = self.cfg.block(entry_block);
            (entry.exit_true, entry.exit_false)
        };
        {
            let endwhile = self.cfg.block_mut(endwhile_id);
            endwhile.exit_true = exit_true;
            endwhile.exit_false = exit_false;
        }
        self.cfg.block_mut(entry_block).exit_true = Some(while_id);
        self.cfg.block_mut(entry_block).exit_false = None;
        // Back-edge: the loop block unconditionally re-enters itself; the
        // explicit JumpIfZero below is the only way out.
        self.cfg.block_mut(while_id).exit_true = Some(while_id);

        self.current_block = while_id;
        let cond = self.lower_expr(&stmt.cond)?;
        self.push(Instr::Test { src: cond });
        self.push(Instr::JumpIfZero {
            target: endwhile_id,
        });
        self.lower_nested_block(&stmt.body)?;
        self.current_block = endwhile_id;
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Operand, ProgramError> {
        match expr {
            Expr::Literal(lit) => {
                let dst = self.new_temp();
                self.push(Instr::LoadConst {
                    dst: dst.clone(),
                    value: lit.value,
                });
                Ok(dst)
            }
            Expr::Var(name) => Ok(self.lower_var(name)),
            Expr::Unary(unary) => {
                let src = self.lower_expr(&unary.expr)?;
                let dst = self.new_temp();
                let instr = match unary.op {
                    UnaryOp::Neg => Instr::Neg {
                        dst: dst.clone(),
                        src,
                    },
                    UnaryOp::Not => Instr::Not {
                        dst: dst.clone(),
                        src,
                    },
                };
                self.push(instr);
                Ok(dst)
            }
            Expr::Binary(binary) => self.lower_binary(binary),
            Expr::Call(call) => self.lower_call(call),
        }
    }

    /// Every variable use is validated here, at the use site: an undeclared
    /// or uninitialized read records an error but still yields an operand so
    /// lowering can continue past it.
    fn lower_var(&mut self, name: &Ident) -> Operand {
        let scope = if self.cfg.symbols.exists_in_scope(self.current_scope, &name.item) {
            Some(self.current_scope)
        } else {
            self.cfg.symbols.resolve_scope(self.current_scope, &name.item)
        };
        let Some(scope) = scope else {
            self.cfg.record_error(SemanticError::undeclared(name));
            return Operand::new(name.item.clone(), self.current_scope);
        };
        if !self.cfg.symbols.is_initialized(scope, &name.item) {
            self.cfg.record_error(SemanticError::uninitialized(name));
        }
        Operand::new(name.item.clone(), scope)
    }

    fn lower_binary(&mut self, binary: &BinaryExpr) -> Result<Operand, ProgramError> {
        let lhs = self.lower_expr(&binary.lhs)?;
        let rhs = self.lower_expr(&binary.rhs)?;
        let op = match binary.op {
            BinaryOp::Add => BinOp::Add,
            BinaryOp::Sub => BinOp::Sub,
            BinaryOp::Mul => BinOp::Mul,
            BinaryOp::Div => BinOp::Div,
            BinaryOp::Eq => return Ok(self.emit_compare(CmpOp::Eq, lhs, rhs)),
            BinaryOp::Neq => {
                // a != b costs three instructions: compare for equality,
                // materialize a zero, compare the result against it.
                let eq = self.emit_compare(CmpOp::Eq, lhs, rhs);
                let zero = self.new_temp();
                self.push(Instr::LoadConst {
                    dst: zero.clone(),
                    value: 0,
                });
                return Ok(self.emit_compare(CmpOp::Eq, eq, zero));
            }
            BinaryOp::Lt => return Ok(self.emit_compare(CmpOp::Lt, lhs, rhs)),
            BinaryOp::Gt => return Ok(self.emit_compare(CmpOp::Lt, rhs, lhs)),
            BinaryOp::Lte => return Ok(self.emit_compare(CmpOp::Le, lhs, rhs)),
            BinaryOp::Gte => return Ok(self.emit_compare(CmpOp::Le, rhs, lhs)),
        };
        let dst = self.new_temp();
        self.push(Instr::Binary {
            op,
            dst: dst.clone(),
            lhs,
            rhs,
        });
        Ok(dst)
    }

    fn emit_compare(&mut self, op: CmpOp, lhs: Operand, rhs: Operand) -> Operand {
        let dst = self.new_temp();
        self.push(Instr::Compare {
            op,
            dst: dst.clone(),
            lhs,
            rhs,
        });
        dst
    }

    /// Call arity is validated against the collection pass's table. Unknown
    /// callees (e.g. `putchar` from the C library) are let through
    /// unchecked, but no call may carry more than six arguments.
    fn lower_call(&mut self, call: &CallExpr) -> Result<Operand, ProgramError> {
        if call.args.len() > MAX_CALL_ARGS {
            return Err(ProgramError::too_many_args(
                &call.callee,
                call.args.len(),
                call.span,
            ));
        }
        let dst = self.new_temp();
        if let Some(&arity) = self.functions.get(&call.callee.item) {
            if call.args.len() != arity {
                self.cfg.record_error(SemanticError::arity_mismatch(
                    &call.callee,
                    arity,
                    call.args.len(),
                    call.span,
                ));
            }
        }
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.lower_expr(arg)?);
        }
        self.push(Instr::Call {
            dst: dst.clone(),
            callee: call.callee.item.clone(),
            args,
        });
        Ok(dst)
    }
}
