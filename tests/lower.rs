use minicc::ast::*;
use minicc::error::{ProgramError, SemanticError};
use minicc::ir::{BlockId, Cfg, Instr, ScopeId};
use minicc::lower_program;

fn sp() -> Span {
    Span::new(0, 0)
}

fn ident(name: &str) -> Ident {
    Spanned::new(name.to_string(), sp())
}

fn lit(value: i64) -> Expr {
    Expr::Literal(LiteralExpr { value, span: sp() })
}

fn var(name: &str) -> Expr {
    Expr::Var(ident(name))
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(BinaryExpr {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span: sp(),
    })
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(CallExpr {
        callee: ident(name),
        args,
        span: sp(),
    })
}

fn declare(names: &[&str]) -> Stmt {
    Stmt::Declare(DeclareStmt {
        names: names.iter().map(|name| ident(name)).collect(),
        span: sp(),
    })
}

fn let_stmt(name: &str, expr: Expr) -> Stmt {
    Stmt::Let(LetStmt {
        name: ident(name),
        expr,
        span: sp(),
    })
}

fn assign(name: &str, expr: Expr) -> Stmt {
    Stmt::Assign(AssignStmt {
        name: ident(name),
        expr,
        span: sp(),
    })
}

fn ret(expr: Expr) -> Stmt {
    Stmt::Return(ReturnStmt { expr, span: sp() })
}

fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(ExprStmt { expr, span: sp() })
}

fn block(stmts: Vec<Stmt>) -> Block {
    Block { stmts, span: sp() }
}

fn function(name: &str, params: &[&str], stmts: Vec<Stmt>) -> Function {
    Function {
        name: ident(name),
        params: params.iter().map(|param| ident(param)).collect(),
        body: block(stmts),
        span: sp(),
    }
}

fn program(functions: Vec<Function>) -> Program {
    Program {
        functions,
        span: sp(),
    }
}

fn block_id_by_label(cfg: &Cfg, label: &str) -> BlockId {
    let index = cfg
        .blocks()
        .iter()
        .position(|block| block.label == label)
        .unwrap_or_else(|| panic!("no block labeled `{label}`"));
    BlockId(index)
}

#[test]
fn sum_function_lowers_clean() {
    let program = program(vec![function(
        "f",
        &["a", "b"],
        vec![
            let_stmt("x", binary(BinaryOp::Add, var("a"), var("b"))),
            ret(var("x")),
        ],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    assert_eq!(cfgs.len(), 1);
    let cfg = &cfgs[0];
    assert!(!cfg.has_errors(), "errors: {:?}", cfg.errors());
    assert_eq!(cfg.blocks()[0].label, "prologue");
    assert_eq!(cfg.blocks()[1].label, "f");
    assert_eq!(cfg.blocks()[2].label, "epilogue");
    assert!(matches!(
        cfg.blocks()[1].instrs.first(),
        Some(Instr::BindParams { params }) if params.len() == 2
    ));
}

#[test]
fn redeclaration_in_same_scope_is_flagged() {
    let program = program(vec![function(
        "main",
        &[],
        vec![declare(&["x"]), declare(&["x"]), ret(lit(0))],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    let errors = cfgs[0].errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], SemanticError::Redeclared { .. }));
}

#[test]
fn shadowing_in_nested_scope_is_legal() {
    let program = program(vec![function(
        "main",
        &[],
        vec![
            let_stmt("x", lit(1)),
            Stmt::Block(block(vec![let_stmt("x", lit(2))])),
            ret(var("x")),
        ],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    let cfg = &cfgs[0];
    assert!(!cfg.has_errors(), "errors: {:?}", cfg.errors());
    let outer = cfg.symbols.offset_of(ScopeId(1), "x").expect("outer x");
    let inner = cfg.symbols.offset_of(ScopeId(2), "x").expect("inner x");
    assert_ne!(outer, inner);
}

#[test]
fn undeclared_read_is_flagged() {
    let program = program(vec![function("main", &[], vec![ret(var("x"))])]);
    let cfgs = lower_program(&program).expect("lower program");
    let errors = cfgs[0].errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], SemanticError::Undeclared { .. }));
}

#[test]
fn assignment_to_undeclared_is_flagged() {
    let program = program(vec![function(
        "main",
        &[],
        vec![assign("x", lit(1)), ret(lit(0))],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    assert!(matches!(
        cfgs[0].errors()[0],
        SemanticError::Undeclared { .. }
    ));
}

#[test]
fn uninitialized_read_is_flagged_until_assigned() {
    let prog = program(vec![function(
        "main",
        &[],
        vec![declare(&["x", "y"]), assign("y", var("x")), ret(var("y"))],
    )]);
    let cfgs = lower_program(&prog).expect("lower program");
    let errors = cfgs[0].errors();
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    assert!(matches!(errors[0], SemanticError::Uninitialized { .. }));

    let program = program(vec![function(
        "main",
        &[],
        vec![
            declare(&["x"]),
            assign("x", lit(1)),
            let_stmt("y", var("x")),
            ret(var("y")),
        ],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    assert!(!cfgs[0].has_errors(), "errors: {:?}", cfgs[0].errors());
}

#[test]
fn arity_mismatch_is_flagged_in_both_directions() {
    let program = program(vec![
        function("f", &["a", "b"], vec![ret(var("a"))]),
        function(
            "main",
            &[],
            vec![
                expr_stmt(call("f", vec![lit(1)])),
                expr_stmt(call("f", vec![lit(1), lit(2), lit(3)])),
                expr_stmt(call("f", vec![lit(1), lit(2)])),
                ret(lit(0)),
            ],
        ),
    ]);
    let cfgs = lower_program(&program).expect("lower program");
    assert!(!cfgs[0].has_errors());
    let errors = cfgs[1].errors();
    assert_eq!(errors.len(), 2, "errors: {errors:?}");
    assert!(errors
        .iter()
        .all(|error| matches!(error, SemanticError::ArityMismatch { .. })));
}

#[test]
fn zero_param_function_called_with_args_is_flagged() {
    let program = program(vec![
        function("g", &[], vec![ret(lit(1))]),
        function("main", &[], vec![ret(call("g", vec![lit(1)]))]),
    ]);
    let cfgs = lower_program(&program).expect("lower program");
    assert!(matches!(
        cfgs[1].errors()[0],
        SemanticError::ArityMismatch { .. }
    ));
}

#[test]
fn unknown_callee_is_not_arity_checked() {
    let program = program(vec![function(
        "main",
        &[],
        vec![ret(call("putchar", vec![lit(65)]))],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    assert!(!cfgs[0].has_errors(), "errors: {:?}", cfgs[0].errors());
}

#[test]
fn duplicate_function_definition_aborts() {
    let program = program(vec![
        function("f", &[], vec![ret(lit(1))]),
        function("f", &[], vec![ret(lit(2))]),
    ]);
    let err = lower_program(&program).expect_err("expected program error");
    assert!(matches!(err, ProgramError::DuplicateFunction { .. }));
}

#[test]
fn seven_parameters_abort() {
    let program = program(vec![function(
        "f",
        &["a", "b", "c", "d", "e", "g", "h"],
        vec![ret(var("a"))],
    )]);
    let err = lower_program(&program).expect_err("expected program error");
    assert!(matches!(err, ProgramError::TooManyParams { .. }));
}

#[test]
fn seven_arguments_abort() {
    let args = (0..7).map(lit).collect();
    let program = program(vec![function(
        "main",
        &[],
        vec![ret(call("external", args))],
    )]);
    let err = lower_program(&program).expect_err("expected program error");
    assert!(matches!(err, ProgramError::TooManyArgs { .. }));
}

#[test]
fn expression_results_land_in_temporaries() {
    let program = program(vec![function(
        "main",
        &[],
        vec![let_stmt("a", binary(BinaryOp::Add, lit(1), lit(2))), ret(var("a"))],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    let entry = &cfgs[0].blocks()[1];
    let dst = entry
        .instrs
        .iter()
        .find_map(|instr| match instr {
            Instr::Binary { dst, .. } => Some(dst.clone()),
            _ => None,
        })
        .expect("binary instruction");
    assert!(dst.name.starts_with('!'), "not a temporary: {}", dst.name);
}

#[test]
fn inequality_synthesizes_three_instructions() {
    let program = program(vec![function(
        "main",
        &[],
        vec![
            let_stmt("x", lit(1)),
            let_stmt("y", lit(2)),
            ret(binary(BinaryOp::Neq, var("x"), var("y"))),
        ],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    let entry = &cfgs[0].blocks()[1];
    let compares = entry
        .instrs
        .iter()
        .filter(|instr| matches!(instr, Instr::Compare { .. }))
        .count();
    assert_eq!(compares, 2);
    assert!(entry
        .instrs
        .iter()
        .any(|instr| matches!(instr, Instr::LoadConst { value: 0, .. })));
}

#[test]
fn if_without_else_branches_to_join() {
    let program = program(vec![function(
        "main",
        &[],
        vec![
            let_stmt("x", lit(1)),
            Stmt::If(IfStmt {
                cond: binary(BinaryOp::Eq, var("x"), lit(2)),
                then_block: block(vec![assign("x", lit(3))]),
                else_block: None,
                span: sp(),
            }),
            ret(var("x")),
        ],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    let cfg = &cfgs[0];
    assert!(!cfg.has_errors(), "errors: {:?}", cfg.errors());
    let then_id = block_id_by_label(cfg, "main_then1");
    let endif_id = block_id_by_label(cfg, "main_endif1");
    let cond_block = &cfg.blocks()[1];
    assert_eq!(cond_block.exit_true, Some(then_id));
    assert_eq!(cond_block.exit_false, Some(endif_id));
    assert!(matches!(
        cond_block.instrs.last(),
        Some(Instr::Test { .. })
    ));
    assert_eq!(cfg.block(then_id).exit_true, Some(endif_id));
}

#[test]
fn while_builds_a_back_edge() {
    let program = program(vec![function(
        "main",
        &[],
        vec![
            let_stmt("i", lit(0)),
            Stmt::While(WhileStmt {
                cond: binary(BinaryOp::Lt, var("i"), lit(3)),
                body: block(vec![assign("i", binary(BinaryOp::Add, var("i"), lit(1)))]),
                span: sp(),
            }),
            ret(var("i")),
        ],
    )]);
    let cfgs = lower_program(&program).expect("lower program");
    let cfg = &cfgs[0];
    assert!(!cfg.has_errors(), "errors: {:?}", cfg.errors());
    let while_id = block_id_by_label(cfg, "main_while1");
    let endwhile_id = block_id_by_label(cfg, "main_endwhile1");
    let while_block = cfg.block(while_id);
    assert_eq!(while_block.exit_true, Some(while_id));
    assert_eq!(while_block.exit_false, None);
    assert!(while_block
        .instrs
        .iter()
        .any(|instr| matches!(instr, Instr::JumpIfZero { target } if *target == endwhile_id)));
    let epilogue_id = block_id_by_label(cfg, "epilogue");
    assert_eq!(cfg.block(endwhile_id).exit_true, Some(epilogue_id));
}
