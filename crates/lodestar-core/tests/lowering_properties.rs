//! End-to-end properties of tree construction, lowering and compilation.

use lodestar_core::compiler::{ListingCodegen, assemble, compile, lower};
use lodestar_core::ir::{AttrKey, FunctionType, IrFactory, NodeId, Token, Tree};
use lodestar_core::{EngineConfig, Error};

fn find(tree: &Tree, root: NodeId, kind: Token) -> Option<NodeId> {
    for child in tree.children(root) {
        if tree.kind(child) == kind {
            return Some(child);
        }
        if let Some(found) = find(tree, child, kind) {
            return Some(found);
        }
    }
    None
}

#[test]
fn clone_has_no_children_or_sibling() {
    let mut f = IrFactory::new(None);
    let a = f.name("a");
    let b = f.name("b");
    let sum = f.binary(Token::Add, a, b);
    let stmt = f.expr_statement(sum, 1);
    let c = f.name("c");
    let other = f.expr_statement(c, 2);
    let block = f.block(&[stmt, other], 1);
    assert!(f.tree().next(stmt).is_some());

    for original in [block, stmt, sum] {
        let copy = f.tree_mut().clone_node(original);
        let tree = f.tree();
        assert_eq!(tree.kind(copy), tree.kind(original));
        assert!(!tree.has_children(copy));
        assert!(tree.next(copy).is_none());
    }
}

#[test]
fn labelled_continue_targets_loop_continue_point() {
    let mut f = IrFactory::new(Some("loops.js".to_string()));
    let id = f.begin_function("scan", FunctionType::Statement, 1);
    f.add_param("n");
    let cont = f.continue_(Some("outer"), 3);
    let brk = f.break_(Some("outer"), 4);
    let body = f.block(&[cont, brk], 2);
    let init = f.var(2);
    let zero = f.number(0.0);
    f.add_var(init, "i", Some(zero));
    let i = f.name("i");
    let n = f.name("n");
    let cond = f.binary(Token::Lt, i, n);
    let i2 = f.name("i");
    let incr = f.unary(Token::Inc, i2);
    let lp = f.for_(Some(init), Some(cond), Some(incr), body, 2);
    let label = f.label("outer", 2);
    let stub = f.finish_function(id, &[label, lp], 5);
    let mut program = f.finish_script(&[stub], 5);

    let diagnostics = lower(&mut program, &EngineConfig::default());
    assert!(!diagnostics.has_errors(), "{}", diagnostics);

    let tree = &program.tree;
    let jump = tree.jump(lp).unwrap();
    assert_eq!(tree.kind(cont), Token::Goto);
    assert_eq!(tree.target(cont), jump.continue_target);
    assert_ne!(tree.target(cont), tree.target(lp));
    assert_eq!(tree.kind(brk), Token::Goto);
    assert_ne!(tree.target(brk), jump.continue_target);
}

#[test]
fn with_forces_activation() {
    let mut f = IrFactory::new(None);
    let id = f.begin_function("f", FunctionType::Statement, 1);
    f.add_param("o");
    let x = f.name("x");
    let stmt = f.expr_statement(x, 2);
    let body = f.block(&[stmt], 2);
    let o = f.name("o");
    let with = f.with_(o, body, 2);
    let stub = f.finish_function(id, &[with], 3);
    let program = f.finish_script(&[stub], 3);

    let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
    let function = &unit.nested()[0];
    assert!(function.needs_activation());
    assert!(function.nested().is_empty());
    assert!(!function.arg_names().iter().any(|n| n == "arguments"));
}

#[test]
fn return_inside_try_runs_finally_before_delivering_value() {
    // function g() { try { return 1; } finally { sideEffect(); } }
    let mut f = IrFactory::new(None);
    let id = f.begin_function("g", FunctionType::Statement, 1);
    let one = f.number(1.0);
    let ret = f.return_(Some(one), 1);
    let try_block = f.block(&[ret], 1);
    let callee = f.name("sideEffect");
    let call = f.call(callee, &[]);
    let stmt = f.expr_statement(call, 1);
    let finally = f.block(&[stmt], 1);
    let pn = f.try_(try_block, Vec::new(), Some(finally), 1);
    let stub = f.finish_function(id, &[pn], 1);

    let mut program = f.finish_script(&[stub], 1);
    let diagnostics = lower(&mut program, &EngineConfig::default());
    assert!(!diagnostics.has_errors(), "{}", diagnostics);

    let tree = &program.tree;
    let store = tree.first_child(try_block).unwrap();
    let steps: Vec<Token> = tree.children(store).map(|c| tree.kind(c)).collect();
    assert_eq!(steps, vec![Token::Popv, Token::Jsr, Token::ReturnPopv]);
    let popv = tree.first_child(store).unwrap();
    assert_eq!(tree.first_child(popv), Some(one));
    let jsr = tree.next(popv).unwrap();
    let finally_target = tree.jump(pn).unwrap().finally_target;
    assert!(finally_target.is_some());
    assert_eq!(tree.target(jsr), finally_target);
    assert!(program.body(id).has_finally);

    let unit = assemble(&program, id, &EngineConfig::default(), &mut ListingCodegen, false).unwrap();
    assert_eq!(unit.max_try_depth(), 1);
    assert_eq!(unit.max_locals(), 1);
}

#[test]
fn structural_errors_prevent_compilation() {
    let mut f = IrFactory::new(Some("bad.js".to_string()));
    let brk = f.break_(None, 1);
    let cont = f.continue_(Some("nowhere"), 2);
    let program = f.finish_script(&[brk, cont], 2);

    match compile(program, &EngineConfig::default(), &mut ListingCodegen) {
        Err(Error::Compile(diagnostics)) => {
            assert_eq!(diagnostics.error_count(), 2);
            let rendered = diagnostics.to_string();
            assert!(rendered.contains("bad.js:1: error: unlabelled break must be inside loop or switch"));
            assert!(rendered.contains("bad.js:2: error: undefined label 'nowhere'"));
        }
        other => panic!("expected a compile error, got {:?}", other.map(|u| u.name().to_string())),
    }
}

#[test]
fn duplicate_formals_keep_positions() {
    let mut f = IrFactory::new(None);
    let id = f.begin_function("f", FunctionType::Statement, 1);
    f.add_param("a");
    f.add_param("a");
    let a = f.name("a");
    let stmt = f.expr_statement(a, 1);
    let stub = f.finish_function(id, &[stmt], 1);
    let mut program = f.finish_script(&[stub], 1);
    let diagnostics = lower(&mut program, &EngineConfig::default());
    assert!(!diagnostics.has_errors());

    let body = program.body(id);
    assert_eq!(body.vars.names(), &["a".to_string(), "a".to_string()]);
    assert_eq!(body.vars.param_count(), 2);
    let get = find(&program.tree, body.root, Token::GetVar).expect("local read");
    let slot = program.tree.int_attr(get, AttrKey::VarIndex, -1);
    assert_eq!(slot, 1);
}
