//! Textual rendering of IR trees.
//!
//! One node per line, children indented by two spaces:
//!
//! ```text
//! #3 LOOP target=#8 continue=#6 line=1
//!   #4 GOTO target=#6
//! ```

use super::node::{NodeId, Payload};
use super::props::{AttrValue, Props};
use super::script::{Program, ScriptKind};
use super::tree::Tree;
use std::fmt::Write;

/// Renders the subtree rooted at `root`.
pub fn dump_tree(tree: &Tree, root: NodeId) -> String {
    let mut out = String::new();
    write_node(tree, root, 0, &mut out);
    out
}

/// Renders every body of a program, script first.
pub fn dump_program(program: &Program) -> String {
    let mut out = String::new();
    for body in program.bodies() {
        let header = match body.kind {
            ScriptKind::Script => "script".to_string(),
            ScriptKind::Function(t) => format!("function {} ({})", display_name(&body.name), t.label()),
        };
        let _ = write!(out, "{} {}", body.id, header);
        if body.requires_activation {
            out.push_str(" [activation]");
        }
        if body.check_this {
            out.push_str(" [check-this]");
        }
        if body.has_finally {
            out.push_str(" [finally]");
        }
        out.push('\n');
        if !body.vars.is_empty() {
            let _ = writeln!(out, "  vars: {}", body.vars.names().join(", "));
        }
        for child in program.tree.children(body.root) {
            write_node(&program.tree, child, 1, &mut out);
        }
    }
    out
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<anonymous>" } else { name }
}

fn write_node(tree: &Tree, id: NodeId, depth: usize, out: &mut String) {
    let node = tree.node(id);
    let _ = write!(out, "{:indent$}{} {}", "", id, node.kind(), indent = depth * 2);
    match node.payload() {
        Payload::None => {}
        Payload::Number(n) => {
            let _ = write!(out, " {}", n);
        }
        Payload::String(s) => {
            let _ = write!(out, " {:?}", s);
        }
        Payload::Int(i) => {
            let _ = write!(out, " {}", i);
        }
    }
    match node.props() {
        Props::None => {}
        Props::Jump(jump) => {
            if let Some(label) = &jump.label {
                let _ = write!(out, " label={}", label);
            }
            if let Some(t) = jump.target {
                let _ = write!(out, " target={}", t);
            }
            if let Some(t) = jump.continue_target {
                let _ = write!(out, " continue={}", t);
            }
            if let Some(t) = jump.finally_target {
                let _ = write!(out, " finally={}", t);
            }
        }
        Props::Switch(switch) => {
            if let Some(t) = switch.target {
                let _ = write!(out, " target={}", t);
            }
            if !switch.cases.is_empty() {
                let cases: Vec<String> = switch.cases.iter().map(ToString::to_string).collect();
                let _ = write!(out, " cases=[{}]", cases.join(","));
            }
            if let Some(d) = switch.default {
                let _ = write!(out, " default={}", d);
            }
        }
        Props::Function(f) => {
            let _ = write!(out, " {}", f);
        }
    }
    for (key, value) in node.attrs().iter() {
        match value {
            AttrValue::Int(i) => {
                let _ = write!(out, " {:?}={}", key, i);
            }
            AttrValue::Node(n) => {
                let _ = write!(out, " {:?}={}", key, n);
            }
        }
    }
    if let Some(line) = node.line() {
        let _ = write!(out, " line={}", line);
    }
    out.push('\n');
    for child in tree.children(id) {
        write_node(tree, child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrFactory, Token};

    #[test]
    fn test_dump_indents_children() {
        let mut tree = Tree::new();
        let a = tree.new_string(Token::Name, "a");
        let pop = tree.new_node1(Token::Pop, a);
        let text = dump_tree(&tree, pop);
        assert_eq!(text, "#1 POP\n  #0 NAME \"a\"\n");
    }

    #[test]
    fn test_dump_shows_targets() {
        let mut tree = Tree::new();
        let target = tree.new_node(Token::Target);
        let goto = tree.new_node_at(Token::Goto, Some(7));
        tree.set_target(goto, target);
        assert_eq!(dump_tree(&tree, goto), "#1 GOTO target=#0 line=7\n");
    }

    #[test]
    fn test_dump_program_lists_functions() {
        let mut f = IrFactory::new(None);
        let id = f.begin_function("g", crate::ir::FunctionType::Statement, 1);
        f.add_param("x");
        let stub = f.finish_function(id, &[], 1);
        let program = f.finish_script(&[stub], 1);
        let text = dump_program(&program);
        assert!(text.starts_with("fn0 script\n"));
        assert!(text.contains("fn1 function g (statement)"));
        assert!(text.contains("vars: x"));
    }
}
