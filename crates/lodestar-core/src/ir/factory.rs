//! Tree construction API.
//!
//! A parser drives an [`IrFactory`] while it recognizes source: leaves and
//! expressions are built bottom-up, statements are turned into the
//! target-and-jump shapes the lowering pass expects, and function bodies are
//! opened with [`IrFactory::begin_function`] and closed with
//! [`IrFactory::finish_function`].

use super::node::{NodeId, Payload};
use super::props::{AttrKey, AttrValue};
use super::script::{FunctionId, FunctionType, Program, RegExpLiteral, ScriptKind};
use super::token::Token;
use super::tree::Tree;
use crate::{Error, Result};
use tracing::trace;

/// One `catch` clause of a try statement.
#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Name bound to the caught value
    pub name: String,
    /// Optional guard condition
    pub condition: Option<NodeId>,
    /// Clause body (a BLOCK)
    pub body: NodeId,
    /// Line of the clause
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    While,
    DoWhile,
    For,
}

fn at(line: u32) -> Option<u32> {
    (line > 0).then_some(line)
}

/// Builds a [`Program`].
#[derive(Debug)]
pub struct IrFactory {
    program: Program,
    open: Vec<FunctionId>,
}

impl IrFactory {
    /// Creates a factory for a new compilation.
    pub fn new(source_name: Option<String>) -> Self {
        Self {
            program: Program::new(source_name),
            open: vec![FunctionId::SCRIPT],
        }
    }

    /// The program under construction.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The node arena.
    pub fn tree(&self) -> &Tree {
        &self.program.tree
    }

    /// Mutable node arena, for shapes the factory does not cover.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.program.tree
    }

    /// The innermost open script or function.
    pub fn current(&self) -> FunctionId {
        self.open.last().copied().unwrap_or(FunctionId::SCRIPT)
    }

    // ========================================================================
    // Leaves and expressions
    // ========================================================================

    /// Leaf of the given kind (THIS, NULL, TRUE, FALSE, UNDEFINED, ...).
    pub fn leaf(&mut self, kind: Token) -> NodeId {
        self.program.tree.new_node(kind)
    }

    /// Identifier reference.
    pub fn name(&mut self, name: &str) -> NodeId {
        self.program.tree.new_string(Token::Name, name)
    }

    /// String literal.
    pub fn string(&mut self, value: &str) -> NodeId {
        self.program.tree.new_string(Token::String, value)
    }

    /// Number literal.
    pub fn number(&mut self, value: f64) -> NodeId {
        self.program.tree.new_number(value)
    }

    /// Regular expression literal, registered with the current body.
    pub fn regexp(&mut self, source: &str, flags: &str) -> NodeId {
        let current = self.current();
        let body = self.program.body_mut(current);
        let index = body.regexps.len() as i32;
        body.regexps.push(RegExpLiteral {
            source: source.to_string(),
            flags: flags.to_string(),
        });
        let node = self.program.tree.new_node(Token::RegExp);
        self.program.tree.set_int_attr(node, AttrKey::RegExpIndex, index);
        node
    }

    /// Unary operator node.
    pub fn unary(&mut self, kind: Token, operand: NodeId) -> NodeId {
        self.program.tree.new_node1(kind, operand)
    }

    /// Binary operator node.
    pub fn binary(&mut self, kind: Token, left: NodeId, right: NodeId) -> NodeId {
        self.program.tree.new_node2(kind, left, right)
    }

    /// `object.name`
    pub fn get_prop(&mut self, object: NodeId, name: &str) -> NodeId {
        let id = self.program.tree.new_string(Token::String, name);
        self.program.tree.new_node2(Token::GetProp, object, id)
    }

    /// `object[index]`
    pub fn get_elem(&mut self, object: NodeId, index: NodeId) -> NodeId {
        self.program.tree.new_node2(Token::GetElem, object, index)
    }

    /// Simple assignment to a name, property or element.
    pub fn assignment(&mut self, target: NodeId, value: NodeId) -> Result<NodeId> {
        let tree = &mut self.program.tree;
        match tree.kind(target) {
            Token::Name => {
                tree.set_kind(target, Token::BindName);
                Ok(tree.new_node2(Token::SetName, target, value))
            }
            kind @ (Token::GetProp | Token::GetElem) => {
                let (object, key) = detach_pair(tree, target);
                let set = if kind == Token::GetProp {
                    Token::SetProp
                } else {
                    Token::SetElem
                };
                Ok(tree.new_node3(set, object, key, value))
            }
            _ => Err(Error::SyntaxError(
                "invalid assignment left-hand side".to_string(),
            )),
        }
    }

    /// `delete target`
    pub fn delete(&mut self, target: NodeId) -> NodeId {
        let tree = &mut self.program.tree;
        match tree.kind(target) {
            Token::Name => {
                tree.set_kind(target, Token::BindName);
                let key = tree.clone_node(target);
                tree.set_kind(key, Token::String);
                tree.new_node2(Token::DelProp, target, key)
            }
            Token::GetProp | Token::GetElem => {
                let (object, key) = detach_pair(tree, target);
                tree.new_node2(Token::DelProp, object, key)
            }
            _ => tree.new_node(Token::True),
        }
    }

    /// Function call.
    pub fn call(&mut self, callee: NodeId, args: &[NodeId]) -> NodeId {
        self.invocation(Token::Call, callee, args)
    }

    /// Constructor call.
    pub fn new_expr(&mut self, callee: NodeId, args: &[NodeId]) -> NodeId {
        self.invocation(Token::New, callee, args)
    }

    fn invocation(&mut self, kind: Token, callee: NodeId, args: &[NodeId]) -> NodeId {
        let tree = &mut self.program.tree;
        let node = tree.new_node1(kind, callee);
        for &arg in args {
            tree.add_child_to_back(node, arg);
        }
        node
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Expression statement.
    pub fn expr_statement(&mut self, expr: NodeId, line: u32) -> NodeId {
        let node = self.program.tree.new_node1(Token::ExprStmt, expr);
        self.program.tree.set_line(node, at(line));
        node
    }

    /// Statement block.
    pub fn block(&mut self, statements: &[NodeId], line: u32) -> NodeId {
        let tree = &mut self.program.tree;
        let block = tree.new_node_at(Token::Block, at(line));
        for &stmt in statements {
            tree.add_child_to_back(block, stmt);
        }
        block
    }

    /// Empty `var` statement; fill it with [`IrFactory::add_var`].
    pub fn var(&mut self, line: u32) -> NodeId {
        self.program.tree.new_node_at(Token::Var, at(line))
    }

    /// Adds a declaration to a `var` statement and declares the name in the
    /// current body.
    pub fn add_var(&mut self, var: NodeId, name: &str, init: Option<NodeId>) {
        let current = self.current();
        self.program.body_mut(current).vars.add_local(name);
        let tree = &mut self.program.tree;
        let decl = tree.new_string(Token::Name, name);
        if let Some(init) = init {
            tree.add_child_to_back(decl, init);
        }
        tree.add_child_to_back(var, decl);
    }

    /// `return` with an optional value.
    pub fn return_(&mut self, value: Option<NodeId>, line: u32) -> NodeId {
        let tree = &mut self.program.tree;
        let node = tree.new_node_at(Token::Return, at(line));
        if let Some(value) = value {
            tree.add_child_to_back(node, value);
        }
        node
    }

    /// `throw value`
    pub fn throw(&mut self, value: NodeId, line: u32) -> NodeId {
        let node = self.program.tree.new_node1(Token::Throw, value);
        self.program.tree.set_line(node, at(line));
        node
    }

    /// Label; the labeled statement follows it as a sibling.
    pub fn label(&mut self, label: &str, line: u32) -> NodeId {
        let tree = &mut self.program.tree;
        let node = tree.new_node_at(Token::Label, at(line));
        let name = tree.new_string(Token::Name, label);
        tree.add_child_to_back(node, name);
        node
    }

    /// `break [label]`
    pub fn break_(&mut self, label: Option<&str>, line: u32) -> NodeId {
        self.jump_statement(Token::Break, label, line)
    }

    /// `continue [label]`
    pub fn continue_(&mut self, label: Option<&str>, line: u32) -> NodeId {
        self.jump_statement(Token::Continue, label, line)
    }

    fn jump_statement(&mut self, kind: Token, label: Option<&str>, line: u32) -> NodeId {
        let tree = &mut self.program.tree;
        let node = tree.new_node_at(kind, at(line));
        if let Some(label) = label {
            let name = tree.new_string(Token::Name, label);
            tree.add_child_to_back(node, name);
        }
        node
    }

    /// `if (cond) then [else otherwise]`
    pub fn if_(&mut self, cond: NodeId, then: NodeId, otherwise: Option<NodeId>, line: u32) -> NodeId {
        let tree = &mut self.program.tree;
        let result = tree.new_node_at(Token::Block, at(line));
        let if_not = tree.new_node(Token::Target);
        let ifne = tree.new_node1(Token::IfNe, cond);
        tree.set_target(ifne, if_not);
        tree.add_child_to_back(result, ifne);
        tree.add_child_to_back(result, then);
        match otherwise {
            Some(otherwise) => {
                let end = tree.new_node(Token::Target);
                let goto_end = tree.new_node(Token::Goto);
                tree.set_target(goto_end, end);
                tree.add_child_to_back(result, goto_end);
                tree.add_child_to_back(result, if_not);
                tree.add_child_to_back(result, otherwise);
                tree.add_child_to_back(result, end);
            }
            None => tree.add_child_to_back(result, if_not),
        }
        result
    }

    /// `while (cond) body`
    pub fn while_(&mut self, cond: NodeId, body: NodeId, line: u32) -> NodeId {
        self.loop_(LoopKind::While, body, Some(cond), None, None, line)
    }

    /// `do body while (cond)`
    pub fn do_while(&mut self, body: NodeId, cond: NodeId, line: u32) -> NodeId {
        self.loop_(LoopKind::DoWhile, body, Some(cond), None, None, line)
    }

    /// `for (init; cond; incr) body`
    pub fn for_(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        incr: Option<NodeId>,
        body: NodeId,
        line: u32,
    ) -> NodeId {
        self.loop_(LoopKind::For, body, cond, init, incr, line)
    }

    fn loop_(
        &mut self,
        kind: LoopKind,
        body: NodeId,
        cond: Option<NodeId>,
        init: Option<NodeId>,
        incr: Option<NodeId>,
        line: u32,
    ) -> NodeId {
        let tree = &mut self.program.tree;
        let body_target = tree.new_node(Token::Target);
        let cond_target = tree.new_node(Token::Target);
        let cond = match cond {
            Some(cond) => cond,
            None => tree.new_node(Token::True),
        };
        let ifeq = tree.new_node1(Token::IfEq, cond);
        tree.set_target(ifeq, body_target);
        let break_target = tree.new_node(Token::Target);

        let result = tree.new_node_at(Token::Loop, at(line));
        tree.add_child_to_back(result, body_target);
        tree.add_child_to_back(result, body);
        tree.add_child_to_back(result, cond_target);
        tree.add_child_to_back(result, ifeq);
        tree.add_child_to_back(result, break_target);

        let mut continue_target = cond_target;
        if kind != LoopKind::DoWhile {
            let goto_cond = tree.new_node(Token::Goto);
            tree.set_target(goto_cond, cond_target);
            tree.add_child_to_front(result, goto_cond);

            if kind == LoopKind::For {
                if let Some(init) = init {
                    let init = if tree.kind(init) == Token::Var {
                        init
                    } else {
                        tree.new_node1(Token::Pop, init)
                    };
                    tree.add_child_to_front(result, init);
                }
                let incr_target = tree.new_node(Token::Target);
                tree.add_child_after(result, incr_target, body);
                if let Some(incr) = incr {
                    let pop = tree.new_node1(Token::Pop, incr);
                    tree.add_child_after(result, pop, incr_target);
                }
                continue_target = incr_target;
            }
        }

        let jump = tree.jump_mut(result);
        jump.target = Some(break_target);
        jump.continue_target = Some(continue_target);
        trace!(node = %result, ?kind, "built loop");
        result
    }

    /// `for (lhs in object) body`
    ///
    /// The loop is wrapped in a synthetic block holding the enumeration
    /// setup and teardown.
    pub fn for_in(&mut self, lhs: NodeId, object: NodeId, body: NodeId, line: u32) -> Result<NodeId> {
        let lhs_kind = self.program.tree.kind(lhs);
        let lvalue = match lhs_kind {
            Token::Name | Token::GetProp | Token::GetElem => lhs,
            Token::Var => {
                let tree = &self.program.tree;
                let (first, last) = (tree.first_child(lhs), tree.last_child(lhs));
                if first != last {
                    return Err(Error::SyntaxError(
                        "only one variable allowed in for...in loop".to_string(),
                    ));
                }
                let name = last
                    .and_then(|n| tree.string(n))
                    .map(str::to_string)
                    .ok_or_else(|| Error::SyntaxError("missing variable in for...in loop".to_string()))?;
                self.name(&name)
            }
            _ => {
                return Err(Error::SyntaxError(
                    "invalid left-hand side of for...in loop".to_string(),
                ));
            }
        };

        let tree = &mut self.program.tree;
        let init = tree.new_node1(Token::EnumInit, object);
        let next = tree.new_node(Token::EnumNext);
        tree.set_attr(next, AttrKey::EnumInit, AttrValue::Node(init));
        let id = tree.new_node(Token::EnumId);
        tree.set_attr(id, AttrKey::EnumInit, AttrValue::Node(init));

        let assign = self.assignment(lvalue, id)?;
        let tree = &mut self.program.tree;
        let pop = tree.new_node1(Token::Pop, assign);
        let new_body = tree.new_node(Token::Block);
        tree.add_child_to_back(new_body, pop);
        tree.add_child_to_back(new_body, body);

        let lp = self.while_(next, new_body, line);

        let tree = &mut self.program.tree;
        let done = tree.new_node(Token::EnumDone);
        tree.set_attr(done, AttrKey::EnumInit, AttrValue::Node(init));
        let result = tree.new_node_at(Token::Block, at(line));
        if lhs_kind == Token::Var {
            tree.add_child_to_back(result, lhs);
        }
        tree.add_child_to_back(result, init);
        tree.add_child_to_back(result, lp);
        tree.add_child_to_back(result, done);
        Ok(result)
    }

    /// `switch (selector)`; add clauses with [`IrFactory::case`] and
    /// [`IrFactory::default_case`].
    pub fn switch(&mut self, selector: NodeId, line: u32) -> NodeId {
        let node = self.program.tree.new_node1(Token::Switch, selector);
        self.program.tree.set_line(node, at(line));
        node
    }

    /// Appends a `case expr:` clause.
    pub fn case(&mut self, switch: NodeId, expr: NodeId, statements: &[NodeId]) -> NodeId {
        let body = self.block(statements, 0);
        let tree = &mut self.program.tree;
        let case = tree.new_node2(Token::Case, expr, body);
        tree.add_child_to_back(switch, case);
        case
    }

    /// Appends a `default:` clause.
    pub fn default_case(&mut self, switch: NodeId, statements: &[NodeId]) -> NodeId {
        let body = self.block(statements, 0);
        let tree = &mut self.program.tree;
        let default = tree.new_node1(Token::Default, body);
        tree.add_child_to_back(switch, default);
        default
    }

    /// `try {} catch {} finally {}`
    ///
    /// The TRY node records its catch target and finally target; the try
    /// block is followed by a JSR into the finally block, and the finally
    /// block ends with RETSUB.
    pub fn try_(
        &mut self,
        try_block: NodeId,
        catches: Vec<CatchClause>,
        finally: Option<NodeId>,
        line: u32,
    ) -> NodeId {
        {
            let tree = &self.program.tree;
            if tree.kind(try_block) == Token::Block && !tree.has_children(try_block) {
                return try_block;
            }
        }
        let has_catch = !catches.is_empty();
        let has_finally = finally.is_some_and(|f| {
            let tree = &self.program.tree;
            tree.kind(f) != Token::Block || tree.has_children(f)
        });
        if !has_catch && !has_finally {
            return try_block;
        }
        let pn = {
            let tree = &mut self.program.tree;
            let pn = tree.new_node1(Token::Try, try_block);
            tree.set_line(pn, at(line));
            pn
        };

        let finally_target = has_finally.then(|| {
            let tree = &mut self.program.tree;
            let target = tree.new_node(Token::Target);
            tree.jump_mut(pn).finally_target = Some(target);
            let jsr = tree.new_node(Token::Jsr);
            tree.set_target(jsr, target);
            tree.add_child_to_back(pn, jsr);
            target
        });

        let end_target = self.program.tree.new_node(Token::Target);
        let goto_end = self.program.tree.new_node(Token::Goto);
        self.program.tree.set_target(goto_end, end_target);
        self.program.tree.add_child_to_back(pn, goto_end);

        if has_catch {
            let catch_target = self.program.tree.new_node(Token::Target);
            self.program.tree.jump_mut(pn).target = Some(catch_target);
            self.program.tree.add_child_to_back(pn, catch_target);
            let end_catch = self.program.tree.new_node(Token::Target);

            for clause in catches {
                let cond = match clause.condition {
                    Some(cond) => cond,
                    None => self.leaf(Token::True),
                };
                let tree = &mut self.program.tree;
                let leave = tree.new_node(Token::LeaveWith);
                tree.add_child_to_back(clause.body, leave);
                let goto_end_catch = tree.new_node(Token::Goto);
                tree.set_target(goto_end_catch, end_catch);
                tree.add_child_to_back(clause.body, goto_end_catch);

                let guarded = self.if_(cond, clause.body, None, clause.line);
                let tree = &mut self.program.tree;
                let scope = tree.new_string(Token::CatchScope, clause.name.as_str());
                let with = self.with_(scope, guarded, clause.line);
                self.program.tree.add_child_to_back(pn, with);
            }

            let tree = &mut self.program.tree;
            let rethrow = tree.new_node(Token::Throw);
            tree.add_child_to_back(pn, rethrow);
            tree.add_child_to_back(pn, end_catch);
            if let Some(finally_target) = finally_target {
                let jsr = tree.new_node(Token::Jsr);
                tree.set_target(jsr, finally_target);
                tree.add_child_to_back(pn, jsr);
                let goto = tree.new_node(Token::Goto);
                tree.set_target(goto, end_target);
                tree.add_child_to_back(pn, goto);
            }
        }

        if let (Some(finally_target), Some(finally)) = (finally_target, finally) {
            let tree = &mut self.program.tree;
            tree.add_child_to_back(pn, finally_target);
            tree.add_child_to_back(pn, finally);
            let retsub = tree.new_node(Token::Retsub);
            tree.add_child_to_back(pn, retsub);
        }
        self.program.tree.add_child_to_back(pn, end_target);
        pn
    }

    /// `with (object) body`
    pub fn with_(&mut self, object: NodeId, body: NodeId, line: u32) -> NodeId {
        let tree = &mut self.program.tree;
        let result = tree.new_node_at(Token::Block, at(line));
        let enter = tree.new_node1(Token::EnterWith, object);
        tree.add_child_to_back(result, enter);
        let with = tree.new_node1(Token::With, body);
        tree.set_line(with, at(line));
        tree.add_child_to_back(result, with);
        let leave = tree.new_node(Token::LeaveWith);
        tree.add_child_to_back(result, leave);
        result
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Opens a function body nested in the current one.
    pub fn begin_function(&mut self, name: &str, function_type: FunctionType, line: u32) -> FunctionId {
        let parent = self.current();
        let root = self.program.tree.new_node_at(Token::Function, at(line));
        let id = self
            .program
            .add_body(ScriptKind::Function(function_type), name, root);
        self.program.tree.set_function_id(root, id);
        let source_name = self.program.script().source_name.clone();
        let body = self.program.body_mut(id);
        body.parent = Some(parent);
        body.source_name = source_name;
        body.base_line = at(line);
        self.open.push(id);
        trace!(function = %id, name, "opened function");
        id
    }

    /// Declares a formal parameter of the current function.
    pub fn add_param(&mut self, name: &str) {
        let current = self.current();
        self.program.body_mut(current).vars.add_parameter(name);
    }

    /// Closes the current function and returns the FUNCTION node that
    /// stands for it in the enclosing body.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not the innermost open function.
    pub fn finish_function(&mut self, id: FunctionId, statements: &[NodeId], end_line: u32) -> NodeId {
        assert_eq!(self.open.last().copied(), Some(id), "{} is not the innermost open function", id);
        self.open.pop();

        let root = self.program.body(id).root;
        for &stmt in statements {
            self.program.tree.add_child_to_back(root, stmt);
        }

        // `function x() {}` used as a statement wins over `var x`.
        let shadowing: Vec<String> = self
            .program
            .body(id)
            .functions
            .iter()
            .map(|&f| self.program.body(f))
            .filter(|f| f.function_type() == Some(FunctionType::ExpressionStatement) && !f.name.is_empty())
            .map(|f| f.name.clone())
            .collect();
        for name in &shadowing {
            self.program.body_mut(id).vars.remove_local(name);
        }

        let (name, function_type) = {
            let body = self.program.body(id);
            (body.name.clone(), body.function_type())
        };
        if function_type == Some(FunctionType::Expression)
            && !name.is_empty()
            && self.program.body(id).vars.get(&name).is_none()
        {
            // A named function expression sees its own name.
            self.program.body_mut(id).vars.add_local(&name);
            let tree = &mut self.program.tree;
            let bind = tree.new_string(Token::BindName, name.as_str());
            let this_fn = tree.new_node(Token::ThisFn);
            let set = tree.new_node2(Token::SetName, bind, this_fn);
            let pop = tree.new_node1(Token::Pop, set);
            tree.add_child_to_front(root, pop);
        }

        let tree = &mut self.program.tree;
        let ends_with_return = tree
            .last_child(root)
            .is_some_and(|last| tree.kind(last) == Token::Return);
        if !ends_with_return {
            let ret = tree.new_node(Token::Return);
            tree.add_child_to_back(root, ret);
        }

        let line = tree.line(root);
        let stub = tree.new_node_at(Token::Function, line);
        tree.set_payload(stub, Payload::String(name));
        tree.set_function_id(stub, id);

        let parent = self.current();
        self.program.body_mut(id).end_line = at(end_line);
        self.program.body_mut(parent).functions.push(id);
        trace!(function = %id, parent = %parent, "closed function");
        stub
    }

    /// Records the source text of a body.
    pub fn set_source(&mut self, id: FunctionId, source: impl Into<String>) {
        self.program.body_mut(id).encoded_source = Some(source.into());
    }

    /// Appends the top-level statements and returns the finished program.
    ///
    /// # Panics
    ///
    /// Panics if a function body is still open.
    pub fn finish_script(mut self, statements: &[NodeId], end_line: u32) -> Program {
        assert_eq!(self.open.len(), 1, "unclosed function body");
        let root = self.program.script().root;
        for &stmt in statements {
            self.program.tree.add_child_to_back(root, stmt);
        }
        self.program.body_mut(FunctionId::SCRIPT).end_line = at(end_line);
        self.program
    }
}

/// Unlinks the two children of a GETPROP/GETELEM node.
fn detach_pair(tree: &mut Tree, node: NodeId) -> (NodeId, NodeId) {
    let object = tree.first_child(node).unwrap_or_else(|| panic!("{} has no object", node));
    let key = tree.last_child(node).unwrap_or_else(|| panic!("{} has no key", node));
    tree.remove_child(node, object);
    tree.remove_child(node, key);
    (object, key)
}
