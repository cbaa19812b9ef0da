//! Control-flow lowering.
//!
//! Walks each script or function body once, in preorder, and rewrites the
//! factory tree into the shape code generation consumes:
//!
//! - `break`/`continue` become GOTOs to resolved targets, preceded by the
//!   LEAVEWITH/JSR steps needed to leave enclosing `with` and `finally`
//!   regions
//! - `return` inside a try-finally stores its value, runs the finally
//!   blocks and then returns the stored value
//! - switch clauses are flattened after the SWITCH node
//! - `var` declarations become popped assignments
//! - names that resolve to function locals become slot accesses, unless the
//!   function needs a heap activation
//!
//! Structural errors are reported to [`Diagnostics`] and lowering continues.


use super::diagnostics::{Diagnostics, LoweringError};
use crate::config::{EngineConfig, LanguageVersion};
use crate::ir::{AttrKey, AttrValue, FunctionId, NodeId, Program, SpecialCall, Token, Tree};
use tracing::{debug, trace};

/// Lowers every body of `program` in place.
///
/// Returns the diagnostics of the run; the program must not be assembled if
/// they contain errors.
#[tracing::instrument(skip_all, fields(source = program.script().source_name.as_deref().unwrap_or("<script>")))]
pub fn lower(program: &mut Program, config: &EngineConfig) -> Diagnostics {
    let body_count = program.bodies().len();
    let mut lowering = Lowering {
        program,
        config,
        diagnostics: Diagnostics::with_limit(config.max_diagnostics),
        lowered: vec![false; body_count],
    };
    lowering.lower_body(FunctionId::SCRIPT);
    // Bodies whose FUNCTION node never made it into a tree.
    for index in 0..body_count {
        if !lowering.lowered[index] {
            lowering.lower_body(FunctionId::new(index));
        }
    }
    lowering.diagnostics
}

/// An open label, loop, switch, with or try-finally.
#[derive(Debug, Clone, Copy)]
struct Region {
    node: NodeId,
    kind: Token,
    exit: NodeId,
}

/// A local-slot rewrite that must be undone if the function ends up
/// needing an activation.
#[derive(Debug, Clone, Copy)]
enum Rewrite {
    GetVar { node: NodeId },
    SetVar { node: NodeId, bind: NodeId },
    DeleteLocal { parent: NodeId, original: NodeId, replacement: NodeId },
}

#[derive(Debug)]
struct BodyState {
    id: FunctionId,
    in_function: bool,
    regions: Vec<Region>,
    has_finally: bool,
    rewrites: Vec<Rewrite>,
}

impl BodyState {
    fn in_with(&self) -> bool {
        self.regions.iter().any(|r| r.kind == Token::With)
    }

    fn nearest(&self, kind: Token) -> Option<Region> {
        self.regions.iter().rev().find(|r| r.kind == kind).copied()
    }
}

struct Lowering<'a> {
    program: &'a mut Program,
    config: &'a EngineConfig,
    diagnostics: Diagnostics,
    lowered: Vec<bool>,
}

impl Lowering<'_> {
    fn tree(&self) -> &Tree {
        &self.program.tree
    }

    fn tree_mut(&mut self) -> &mut Tree {
        &mut self.program.tree
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    fn lower_body(&mut self, id: FunctionId) {
        if self.lowered[id.index()] {
            return;
        }
        self.lowered[id.index()] = true;

        let body = self.program.body(id);
        let root = body.root;
        let mut state = BodyState {
            id,
            in_function: body.is_function(),
            regions: Vec::new(),
            has_finally: false,
            rewrites: Vec::new(),
        };
        debug!(function = %id, name = %body.name, "lowering body");

        self.lower_children(&mut state, root);
        self.finish_body(state);
    }

    fn finish_body(&mut self, state: BodyState) {
        let requires_activation = self.program.body(state.id).requires_activation;
        if requires_activation && !state.rewrites.is_empty() {
            trace!(function = %state.id, count = state.rewrites.len(), "reverting local slot rewrites");
            for rewrite in state.rewrites.iter().rev() {
                self.revert(*rewrite);
            }
        }
        let body = self.program.body_mut(state.id);
        body.has_finally |= state.has_finally;
        debug!(
            function = %state.id,
            requires_activation = body.requires_activation,
            has_finally = body.has_finally,
            "lowered body"
        );
    }

    fn revert(&mut self, rewrite: Rewrite) {
        let tree = self.tree_mut();
        match rewrite {
            Rewrite::GetVar { node } => {
                tree.set_kind(node, Token::Name);
                tree.remove_attr(node, AttrKey::VarIndex);
            }
            Rewrite::SetVar { node, bind } => {
                tree.set_kind(node, Token::SetName);
                tree.set_kind(bind, Token::BindName);
                tree.remove_attr(node, AttrKey::VarIndex);
            }
            Rewrite::DeleteLocal {
                parent,
                original,
                replacement,
            } => tree.replace_child(parent, replacement, original),
        }
    }

    fn require_activation(&mut self, state: &BodyState, why: &str) {
        if !state.in_function {
            return;
        }
        let body = self.program.body_mut(state.id);
        if !body.requires_activation {
            trace!(function = %state.id, why, "activation required");
            body.requires_activation = true;
        }
    }

    fn report(&mut self, state: &BodyState, node: NodeId, error: LoweringError) {
        let line = self.tree().line(node);
        let source = self.program.body(state.id).source_name.clone();
        self.diagnostics.error(error.to_string(), source.as_deref(), line);
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn lower_children(&mut self, state: &mut BodyState, parent: NodeId) {
        let mut cursor = self.tree().first_child(parent);
        while let Some(node) = cursor {
            let (node, descend) = self.lower_node(state, parent, node);
            if descend {
                self.lower_children(state, node);
            }
            cursor = self.tree().next(node);
        }
    }

    /// Lowers one node and returns the node now at its position, plus
    /// whether its children still need a visit.
    fn lower_node(&mut self, state: &mut BodyState, parent: NodeId, node: NodeId) -> (NodeId, bool) {
        match self.tree().kind(node) {
            Token::Function => {
                self.lower_nested_function(state, node);
                (node, false)
            }
            Token::Label => {
                self.lower_label(state, parent, node);
                (node, true)
            }
            Token::Switch => {
                self.lower_switch(state, parent, node);
                (node, true)
            }
            Token::Case | Token::Default => {
                self.record_case(state, node);
                (node, true)
            }
            Token::Loop => {
                if let Some(exit) = self.tree().target(node) {
                    self.push_region(state, node, exit);
                }
                (node, true)
            }
            Token::With => {
                self.require_activation(state, "with");
                let exit = self
                    .tree()
                    .next(node)
                    .filter(|&n| self.tree().kind(n) == Token::LeaveWith)
                    .unwrap_or_else(|| panic!("{} (WITH) is not followed by LEAVEWITH", node));
                self.push_region(state, node, exit);
                (node, true)
            }
            Token::Try => {
                if let Some(finally) = self.tree().jump(node).and_then(|j| j.finally_target) {
                    state.has_finally = true;
                    self.push_region(state, node, finally);
                }
                self.program.body_mut(state.id).local_count += 1;
                (node, true)
            }
            Token::Target | Token::LeaveWith => {
                while state.regions.last().is_some_and(|r| r.exit == node) {
                    if let Some(region) = state.regions.pop() {
                        trace!(node = %region.node, kind = %region.kind, "closed region");
                    }
                }
                (node, true)
            }
            Token::Return => (self.lower_return(state, parent, node), true),
            Token::Break | Token::Continue => {
                self.lower_jump(state, parent, node);
                (node, false)
            }
            Token::Call | Token::New => {
                self.lower_call(state, node);
                (node, true)
            }
            Token::GetProp => {
                self.lower_get_prop(state, node);
                (node, true)
            }
            Token::ExprStmt => {
                let kind = if state.in_function { Token::Pop } else { Token::Popv };
                self.tree_mut().set_kind(node, kind);
                (node, true)
            }
            Token::Var => (self.lower_var(parent, node), true),
            Token::Name => {
                self.lower_name(state, node);
                (node, true)
            }
            Token::SetName => {
                self.lower_set_name(state, node);
                (node, true)
            }
            Token::DelProp => (self.lower_delete(state, parent, node), true),
            _ => (node, true),
        }
    }

    fn push_region(&mut self, state: &mut BodyState, node: NodeId, exit: NodeId) {
        let kind = self.tree().kind(node);
        trace!(node = %node, kind = %kind, exit = %exit, "opened region");
        state.regions.push(Region { node, kind, exit });
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn lower_nested_function(&mut self, state: &BodyState, node: NodeId) {
        let Some(fid) = self.tree().function_id(node) else {
            return;
        };
        if fid == state.id {
            return;
        }
        if state.in_function {
            self.require_activation(state, "nested function");
            self.program.body_mut(fid).check_this = true;
        }
        self.lower_body(fid);
    }

    // ========================================================================
    // Labels and switches
    // ========================================================================

    fn lower_label(&mut self, state: &mut BodyState, parent: NodeId, node: NodeId) {
        let Some(name_node) = self.tree().first_child(node) else {
            return;
        };
        let label = self.tree().string(name_node).unwrap_or_default().to_string();
        self.tree_mut().remove_child(node, name_node);

        let duplicate = state.regions.iter().any(|r| {
            r.kind == Token::Label
                && self.tree().jump(r.node).and_then(|j| j.label.as_deref()) == Some(label.as_str())
        });
        if duplicate {
            self.report(state, node, LoweringError::DuplicateLabel(label));
            return;
        }
        self.tree_mut().jump_mut(node).label = Some(label);

        let mut next = self.tree().next(node);
        while let Some(n) = next {
            match self.tree().kind(n) {
                Token::Label | Token::Target => next = self.tree().next(n),
                _ => break,
            }
        }
        let Some(statement) = next else {
            return;
        };

        // Stacked labels share the break target of the statement.
        let shared = self.tree().next(statement).filter(|&t| {
            self.tree().kind(t) == Token::Target
                && state.regions.iter().any(|r| r.kind == Token::Label && r.exit == t)
        });
        let target = match shared {
            Some(target) => target,
            None => {
                let target = self.tree_mut().new_node(Token::Target);
                self.tree_mut().add_child_after(parent, target, statement);
                target
            }
        };

        let continue_target = self
            .find_loop(statement)
            .and_then(|lp| self.tree().jump(lp).and_then(|j| j.continue_target));
        let jump = self.tree_mut().jump_mut(node);
        jump.target = Some(target);
        jump.continue_target = continue_target;
        self.push_region(state, node, target);
    }

    /// The loop a label applies to: the statement itself, or the loop of
    /// the synthetic block wrapping a `for..in`.
    fn find_loop(&self, statement: NodeId) -> Option<NodeId> {
        let tree = self.tree();
        match tree.kind(statement) {
            Token::Loop => Some(statement),
            Token::Block | Token::LocalBlock => {
                let enumerates = tree.children(statement).any(|c| tree.kind(c) == Token::EnumInit);
                if enumerates {
                    tree.children(statement).find(|&c| tree.kind(c) == Token::Loop)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn lower_switch(&mut self, state: &mut BodyState, parent: NodeId, node: NodeId) {
        let tree = self.tree_mut();
        let target = tree.new_node(Token::Target);
        tree.add_child_after(parent, target, node);

        let clauses: Vec<NodeId> = tree.children(node).skip(1).collect();
        let mut sibling = node;
        for clause in clauses {
            tree.remove_child(node, clause);
            tree.add_child_after(parent, clause, sibling);
            sibling = clause;
        }
        tree.switch_mut(node).target = Some(target);
        self.push_region(state, node, target);
    }

    fn record_case(&mut self, state: &BodyState, node: NodeId) {
        let Some(switch) = state.nearest(Token::Switch) else {
            return;
        };
        let is_case = self.tree().kind(node) == Token::Case;
        let props = self.tree_mut().switch_mut(switch.node);
        if is_case {
            props.cases.push(node);
        } else {
            props.default = Some(node);
        }
    }

    // ========================================================================
    // Jumps
    // ========================================================================

    /// Unwind steps for leaving `regions`, innermost first.
    fn unwind_steps(&mut self, regions: &[Region]) -> Vec<NodeId> {
        let mut steps = Vec::new();
        for region in regions.iter().rev() {
            match region.kind {
                Token::Try => {
                    let jsr = self.tree_mut().new_node(Token::Jsr);
                    self.tree_mut().set_target(jsr, region.exit);
                    steps.push(jsr);
                }
                Token::With => steps.push(self.tree_mut().new_node(Token::LeaveWith)),
                _ => {}
            }
        }
        steps
    }

    fn lower_return(&mut self, state: &BodyState, parent: NodeId, node: NodeId) -> NodeId {
        if !state.has_finally {
            return node;
        }
        let regions = state.regions.clone();
        let steps = self.unwind_steps(&regions);
        if steps.is_empty() {
            return node;
        }
        let line = self.tree().line(node);
        let tree = self.tree_mut();
        match tree.first_child(node) {
            Some(value) => {
                // Store the value, run the finally blocks, return the store.
                tree.remove_child(node, value);
                let popv = tree.new_node1(Token::Popv, value);
                tree.set_line(popv, line);
                let block = tree.new_node_at(Token::Block, line);
                tree.add_child_to_back(block, popv);
                for step in steps {
                    tree.add_child_to_back(block, step);
                }
                let ret = tree.new_node_at(Token::ReturnPopv, line);
                tree.add_child_to_back(block, ret);
                tree.replace_child(parent, node, block);
                trace!(node = %node, block = %block, "rewrote return through finally");
                block
            }
            None => {
                for step in steps {
                    tree.add_child_before(parent, step, node);
                }
                node
            }
        }
    }

    fn lower_jump(&mut self, state: &BodyState, parent: NodeId, node: NodeId) {
        let is_break = self.tree().kind(node) == Token::Break;
        let label = match self.tree().first_child(node) {
            Some(name) => {
                let label = self.tree().string(name).unwrap_or_default().to_string();
                self.tree_mut().remove_child(node, name);
                Some(label)
            }
            None => None,
        };

        let mut found = None;
        for (i, region) in state.regions.iter().enumerate().rev() {
            let matches = match &label {
                None => region.kind == Token::Loop || (is_break && region.kind == Token::Switch),
                Some(label) => {
                    region.kind == Token::Label
                        && self.tree().jump(region.node).and_then(|j| j.label.as_deref()) == Some(label.as_str())
                }
            };
            if matches {
                found = Some(i);
                break;
            }
        }

        let target = found.and_then(|i| {
            let region = state.regions[i];
            match (region.kind, is_break) {
                (Token::Switch, _) => self.tree().switch(region.node).and_then(|s| s.target),
                (_, true) => self.tree().target(region.node),
                (_, false) => self.tree().jump(region.node).and_then(|j| j.continue_target),
            }
        });

        let (Some(index), Some(target)) = (found, target) else {
            let error = match (label, found) {
                (None, _) if is_break => LoweringError::BreakOutside,
                (None, _) => LoweringError::ContinueOutside,
                (Some(_), Some(_)) => LoweringError::ContinueNonLoop,
                (Some(label), None) => LoweringError::UndefinedLabel(label),
            };
            self.report(state, node, error);
            self.tree_mut().set_kind(node, Token::Nop);
            return;
        };

        let steps = self.unwind_steps(&state.regions[index + 1..]);
        let tree = self.tree_mut();
        for step in steps {
            tree.add_child_before(parent, step, node);
        }
        tree.set_kind(node, Token::Goto);
        tree.set_target(node, target);
    }

    // ========================================================================
    // Calls and property access
    // ========================================================================

    fn lower_call(&mut self, state: &BodyState, node: NodeId) {
        let tree = self.tree();
        let special = tree.first_child(node).and_then(|callee| match tree.kind(callee) {
            Token::Name => tree.string(callee).and_then(SpecialCall::from_name),
            Token::GetProp => tree
                .first_child(callee)
                .and_then(|object| tree.next(object))
                .filter(|&property| tree.kind(property) == Token::String)
                .and_then(|property| tree.string(property))
                .and_then(SpecialCall::from_method),
            _ => None,
        });
        if let Some(special) = special {
            self.tree_mut().set_int_attr(node, AttrKey::SpecialCall, special as i32);
            self.require_activation(state, "special call");
        }
    }

    fn lower_get_prop(&mut self, state: &BodyState, node: NodeId) {
        if !state.in_function {
            return;
        }
        let name = self
            .tree()
            .first_child(node)
            .and_then(|object| self.tree().next(object))
            .and_then(|property| self.tree().string(property))
            .unwrap_or_default();
        let needs = self.config.is_activation_name(name)
            || (name == "length" && self.config.language_version == LanguageVersion::V1_2);
        if needs {
            self.require_activation(state, "property observes activation");
        }
    }

    // ========================================================================
    // Variables
    // ========================================================================

    fn lower_var(&mut self, parent: NodeId, node: NodeId) -> NodeId {
        let line = self.tree().line(node);
        let tree = self.tree_mut();
        let block = tree.new_node_at(Token::Block, line);
        let declarations: Vec<NodeId> = tree.children(node).collect();
        for decl in declarations {
            tree.remove_child(node, decl);
            let Some(init) = tree.first_child(decl) else {
                continue;
            };
            tree.remove_child(decl, init);
            tree.set_kind(decl, Token::BindName);
            let assign = tree.new_node2(Token::SetName, decl, init);
            let pop = tree.new_node1(Token::Pop, assign);
            tree.set_line(pop, line);
            tree.add_child_to_back(block, pop);
        }
        tree.replace_child(parent, node, block);
        block
    }

    /// Slot of `name` when it can be accessed as a function local.
    fn local_slot(&mut self, state: &BodyState, name: &str) -> Option<usize> {
        if !state.in_function || state.in_with() {
            return None;
        }
        if self.config.is_activation_name(name) {
            self.require_activation(state, "activation name");
        }
        let body = self.program.body(state.id);
        if body.requires_activation {
            return None;
        }
        body.vars.get(name)
    }

    fn lower_name(&mut self, state: &mut BodyState, node: NodeId) {
        let name = self.tree().string(node).unwrap_or_default().to_string();
        if let Some(slot) = self.local_slot(state, &name) {
            let tree = self.tree_mut();
            tree.set_kind(node, Token::GetVar);
            tree.set_attr(node, AttrKey::VarIndex, AttrValue::Int(slot as i32));
            state.rewrites.push(Rewrite::GetVar { node });
        }
    }

    fn lower_set_name(&mut self, state: &mut BodyState, node: NodeId) {
        let Some(bind) = self
            .tree()
            .first_child(node)
            .filter(|&b| self.tree().kind(b) == Token::BindName)
        else {
            return;
        };
        let name = self.tree().string(bind).unwrap_or_default().to_string();
        if let Some(slot) = self.local_slot(state, &name) {
            let tree = self.tree_mut();
            tree.set_kind(node, Token::SetVar);
            tree.set_kind(bind, Token::String);
            tree.set_attr(node, AttrKey::VarIndex, AttrValue::Int(slot as i32));
            state.rewrites.push(Rewrite::SetVar { node, bind });
        }
    }

    fn lower_delete(&mut self, state: &mut BodyState, parent: NodeId, node: NodeId) -> NodeId {
        let Some(bind) = self
            .tree()
            .first_child(node)
            .filter(|&b| self.tree().kind(b) == Token::BindName)
        else {
            return node;
        };
        let name = self.tree().string(bind).unwrap_or_default().to_string();
        if self.local_slot(state, &name).is_none() {
            return node;
        }
        // Locals are permanent.
        let line = self.tree().line(node);
        let tree = self.tree_mut();
        let replacement = tree.new_node_at(Token::False, line);
        tree.replace_child(parent, node, replacement);
        state.rewrites.push(Rewrite::DeleteLocal {
            parent,
            original: node,
            replacement,
        });
        replacement
    }
}
