//! Arena-backed IR tree.
//!
//! Every node of a compilation lives in one [`Tree`]. Parents own their
//! children through the `first`/`next` chain; jump targets and other
//! cross-references are plain [`NodeId`]s and never imply ownership.

use super::node::{Node, NodeId, Payload};
use super::props::{AttrKey, AttrValue, JumpProps, Props, SwitchProps};
use super::script::FunctionId;
use super::token::Token;

/// Node arena.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no node has been allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrows a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Allocates a childless node.
    pub fn new_node(&mut self, kind: Token) -> NodeId {
        self.alloc(Node::new(kind))
    }

    /// Allocates a childless node with a line number.
    pub fn new_node_at(&mut self, kind: Token, line: Option<u32>) -> NodeId {
        let id = self.new_node(kind);
        self.node_mut(id).line = line;
        id
    }

    /// Allocates a node with the given children linked in order.
    ///
    /// # Panics
    ///
    /// Panics if a child already has a sibling link.
    pub fn new_with_children(&mut self, kind: Token, children: &[NodeId]) -> NodeId {
        assert!(children.len() <= 3, "at most three pre-linked children");
        let id = self.new_node(kind);
        for &child in children {
            self.add_child_to_back(id, child);
        }
        id
    }

    /// Allocates a node with one child.
    pub fn new_node1(&mut self, kind: Token, child: NodeId) -> NodeId {
        self.new_with_children(kind, &[child])
    }

    /// Allocates a node with two children.
    pub fn new_node2(&mut self, kind: Token, left: NodeId, right: NodeId) -> NodeId {
        self.new_with_children(kind, &[left, right])
    }

    /// Allocates a node with three children.
    pub fn new_node3(&mut self, kind: Token, a: NodeId, b: NodeId, c: NodeId) -> NodeId {
        self.new_with_children(kind, &[a, b, c])
    }

    /// Allocates a node carrying a string datum.
    pub fn new_string(&mut self, kind: Token, value: impl Into<String>) -> NodeId {
        let id = self.new_node(kind);
        self.node_mut(id).payload = Payload::String(value.into());
        id
    }

    /// Allocates a NUMBER node.
    pub fn new_number(&mut self, value: f64) -> NodeId {
        let id = self.new_node(Token::Number);
        self.node_mut(id).payload = Payload::Number(value);
        id
    }

    /// Allocates a node carrying an integer datum.
    pub fn new_int(&mut self, kind: Token, value: i32) -> NodeId {
        let id = self.new_node(kind);
        self.node_mut(id).payload = Payload::Int(value);
        id
    }

    /// Copies a node without its children or sibling link.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let copy = self.node(id).detached_copy();
        self.alloc(copy)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Kind of a node.
    pub fn kind(&self, id: NodeId) -> Token {
        self.node(id).kind
    }

    /// Changes the kind of a node, keeping its links and attributes.
    ///
    /// Jump attributes are added when the new kind needs them.
    pub fn set_kind(&mut self, id: NodeId, kind: Token) {
        let node = self.node_mut(id);
        node.kind = kind;
        if matches!(node.props, Props::None) {
            node.props = Props::for_kind(kind);
        }
    }

    /// Line of a node.
    pub fn line(&self, id: NodeId) -> Option<u32> {
        self.node(id).line
    }

    /// Sets the line of a node.
    pub fn set_line(&mut self, id: NodeId, line: Option<u32>) {
        self.node_mut(id).line = line;
    }

    /// String datum of a node.
    pub fn string(&self, id: NodeId) -> Option<&str> {
        self.node(id).string()
    }

    /// Replaces the datum of a node.
    pub fn set_payload(&mut self, id: NodeId, payload: Payload) {
        self.node_mut(id).payload = payload;
    }

    /// First child.
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).first
    }

    /// Last child.
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).last
    }

    /// Next sibling.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    /// Returns true if the node has children.
    pub fn has_children(&self, id: NodeId) -> bool {
        self.node(id).first.is_some()
    }

    /// Iterates over the children of a node.
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            cursor: self.node(id).first,
        }
    }

    /// Follows sibling links to the end of the chain starting at `id`.
    pub fn last_sibling(&self, id: NodeId) -> NodeId {
        let mut n = id;
        while let Some(next) = self.node(n).next {
            n = next;
        }
        n
    }

    /// Finds the child preceding `child`.
    ///
    /// # Panics
    ///
    /// Panics if `child` is not a child of `parent`.
    pub fn get_child_before(&self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        let first = self.node(parent).first;
        if first == Some(child) {
            return None;
        }
        let mut n = first.unwrap_or_else(|| panic!("{} is not a child of {}", child, parent));
        loop {
            match self.node(n).next {
                Some(next) if next == child => return Some(n),
                Some(next) => n = next,
                None => panic!("{} is not a child of {}", child, parent),
            }
        }
    }

    // ========================================================================
    // Structural edits
    // ========================================================================

    fn assert_detached(&self, id: NodeId, op: &str) {
        if self.node(id).next.is_some() {
            panic!("{}: {} already has a sibling link", op, id);
        }
    }

    /// Prepends one child.
    pub fn add_child_to_front(&mut self, parent: NodeId, child: NodeId) {
        self.assert_detached(child, "add_child_to_front");
        let first = self.node(parent).first;
        self.node_mut(child).next = first;
        let p = self.node_mut(parent);
        p.first = Some(child);
        if p.last.is_none() {
            p.last = Some(child);
        }
    }

    /// Appends one child.
    pub fn add_child_to_back(&mut self, parent: NodeId, child: NodeId) {
        self.assert_detached(child, "add_child_to_back");
        match self.node(parent).last {
            Some(last) => self.node_mut(last).next = Some(child),
            None => self.node_mut(parent).first = Some(child),
        }
        self.node_mut(parent).last = Some(child);
    }

    /// Prepends a whole sibling run starting at `children`.
    pub fn add_children_to_front(&mut self, parent: NodeId, children: NodeId) {
        let tail = self.last_sibling(children);
        let first = self.node(parent).first;
        self.node_mut(tail).next = first;
        let p = self.node_mut(parent);
        p.first = Some(children);
        if p.last.is_none() {
            p.last = Some(tail);
        }
    }

    /// Appends a whole sibling run starting at `children`.
    pub fn add_children_to_back(&mut self, parent: NodeId, children: NodeId) {
        let tail = self.last_sibling(children);
        match self.node(parent).last {
            Some(last) => self.node_mut(last).next = Some(children),
            None => self.node_mut(parent).first = Some(children),
        }
        self.node_mut(parent).last = Some(tail);
    }

    /// Inserts `new_child` immediately before `node`.
    ///
    /// # Panics
    ///
    /// Panics if `new_child` already has a sibling link or `node` is not a
    /// child of `parent`.
    pub fn add_child_before(&mut self, parent: NodeId, new_child: NodeId, node: NodeId) {
        self.assert_detached(new_child, "add_child_before");
        if self.node(parent).first == Some(node) {
            self.node_mut(new_child).next = Some(node);
            self.node_mut(parent).first = Some(new_child);
            return;
        }
        let prev = self.get_child_before(parent, node);
        self.add_child_after(parent, new_child, prev.unwrap_or(node));
    }

    /// Inserts `new_child` immediately after `node`.
    ///
    /// # Panics
    ///
    /// Panics if `new_child` already has a sibling link.
    pub fn add_child_after(&mut self, parent: NodeId, new_child: NodeId, node: NodeId) {
        self.assert_detached(new_child, "add_child_after");
        let next = self.node(node).next;
        self.node_mut(new_child).next = next;
        self.node_mut(node).next = Some(new_child);
        if self.node(parent).last == Some(node) {
            self.node_mut(parent).last = Some(new_child);
        }
    }

    /// Unlinks `child` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let prev = self.get_child_before(parent, child);
        let next = self.node(child).next;
        match prev {
            None => self.node_mut(parent).first = next,
            Some(prev) => self.node_mut(prev).next = next,
        }
        if self.node(parent).last == Some(child) {
            self.node_mut(parent).last = prev;
        }
        self.node_mut(child).next = None;
    }

    /// Replaces `child` with `new_child`, which may head a sibling run.
    pub fn replace_child(&mut self, parent: NodeId, child: NodeId, new_child: NodeId) {
        let prev = self.get_child_before(parent, child);
        self.splice(parent, prev, child, new_child);
    }

    /// Replaces the child following `prev_child` with `new_child`.
    pub fn replace_child_after(&mut self, parent: NodeId, prev_child: NodeId, new_child: NodeId) {
        let child = self
            .node(prev_child)
            .next
            .unwrap_or_else(|| panic!("{} has no following sibling", prev_child));
        self.splice(parent, Some(prev_child), child, new_child);
    }

    fn splice(&mut self, parent: NodeId, prev: Option<NodeId>, child: NodeId, new_child: NodeId) {
        let tail = self.last_sibling(new_child);
        let next = self.node(child).next;
        self.node_mut(tail).next = next;
        match prev {
            None => self.node_mut(parent).first = Some(new_child),
            Some(prev) => self.node_mut(prev).next = Some(new_child),
        }
        if self.node(parent).last == Some(child) {
            self.node_mut(parent).last = Some(tail);
        }
        self.node_mut(child).next = None;
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Looks up a keyed attribute.
    pub fn attr(&self, id: NodeId, key: AttrKey) -> Option<AttrValue> {
        let attrs = &self.node(id).attrs;
        if attrs.is_empty() {
            return None;
        }
        attrs.get(key)
    }

    /// Looks up an integer attribute, falling back to `default`.
    pub fn int_attr(&self, id: NodeId, key: AttrKey, default: i32) -> i32 {
        match self.attr(id, key) {
            Some(AttrValue::Int(v)) => v,
            _ => default,
        }
    }

    /// Sets a keyed attribute.
    pub fn set_attr(&mut self, id: NodeId, key: AttrKey, value: AttrValue) {
        self.node_mut(id).attrs.set(key, value);
    }

    /// Sets an integer attribute.
    pub fn set_int_attr(&mut self, id: NodeId, key: AttrKey, value: i32) {
        self.set_attr(id, key, AttrValue::Int(value));
    }

    /// Removes a keyed attribute.
    pub fn remove_attr(&mut self, id: NodeId, key: AttrKey) -> Option<AttrValue> {
        self.node_mut(id).attrs.remove(key)
    }

    /// Jump attributes of a jump-capable node.
    pub fn jump(&self, id: NodeId) -> Option<&JumpProps> {
        match &self.node(id).props {
            Props::Jump(j) => Some(j),
            _ => None,
        }
    }

    /// Mutable jump attributes.
    ///
    /// # Panics
    ///
    /// Panics if the node is not jump-capable.
    pub fn jump_mut(&mut self, id: NodeId) -> &mut JumpProps {
        let kind = self.node(id).kind;
        match &mut self.node_mut(id).props {
            Props::Jump(j) => j,
            _ => panic!("{} ({}) has no jump attributes", id, kind),
        }
    }

    /// Jump target of a node.
    pub fn target(&self, id: NodeId) -> Option<NodeId> {
        self.jump(id).and_then(|j| j.target)
    }

    /// Sets the jump target of a node.
    pub fn set_target(&mut self, id: NodeId, target: NodeId) {
        self.jump_mut(id).target = Some(target);
    }

    /// Switch attributes.
    pub fn switch(&self, id: NodeId) -> Option<&SwitchProps> {
        match &self.node(id).props {
            Props::Switch(s) => Some(s),
            _ => None,
        }
    }

    /// Mutable switch attributes.
    ///
    /// # Panics
    ///
    /// Panics if the node is not a switch.
    pub fn switch_mut(&mut self, id: NodeId) -> &mut SwitchProps {
        match &mut self.node_mut(id).props {
            Props::Switch(s) => s,
            _ => panic!("{} is not a switch", id),
        }
    }

    /// Function referenced by a FUNCTION node.
    pub fn function_id(&self, id: NodeId) -> Option<FunctionId> {
        match self.node(id).props {
            Props::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Attaches a function reference.
    pub fn set_function_id(&mut self, id: NodeId, function: FunctionId) {
        self.node_mut(id).props = Props::Function(function);
    }
}

/// Iterator over the children of a node.
pub struct Children<'a> {
    tree: &'a Tree,
    cursor: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cursor?;
        self.cursor = self.tree.node(id).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tree: &Tree, parent: NodeId) -> Vec<Token> {
        tree.children(parent).map(|c| tree.kind(c)).collect()
    }

    fn block_of(tree: &mut Tree, kinds: &[Token]) -> (NodeId, Vec<NodeId>) {
        let block = tree.new_node(Token::Block);
        let ids: Vec<_> = kinds
            .iter()
            .map(|&k| {
                let n = tree.new_node(k);
                tree.add_child_to_back(block, n);
                n
            })
            .collect();
        (block, ids)
    }

    #[test]
    fn test_new_node_with_children() {
        let mut tree = Tree::new();
        let a = tree.new_string(Token::Name, "a");
        let b = tree.new_number(1.0);
        let set = tree.new_node2(Token::SetName, a, b);
        assert_eq!(tree.first_child(set), Some(a));
        assert_eq!(tree.last_child(set), Some(b));
        assert_eq!(tree.next(a), Some(b));
        assert_eq!(tree.next(b), None);
        assert_eq!(tree.string(a), Some("a"));
        assert_eq!(tree.node(b).number(), Some(1.0));
    }

    #[test]
    fn test_clone_node_has_no_links() {
        let mut tree = Tree::new();
        let (block, ids) = block_of(&mut tree, &[Token::Pop, Token::Return]);
        tree.set_line(block, Some(7));
        tree.set_int_attr(block, AttrKey::VarIndex, 2);

        let copy = tree.clone_node(block);
        assert_eq!(tree.kind(copy), Token::Block);
        assert_eq!(tree.line(copy), Some(7));
        assert_eq!(tree.int_attr(copy, AttrKey::VarIndex, -1), 2);
        assert!(!tree.has_children(copy));
        assert_eq!(tree.last_child(copy), None);

        let sibling_copy = tree.clone_node(ids[0]);
        assert_eq!(tree.next(sibling_copy), None);
        // Source node keeps its links.
        assert_eq!(kinds(&tree, block), vec![Token::Pop, Token::Return]);
    }

    #[test]
    fn test_add_front_and_back() {
        let mut tree = Tree::new();
        let (block, _) = block_of(&mut tree, &[Token::Pop]);
        let front = tree.new_node(Token::Target);
        let back = tree.new_node(Token::Return);
        tree.add_child_to_front(block, front);
        tree.add_child_to_back(block, back);
        assert_eq!(kinds(&tree, block), vec![Token::Target, Token::Pop, Token::Return]);
        assert_eq!(tree.last_child(block), Some(back));
    }

    #[test]
    fn test_add_children_runs() {
        let mut tree = Tree::new();
        let (block, _) = block_of(&mut tree, &[Token::Pop]);
        let (other, run) = block_of(&mut tree, &[Token::Goto, Token::Target]);
        let _ = other;
        tree.add_children_to_back(block, run[0]);
        assert_eq!(kinds(&tree, block), vec![Token::Pop, Token::Goto, Token::Target]);
        assert_eq!(tree.last_child(block), Some(run[1]));

        let (empty, _) = block_of(&mut tree, &[]);
        let (_, run2) = block_of(&mut tree, &[Token::Nop, Token::Nop]);
        tree.add_children_to_front(empty, run2[0]);
        assert_eq!(tree.last_child(empty), Some(run2[1]));
    }

    #[test]
    fn test_insert_before_and_after() {
        let mut tree = Tree::new();
        let (block, ids) = block_of(&mut tree, &[Token::Pop, Token::Return]);
        let head = tree.new_node(Token::EnterWith);
        tree.add_child_before(block, head, ids[0]);
        let mid = tree.new_node(Token::Jsr);
        tree.add_child_before(block, mid, ids[1]);
        let tail = tree.new_node(Token::Target);
        tree.add_child_after(block, tail, ids[1]);
        assert_eq!(
            kinds(&tree, block),
            vec![Token::EnterWith, Token::Pop, Token::Jsr, Token::Return, Token::Target]
        );
        assert_eq!(tree.last_child(block), Some(tail));
    }

    #[test]
    #[should_panic(expected = "already has a sibling link")]
    fn test_insert_linked_node_panics() {
        let mut tree = Tree::new();
        let (block, ids) = block_of(&mut tree, &[Token::Pop, Token::Return]);
        let (other, _) = block_of(&mut tree, &[]);
        let _ = block;
        // ids[0] still points at ids[1].
        tree.add_child_to_back(other, ids[0]);
    }

    #[test]
    fn test_remove_child() {
        let mut tree = Tree::new();
        let (block, ids) = block_of(&mut tree, &[Token::Pop, Token::Goto, Token::Return]);
        tree.remove_child(block, ids[2]);
        assert_eq!(tree.last_child(block), Some(ids[1]));
        tree.remove_child(block, ids[0]);
        assert_eq!(tree.first_child(block), Some(ids[1]));
        assert_eq!(tree.next(ids[0]), None);
        tree.remove_child(block, ids[1]);
        assert!(!tree.has_children(block));
        assert_eq!(tree.last_child(block), None);
    }

    #[test]
    #[should_panic(expected = "is not a child")]
    fn test_remove_foreign_child_panics() {
        let mut tree = Tree::new();
        let (block, _) = block_of(&mut tree, &[Token::Pop]);
        let stray = tree.new_node(Token::Pop);
        tree.remove_child(block, stray);
    }

    #[test]
    fn test_replace_child_with_chain() {
        let mut tree = Tree::new();
        let (block, ids) = block_of(&mut tree, &[Token::Pop, Token::Return]);
        let (_, chain) = block_of(&mut tree, &[Token::Jsr, Token::LeaveWith]);
        tree.replace_child(block, ids[1], chain[0]);
        assert_eq!(kinds(&tree, block), vec![Token::Pop, Token::Jsr, Token::LeaveWith]);
        assert_eq!(tree.last_child(block), Some(chain[1]));
        assert_eq!(tree.next(ids[1]), None);

        let single = tree.new_node(Token::Nop);
        tree.replace_child_after(block, ids[0], single);
        assert_eq!(kinds(&tree, block), vec![Token::Pop, Token::Nop, Token::LeaveWith]);
    }

    #[test]
    fn test_int_attr_default_fast_path() {
        let mut tree = Tree::new();
        let n = tree.new_node(Token::Call);
        assert_eq!(tree.int_attr(n, AttrKey::SpecialCall, 0), 0);
        tree.set_int_attr(n, AttrKey::SpecialCall, 1);
        assert_eq!(tree.int_attr(n, AttrKey::SpecialCall, 0), 1);
        assert_eq!(tree.remove_attr(n, AttrKey::SpecialCall), Some(AttrValue::Int(1)));
        assert_eq!(tree.attr(n, AttrKey::SpecialCall), None);
    }

    #[test]
    fn test_set_kind_adds_jump_props() {
        let mut tree = Tree::new();
        let n = tree.new_node(Token::Nop);
        assert!(tree.jump(n).is_none());
        tree.set_kind(n, Token::Goto);
        let target = tree.new_node(Token::Target);
        tree.set_target(n, target);
        assert_eq!(tree.target(n), Some(target));
    }
}
