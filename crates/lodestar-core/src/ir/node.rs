//! IR nodes and their handles.

use super::props::{Attrs, Props};
use super::token::Token;
use std::fmt;

/// Stable handle of a node inside a [`Tree`](super::Tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a handle from an arena index.
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the arena index of this handle.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scalar datum attached to a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No datum
    #[default]
    None,
    /// Numeric literal
    Number(f64),
    /// Identifier or string literal
    String(String),
    /// Integer datum
    Int(i32),
}

/// A node of the intermediate representation.
///
/// Structural links (`first`, `last`, `next`) are owned by the tree and are
/// only changed through [`Tree`](super::Tree) operations.
#[derive(Debug, Clone)]
pub struct Node {
    pub(super) kind: Token,
    pub(super) first: Option<NodeId>,
    pub(super) last: Option<NodeId>,
    pub(super) next: Option<NodeId>,
    pub(super) payload: Payload,
    pub(super) line: Option<u32>,
    pub(super) props: Props,
    pub(super) attrs: Attrs,
}

impl Node {
    /// Creates a detached node with the default attributes for its kind.
    pub fn new(kind: Token) -> Self {
        Self {
            kind,
            first: None,
            last: None,
            next: None,
            payload: Payload::None,
            line: None,
            props: Props::for_kind(kind),
            attrs: Attrs::default(),
        }
    }

    /// The node kind.
    pub fn kind(&self) -> Token {
        self.kind
    }

    /// First child.
    pub fn first(&self) -> Option<NodeId> {
        self.first
    }

    /// Last child.
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// Next sibling.
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// Scalar datum.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Source line, if known.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// Kind-specific attributes.
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Keyed attributes.
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    /// String datum, for names and string literals.
    pub fn string(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric datum.
    pub fn number(&self) -> Option<f64> {
        match self.payload {
            Payload::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Returns a copy of this node with no structural links.
    pub fn detached_copy(&self) -> Node {
        Node {
            first: None,
            last: None,
            next: None,
            ..self.clone()
        }
    }
}
