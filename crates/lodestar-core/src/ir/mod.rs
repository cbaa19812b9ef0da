//! Intermediate representation shared by the parser, the lowering pass and
//! code generation.
//!
//! # Module Structure
//!
//! - `token`: the flat token/opcode space
//! - `node`, `tree`: arena-backed nodes and structural edits
//! - `props`: per-kind and keyed node attributes
//! - `script`: script/function metadata and variable tables
//! - `factory`: the tree construction API used by parsers
//! - `dump`: textual rendering of a tree

pub mod dump;
pub mod factory;
pub mod node;
pub mod props;
pub mod script;
pub mod token;
pub mod tree;

pub use factory::{CatchClause, IrFactory};
pub use node::{Node, NodeId, Payload};
pub use props::{AttrKey, AttrValue, JumpProps, Props, SpecialCall, SwitchProps};
pub use script::{FunctionId, FunctionType, Program, RegExpLiteral, ScriptKind, ScriptOrFn, VariableTable};
pub use token::Token;
pub use tree::Tree;
