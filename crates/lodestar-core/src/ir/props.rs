//! Per-kind node attributes.
//!
//! Jump-capable nodes carry their targets in a [`JumpProps`], switches in a
//! [`SwitchProps`], function nodes their [`FunctionId`]. The variant is picked
//! from the node kind at construction. Scalars that cut across kinds go in
//! the small keyed [`Attrs`] list.

use super::NodeId;
use super::script::FunctionId;
use super::token::Token;

/// Targets of a jump-capable node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpProps {
    /// Break target for loops, labels and switches; destination for
    /// GOTO/IFEQ/IFNE/JSR; catch target for TRY.
    pub target: Option<NodeId>,
    /// Continue target for loops and labels that wrap a loop.
    pub continue_target: Option<NodeId>,
    /// Finally target for TRY.
    pub finally_target: Option<NodeId>,
    /// Label name for LABEL nodes.
    pub label: Option<String>,
}

/// Dispatch data of a lowered switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchProps {
    /// Break target placed after the flattened clauses.
    pub target: Option<NodeId>,
    /// CASE nodes in source order.
    pub cases: Vec<NodeId>,
    /// The DEFAULT node, if any.
    pub default: Option<NodeId>,
}

/// Kind-specific attributes of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Props {
    /// No kind-specific attributes
    #[default]
    None,
    /// Jump targets
    Jump(JumpProps),
    /// Switch dispatch
    Switch(SwitchProps),
    /// Function reference for FUNCTION nodes
    Function(FunctionId),
}

impl Props {
    /// The default attributes for a node of the given kind.
    pub fn for_kind(kind: Token) -> Props {
        match kind {
            Token::Switch => Props::Switch(SwitchProps::default()),
            k if k.is_jump() => Props::Jump(JumpProps::default()),
            _ => Props::None,
        }
    }
}

/// Keys of the orthogonal attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    /// [`SpecialCall`] classification of CALL/NEW nodes
    SpecialCall,
    /// Variable table index of GETVAR/SETVAR nodes
    VarIndex,
    /// Regexp table index of REGEXP nodes
    RegExpIndex,
    /// ENUM_INIT node driving ENUM_NEXT/ENUM_ID/ENUM_DONE
    EnumInit,
}

/// Value stored under an [`AttrKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrValue {
    /// Integer datum
    Int(i32),
    /// Reference to another node of the same tree
    Node(NodeId),
}

/// Call sites that can observe or mutate the caller's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SpecialCall {
    /// A call to `eval`
    Eval = 1,
    /// A call to `With`
    With = 2,
    /// A call to a method named `exec`
    Exec = 3,
}

impl SpecialCall {
    /// Classifies the name of a callee referenced directly.
    pub fn from_name(name: &str) -> Option<SpecialCall> {
        match name {
            "eval" => Some(SpecialCall::Eval),
            "With" => Some(SpecialCall::With),
            _ => None,
        }
    }

    /// Classifies the property name of a callee of the form `object.name`.
    pub fn from_method(name: &str) -> Option<SpecialCall> {
        match name {
            "exec" => Some(SpecialCall::Exec),
            _ => None,
        }
    }

    /// Decodes the integer stored in the attribute list.
    pub fn from_i32(value: i32) -> Option<SpecialCall> {
        match value {
            1 => Some(SpecialCall::Eval),
            2 => Some(SpecialCall::With),
            3 => Some(SpecialCall::Exec),
            _ => None,
        }
    }
}

/// Small keyed attribute list.
///
/// Nodes rarely carry more than one or two entries, so a vector beats a map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(Vec<(AttrKey, AttrValue)>);

impl Attrs {
    /// Returns true when no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up an attribute.
    pub fn get(&self, key: AttrKey) -> Option<AttrValue> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, key: AttrKey, value: AttrValue) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Removes an attribute, returning its value.
    pub fn remove(&mut self, key: AttrKey) -> Option<AttrValue> {
        let pos = self.0.iter().position(|(k, _)| *k == key)?;
        Some(self.0.swap_remove(pos).1)
    }

    /// Iterates over the set attributes.
    pub fn iter(&self) -> impl Iterator<Item = (AttrKey, AttrValue)> + '_ {
        self.0.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_for_kind() {
        assert!(matches!(Props::for_kind(Token::Loop), Props::Jump(_)));
        assert!(matches!(Props::for_kind(Token::Break), Props::Jump(_)));
        assert!(matches!(Props::for_kind(Token::Try), Props::Jump(_)));
        assert!(matches!(Props::for_kind(Token::Switch), Props::Switch(_)));
        assert_eq!(Props::for_kind(Token::Name), Props::None);
    }

    #[test]
    fn test_attrs_set_get_remove() {
        let mut attrs = Attrs::default();
        assert!(attrs.is_empty());
        attrs.set(AttrKey::VarIndex, AttrValue::Int(3));
        attrs.set(AttrKey::VarIndex, AttrValue::Int(4));
        assert_eq!(attrs.get(AttrKey::VarIndex), Some(AttrValue::Int(4)));
        assert_eq!(attrs.iter().count(), 1);
        assert_eq!(attrs.remove(AttrKey::VarIndex), Some(AttrValue::Int(4)));
        assert_eq!(attrs.remove(AttrKey::VarIndex), None);
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_special_call_names() {
        assert_eq!(SpecialCall::from_name("eval"), Some(SpecialCall::Eval));
        assert_eq!(SpecialCall::from_name("With"), Some(SpecialCall::With));
        assert_eq!(SpecialCall::from_name("with"), None);
        assert_eq!(SpecialCall::from_i32(SpecialCall::With as i32), Some(SpecialCall::With));
    }
}
