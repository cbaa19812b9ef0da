//! Script and function metadata.
//!
//! A [`Program`] owns the node arena of one compilation plus a
//! [`ScriptOrFn`] record per script or function body. Entry 0 is always the
//! top-level script.

use super::NodeId;
use super::tree::Tree;
use rustc_hash::FxHashMap;
use std::fmt;

/// Index of a script or function inside a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    /// The top-level script.
    pub const SCRIPT: FunctionId = FunctionId(0);

    /// Creates an id from a program index.
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the program index of this id.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// How a function was introduced in its enclosing code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionType {
    /// `function f() {}` as a declaration
    Statement = 1,
    /// `function () {}` inside an expression
    Expression = 2,
    /// A function expression used as a statement inside a block
    ExpressionStatement = 3,
}

impl FunctionType {
    /// Lower-case label used in dumps.
    pub fn label(self) -> &'static str {
        match self {
            FunctionType::Statement => "statement",
            FunctionType::Expression => "expression",
            FunctionType::ExpressionStatement => "expression-statement",
        }
    }
}

/// Whether a body is the top-level script or a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Top-level script
    Script,
    /// Function body
    Function(FunctionType),
}

/// Parameters followed by declared variables.
///
/// Duplicate parameter names all keep their position, but name lookups
/// resolve to the last occurrence.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    names: Vec<String>,
    param_count: usize,
    index: FxHashMap<String, usize>,
}

impl VariableTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a formal parameter.
    ///
    /// # Panics
    ///
    /// Panics if variables were already declared.
    pub fn add_parameter(&mut self, name: &str) {
        assert_eq!(
            self.param_count,
            self.names.len(),
            "parameters must be declared before variables"
        );
        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.param_count += 1;
    }

    /// Declares a variable. Returns false if the name is already known.
    pub fn add_local(&mut self, name: &str) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        true
    }

    /// Removes a declared variable. Parameters are never removed.
    pub fn remove_local(&mut self, name: &str) -> bool {
        match self.index.get(name) {
            Some(&i) if i >= self.param_count => {
                self.names.remove(i);
                self.reindex();
                true
            }
            _ => false,
        }
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, name) in self.names.iter().enumerate() {
            self.index.insert(name.clone(), i);
        }
    }

    /// Slot index of a name.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns true if `name` is a parameter.
    pub fn is_parameter(&self, name: &str) -> bool {
        self.get(name).is_some_and(|i| i < self.param_count)
    }

    /// Number of formal parameters, duplicates included.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// All names in slot order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Total slot count.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the table holds no name.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A regular expression literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExpLiteral {
    /// Pattern source
    pub source: String,
    /// Flags such as `gi`
    pub flags: String,
}

/// Metadata of a script or function body.
#[derive(Debug, Clone)]
pub struct ScriptOrFn {
    /// Index of this body in its program
    pub id: FunctionId,
    /// Script or function
    pub kind: ScriptKind,
    /// Function name, empty for anonymous functions and scripts
    pub name: String,
    /// Root node whose children are the body statements
    pub root: NodeId,
    /// Enclosing body
    pub parent: Option<FunctionId>,
    /// Parameters and declared variables
    pub vars: VariableTable,
    /// The body needs a heap activation object
    pub requires_activation: bool,
    /// `this` must be coerced on entry
    pub check_this: bool,
    /// The body contains a try with a finally clause
    pub has_finally: bool,
    /// Nested functions in source order
    pub functions: Vec<FunctionId>,
    /// Regular expression literals
    pub regexps: Vec<RegExpLiteral>,
    /// Interpreter temporaries reserved by lowering
    pub local_count: usize,
    /// Source file name
    pub source_name: Option<String>,
    /// Source text of the body
    pub encoded_source: Option<String>,
    /// First line of the body
    pub base_line: Option<u32>,
    /// Last line of the body
    pub end_line: Option<u32>,
}

impl ScriptOrFn {
    /// Creates an empty record.
    pub fn new(id: FunctionId, kind: ScriptKind, name: impl Into<String>, root: NodeId) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            root,
            parent: None,
            vars: VariableTable::new(),
            requires_activation: false,
            check_this: false,
            has_finally: false,
            functions: Vec::new(),
            regexps: Vec::new(),
            local_count: 0,
            source_name: None,
            encoded_source: None,
            base_line: None,
            end_line: None,
        }
    }

    /// Returns true for function bodies.
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ScriptKind::Function(_))
    }

    /// Function type, `None` for scripts.
    pub fn function_type(&self) -> Option<FunctionType> {
        match self.kind {
            ScriptKind::Function(t) => Some(t),
            ScriptKind::Script => None,
        }
    }

    /// Position of a nested function in this body's function table.
    pub fn nested_index(&self, id: FunctionId) -> Option<usize> {
        self.functions.iter().position(|&f| f == id)
    }
}

/// A parsed compilation: node arena plus per-body metadata.
#[derive(Debug, Clone)]
pub struct Program {
    /// Node arena shared by all bodies
    pub tree: Tree,
    bodies: Vec<ScriptOrFn>,
}

impl Program {
    /// Creates a program holding an empty top-level script.
    pub fn new(source_name: Option<String>) -> Self {
        let mut tree = Tree::new();
        let root = tree.new_node(super::Token::Script);
        let mut script = ScriptOrFn::new(FunctionId::SCRIPT, ScriptKind::Script, "", root);
        script.source_name = source_name;
        Self {
            tree,
            bodies: vec![script],
        }
    }

    /// The top-level script.
    pub fn script(&self) -> &ScriptOrFn {
        &self.bodies[0]
    }

    /// Borrows a body.
    pub fn body(&self, id: FunctionId) -> &ScriptOrFn {
        &self.bodies[id.index()]
    }

    /// Mutably borrows a body.
    pub fn body_mut(&mut self, id: FunctionId) -> &mut ScriptOrFn {
        &mut self.bodies[id.index()]
    }

    /// Registers a new body and returns its id.
    pub fn add_body(&mut self, kind: ScriptKind, name: impl Into<String>, root: NodeId) -> FunctionId {
        let id = FunctionId::new(self.bodies.len());
        self.bodies.push(ScriptOrFn::new(id, kind, name, root));
        id
    }

    /// All bodies, script first.
    pub fn bodies(&self) -> &[ScriptOrFn] {
        &self.bodies
    }

    /// Finds a function by name.
    pub fn function_named(&self, name: &str) -> Option<&ScriptOrFn> {
        self.bodies.iter().find(|b| b.is_function() && b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_parameters_resolve_to_last() {
        let mut vars = VariableTable::new();
        vars.add_parameter("a");
        vars.add_parameter("a");
        vars.add_parameter("b");
        assert_eq!(vars.param_count(), 3);
        assert_eq!(vars.get("a"), Some(1));
        assert_eq!(vars.get("b"), Some(2));
        assert_eq!(vars.names(), &["a", "a", "b"]);
    }

    #[test]
    fn test_locals_after_parameters() {
        let mut vars = VariableTable::new();
        vars.add_parameter("x");
        assert!(vars.add_local("y"));
        assert!(!vars.add_local("x"));
        assert!(!vars.add_local("y"));
        assert_eq!(vars.get("y"), Some(1));
        assert!(vars.is_parameter("x"));
        assert!(!vars.is_parameter("y"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_remove_local_keeps_parameters() {
        let mut vars = VariableTable::new();
        vars.add_parameter("p");
        vars.add_local("a");
        vars.add_local("b");
        assert!(!vars.remove_local("p"));
        assert!(vars.remove_local("a"));
        assert_eq!(vars.get("a"), None);
        assert_eq!(vars.get("b"), Some(1));
        assert!(!vars.remove_local("missing"));
    }

    #[test]
    #[should_panic(expected = "parameters must be declared before variables")]
    fn test_parameter_after_local_panics() {
        let mut vars = VariableTable::new();
        vars.add_local("v");
        vars.add_parameter("p");
    }

    #[test]
    fn test_program_starts_with_script() {
        let program = Program::new(Some("test.js".into()));
        let script = program.script();
        assert_eq!(script.id, FunctionId::SCRIPT);
        assert!(!script.is_function());
        assert_eq!(script.function_type(), None);
        assert_eq!(program.tree.kind(script.root), crate::ir::Token::Script);
        assert_eq!(script.source_name.as_deref(), Some("test.js"));
    }
}
