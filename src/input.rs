//! JSON form of parser output.
//!
//! A parse tree arrives as an ESTree-flavoured document:
//!
//! ```json
//! { "source": "demo.js",
//!   "body": [
//!     { "type": "function", "name": "f", "params": ["a"], "line": 1,
//!       "body": [ { "type": "return", "value": { "type": "name", "name": "a" } } ] }
//!   ] }
//! ```
//!
//! [`build`] replays it against an [`IrFactory`], the same calls a parser
//! would make while recognizing source.

use anyhow::{Context as _, Result, bail};
use lodestar_core::ir::{CatchClause, FunctionType, IrFactory, NodeId, Program, Token};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// A whole script.
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Source name used in diagnostics
    #[serde(default)]
    pub source: Option<String>,
    /// Top-level statements
    pub body: Vec<Stmt>,
    /// Last line of the script
    #[serde(default)]
    pub end_line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stmt {
    Expr {
        expr: Expr,
        #[serde(default)]
        line: u32,
    },
    Var {
        decls: Vec<Declarator>,
        #[serde(default)]
        line: u32,
    },
    Block {
        body: Vec<Stmt>,
        #[serde(default)]
        line: u32,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        #[serde(default, rename = "else")]
        otherwise: Option<Box<Stmt>>,
        #[serde(default)]
        line: u32,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        line: u32,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        #[serde(default)]
        line: u32,
    },
    For {
        #[serde(default)]
        init: Option<Box<Stmt>>,
        #[serde(default)]
        cond: Option<Expr>,
        #[serde(default)]
        update: Option<Expr>,
        body: Box<Stmt>,
        #[serde(default)]
        line: u32,
    },
    ForIn {
        left: Box<Stmt>,
        object: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        line: u32,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        line: u32,
    },
    Throw {
        value: Expr,
        #[serde(default)]
        line: u32,
    },
    Break {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        line: u32,
    },
    Continue {
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        line: u32,
    },
    Labelled {
        label: String,
        body: Box<Stmt>,
        #[serde(default)]
        line: u32,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        line: u32,
    },
    Try {
        block: Vec<Stmt>,
        #[serde(default)]
        handlers: Vec<Handler>,
        #[serde(default)]
        finalizer: Option<Vec<Stmt>>,
        #[serde(default)]
        line: u32,
    },
    With {
        object: Expr,
        body: Box<Stmt>,
        #[serde(default)]
        line: u32,
    },
    Function(FunctionDef),
}

#[derive(Debug, Deserialize)]
pub struct Declarator {
    pub name: String,
    #[serde(default)]
    pub init: Option<Expr>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`
    #[serde(default)]
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Deserialize)]
pub struct Handler {
    pub param: String,
    #[serde(default)]
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Deserialize)]
pub struct FunctionDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Name { name: String },
    String { value: String },
    Number { value: f64 },
    Boolean { value: bool },
    Null,
    This,
    Regexp {
        pattern: String,
        #[serde(default)]
        flags: String,
    },
    /// `op` is a token name such as `NOT`, `NEG` or `TYPEOF`
    Unary { op: String, operand: Box<Expr> },
    /// `op` is a token name such as `ADD`, `LT` or `AND`
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Member { object: Box<Expr>, property: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Assign { target: Box<Expr>, value: Box<Expr> },
    Delete { target: Box<Expr> },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Function(FunctionDef),
}

/// Reads and parses a script file.
pub fn load(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parses the JSON text of a script.
pub fn parse(content: &str) -> Result<Script> {
    Ok(serde_json::from_str(content)?)
}

/// Builds the IR program of `script`.
pub fn build(script: &Script, fallback_name: Option<String>) -> Result<Program> {
    let mut builder = Builder {
        factory: IrFactory::new(script.source.clone().or(fallback_name)),
        nesting: 0,
    };
    let statements = builder.statements(&script.body)?;
    debug!(statements = statements.len(), "built script");
    Ok(builder.factory.finish_script(&statements, script.end_line))
}

struct Builder {
    factory: IrFactory,
    /// Depth of blocks inside the current function body
    nesting: usize,
}

impl Builder {
    fn statements(&mut self, stmts: &[Stmt]) -> Result<Vec<NodeId>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.statement(stmt, &mut out)?;
        }
        Ok(out)
    }

    /// A nested statement position: one node.
    fn nested(&mut self, stmt: &Stmt, line: u32) -> Result<NodeId> {
        self.nesting += 1;
        let mut out = Vec::new();
        let result = self.statement(stmt, &mut out);
        self.nesting -= 1;
        result?;
        Ok(match out.as_slice() {
            [single] => *single,
            many => self.factory.block(many, line),
        })
    }

    fn nested_block(&mut self, stmts: &[Stmt], line: u32) -> Result<NodeId> {
        self.nesting += 1;
        let result = self.statements(stmts);
        self.nesting -= 1;
        Ok(self.factory.block(&result?, line))
    }

    fn statement(&mut self, stmt: &Stmt, out: &mut Vec<NodeId>) -> Result<()> {
        let node = match stmt {
            Stmt::Expr { expr, line } => {
                let expr = self.expr(expr)?;
                self.factory.expr_statement(expr, *line)
            }
            Stmt::Var { decls, line } => self.var(decls, *line)?,
            Stmt::Block { body, line } => self.nested_block(body, *line)?,
            Stmt::If {
                cond,
                then,
                otherwise,
                line,
            } => {
                let cond = self.expr(cond)?;
                let then = self.nested(then, *line)?;
                let otherwise = otherwise.as_deref().map(|s| self.nested(s, *line)).transpose()?;
                self.factory.if_(cond, then, otherwise, *line)
            }
            Stmt::While { cond, body, line } => {
                let cond = self.expr(cond)?;
                let body = self.nested(body, *line)?;
                self.factory.while_(cond, body, *line)
            }
            Stmt::DoWhile { body, cond, line } => {
                let body = self.nested(body, *line)?;
                let cond = self.expr(cond)?;
                self.factory.do_while(body, cond, *line)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                line,
            } => {
                let init = init.as_deref().map(|s| self.loop_head(s)).transpose()?;
                let cond = cond.as_ref().map(|e| self.expr(e)).transpose()?;
                let update = update.as_ref().map(|e| self.expr(e)).transpose()?;
                let body = self.nested(body, *line)?;
                self.factory.for_(init, cond, update, body, *line)
            }
            Stmt::ForIn {
                left,
                object,
                body,
                line,
            } => {
                let left = self.loop_head(left)?;
                let object = self.expr(object)?;
                let body = self.nested(body, *line)?;
                self.factory.for_in(left, object, body, *line)?
            }
            Stmt::Return { value, line } => {
                let value = value.as_ref().map(|e| self.expr(e)).transpose()?;
                self.factory.return_(value, *line)
            }
            Stmt::Throw { value, line } => {
                let value = self.expr(value)?;
                self.factory.throw(value, *line)
            }
            Stmt::Break { label, line } => self.factory.break_(label.as_deref(), *line),
            Stmt::Continue { label, line } => self.factory.continue_(label.as_deref(), *line),
            Stmt::Labelled { label, body, line } => {
                out.push(self.factory.label(label, *line));
                return self.statement(body, out);
            }
            Stmt::Switch {
                discriminant,
                cases,
                line,
            } => {
                let selector = self.expr(discriminant)?;
                let switch = self.factory.switch(selector, *line);
                self.nesting += 1;
                let result = self.cases(switch, cases);
                self.nesting -= 1;
                result?;
                switch
            }
            Stmt::Try {
                block,
                handlers,
                finalizer,
                line,
            } => {
                let try_block = self.nested_block(block, *line)?;
                let mut catches = Vec::with_capacity(handlers.len());
                for handler in handlers {
                    let condition = handler.guard.as_ref().map(|g| self.expr(g)).transpose()?;
                    let body = self.nested_block(&handler.body, handler.line)?;
                    catches.push(CatchClause {
                        name: handler.param.clone(),
                        condition,
                        body,
                        line: handler.line,
                    });
                }
                let finally = finalizer
                    .as_deref()
                    .map(|f| self.nested_block(f, *line))
                    .transpose()?;
                self.factory.try_(try_block, catches, finally, *line)
            }
            Stmt::With { object, body, line } => {
                let object = self.expr(object)?;
                let body = self.nested(body, *line)?;
                self.factory.with_(object, body, *line)
            }
            Stmt::Function(def) => {
                if def.name.is_empty() {
                    bail!("function statement at line {} has no name", def.line);
                }
                let function_type = if self.nesting == 0 {
                    FunctionType::Statement
                } else {
                    FunctionType::ExpressionStatement
                };
                self.function(def, function_type)?
            }
        };
        out.push(node);
        Ok(())
    }

    fn cases(&mut self, switch: NodeId, cases: &[SwitchCase]) -> Result<()> {
        for case in cases {
            let statements = self.statements(&case.body)?;
            match &case.test {
                Some(test) => {
                    let test = self.expr(test)?;
                    self.factory.case(switch, test, &statements);
                }
                None => {
                    self.factory.default_case(switch, &statements);
                }
            }
        }
        Ok(())
    }

    fn var(&mut self, decls: &[Declarator], line: u32) -> Result<NodeId> {
        let var = self.factory.var(line);
        for decl in decls {
            let init = decl.init.as_ref().map(|e| self.expr(e)).transpose()?;
            self.factory.add_var(var, &decl.name, init);
        }
        Ok(var)
    }

    /// `for (init; ...)` and `for (left in ...)` take a `var` list or a bare
    /// expression.
    fn loop_head(&mut self, stmt: &Stmt) -> Result<NodeId> {
        match stmt {
            Stmt::Var { decls, line } => self.var(decls, *line),
            Stmt::Expr { expr, .. } => self.expr(expr),
            other => bail!("invalid loop head: {:?}", other),
        }
    }

    fn function(&mut self, def: &FunctionDef, function_type: FunctionType) -> Result<NodeId> {
        let id = self.factory.begin_function(&def.name, function_type, def.line);
        for param in &def.params {
            self.factory.add_param(param);
        }
        if let Some(source) = &def.source {
            self.factory.set_source(id, source.clone());
        }
        let outer = std::mem::replace(&mut self.nesting, 0);
        let body = self.statements(&def.body);
        self.nesting = outer;
        let body = body?;
        Ok(self.factory.finish_function(id, &body, def.end_line))
    }

    fn expr(&mut self, expr: &Expr) -> Result<NodeId> {
        Ok(match expr {
            Expr::Name { name } => self.factory.name(name),
            Expr::String { value } => self.factory.string(value),
            Expr::Number { value } => self.factory.number(*value),
            Expr::Boolean { value: true } => self.factory.leaf(Token::True),
            Expr::Boolean { value: false } => self.factory.leaf(Token::False),
            Expr::Null => self.factory.leaf(Token::Null),
            Expr::This => self.factory.leaf(Token::This),
            Expr::Regexp { pattern, flags } => self.factory.regexp(pattern, flags),
            Expr::Unary { op, operand } => {
                let kind = operator(op)?;
                let operand = self.expr(operand)?;
                self.factory.unary(kind, operand)
            }
            Expr::Binary { op, left, right } => {
                let kind = operator(op)?;
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                self.factory.binary(kind, left, right)
            }
            Expr::Member { object, property } => {
                let object = self.expr(object)?;
                self.factory.get_prop(object, property)
            }
            Expr::Index { object, index } => {
                let object = self.expr(object)?;
                let index = self.expr(index)?;
                self.factory.get_elem(object, index)
            }
            Expr::Assign { target, value } => {
                let target = self.expr(target)?;
                let value = self.expr(value)?;
                self.factory.assignment(target, value)?
            }
            Expr::Delete { target } => {
                let target = self.expr(target)?;
                self.factory.delete(target)
            }
            Expr::Call { callee, args } => {
                let callee = self.expr(callee)?;
                let args = self.exprs(args)?;
                self.factory.call(callee, &args)
            }
            Expr::New { callee, args } => {
                let callee = self.expr(callee)?;
                let args = self.exprs(args)?;
                self.factory.new_expr(callee, &args)
            }
            Expr::Function(def) => self.function(def, FunctionType::Expression)?,
        })
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Result<Vec<NodeId>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }
}

fn operator(name: &str) -> Result<Token> {
    name.parse::<Token>().with_context(|| format!("unknown operator '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_core::EngineConfig;
    use lodestar_core::compiler::{ListingCodegen, compile};
    use std::io::Write;

    const SCRIPT: &str = r#"{
        "source": "demo.js",
        "body": [
            { "type": "function", "name": "sum", "params": ["a", "b"], "line": 1, "end_line": 3,
              "body": [
                { "type": "return", "line": 2,
                  "value": { "type": "binary", "op": "ADD",
                             "left": { "type": "name", "name": "a" },
                             "right": { "type": "name", "name": "b" } } }
              ] },
            { "type": "expr", "line": 4,
              "expr": { "type": "call", "callee": { "type": "name", "name": "sum" },
                        "args": [ { "type": "number", "value": 1 }, { "type": "number", "value": 2 } ] } }
        ],
        "end_line": 4
    }"#;

    #[test]
    fn test_build_and_compile() {
        let script = parse(SCRIPT).unwrap();
        let program = build(&script, None).unwrap();
        assert_eq!(program.script().source_name.as_deref(), Some("demo.js"));

        let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
        assert_eq!(unit.nested().len(), 1);
        let sum = &unit.nested()[0];
        assert_eq!(sum.name(), "sum");
        assert_eq!(sum.arg_names(), &["a".to_string(), "b".to_string()]);
        assert!(!sum.needs_activation());
    }

    #[test]
    fn test_labelled_loop_and_block_function() {
        let json = r#"{ "body": [
            { "type": "labelled", "label": "outer", "line": 1,
              "body": { "type": "while", "line": 1,
                        "cond": { "type": "boolean", "value": true },
                        "body": { "type": "block", "body": [
                            { "type": "function", "name": "inner", "body": [] },
                            { "type": "continue", "label": "outer", "line": 2 }
                        ] } } }
        ] }"#;
        let program = build(&parse(json).unwrap(), Some("loop.json".to_string())).unwrap();
        assert_eq!(program.script().source_name.as_deref(), Some("loop.json"));
        let inner = program.function_named("inner").unwrap();
        assert_eq!(inner.function_type(), Some(FunctionType::ExpressionStatement));

        let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
        assert!(unit.bytecode_len() > 0);
    }

    #[test]
    fn test_unknown_operator() {
        let json = r#"{ "body": [ { "type": "expr", "expr": { "type": "unary", "op": "FROB",
            "operand": { "type": "null" } } } ] }"#;
        let err = build(&parse(json).unwrap(), None).unwrap_err();
        assert!(err.to_string().contains("unknown operator 'FROB'"));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let json = r#"{ "body": [ { "type": "expr", "expr": { "type": "assign",
            "target": { "type": "number", "value": 1 }, "value": { "type": "null" } } } ] }"#;
        assert!(build(&parse(json).unwrap(), None).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();
        let script = load(file.path()).unwrap();
        assert_eq!(script.body.len(), 2);

        let missing = file.path().with_extension("missing");
        assert!(load(&missing).is_err());
    }
}
