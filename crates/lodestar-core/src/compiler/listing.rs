//! Straight-line code generator.
//!
//! Emits every bytecode-range node of a lowered body in postorder, with
//! operands for constants, slots and jumps. It keeps no handler tables and
//! does no optimization; embedders with a real interpreter plug in their own
//! [`Codegen`].
//!
//! Encoding: one opcode byte, then
//! - jumps: `i32` absolute offset of the target
//! - names and strings: `u16` string index
//! - numbers: `u16` number index
//! - GETVAR/SETVAR: `u16` slot
//! - REGEXP: `u16` regexp index
//! - CALL/NEW: `u8` argument count

use super::unit::{Codegen, UnitBuilder};
use crate::ir::{AttrKey, FunctionId, NodeId, Program, ScriptOrFn, Token, Tree};
use crate::{Error, Result};
use rustc_hash::FxHashMap;

/// The straight-line code generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListingCodegen;

impl ListingCodegen {
    /// Creates the generator.
    pub fn new() -> Self {
        Self
    }
}

impl Codegen for ListingCodegen {
    fn generate(&mut self, program: &Program, id: FunctionId, out: &mut UnitBuilder) -> Result<()> {
        let body = program.body(id);
        let mut emitter = Emitter {
            tree: &program.tree,
            body,
            out,
            targets: FxHashMap::default(),
            fixups: Vec::new(),
            try_depth: 0,
        };
        for stmt in program.tree.children(body.root) {
            emitter.node(stmt, 0)?;
        }
        emitter.out.note_locals(body.local_count);
        emitter.patch()
    }
}

struct Emitter<'a> {
    tree: &'a Tree,
    body: &'a ScriptOrFn,
    out: &'a mut UnitBuilder,
    targets: FxHashMap<NodeId, usize>,
    fixups: Vec<(usize, NodeId)>,
    try_depth: usize,
}

impl Emitter<'_> {
    fn node(&mut self, id: NodeId, depth: usize) -> Result<()> {
        let tree = self.tree;
        let kind = tree.kind(id);
        match kind {
            Token::Target => {
                self.targets.insert(id, self.out.pc());
                return Ok(());
            }
            // Nested functions have their own units.
            Token::Function => return Ok(()),
            _ => {}
        }
        if let Some(line) = tree.line(id) {
            self.out.add_line(line);
        }

        let is_try = kind == Token::Try;
        if is_try {
            self.try_depth += 1;
            self.out.note_try_depth(self.try_depth);
        }
        for child in tree.children(id) {
            self.node(child, depth + 1)?;
        }
        if is_try {
            self.try_depth -= 1;
        }
        self.out.note_stack(depth + 1);

        if !kind.is_bytecode() {
            return Ok(());
        }
        self.out.emit(kind);
        match kind {
            Token::Goto | Token::IfEq | Token::IfNe | Token::Jsr => {
                let target = tree
                    .target(id)
                    .ok_or_else(|| Error::InternalError(format!("{} ({}) has no jump target", id, kind)))?;
                let at = self.out.emit_i32(0);
                self.fixups.push((at, target));
            }
            Token::Number => {
                let value = tree.node(id).number().unwrap_or(0.0);
                let index = self.out.add_number(value)?;
                self.out.emit_u16(index);
            }
            Token::GetVar | Token::SetVar => {
                let slot = tree.int_attr(id, AttrKey::VarIndex, -1);
                let slot = u16::try_from(slot)
                    .map_err(|_| Error::InternalError(format!("{} has no variable slot", id)))?;
                self.out.emit_u16(slot);
            }
            Token::RegExp => {
                let index = tree.int_attr(id, AttrKey::RegExpIndex, -1);
                if index < 0 || index as usize >= self.body.regexps.len() {
                    return Err(Error::InternalError(format!("{} has no regexp literal", id)));
                }
                self.out.emit_u16(index as u16);
            }
            Token::Call | Token::New => {
                let argc = tree.children(id).count().saturating_sub(1);
                self.out.note_callee_args(argc);
                let argc = u8::try_from(argc)
                    .map_err(|_| Error::RangeError(format!("too many arguments in call at {}", id)))?;
                self.out.emit_u8(argc);
            }
            _ => {
                if let Some(s) = tree.string(id) {
                    let index = self.out.add_string(s)?;
                    self.out.emit_u16(index);
                }
            }
        }
        Ok(())
    }

    fn patch(&mut self) -> Result<()> {
        for &(at, target) in &self.fixups {
            let pc = self
                .targets
                .get(&target)
                .copied()
                .ok_or_else(|| Error::InternalError(format!("jump target {} was never placed", target)))?;
            let pc = i32::try_from(pc).map_err(|_| Error::RangeError("function too large".to_string()))?;
            self.out.patch_i32(at, pc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::config::EngineConfig;
    use crate::ir::{FunctionType, IrFactory};

    fn read_i32(code: &[u8], at: usize) -> i32 {
        i32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
    }

    #[test]
    fn test_script_expression_statement() {
        let mut f = IrFactory::new(None);
        let a = f.name("a");
        let stmt = f.expr_statement(a, 1);
        let program = f.finish_script(&[stmt], 1);
        let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
        assert_eq!(
            unit.bytecode(),
            &[Token::Name.as_u8(), 0, 0, Token::Popv.as_u8()]
        );
        assert_eq!(unit.strings(), &["a"]);
        assert_eq!(unit.line_at(0), Some(1));
    }

    #[test]
    fn test_loop_jumps_are_patched() {
        let mut f = IrFactory::new(None);
        let body = f.block(&[], 1);
        let cond = f.leaf(Token::True);
        let lp = f.while_(cond, body, 1);
        let program = f.finish_script(&[lp], 1);
        let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
        let code = unit.bytecode();
        // GOTO cond; body: (empty); cond: TRUE IFEQ body
        assert_eq!(code[0], Token::Goto.as_u8());
        assert_eq!(read_i32(code, 1), 5);
        assert_eq!(code[5], Token::True.as_u8());
        assert_eq!(code[6], Token::IfEq.as_u8());
        assert_eq!(read_i32(code, 7), 5);
        assert_eq!(code.len(), 11);
    }

    #[test]
    fn test_function_locals_use_slots() {
        let mut f = IrFactory::new(None);
        let id = f.begin_function("f", FunctionType::Statement, 1);
        f.add_param("a");
        let callee = f.name("g");
        let a = f.name("a");
        let one = f.number(1.0);
        let call = f.call(callee, &[a, one]);
        let stmt = f.expr_statement(call, 2);
        let stub = f.finish_function(id, &[stmt], 3);
        let program = f.finish_script(&[stub], 3);
        let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
        let func = &unit.nested()[0];
        assert_eq!(
            func.bytecode(),
            &[
                Token::Name.as_u8(),
                0,
                0,
                Token::GetVar.as_u8(),
                0,
                0,
                Token::Number.as_u8(),
                0,
                0,
                Token::Call.as_u8(),
                2,
                Token::Pop.as_u8(),
                Token::Return.as_u8(),
            ]
        );
        assert_eq!(func.max_callee_args(), 2);
        assert_eq!(func.numbers(), &[1.0]);
        // the script itself only holds the function
        assert!(unit.bytecode().is_empty());
    }

    #[test]
    fn test_try_depth_is_recorded() {
        let mut f = IrFactory::new(None);
        let value = f.number(1.0);
        let throw = f.throw(value, 1);
        let try_block = f.block(&[throw], 1);
        let fin_call = f.name("x");
        let fin_stmt = f.expr_statement(fin_call, 1);
        let finally = f.block(&[fin_stmt], 1);
        let pn = f.try_(try_block, Vec::new(), Some(finally), 1);
        let program = f.finish_script(&[pn], 1);
        let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen).unwrap();
        assert_eq!(unit.max_try_depth(), 1);
        assert_eq!(unit.max_locals(), 1);
    }
}
