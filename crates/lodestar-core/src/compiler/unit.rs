//! Compiled units.
//!
//! A [`CompiledUnit`] is the immutable output of compiling one script or
//! function body. Units are built through a [`UnitBuilder`], filled by a
//! [`Codegen`] implementation, and shared behind `Arc` by every closure
//! created from them.

use super::transform::lower;
use crate::config::{EngineConfig, LanguageVersion};
use crate::ir::{FunctionId, FunctionType, Program, RegExpLiteral, ScriptOrFn, Token};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps a bytecode offset to a source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    /// Offset of the first instruction of the line
    pub pc: u32,
    /// Source line
    pub line: u32,
}

/// Compiled form of a script or function body.
#[derive(Debug)]
pub struct CompiledUnit {
    name: String,
    encoded_source: Option<String>,
    source_name: Option<String>,
    needs_activation: bool,
    check_this: bool,
    from_eval_code: bool,
    use_dynamic_scope: bool,
    function_type: Option<FunctionType>,
    bytecode: Vec<u8>,
    strings: Vec<String>,
    numbers: Vec<f64>,
    regexps: Vec<RegExpLiteral>,
    nested: Vec<Arc<CompiledUnit>>,
    arg_names: Vec<String>,
    arg_count: usize,
    max_vars: usize,
    max_locals: usize,
    max_stack: usize,
    max_try_depth: usize,
    max_callee_args: usize,
    lines: Vec<LineEntry>,
    language_version: LanguageVersion,
    base_line: Option<u32>,
    end_line: Option<u32>,
}

impl CompiledUnit {
    /// Function name; empty for scripts and anonymous functions.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source text of the body.
    pub fn encoded_source(&self) -> Option<&str> {
        self.encoded_source.as_deref()
    }

    /// Source file name.
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Invocations need a heap activation record.
    pub fn needs_activation(&self) -> bool {
        self.needs_activation
    }

    /// Invocations coerce a null receiver to the global object.
    pub fn check_this(&self) -> bool {
        self.check_this
    }

    /// Compiled from code passed to `eval`.
    pub fn from_eval_code(&self) -> bool {
        self.from_eval_code
    }

    /// Free names resolve in the caller's scope.
    pub fn use_dynamic_scope(&self) -> bool {
        self.use_dynamic_scope
    }

    /// Function type, `None` for scripts.
    pub fn function_type(&self) -> Option<FunctionType> {
        self.function_type
    }

    /// Returns true for function units.
    pub fn is_function(&self) -> bool {
        self.function_type.is_some()
    }

    /// Encoded instructions.
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Instruction buffer length in bytes.
    pub fn bytecode_len(&self) -> usize {
        self.bytecode.len()
    }

    /// String constants.
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Number constants.
    pub fn numbers(&self) -> &[f64] {
        &self.numbers
    }

    /// Regular expression literals.
    pub fn regexps(&self) -> &[RegExpLiteral] {
        &self.regexps
    }

    /// Units of nested functions, in source order.
    pub fn nested(&self) -> &[Arc<CompiledUnit>] {
        &self.nested
    }

    /// Formal parameter names (duplicates included) followed by variables.
    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    /// Number of formal parameters.
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Parameter or variable name of a slot.
    pub fn arg_name(&self, slot: usize) -> Option<&str> {
        self.arg_names.get(slot).map(String::as_str)
    }

    /// Parameter and variable slot count.
    pub fn max_vars(&self) -> usize {
        self.max_vars
    }

    /// Interpreter temporaries.
    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    /// Maximum operand stack depth.
    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Maximum try nesting.
    pub fn max_try_depth(&self) -> usize {
        self.max_try_depth
    }

    /// Largest argument count of a call in the body.
    pub fn max_callee_args(&self) -> usize {
        self.max_callee_args
    }

    /// Line table sorted by offset.
    pub fn lines(&self) -> &[LineEntry] {
        &self.lines
    }

    /// Source line of the instruction at `pc`.
    pub fn line_at(&self, pc: usize) -> Option<u32> {
        let index = self.lines.partition_point(|e| e.pc as usize <= pc);
        index.checked_sub(1).map(|i| self.lines[i].line)
    }

    /// Language version the unit was compiled for.
    pub fn language_version(&self) -> LanguageVersion {
        self.language_version
    }

    /// First line of the body.
    pub fn base_line(&self) -> Option<u32> {
        self.base_line
    }

    /// Last line of the body.
    pub fn end_line(&self) -> Option<u32> {
        self.end_line
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Accumulates instructions and constants for one unit.
#[derive(Debug, Default)]
pub struct UnitBuilder {
    bytecode: Vec<u8>,
    strings: Vec<String>,
    string_index: FxHashMap<String, u16>,
    numbers: Vec<f64>,
    lines: Vec<LineEntry>,
    max_locals: usize,
    max_stack: usize,
    max_try_depth: usize,
    max_callee_args: usize,
}

impl UnitBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset.
    pub fn pc(&self) -> usize {
        self.bytecode.len()
    }

    /// Emits an opcode and returns its offset.
    ///
    /// # Panics
    ///
    /// Panics if `op` is outside the bytecode range.
    pub fn emit(&mut self, op: Token) -> usize {
        assert!(op.is_bytecode(), "{} is not an opcode", op);
        let pc = self.pc();
        self.bytecode.push(op.as_u8());
        pc
    }

    /// Emits a one-byte operand.
    pub fn emit_u8(&mut self, value: u8) {
        self.bytecode.push(value);
    }

    /// Emits a two-byte operand.
    pub fn emit_u16(&mut self, value: u16) {
        self.bytecode.extend_from_slice(&value.to_le_bytes());
    }

    /// Emits a four-byte operand and returns its offset.
    pub fn emit_i32(&mut self, value: i32) -> usize {
        let pc = self.pc();
        self.bytecode.extend_from_slice(&value.to_le_bytes());
        pc
    }

    /// Overwrites a four-byte operand.
    pub fn patch_i32(&mut self, at: usize, value: i32) {
        self.bytecode[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Interns a string constant.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        if let Some(&index) = self.string_index.get(value) {
            return Ok(index);
        }
        let index = u16::try_from(self.strings.len())
            .map_err(|_| Error::RangeError("too many string constants".to_string()))?;
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        Ok(index)
    }

    /// Adds a number constant.
    pub fn add_number(&mut self, value: f64) -> Result<u16> {
        if let Some(index) = self.numbers.iter().position(|n| n.to_bits() == value.to_bits()) {
            return Ok(index as u16);
        }
        let index = u16::try_from(self.numbers.len())
            .map_err(|_| Error::RangeError("too many number constants".to_string()))?;
        self.numbers.push(value);
        Ok(index)
    }

    /// Records that code for `line` starts at the current offset.
    pub fn add_line(&mut self, line: u32) {
        let pc = self.pc() as u32;
        match self.lines.last_mut() {
            Some(last) if last.line == line => {}
            Some(last) if last.pc == pc => last.line = line,
            _ => self.lines.push(LineEntry { pc, line }),
        }
    }

    /// Notes an operand stack depth.
    pub fn note_stack(&mut self, depth: usize) {
        self.max_stack = self.max_stack.max(depth);
    }

    /// Notes a try nesting depth.
    pub fn note_try_depth(&mut self, depth: usize) {
        self.max_try_depth = self.max_try_depth.max(depth);
    }

    /// Notes the argument count of a call.
    pub fn note_callee_args(&mut self, count: usize) {
        self.max_callee_args = self.max_callee_args.max(count);
    }

    /// Notes a temporary count.
    pub fn note_locals(&mut self, count: usize) {
        self.max_locals = self.max_locals.max(count);
    }

    /// Builds the unit for `body`.
    pub fn finish(
        self,
        body: &ScriptOrFn,
        nested: Vec<Arc<CompiledUnit>>,
        config: &EngineConfig,
        from_eval_code: bool,
    ) -> CompiledUnit {
        CompiledUnit {
            name: body.name.clone(),
            encoded_source: body.encoded_source.clone(),
            source_name: body.source_name.clone(),
            needs_activation: body.requires_activation,
            check_this: body.check_this,
            from_eval_code,
            use_dynamic_scope: config.dynamic_scope,
            function_type: body.function_type(),
            bytecode: self.bytecode,
            strings: self.strings,
            numbers: self.numbers,
            regexps: body.regexps.clone(),
            nested,
            arg_names: body.vars.names().to_vec(),
            arg_count: body.vars.param_count(),
            max_vars: body.vars.len(),
            max_locals: self.max_locals.max(body.local_count),
            max_stack: self.max_stack,
            max_try_depth: self.max_try_depth,
            max_callee_args: self.max_callee_args,
            lines: self.lines,
            language_version: config.language_version,
            base_line: body.base_line,
            end_line: body.end_line,
        }
    }
}

/// Emits instructions for one lowered body.
pub trait Codegen {
    /// Fills `out` with the code of body `id`.
    fn generate(&mut self, program: &Program, id: FunctionId, out: &mut UnitBuilder) -> Result<()>;
}

/// Lowers `program` and assembles the unit tree of its script.
pub fn compile(program: Program, config: &EngineConfig, codegen: &mut dyn Codegen) -> Result<Arc<CompiledUnit>> {
    compile_inner(program, config, codegen, false)
}

/// Like [`compile`], for code passed to `eval`.
pub fn compile_eval(program: Program, config: &EngineConfig, codegen: &mut dyn Codegen) -> Result<Arc<CompiledUnit>> {
    compile_inner(program, config, codegen, true)
}

fn compile_inner(
    mut program: Program,
    config: &EngineConfig,
    codegen: &mut dyn Codegen,
    from_eval_code: bool,
) -> Result<Arc<CompiledUnit>> {
    let diagnostics = lower(&mut program, config);
    if diagnostics.has_errors() {
        return Err(Error::Compile(diagnostics));
    }
    assemble(&program, FunctionId::SCRIPT, config, codegen, from_eval_code)
}

/// Assembles the unit of body `id` and, recursively, its nested functions.
///
/// `program` must already be lowered.
pub fn assemble(
    program: &Program,
    id: FunctionId,
    config: &EngineConfig,
    codegen: &mut dyn Codegen,
    from_eval_code: bool,
) -> Result<Arc<CompiledUnit>> {
    let body = program.body(id);
    let nested = body
        .functions
        .iter()
        .map(|&f| assemble(program, f, config, codegen, from_eval_code))
        .collect::<Result<Vec<_>>>()?;

    let mut builder = UnitBuilder::new();
    codegen.generate(program, id, &mut builder)?;
    let unit = builder.finish(body, nested, config, from_eval_code);
    debug!(
        function = %id,
        name = unit.name(),
        bytes = unit.bytecode_len(),
        activation = unit.needs_activation(),
        "assembled unit"
    );
    Ok(Arc::new(unit))
}
