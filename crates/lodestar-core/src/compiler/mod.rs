//! Compilation of IR programs into compiled units.
//!
//! # Module Structure
//!
//! - `transform`: control-flow lowering of factory trees
//! - `diagnostics`: error collection during lowering
//! - `unit`: compiled units, the unit builder and the codegen seam
//! - `listing`: a straight-line reference code generator

pub mod diagnostics;
pub mod listing;
pub mod transform;
pub mod unit;

pub use diagnostics::{Diagnostic, Diagnostics, LoweringError, Severity};
pub use listing::ListingCodegen;
pub use transform::lower;
pub use unit::{Codegen, CompiledUnit, LineEntry, UnitBuilder, assemble, compile, compile_eval};
