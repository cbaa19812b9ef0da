// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # lodestar-core
//!
//! The compile-and-invoke core of a classic (ES3-era) script engine.
//!
//! ## Overview
//!
//! This crate sits between a parser and a bytecode interpreter:
//! - An arena-based IR tree and the shared token/opcode space
//! - A factory that builds trees the way a parser does
//! - The control-flow lowering pass (labels, loops, switch, `with`,
//!   try/finally, local-slot resolution)
//! - Compiled units and a pluggable code generator seam
//! - The function invocation protocol: activation records, closures,
//!   the `arguments` object, `apply`/`call` and the base function object
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lodestar_core::compiler::{ListingCodegen, compile};
//! use lodestar_core::ir::IrFactory;
//! use lodestar_core::EngineConfig;
//!
//! let mut f = IrFactory::new(Some("demo.js".into()));
//! let x = f.name("x");
//! let stmt = f.expr_statement(x, 1);
//! let program = f.finish_script(&[stmt], 1);
//! let unit = compile(program, &EngineConfig::default(), &mut ListingCodegen)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod config;
pub mod ir;
pub mod runtime;

// Re-exports for convenience
pub use compiler::{CompiledUnit, Diagnostic, Diagnostics};
pub use config::EngineConfig;
pub use runtime::context::Context;
pub use runtime::value::Value;

/// Errors raised while compiling or running scripts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Syntax error while building a tree
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// Type error during execution
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (undefined variable)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (out of bounds, table overflow)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal engine error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// I/O error
    #[error("IOError: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Lowering reported errors; no unit was produced
    #[error("compilation failed with {count} error(s):\n{0}", count = .0.error_count())]
    Compile(Diagnostics),

    /// A script-level `throw`
    #[error("uncaught exception: {0}")]
    Thrown(Value),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::TypeError("x is not a function".to_string()).to_string(),
            "TypeError: x is not a function"
        );
        assert_eq!(Error::Thrown(Value::from(1)).to_string(), "uncaught exception: 1");
    }

    #[test]
    fn test_compile_error_lists_diagnostics() {
        let mut diagnostics = Diagnostics::with_limit(10);
        diagnostics.error("undefined label 'L'", Some("a.js"), Some(3));
        let message = Error::Compile(diagnostics).to_string();
        assert!(message.starts_with("compilation failed with 1 error(s)"));
        assert!(message.contains("a.js:3: error: undefined label 'L'"));
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
