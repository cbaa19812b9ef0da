//! Script runtime: values, objects and the function invocation protocol.
//!
//! # Module Structure
//!
//! - `value`: script values
//! - `object`: the object model and ordinary objects
//! - `scope`: scope chains and `with` scopes
//! - `activation`: activation records and the per-thread call stack
//! - `arguments`: the `arguments` object
//! - `function`: function objects, `apply` and `call`
//! - `context`: engine context, call frames and the interpreter seam

pub mod activation;
pub mod arguments;
pub mod context;
pub mod function;
pub mod object;
pub mod scope;
pub mod value;

pub use activation::{Activation, ActivationGuard};
pub use arguments::ArgumentsObject;
pub use context::{Context, Frame, Interpreter};
pub use function::{Callable, FunctionBase, FunctionObject, NativeFunction, apply_or_call, get_this, init_function};
pub use object::{ArrayObject, ObjectCore, PlainObject, Property, PropertyMap, Scriptable};
pub use scope::WithScope;
pub use value::{ObjectRef, Value};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::Result;
    use crate::compiler::{ListingCodegen, compile};
    use crate::config::EngineConfig;
    use crate::ir::{FunctionType, IrFactory};
    use std::sync::Arc;

    pub fn context() -> Context {
        context_with(EngineConfig::default())
    }

    pub fn context_with(config: EngineConfig) -> Context {
        context_with_interpreter(config, |_: &Context, _: &mut Frame| Ok(Value::Undefined))
    }

    pub fn context_with_interpreter<F>(config: EngineConfig, interpreter: F) -> Context
    where
        F: Fn(&Context, &mut Frame) -> Result<Value> + Send + Sync + 'static,
    {
        Context::new(config, interpreter)
    }

    /// Compiles `function name(params) { var vars; }` and instantiates it in
    /// the global scope. With `activation` the body also mentions
    /// `arguments`.
    pub fn compile_function(
        cx: &Context,
        name: &str,
        params: &[&str],
        vars: &[&str],
        activation: bool,
    ) -> Arc<FunctionObject> {
        let mut f = IrFactory::new(None);
        let id = f.begin_function(name, FunctionType::Statement, 1);
        for param in params {
            f.add_param(param);
        }
        let mut body = Vec::new();
        if !vars.is_empty() {
            let var = f.var(1);
            for v in vars {
                f.add_var(var, v, None);
            }
            body.push(var);
        }
        if activation {
            let arguments = f.name("arguments");
            body.push(f.expr_statement(arguments, 1));
        }
        let stub = f.finish_function(id, &body, 2);
        let program = f.finish_script(&[stub], 2);
        let unit = compile(program, cx.config(), &mut ListingCodegen).unwrap();
        assert_eq!(unit.nested()[0].needs_activation(), activation);
        FunctionObject::instantiate(cx, unit.nested()[0].clone(), cx.global().clone(), false)
    }
}
