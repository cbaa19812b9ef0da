//! Execution context, call frames and the interpreter seam.

use super::activation::Activation;
use super::function::{FunctionObject, NativeFunction, apply_or_call, init_function};
use super::object::{ArrayObject, PlainObject, Property, Scriptable, has_property, top_level_scope};
use super::scope;
use super::value::{ObjectRef, Value};
use crate::compiler::CompiledUnit;
use crate::config::EngineConfig;
use crate::ir::FunctionType;
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Executes compiled units.
///
/// The invocation protocol prepares a [`Frame`] (scope, receiver,
/// arguments, activation) and hands it to the interpreter; the activation,
/// if any, is pushed for exactly the duration of `interpret`.
pub trait Interpreter: Send + Sync {
    /// Runs the unit of `frame` to completion.
    fn interpret(&self, cx: &Context, frame: &mut Frame) -> Result<Value>;
}

impl<F> Interpreter for F
where
    F: Fn(&Context, &mut Frame) -> Result<Value> + Send + Sync,
{
    fn interpret(&self, cx: &Context, frame: &mut Frame) -> Result<Value> {
        self(cx, frame)
    }
}

/// A call frame for one execution of a compiled unit.
pub struct Frame {
    function: Option<Arc<FunctionObject>>,
    unit: Arc<CompiledUnit>,
    scope: ObjectRef,
    this: Option<ObjectRef>,
    args: Arc<[Value]>,
    /// Variable slots, used when there is no activation
    vars: Vec<Value>,
    /// Interpreter temporaries (finally return addresses, saved exceptions)
    locals: Vec<Value>,
    activation: Option<Arc<Activation>>,
}

impl Frame {
    /// Creates a frame. Without an activation, parameters are copied into
    /// the variable slots.
    pub fn new(
        function: Option<Arc<FunctionObject>>,
        unit: Arc<CompiledUnit>,
        scope: ObjectRef,
        this: Option<ObjectRef>,
        args: Arc<[Value]>,
        activation: Option<Arc<Activation>>,
    ) -> Self {
        let vars = if activation.is_none() && unit.is_function() {
            (0..unit.max_vars())
                .map(|i| {
                    if i < unit.arg_count() {
                        args.get(i).cloned().unwrap_or_default()
                    } else {
                        Value::Undefined
                    }
                })
                .collect()
        } else {
            Vec::new()
        };
        Self {
            function,
            locals: vec![Value::Undefined; unit.max_locals()],
            unit,
            scope,
            this,
            args,
            vars,
            activation,
        }
    }

    /// The function being run; `None` for scripts.
    pub fn function(&self) -> Option<&Arc<FunctionObject>> {
        self.function.as_ref()
    }

    /// The unit being run.
    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    /// The current scope.
    pub fn scope(&self) -> &ObjectRef {
        &self.scope
    }

    /// Replaces the current scope (entering or leaving `with`).
    pub fn set_scope(&mut self, scope: ObjectRef) {
        self.scope = scope;
    }

    /// The receiver.
    pub fn this(&self) -> Option<&ObjectRef> {
        self.this.as_ref()
    }

    /// Arguments as passed.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Gets argument `index`, or undefined.
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// The activation of this call, if the unit needs one.
    pub fn activation(&self) -> Option<&Arc<Activation>> {
        self.activation.as_ref()
    }

    /// Gets a variable slot (GETVAR).
    pub fn get_var(&self, index: usize) -> Value {
        self.vars.get(index).cloned().unwrap_or(Value::Undefined)
    }

    /// Sets a variable slot (SETVAR).
    pub fn set_var(&mut self, index: usize, value: Value) {
        if index >= self.vars.len() {
            self.vars.resize(index + 1, Value::Undefined);
        }
        self.vars[index] = value;
    }

    /// Gets an interpreter temporary.
    pub fn get_local(&self, index: usize) -> Value {
        self.locals.get(index).cloned().unwrap_or(Value::Undefined)
    }

    /// Sets an interpreter temporary.
    pub fn set_local(&mut self, index: usize, value: Value) {
        if index >= self.locals.len() {
            self.locals.resize(index + 1, Value::Undefined);
        }
        self.locals[index] = value;
    }

    /// Resolves a name in the current scope (NAME).
    pub fn lookup(&self, name: &str) -> Result<Value> {
        scope::lookup(&self.scope, name)
    }

    /// The scope object binding `name` (BINDNAME).
    pub fn bind(&self, name: &str) -> Option<ObjectRef> {
        scope::bind(&self.scope, name)
    }

    /// Assigns a name in the current scope (SETNAME).
    pub fn assign(&self, name: &str, value: Value) {
        scope::assign(&self.scope, name, value)
    }

    /// The outermost scope.
    pub fn top_level(&self) -> ObjectRef {
        top_level_scope(&self.scope)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("unit", &self.unit.name())
            .field("args", &self.args.len())
            .field("vars", &self.vars.len())
            .field("activation", &self.activation.is_some())
            .finish()
    }
}

/// Per-thread engine state: configuration, the global object and the
/// standard prototypes, and the interpreter.
pub struct Context {
    config: EngineConfig,
    global: ObjectRef,
    object_prototype: ObjectRef,
    function_prototype: ObjectRef,
    array_prototype: ObjectRef,
    interpreter: Arc<dyn Interpreter>,
}

impl Context {
    /// Creates a context with fresh standard objects.
    pub fn new(config: EngineConfig, interpreter: impl Interpreter + 'static) -> Self {
        let object_prototype: ObjectRef = PlainObject::new(None);
        let function_prototype: ObjectRef =
            NativeFunction::new("", 0, Some(object_prototype.clone()), |_: &Context, _: &ObjectRef, _, _: &[Value]| {
                Ok(Value::Undefined)
            });
        let apply: ObjectRef = NativeFunction::new(
            "apply",
            2,
            Some(function_prototype.clone()),
            |cx: &Context, scope: &ObjectRef, this: Option<ObjectRef>, args: &[Value]| {
                apply_or_call(true, cx, scope, this, args)
            },
        );
        let call: ObjectRef = NativeFunction::new(
            "call",
            1,
            Some(function_prototype.clone()),
            |cx: &Context, scope: &ObjectRef, this: Option<ObjectRef>, args: &[Value]| {
                apply_or_call(false, cx, scope, this, args)
            },
        );
        function_prototype.define("apply", Property::hidden(Value::Object(apply)));
        function_prototype.define("call", Property::hidden(Value::Object(call)));
        let array_prototype: ObjectRef = PlainObject::new(Some(object_prototype.clone()));

        let global: ObjectRef = PlainObject::with_class("global", Some(object_prototype.clone()), None);
        global.define("undefined", Property::read_only(Value::Undefined));
        global.define("NaN", Property::read_only(Value::Number(f64::NAN)));
        global.define("Infinity", Property::read_only(Value::Number(f64::INFINITY)));

        Self {
            config,
            global,
            object_prototype,
            function_prototype,
            array_prototype,
            interpreter: Arc::new(interpreter),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The global object, also the top-level scope.
    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    /// `Object.prototype`.
    pub fn object_prototype(&self) -> &ObjectRef {
        &self.object_prototype
    }

    /// `Function.prototype`, holding `apply` and `call`.
    pub fn function_prototype(&self) -> &ObjectRef {
        &self.function_prototype
    }

    /// `Array.prototype`.
    pub fn array_prototype(&self) -> &ObjectRef {
        &self.array_prototype
    }

    /// The interpreter.
    pub fn interpreter(&self) -> &dyn Interpreter {
        self.interpreter.as_ref()
    }

    /// Creates an empty object.
    pub fn new_object(&self) -> ObjectRef {
        PlainObject::new(Some(self.object_prototype.clone()))
    }

    /// Creates an array holding `values`.
    pub fn new_array(&self, values: Vec<Value>) -> ObjectRef {
        ArrayObject::new(Some(self.array_prototype.clone()), values)
    }

    /// Converts a value to an object, wrapping primitives (ToObject).
    pub fn to_object(&self, value: &Value) -> Result<ObjectRef> {
        let class = match value {
            Value::Object(o) => return Ok(o.clone()),
            Value::Undefined | Value::Null => {
                return Err(Error::TypeError(format!("{} has no properties", value)));
            }
            Value::Boolean(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
        };
        Ok(PlainObject::with_class(
            class,
            Some(self.object_prototype.clone()),
            Some(value.clone()),
        ))
    }

    /// Calls `function` from the top-level scope.
    pub fn call(&self, function: &Value, this: Option<ObjectRef>, args: &[Value]) -> Result<Value> {
        match function.as_object().and_then(|o| o.as_callable()) {
            Some(callable) => callable.call(self, &self.global, this, args),
            None => Err(Error::TypeError(format!("{} is not a function", function))),
        }
    }

    /// Runs a script unit in `scope`.
    ///
    /// Declared variables not yet bound in `scope` are created, and the
    /// script's function declarations are bound before the body runs.
    pub fn execute_script(&self, unit: &Arc<CompiledUnit>, scope: &ObjectRef) -> Result<Value> {
        if unit.is_function() {
            return Err(Error::InternalError(format!(
                "`{}` is a function body, not a script",
                unit.name()
            )));
        }
        debug!(source = unit.source_name().unwrap_or("<script>"), "executing script");

        for name in unit.arg_names() {
            if has_property(scope, name) {
                continue;
            }
            if unit.from_eval_code() {
                scope.put(name, Value::Undefined);
            } else {
                scope.define(name, Property::permanent(Value::Undefined));
            }
        }
        for nested in unit.nested() {
            if nested.function_type() == Some(FunctionType::Statement) {
                let function = FunctionObject::instantiate(self, nested.clone(), scope.clone(), false);
                init_function(scope, &function, unit.from_eval_code());
            }
        }

        let mut frame = Frame::new(
            None,
            unit.clone(),
            scope.clone(),
            Some(top_level_scope(scope)),
            Arc::from(Vec::new()),
            None,
        );
        self.interpreter.interpret(self, &mut frame)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("global", &self.global)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ListingCodegen, compile};
    use crate::ir::IrFactory;
    use crate::runtime::test_support::{compile_function, context, context_with_interpreter};
    use parking_lot::Mutex;

    #[test]
    fn test_frame_slots() {
        let cx = context();
        let f = compile_function(&cx, "f", &["a", "b"], &["v"], false);
        let args: Arc<[Value]> = Arc::from(vec![Value::from(1)]);
        let mut frame = Frame::new(Some(f.clone()), f.unit().clone(), cx.global().clone(), None, args, None);
        assert_eq!(frame.get_var(0), Value::from(1));
        assert_eq!(frame.get_var(1), Value::Undefined);
        assert_eq!(frame.get_var(2), Value::Undefined);
        frame.set_var(5, Value::from(2));
        assert_eq!(frame.get_var(5), Value::from(2));
        assert_eq!(frame.get_local(9), Value::Undefined);
        frame.set_local(0, Value::from(3));
        assert_eq!(frame.get_local(0), Value::from(3));
        assert_eq!(frame.arg(4), Value::Undefined);
    }

    #[test]
    fn test_to_object() {
        let cx = context();
        assert!(matches!(cx.to_object(&Value::Null), Err(Error::TypeError(_))));
        let boxed = cx.to_object(&Value::from("s")).unwrap();
        assert_eq!(boxed.class_name(), "String");
        let obj = cx.new_object();
        assert!(Arc::ptr_eq(&cx.to_object(&Value::Object(obj.clone())).unwrap(), &obj));
    }

    #[test]
    fn test_call_rejects_non_function() {
        let cx = context();
        assert!(matches!(cx.call(&Value::from(1), None, &[]), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_execute_script_binds_vars_and_declarations() {
        let seen = Arc::new(Mutex::new(None));
        let record = seen.clone();
        let cx = context_with_interpreter(EngineConfig::default(), move |_cx: &Context, frame: &mut Frame| {
            *record.lock() = Some(frame.lookup("x")?);
            frame.lookup("f")
        });

        let mut factory = IrFactory::new(Some("test.js".to_string()));
        let var = factory.var(1);
        factory.add_var(var, "x", None);
        let id = factory.begin_function("f", FunctionType::Statement, 2);
        let stub = factory.finish_function(id, &[], 2);
        let program = factory.finish_script(&[var, stub], 2);
        let unit = compile(program, cx.config(), &mut ListingCodegen).unwrap();

        let result = cx.execute_script(&unit, cx.global()).unwrap();
        assert!(result.is_callable());
        assert_eq!(*seen.lock(), Some(Value::Undefined));
        assert!(!cx.global().delete("x"));
        assert!(!cx.global().delete("f"));
    }

    #[test]
    fn test_execute_script_rejects_function_units() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], false);
        assert!(matches!(
            cx.execute_script(f.unit(), cx.global()),
            Err(Error::InternalError(_))
        ));
    }
}
