//! Function objects and the invocation protocol.
//!
//! [`FunctionBase`] carries what every function kind shares: the read-only
//! `length`, `arity` and `name` properties and the lazily created
//! `prototype`. [`FunctionObject`] runs a compiled unit through the
//! context's interpreter; [`NativeFunction`] wraps a Rust closure.

use super::activation::{self, Activation};
use super::context::{Context, Frame};
use super::object::{ObjectCore, PlainObject, Property, Scriptable, downcast, top_level_scope};
use super::scope::WithScope;
use super::value::{ObjectRef, Value};
use crate::compiler::CompiledUnit;
use crate::config::{CallerInspection, LanguageVersion};
use crate::ir::FunctionType;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

// ============================================================================
// Callable
// ============================================================================

/// A callable object.
pub trait Callable: Scriptable {
    /// Shared function state.
    fn base(&self) -> &FunctionBase;

    /// The function's name; empty for anonymous functions.
    fn function_name(&self) -> &str {
        self.base().name()
    }

    /// Value of the `length` property.
    fn length(&self) -> usize {
        self.base().arity()
    }

    /// Value of the deprecated `fn.arguments` property, if it currently
    /// has one.
    fn reflect_arguments(&self) -> Option<Value> {
        None
    }

    /// Calls the function.
    ///
    /// `scope` is the caller's scope and `this` the receiver; `None` stands
    /// for a `null` or `undefined` receiver.
    fn call(&self, cx: &Context, scope: &ObjectRef, this: Option<ObjectRef>, args: &[Value]) -> Result<Value>;

    /// Creates the receiver for `new`.
    ///
    /// Returning `None` means [`call`](Callable::call) makes the object
    /// itself and must return it.
    fn create_object(&self, cx: &Context, _scope: &ObjectRef) -> Option<ObjectRef> {
        let object: ObjectRef = PlainObject::new(Some(self.class_prototype(cx)));
        object.set_parent_scope(self.parent_scope());
        Some(object)
    }

    /// Calls the function as a constructor.
    ///
    /// # Panics
    ///
    /// Panics if [`create_object`](Callable::create_object) returned `None`
    /// and the call did not produce an object.
    fn construct(&self, cx: &Context, scope: &ObjectRef, args: &[Value]) -> Result<ObjectRef> {
        if let Some(receiver) = self.create_object(cx, scope) {
            return match self.call(cx, scope, Some(receiver.clone()), args)? {
                Value::Object(result) => Ok(result),
                _ => Ok(receiver),
            };
        }

        let Value::Object(result) = self.call(cx, scope, None, args)? else {
            panic!(
                "bad implementation of call as constructor: `{}` supplies its own receiver but returned a non-object",
                self.function_name()
            );
        };
        if result.prototype().is_none() {
            result.set_prototype(Some(self.class_prototype(cx)));
        }
        if result.parent_scope().is_none() {
            if let Some(parent) = self.parent_scope() {
                if !Arc::ptr_eq(&result, &parent) {
                    result.set_parent_scope(Some(parent));
                }
            }
        }
        Ok(result)
    }

    /// Prototype of objects this function constructs.
    fn class_prototype(&self, cx: &Context) -> ObjectRef {
        match self.get("prototype") {
            Some(Value::Object(proto)) => proto,
            _ => cx.object_prototype().clone(),
        }
    }

    /// Implements `value instanceof fn`.
    fn has_instance(&self, value: &Value) -> Result<bool> {
        let Some(Value::Object(proto)) = self.get("prototype") else {
            return Err(Error::TypeError(format!(
                "'prototype' property of {} is not an object",
                self.function_name()
            )));
        };
        let Value::Object(instance) = value else {
            return Ok(false);
        };
        let mut current = instance.prototype();
        while let Some(o) = current {
            if Arc::ptr_eq(&o, &proto) {
                return Ok(true);
            }
            current = o.prototype();
        }
        Ok(false)
    }
}

// ============================================================================
// Function base
// ============================================================================

enum PrototypeSlot {
    /// Created on first read
    Unset,
    Set(Value),
    Deleted,
}

/// State and built-in properties shared by every function kind.
pub struct FunctionBase {
    name: String,
    arity: usize,
    owner: Weak<dyn Scriptable>,
    prototype: RwLock<PrototypeSlot>,
    immune: AtomicBool,
}

impl FunctionBase {
    /// Creates the base of the function `owner`.
    pub fn new(name: impl Into<String>, arity: usize, owner: Weak<dyn Scriptable>) -> Self {
        Self {
            name: name.into(),
            arity,
            owner,
            prototype: RwLock::new(PrototypeSlot::Unset),
            immune: AtomicBool::new(false),
        }
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter count.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns true if `prototype` was fixed with
    /// [`set_immune_prototype`](Self::set_immune_prototype).
    pub fn is_prototype_immune(&self) -> bool {
        self.immune.load(Ordering::Acquire)
    }

    /// Fixes `prototype` to `value`: it is never created lazily and ignores
    /// writes and deletes.
    pub fn set_immune_prototype(&self, value: Value) {
        *self.prototype.write() = PrototypeSlot::Set(value);
        self.immune.store(true, Ordering::Release);
    }

    /// Reads `prototype`, creating the default object on first access.
    ///
    /// Two threads racing on the first read may both build an object; the
    /// first to store it wins and the other's is dropped.
    pub fn prototype_property(&self) -> Option<Value> {
        match &*self.prototype.read() {
            PrototypeSlot::Set(value) => return Some(value.clone()),
            PrototypeSlot::Deleted => return None,
            PrototypeSlot::Unset => {}
        }

        let fresh = self.default_prototype();
        let mut slot = self.prototype.write();
        if matches!(*slot, PrototypeSlot::Unset) {
            *slot = PrototypeSlot::Set(fresh.clone());
            return Some(fresh);
        }
        match &*slot {
            PrototypeSlot::Set(value) => Some(value.clone()),
            PrototypeSlot::Unset | PrototypeSlot::Deleted => None,
        }
    }

    fn default_prototype(&self) -> Value {
        let owner = self.owner.upgrade();
        // Object.prototype is the root of the function's own prototype chain.
        let object_prototype = owner.as_ref().and_then(|o| {
            let mut root = o.prototype()?;
            while let Some(next) = root.prototype() {
                root = next;
            }
            Some(root)
        });
        let proto: ObjectRef = PlainObject::new(object_prototype);
        if let Some(owner) = owner {
            proto.define("constructor", Property::read_only(Value::Object(owner)));
        }
        Value::Object(proto)
    }

    /// Reads an own property of `function`.
    pub fn get(&self, function: &dyn Callable, name: &str) -> Option<Value> {
        match name {
            "length" => Some(Value::from(function.length())),
            "arity" => Some(Value::from(self.arity)),
            "name" => Some(Value::from(self.name.as_str())),
            "prototype" => self.prototype_property(),
            "arguments" => function
                .reflect_arguments()
                .or_else(|| function.core().properties().get(name)),
            _ => function.core().properties().get(name),
        }
    }

    /// Writes an own property of `function`.
    pub fn put(&self, function: &dyn Callable, name: &str, value: Value) {
        match name {
            "length" | "arity" | "name" => {}
            "prototype" => {
                if !self.is_prototype_immune() {
                    *self.prototype.write() = PrototypeSlot::Set(value);
                }
            }
            _ => function.core().properties().put(name, value),
        }
    }

    /// Checks for an own property of `function`.
    pub fn has(&self, function: &dyn Callable, name: &str) -> bool {
        match name {
            "length" | "arity" | "name" => true,
            "prototype" => !matches!(*self.prototype.read(), PrototypeSlot::Deleted),
            "arguments" => function.reflect_arguments().is_some() || function.core().properties().has(name),
            _ => function.core().properties().has(name),
        }
    }

    /// Deletes an own property of `function`.
    pub fn delete(&self, function: &dyn Callable, name: &str) -> bool {
        match name {
            "length" | "arity" | "name" => false,
            "prototype" => {
                if self.is_prototype_immune() {
                    return false;
                }
                *self.prototype.write() = PrototypeSlot::Deleted;
                true
            }
            _ => function.core().properties().delete(name),
        }
    }
}

impl fmt::Debug for FunctionBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBase")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("immune", &self.is_prototype_immune())
            .finish()
    }
}

/// Implements [`Scriptable`] for a function kind by routing property access
/// through its [`FunctionBase`].
macro_rules! function_scriptable {
    ($ty:ty) => {
        impl Scriptable for $ty {
            fn core(&self) -> &ObjectCore {
                &self.core
            }

            fn class_name(&self) -> &str {
                "Function"
            }

            fn get(&self, name: &str) -> Option<Value> {
                self.base.get(self, name)
            }

            fn put(&self, name: &str, value: Value) {
                self.base.put(self, name, value)
            }

            fn has(&self, name: &str) -> bool {
                self.base.has(self, name)
            }

            fn delete(&self, name: &str) -> bool {
                self.base.delete(self, name)
            }

            fn as_callable(&self) -> Option<&dyn Callable> {
                Some(self)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

// ============================================================================
// Interpreted functions
// ============================================================================

/// A function backed by a compiled unit.
pub struct FunctionObject {
    core: ObjectCore,
    base: FunctionBase,
    unit: Arc<CompiledUnit>,
    closure: Option<ObjectRef>,
    caller_inspection: CallerInspection,
    handle: Weak<FunctionObject>,
}

impl FunctionObject {
    /// Creates a function value for `unit` defined in `scope`.
    ///
    /// With `closure` set the function captures `scope` and always runs in
    /// it; otherwise it runs in its defining scope, or in the caller's
    /// scope when the unit asks for dynamic scoping.
    pub fn instantiate(cx: &Context, unit: Arc<CompiledUnit>, scope: ObjectRef, closure: bool) -> Arc<Self> {
        trace!(name = unit.name(), closure, "instantiating function");
        Arc::new_cyclic(|handle: &Weak<FunctionObject>| {
            let owner: Weak<dyn Scriptable> = handle.clone();
            Self {
                core: ObjectCore::new(Some(cx.function_prototype().clone()), Some(scope.clone())),
                base: FunctionBase::new(unit.name(), unit.arg_count(), owner),
                closure: closure.then_some(scope),
                caller_inspection: cx.config().caller_inspection,
                handle: handle.clone(),
                unit,
            }
        })
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// The compiled body.
    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    /// The captured scope of a closure.
    pub fn closure(&self) -> Option<&ObjectRef> {
        self.closure.as_ref()
    }

    /// Returns true if the caller chain is visible from this function.
    pub fn allows_caller_inspection(&self) -> bool {
        self.caller_inspection == CallerInspection::Allow
    }

    fn handle(&self) -> Arc<FunctionObject> {
        match self.handle.upgrade() {
            Some(function) => function,
            None => panic!("function `{}` called while being dropped", self.name()),
        }
    }
}

impl fmt::Debug for FunctionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionObject")
            .field("name", &self.name())
            .field("arity", &self.base.arity())
            .field("closure", &self.closure.is_some())
            .field("properties", self.core.properties())
            .finish()
    }
}

function_scriptable!(FunctionObject);

impl Callable for FunctionObject {
    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn length(&self) -> usize {
        // JavaScript 1.2 reports the actual argument count while running.
        if self.unit.language_version() == LanguageVersion::V1_2 {
            if let Some(activation) = activation::find(self) {
                return activation.original_args().len();
            }
        }
        self.base.arity()
    }

    fn reflect_arguments(&self) -> Option<Value> {
        if !self.allows_caller_inspection() {
            return Some(Value::Null);
        }
        activation::find(self).map(|a| a.arguments().unwrap_or(Value::Null))
    }

    fn call(&self, cx: &Context, scope: &ObjectRef, this: Option<ObjectRef>, args: &[Value]) -> Result<Value> {
        let unit = &self.unit;
        let scope = match &self.closure {
            Some(closure) => closure.clone(),
            None if !unit.use_dynamic_scope() => self.parent_scope().unwrap_or_else(|| scope.clone()),
            None => scope.clone(),
        };
        let this = if unit.check_this() {
            Some(get_this(this, &scope))
        } else {
            this
        };
        let args: Arc<[Value]> = Arc::from(args);
        let function = self.handle();

        let (scope, record) = if unit.needs_activation() {
            let record = Activation::new(cx, &function, scope, this.clone(), args.clone());
            let scope: ObjectRef = record.clone();
            (scope, Some(record))
        } else {
            (scope, None)
        };
        // Popped on every exit from this call, including errors and panics.
        let _guard = record.as_ref().map(activation::enter);

        let mut frame = Frame::new(Some(function), unit.clone(), scope, this, args, record);
        cx.interpreter().interpret(cx, &mut frame)
    }
}

/// Resolves the receiver of a function whose body uses `this`.
///
/// A missing receiver becomes the top-level scope; `with` scopes are
/// replaced by their target and activations by the top-level scope.
pub fn get_this(this: Option<ObjectRef>, scope: &ObjectRef) -> ObjectRef {
    let mut this = this.unwrap_or_else(|| top_level_scope(scope));
    while let Some(target) = downcast::<WithScope>(&this).and_then(|w| w.target()) {
        this = target;
    }
    if downcast::<Activation>(&this).is_some() {
        this = top_level_scope(&this);
    }
    this
}

/// Binds a nested function in `scope` according to how it was declared.
///
/// Declarations become permanent bindings (ordinary ones in eval code);
/// function expressions used as statements bind past any `with` scopes;
/// plain function expressions bind nothing.
pub fn init_function(scope: &ObjectRef, function: &Arc<FunctionObject>, from_eval_code: bool) {
    let name = function.name();
    if name.is_empty() {
        return;
    }
    let value = Value::Object(function.clone());
    match function.unit().function_type() {
        Some(FunctionType::Statement) => {
            if from_eval_code {
                scope.put(name, value);
            } else {
                scope.define(name, Property::permanent(value));
            }
        }
        Some(FunctionType::ExpressionStatement) => {
            let mut target = scope.clone();
            while downcast::<WithScope>(&target).is_some() {
                match target.parent_scope() {
                    Some(parent) => target = parent,
                    None => break,
                }
            }
            target.put(name, value);
        }
        Some(FunctionType::Expression) | None => {}
    }
}

// ============================================================================
// Native functions
// ============================================================================

/// Body of a native function: `(cx, scope, this, args)`.
pub type NativeFn = dyn Fn(&Context, &ObjectRef, Option<ObjectRef>, &[Value]) -> Result<Value> + Send + Sync;

/// A function implemented in Rust.
pub struct NativeFunction {
    core: ObjectCore,
    base: FunctionBase,
    body: Box<NativeFn>,
}

impl NativeFunction {
    /// Creates a native function whose own prototype is `prototype`.
    pub fn new<F>(name: &str, arity: usize, prototype: Option<ObjectRef>, body: F) -> Arc<Self>
    where
        F: Fn(&Context, &ObjectRef, Option<ObjectRef>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Arc::new_cyclic(|handle: &Weak<NativeFunction>| {
            let owner: Weak<dyn Scriptable> = handle.clone();
            Self {
                core: ObjectCore::new(prototype, None),
                base: FunctionBase::new(name, arity, owner),
                body: Box::new(body),
            }
        })
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.base.name())
            .field("arity", &self.base.arity())
            .finish()
    }
}

function_scriptable!(NativeFunction);

impl Callable for NativeFunction {
    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn call(&self, cx: &Context, scope: &ObjectRef, this: Option<ObjectRef>, args: &[Value]) -> Result<Value> {
        (self.body)(cx, scope, this, args)
    }
}

// ============================================================================
// Function.prototype.apply / call
// ============================================================================

/// Body of `Function.prototype.apply` (`is_apply`) and
/// `Function.prototype.call`.
pub fn apply_or_call(
    is_apply: bool,
    cx: &Context,
    scope: &ObjectRef,
    this: Option<ObjectRef>,
    args: &[Value],
) -> Result<Value> {
    let method = if is_apply { "apply" } else { "call" };
    let not_callable = || Error::TypeError(format!("Function.prototype.{} called on a non-function", method));
    let function = this.ok_or_else(not_callable)?;
    let callable = function.as_callable().ok_or_else(not_callable)?;

    let receiver = match args.first() {
        None | Some(Value::Undefined | Value::Null) => top_level_scope(scope),
        Some(value) => cx.to_object(value)?,
    };

    let call_args = if is_apply {
        match args.get(1) {
            None | Some(Value::Undefined | Value::Null) => Vec::new(),
            Some(Value::Object(array)) => array.elements().ok_or_else(not_an_array)?,
            Some(_) => return Err(not_an_array()),
        }
    } else {
        args.get(1..).map(<[Value]>::to_vec).unwrap_or_default()
    };

    callable.call(cx, scope, Some(receiver), &call_args)
}

fn not_an_array() -> Error {
    Error::TypeError("second argument to Function.prototype.apply must be an array".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::runtime::object::{ArrayObject, get_property};
    use crate::runtime::test_support::{compile_function, context, context_with_interpreter};
    use parking_lot::Mutex;

    fn recorder(cx: &Context) -> (Arc<NativeFunction>, Arc<Mutex<Vec<(Option<ObjectRef>, Vec<Value>)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let f = NativeFunction::new(
            "rec",
            0,
            Some(cx.function_prototype().clone()),
            move |_cx: &Context, _scope: &ObjectRef, this: Option<ObjectRef>, args: &[Value]| {
                seen.lock().push((this, args.to_vec()));
                Ok(Value::Undefined)
            },
        );
        (f, calls)
    }

    #[test]
    fn test_builtin_properties_are_read_only() {
        let cx = context();
        let f = compile_function(&cx, "f", &["a", "b"], &[], false);
        assert_eq!(f.get("length"), Some(Value::from(2)));
        assert_eq!(f.get("arity"), Some(Value::from(2)));
        assert_eq!(f.get("name"), Some(Value::from("f")));
        f.put("length", Value::from(9));
        assert_eq!(f.get("length"), Some(Value::from(2)));
        assert!(!f.delete("name"));
        assert!(f.has("length"));
        assert_eq!(f.class_name(), "Function");
    }

    #[test]
    fn test_default_prototype_is_created_once() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], false);
        let Some(Value::Object(first)) = f.get("prototype") else {
            panic!("expected prototype object");
        };
        let Some(Value::Object(second)) = f.get("prototype") else {
            panic!("expected prototype object");
        };
        assert!(Arc::ptr_eq(&first, &second));
        let function: ObjectRef = f.clone();
        assert_eq!(first.get("constructor"), Some(Value::Object(function)));
        assert!(Arc::ptr_eq(&first.prototype().unwrap(), cx.object_prototype()));
    }

    #[test]
    fn test_prototype_can_be_replaced_and_deleted() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], false);
        f.put("prototype", Value::from(1));
        assert_eq!(f.get("prototype"), Some(Value::from(1)));
        assert!(f.delete("prototype"));
        assert!(!f.has("prototype"));
        assert_eq!(f.get("prototype"), None);
    }

    #[test]
    fn test_immune_prototype() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], false);
        f.base().set_immune_prototype(Value::Null);
        f.put("prototype", Value::from(1));
        assert_eq!(f.get("prototype"), Some(Value::Null));
        assert!(!f.delete("prototype"));
    }

    #[test]
    fn test_construct_uses_fresh_receiver() {
        let cx = context();
        let f = compile_function(&cx, "F", &[], &[], false);
        let obj = f.construct(&cx, cx.global(), &[]).unwrap();
        assert!(f.has_instance(&Value::Object(obj.clone())).unwrap());
        assert!(!f.has_instance(&Value::from(1)).unwrap());
        let other: ObjectRef = PlainObject::new(Some(cx.object_prototype().clone()));
        assert!(!f.has_instance(&Value::Object(other)).unwrap());
    }

    #[test]
    fn test_construct_keeps_object_result() {
        let made: ObjectRef = PlainObject::new(None);
        let result = made.clone();
        let cx = context_with_interpreter(EngineConfig::default(), move |_cx: &Context, _frame: &mut Frame| {
            Ok(Value::Object(result.clone()))
        });
        let f = compile_function(&cx, "F", &[], &[], false);
        let obj = f.construct(&cx, cx.global(), &[]).unwrap();
        assert!(Arc::ptr_eq(&obj, &made));
    }

    #[derive(Debug)]
    struct SelfMade {
        core: ObjectCore,
        base: FunctionBase,
        result: Value,
    }

    function_scriptable!(SelfMade);

    impl Callable for SelfMade {
        fn base(&self) -> &FunctionBase {
            &self.base
        }

        fn call(&self, _: &Context, _: &ObjectRef, _: Option<ObjectRef>, _: &[Value]) -> Result<Value> {
            Ok(self.result.clone())
        }

        fn create_object(&self, _: &Context, _: &ObjectRef) -> Option<ObjectRef> {
            None
        }
    }

    fn self_made(cx: &Context, result: Value) -> Arc<SelfMade> {
        Arc::new_cyclic(|handle: &Weak<SelfMade>| {
            let owner: Weak<dyn Scriptable> = handle.clone();
            SelfMade {
                core: ObjectCore::new(Some(cx.function_prototype().clone()), Some(cx.global().clone())),
                base: FunctionBase::new("Made", 0, owner),
                result,
            }
        })
    }

    #[test]
    fn test_self_supplied_receiver_gets_prototype_and_scope() {
        let cx = context();
        let result: ObjectRef = PlainObject::new(None);
        let f = self_made(&cx, Value::Object(result.clone()));
        let obj = f.construct(&cx, cx.global(), &[]).unwrap();
        assert!(Arc::ptr_eq(&obj, &result));
        assert!(obj.prototype().is_some());
        assert!(Arc::ptr_eq(&obj.parent_scope().unwrap(), cx.global()));
    }

    #[test]
    #[should_panic(expected = "bad implementation of call as constructor")]
    fn test_self_supplied_receiver_must_be_object() {
        let cx = context();
        let f = self_made(&cx, Value::from(1));
        let _ = f.construct(&cx, cx.global(), &[]);
    }

    #[test]
    fn test_has_instance_requires_object_prototype() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], false);
        f.put("prototype", Value::from(3));
        assert!(matches!(f.has_instance(&Value::Null), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_apply_with_null_receiver_uses_global() {
        let cx = context();
        let (f, calls) = recorder(&cx);
        let array: ObjectRef = ArrayObject::new(None, vec![Value::from(1), Value::from(2), Value::from(3)]);
        let target: ObjectRef = f.clone();
        apply_or_call(true, &cx, cx.global(), Some(target), &[Value::Null, Value::Object(array)]).unwrap();

        let calls = calls.lock();
        let (this, args) = &calls[0];
        assert!(Arc::ptr_eq(this.as_ref().unwrap(), cx.global()));
        assert_eq!(args, &vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn test_apply_without_array_passes_no_arguments() {
        let cx = context();
        let (f, calls) = recorder(&cx);
        let receiver: ObjectRef = PlainObject::new(None);
        let target: ObjectRef = f.clone();
        apply_or_call(true, &cx, cx.global(), Some(target.clone()), &[Value::Object(receiver.clone())]).unwrap();
        apply_or_call(true, &cx, cx.global(), Some(target), &[]).unwrap();

        let calls = calls.lock();
        assert!(Arc::ptr_eq(calls[0].0.as_ref().unwrap(), &receiver));
        assert!(calls[0].1.is_empty());
        assert!(calls[1].1.is_empty());
    }

    #[test]
    fn test_apply_rejects_non_array() {
        let cx = context();
        let (f, _) = recorder(&cx);
        let target: ObjectRef = f.clone();
        let err = apply_or_call(true, &cx, cx.global(), Some(target.clone()), &[Value::Null, Value::from(1)])
            .unwrap_err();
        assert!(matches!(err, Error::TypeError(ref m) if m.contains("must be an array")));

        let plain: ObjectRef = PlainObject::new(None);
        let err = apply_or_call(true, &cx, cx.global(), Some(target), &[Value::Null, Value::Object(plain)])
            .unwrap_err();
        assert!(matches!(err, Error::TypeError(_)));
    }

    #[test]
    fn test_call_passes_tail_and_boxes_primitives() {
        let cx = context();
        let (f, calls) = recorder(&cx);
        let target: ObjectRef = f.clone();
        apply_or_call(false, &cx, cx.global(), Some(target), &[Value::from(5), Value::from("a"), Value::from("b")])
            .unwrap();

        let calls = calls.lock();
        let (this, args) = &calls[0];
        let this = this.as_ref().unwrap();
        assert_eq!(this.class_name(), "Number");
        assert_eq!(args, &vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_apply_on_non_function_is_type_error() {
        let cx = context();
        let plain: ObjectRef = PlainObject::new(None);
        assert!(matches!(
            apply_or_call(false, &cx, cx.global(), Some(plain), &[]),
            Err(Error::TypeError(_))
        ));
        assert!(matches!(apply_or_call(true, &cx, cx.global(), None, &[]), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_apply_is_reachable_from_functions() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], false);
        let target: ObjectRef = f.clone();
        let apply = get_property(&target, "apply").unwrap();
        assert!(apply.is_callable());
    }

    #[test]
    fn test_get_this_unwraps_with_and_activation() {
        let cx = context();
        let target: ObjectRef = PlainObject::new(None);
        let with: ObjectRef = WithScope::new(target.clone(), cx.global().clone());
        assert!(Arc::ptr_eq(&get_this(Some(with), cx.global()), &target));
        assert!(Arc::ptr_eq(&get_this(None, cx.global()), cx.global()));

        let f = compile_function(&cx, "f", &[], &[], true);
        let record: ObjectRef = Activation::new(&cx, &f, cx.global().clone(), None, Arc::from(Vec::new()));
        assert!(Arc::ptr_eq(&get_this(Some(record), cx.global()), cx.global()));
    }

    #[test]
    fn test_init_function_by_type() {
        let cx = context();
        let f = compile_function(&cx, "decl", &[], &[], false);
        let scope: ObjectRef = PlainObject::new(None);
        init_function(&scope, &f, false);
        assert!(matches!(scope.get("decl"), Some(Value::Object(_))));
        assert!(!scope.delete("decl"));

        let scope: ObjectRef = PlainObject::new(None);
        init_function(&scope, &f, true);
        assert!(scope.delete("decl"));
    }
}
