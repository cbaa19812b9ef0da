//! Activation records and the per-thread call stack.
//!
//! An [`Activation`] is the scope object of one call to a function whose
//! compiled unit needs one: it binds the formals, the declared variables
//! and `arguments`. While the call runs, the activation is the innermost
//! entry of the thread's call stack, which `fn.arguments` and
//! `arguments.caller` walk.

use super::arguments::ArgumentsObject;
use super::context::Context;
use super::function::FunctionObject;
use super::object::{ObjectCore, Property, Scriptable};
use super::value::{ObjectRef, Value};
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Scope object of a single function call.
pub struct Activation {
    core: ObjectCore,
    function: Arc<FunctionObject>,
    this: Option<ObjectRef>,
    original_args: Arc<[Value]>,
    caller: RwLock<Option<Arc<Activation>>>,
}

impl Activation {
    /// Creates the activation of `function` called with `args`, in front of
    /// `scope`.
    ///
    /// Formals are bound in order, so the last of several formals with the
    /// same name wins. `arguments` is bound unless a formal already has that
    /// name, then declared variables not yet bound start out undefined.
    pub fn new(
        cx: &Context,
        function: &Arc<FunctionObject>,
        scope: ObjectRef,
        this: Option<ObjectRef>,
        args: Arc<[Value]>,
    ) -> Arc<Self> {
        let activation = Arc::new(Self {
            core: ObjectCore::new(None, Some(scope)),
            function: function.clone(),
            this,
            original_args: args,
            caller: RwLock::new(None),
        });

        let unit = function.unit();
        let names = unit.arg_names();
        let bindings = activation.core.properties();
        for (i, name) in names[..unit.arg_count()].iter().enumerate() {
            let value = activation.original_args.get(i).cloned().unwrap_or_default();
            bindings.define(name, Property::permanent(value));
        }
        if !bindings.has("arguments") {
            let arguments: ObjectRef = ArgumentsObject::new(cx, &activation);
            bindings.define("arguments", Property::permanent(Value::Object(arguments)));
        }
        for name in &names[unit.arg_count()..] {
            if !bindings.has(name) {
                bindings.define(name, Property::permanent(Value::Undefined));
            }
        }
        activation
    }

    /// The function being called.
    pub fn function(&self) -> &Arc<FunctionObject> {
        &self.function
    }

    /// The receiver of the call.
    pub fn this(&self) -> Option<&ObjectRef> {
        self.this.as_ref()
    }

    /// Arguments as passed by the caller.
    pub fn original_args(&self) -> &Arc<[Value]> {
        &self.original_args
    }

    /// The activation that was innermost when this one was entered, while
    /// this one is on the call stack.
    pub fn caller(&self) -> Option<Arc<Activation>> {
        self.caller.read().clone()
    }

    /// Current value of the `arguments` binding.
    pub fn arguments(&self) -> Option<Value> {
        self.core.properties().get("arguments")
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("function", &self.function.name())
            .field("bindings", self.core.properties())
            .field("args", &self.original_args.len())
            .finish()
    }
}

impl Scriptable for Activation {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn class_name(&self) -> &str {
        "Call"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Call stack
// ============================================================================

thread_local! {
    static CURRENT: RefCell<Option<Arc<Activation>>> = const { RefCell::new(None) };
}

/// Pops its activation off the thread's call stack when dropped.
#[must_use = "the activation is popped as soon as the guard is dropped"]
pub struct ActivationGuard {
    activation: Arc<Activation>,
}

impl ActivationGuard {
    /// The pushed activation.
    pub fn activation(&self) -> &Arc<Activation> {
        &self.activation
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            let innermost = current
                .as_ref()
                .is_some_and(|top| Arc::ptr_eq(top, &self.activation));
            // While unwinding from a panic the stack is already suspect.
            if !innermost && !std::thread::panicking() {
                panic!(
                    "activation stack mismatch: popping `{}` which is not the innermost activation",
                    self.activation.function.name()
                );
            }
            // A popped activation no longer has a caller.
            *current = self.activation.caller.write().take();
        });
        trace!(function = self.activation.function.name(), "popped activation");
    }
}

/// Makes `activation` the innermost activation of this thread.
pub fn enter(activation: &Arc<Activation>) -> ActivationGuard {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        *activation.caller.write() = current.take();
        *current = Some(activation.clone());
    });
    trace!(function = activation.function.name(), "pushed activation");
    ActivationGuard {
        activation: activation.clone(),
    }
}

/// The innermost activation of this thread.
pub fn current() -> Option<Arc<Activation>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Activations of this thread, innermost first.
pub fn walk() -> impl Iterator<Item = Arc<Activation>> {
    std::iter::successors(current(), |a| a.caller())
}

/// The innermost activation of `function` on this thread.
pub fn find(function: &FunctionObject) -> Option<Arc<Activation>> {
    walk().find(|a| std::ptr::eq(Arc::as_ptr(&a.function), function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_support::{compile_function, context};

    #[test]
    fn test_formals_vars_and_arguments_are_bound() {
        let cx = context();
        let f = compile_function(&cx, "f", &["a", "b"], &["v"], true);
        let args: Arc<[Value]> = Arc::from(vec![Value::from(1)]);
        let activation = Activation::new(&cx, &f, cx.global().clone(), None, args);
        assert_eq!(activation.get("a"), Some(Value::from(1)));
        assert_eq!(activation.get("b"), Some(Value::Undefined));
        assert_eq!(activation.get("v"), Some(Value::Undefined));
        assert!(matches!(activation.arguments(), Some(Value::Object(_))));
        assert!(!activation.delete("a"));
        assert_eq!(activation.class_name(), "Call");
    }

    #[test]
    fn test_last_duplicate_formal_wins() {
        let cx = context();
        let f = compile_function(&cx, "f", &["a", "a"], &[], true);
        let args: Arc<[Value]> = Arc::from(vec![Value::from(1), Value::from(2)]);
        let activation = Activation::new(&cx, &f, cx.global().clone(), None, args);
        assert_eq!(activation.get("a"), Some(Value::from(2)));
    }

    #[test]
    fn test_formal_named_arguments_shadows_object() {
        let cx = context();
        let f = compile_function(&cx, "f", &["arguments"], &[], true);
        let args: Arc<[Value]> = Arc::from(vec![Value::from(7)]);
        let activation = Activation::new(&cx, &f, cx.global().clone(), None, args);
        assert_eq!(activation.arguments(), Some(Value::from(7)));
    }

    #[test]
    fn test_call_stack_push_and_pop() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], true);
        let g = compile_function(&cx, "g", &[], &[], true);
        let outer = Activation::new(&cx, &f, cx.global().clone(), None, Arc::from(Vec::new()));
        let inner = Activation::new(&cx, &g, cx.global().clone(), None, Arc::from(Vec::new()));

        assert!(current().is_none());
        {
            let _outer = enter(&outer);
            {
                let _inner = enter(&inner);
                assert!(Arc::ptr_eq(&current().unwrap(), &inner));
                assert!(Arc::ptr_eq(&inner.caller().unwrap(), &outer));
                assert_eq!(walk().count(), 2);
                assert!(Arc::ptr_eq(&find(&f).unwrap(), &outer));
            }
            assert!(Arc::ptr_eq(&current().unwrap(), &outer));
        }
        assert!(current().is_none());
        assert!(find(&f).is_none());
    }

    #[test]
    fn test_pop_unlinks_caller() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], true);
        let outer = Activation::new(&cx, &f, cx.global().clone(), None, Arc::from(Vec::new()));
        let inner = Activation::new(&cx, &f, cx.global().clone(), None, Arc::from(Vec::new()));

        let outer_guard = enter(&outer);
        drop(enter(&inner));
        assert!(inner.caller().is_none());
        assert!(Arc::ptr_eq(&current().unwrap(), &outer));
        drop(outer_guard);
        assert!(outer.caller().is_none());
        assert!(current().is_none());
    }

    #[test]
    #[should_panic(expected = "activation stack mismatch")]
    fn test_out_of_order_pop_panics() {
        let cx = context();
        let f = compile_function(&cx, "f", &[], &[], true);
        let a = Activation::new(&cx, &f, cx.global().clone(), None, Arc::from(Vec::new()));
        let b = Activation::new(&cx, &f, cx.global().clone(), None, Arc::from(Vec::new()));
        let first = enter(&a);
        let _second = enter(&b);
        drop(first);
    }
}
