//! The `arguments` object.
//!
//! Elements start out as a view of the caller's argument array. An element
//! whose index names a live formal (one not shadowed by a later formal of
//! the same name) is an alias of that formal's activation binding. Other
//! elements are copied on the first write or delete; a deleted element
//! exposes whatever ordinary property has the same index.
//!
//! `length`, `callee` and `caller` are ordinary-looking hidden slots that
//! can each be overwritten or deleted on their own. `caller` only exists
//! for legacy language versions, where it reads the `arguments` of the
//! calling activation.

use super::activation::Activation;
use super::context::Context;
use super::object::{ObjectCore, Scriptable, array_index};
use super::value::{ObjectRef, Value};
use crate::compiler::CompiledUnit;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

enum Elements {
    /// The caller's array, not yet written to
    Shared(Arc<[Value]>),
    /// Private copy; `None` marks a deleted element
    Owned(Vec<Option<Value>>),
}

impl Elements {
    fn len(&self) -> usize {
        match self {
            Elements::Shared(args) => args.len(),
            Elements::Owned(args) => args.len(),
        }
    }

    fn get(&self, index: usize) -> Option<Value> {
        match self {
            Elements::Shared(args) => args.get(index).cloned(),
            Elements::Owned(args) => args.get(index).cloned().flatten(),
        }
    }

    fn owned(&mut self) -> &mut Vec<Option<Value>> {
        if let Elements::Shared(args) = self {
            *self = Elements::Owned(args.iter().cloned().map(Some).collect());
        }
        match self {
            Elements::Owned(args) => args,
            Elements::Shared(_) => unreachable!(),
        }
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Present(Value),
    Missing,
}

#[derive(Debug, Clone)]
enum CallerSlot {
    /// Resolved on read through the calling activation
    Lazy,
    /// Reads as `null`
    Null,
    Present(Value),
    Missing,
}

/// The `arguments` object of one activation.
///
/// The object keeps its activation alive, so aliased elements keep
/// tracking the formals after the call returns.
pub struct ArgumentsObject {
    core: ObjectCore,
    activation: Arc<Activation>,
    unit: Arc<CompiledUnit>,
    elements: RwLock<Elements>,
    length: RwLock<Slot>,
    callee: RwLock<Slot>,
    caller: RwLock<CallerSlot>,
}

impl ArgumentsObject {
    /// Creates the `arguments` object of `activation`.
    pub fn new(cx: &Context, activation: &Arc<Activation>) -> Arc<Self> {
        let function = activation.function();
        let unit = function.unit().clone();
        let args = activation.original_args().clone();

        let caller = if !unit.language_version().has_legacy_caller() {
            CallerSlot::Missing
        } else if function.allows_caller_inspection() {
            CallerSlot::Lazy
        } else {
            CallerSlot::Null
        };
        let callee: ObjectRef = function.clone();

        Arc::new(Self {
            core: ObjectCore::new(Some(cx.object_prototype().clone()), activation.parent_scope()),
            activation: activation.clone(),
            unit,
            length: RwLock::new(Slot::Present(Value::from(args.len()))),
            callee: RwLock::new(Slot::Present(Value::Object(callee))),
            caller: RwLock::new(caller),
            elements: RwLock::new(Elements::Shared(args)),
        })
    }

    /// Whether element `index` aliases an activation binding: its index is
    /// a formal that no later formal redeclares.
    fn is_shared(&self, index: usize) -> bool {
        let names = self.unit.arg_names();
        let defined = self.unit.arg_count();
        if index >= defined {
            return false;
        }
        let name = &names[index];
        !names[index + 1..defined].iter().any(|n| n == name)
    }

    fn read_shared(&self, index: usize) -> Value {
        let name = &self.unit.arg_names()[index];
        match self.activation.get(name) {
            Some(value) => value,
            None => panic!("arguments[{}] is shared with formal `{}` but the activation has no such binding", index, name),
        }
    }

    fn caller_value(&self) -> Option<Value> {
        match &*self.caller.read() {
            CallerSlot::Lazy => Some(
                self.activation
                    .caller()
                    .and_then(|caller| caller.arguments())
                    .unwrap_or(Value::Null),
            ),
            CallerSlot::Null => Some(Value::Null),
            CallerSlot::Present(value) => Some(value.clone()),
            CallerSlot::Missing => None,
        }
    }
}

impl fmt::Debug for ArgumentsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentsObject")
            .field("function", &self.unit.name())
            .field("elements", &self.elements.read().len())
            .field("properties", self.core.properties())
            .finish()
    }
}

fn slot_value(slot: &RwLock<Slot>) -> Option<Value> {
    match &*slot.read() {
        Slot::Present(value) => Some(value.clone()),
        Slot::Missing => None,
    }
}

impl Scriptable for ArgumentsObject {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn class_name(&self) -> &str {
        "Arguments"
    }

    fn get(&self, name: &str) -> Option<Value> {
        let own = match name {
            "length" => slot_value(&self.length),
            "callee" => slot_value(&self.callee),
            "caller" => self.caller_value(),
            _ => match array_index(name) {
                Some(index) => return self.get_index(index),
                None => None,
            },
        };
        own.or_else(|| self.core.properties().get(name))
    }

    fn put(&self, name: &str, value: Value) {
        match name {
            "length" => *self.length.write() = Slot::Present(value),
            "callee" => *self.callee.write() = Slot::Present(value),
            "caller" => {
                *self.caller.write() = match value {
                    Value::Null => CallerSlot::Null,
                    value => CallerSlot::Present(value),
                }
            }
            _ => match array_index(name) {
                Some(index) => self.put_index(index, value),
                None => self.core.properties().put(name, value),
            },
        }
    }

    fn has(&self, name: &str) -> bool {
        let own = match name {
            "length" => matches!(*self.length.read(), Slot::Present(_)),
            "callee" => matches!(*self.callee.read(), Slot::Present(_)),
            "caller" => !matches!(*self.caller.read(), CallerSlot::Missing),
            _ => match array_index(name) {
                Some(index) => return self.has_index(index),
                None => false,
            },
        };
        own || self.core.properties().has(name)
    }

    fn delete(&self, name: &str) -> bool {
        match name {
            "length" => *self.length.write() = Slot::Missing,
            "callee" => *self.callee.write() = Slot::Missing,
            "caller" => *self.caller.write() = CallerSlot::Missing,
            _ => {
                return match array_index(name) {
                    Some(index) => self.delete_index(index),
                    None => self.core.properties().delete(name),
                };
            }
        }
        true
    }

    fn get_index(&self, index: usize) -> Option<Value> {
        let value = self.elements.read().get(index);
        match value {
            Some(_) if self.is_shared(index) => Some(self.read_shared(index)),
            Some(value) => Some(value),
            None => self.core.properties().get(&index.to_string()),
        }
    }

    fn put_index(&self, index: usize, value: Value) {
        if self.elements.read().get(index).is_some() {
            if self.is_shared(index) {
                self.activation.put(&self.unit.arg_names()[index], value);
                return;
            }
            let mut elements = self.elements.write();
            // Re-check under the write lock: a concurrent delete wins.
            if elements.get(index).is_some() {
                elements.owned()[index] = Some(value);
                return;
            }
        }
        self.core.properties().put(&index.to_string(), value)
    }

    fn has_index(&self, index: usize) -> bool {
        self.elements.read().get(index).is_some() || self.core.properties().has(&index.to_string())
    }

    fn delete_index(&self, index: usize) -> bool {
        {
            let mut elements = self.elements.write();
            if elements.get(index).is_some() {
                elements.owned()[index] = None;
                return true;
            }
        }
        self.core.properties().delete(&index.to_string())
    }

    fn own_keys(&self) -> Vec<String> {
        let elements = self.elements.read();
        let mut keys: Vec<String> = (0..elements.len())
            .filter(|&i| elements.get(i).is_some())
            .map(|i| i.to_string())
            .collect();
        keys.extend(self.core.properties().keys());
        keys
    }

    fn elements(&self) -> Option<Vec<Value>> {
        let length = self.get("length").unwrap_or_default().to_uint32() as usize;
        Some(
            (0..length)
                .map(|i| self.get_index(i).unwrap_or_default())
                .collect(),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CallerInspection, EngineConfig, LanguageVersion};
    use crate::runtime::activation;
    use crate::runtime::object::downcast;
    use crate::runtime::test_support::{compile_function, context, context_with};

    fn make(cx: &Context, params: &[&str], args: Vec<Value>) -> (Arc<Activation>, ObjectRef) {
        let f = compile_function(cx, "f", params, &[], true);
        let activation = Activation::new(cx, &f, cx.global().clone(), None, Arc::from(args));
        let arguments = match activation.arguments() {
            Some(Value::Object(o)) => o,
            other => panic!("expected an arguments object, got {:?}", other),
        };
        (activation, arguments)
    }

    #[test]
    fn test_elements_alias_formals() {
        let cx = context();
        let (activation, arguments) = make(&cx, &["a"], vec![Value::from(1), Value::from(2)]);
        activation.put("a", Value::from(10));
        assert_eq!(arguments.get_index(0), Some(Value::from(10)));

        arguments.put_index(0, Value::from(20));
        assert_eq!(activation.get("a"), Some(Value::from(20)));

        // index 1 has no formal and is copied on write
        arguments.put_index(1, Value::from(30));
        assert_eq!(arguments.get_index(1), Some(Value::from(30)));
        assert_eq!(activation.original_args()[1], Value::from(2));
    }

    #[test]
    fn test_shadowed_duplicate_formal_is_not_aliased() {
        let cx = context();
        let (activation, arguments) = make(&cx, &["a", "a"], vec![Value::from(1), Value::from(2)]);
        activation.put("a", Value::from(9));
        assert_eq!(arguments.get_index(0), Some(Value::from(1)));
        assert_eq!(arguments.get_index(1), Some(Value::from(9)));
    }

    #[test]
    fn test_delete_severs_alias() {
        let cx = context();
        let (activation, arguments) = make(&cx, &["a"], vec![Value::from(1)]);
        assert!(arguments.delete_index(0));
        activation.put("a", Value::from(5));
        assert_eq!(arguments.get_index(0), None);
        assert!(!arguments.has_index(0));

        // a write after delete lands in ordinary storage
        arguments.put_index(0, Value::from(6));
        assert_eq!(arguments.get("0"), Some(Value::from(6)));
        assert_eq!(activation.get("a"), Some(Value::from(5)));
    }

    #[test]
    fn test_missing_formals_are_not_elements() {
        let cx = context();
        let (activation, arguments) = make(&cx, &["a", "b"], vec![Value::from(1)]);
        assert_eq!(arguments.get("length"), Some(Value::from(1)));
        assert_eq!(arguments.get_index(1), None);
        arguments.put_index(1, Value::from(2));
        assert_eq!(activation.get("b"), Some(Value::Undefined));
    }

    #[test]
    fn test_length_and_callee_are_independent_slots() {
        let cx = context();
        let (activation, arguments) = make(&cx, &[], vec![Value::from(1), Value::from(2)]);
        let callee = arguments.get("callee").unwrap();
        let function: ObjectRef = activation.function().clone();
        assert_eq!(callee, Value::Object(function));

        arguments.put("length", Value::from(1));
        assert_eq!(arguments.elements(), Some(vec![Value::from(1)]));

        assert!(arguments.delete("length"));
        assert!(!arguments.has("length"));
        assert!(arguments.has("callee"));
        assert_eq!(arguments.elements(), Some(Vec::new()));

        arguments.put("length", Value::from(2));
        assert_eq!(arguments.get("length"), Some(Value::from(2)));
    }

    #[test]
    fn test_caller_absent_in_default_version() {
        let cx = context();
        let (_, arguments) = make(&cx, &[], Vec::new());
        assert!(!arguments.has("caller"));
        assert_eq!(arguments.get("caller"), None);
    }

    #[test]
    fn test_legacy_caller_reads_calling_arguments() {
        let config = EngineConfig {
            language_version: LanguageVersion::V1_2,
            ..EngineConfig::default()
        };
        let cx = context_with(config);
        let (outer, outer_args) = make(&cx, &[], Vec::new());
        let (inner, inner_args) = make(&cx, &[], Vec::new());

        assert_eq!(inner_args.get("caller"), Some(Value::Null));
        let _outer = activation::enter(&outer);
        let _inner = activation::enter(&inner);
        assert_eq!(inner_args.get("caller"), Some(Value::Object(outer_args)));

        inner_args.put("caller", Value::from(3));
        assert_eq!(inner_args.get("caller"), Some(Value::from(3)));
    }

    #[test]
    fn test_denied_caller_reads_null() {
        let config = EngineConfig {
            language_version: LanguageVersion::V1_3,
            caller_inspection: CallerInspection::Deny,
            ..EngineConfig::default()
        };
        let cx = context_with(config);
        let (outer, _) = make(&cx, &[], Vec::new());
        let (inner, inner_args) = make(&cx, &[], Vec::new());
        let _outer = activation::enter(&outer);
        let _inner = activation::enter(&inner);
        assert_eq!(inner_args.get("caller"), Some(Value::Null));
    }

    #[test]
    fn test_class_and_downcast() {
        let cx = context();
        let (_, arguments) = make(&cx, &[], Vec::new());
        assert_eq!(arguments.class_name(), "Arguments");
        assert!(downcast::<ArgumentsObject>(&arguments).is_some());
        assert!(Arc::ptr_eq(&arguments.prototype().unwrap(), cx.object_prototype()));
    }
}
