//! Script object representation.
//!
//! Every object kind implements [`Scriptable`] on top of an [`ObjectCore`]
//! holding its ordinary properties, prototype and parent scope. Kinds with
//! exotic behavior (arrays, activations, `arguments`, functions) override
//! the accessors they need and fall back to the core for everything else.

use super::function::Callable;
use super::value::{ObjectRef, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A property descriptor.
#[derive(Debug, Clone)]
pub struct Property {
    /// The property value
    pub value: Value,
    /// Whether the property is writable
    pub writable: bool,
    /// Whether the property is enumerable
    pub enumerable: bool,
    /// Whether the property is configurable
    pub configurable: bool,
}

impl Property {
    /// An ordinary writable, enumerable, deletable property.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// A writable property skipped by enumeration.
    pub fn hidden(value: Value) -> Self {
        Self {
            enumerable: false,
            ..Self::new(value)
        }
    }

    /// A property that cannot be deleted.
    pub fn permanent(value: Value) -> Self {
        Self {
            configurable: false,
            ..Self::new(value)
        }
    }

    /// A read-only, hidden, permanent property.
    pub fn read_only(value: Value) -> Self {
        Self {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

/// Named property storage.
#[derive(Default)]
pub struct PropertyMap {
    map: RwLock<FxHashMap<String, Property>>,
}

impl PropertyMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a property value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.map.read().get(name).map(|p| p.value.clone())
    }

    /// Gets a full property descriptor.
    pub fn property(&self, name: &str) -> Option<Property> {
        self.map.read().get(name).cloned()
    }

    /// Checks if a property exists.
    pub fn has(&self, name: &str) -> bool {
        self.map.read().contains_key(name)
    }

    /// Sets a property value, creating an ordinary property if absent.
    /// Writes to read-only properties are ignored.
    pub fn put(&self, name: &str, value: Value) {
        let mut map = self.map.write();
        match map.get_mut(name) {
            Some(prop) => {
                if prop.writable {
                    prop.value = value;
                }
            }
            None => {
                map.insert(name.to_string(), Property::new(value));
            }
        }
    }

    /// Defines or replaces a property with explicit attributes.
    pub fn define(&self, name: &str, property: Property) {
        self.map.write().insert(name.to_string(), property);
    }

    /// Deletes a property. Returns false only for permanent properties.
    pub fn delete(&self, name: &str) -> bool {
        let mut map = self.map.write();
        match map.get(name) {
            Some(prop) if !prop.configurable => false,
            Some(_) => {
                map.remove(name);
                true
            }
            None => true,
        }
    }

    /// Names of enumerable properties, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .map
            .read()
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns true if there are no properties.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl fmt::Debug for PropertyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may point back at the owner; print names only.
        let mut names: Vec<String> = self.map.read().keys().cloned().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

/// State shared by every object kind.
#[derive(Default)]
pub struct ObjectCore {
    properties: PropertyMap,
    prototype: RwLock<Option<ObjectRef>>,
    parent: RwLock<Option<ObjectRef>>,
}

impl ObjectCore {
    /// Creates a core with the given prototype and parent scope.
    pub fn new(prototype: Option<ObjectRef>, parent: Option<ObjectRef>) -> Self {
        Self {
            properties: PropertyMap::new(),
            prototype: RwLock::new(prototype),
            parent: RwLock::new(parent),
        }
    }

    /// Ordinary property storage.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// The prototype object.
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.read().clone()
    }

    /// Replaces the prototype object.
    pub fn set_prototype(&self, prototype: Option<ObjectRef>) {
        *self.prototype.write() = prototype;
    }

    /// The enclosing scope.
    pub fn parent_scope(&self) -> Option<ObjectRef> {
        self.parent.read().clone()
    }

    /// Replaces the enclosing scope.
    pub fn set_parent_scope(&self, parent: Option<ObjectRef>) {
        *self.parent.write() = parent;
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCore")
            .field("properties", &self.properties)
            .field("has_prototype", &self.prototype.read().is_some())
            .field("has_parent", &self.parent.read().is_some())
            .finish()
    }
}

/// Parses a canonical array index (`"0"`, `"12"`, not `"012"`).
pub fn array_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// A script object.
///
/// `get*` return `None` when the object itself has no such property; the
/// prototype chain is walked by [`get_property`].
pub trait Scriptable: Send + Sync + fmt::Debug + 'static {
    /// Common object state.
    fn core(&self) -> &ObjectCore;

    /// Class name used by `[object Class]`.
    fn class_name(&self) -> &str {
        "Object"
    }

    /// Gets an own named property.
    fn get(&self, name: &str) -> Option<Value> {
        self.core().properties().get(name)
    }

    /// Sets a named property.
    fn put(&self, name: &str, value: Value) {
        self.core().properties().put(name, value)
    }

    /// Defines a named property with explicit attributes.
    fn define(&self, name: &str, property: Property) {
        self.core().properties().define(name, property)
    }

    /// Checks for an own named property.
    fn has(&self, name: &str) -> bool {
        self.core().properties().has(name)
    }

    /// Deletes a named property.
    fn delete(&self, name: &str) -> bool {
        self.core().properties().delete(name)
    }

    /// Gets an own indexed property.
    fn get_index(&self, index: usize) -> Option<Value> {
        self.core().properties().get(&index.to_string())
    }

    /// Sets an indexed property.
    fn put_index(&self, index: usize, value: Value) {
        self.core().properties().put(&index.to_string(), value)
    }

    /// Checks for an own indexed property.
    fn has_index(&self, index: usize) -> bool {
        self.core().properties().has(&index.to_string())
    }

    /// Deletes an indexed property.
    fn delete_index(&self, index: usize) -> bool {
        self.core().properties().delete(&index.to_string())
    }

    /// Enumerable own property names.
    fn own_keys(&self) -> Vec<String> {
        self.core().properties().keys()
    }

    /// The prototype object.
    fn prototype(&self) -> Option<ObjectRef> {
        self.core().prototype()
    }

    /// Replaces the prototype object.
    fn set_prototype(&self, prototype: Option<ObjectRef>) {
        self.core().set_prototype(prototype)
    }

    /// The enclosing scope.
    fn parent_scope(&self) -> Option<ObjectRef> {
        self.core().parent_scope()
    }

    /// Replaces the enclosing scope.
    fn set_parent_scope(&self, parent: Option<ObjectRef>) {
        self.core().set_parent_scope(parent)
    }

    /// The call interface, for functions.
    fn as_callable(&self) -> Option<&dyn Callable> {
        None
    }

    /// Elements of an array-like object, for `Function.prototype.apply`.
    fn elements(&self) -> Option<Vec<Value>> {
        None
    }

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
}

/// Gets a named property, walking the prototype chain.
pub fn get_property(obj: &ObjectRef, name: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        if let Some(value) = o.get(name) {
            return Some(value);
        }
        current = o.prototype();
    }
    None
}

/// Gets an indexed property, walking the prototype chain.
pub fn get_index_property(obj: &ObjectRef, index: usize) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        if let Some(value) = o.get_index(index) {
            return Some(value);
        }
        current = o.prototype();
    }
    None
}

/// Checks for a named property anywhere on the prototype chain.
pub fn has_property(obj: &ObjectRef, name: &str) -> bool {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        if o.has(name) {
            return true;
        }
        current = o.prototype();
    }
    false
}

/// Follows parent links to the outermost scope.
pub fn top_level_scope(obj: &ObjectRef) -> ObjectRef {
    let mut scope = obj.clone();
    while let Some(parent) = scope.parent_scope() {
        scope = parent;
    }
    scope
}

/// Downcasts an object handle to a concrete kind.
pub fn downcast<T: Scriptable>(obj: &ObjectRef) -> Option<&T> {
    obj.as_any().downcast_ref::<T>()
}

// ============================================================================
// Ordinary objects
// ============================================================================

/// An ordinary object, optionally wrapping a primitive.
#[derive(Debug)]
pub struct PlainObject {
    core: ObjectCore,
    class: &'static str,
    primitive: Option<Value>,
}

impl PlainObject {
    /// Creates an empty `Object`.
    pub fn new(prototype: Option<ObjectRef>) -> Arc<Self> {
        Self::with_class("Object", prototype, None)
    }

    /// Creates an object of class `class`, wrapping `primitive` if given.
    pub fn with_class(class: &'static str, prototype: Option<ObjectRef>, primitive: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            core: ObjectCore::new(prototype, None),
            class,
            primitive,
        })
    }

    /// The wrapped primitive of a `Boolean`, `Number` or `String` object.
    pub fn primitive(&self) -> Option<&Value> {
        self.primitive.as_ref()
    }
}

impl Scriptable for PlainObject {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn class_name(&self) -> &str {
        self.class
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A dense array.
#[derive(Debug)]
pub struct ArrayObject {
    core: ObjectCore,
    elements: RwLock<Vec<Value>>,
}

impl ArrayObject {
    /// Creates an array holding `values`.
    pub fn new(prototype: Option<ObjectRef>, values: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            core: ObjectCore::new(prototype, None),
            elements: RwLock::new(values),
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }
}

impl Scriptable for ArrayObject {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn class_name(&self) -> &str {
        "Array"
    }

    fn get(&self, name: &str) -> Option<Value> {
        if name == "length" {
            return Some(Value::from(self.len()));
        }
        match array_index(name) {
            Some(index) => self.get_index(index),
            None => self.core.properties().get(name),
        }
    }

    fn put(&self, name: &str, value: Value) {
        if name == "length" {
            let len = value.to_uint32() as usize;
            self.elements.write().resize(len, Value::Undefined);
            return;
        }
        match array_index(name) {
            Some(index) => self.put_index(index, value),
            None => self.core.properties().put(name, value),
        }
    }

    fn has(&self, name: &str) -> bool {
        name == "length"
            || match array_index(name) {
                Some(index) => self.has_index(index),
                None => self.core.properties().has(name),
            }
    }

    fn delete(&self, name: &str) -> bool {
        match name {
            "length" => false,
            _ => match array_index(name) {
                Some(index) => self.delete_index(index),
                None => self.core.properties().delete(name),
            },
        }
    }

    fn get_index(&self, index: usize) -> Option<Value> {
        self.elements.read().get(index).cloned()
    }

    fn put_index(&self, index: usize, value: Value) {
        let mut elements = self.elements.write();
        if index >= elements.len() {
            elements.resize(index + 1, Value::Undefined);
        }
        elements[index] = value;
    }

    fn has_index(&self, index: usize) -> bool {
        index < self.len()
    }

    fn delete_index(&self, index: usize) -> bool {
        if let Some(slot) = self.elements.write().get_mut(index) {
            *slot = Value::Undefined;
        }
        true
    }

    fn own_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = (0..self.len()).map(|i| i.to_string()).collect();
        keys.extend(self.core.properties().keys());
        keys
    }

    fn elements(&self) -> Option<Vec<Value>> {
        Some(self.elements.read().clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
