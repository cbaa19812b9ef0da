//! Scope chains and `with` scopes.
//!
//! A scope chain is a run of objects linked through their parent scope.
//! Name resolution checks each scope (and its prototype chain) from the
//! innermost outwards.

use super::object::{ObjectCore, Scriptable, get_property, has_property, top_level_scope};
use super::value::{ObjectRef, Value};
use crate::{Error, Result};
use std::any::Any;
use std::sync::Arc;

/// Scope pushed by a `with` statement.
///
/// The target object is the scope's prototype, so lookups reach its
/// properties through the ordinary prototype walk.
#[derive(Debug)]
pub struct WithScope {
    core: ObjectCore,
}

impl WithScope {
    /// Creates a scope exposing `target` in front of `parent`.
    pub fn new(target: ObjectRef, parent: ObjectRef) -> Arc<Self> {
        Arc::new(Self {
            core: ObjectCore::new(Some(target), Some(parent)),
        })
    }

    /// The object whose properties this scope exposes.
    pub fn target(&self) -> Option<ObjectRef> {
        self.core.prototype()
    }
}

impl Scriptable for WithScope {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn class_name(&self) -> &str {
        "With"
    }

    fn put(&self, name: &str, value: Value) {
        match self.target() {
            Some(target) => target.put(name, value),
            None => self.core.properties().put(name, value),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Finds the scope object that binds `name`.
pub fn bind(scope: &ObjectRef, name: &str) -> Option<ObjectRef> {
    let mut current = Some(scope.clone());
    while let Some(s) = current {
        if has_property(&s, name) {
            return Some(s);
        }
        current = s.parent_scope();
    }
    None
}

/// Resolves `name` along the scope chain.
pub fn lookup(scope: &ObjectRef, name: &str) -> Result<Value> {
    let mut current = Some(scope.clone());
    while let Some(s) = current {
        if let Some(value) = get_property(&s, name) {
            return Ok(value);
        }
        current = s.parent_scope();
    }
    Err(Error::ReferenceError(format!("{} is not defined", name)))
}

/// Assigns `name` in the scope that binds it, or in the top-level scope.
pub fn assign(scope: &ObjectRef, name: &str, value: Value) {
    let target = bind(scope, name).unwrap_or_else(|| top_level_scope(scope));
    target.put(name, value);
}
