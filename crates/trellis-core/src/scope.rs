//! Binding contexts and scopes.
//!
//! A [`Scope`] pairs a binding context (the object expressions evaluate
//! against) with an override context for contextual names such as `$index`
//! or `$event`, and optionally a parent scope. Name lookup walks
//! override → binding context → parent.
//!
//! Both types are reference-counted handles; identity (`ptr_eq`) is what the
//! lifecycle uses to decide whether a rebind is a no-op.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

#[derive(Clone, Default)]
pub struct BindingContext(Rc<RefCell<HashMap<String, Value>>>);

impl BindingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.borrow_mut().remove(name)
    }

    pub fn ptr_eq(&self, other: &BindingContext) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingContext({:p})", Rc::as_ptr(&self.0))
    }
}

struct ScopeInner {
    binding_context: BindingContext,
    override_context: RefCell<HashMap<String, Value>>,
    parent: Option<Scope>,
}

#[derive(Clone)]
pub struct Scope(Rc<ScopeInner>);

impl Scope {
    pub fn create(binding_context: BindingContext) -> Self {
        Self(Rc::new(ScopeInner {
            binding_context,
            override_context: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn from_parent(parent: &Scope, binding_context: BindingContext) -> Self {
        Self(Rc::new(ScopeInner {
            binding_context,
            override_context: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn binding_context(&self) -> &BindingContext {
        &self.0.binding_context
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    pub fn get(&self, name: &str) -> Value {
        if let Some(v) = self.0.override_context.borrow().get(name) {
            return v.clone();
        }
        if let Some(v) = self.0.binding_context.get(name) {
            return v;
        }
        match &self.0.parent {
            Some(parent) => parent.get(name),
            None => Value::Undefined,
        }
    }

    pub fn set_override(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0
            .override_context
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    pub fn override_value(&self, name: &str) -> Option<Value> {
        self.0.override_context.borrow().get(name).cloned()
    }

    /// Assigns `name` on the nearest context that already defines it, falling
    /// back to this scope's binding context.
    pub fn assign(&self, name: &str, value: Value) {
        let mut cursor = Some(self);
        while let Some(scope) = cursor {
            if let Some(slot) = scope.0.override_context.borrow_mut().get_mut(name) {
                *slot = value;
                return;
            }
            if scope.0.binding_context.has(name) {
                scope.0.binding_context.set(name, value);
                return;
            }
            cursor = scope.parent();
        }
        self.0.binding_context.set(name, value);
    }

    /// Runs `f` with `name` temporarily overridden on this scope. The previous
    /// override (if any) is restored afterwards, even if `f` panics.
    pub fn with_override<R>(&self, name: &str, value: Value, f: impl FnOnce() -> R) -> R {
        struct Restore<'a> {
            scope: &'a Scope,
            name: &'a str,
            previous: Option<Value>,
        }
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                let mut ctx = self.scope.0.override_context.borrow_mut();
                match self.previous.take() {
                    Some(v) => {
                        ctx.insert(self.name.to_string(), v);
                    }
                    None => {
                        ctx.remove(self.name);
                    }
                }
            }
        }

        let previous = self
            .0
            .override_context
            .borrow_mut()
            .insert(name.to_string(), value);
        let _restore = Restore {
            scope: self,
            name,
            previous,
        };
        f()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("binding_context", &self.0.binding_context)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_override_then_context_then_parent() {
        let root = Scope::create(BindingContext::new().with("a", 1).with("b", 2));
        let child = Scope::from_parent(&root, BindingContext::new().with("b", 3));
        child.set_override("$index", 0);

        assert!(child.get("a").same(&Value::from(1)));
        assert!(child.get("b").same(&Value::from(3)));
        assert!(child.get("$index").same(&Value::from(0)));
        assert!(matches!(child.get("missing"), Value::Undefined));
    }

    #[test]
    fn with_override_restores_previous_value() {
        let scope = Scope::create(BindingContext::new());
        scope.with_override("$event", Value::from("click"), || {
            assert!(scope.get("$event").same(&Value::from("click")));
        });
        assert!(scope.override_value("$event").is_none());
    }

    #[test]
    fn assign_targets_defining_context() {
        let root = Scope::create(BindingContext::new().with("count", 1));
        let child = Scope::from_parent(&root, BindingContext::new());
        child.assign("count", Value::from(5));
        assert!(root.get("count").same(&Value::from(5)));
        assert!(!child.binding_context().has("count"));
    }
}
