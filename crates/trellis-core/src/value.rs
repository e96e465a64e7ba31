//! Dynamic values flowing through scopes and bindings.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::collection::Collection;
use crate::dom::NodeId;
use crate::scope::{BindingContext, Scope};

/// A map entry as observed through a `Map` collection.
#[derive(Debug)]
pub struct Entry {
    pub key: Value,
    pub value: Value,
}

/// A callable bound into a binding context, e.g. an event handler.
#[derive(Clone)]
pub struct Function(pub Rc<dyn Fn(&Scope) -> Value>);

impl Function {
    pub fn new(f: impl Fn(&Scope) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, scope: &Scope) -> Value {
        (self.0)(scope)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// A host-side object carried through scopes without interpretation, e.g. a
/// composition subject.
#[derive(Clone)]
pub struct Opaque(pub Rc<dyn Any>);

impl Opaque {
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque")
    }
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Node(NodeId),
    Object(BindingContext),
    Collection(Collection),
    Entry(Rc<Entry>),
    Function(Function),
    Opaque(Opaque),
}

impl Value {
    /// Strict identity: primitives compare by value, everything else by
    /// reference.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Collection(a), Value::Collection(b)) => a.ptr_eq(b),
            (Value::Entry(a), Value::Entry(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.0, &b.0),
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BindingContext> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn opaque<T: 'static>(value: T) -> Self {
        Value::Opaque(Opaque(Rc::new(value)))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Opaque(o) => o.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Renders the value the way a text binding shows it. `undefined` and `null`
/// render as the empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::Node(_) => f.write_str("[node]"),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Collection(c) => {
                let mut first = true;
                let mut result = Ok(());
                c.iterate(|item, _| {
                    if result.is_err() {
                        return;
                    }
                    if !first {
                        result = f.write_str(",");
                    }
                    first = false;
                    if result.is_ok() {
                        result = write!(f, "{item}");
                    }
                });
                result
            }
            Value::Entry(e) => write!(f, "{},{}", e.key, e.value),
            Value::Function(_) => f.write_str("[function]"),
            Value::Opaque(_) => f.write_str("[opaque]"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::Node(v)
    }
}

impl From<BindingContext> for Value {
    fn from(v: BindingContext) -> Self {
        Value::Object(v)
    }
}

impl From<Collection> for Value {
    fn from(v: Collection) -> Self {
        Value::Collection(v)
    }
}

impl From<Function> for Value {
    fn from(v: Function) -> Self {
        Value::Function(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_text_rendering() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from("b").to_string(), "b");
    }

    #[test]
    fn objects_compare_by_reference() {
        let a = BindingContext::new();
        let b = BindingContext::new();
        assert!(Value::from(a.clone()).same(&Value::from(a)));
        assert!(!Value::from(b).same(&Value::from(BindingContext::new())));
        assert!(Value::from(2).same(&Value::from(2.0)));
        assert!(!Value::from(f64::NAN).same(&Value::from(f64::NAN)));
    }
}
