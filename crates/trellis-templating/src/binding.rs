//! Expressions and the bindings that connect them to render targets.
//!
//! Expression parsing is out of scope; expressions are constructed directly.
//! Bindings evaluate once per bind (to-view, one time) and follow the common
//! bind/unbind contract: rebinding to the identical scope is a no-op, unbind
//! is a no-op unless bound.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use trellis_core::{
    BindingContext, Bindable, Dom, Event, LifecycleFlags, LifecycleState, ListenerId, NodeId,
    Scope, StateCell, Value,
};

#[derive(Clone, Debug)]
pub enum Expression {
    Literal(Value),
    /// A name looked up through the scope chain.
    AccessScope(String),
    AccessMember(Box<Expression>, String),
    /// Calls the function stored under the name with the current scope.
    CallScope(String),
}

impl Expression {
    pub fn scope(name: impl Into<String>) -> Self {
        Expression::AccessScope(name.into())
    }

    pub fn member(object: Expression, name: impl Into<String>) -> Self {
        Expression::AccessMember(Box::new(object), name.into())
    }

    pub fn call(name: impl Into<String>) -> Self {
        Expression::CallScope(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn evaluate(&self, scope: &Scope) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::AccessScope(name) => scope.get(name),
            Expression::AccessMember(object, name) => match object.evaluate(scope) {
                Value::Object(o) => o.get(name).unwrap_or_default(),
                _ => Value::Undefined,
            },
            Expression::CallScope(name) => match scope.get(name) {
                Value::Function(f) => f.call(scope),
                other => {
                    log::warn!("`{name}` is not a function (got {other:?})");
                    Value::Undefined
                }
            },
        }
    }

    pub fn assign(&self, scope: &Scope, value: Value) {
        match self {
            Expression::AccessScope(name) => scope.assign(name, value),
            Expression::AccessMember(object, name) => match object.evaluate(scope) {
                Value::Object(o) => o.set(name.as_str(), value),
                other => log::warn!("cannot assign `{name}` on {other:?}"),
            },
            other => log::warn!("expression {other:?} is not assignable"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum InterpolationPart {
    Text(String),
    Expression(Expression),
}

/// Literal text interleaved with expressions, e.g. `Hello ${name}!`.
#[derive(Clone, Debug, Default)]
pub struct Interpolation {
    pub parts: Vec<InterpolationPart>,
}

impl Interpolation {
    pub fn new() -> Self {
        Self::default()
    }

    /// An interpolation consisting of a single expression.
    pub fn of(expression: Expression) -> Self {
        Self::new().expr(expression)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(InterpolationPart::Text(text.into()));
        self
    }

    pub fn expr(mut self, expression: Expression) -> Self {
        self.parts.push(InterpolationPart::Expression(expression));
        self
    }

    pub fn evaluate(&self, scope: &Scope) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                InterpolationPart::Text(t) => out.push_str(t),
                InterpolationPart::Expression(e) => out.push_str(&e.evaluate(scope).to_string()),
            }
        }
        out
    }
}

/// Something a binding can write a named property on.
pub trait PropertyTarget {
    fn set_property(&self, name: &str, value: Value, flags: LifecycleFlags);
}

/// Shared bind/unbind bookkeeping for the simple bindings below.
#[derive(Default)]
struct BindingState {
    state: StateCell,
    scope: RefCell<Option<Scope>>,
}

impl BindingState {
    /// Returns `false` when the bind is a redundant rebind.
    fn begin_bind(&self, scope: &Scope, unbind: impl FnOnce()) -> bool {
        if self.state.get().is_bound() {
            let same = self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope));
            if same {
                return false;
            }
            unbind();
        }
        self.state.insert(LifecycleState::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        true
    }

    fn end_bind(&self) {
        self.state.insert(LifecycleState::IS_BOUND);
        self.state.remove(LifecycleState::IS_BINDING);
    }

    fn begin_unbind(&self) -> Option<Scope> {
        if !self.state.get().is_bound() {
            return None;
        }
        self.state.insert(LifecycleState::IS_UNBINDING);
        self.scope.borrow_mut().take()
    }

    fn end_unbind(&self) {
        self.state
            .remove(LifecycleState::IS_BOUND | LifecycleState::IS_UNBINDING);
    }

    fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }
}

/// Writes an interpolation into a text node.
pub struct TextBinding {
    dom: Dom,
    target: NodeId,
    interpolation: Interpolation,
    binding: BindingState,
}

impl TextBinding {
    pub fn new(dom: &Dom, target: NodeId, interpolation: Interpolation) -> Rc<Self> {
        Rc::new(Self {
            dom: dom.clone(),
            target,
            interpolation,
            binding: BindingState::default(),
        })
    }

    /// Re-evaluates against the bound scope.
    pub fn refresh(&self) {
        if let Some(scope) = self.binding.scope() {
            self.dom
                .set_text(self.target, self.interpolation.evaluate(&scope));
        }
    }
}

impl Bindable for TextBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        if !self
            .binding
            .begin_bind(scope, || self.unbind(flags | LifecycleFlags::FROM_BIND))
        {
            return;
        }
        self.dom
            .set_text(self.target, self.interpolation.evaluate(scope));
        self.binding.end_bind();
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if self.binding.begin_unbind().is_some() {
            self.binding.end_unbind();
        }
    }

    fn state(&self) -> LifecycleState {
        self.binding.state.get()
    }
}

pub enum BindingTarget {
    /// An attribute on a node.
    Attribute { node: NodeId, name: String },
    /// A bindable property of a component.
    Property {
        target: Weak<dyn PropertyTarget>,
        name: String,
    },
}

/// Pushes the value of an expression into a target once per bind.
pub struct PropertyBinding {
    dom: Dom,
    expression: Expression,
    target: BindingTarget,
    binding: BindingState,
}

impl PropertyBinding {
    pub fn new(dom: &Dom, expression: Expression, target: BindingTarget) -> Rc<Self> {
        Rc::new(Self {
            dom: dom.clone(),
            expression,
            target,
            binding: BindingState::default(),
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Re-evaluates the source and updates the target, e.g. after the source
    /// changed outside of a flush.
    pub fn refresh(&self, flags: LifecycleFlags) {
        if let Some(scope) = self.binding.scope() {
            self.update_target(&scope, flags);
        }
    }

    fn update_target(&self, scope: &Scope, flags: LifecycleFlags) {
        let value = self.expression.evaluate(scope);
        match &self.target {
            BindingTarget::Attribute { node, name } => {
                if value.is_nullish() {
                    self.dom.remove_attribute(*node, name);
                } else {
                    self.dom.set_attribute(*node, name, value.to_string());
                }
            }
            BindingTarget::Property { target, name } => match target.upgrade() {
                Some(target) => target.set_property(name, value, flags),
                None => log::warn!("property binding for `{name}` outlived its target"),
            },
        }
    }
}

impl Bindable for PropertyBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        let flags = flags | LifecycleFlags::FROM_BIND;
        if !self.binding.begin_bind(scope, || self.unbind(flags)) {
            return;
        }
        self.update_target(scope, flags);
        self.binding.end_bind();
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if self.binding.begin_unbind().is_some() {
            self.binding.end_unbind();
        }
    }

    fn state(&self) -> LifecycleState {
        self.binding.state.get()
    }
}

/// Invokes an expression when an event fires on its target node.
pub struct Listener {
    this: Weak<Listener>,
    dom: Dom,
    target: NodeId,
    event: String,
    expression: Expression,
    prevent_default: bool,
    handle: Cell<Option<ListenerId>>,
    binding: BindingState,
}

impl Listener {
    pub fn new(
        dom: &Dom,
        target: NodeId,
        event: impl Into<String>,
        expression: Expression,
        prevent_default: bool,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            dom: dom.clone(),
            target,
            event: event.into(),
            expression,
            prevent_default,
            handle: Cell::new(None),
            binding: BindingState::default(),
        })
    }

    /// Evaluates the handler with `$event` visible in the scope for the
    /// duration of the call.
    pub fn call_source(&self, event: &Event) -> Value {
        let Some(scope) = self.binding.scope() else {
            return Value::Undefined;
        };
        let details = BindingContext::new()
            .with("type", event.name.as_str())
            .with("target", event.target)
            .with("detail", event.detail.clone());
        let result = scope.with_override("$event", Value::Object(details), || {
            self.expression.evaluate(&scope)
        });
        if self.prevent_default && !matches!(result, Value::Bool(true)) {
            event.prevent_default();
        }
        result
    }
}

impl Bindable for Listener {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        if !self
            .binding
            .begin_bind(scope, || self.unbind(flags | LifecycleFlags::FROM_BIND))
        {
            return;
        }
        let this = self.this.clone();
        let id = self.dom.add_event_listener(
            self.target,
            self.event.as_str(),
            Rc::new(move |event: &Event| {
                if let Some(listener) = this.upgrade() {
                    listener.call_source(event);
                }
            }),
        );
        self.handle.set(Some(id));
        self.binding.end_bind();
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if self.binding.begin_unbind().is_none() {
            return;
        }
        if let Some(id) = self.handle.take() {
            self.dom.remove_event_listener(id);
        }
        self.binding.end_unbind();
    }

    fn state(&self) -> LifecycleState {
        self.binding.state.get()
    }
}

/// Evaluates an expression into the scope under a name, e.g. a `<let>`
/// element declaring a derived value for the rest of the template.
pub struct LetBinding {
    expression: Expression,
    name: String,
    to_binding_context: bool,
    binding: BindingState,
}

impl LetBinding {
    /// With `to_binding_context` the value is written into the scope's
    /// binding context, otherwise into its override context.
    pub fn new(expression: Expression, name: impl Into<String>, to_binding_context: bool) -> Rc<Self> {
        Rc::new(Self {
            expression,
            name: name.into(),
            to_binding_context,
            binding: BindingState::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refresh(&self) {
        if let Some(scope) = self.binding.scope() {
            self.update_target(&scope);
        }
    }

    fn update_target(&self, scope: &Scope) {
        let value = self.expression.evaluate(scope);
        if self.to_binding_context {
            scope.binding_context().set(self.name.as_str(), value);
        } else {
            scope.set_override(self.name.as_str(), value);
        }
    }
}

impl Bindable for LetBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        if !self
            .binding
            .begin_bind(scope, || self.unbind(flags | LifecycleFlags::FROM_BIND))
        {
            return;
        }
        self.update_target(scope);
        self.binding.end_bind();
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if self.binding.begin_unbind().is_some() {
            self.binding.end_unbind();
        }
    }

    fn state(&self) -> LifecycleState {
        self.binding.state.get()
    }
}

/// Exposes a node to the scope under a name while bound.
pub struct Ref {
    expression: Expression,
    target: NodeId,
    binding: BindingState,
}

impl Ref {
    pub fn new(name: impl Into<String>, target: NodeId) -> Rc<Self> {
        Rc::new(Self {
            expression: Expression::scope(name),
            target,
            binding: BindingState::default(),
        })
    }
}

impl Bindable for Ref {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        if !self
            .binding
            .begin_bind(scope, || self.unbind(flags | LifecycleFlags::FROM_BIND))
        {
            return;
        }
        self.expression.assign(scope, Value::Node(self.target));
        self.binding.end_bind();
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        let Some(scope) = self.binding.begin_unbind() else {
            return;
        };
        if self
            .expression
            .evaluate(&scope)
            .same(&Value::Node(self.target))
        {
            self.expression.assign(&scope, Value::Null);
        }
        self.binding.end_unbind();
    }

    fn state(&self) -> LifecycleState {
        self.binding.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Function;

    #[test]
    fn listener_injects_event_and_prevents_default() {
        let dom = Dom::new();
        let button = dom.create_element("button");
        let seen = Rc::new(RefCell::new(String::new()));
        let sink = seen.clone();
        let ctx = BindingContext::new().with(
            "onClick",
            Function::new(move |scope| {
                let event = scope.get("$event");
                let kind = event.as_object().and_then(|e| e.get("type"));
                *sink.borrow_mut() = kind.map(|k| k.to_string()).unwrap_or_default();
                Value::Undefined
            }),
        );
        let scope = Scope::create(ctx);
        let listener = Listener::new(&dom, button, "click", Expression::call("onClick"), true);

        listener.bind(LifecycleFlags::empty(), &scope);
        let allowed = dom.dispatch(&Event::new("click", button, Value::Undefined));

        assert!(!allowed);
        assert_eq!(*seen.borrow(), "click");
        assert!(scope.override_value("$event").is_none());

        listener.unbind(LifecycleFlags::empty());
        seen.borrow_mut().clear();
        assert!(dom.dispatch(&Event::new("click", button, Value::Undefined)));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn ref_clears_only_its_own_target() {
        let dom = Dom::new();
        let node = dom.create_element("input");
        let ctx = BindingContext::new();
        let scope = Scope::create(ctx.clone());
        let r = Ref::new("field", node);

        r.bind(LifecycleFlags::empty(), &scope);
        assert!(ctx.get("field").is_some_and(|v| v.same(&Value::Node(node))));

        r.unbind(LifecycleFlags::empty());
        assert!(ctx.get("field").is_some_and(|v| matches!(v, Value::Null)));
    }

    #[test]
    fn rebinding_same_scope_is_noop() {
        let dom = Dom::new();
        let text = dom.create_text("");
        let ctx = BindingContext::new().with("name", "a");
        let scope = Scope::create(ctx.clone());
        let binding = TextBinding::new(&dom, text, Interpolation::new().text("<").expr(Expression::scope("name")).text(">"));

        binding.bind(LifecycleFlags::empty(), &scope);
        ctx.set("name", "b");
        binding.bind(LifecycleFlags::empty(), &scope);
        assert_eq!(dom.text_content(text), "<a>");

        binding.refresh();
        assert_eq!(dom.text_content(text), "<b>");
    }

    #[test]
    fn let_binding_targets_override_or_binding_context() {
        let ctx = BindingContext::new().with("first", "Ada").with("last", "Lovelace");
        let scope = Scope::create(ctx.clone());
        let view_local = LetBinding::new(Expression::scope("first"), "name", false);
        view_local.bind(LifecycleFlags::empty(), &scope);
        assert!(scope.override_value("name").is_some_and(|v| v.to_string() == "Ada"));
        assert!(!ctx.has("name"));

        let model = LetBinding::new(Expression::scope("last"), "surname", true);
        model.bind(LifecycleFlags::empty(), &scope);
        ctx.set("last", "Byron");
        model.bind(LifecycleFlags::empty(), &scope);
        assert!(ctx.get("surname").is_some_and(|v| v.to_string() == "Lovelace"));
        model.refresh();
        assert!(ctx.get("surname").is_some_and(|v| v.to_string() == "Byron"));
    }
}
