//! `if` / `else` template controllers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use trellis_core::{Bindable, Hooks, LifecycleFlags, NodeId, Value};

use crate::coordinator::CompositionCoordinator;
use crate::custom_attribute::{AttributeBehavior, CustomAttribute};
use crate::template::RenderContext;
use crate::view::{ViewFactory, ViewRef};

/// Shows the `if` view while `value` is truthy, the linked `else` view (if
/// any) otherwise. Changes made outside a flush are deferred to the change
/// set.
pub struct If {
    context: RenderContext,
    if_factory: Rc<ViewFactory>,
    else_factory: RefCell<Option<Rc<ViewFactory>>>,
    location: NodeId,
    value: Cell<bool>,
    if_view: RefCell<Option<ViewRef>>,
    else_view: RefCell<Option<ViewRef>>,
    coordinator: Rc<CompositionCoordinator>,
}

impl If {
    pub fn create(
        context: &RenderContext,
        factory: Rc<ViewFactory>,
        location: NodeId,
    ) -> Rc<CustomAttribute<If>> {
        CustomAttribute::new(Self {
            context: context.clone(),
            if_factory: factory,
            else_factory: RefCell::new(None),
            location,
            value: Cell::new(false),
            if_view: RefCell::new(None),
            else_view: RefCell::new(None),
            coordinator: CompositionCoordinator::new(),
        })
    }

    pub fn value(&self) -> bool {
        self.value.get()
    }

    pub fn coordinator(&self) -> &Rc<CompositionCoordinator> {
        &self.coordinator
    }

    fn update_view(&self) -> Option<ViewRef> {
        if self.value.get() {
            return self.ensure_view(&self.if_view, &self.if_factory);
        }
        let else_factory = self.else_factory.borrow().clone();
        else_factory.and_then(|factory| self.ensure_view(&self.else_view, &factory))
    }

    fn ensure_view(
        &self,
        slot: &RefCell<Option<ViewRef>>,
        factory: &Rc<ViewFactory>,
    ) -> Option<ViewRef> {
        let existing = slot.borrow().clone();
        let view = match existing {
            Some(view) => view,
            None => match factory.create() {
                Ok(view) => view,
                Err(err) => {
                    log::error!("`if` could not create a view: {err}");
                    return None;
                }
            },
        };
        if let Err(err) = view.hold(self.location) {
            log::error!("`if` could not hold its view: {err}");
        }
        *slot.borrow_mut() = Some(view.clone());
        Some(view)
    }

    fn release(slot: &RefCell<Option<ViewRef>>) {
        let view = slot.borrow().clone();
        if let Some(view) = view
            && view.release()
        {
            slot.borrow_mut().take();
        }
    }
}

impl AttributeBehavior for If {
    const NAME: &'static str = "if";
    const HOOKS: Hooks = Hooks::BINDING
        .union(Hooks::ATTACHING)
        .union(Hooks::DETACHING)
        .union(Hooks::UNBINDING)
        .union(Hooks::CACHING);

    fn binding(&self, owner: &CustomAttribute<Self>, flags: LifecycleFlags) {
        self.coordinator.compose(self.update_view());
        if let Some(scope) = owner.scope() {
            self.coordinator.binding(flags, &scope);
        }
    }

    fn attaching(
        &self,
        _owner: &CustomAttribute<Self>,
        encapsulation_source: Option<NodeId>,
        flags: LifecycleFlags,
    ) {
        self.coordinator.attaching(encapsulation_source, flags);
    }

    fn detaching(&self, _owner: &CustomAttribute<Self>, flags: LifecycleFlags) {
        self.coordinator.detaching(flags);
    }

    fn unbinding(&self, _owner: &CustomAttribute<Self>, flags: LifecycleFlags) {
        self.coordinator.unbinding(flags);
    }

    fn caching(&self, _owner: &CustomAttribute<Self>) {
        Self::release(&self.if_view);
        Self::release(&self.else_view);
        self.coordinator.caching();
    }

    fn set_property(
        &self,
        owner: &CustomAttribute<Self>,
        name: &str,
        value: Value,
        flags: LifecycleFlags,
    ) {
        if name != "value" {
            log::warn!("`if` has no bindable property `{name}`");
            return;
        }
        let value = value.is_truthy();
        if self.value.replace(value) == value || !owner.state().is_bound() {
            return;
        }
        if flags.contains(LifecycleFlags::FROM_FLUSH_CHANGES) {
            self.coordinator.compose(self.update_view());
        } else if let Some(this) = owner.rc() {
            self.context.change_set.add(this);
        }
    }

    fn flush_changes(&self, _owner: &CustomAttribute<Self>) {
        self.coordinator.compose(self.update_view());
    }
}

/// Supplies the view shown when the linked `if` is falsy.
pub struct Else {
    factory: Rc<ViewFactory>,
}

impl Else {
    pub fn new(factory: Rc<ViewFactory>) -> Self {
        Self { factory }
    }

    pub fn link(&self, if_behavior: &If) {
        *if_behavior.else_factory.borrow_mut() = Some(self.factory.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::PropertyTarget;
    use crate::template::{NodeSpec, TemplateDefinition};
    use trellis_core::{Attachable, BindingContext, ChangeQueue, ChangeSet, Dom, Scope};

    #[test]
    fn falsy_without_else_shows_nothing() {
        let changes = ChangeSet::new();
        let ctx = RenderContext::new(Dom::new(), changes.clone());
        let root = ctx.dom.create_element("div");
        let location = ctx.dom.create_render_location();
        ctx.dom.append_child(root, location).unwrap();

        let definition = TemplateDefinition::new("shown").node(NodeSpec::text("yes")).build();
        let factory = ViewFactory::from_definition(&ctx, definition);
        let attribute = If::create(&ctx, factory, location);

        attribute.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        attribute.attach(Some(root), LifecycleFlags::empty());
        assert_eq!(ctx.dom.text_content(root), "");

        attribute.set_property("value", Value::from(true), LifecycleFlags::empty());
        assert_eq!(ctx.dom.text_content(root), "");
        assert_eq!(changes.size(), 1);

        changes.flush_changes();
        assert_eq!(ctx.dom.text_content(root), "yes");
    }
}
