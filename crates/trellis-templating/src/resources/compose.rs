//! `au-compose`: a containerless element that renders whatever its `subject`
//! resolves to, in place, using the scope of the template it sits in.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use trellis_core::{Bindable, Deferred, Hooks, LifecycleFlags, NodeId, Result, Value};

use crate::binding::Expression;
use crate::coordinator::CompositionCoordinator;
use crate::custom_element::{
    create_element, ComponentType, CustomElement, ElementBehavior, ElementType, RenderPlan,
};
use crate::template::{HydrateElement, RenderContext, Renderable, TemplateDefinition};
use crate::view::{ViewFactory, ViewRef};

pub const COMPOSE_NAME: &str = "au-compose";

/// Things `au-compose` knows how to turn into a view.
#[derive(Clone)]
pub enum Subject {
    View(ViewRef),
    Factory(Rc<ViewFactory>),
    Plan(Rc<RenderPlan>),
    /// Rendered as a single element, hydrated with the compose element's
    /// other properties.
    Component(Rc<dyn ComponentType>),
    Template(Rc<TemplateDefinition>),
    Pending(Deferred<Option<Subject>>),
}

impl Subject {
    /// Identity comparison.
    pub fn same(&self, other: &Subject) -> bool {
        match (self, other) {
            (Subject::View(a), Subject::View(b)) => Rc::ptr_eq(a, b),
            (Subject::Factory(a), Subject::Factory(b)) => Rc::ptr_eq(a, b),
            (Subject::Plan(a), Subject::Plan(b)) => Rc::ptr_eq(a, b),
            (Subject::Component(a), Subject::Component(b)) => Rc::ptr_eq(a, b),
            (Subject::Template(a), Subject::Template(b)) => Rc::ptr_eq(a, b),
            (Subject::Pending(a), Subject::Pending(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Subject> for Value {
    fn from(subject: Subject) -> Self {
        Value::opaque(subject)
    }
}

pub struct Compose {
    context: RenderContext,
    renderable: Weak<dyn Renderable>,
    coordinator: Rc<CompositionCoordinator>,
    subject: RefCell<Option<Subject>>,
    last_subject: RefCell<Option<Subject>>,
    composing: Rc<Cell<bool>>,
    properties: Vec<(String, Expression)>,
}

impl Compose {
    pub fn new(
        context: &RenderContext,
        renderable: Weak<dyn Renderable>,
        instruction: &HydrateElement,
    ) -> Self {
        let composing = Rc::new(Cell::new(false));
        let coordinator = CompositionCoordinator::new();
        let flag = composing.clone();
        coordinator.on_swap_complete(move || flag.set(false));

        let properties = instruction
            .properties
            .iter()
            .filter(|(name, _)| name != "subject" && name != "composing")
            .cloned()
            .collect();

        Self {
            context: context.clone(),
            renderable,
            coordinator,
            subject: RefCell::new(None),
            last_subject: RefCell::new(None),
            composing,
            properties,
        }
    }

    /// The component type to reference from `Instruction::Element`.
    pub fn element_type() -> Result<Rc<ElementType<Compose>>> {
        let definition = TemplateDefinition::new(COMPOSE_NAME).containerless().build();
        ElementType::new(definition, |context, renderable, instruction| {
            Compose::new(context, renderable, instruction)
        })
    }

    /// Whether a composition has started and not yet been swapped in.
    pub fn is_composing(&self) -> bool {
        self.composing.get()
    }

    pub fn coordinator(&self) -> &Rc<CompositionCoordinator> {
        &self.coordinator
    }

    fn start_composition(&self, owner: &CustomElement<Self>, subject: Option<Subject>) {
        let unchanged = match (&*self.last_subject.borrow(), &subject) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        *self.last_subject.borrow_mut() = subject.clone();
        self.composing.set(true);

        match subject {
            Some(Subject::Pending(pending)) => {
                let owner = owner.weak();
                let view = pending.map(move |subject| {
                    let owner = owner.upgrade()?;
                    owner.behavior().resolve_view(&owner, subject?)
                });
                self.coordinator.compose(view);
            }
            Some(subject) => {
                let view = self.resolve_view(owner, subject);
                self.coordinator.compose(view);
            }
            None => self.coordinator.compose(None::<ViewRef>),
        }
    }

    fn resolve_view(&self, owner: &CustomElement<Self>, subject: Subject) -> Option<ViewRef> {
        let view = match self.provide_view_for(subject) {
            Ok(view) => view?,
            Err(err) => {
                log::error!("`{COMPOSE_NAME}` could not create a view: {err}");
                return None;
            }
        };
        if let Some(host) = owner.host()
            && let Err(err) = view.hold(host)
        {
            log::error!("`{COMPOSE_NAME}` could not hold its view: {err}");
        }
        match self.renderable.upgrade().and_then(|r| r.scope()) {
            Some(scope) => view.lock_scope(&scope),
            None => log::debug!("`{COMPOSE_NAME}` has no owning scope to lock its view to"),
        }
        Some(view)
    }

    fn provide_view_for(&self, subject: Subject) -> Result<Option<ViewRef>> {
        let view = match subject {
            Subject::View(view) => view,
            Subject::Plan(plan) => plan.create_view(&self.context)?,
            Subject::Factory(factory) => factory.create()?,
            Subject::Template(definition) => {
                ViewFactory::from_definition(&self.context, definition).create()?
            }
            Subject::Component(component) => {
                create_element(component, self.properties.clone()).create_view(&self.context)?
            }
            Subject::Pending(_) => {
                log::warn!("`{COMPOSE_NAME}` subject resolved to another pending subject");
                return Ok(None);
            }
        };
        Ok(Some(view))
    }
}

impl ElementBehavior for Compose {
    const HOOKS: Hooks = Hooks::BINDING
        .union(Hooks::ATTACHING)
        .union(Hooks::DETACHING)
        .union(Hooks::UNBINDING)
        .union(Hooks::CACHING);

    fn binding(&self, owner: &CustomElement<Self>, flags: LifecycleFlags) {
        let subject = self.subject.borrow().clone();
        self.start_composition(owner, subject);
        self.coordinator.binding(flags, owner.scope());
    }

    fn attaching(
        &self,
        _owner: &CustomElement<Self>,
        encapsulation_source: Option<NodeId>,
        flags: LifecycleFlags,
    ) {
        self.coordinator.attaching(encapsulation_source, flags);
    }

    fn detaching(&self, _owner: &CustomElement<Self>, flags: LifecycleFlags) {
        self.coordinator.detaching(flags);
    }

    fn unbinding(&self, _owner: &CustomElement<Self>, flags: LifecycleFlags) {
        self.last_subject.borrow_mut().take();
        self.coordinator.unbinding(flags);
    }

    fn caching(&self, _owner: &CustomElement<Self>) {
        self.coordinator.caching();
    }

    fn set_property(
        &self,
        owner: &CustomElement<Self>,
        name: &str,
        value: Value,
        _flags: LifecycleFlags,
    ) {
        match name {
            "subject" => {
                let subject = if value.is_nullish() {
                    None
                } else {
                    let subject = value.downcast_ref::<Subject>().cloned();
                    if subject.is_none() {
                        log::warn!("`{COMPOSE_NAME}` cannot compose {value:?}");
                    }
                    subject
                };
                *self.subject.borrow_mut() = subject.clone();
                if owner.state().is_bound() {
                    self.start_composition(owner, subject);
                }
            }
            "composing" => {}
            _ if self.properties.iter().any(|(forwarded, _)| forwarded == name) => {
                log::trace!("`{COMPOSE_NAME}` forwards `{name}` to its component subject");
            }
            _ => log::warn!("`{COMPOSE_NAME}` has no bindable property `{name}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::PropertyTarget;
    use crate::custom_element::HydrateOptions;
    use crate::view::View;
    use trellis_core::{ChangeSet, Dom};

    #[test]
    fn extra_properties_stay_out_of_the_compose_scope() {
        let ctx = RenderContext::new(Dom::new(), ChangeSet::new());
        let root = ctx.dom.create_element("div");
        let host = ctx.dom.create_element(COMPOSE_NAME);
        ctx.dom.append_child(root, host).unwrap();
        let instruction = HydrateElement {
            component: Compose::element_type().unwrap(),
            properties: vec![
                ("subject".into(), Expression::scope("subject")),
                ("label".into(), Expression::literal("x")),
            ],
        };
        let renderable: Weak<dyn Renderable> = Weak::<View>::new();
        let element = CustomElement::hydrate(
            &ctx,
            host,
            TemplateDefinition::new(COMPOSE_NAME).containerless().build(),
            HydrateOptions::default(),
            Compose::new(&ctx, renderable, &instruction),
        )
        .unwrap();

        element.set_property("label", Value::from("x"), LifecycleFlags::empty());
        element.set_property("title", Value::from("y"), LifecycleFlags::empty());

        let context = element.scope().binding_context();
        assert!(!context.has("label"));
        assert!(!context.has("title"));
        assert_eq!(element.behavior().properties.len(), 1);
    }
}
