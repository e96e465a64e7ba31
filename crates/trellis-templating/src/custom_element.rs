//! Custom elements.
//!
//! A [`CustomElement`] owns the nodes rendered from its definition and the
//! bindables/attachables created for them. It always binds to its own
//! scope, and hands its nodes to a [`Projector`] when mounted.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{
    Attachable, Bindable, BindingContext, ChildList, Error, Hooks, Lifecycle, LifecycleCallbacks,
    LifecycleFlags, LifecycleState, Mountable, NodeId, NodeSequence, Result, Scope, StateCell,
    Value,
};

use crate::binding::PropertyTarget;
use crate::projector::Projector;
use crate::template::{
    CompiledTemplate, HydrateElement, Instruction, NodeSpec, RenderContext, Renderable, Template,
    TemplateDefinition,
};
use crate::view::{ViewFactory, ViewRef};

/// The behavior-specific part of a custom element.
pub trait ElementBehavior: Sized + 'static {
    const HOOKS: Hooks = Hooks::empty();

    fn created(&self, _owner: &CustomElement<Self>) {}
    fn binding(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn bound(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn attaching(
        &self,
        _owner: &CustomElement<Self>,
        _encapsulation_source: Option<NodeId>,
        _flags: LifecycleFlags,
    ) {
    }
    fn attached(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn detaching(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn detached(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn unbinding(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn unbound(&self, _owner: &CustomElement<Self>, _flags: LifecycleFlags) {}
    fn caching(&self, _owner: &CustomElement<Self>) {}

    /// By default bindable properties land in the element's own binding
    /// context, where its template can read them.
    fn set_property(
        &self,
        owner: &CustomElement<Self>,
        name: &str,
        value: Value,
        _flags: LifecycleFlags,
    ) {
        owner.scope().binding_context().set(name, value);
    }
}

/// An element with no behavior beyond its template.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlOnly;

impl ElementBehavior for HtmlOnly {}

#[derive(Debug, Default, Clone, Copy)]
pub struct HydrateOptions {
    /// The host is the application root.
    pub app_host: bool,
}

pub struct CustomElement<B> {
    this: Weak<Self>,
    name: String,
    context: RenderContext,
    state: StateCell,
    scope: Scope,
    nodes: RefCell<NodeSequence>,
    projector: RefCell<Option<Projector>>,
    bindables: RefCell<ChildList<Rc<dyn Bindable>>>,
    attachables: RefCell<ChildList<Rc<dyn Attachable>>>,
    behavior: B,
}

impl<B: ElementBehavior> CustomElement<B> {
    /// Renders `definition` for the element on `host` and picks its
    /// projector.
    pub fn hydrate(
        context: &RenderContext,
        host: NodeId,
        definition: Rc<TemplateDefinition>,
        options: HydrateOptions,
        behavior: B,
    ) -> Result<Rc<Self>> {
        let element = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            name: definition.name.clone(),
            context: context.clone(),
            state: StateCell::new(LifecycleState::NEEDS_MOUNT),
            scope: Scope::create(BindingContext::new()),
            nodes: RefCell::new(NodeSequence::empty(&context.dom)),
            projector: RefCell::new(None),
            bindables: RefCell::new(ChildList::new()),
            attachables: RefCell::new(ChildList::new()),
            behavior,
        });

        let template = CompiledTemplate::new(context, definition.clone());
        let nodes = template.render(&*element)?;
        *element.nodes.borrow_mut() = nodes;

        let projector = Projector::determine(&context.dom, host, &definition, options.app_host)?;
        *element.projector.borrow_mut() = Some(projector);
        log::debug!("hydrated `{}`", element.name);

        if B::HOOKS.contains(Hooks::CREATED) {
            element.behavior.created(&element);
        }
        Ok(element)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// The element's own scope. Its binding context holds the element's
    /// bindable properties.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn nodes(&self) -> NodeSequence {
        self.nodes.borrow().clone()
    }

    /// The node standing for the element in the document.
    pub fn host(&self) -> Option<NodeId> {
        self.projector.borrow().as_ref().map(Projector::host)
    }

    pub fn weak(&self) -> Weak<Self> {
        self.this.clone()
    }

    pub fn rc(&self) -> Option<Rc<Self>> {
        self.this.upgrade()
    }

    fn callbacks(&self) -> Option<Rc<dyn LifecycleCallbacks>> {
        self.this.upgrade().map(|this| this as Rc<dyn LifecycleCallbacks>)
    }

    /// Attaches the element and its children, failing if the projector has
    /// no encapsulation source to hand out.
    pub fn try_attach(
        &self,
        encapsulation_source: Option<NodeId>,
        flags: LifecycleFlags,
    ) -> Result<()> {
        if self.state.get().is_attached() {
            return Ok(());
        }
        let source = match self.projector.borrow().as_ref() {
            Some(projector) => projector.provide_encapsulation_source(encapsulation_source, &self.name)?,
            None => return Err(Error::MissingEncapsulationSource(self.name.clone())),
        };
        self.state.insert(LifecycleState::IS_ATTACHING);
        let flags = flags | LifecycleFlags::FROM_ATTACH;

        let hooks = B::HOOKS;
        Lifecycle::begin_attach();
        if let Some(this) = self.this.upgrade() {
            Lifecycle::enqueue_mount(this, flags);
        }
        if hooks.contains(Hooks::ATTACHING) {
            self.behavior.attaching(self, Some(source), flags);
        }
        let attachables = self.attachables.borrow().snapshot();
        for attachable in attachables {
            attachable.attach(Some(source), flags);
        }

        self.state.insert(LifecycleState::IS_ATTACHED);
        self.state.remove(LifecycleState::IS_ATTACHING);
        if hooks.contains(Hooks::ATTACHED)
            && let Some(this) = self.callbacks()
        {
            Lifecycle::enqueue_attached(this, flags);
        }
        Lifecycle::end_attach();
        Ok(())
    }
}

impl<B: ElementBehavior> Bindable for CustomElement<B> {
    /// Elements bind to their own scope; the scope passed in is ignored.
    fn bind(&self, flags: LifecycleFlags, _scope: &Scope) {
        if self.state.get().is_bound() {
            return;
        }
        self.state.insert(LifecycleState::IS_BINDING);
        let flags = flags | LifecycleFlags::FROM_BIND;

        let hooks = B::HOOKS;
        Lifecycle::begin_bind();
        if hooks.contains(Hooks::BOUND)
            && let Some(this) = self.callbacks()
        {
            Lifecycle::enqueue_bound(this, flags);
        }
        if hooks.contains(Hooks::BINDING) {
            self.behavior.binding(self, flags);
        }
        let bindables = self.bindables.borrow().snapshot();
        for bindable in bindables {
            bindable.bind(flags, &self.scope);
        }

        self.state.insert(LifecycleState::IS_BOUND);
        self.state.remove(LifecycleState::IS_BINDING);
        Lifecycle::end_bind();
    }

    fn unbind(&self, flags: LifecycleFlags) {
        if !self.state.get().is_bound() {
            return;
        }
        self.state.insert(LifecycleState::IS_UNBINDING);
        let flags = flags | LifecycleFlags::FROM_UNBIND;

        let hooks = B::HOOKS;
        Lifecycle::begin_unbind();
        if hooks.contains(Hooks::UNBOUND)
            && let Some(this) = self.callbacks()
        {
            Lifecycle::enqueue_unbound(this, flags);
        }
        if hooks.contains(Hooks::UNBINDING) {
            self.behavior.unbinding(self, flags);
        }
        let bindables = self.bindables.borrow().snapshot_rev();
        for bindable in bindables {
            bindable.unbind(flags);
        }

        self.state
            .remove(LifecycleState::IS_BOUND | LifecycleState::IS_UNBINDING);
        Lifecycle::end_unbind();
    }

    fn state(&self) -> LifecycleState {
        self.state.get()
    }
}

impl<B: ElementBehavior> Attachable for CustomElement<B> {
    fn attach(&self, encapsulation_source: Option<NodeId>, flags: LifecycleFlags) {
        if let Err(err) = self.try_attach(encapsulation_source, flags) {
            log::error!("failed to attach `{}`: {err}", self.name);
        }
    }

    fn detach(&self, flags: LifecycleFlags) {
        if !self.state.get().is_attached() {
            return;
        }
        self.state.insert(LifecycleState::IS_DETACHING);
        let flags = flags | LifecycleFlags::FROM_DETACH;

        let hooks = B::HOOKS;
        Lifecycle::begin_detach();
        if let Some(this) = self.this.upgrade() {
            Lifecycle::enqueue_unmount(this, flags);
        }
        if hooks.contains(Hooks::DETACHING) {
            self.behavior.detaching(self, flags);
        }
        let attachables = self.attachables.borrow().snapshot_rev();
        for attachable in attachables {
            attachable.detach(flags);
        }

        self.state
            .remove(LifecycleState::IS_ATTACHED | LifecycleState::IS_DETACHING);
        if hooks.contains(Hooks::DETACHED)
            && let Some(this) = self.callbacks()
        {
            Lifecycle::enqueue_detached(this, flags);
        }
        Lifecycle::end_detach();
    }

    fn cache(&self) {
        if B::HOOKS.contains(Hooks::CACHING) {
            self.behavior.caching(self);
        }
        let attachables = self.attachables.borrow().snapshot_rev();
        for attachable in attachables {
            attachable.cache();
        }
    }
}

impl<B: ElementBehavior> Mountable for CustomElement<B> {
    fn mount(&self, _flags: LifecycleFlags) {
        let projector = self.projector.borrow();
        let Some(projector) = projector.as_ref() else {
            return;
        };
        let nodes = self.nodes.borrow().clone();
        if let Err(err) = projector.project(&nodes, &self.state) {
            log::error!("failed to project `{}`: {err}", self.name);
        }
    }

    fn unmount(&self, _flags: LifecycleFlags) -> bool {
        let projector = self.projector.borrow();
        if let Some(projector) = projector.as_ref() {
            let nodes = self.nodes.borrow().clone();
            projector.take(&nodes, &self.state);
        }
        false
    }
}

impl<B: ElementBehavior> LifecycleCallbacks for CustomElement<B> {
    fn bound(&self, flags: LifecycleFlags) {
        self.behavior.bound(self, flags);
    }

    fn unbound(&self, flags: LifecycleFlags) {
        self.behavior.unbound(self, flags);
    }

    fn attached(&self, flags: LifecycleFlags) {
        self.behavior.attached(self, flags);
    }

    fn detached(&self, flags: LifecycleFlags) {
        self.behavior.detached(self, flags);
    }
}

impl<B: ElementBehavior> PropertyTarget for CustomElement<B> {
    fn set_property(&self, name: &str, value: Value, flags: LifecycleFlags) {
        self.behavior.set_property(self, name, value, flags);
    }
}

impl<B: ElementBehavior> Renderable for CustomElement<B> {
    fn context(&self) -> &RenderContext {
        &self.context
    }

    fn scope(&self) -> Option<Scope> {
        Some(self.scope.clone())
    }

    fn add_bindable(&self, bindable: Rc<dyn Bindable>) {
        self.bindables.borrow_mut().push_back(bindable);
    }

    fn add_attachable(&self, attachable: Rc<dyn Attachable>) {
        self.attachables.borrow_mut().push_back(attachable);
    }

    fn as_weak(&self) -> Weak<dyn Renderable> {
        self.this.clone()
    }
}

impl<B> Drop for CustomElement<B> {
    fn drop(&mut self) {
        self.nodes.get_mut().dispose();
    }
}

impl<B: ElementBehavior> fmt::Debug for CustomElement<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomElement")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .finish()
    }
}

/// A hydrated element as seen by whoever renders it.
pub trait Component: Bindable + Attachable + PropertyTarget {}

impl<T: Bindable + Attachable + PropertyTarget> Component for T {}

/// Creates components for `Instruction::Element`.
pub trait ComponentType {
    fn name(&self) -> &str;

    fn create(
        &self,
        context: &RenderContext,
        host: NodeId,
        owner: Weak<dyn Renderable>,
        instruction: &HydrateElement,
    ) -> Result<Rc<dyn Component>>;
}

type Build<B> = Rc<dyn Fn(&RenderContext, Weak<dyn Renderable>, &HydrateElement) -> B>;

/// A named element definition plus a way to build its behavior.
pub struct ElementType<B> {
    definition: Rc<TemplateDefinition>,
    build: Build<B>,
}

impl<B: ElementBehavior> ElementType<B> {
    pub fn new(
        definition: Rc<TemplateDefinition>,
        build: impl Fn(&RenderContext, Weak<dyn Renderable>, &HydrateElement) -> B + 'static,
    ) -> Result<Rc<Self>> {
        if definition.name.is_empty() {
            return Err(Error::MissingName);
        }
        Ok(Rc::new(Self {
            definition,
            build: Rc::new(build),
        }))
    }

    pub fn definition(&self) -> &Rc<TemplateDefinition> {
        &self.definition
    }
}

impl ElementType<HtmlOnly> {
    pub fn html_only(definition: Rc<TemplateDefinition>) -> Result<Rc<Self>> {
        Self::new(definition, |_, _, _| HtmlOnly)
    }
}

impl<B: ElementBehavior> ComponentType for ElementType<B> {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn create(
        &self,
        context: &RenderContext,
        host: NodeId,
        owner: Weak<dyn Renderable>,
        instruction: &HydrateElement,
    ) -> Result<Rc<dyn Component>> {
        let behavior = (self.build)(context, owner, instruction);
        let element = CustomElement::hydrate(
            context,
            host,
            self.definition.clone(),
            HydrateOptions::default(),
            behavior,
        )?;
        Ok(element)
    }
}

/// A component plus the property expressions to hydrate it with, ready to
/// be turned into a view.
pub struct RenderPlan {
    component: Rc<dyn ComponentType>,
    properties: Vec<(String, crate::binding::Expression)>,
}

/// Describes a single custom element instance without rendering it yet.
pub fn create_element(
    component: Rc<dyn ComponentType>,
    properties: Vec<(String, crate::binding::Expression)>,
) -> RenderPlan {
    RenderPlan {
        component,
        properties,
    }
}

impl RenderPlan {
    pub fn component(&self) -> &Rc<dyn ComponentType> {
        &self.component
    }

    /// Renders the plan into a standalone view holding one host element.
    pub fn create_view(&self, context: &RenderContext) -> Result<ViewRef> {
        let name = self.component.name().to_string();
        let node = NodeSpec::element(name.as_str()).instruction(Instruction::Element(HydrateElement {
            component: self.component.clone(),
            properties: self.properties.clone(),
        }));
        let definition = TemplateDefinition::new(name).node(node).build();
        ViewFactory::from_definition(context, definition).create()
    }
}
