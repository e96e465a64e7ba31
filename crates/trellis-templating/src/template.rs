//! # Templates
//!
//! A [`TemplateDefinition`] is an already-compiled description of a fragment:
//! static nodes, interpolations, per-element instructions and template
//! controllers (`if`, `repeat`). [`CompiledTemplate`] turns a definition into
//! nodes plus bindings for one [`Renderable`] (a view or a custom element).
//!
//! Rendering runs in two phases. First the node structure is built and every
//! node carrying instructions is collected in document order. Then the
//! instructions are applied: bindings, listeners, refs, custom elements and
//! controllers are created and appended to the renderable's child lists, in
//! that same order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use trellis_core::{Attachable, Bindable, ChangeQueue, Dom, NodeId, NodeSequence, Result, Scope};

use crate::binding::{
    BindingTarget, Expression, Interpolation, LetBinding, Listener, PropertyBinding, Ref,
    TextBinding,
};
use crate::custom_element::ComponentType;
use crate::resources::if_else::{Else, If};
use crate::resources::repeat::Repeat;
use crate::signaler::{SignalBinding, Signaler};
use crate::view::{CacheSize, ViewFactory};

/// The services a template needs while rendering.
#[derive(Clone)]
pub struct RenderContext {
    pub dom: Dom,
    pub change_set: Rc<dyn ChangeQueue>,
    pub signaler: Rc<Signaler>,
}

impl RenderContext {
    pub fn new(dom: Dom, change_set: Rc<dyn ChangeQueue>) -> Self {
        Self {
            dom,
            change_set,
            signaler: Signaler::new(),
        }
    }

    pub fn with_signaler(mut self, signaler: Rc<Signaler>) -> Self {
        self.signaler = signaler;
        self
    }
}

/// Owner of rendered nodes and the bindables/attachables created for them.
pub trait Renderable {
    fn context(&self) -> &RenderContext;

    /// The scope the renderable is currently bound to.
    fn scope(&self) -> Option<Scope>;

    fn add_bindable(&self, bindable: Rc<dyn Bindable>);

    fn add_attachable(&self, attachable: Rc<dyn Attachable>);

    fn as_weak(&self) -> Weak<dyn Renderable>;
}

pub trait Template {
    /// Renders into a fresh fragment, registering bindings on `renderable`.
    fn render(&self, renderable: &dyn Renderable) -> Result<NodeSequence>;
}

#[derive(Clone, Default)]
pub struct TemplateDefinition {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    pub containerless: bool,
    /// Project the element's content into a shadow root.
    pub shadow: bool,
    pub cache_size: CacheSize,
}

impl TemplateDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn containerless(mut self) -> Self {
        self.containerless = true;
        self
    }

    pub fn shadow(mut self) -> Self {
        self.shadow = true;
        self
    }

    pub fn cache(mut self, size: CacheSize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn build(self) -> Rc<Self> {
        Rc::new(self)
    }
}

#[derive(Clone)]
pub enum NodeSpec {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        instructions: Vec<Instruction>,
        children: Vec<NodeSpec>,
    },
    Text(String),
    Interpolation(Interpolation),
    Controller(Controller),
}

impl NodeSpec {
    pub fn element(tag: impl Into<String>) -> Self {
        NodeSpec::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            instructions: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        NodeSpec::Text(text.into())
    }

    pub fn interpolation(interpolation: Interpolation) -> Self {
        NodeSpec::Interpolation(interpolation)
    }

    /// Adds a static attribute. No-op on non-elements.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let NodeSpec::Element { attributes, .. } = &mut self {
            attributes.push((name.into(), value.into()));
        }
        self
    }

    /// Adds an instruction. No-op on non-elements.
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        if let NodeSpec::Element { instructions, .. } = &mut self {
            instructions.push(instruction);
        }
        self
    }

    /// Appends a child. No-op on non-elements.
    pub fn child(mut self, child: NodeSpec) -> Self {
        if let NodeSpec::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }
}

#[derive(Clone)]
pub enum Controller {
    If {
        value: Expression,
        template: Rc<TemplateDefinition>,
        else_template: Option<Rc<TemplateDefinition>>,
    },
    Repeat {
        local: String,
        items: Expression,
        template: Rc<TemplateDefinition>,
    },
}

#[derive(Clone)]
pub enum Instruction {
    /// Sets an attribute from an expression.
    Property {
        property: String,
        expression: Expression,
    },
    Listener {
        event: String,
        expression: Expression,
        prevent_default: bool,
    },
    Ref {
        name: String,
    },
    /// Like `Property`, and re-evaluated whenever one of `signals` is
    /// dispatched on the render context's signaler.
    SignaledProperty {
        property: String,
        expression: Expression,
        signals: Vec<String>,
    },
    /// Declares scope values from expressions. The carrying element (a
    /// `<let>`) is removed from the rendered output.
    Let {
        bindings: Vec<(String, Expression)>,
        to_binding_context: bool,
    },
    /// Hydrates a custom element on the node.
    Element(HydrateElement),
}

#[derive(Clone)]
pub struct HydrateElement {
    pub component: Rc<dyn ComponentType>,
    /// Bindable properties of the component, bound from the owner's scope.
    pub properties: Vec<(String, Expression)>,
}

enum Pending<'a> {
    Instructions(&'a [Instruction]),
    Interpolation(&'a Interpolation),
    Controller(&'a Controller),
}

/// A definition prepared for rendering in one render context.
pub struct CompiledTemplate {
    definition: Rc<TemplateDefinition>,
    context: RenderContext,
    factories: RefCell<HashMap<*const TemplateDefinition, Rc<ViewFactory>>>,
}

impl CompiledTemplate {
    pub fn new(context: &RenderContext, definition: Rc<TemplateDefinition>) -> Self {
        Self {
            definition,
            context: context.clone(),
            factories: RefCell::new(HashMap::new()),
        }
    }

    pub fn definition(&self) -> &Rc<TemplateDefinition> {
        &self.definition
    }

    /// One factory per nested definition, shared by every render of this
    /// template so that views are pooled across instances.
    fn factory_for(&self, definition: &Rc<TemplateDefinition>) -> Rc<ViewFactory> {
        self.factories
            .borrow_mut()
            .entry(Rc::as_ptr(definition))
            .or_insert_with(|| ViewFactory::from_definition(&self.context, definition.clone()))
            .clone()
    }

    fn build<'a>(
        &self,
        parent: NodeId,
        spec: &'a NodeSpec,
        pending: &mut Vec<(NodeId, Pending<'a>)>,
    ) -> Result<()> {
        let dom = &self.context.dom;
        match spec {
            NodeSpec::Element {
                tag,
                attributes,
                instructions,
                children,
            } => {
                let node = dom.create_element(tag.as_str());
                for (name, value) in attributes {
                    dom.set_attribute(node, name, value.as_str());
                }
                dom.append_child(parent, node)?;
                if !instructions.is_empty() {
                    dom.mark_target(node);
                    pending.push((node, Pending::Instructions(instructions)));
                }
                for child in children {
                    self.build(node, child, pending)?;
                }
            }
            NodeSpec::Text(text) => {
                let node = dom.create_text(text.as_str());
                dom.append_child(parent, node)?;
            }
            NodeSpec::Interpolation(interpolation) => {
                let node = dom.create_text("");
                dom.append_child(parent, node)?;
                dom.mark_target(node);
                pending.push((node, Pending::Interpolation(interpolation)));
            }
            NodeSpec::Controller(controller) => {
                let location = dom.create_render_location();
                dom.append_child(parent, location)?;
                dom.mark_target(location);
                pending.push((location, Pending::Controller(controller)));
            }
        }
        Ok(())
    }

    fn apply(&self, target: NodeId, pending: Pending<'_>, renderable: &dyn Renderable) -> Result<()> {
        let dom = &self.context.dom;
        match pending {
            Pending::Interpolation(interpolation) => {
                renderable.add_bindable(TextBinding::new(dom, target, interpolation.clone()));
            }
            Pending::Instructions(instructions) => {
                for instruction in instructions {
                    self.apply_instruction(target, instruction, renderable)?;
                }
            }
            Pending::Controller(Controller::If {
                value,
                template,
                else_template,
            }) => {
                let attribute = If::create(&self.context, self.factory_for(template), target);
                if let Some(else_template) = else_template {
                    Else::new(self.factory_for(else_template)).link(attribute.behavior());
                }
                let weak = Rc::downgrade(&attribute);
                renderable.add_bindable(PropertyBinding::new(
                    dom,
                    value.clone(),
                    BindingTarget::Property {
                        target: weak,
                        name: "value".into(),
                    },
                ));
                renderable.add_bindable(attribute.clone());
                renderable.add_attachable(attribute);
            }
            Pending::Controller(Controller::Repeat {
                local,
                items,
                template,
            }) => {
                let attribute = Repeat::create(
                    &self.context,
                    self.factory_for(template),
                    target,
                    local.as_str(),
                );
                let weak = Rc::downgrade(&attribute);
                renderable.add_bindable(PropertyBinding::new(
                    dom,
                    items.clone(),
                    BindingTarget::Property {
                        target: weak,
                        name: "items".into(),
                    },
                ));
                renderable.add_bindable(attribute.clone());
                renderable.add_attachable(attribute);
            }
        }
        Ok(())
    }

    fn apply_instruction(
        &self,
        target: NodeId,
        instruction: &Instruction,
        renderable: &dyn Renderable,
    ) -> Result<()> {
        let dom = &self.context.dom;
        match instruction {
            Instruction::Property {
                property,
                expression,
            } => renderable.add_bindable(PropertyBinding::new(
                dom,
                expression.clone(),
                BindingTarget::Attribute {
                    node: target,
                    name: property.clone(),
                },
            )),
            Instruction::Listener {
                event,
                expression,
                prevent_default,
            } => renderable.add_bindable(Listener::new(
                dom,
                target,
                event.as_str(),
                expression.clone(),
                *prevent_default,
            )),
            Instruction::Ref { name } => {
                renderable.add_bindable(Ref::new(name.as_str(), target));
            }
            Instruction::SignaledProperty {
                property,
                expression,
                signals,
            } => {
                let binding = PropertyBinding::new(
                    dom,
                    expression.clone(),
                    BindingTarget::Attribute {
                        node: target,
                        name: property.clone(),
                    },
                );
                renderable.add_bindable(SignalBinding::new(
                    &self.context.signaler,
                    signals.clone(),
                    binding,
                )?);
            }
            Instruction::Let {
                bindings,
                to_binding_context,
            } => {
                for (name, expression) in bindings {
                    renderable.add_bindable(LetBinding::new(
                        expression.clone(),
                        name.as_str(),
                        *to_binding_context,
                    ));
                }
                dom.dispose(target);
            }
            Instruction::Element(hydrate) => {
                let component =
                    hydrate
                        .component
                        .create(&self.context, target, renderable.as_weak(), hydrate)?;
                for (name, expression) in &hydrate.properties {
                    let weak = Rc::downgrade(&component);
                    renderable.add_bindable(PropertyBinding::new(
                        dom,
                        expression.clone(),
                        BindingTarget::Property {
                            target: weak,
                            name: name.clone(),
                        },
                    ));
                }
                renderable.add_bindable(component.clone());
                renderable.add_attachable(component);
            }
        }
        Ok(())
    }
}

impl Template for CompiledTemplate {
    fn render(&self, renderable: &dyn Renderable) -> Result<NodeSequence> {
        let dom = &self.context.dom;
        let fragment = dom.create_fragment();
        let mut pending = Vec::new();
        for spec in &self.definition.nodes {
            self.build(fragment, spec, &mut pending)?;
        }
        log::trace!(
            "rendering `{}`: {} targets",
            self.definition.name,
            pending.len()
        );
        for (target, item) in pending {
            self.apply(target, item, renderable)?;
        }
        Ok(NodeSequence::from_fragment(dom, fragment))
    }
}
