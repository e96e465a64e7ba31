//! Element projectors.
//!
//! A projector decides where a custom element's rendered nodes go: into the
//! host element itself, into a shadow root on the host, or (containerless)
//! in place of the host, which is swapped for a render location.

use std::cell::Cell;

use trellis_core::{Dom, Error, LifecycleState, NodeId, NodeSequence, Result, StateCell};

use crate::template::TemplateDefinition;

pub enum Projector {
    /// Nodes are appended into the host. Regular hosts are filled once; an
    /// app host is refilled on every mount and emptied on every unmount.
    Host {
        dom: Dom,
        host: NodeId,
        app_host: bool,
        projected: Cell<bool>,
    },
    /// The host is replaced by a render location and nodes are placed
    /// before it. The host's original children are kept for projection.
    Containerless {
        dom: Dom,
        location: NodeId,
        children: Vec<NodeId>,
    },
    /// Nodes are appended into a shadow root once and stay there.
    Shadow {
        dom: Dom,
        host: NodeId,
        shadow_root: NodeId,
        projected: Cell<bool>,
    },
}

impl Projector {
    /// Picks the projector for `host` according to `definition`.
    pub fn determine(
        dom: &Dom,
        host: NodeId,
        definition: &TemplateDefinition,
        app_host: bool,
    ) -> Result<Self> {
        match (definition.containerless, definition.shadow) {
            (true, true) => Err(Error::ContainerlessShadow(definition.name.clone())),
            (true, false) => {
                let children = dom.children(host);
                let location = dom.convert_to_render_location(host)?;
                Ok(Projector::Containerless {
                    dom: dom.clone(),
                    location,
                    children,
                })
            }
            (false, true) => Ok(Projector::Shadow {
                dom: dom.clone(),
                host,
                shadow_root: dom.attach_shadow(host)?,
                projected: Cell::new(false),
            }),
            (false, false) => Ok(Projector::Host {
                dom: dom.clone(),
                host,
                app_host,
                projected: Cell::new(false),
            }),
        }
    }

    /// The node that stands for the element in the document. For a
    /// containerless element this is its render location.
    pub fn host(&self) -> NodeId {
        match self {
            Projector::Host { host, .. } | Projector::Shadow { host, .. } => *host,
            Projector::Containerless { location, .. } => *location,
        }
    }

    /// The host's original children, captured before a containerless
    /// conversion.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Projector::Containerless { children, .. } => children.clone(),
            Projector::Host { dom, host, .. } | Projector::Shadow { dom, host, .. } => {
                dom.children(*host)
            }
        }
    }

    /// The encapsulation source passed on to the element's children.
    pub fn provide_encapsulation_source(
        &self,
        parent: Option<NodeId>,
        name: &str,
    ) -> Result<NodeId> {
        match self {
            Projector::Host { host, .. } => Ok(parent.unwrap_or(*host)),
            Projector::Shadow { shadow_root, .. } => Ok(*shadow_root),
            Projector::Containerless { .. } => {
                parent.ok_or_else(|| Error::MissingEncapsulationSource(name.to_string()))
            }
        }
    }

    pub fn project(&self, nodes: &NodeSequence, state: &StateCell) -> Result<()> {
        match self {
            Projector::Host {
                host,
                app_host,
                projected,
                ..
            } => {
                if *app_host || !projected.get() {
                    nodes.append_to(*host)?;
                    projected.set(true);
                }
            }
            Projector::Shadow {
                shadow_root,
                projected,
                ..
            } => {
                if !projected.get() {
                    nodes.append_to(*shadow_root)?;
                    projected.set(true);
                }
            }
            Projector::Containerless { location, .. } => {
                if state.get().needs_mount() {
                    state.remove(LifecycleState::NEEDS_MOUNT);
                    nodes.insert_before(*location)?;
                }
            }
        }
        Ok(())
    }

    pub fn take(&self, nodes: &NodeSequence, state: &StateCell) {
        match self {
            Projector::Host { app_host, .. } => {
                if *app_host {
                    nodes.remove();
                }
            }
            Projector::Shadow { .. } => {}
            Projector::Containerless { .. } => {
                state.insert(LifecycleState::NEEDS_MOUNT);
                nodes.remove();
            }
        }
    }
}
