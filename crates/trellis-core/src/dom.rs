//! # Node tree
//!
//! A small in-memory document used as the physical placement primitive. It
//! supports exactly what the rendering core needs: creating nodes, moving them
//! around relative to a reference node, text content, attributes, a minimal
//! event dispatch and shadow roots.
//!
//! [`NodeSequence`] is the relocatable unit a view owns: the top-level nodes of
//! a rendered fragment plus the binding targets found inside it.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use slotmap::{SlotMap, new_key_type};

use crate::error::{Error, Result};
use crate::value::Value;

new_key_type! {
    pub struct NodeId;
    pub struct ListenerId;
}

/// Marker text used for render location comments.
pub const RENDER_LOCATION: &str = "au-loc";

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
    Fragment,
    ShadowRoot,
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    target: bool,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            target: false,
        }
    }
}

pub type EventHandler = Rc<dyn Fn(&Event)>;

struct ListenerEntry {
    node: NodeId,
    event: String,
    handler: EventHandler,
}

#[derive(Default)]
struct Tree {
    nodes: SlotMap<NodeId, NodeData>,
    listeners: SlotMap<ListenerId, ListenerEntry>,
}

/// An event delivered to listeners registered on its target node.
pub struct Event {
    pub name: String,
    pub target: NodeId,
    pub detail: Value,
    default_prevented: Cell<bool>,
}

impl Event {
    pub fn new(name: impl Into<String>, target: NodeId, detail: Value) -> Self {
        Self {
            name: name.into(),
            target,
            detail,
            default_prevented: Cell::new(false),
        }
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// Cloneable handle to a node tree.
#[derive(Clone, Default)]
pub struct Dom(Rc<RefCell<Tree>>);

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptr_eq(&self, other: &Dom) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn create(&self, kind: NodeKind) -> NodeId {
        self.0.borrow_mut().nodes.insert(NodeData::new(kind))
    }

    pub fn create_element(&self, tag: impl Into<String>) -> NodeId {
        self.create(NodeKind::Element {
            tag: tag.into(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&self, text: impl Into<String>) -> NodeId {
        self.create(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&self, text: impl Into<String>) -> NodeId {
        self.create(NodeKind::Comment(text.into()))
    }

    pub fn create_fragment(&self) -> NodeId {
        self.create(NodeKind::Fragment)
    }

    pub fn create_render_location(&self) -> NodeId {
        self.create_comment(RENDER_LOCATION)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.borrow().nodes.contains_key(node)
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.0.borrow().nodes.get(node).map(|n| n.kind.clone())
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match self.kind(node)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.0.borrow().nodes.get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .and_then(|n| n.children.first().copied())
    }

    pub fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.0
            .borrow()
            .nodes
            .get(node)
            .and_then(|n| n.children.last().copied())
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, 1)
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.sibling(node, -1)
    }

    fn sibling(&self, node: NodeId, offset: isize) -> Option<NodeId> {
        let tree = self.0.borrow();
        let parent = tree.nodes.get(node)?.parent?;
        let siblings = &tree.nodes.get(parent)?.children;
        let index = siblings.iter().position(|&c| c == node)?;
        let target = index.checked_add_signed(offset)?;
        siblings.get(target).copied()
    }

    /// Appends `child` to `parent`, detaching it from its previous parent.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let mut tree = self.0.borrow_mut();
        if !tree.nodes.contains_key(parent) {
            return Err(Error::UnknownNode(parent));
        }
        if !tree.nodes.contains_key(child) {
            return Err(Error::UnknownNode(child));
        }
        Self::unlink(&mut tree, child);
        tree.nodes[parent].children.push(child);
        tree.nodes[child].parent = Some(parent);
        Ok(())
    }

    /// Inserts `node` directly before `reference`, which must have a parent.
    pub fn insert_before(&self, node: NodeId, reference: NodeId) -> Result<()> {
        let mut tree = self.0.borrow_mut();
        if !tree.nodes.contains_key(node) {
            return Err(Error::UnknownNode(node));
        }
        let parent = tree
            .nodes
            .get(reference)
            .ok_or(Error::UnknownNode(reference))?
            .parent
            .ok_or(Error::LocationWithoutParent(reference))?;
        if node == reference {
            return Ok(());
        }
        Self::unlink(&mut tree, node);
        let siblings = &mut tree.nodes[parent].children;
        let index = siblings
            .iter()
            .position(|&c| c == reference)
            .unwrap_or(siblings.len());
        siblings.insert(index, node);
        tree.nodes[node].parent = Some(parent);
        Ok(())
    }

    /// Detaches `node` from its parent. The node itself stays alive.
    pub fn remove(&self, node: NodeId) {
        let mut tree = self.0.borrow_mut();
        if tree.nodes.contains_key(node) {
            Self::unlink(&mut tree, node);
        }
    }

    /// Detaches `node` and frees it along with its descendants, its shadow
    /// root and every listener left on a freed node. Unknown nodes are
    /// ignored.
    pub fn dispose(&self, node: NodeId) {
        let listeners: Vec<ListenerEntry> = {
            let mut tree = self.0.borrow_mut();
            if !tree.nodes.contains_key(node) {
                return;
            }
            Self::unlink(&mut tree, node);
            let mut stack = vec![node];
            while let Some(id) = stack.pop() {
                if let Some(data) = tree.nodes.remove(id) {
                    stack.extend(data.children);
                    stack.extend(data.shadow_root);
                }
            }
            let dead: Vec<ListenerId> = tree
                .listeners
                .iter()
                .filter(|(_, l)| !tree.nodes.contains_key(l.node))
                .map(|(id, _)| id)
                .collect();
            dead.into_iter()
                .filter_map(|id| tree.listeners.remove(id))
                .collect()
        };
        // Handlers may own views; drop them outside the borrow.
        drop(listeners);
    }

    /// Number of live nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.0.borrow().nodes.len()
    }

    /// Replaces `old` with `new` in `old`'s parent.
    pub fn replace(&self, old: NodeId, new: NodeId) -> Result<()> {
        self.insert_before(new, old)?;
        self.remove(old);
        Ok(())
    }

    fn unlink(tree: &mut Tree, node: NodeId) {
        if let Some(parent) = tree.nodes[node].parent.take()
            && let Some(p) = tree.nodes.get_mut(parent)
        {
            p.children.retain(|&c| c != node);
        }
    }

    /// Replaces `node` with a render location comment. The original node is
    /// detached; its children are left in place.
    pub fn convert_to_render_location(&self, node: NodeId) -> Result<NodeId> {
        let location = self.create_render_location();
        if self.parent(node).is_some() {
            self.replace(node, location)?;
        }
        Ok(location)
    }

    /// Concatenated text of all descendant text nodes, excluding shadow roots
    /// and comments.
    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.0.borrow();
        let mut out = String::new();
        Self::collect_text(&tree, node, &mut out);
        out
    }

    fn collect_text(tree: &Tree, node: NodeId, out: &mut String) {
        let Some(data) = tree.nodes.get(node) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Comment(_) => {}
            _ => {
                for &child in &data.children {
                    Self::collect_text(tree, child, out);
                }
            }
        }
    }

    pub fn set_text(&self, node: NodeId, text: impl Into<String>) {
        if let Some(data) = self.0.borrow_mut().nodes.get_mut(node)
            && let NodeKind::Text(t) = &mut data.kind
        {
            *t = text.into();
        }
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(data) = self.0.borrow_mut().nodes.get_mut(node)
            && let NodeKind::Element { attributes, .. } = &mut data.kind
        {
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.0.borrow().nodes.get(node)?.kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(data) = self.0.borrow_mut().nodes.get_mut(node)
            && let NodeKind::Element { attributes, .. } = &mut data.kind
        {
            attributes.retain(|(n, _)| n != name);
        }
    }

    /// Flags `node` as a binding target of its template.
    pub fn mark_target(&self, node: NodeId) {
        if let Some(data) = self.0.borrow_mut().nodes.get_mut(node) {
            data.target = true;
        }
    }

    pub fn is_target(&self, node: NodeId) -> bool {
        self.0.borrow().nodes.get(node).is_some_and(|n| n.target)
    }

    /// All target nodes below `root` (exclusive) in document order.
    pub fn find_targets(&self, root: NodeId) -> Vec<NodeId> {
        let tree = self.0.borrow();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = tree
            .nodes
            .get(root)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(node) = stack.pop() {
            let Some(data) = tree.nodes.get(node) else {
                continue;
            };
            if data.target {
                out.push(node);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    pub fn attach_shadow(&self, host: NodeId) -> Result<NodeId> {
        if let Some(existing) = self.shadow_root(host) {
            return Ok(existing);
        }
        if !self.contains(host) {
            return Err(Error::UnknownNode(host));
        }
        let root = self.create(NodeKind::ShadowRoot);
        self.0.borrow_mut().nodes[host].shadow_root = Some(root);
        Ok(root)
    }

    pub fn shadow_root(&self, host: NodeId) -> Option<NodeId> {
        self.0.borrow().nodes.get(host).and_then(|n| n.shadow_root)
    }

    pub fn add_event_listener(
        &self,
        node: NodeId,
        event: impl Into<String>,
        handler: EventHandler,
    ) -> ListenerId {
        self.0.borrow_mut().listeners.insert(ListenerEntry {
            node,
            event: event.into(),
            handler,
        })
    }

    pub fn remove_event_listener(&self, id: ListenerId) {
        let removed = self.0.borrow_mut().listeners.remove(id);
        drop(removed);
    }

    pub fn listener_count(&self) -> usize {
        self.0.borrow().listeners.len()
    }

    /// Delivers `event` to the listeners registered on its target. Returns
    /// `false` if any listener prevented the default action.
    pub fn dispatch(&self, event: &Event) -> bool {
        let handlers: Vec<EventHandler> = self
            .0
            .borrow()
            .listeners
            .values()
            .filter(|l| l.node == event.target && l.event == event.name)
            .map(|l| l.handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
        !event.default_prevented()
    }

    /// Serializes `node` and its light-DOM descendants, e.g.
    /// `<div id="a">x<!--au-loc--></div>`.
    pub fn outer_html(&self, node: NodeId) -> String {
        let tree = self.0.borrow();
        let mut out = String::new();
        Self::write_html(&tree, node, &mut out);
        out
    }

    /// Like [`Dom::outer_html`] but only the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let tree = self.0.borrow();
        let mut out = String::new();
        if let Some(data) = tree.nodes.get(node) {
            for &child in &data.children {
                Self::write_html(&tree, child, &mut out);
            }
        }
        out
    }

    fn write_html(tree: &Tree, node: NodeId, out: &mut String) {
        let Some(data) = tree.nodes.get(node) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Comment(c) => {
                let _ = write!(out, "<!--{c}-->");
            }
            NodeKind::Element { tag, attributes } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attributes {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for &child in &data.children {
                    Self::write_html(tree, child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
            NodeKind::Fragment | NodeKind::ShadowRoot => {
                for &child in &data.children {
                    Self::write_html(tree, child, out);
                }
            }
        }
    }

    /// Structural copy of `node`'s light-DOM subtree.
    pub fn snapshot(&self, node: NodeId) -> Option<NodeSnapshot> {
        let tree = self.0.borrow();
        Self::snapshot_of(&tree, node)
    }

    fn snapshot_of(tree: &Tree, node: NodeId) -> Option<NodeSnapshot> {
        let data = tree.nodes.get(node)?;
        Some(match &data.kind {
            NodeKind::Text(t) => NodeSnapshot::Text(t.clone()),
            NodeKind::Comment(c) => NodeSnapshot::Comment(c.clone()),
            NodeKind::Element { tag, attributes } => NodeSnapshot::Element {
                tag: tag.clone(),
                attributes: attributes.clone(),
                children: data
                    .children
                    .iter()
                    .filter_map(|&c| Self::snapshot_of(tree, c))
                    .collect(),
            },
            NodeKind::Fragment | NodeKind::ShadowRoot => NodeSnapshot::Fragment(
                data.children
                    .iter()
                    .filter_map(|&c| Self::snapshot_of(tree, c))
                    .collect(),
            ),
        })
    }
}

/// Owned, comparable copy of a subtree.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeSnapshot {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<NodeSnapshot>,
    },
    Text(String),
    Comment(String),
    Fragment(Vec<NodeSnapshot>),
}

/// The top-level nodes of a rendered fragment.
///
/// While not placed in a document the nodes live inside the sequence's own
/// fragment; `remove` moves them back there.
#[derive(Clone)]
pub struct NodeSequence {
    dom: Dom,
    fragment: Option<NodeId>,
    nodes: Vec<NodeId>,
    targets: Vec<NodeId>,
}

impl NodeSequence {
    /// Captures the current children of `fragment` and the targets below it.
    pub fn from_fragment(dom: &Dom, fragment: NodeId) -> Self {
        Self {
            dom: dom.clone(),
            fragment: Some(fragment),
            nodes: dom.children(fragment),
            targets: dom.find_targets(fragment),
        }
    }

    pub fn empty(dom: &Dom) -> Self {
        Self {
            dom: dom.clone(),
            fragment: None,
            nodes: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Moves all nodes, in order, directly before `reference`.
    pub fn insert_before(&self, reference: NodeId) -> Result<()> {
        if self.dom.parent(reference).is_none() {
            return Err(Error::LocationWithoutParent(reference));
        }
        for &node in &self.nodes {
            self.dom.insert_before(node, reference)?;
        }
        Ok(())
    }

    pub fn append_to(&self, parent: NodeId) -> Result<()> {
        for &node in &self.nodes {
            self.dom.append_child(parent, node)?;
        }
        Ok(())
    }

    /// Takes the nodes out of the document and back into the fragment.
    pub fn remove(&self) {
        for &node in &self.nodes {
            match self.fragment {
                Some(fragment) => {
                    if let Err(err) = self.dom.append_child(fragment, node) {
                        log::warn!("node sequence lost its fragment: {err}");
                        self.dom.remove(node);
                    }
                }
                None => self.dom.remove(node),
            }
        }
    }

    /// Frees the nodes and the fragment. The sequence is empty afterwards.
    pub fn dispose(&mut self) {
        for node in self.nodes.drain(..) {
            self.dom.dispose(node);
        }
        if let Some(fragment) = self.fragment.take() {
            self.dom.dispose(fragment);
        }
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_moves_sequence_in_order() {
        let dom = Dom::new();
        let host = dom.create_element("div");
        let location = dom.create_render_location();
        dom.append_child(host, location).unwrap();

        let fragment = dom.create_fragment();
        let a = dom.create_text("a");
        let b = dom.create_text("b");
        dom.append_child(fragment, a).unwrap();
        dom.append_child(fragment, b).unwrap();

        let seq = NodeSequence::from_fragment(&dom, fragment);
        seq.insert_before(location).unwrap();
        assert_eq!(dom.inner_html(host), "ab<!--au-loc-->");
        assert_eq!(dom.next_sibling(b), Some(location));

        seq.remove();
        assert_eq!(dom.inner_html(host), "<!--au-loc-->");
        assert_eq!(dom.children(fragment), vec![a, b]);
    }

    #[test]
    fn insert_before_parentless_reference_fails() {
        let dom = Dom::new();
        let location = dom.create_render_location();
        let text = dom.create_text("x");
        assert_eq!(
            dom.insert_before(text, location),
            Err(Error::LocationWithoutParent(location))
        );
    }

    #[test]
    fn targets_are_found_in_document_order() {
        let dom = Dom::new();
        let fragment = dom.create_fragment();
        let outer = dom.create_element("div");
        let inner = dom.create_text("");
        let last = dom.create_element("span");
        dom.append_child(fragment, outer).unwrap();
        dom.append_child(outer, inner).unwrap();
        dom.append_child(fragment, last).unwrap();
        dom.mark_target(outer);
        dom.mark_target(inner);
        dom.mark_target(last);

        assert_eq!(dom.find_targets(fragment), vec![outer, inner, last]);
    }

    #[test]
    fn dispatch_reports_prevented_default() {
        let dom = Dom::new();
        let button = dom.create_element("button");
        let id = dom.add_event_listener(button, "click", Rc::new(|e: &Event| e.prevent_default()));
        assert!(!dom.dispatch(&Event::new("click", button, Value::Undefined)));
        dom.remove_event_listener(id);
        assert!(dom.dispatch(&Event::new("click", button, Value::Undefined)));
    }

    #[test]
    fn dispose_frees_subtree_and_its_listeners() {
        let dom = Dom::new();
        let root = dom.create_element("div");
        let item = dom.create_element("li");
        let label = dom.create_text("x");
        dom.append_child(root, item).unwrap();
        dom.append_child(item, label).unwrap();
        let shadow = dom.attach_shadow(item).unwrap();
        dom.add_event_listener(item, "click", Rc::new(|_: &Event| {}));

        dom.dispose(item);

        assert_eq!(dom.children(root), Vec::<NodeId>::new());
        assert!(!dom.contains(item) && !dom.contains(label) && !dom.contains(shadow));
        assert_eq!(dom.node_count(), 1);
        assert_eq!(dom.listener_count(), 0);
        dom.dispose(item);
    }
}
