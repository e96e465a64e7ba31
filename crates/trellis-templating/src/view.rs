//! # Views and view factories
//!
//! A [`View`] is a relocatable run of rendered nodes plus the bindables and
//! attachables created for them. Views are handed out by a [`ViewFactory`],
//! either freshly rendered or recycled from the factory's bounded pool.
//!
//! Typical controller usage:
//!
//! 1. `factory.create()`
//! 2. `view.hold(location)`: remember where to mount
//! 3. `view.bind(flags, scope)` and, when the owner is attached,
//!    `view.attach(source, flags)`
//! 4. later `detach`/`unbind`, then `release()` to hand it back to the pool
//!
//! A view's nodes are freed from the node tree when the last handle to the
//! view is dropped, so views discarded by a full pool do not accumulate.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use trellis_core::{
    Attachable, Bindable, ChildList, Error, Lifecycle, LifecycleFlags, LifecycleState, Mountable,
    NodeId, NodeSequence, Result, Scope, StateCell,
};

use crate::template::{CompiledTemplate, RenderContext, Renderable, Template, TemplateDefinition};

pub type ViewRef = Rc<View>;

pub struct View {
    this: Weak<View>,
    factory: Weak<ViewFactory>,
    context: RenderContext,
    state: StateCell,
    scope: RefCell<Option<Scope>>,
    locked: Cell<bool>,
    nodes: RefCell<NodeSequence>,
    location: Cell<Option<NodeId>>,
    is_free: Cell<bool>,
    bindables: RefCell<ChildList<Rc<dyn Bindable>>>,
    attachables: RefCell<ChildList<Rc<dyn Attachable>>>,
}

impl View {
    fn new(factory: Weak<ViewFactory>, context: &RenderContext) -> ViewRef {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            factory,
            context: context.clone(),
            state: StateCell::default(),
            scope: RefCell::new(None),
            locked: Cell::new(false),
            nodes: RefCell::new(NodeSequence::empty(&context.dom)),
            location: Cell::new(None),
            is_free: Cell::new(false),
            bindables: RefCell::new(ChildList::new()),
            attachables: RefCell::new(ChildList::new()),
        })
    }

    pub fn nodes(&self) -> NodeSequence {
        self.nodes.borrow().clone()
    }

    pub fn location(&self) -> Option<NodeId> {
        self.location.get()
    }

    pub fn factory(&self) -> Option<Rc<ViewFactory>> {
        self.factory.upgrade()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn ptr_eq(&self, other: &View) -> bool {
        std::ptr::eq(self, other)
    }

    /// Remembers where the view mounts. Marks the view as needing a mount
    /// unless its nodes already sit directly before `location`.
    pub fn hold(&self, location: NodeId) -> Result<()> {
        let dom = &self.context.dom;
        if dom.parent(location).is_none() {
            return Err(Error::LocationWithoutParent(location));
        }
        self.location.set(Some(location));
        let last = self.nodes.borrow().last_child();
        let in_place = last.is_some_and(|last| dom.next_sibling(last) == Some(location));
        if in_place {
            self.state.remove(LifecycleState::NEEDS_MOUNT);
        } else {
            self.state.insert(LifecycleState::NEEDS_MOUNT);
        }
        Ok(())
    }

    /// Pins the view to `scope`. Later binds reuse it regardless of the scope
    /// they are given, and the scope survives unbinding.
    pub fn lock_scope(&self, scope: &Scope) {
        *self.scope.borrow_mut() = Some(scope.clone());
        self.locked.set(true);
    }

    /// Marks the view as free to be pooled. An attached view defers the
    /// decision to its unmount; otherwise it unmounts now. Returns whether
    /// the view was (or will be) returned to its factory's pool.
    pub fn release(&self) -> bool {
        self.is_free.set(true);
        if self.state.get().is_attached() {
            return self
                .factory
                .upgrade()
                .is_some_and(|f| f.can_return_to_cache());
        }
        self.unmount(LifecycleFlags::FROM_RELEASE)
    }

    fn bind_locked(&self, flags: LifecycleFlags) {
        if self.state.get().is_bound() {
            return;
        }
        let Some(scope) = self.scope.borrow().clone() else {
            return;
        };
        Lifecycle::begin_bind();
        self.state.insert(LifecycleState::IS_BINDING);
        let bindables = self.bindables.borrow().snapshot();
        for bindable in bindables {
            bindable.bind(flags, &scope);
        }
        self.state.insert(LifecycleState::IS_BOUND);
        self.state.remove(LifecycleState::IS_BINDING);
        Lifecycle::end_bind();
    }
}

impl Bindable for View {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        let flags = flags | LifecycleFlags::FROM_BIND;
        if self.locked.get() {
            let differs = self.scope.borrow().as_ref().is_some_and(|s| !s.ptr_eq(scope));
            if differs {
                log::trace!("view has a locked scope; ignoring the scope it was bound with");
            }
            self.bind_locked(flags);
            return;
        }

        if self.state.get().is_bound() {
            let same = self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope));
            if same {
                return;
            }
            self.unbind(flags);
        }

        Lifecycle::begin_bind();
        self.state.insert(LifecycleState::IS_BINDING);
        *self.scope.borrow_mut() = Some(scope.clone());
        let bindables = self.bindables.borrow().snapshot();
        for bindable in bindables {
            bindable.bind(flags, scope);
        }
        self.state.insert(LifecycleState::IS_BOUND);
        self.state.remove(LifecycleState::IS_BINDING);
        Lifecycle::end_bind();
    }

    fn unbind(&self, flags: LifecycleFlags) {
        if !self.state.get().is_bound() {
            return;
        }
        Lifecycle::begin_unbind();
        self.state.insert(LifecycleState::IS_UNBINDING);
        let flags = flags | LifecycleFlags::FROM_UNBIND;
        let bindables = self.bindables.borrow().snapshot_rev();
        for bindable in bindables {
            bindable.unbind(flags);
        }
        self.state
            .remove(LifecycleState::IS_BOUND | LifecycleState::IS_UNBINDING);
        if !self.locked.get() {
            self.scope.borrow_mut().take();
        }
        Lifecycle::end_unbind();
    }

    fn state(&self) -> LifecycleState {
        self.state.get()
    }
}

impl Attachable for View {
    fn attach(&self, encapsulation_source: Option<NodeId>, flags: LifecycleFlags) {
        if self.state.get().is_attached() {
            return;
        }
        self.state.insert(LifecycleState::IS_ATTACHING);
        let flags = flags | LifecycleFlags::FROM_ATTACH;

        Lifecycle::begin_attach();
        if self.state.get().needs_mount()
            && let Some(this) = self.this.upgrade()
        {
            Lifecycle::enqueue_mount(this, flags);
        }
        let attachables = self.attachables.borrow().snapshot();
        for attachable in attachables {
            attachable.attach(encapsulation_source, flags);
        }
        self.state.insert(LifecycleState::IS_ATTACHED);
        self.state.remove(LifecycleState::IS_ATTACHING);
        Lifecycle::end_attach();
    }

    fn detach(&self, flags: LifecycleFlags) {
        if !self.state.get().is_attached() {
            return;
        }
        self.state.insert(LifecycleState::IS_DETACHING);
        let flags = flags | LifecycleFlags::FROM_DETACH;

        Lifecycle::begin_detach();
        if let Some(this) = self.this.upgrade() {
            Lifecycle::enqueue_unmount(this, flags);
        }
        let attachables = self.attachables.borrow().snapshot_rev();
        for attachable in attachables {
            attachable.detach(flags);
        }
        self.state
            .remove(LifecycleState::IS_ATTACHED | LifecycleState::IS_DETACHING);
        Lifecycle::end_detach();
    }

    fn cache(&self) {
        let attachables = self.attachables.borrow().snapshot_rev();
        for attachable in attachables {
            attachable.cache();
        }
    }
}

impl Mountable for View {
    fn mount(&self, _flags: LifecycleFlags) {
        self.state.remove(LifecycleState::NEEDS_MOUNT);
        let Some(location) = self.location.get() else {
            log::error!("view mounted without a held location");
            return;
        };
        if let Err(err) = self.nodes.borrow().insert_before(location) {
            log::error!("failed to mount view: {err}");
        }
    }

    fn unmount(&self, _flags: LifecycleFlags) -> bool {
        self.state.insert(LifecycleState::NEEDS_MOUNT);
        self.nodes.borrow().remove();

        if self.is_free.replace(false)
            && let Some(factory) = self.factory.upgrade()
            && let Some(this) = self.this.upgrade()
            && factory.try_return_to_cache(&this)
        {
            self.state.insert(LifecycleState::IS_CACHED);
            return true;
        }
        false
    }
}

impl Renderable for View {
    fn context(&self) -> &RenderContext {
        &self.context
    }

    fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
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

impl Drop for View {
    fn drop(&mut self) {
        self.nodes.get_mut().dispose();
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("state", &self.state.get())
            .field("location", &self.location.get())
            .field("locked", &self.locked.get())
            .finish()
    }
}

/// Upper bound for any factory pool.
pub const MAX_CACHE_SIZE: usize = 0xFFFF;

/// How many released views a factory keeps for reuse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheSize {
    /// No pooling, and later `set_cache_size` calls may still configure it.
    #[default]
    Unset,
    Fixed(usize),
    /// Written `*`; capped at [`MAX_CACHE_SIZE`].
    Unbounded,
}

impl CacheSize {
    pub fn capacity(self) -> usize {
        match self {
            CacheSize::Unset => 0,
            CacheSize::Fixed(n) => n.min(MAX_CACHE_SIZE),
            CacheSize::Unbounded => MAX_CACHE_SIZE,
        }
    }
}

impl FromStr for CacheSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "*" => Ok(CacheSize::Unbounded),
            "" => Ok(CacheSize::Unset),
            n => n
                .parse::<usize>()
                .map(CacheSize::Fixed)
                .map_err(|_| Error::InvalidCacheSize(s.to_string())),
        }
    }
}

pub struct ViewFactory {
    this: Weak<ViewFactory>,
    name: String,
    context: RenderContext,
    template: Rc<dyn Template>,
    cache_size: Cell<CacheSize>,
    cache: RefCell<Vec<ViewRef>>,
}

impl ViewFactory {
    pub fn new(name: impl Into<String>, context: &RenderContext, template: Rc<dyn Template>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            name: name.into(),
            context: context.clone(),
            template,
            cache_size: Cell::new(CacheSize::Unset),
            cache: RefCell::new(Vec::new()),
        })
    }

    /// A factory rendering `definition`, with the definition's cache size
    /// applied.
    pub fn from_definition(context: &RenderContext, definition: Rc<TemplateDefinition>) -> Rc<Self> {
        let cache_size = definition.cache_size;
        let name = definition.name.clone();
        let factory = Self::new(name, context, Rc::new(CompiledTemplate::new(context, definition)));
        factory.set_cache_size(cache_size, false);
        factory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_size(&self) -> CacheSize {
        self.cache_size.get()
    }

    pub fn is_caching(&self) -> bool {
        self.cache_size.get().capacity() > 0
    }

    /// Configures the pool. `Unset` and `Fixed(0)` leave the current setting
    /// alone; with `do_not_override_if_already_set` only an unset pool is
    /// configured.
    pub fn set_cache_size(&self, size: CacheSize, do_not_override_if_already_set: bool) {
        if matches!(size, CacheSize::Unset | CacheSize::Fixed(0)) {
            return;
        }
        if self.cache_size.get() == CacheSize::Unset || !do_not_override_if_already_set {
            self.cache_size.set(size);
        }
        let capacity = self.cache_size.get().capacity();
        let mut cache = self.cache.borrow_mut();
        if cache.len() > capacity {
            cache.truncate(capacity);
        }
    }

    pub fn can_return_to_cache(&self) -> bool {
        self.cache.borrow().len() < self.cache_size.get().capacity()
    }

    pub fn try_return_to_cache(&self, view: &ViewRef) -> bool {
        if !self.can_return_to_cache() {
            log::debug!("view pool for `{}` is full; discarding view", self.name);
            return false;
        }
        view.cache();
        self.cache.borrow_mut().push(view.clone());
        true
    }

    pub fn cached_count(&self) -> usize {
        self.cache.borrow().len()
    }

    /// A pooled view if one is available, otherwise a freshly rendered one.
    pub fn create(&self) -> Result<ViewRef> {
        let pooled = self.cache.borrow_mut().pop();
        if let Some(view) = pooled {
            view.state.remove(LifecycleState::IS_CACHED);
            log::trace!("reusing pooled view from `{}`", self.name);
            return Ok(view);
        }

        let view = View::new(self.this.clone(), &self.context);
        let nodes = self.template.render(&*view)?;
        if nodes.is_empty() {
            return Err(Error::EmptyRender(self.name.clone()));
        }
        *view.nodes.borrow_mut() = nodes;
        Ok(view)
    }
}

impl fmt::Debug for ViewFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewFactory")
            .field("name", &self.name)
            .field("cache_size", &self.cache_size.get())
            .field("cached", &self.cached_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_size_parses_star_and_numbers() {
        assert_eq!("*".parse::<CacheSize>(), Ok(CacheSize::Unbounded));
        assert_eq!("3".parse::<CacheSize>(), Ok(CacheSize::Fixed(3)));
        assert!("lots".parse::<CacheSize>().is_err());
        assert_eq!(CacheSize::Fixed(1 << 20).capacity(), MAX_CACHE_SIZE);
    }
}
