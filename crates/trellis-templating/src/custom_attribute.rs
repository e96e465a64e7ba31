//! Custom attributes.
//!
//! A [`CustomAttribute`] drives the bind/attach lifecycle for an
//! [`AttributeBehavior`] and invokes only the hooks the behavior declares in
//! its [`Hooks`] mask. Template controllers (`if`, `else`, `repeat`) are
//! custom attributes.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{
    Attachable, BatchedCollectionSubscriber, Bindable, Flushable, Hooks, Lifecycle,
    LifecycleCallbacks, LifecycleFlags, LifecycleState, NodeId, Scope, StateCell, Value,
};

use crate::binding::PropertyTarget;

/// The behavior-specific part of a custom attribute. All hooks default to
/// no-ops; only those in [`AttributeBehavior::HOOKS`] are invoked by the
/// lifecycle.
pub trait AttributeBehavior: Sized + 'static {
    const NAME: &'static str;
    const HOOKS: Hooks;

    fn created(&self, _owner: &CustomAttribute<Self>) {}
    fn binding(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn bound(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn attaching(
        &self,
        _owner: &CustomAttribute<Self>,
        _encapsulation_source: Option<NodeId>,
        _flags: LifecycleFlags,
    ) {
    }
    fn attached(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn detaching(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn detached(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn unbinding(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn unbound(&self, _owner: &CustomAttribute<Self>, _flags: LifecycleFlags) {}
    fn caching(&self, _owner: &CustomAttribute<Self>) {}

    /// A bindable property was set.
    fn set_property(
        &self,
        _owner: &CustomAttribute<Self>,
        name: &str,
        _value: Value,
        _flags: LifecycleFlags,
    ) {
        log::warn!("`{}` has no bindable property `{name}`", Self::NAME);
    }

    fn flush_changes(&self, _owner: &CustomAttribute<Self>) {}

    fn handle_batched_change(&self, _owner: &CustomAttribute<Self>, _index_map: &[isize]) {}
}

pub struct CustomAttribute<B> {
    this: Weak<Self>,
    state: StateCell,
    scope: RefCell<Option<Scope>>,
    behavior: B,
}

impl<B: AttributeBehavior> CustomAttribute<B> {
    pub fn new(behavior: B) -> Rc<Self> {
        let attribute = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            state: StateCell::default(),
            scope: RefCell::new(None),
            behavior,
        });
        if B::HOOKS.contains(Hooks::CREATED) {
            attribute.behavior.created(&attribute);
        }
        attribute
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
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
}

impl<B: AttributeBehavior> Bindable for CustomAttribute<B> {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        let flags = flags | LifecycleFlags::FROM_BIND;
        if self.state.get().is_bound() {
            let same = self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope));
            if same {
                return;
            }
            self.unbind(flags);
        }
        self.state.insert(LifecycleState::IS_BINDING);
        log::trace!("binding `{}`", B::NAME);

        let hooks = B::HOOKS;
        Lifecycle::begin_bind();
        if hooks.contains(Hooks::BOUND)
            && let Some(this) = self.callbacks()
        {
            Lifecycle::enqueue_bound(this, flags);
        }

        *self.scope.borrow_mut() = Some(scope.clone());
        if hooks.contains(Hooks::BINDING) {
            self.behavior.binding(self, flags);
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

        self.state
            .remove(LifecycleState::IS_BOUND | LifecycleState::IS_UNBINDING);
        Lifecycle::end_unbind();
    }

    fn state(&self) -> LifecycleState {
        self.state.get()
    }
}

impl<B: AttributeBehavior> Attachable for CustomAttribute<B> {
    fn attach(&self, encapsulation_source: Option<NodeId>, flags: LifecycleFlags) {
        if self.state.get().is_attached() {
            return;
        }
        self.state.insert(LifecycleState::IS_ATTACHING);
        let flags = flags | LifecycleFlags::FROM_ATTACH;

        let hooks = B::HOOKS;
        Lifecycle::begin_attach();
        if hooks.contains(Hooks::ATTACHING) {
            self.behavior.attaching(self, encapsulation_source, flags);
        }

        self.state.insert(LifecycleState::IS_ATTACHED);
        self.state.remove(LifecycleState::IS_ATTACHING);

        if hooks.contains(Hooks::ATTACHED)
            && let Some(this) = self.callbacks()
        {
            Lifecycle::enqueue_attached(this, flags);
        }
        Lifecycle::end_attach();
    }

    fn detach(&self, flags: LifecycleFlags) {
        if !self.state.get().is_attached() {
            return;
        }
        self.state.insert(LifecycleState::IS_DETACHING);
        let flags = flags | LifecycleFlags::FROM_DETACH;

        let hooks = B::HOOKS;
        Lifecycle::begin_detach();
        if hooks.contains(Hooks::DETACHING) {
            self.behavior.detaching(self, flags);
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
    }
}

impl<B: AttributeBehavior> LifecycleCallbacks for CustomAttribute<B> {
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

impl<B: AttributeBehavior> PropertyTarget for CustomAttribute<B> {
    fn set_property(&self, name: &str, value: Value, flags: LifecycleFlags) {
        self.behavior.set_property(self, name, value, flags);
    }
}

impl<B: AttributeBehavior> Flushable for CustomAttribute<B> {
    fn flush_changes(&self) {
        self.behavior.flush_changes(self);
    }
}

impl<B: AttributeBehavior> BatchedCollectionSubscriber for CustomAttribute<B> {
    fn handle_batched_change(&self, index_map: &[isize]) {
        self.behavior.handle_batched_change(self, index_map);
    }
}

impl<B: AttributeBehavior> fmt::Debug for CustomAttribute<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttribute")
            .field("name", &B::NAME)
            .field("state", &self.state.get())
            .finish()
    }
}
