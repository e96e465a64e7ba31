//! `repeat` template controller.
//!
//! Keeps one view per item of its `items` value, binding each to a child
//! scope whose binding context holds the item under the repeat's local name.
//! Observed collections are subscribed to, and their batched index maps are
//! used to rebind only the views whose slot changed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use trellis_core::collection::{count, iterate};
use trellis_core::{
    Attachable, BatchedCollectionSubscriber, Bindable, BindingContext, CollectionObserver, Hooks,
    LifecycleFlags, NodeId, Scope, Value,
};

use crate::custom_attribute::{AttributeBehavior, CustomAttribute};
use crate::template::{RenderContext, Renderable};
use crate::view::{ViewFactory, ViewRef};

pub struct Repeat {
    context: RenderContext,
    factory: Rc<ViewFactory>,
    location: NodeId,
    local: String,
    items: RefCell<Value>,
    views: RefCell<Vec<ViewRef>>,
    observer: RefCell<Option<Rc<CollectionObserver>>>,
    encapsulation_source: Cell<Option<NodeId>>,
}

impl Repeat {
    pub fn create(
        context: &RenderContext,
        factory: Rc<ViewFactory>,
        location: NodeId,
        local: &str,
    ) -> Rc<CustomAttribute<Repeat>> {
        CustomAttribute::new(Self {
            context: context.clone(),
            factory,
            location,
            local: local.to_string(),
            items: RefCell::new(Value::Undefined),
            views: RefCell::new(Vec::new()),
            observer: RefCell::new(None),
            encapsulation_source: Cell::new(None),
        })
    }

    pub fn views(&self) -> Vec<ViewRef> {
        self.views.borrow().clone()
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// Reconciles the views with the current items. With an index map only
    /// the slots that did not keep their item are rebound and reattached.
    fn process_views(
        &self,
        owner: &CustomAttribute<Self>,
        index_map: Option<&[isize]>,
        flags: LifecycleFlags,
    ) {
        if owner.state().is_bound() && !self.bind_views(owner, index_map, flags) {
            return;
        }

        if owner.state().is_attached() {
            let source = self.encapsulation_source.get();
            let views = self.views();
            for (index, view) in views.iter().enumerate() {
                let changed = index_map.is_none_or(|map| map.get(index) != Some(&(index as isize)));
                if !changed {
                    continue;
                }
                if let Err(err) = view.hold(self.location) {
                    log::error!("`repeat` could not hold view {index}: {err}");
                    continue;
                }
                view.attach(source, LifecycleFlags::FROM_BINDABLE_HANDLER);
            }
        }
    }

    /// Resizes the view list and binds every view to its item. Returns
    /// `false` if there is nothing left to attach.
    fn bind_views(
        &self,
        owner: &CustomAttribute<Self>,
        index_map: Option<&[isize]>,
        flags: LifecycleFlags,
    ) -> bool {
        let Some(scope) = owner.scope() else {
            return false;
        };
        let items = self.items.borrow().clone();
        let old_len = self.views.borrow().len();
        let new_len = count(&items);

        if old_len < new_len {
            for _ in old_len..new_len {
                match self.factory.create() {
                    Ok(view) => self.views.borrow_mut().push(view),
                    Err(err) => {
                        log::error!("`repeat` could not create a view: {err}");
                        return false;
                    }
                }
            }
        } else if new_len < old_len {
            let removed: Vec<ViewRef> = self.views.borrow_mut().drain(new_len..).collect();
            for view in removed {
                view.release();
                view.detach(LifecycleFlags::FROM_BINDABLE_HANDLER);
                view.unbind(LifecycleFlags::FROM_BINDABLE_HANDLER);
            }
        }
        if new_len == 0 {
            return false;
        }

        let mut values = Vec::with_capacity(new_len);
        iterate(&items, |item, _| values.push(item.clone()));

        let views = self.views();
        for (index, (view, item)) in views.iter().zip(&values).enumerate() {
            let existing = view.scope();
            let unchanged = match index_map {
                Some(map) => map.get(index) == Some(&(index as isize)),
                None => existing
                    .as_ref()
                    .and_then(|s| s.binding_context().get(&self.local))
                    .is_some_and(|current| current.same(item)),
            };
            let next = match existing {
                Some(existing) if unchanged => {
                    if existing.parent().is_some_and(|parent| parent.ptr_eq(&scope)) {
                        existing
                    } else {
                        Scope::from_parent(&scope, existing.binding_context().clone())
                    }
                }
                _ => Scope::from_parent(
                    &scope,
                    BindingContext::new().with(self.local.as_str(), item.clone()),
                ),
            };
            view.bind(flags, &next);
        }
        true
    }

    fn check_collection_observer(&self, owner: &CustomAttribute<Self>) {
        let subscriber: Weak<dyn BatchedCollectionSubscriber> = owner.weak();
        let old = self.observer.borrow().clone();

        if !owner.state().is_bound() {
            if let Some(old) = old {
                old.unsubscribe(&subscriber);
                self.observer.borrow_mut().take();
            }
            return;
        }

        let items = self.items.borrow().clone();
        let new = items
            .as_collection()
            .map(|collection| collection.observer(&self.context.change_set));
        let same = match (&old, &new) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            if let Some(old) = &old {
                old.unsubscribe(&subscriber);
            }
            if let Some(new) = &new {
                new.subscribe(subscriber);
            }
        }
        *self.observer.borrow_mut() = new;
    }
}

impl AttributeBehavior for Repeat {
    const NAME: &'static str = "repeat";
    const HOOKS: Hooks = Hooks::BOUND
        .union(Hooks::ATTACHING)
        .union(Hooks::DETACHING)
        .union(Hooks::UNBOUND)
        .union(Hooks::CACHING);

    fn bound(&self, owner: &CustomAttribute<Self>, flags: LifecycleFlags) {
        self.process_views(owner, None, flags);
        self.check_collection_observer(owner);
    }

    fn attaching(
        &self,
        _owner: &CustomAttribute<Self>,
        encapsulation_source: Option<NodeId>,
        flags: LifecycleFlags,
    ) {
        self.encapsulation_source.set(encapsulation_source);
        for view in self.views() {
            if let Err(err) = view.hold(self.location) {
                log::error!("`repeat` could not hold a view: {err}");
                continue;
            }
            view.attach(encapsulation_source, flags);
        }
    }

    fn detaching(&self, _owner: &CustomAttribute<Self>, flags: LifecycleFlags) {
        for view in self.views() {
            view.detach(flags);
        }
    }

    fn unbound(&self, owner: &CustomAttribute<Self>, flags: LifecycleFlags) {
        self.check_collection_observer(owner);
        for view in self.views() {
            view.unbind(flags);
        }
    }

    fn caching(&self, _owner: &CustomAttribute<Self>) {
        let views: Vec<ViewRef> = self.views.borrow_mut().drain(..).collect();
        for view in views {
            view.release();
        }
    }

    fn set_property(
        &self,
        owner: &CustomAttribute<Self>,
        name: &str,
        value: Value,
        flags: LifecycleFlags,
    ) {
        if name != "items" {
            log::warn!("`repeat` has no bindable property `{name}`");
            return;
        }
        *self.items.borrow_mut() = value;
        if owner.state().is_bound() {
            self.check_collection_observer(owner);
            self.process_views(owner, None, flags | LifecycleFlags::UPDATE_TARGET_INSTANCE);
        }
    }

    fn handle_batched_change(&self, owner: &CustomAttribute<Self>, index_map: &[isize]) {
        log::trace!("`repeat` received index map {index_map:?}");
        self.process_views(
            owner,
            Some(index_map),
            LifecycleFlags::FROM_FLUSH_CHANGES | LifecycleFlags::UPDATE_TARGET_INSTANCE,
        );
    }
}
