//! Composition coordinator.
//!
//! Swaps one view for another at a location, keeping at most one view
//! attached. Requests are tagged with a generation counter: a pending request
//! only applies if no newer `compose` (or an `unbinding`) happened before it
//! settled. Requests that arrive while a swap is running are coalesced and
//! only the latest is applied once the running swap finishes.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use trellis_core::{Attachable, Bindable, Deferred, LifecycleFlags, NodeId, Scope};

use crate::view::ViewRef;

/// What a coordinator can be asked to show.
pub enum Composable {
    /// A ready view, or nothing.
    View(Option<ViewRef>),
    Pending(Deferred<Option<ViewRef>>),
}

impl From<Option<ViewRef>> for Composable {
    fn from(view: Option<ViewRef>) -> Self {
        Composable::View(view)
    }
}

impl From<ViewRef> for Composable {
    fn from(view: ViewRef) -> Self {
        Composable::View(Some(view))
    }
}

impl From<Deferred<Option<ViewRef>>> for Composable {
    fn from(pending: Deferred<Option<ViewRef>>) -> Self {
        Composable::Pending(pending)
    }
}

pub struct CompositionCoordinator {
    this: Weak<Self>,
    current_view: RefCell<Option<ViewRef>>,
    scope: RefCell<Option<Scope>>,
    encapsulation_source: Cell<Option<NodeId>>,
    is_bound: Cell<bool>,
    is_attached: Cell<bool>,
    generation: Cell<u64>,
    swapping: Cell<bool>,
    queued: RefCell<Option<Option<ViewRef>>>,
    on_swap_complete: RefCell<Option<Box<dyn Fn()>>>,
}

impl CompositionCoordinator {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            current_view: RefCell::new(None),
            scope: RefCell::new(None),
            encapsulation_source: Cell::new(None),
            is_bound: Cell::new(false),
            is_attached: Cell::new(false),
            generation: Cell::new(0),
            swapping: Cell::new(false),
            queued: RefCell::new(None),
            on_swap_complete: RefCell::new(None),
        })
    }

    /// Installs the callback fired once per completed swap.
    pub fn on_swap_complete(&self, callback: impl Fn() + 'static) {
        *self.on_swap_complete.borrow_mut() = Some(Box::new(callback));
    }

    pub fn current_view(&self) -> Option<ViewRef> {
        self.current_view.borrow().clone()
    }

    pub fn is_swapping(&self) -> bool {
        self.swapping.get()
    }

    pub fn compose(&self, subject: impl Into<Composable>) {
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);

        match subject.into() {
            Composable::View(view) => self.request(view),
            Composable::Pending(pending) => {
                let this = self.this.clone();
                pending.then(move |outcome| {
                    let Some(this) = this.upgrade() else {
                        return;
                    };
                    if this.generation.get() != generation {
                        log::debug!("dropping superseded composition request");
                        return;
                    }
                    match outcome {
                        Ok(view) => this.request(view),
                        Err(rejection) => {
                            log::warn!("composition subject was rejected: {rejection}")
                        }
                    }
                });
            }
        }
    }

    fn request(&self, view: Option<ViewRef>) {
        if self.swapping.get() {
            *self.queued.borrow_mut() = Some(view);
            return;
        }

        self.swapping.set(true);
        let mut next = Some(view);
        while let Some(view) = next {
            self.swap(view);
            next = self.queued.borrow_mut().take();
        }
        self.swapping.set(false);

        let callback = self.on_swap_complete.borrow_mut().take();
        if let Some(callback) = callback {
            callback();
            let mut slot = self.on_swap_complete.borrow_mut();
            if slot.is_none() {
                *slot = Some(callback);
            }
        }
    }

    fn swap(&self, view: Option<ViewRef>) {
        let current = self.current_view.borrow().clone();
        let unchanged = match (&current, &view) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        let flags = LifecycleFlags::empty();
        if let Some(old) = current {
            if self.is_attached.get() && old.state().is_attached() {
                old.detach(flags);
            }
            if self.is_bound.get() {
                old.unbind(flags);
            }
        }

        *self.current_view.borrow_mut() = view.clone();

        if let Some(new) = view {
            if self.is_bound.get() {
                let scope = self.scope.borrow().clone();
                if let Some(scope) = scope {
                    new.bind(flags, &scope);
                }
            }
            if self.is_attached.get() {
                new.attach(self.encapsulation_source.get(), flags);
            }
        }
        log::debug!("composition swap applied");
    }

    pub fn binding(&self, flags: LifecycleFlags, scope: &Scope) {
        *self.scope.borrow_mut() = Some(scope.clone());
        self.is_bound.set(true);
        if let Some(view) = self.current_view() {
            view.bind(flags, scope);
        }
    }

    pub fn attaching(&self, encapsulation_source: Option<NodeId>, flags: LifecycleFlags) {
        self.encapsulation_source.set(encapsulation_source);
        self.is_attached.set(true);
        if let Some(view) = self.current_view() {
            view.attach(encapsulation_source, flags);
        }
    }

    pub fn detaching(&self, flags: LifecycleFlags) {
        self.is_attached.set(false);
        if let Some(view) = self.current_view() {
            view.detach(flags);
        }
    }

    /// Unbinds the current view and cancels any pending request.
    pub fn unbinding(&self, flags: LifecycleFlags) {
        self.generation.set(self.generation.get().wrapping_add(1));
        self.is_bound.set(false);
        if let Some(view) = self.current_view() {
            view.unbind(flags);
        }
    }

    pub fn caching(&self) {
        let view = self.current_view.borrow_mut().take();
        drop(view);
    }
}
