//! Named signals.
//!
//! Bindings are one-time to-view, so a source that changes outside of the
//! binding graph (a clock, a locale switch) goes unnoticed. Wrapping a binding
//! in a [`SignalBinding`] subscribes it to one or more signal names on the
//! render context's [`Signaler`]; [`Signaler::dispatch_signal`] then
//! re-evaluates every bound subscriber of that name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use trellis_core::{Bindable, Error, LifecycleFlags, LifecycleState, Result, Scope};

use crate::binding::{LetBinding, PropertyBinding, TextBinding};

/// A binding that can be asked to update its target again.
pub trait Signalable: Bindable {
    fn handle_signal(&self, flags: LifecycleFlags);
}

impl Signalable for TextBinding {
    fn handle_signal(&self, _flags: LifecycleFlags) {
        self.refresh();
    }
}

impl Signalable for PropertyBinding {
    fn handle_signal(&self, flags: LifecycleFlags) {
        self.refresh(flags);
    }
}

impl Signalable for LetBinding {
    fn handle_signal(&self, _flags: LifecycleFlags) {
        self.refresh();
    }
}

#[derive(Default)]
pub struct Signaler {
    listeners: RefCell<HashMap<String, Vec<Weak<dyn Signalable>>>>,
}

impl Signaler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn add_signal_listener(&self, name: &str, listener: Weak<dyn Signalable>) {
        let mut listeners = self.listeners.borrow_mut();
        let entry = listeners.entry(name.to_string()).or_default();
        if !entry.iter().any(|l| l.ptr_eq(&listener)) {
            entry.push(listener);
        }
    }

    pub fn remove_signal_listener(&self, name: &str, listener: &Weak<dyn Signalable>) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(entry) = listeners.get_mut(name) {
            entry.retain(|l| !l.ptr_eq(listener) && l.strong_count() > 0);
            if entry.is_empty() {
                listeners.remove(name);
            }
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }

    /// Re-evaluates every live listener of `name`, in subscription order.
    pub fn dispatch_signal(&self, name: &str, flags: LifecycleFlags) {
        let targets: Vec<Rc<dyn Signalable>> = match self.listeners.borrow().get(name) {
            Some(entry) => entry.iter().filter_map(Weak::upgrade).collect(),
            None => return,
        };
        log::trace!("signal `{name}` reaches {} bindings", targets.len());
        for target in targets {
            target.handle_signal(flags);
        }
    }
}

/// Subscribes a binding to named signals while it is bound.
pub struct SignalBinding {
    signaler: Rc<Signaler>,
    names: Vec<String>,
    inner: Rc<dyn Signalable>,
}

impl SignalBinding {
    pub fn new(
        signaler: &Rc<Signaler>,
        names: Vec<String>,
        inner: Rc<dyn Signalable>,
    ) -> Result<Rc<Self>> {
        if names.is_empty() {
            return Err(Error::MissingSignalName);
        }
        Ok(Rc::new(Self {
            signaler: signaler.clone(),
            names,
            inner,
        }))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Bindable for SignalBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) {
        self.inner.bind(flags, scope);
        let listener = Rc::downgrade(&self.inner);
        for name in &self.names {
            self.signaler.add_signal_listener(name, listener.clone());
        }
    }

    fn unbind(&self, flags: LifecycleFlags) {
        if !self.inner.state().is_bound() {
            return;
        }
        let listener = Rc::downgrade(&self.inner);
        for name in self.names.iter().rev() {
            self.signaler.remove_signal_listener(name, &listener);
        }
        self.inner.unbind(flags);
    }

    fn state(&self) -> LifecycleState {
        self.inner.state()
    }
}
