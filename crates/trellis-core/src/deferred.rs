//! Single-threaded one-shot deferred values.
//!
//! A [`Deferred`] starts pending and settles exactly once, either resolved
//! with a value or rejected with a [`Rejection`]. Continuations registered
//! with [`Deferred::then`] run synchronously at settlement, or immediately if
//! the value has already settled.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deferred value rejected: {0}")]
pub struct Rejection(pub String);

#[derive(Clone, Debug)]
pub enum DeferredState<T> {
    Pending,
    Resolved(T),
    Rejected(Rejection),
}

type Continuation<T> = Box<dyn FnOnce(Result<T, Rejection>)>;

struct Inner<T> {
    state: DeferredState<T>,
    continuations: Vec<Continuation<T>>,
}

pub struct Deferred<T>(Rc<RefCell<Inner<T>>>);

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Inner {
            state: DeferredState::Pending,
            continuations: Vec::new(),
        })))
    }

    pub fn resolved(value: T) -> Self {
        let d = Self::new();
        d.resolve(value);
        d
    }

    pub fn state(&self) -> DeferredState<T> {
        self.0.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.0.borrow().state, DeferredState::Pending)
    }

    pub fn ptr_eq(&self, other: &Deferred<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Settles with `value`. Ignored if already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settles with a rejection. Ignored if already settled.
    pub fn reject(&self, reason: impl Into<String>) {
        self.settle(Err(Rejection(reason.into())));
    }

    fn settle(&self, outcome: Result<T, Rejection>) {
        let continuations = {
            let mut inner = self.0.borrow_mut();
            if !matches!(inner.state, DeferredState::Pending) {
                log::warn!("deferred value settled twice; ignoring the second outcome");
                return;
            }
            inner.state = match &outcome {
                Ok(v) => DeferredState::Resolved(v.clone()),
                Err(e) => DeferredState::Rejected(e.clone()),
            };
            std::mem::take(&mut inner.continuations)
        };
        for continuation in continuations {
            continuation(outcome.clone());
        }
    }

    /// Runs `f` with the outcome once settled.
    pub fn then(&self, f: impl FnOnce(Result<T, Rejection>) + 'static) {
        let outcome = {
            let mut guard = self.0.borrow_mut();
            let inner = &mut *guard;
            match &inner.state {
                DeferredState::Pending => {
                    inner.continuations.push(Box::new(f));
                    return;
                }
                DeferredState::Resolved(v) => Ok(v.clone()),
                DeferredState::Rejected(e) => Err(e.clone()),
            }
        };
        f(outcome);
    }

    /// A new deferred settled with `f` applied to this one's value.
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> Deferred<U> {
        let mapped = Deferred::new();
        let target = mapped.clone();
        self.then(move |outcome| match outcome {
            Ok(v) => target.resolve(f(v)),
            Err(Rejection(reason)) => target.reject(reason),
        });
        mapped
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.0.borrow().state {
            DeferredState::Pending => "pending",
            DeferredState::Resolved(_) => "resolved",
            DeferredState::Rejected(_) => "rejected",
        };
        write!(f, "Deferred({state})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn continuations_run_on_resolve_and_after() {
        let d = Deferred::new();
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        d.then(move |r| s.set(s.get() + r.unwrap_or(0)));
        assert_eq!(seen.get(), 0);

        d.resolve(2);
        assert_eq!(seen.get(), 2);

        let s = seen.clone();
        d.then(move |r| s.set(s.get() + r.unwrap_or(0)));
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn second_settlement_is_ignored() {
        let d = Deferred::new();
        d.reject("nope");
        d.resolve(1);
        assert!(matches!(d.state(), DeferredState::Rejected(Rejection(r)) if r == "nope"));
    }

    #[test]
    fn map_forwards_rejection() {
        let d: Deferred<i32> = Deferred::new();
        let m = d.map(|v| v * 2);
        d.reject("x");
        assert!(matches!(m.state(), DeferredState::Rejected(_)));

        let ok = Deferred::resolved(3).map(|v| v + 1);
        assert!(matches!(ok.state(), DeferredState::Resolved(4)));
    }
}
