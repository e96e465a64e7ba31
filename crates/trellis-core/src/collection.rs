//! # Observed collections
//!
//! Arrays, sets and maps whose mutations are reported in batches. A
//! collection lazily creates a single [`CollectionObserver`] the first time
//! something asks to observe it. From then on every mutation updates the
//! observer's index map and enqueues the observer on its change queue (once per
//! batch). Flushing the queue hands the accumulated map to every live
//! subscriber and resets it.
//!
//! The index map has one entry per current item: the item's index before the
//! batch started, or [`NEW_ITEM`] if the slot holds a new or replaced item.
//! `index_map[i] == i` therefore means "the item at `i` is unchanged".

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::change_set::{ChangeQueue, Flushable};
use crate::value::{Entry, Value};

/// Index map marker for slots that hold a new or replaced item.
pub const NEW_ITEM: isize = -2;

/// Receives batched collection changes.
pub trait BatchedCollectionSubscriber {
    fn handle_batched_change(&self, index_map: &[isize]);
}

fn identity_map(len: usize) -> Vec<isize> {
    (0..len as isize).collect()
}

pub struct CollectionObserver {
    index_map: RefCell<Vec<isize>>,
    subscribers: RefCell<Vec<Weak<dyn BatchedCollectionSubscriber>>>,
    change_set: Rc<dyn ChangeQueue>,
    queued: Cell<bool>,
    this: Weak<CollectionObserver>,
}

impl CollectionObserver {
    fn new(len: usize, change_set: Rc<dyn ChangeQueue>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            index_map: RefCell::new(identity_map(len)),
            subscribers: RefCell::new(Vec::new()),
            change_set,
            queued: Cell::new(false),
            this: this.clone(),
        })
    }

    pub fn subscribe(&self, subscriber: Weak<dyn BatchedCollectionSubscriber>) {
        let mut subs = self.subscribers.borrow_mut();
        if subs.iter().any(|s| s.ptr_eq(&subscriber)) {
            return;
        }
        subs.push(subscriber);
    }

    pub fn unsubscribe(&self, subscriber: &Weak<dyn BatchedCollectionSubscriber>) {
        self.subscribers
            .borrow_mut()
            .retain(|s| !std::ptr::addr_eq(s.as_ptr(), subscriber.as_ptr()));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// The changes accumulated since the last flush.
    pub fn index_map(&self) -> Vec<isize> {
        self.index_map.borrow().clone()
    }

    fn record(&self, f: impl FnOnce(&mut Vec<isize>)) {
        f(&mut self.index_map.borrow_mut());
        if self.queued.replace(true) {
            return;
        }
        match self.this.upgrade() {
            Some(this) => self.change_set.add(this),
            None => self.queued.set(false),
        }
    }
}

impl Flushable for CollectionObserver {
    fn flush_changes(&self) {
        self.queued.set(false);
        let map = {
            let mut current = self.index_map.borrow_mut();
            let len = current.len();
            std::mem::replace(&mut *current, identity_map(len))
        };
        self.subscribers.borrow_mut().retain(|s| s.strong_count() > 0);
        let subscribers: Vec<_> = self
            .subscribers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        log::debug!(
            "collection change: {} subscribers, map {:?}",
            subscribers.len(),
            map
        );
        for subscriber in subscribers {
            subscriber.handle_batched_change(&map);
        }
    }
}

#[derive(Default)]
struct CollectionCore {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<CollectionObserver>>>,
}

impl CollectionCore {
    fn with_items(items: Vec<Value>) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items),
            observer: RefCell::new(None),
        })
    }

    fn observer(&self, change_set: &Rc<dyn ChangeQueue>) -> Rc<CollectionObserver> {
        self.observer
            .borrow_mut()
            .get_or_insert_with(|| {
                CollectionObserver::new(self.items.borrow().len(), change_set.clone())
            })
            .clone()
    }

    /// Applies a mutation to the items and, if observed, to the index map.
    fn mutate<R>(
        &self,
        items: impl FnOnce(&mut Vec<Value>) -> R,
        map: impl FnOnce(&mut Vec<isize>),
    ) -> R {
        let result = items(&mut self.items.borrow_mut());
        let observer = self.observer.borrow().clone();
        if let Some(observer) = observer {
            observer.record(map);
        }
        result
    }

    fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }
}

#[derive(Clone, Default)]
pub struct ObservedArray(Rc<CollectionCore>);

impl ObservedArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self(CollectionCore::with_items(
            items.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.snapshot()
    }

    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        self.0.mutate(|items| items.push(value), |map| map.push(NEW_ITEM));
    }

    pub fn pop(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        self.0.mutate(Vec::pop, |map| {
            map.pop();
        })
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let index = index.min(self.len());
        let value = value.into();
        self.0.mutate(
            |items| items.insert(index, value),
            |map| map.insert(index, NEW_ITEM),
        );
    }

    pub fn remove(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        Some(self.0.mutate(
            |items| items.remove(index),
            |map| {
                map.remove(index);
            },
        ))
    }

    pub fn set(&self, index: usize, value: impl Into<Value>) {
        if index >= self.len() {
            self.push(value);
            return;
        }
        let value = value.into();
        self.0.mutate(
            |items| items[index] = value,
            |map| map[index] = NEW_ITEM,
        );
    }

    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.0.mutate(Vec::clear, Vec::clear);
    }

    pub fn reverse(&self) {
        self.0.mutate(|items| items.reverse(), |map| map.reverse());
    }

    /// Removes `delete_count` items at `start` and inserts `insert` in their
    /// place. Returns the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let len = self.len();
        let start = start.min(len);
        let end = start.saturating_add(delete_count).min(len);
        let insert: Vec<Value> = insert.into_iter().collect();
        let added = insert.len();
        self.0.mutate(
            |items| items.splice(start..end, insert).collect(),
            |map| {
                map.splice(start..end, std::iter::repeat_n(NEW_ITEM, added));
            },
        )
    }
}

/// Insertion-ordered set, deduplicated by [`Value::same`].
#[derive(Clone, Default)]
pub struct ObservedSet(Rc<CollectionCore>);

impl ObservedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, value: &Value) -> Option<usize> {
        self.0.items.borrow().iter().position(|v| v.same(value))
    }

    pub fn has(&self, value: &Value) -> bool {
        self.position(value).is_some()
    }

    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.has(&value) {
            return false;
        }
        self.0.mutate(|items| items.push(value), |map| map.push(NEW_ITEM));
        true
    }

    pub fn delete(&self, value: &Value) -> bool {
        let Some(index) = self.position(value) else {
            return false;
        };
        self.0.mutate(
            |items| {
                items.remove(index);
            },
            |map| {
                map.remove(index);
            },
        );
        true
    }

    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.0.mutate(Vec::clear, Vec::clear);
    }
}

/// Insertion-ordered map. Iteration yields [`Value::Entry`] items.
#[derive(Clone, Default)]
pub struct ObservedMap(Rc<CollectionCore>);

impl ObservedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.0
            .items
            .borrow()
            .iter()
            .position(|v| matches!(v, Value::Entry(e) if e.key.same(key)))
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let index = self.position(key)?;
        match &self.0.items.borrow()[index] {
            Value::Entry(e) => Some(e.value.clone()),
            _ => None,
        }
    }

    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let key = key.into();
        let entry = Value::Entry(Rc::new(Entry {
            key: key.clone(),
            value: value.into(),
        }));
        match self.position(&key) {
            Some(index) => self.0.mutate(
                |items| items[index] = entry,
                |map| map[index] = NEW_ITEM,
            ),
            None => self.0.mutate(|items| items.push(entry), |map| map.push(NEW_ITEM)),
        }
    }

    pub fn delete(&self, key: &Value) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        self.0.mutate(
            |items| {
                items.remove(index);
            },
            |map| {
                map.remove(index);
            },
        );
        true
    }

    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        self.0.mutate(Vec::clear, Vec::clear);
    }
}

/// Any observable collection.
#[derive(Clone)]
pub enum Collection {
    Array(ObservedArray),
    Set(ObservedSet),
    Map(ObservedMap),
}

impl Collection {
    fn core(&self) -> &Rc<CollectionCore> {
        match self {
            Collection::Array(a) => &a.0,
            Collection::Set(s) => &s.0,
            Collection::Map(m) => &m.0,
        }
    }

    pub fn count(&self) -> usize {
        self.core().items.borrow().len()
    }

    /// Visits every item in order. The items are copied first, so `f` may
    /// mutate the collection.
    pub fn iterate(&self, mut f: impl FnMut(&Value, usize)) {
        for (index, item) in self.core().snapshot().iter().enumerate() {
            f(item, index);
        }
    }

    /// The collection's observer, created on first use.
    pub fn observer(&self, change_set: &Rc<dyn ChangeQueue>) -> Rc<CollectionObserver> {
        self.core().observer(change_set)
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Rc::ptr_eq(self.core(), other.core())
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Collection::Array(_) => "Array",
            Collection::Set(_) => "Set",
            Collection::Map(_) => "Map",
        };
        write!(f, "{kind}(len = {})", self.count())
    }
}

impl From<ObservedArray> for Collection {
    fn from(v: ObservedArray) -> Self {
        Collection::Array(v)
    }
}

impl From<ObservedSet> for Collection {
    fn from(v: ObservedSet) -> Self {
        Collection::Set(v)
    }
}

impl From<ObservedMap> for Collection {
    fn from(v: ObservedMap) -> Self {
        Collection::Map(v)
    }
}

impl From<ObservedArray> for Value {
    fn from(v: ObservedArray) -> Self {
        Value::Collection(v.into())
    }
}

impl From<ObservedSet> for Value {
    fn from(v: ObservedSet) -> Self {
        Value::Collection(v.into())
    }
}

impl From<ObservedMap> for Value {
    fn from(v: ObservedMap) -> Self {
        Value::Collection(v.into())
    }
}

/// Largest range a number may be repeated as.
pub const MAX_RANGE: usize = 1 << 20;

/// Number of items a value yields when iterated. Numbers yield a range
/// (truncated, at most [`MAX_RANGE`]); non-finite numbers, `null` and
/// `undefined` yield nothing.
pub fn count(value: &Value) -> usize {
    match value {
        Value::Collection(c) => c.count(),
        Value::Number(n) if !n.is_finite() => {
            log::warn!("cannot iterate the non-finite number {n}");
            0
        }
        Value::Number(n) if *n >= MAX_RANGE as f64 => {
            log::warn!("range of {n} clamped to {MAX_RANGE} items");
            MAX_RANGE
        }
        Value::Number(n) if *n > 0.0 => *n as usize,
        _ => 0,
    }
}

/// Iterates a value the way a repeater consumes it. See [`count`].
pub fn iterate(value: &Value, mut f: impl FnMut(&Value, usize)) {
    match value {
        Value::Collection(c) => c.iterate(f),
        Value::Number(_) => {
            for index in 0..count(value) {
                f(&Value::from(index), index);
            }
        }
        _ => {}
    }
}
