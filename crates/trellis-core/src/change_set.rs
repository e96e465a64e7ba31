//! Batched change queue.
//!
//! Synchronous state changes that should not touch the tree immediately
//! enqueue a [`Flushable`] here. Nothing happens until `flush_changes`, which
//! drains the queue in passes: everything enqueued while a pass runs is
//! picked up by the next pass of the same drain.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Work deferred to the next flush.
pub trait Flushable {
    fn flush_changes(&self);
}

/// The queue abstraction consumed by controllers and observers.
pub trait ChangeQueue {
    /// Enqueues `item` unless it is already pending.
    fn add(&self, item: Rc<dyn Flushable>);

    fn flush_changes(&self);

    /// Number of pending items.
    fn size(&self) -> usize;
}

/// Upper bound on passes per drain; a flushable that re-enqueues itself
/// forever is dropped after this many.
const MAX_PASSES: usize = 1024;

#[derive(Default)]
pub struct ChangeSet {
    pending: RefCell<Vec<Rc<dyn Flushable>>>,
    flushing: Cell<bool>,
}

impl ChangeSet {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }
}

fn same_item(a: &Rc<dyn Flushable>, b: &Rc<dyn Flushable>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ChangeQueue for ChangeSet {
    fn add(&self, item: Rc<dyn Flushable>) {
        let mut pending = self.pending.borrow_mut();
        if pending.iter().any(|p| same_item(p, &item)) {
            return;
        }
        pending.push(item);
    }

    fn flush_changes(&self) {
        if self.flushing.replace(true) {
            return;
        }
        let _guard = FlushGuard(&self.flushing);

        for pass in 0.. {
            let batch = std::mem::take(&mut *self.pending.borrow_mut());
            if batch.is_empty() {
                break;
            }
            if pass == MAX_PASSES {
                log::error!(
                    "change set still had {} pending items after {MAX_PASSES} passes; dropping them",
                    batch.len()
                );
                break;
            }
            log::trace!("change set pass {pass}: {} items", batch.len());
            for item in batch {
                item.flush_changes();
            }
        }
    }

    fn size(&self) -> usize {
        self.pending.borrow().len()
    }
}
