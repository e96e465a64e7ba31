//! # Lifecycle
//!
//! Every participant in the binding/attachment graph (bindings, views,
//! custom elements, custom attributes) carries a [`LifecycleState`] and moves
//! through two independent axes:
//!
//! - bind axis: `none → IS_BINDING → IS_BOUND → IS_UNBINDING → none`
//! - attach axis: `none → IS_ATTACHING → IS_ATTACHED → IS_DETACHING → none`
//!
//! `NEEDS_MOUNT` toggles orthogonally and records whether the entity's nodes
//! still have to be physically inserted.
//!
//! Children are bound/attached in declaration order and unbound/detached in
//! exact reverse order.
//!
//! Work that must happen once a whole subtree has settled (mounting nodes,
//! `bound`/`attached`/`detached`/`unbound` callbacks) is deferred through
//! [`Lifecycle`]: each traversal opens a frame, and the queued work runs when
//! the outermost frame closes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bitflags::bitflags;

use crate::dom::NodeId;
use crate::scope::Scope;

bitflags! {
    /// Where an entity currently is in its bind/attach lifecycle.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct LifecycleState: u16 {
        const IS_BINDING   = 1 << 0;
        const IS_BOUND     = 1 << 1;
        const IS_UNBINDING = 1 << 2;
        const IS_ATTACHING = 1 << 3;
        const IS_ATTACHED  = 1 << 4;
        const IS_DETACHING = 1 << 5;
        const NEEDS_MOUNT  = 1 << 6;
        const IS_CACHED    = 1 << 7;
    }
}

impl LifecycleState {
    pub const NONE: Self = Self::empty();

    pub fn is_bound(self) -> bool {
        self.contains(Self::IS_BOUND)
    }

    pub fn is_attached(self) -> bool {
        self.contains(Self::IS_ATTACHED)
    }

    pub fn needs_mount(self) -> bool {
        self.contains(Self::NEEDS_MOUNT)
    }

    pub fn is_cached(self) -> bool {
        self.contains(Self::IS_CACHED)
    }
}

bitflags! {
    /// Describes why a lifecycle call is happening.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct LifecycleFlags: u32 {
        const FROM_BIND              = 1 << 0;
        const FROM_UNBIND            = 1 << 1;
        const FROM_ATTACH            = 1 << 2;
        const FROM_DETACH            = 1 << 3;
        const FROM_FLUSH_CHANGES     = 1 << 4;
        /// Internal housekeeping (e.g. the repeater trimming surplus views).
        const FROM_BINDABLE_HANDLER  = 1 << 5;
        const FROM_RELEASE           = 1 << 6;
        const UPDATE_TARGET_INSTANCE = 1 << 7;
        const MUST_EVALUATE          = 1 << 8;
    }
}

bitflags! {
    /// Optional hooks a component behavior implements.
    ///
    /// Declared once per behavior type; lifecycle drivers only call the hooks
    /// present in the mask.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Hooks: u16 {
        const CREATED   = 1 << 0;
        const BINDING   = 1 << 1;
        const BOUND     = 1 << 2;
        const ATTACHING = 1 << 3;
        const ATTACHED  = 1 << 4;
        const DETACHING = 1 << 5;
        const DETACHED  = 1 << 6;
        const UNBINDING = 1 << 7;
        const UNBOUND   = 1 << 8;
        const CACHING   = 1 << 9;
        const RENDER    = 1 << 10;
    }
}

/// Interior-mutable holder for a [`LifecycleState`].
#[derive(Default, Debug)]
pub struct StateCell(Cell<LifecycleState>);

impl StateCell {
    pub fn new(state: LifecycleState) -> Self {
        Self(Cell::new(state))
    }

    pub fn get(&self) -> LifecycleState {
        self.0.get()
    }

    pub fn set(&self, state: LifecycleState) {
        self.0.set(state);
    }

    pub fn insert(&self, flags: LifecycleState) {
        self.0.set(self.0.get() | flags);
    }

    pub fn remove(&self, flags: LifecycleState) {
        self.0.set(self.0.get() - flags);
    }

    pub fn contains(&self, flags: LifecycleState) -> bool {
        self.0.get().contains(flags)
    }
}

/// Anything taking part in bind/unbind traversal.
pub trait Bindable {
    /// Binds to `scope`. Binding again to the identical scope is a no-op;
    /// binding to a different scope unbinds first.
    fn bind(&self, flags: LifecycleFlags, scope: &Scope);

    /// No-op unless bound.
    fn unbind(&self, flags: LifecycleFlags);

    fn state(&self) -> LifecycleState;
}

/// Anything taking part in attach/detach traversal.
pub trait Attachable {
    /// No-op if already attached.
    fn attach(&self, encapsulation_source: Option<NodeId>, flags: LifecycleFlags);

    /// No-op unless attached.
    fn detach(&self, flags: LifecycleFlags);

    /// Called when the owning view is returned to its factory's pool.
    fn cache(&self);
}

/// Something that owns nodes which can be physically placed and removed.
pub trait Mountable {
    fn mount(&self, flags: LifecycleFlags);

    /// Returns `true` when the unmount also returned the owner to a pool.
    fn unmount(&self, flags: LifecycleFlags) -> bool;
}

/// Deferred notifications fired once an outermost lifecycle frame closes.
pub trait LifecycleCallbacks {
    fn bound(&self, _flags: LifecycleFlags) {}
    fn unbound(&self, _flags: LifecycleFlags) {}
    fn attached(&self, _flags: LifecycleFlags) {}
    fn detached(&self, _flags: LifecycleFlags) {}
}

struct Frame<T: ?Sized> {
    depth: usize,
    draining: bool,
    items: VecDeque<(Rc<T>, LifecycleFlags)>,
}

impl<T: ?Sized> Default for Frame<T> {
    fn default() -> Self {
        Self {
            depth: 0,
            draining: false,
            items: VecDeque::new(),
        }
    }
}

#[derive(Default)]
struct Queues {
    bind: Frame<dyn LifecycleCallbacks>,
    unbind: Frame<dyn LifecycleCallbacks>,
    mount: Frame<dyn Mountable>,
    attached: VecDeque<(Rc<dyn LifecycleCallbacks>, LifecycleFlags)>,
    unmount: Frame<dyn Mountable>,
    detached: VecDeque<(Rc<dyn LifecycleCallbacks>, LifecycleFlags)>,
}

thread_local! {
    static QUEUES: RefCell<Queues> = RefCell::new(Queues::default());
}

/// Per-thread registry of deferred lifecycle work.
///
/// Frames nest: `begin_*` increments the depth and `end_*` decrements it.
/// When the outermost frame closes, queued items run in enqueue order. Work
/// queued while draining is picked up by the same drain.
pub struct Lifecycle;

impl Lifecycle {
    pub fn begin_bind() {
        QUEUES.with(|q| q.borrow_mut().bind.depth += 1);
    }

    pub fn enqueue_bound(item: Rc<dyn LifecycleCallbacks>, flags: LifecycleFlags) {
        QUEUES.with(|q| q.borrow_mut().bind.items.push_back((item, flags)));
    }

    pub fn end_bind() {
        if !Self::close(|q| &mut q.bind) {
            return;
        }
        while let Some((item, flags)) = QUEUES.with(|q| q.borrow_mut().bind.items.pop_front()) {
            item.bound(flags);
        }
        QUEUES.with(|q| q.borrow_mut().bind.draining = false);
    }

    pub fn begin_unbind() {
        QUEUES.with(|q| q.borrow_mut().unbind.depth += 1);
    }

    pub fn enqueue_unbound(item: Rc<dyn LifecycleCallbacks>, flags: LifecycleFlags) {
        QUEUES.with(|q| q.borrow_mut().unbind.items.push_back((item, flags)));
    }

    pub fn end_unbind() {
        if !Self::close(|q| &mut q.unbind) {
            return;
        }
        while let Some((item, flags)) = QUEUES.with(|q| q.borrow_mut().unbind.items.pop_front()) {
            item.unbound(flags);
        }
        QUEUES.with(|q| q.borrow_mut().unbind.draining = false);
    }

    pub fn begin_attach() {
        QUEUES.with(|q| q.borrow_mut().mount.depth += 1);
    }

    pub fn enqueue_mount(item: Rc<dyn Mountable>, flags: LifecycleFlags) {
        QUEUES.with(|q| q.borrow_mut().mount.items.push_back((item, flags)));
    }

    pub fn enqueue_attached(item: Rc<dyn LifecycleCallbacks>, flags: LifecycleFlags) {
        QUEUES.with(|q| q.borrow_mut().attached.push_back((item, flags)));
    }

    /// Closes an attach frame. At the outermost frame all queued mounts run
    /// first, then the `attached` callbacks.
    pub fn end_attach() {
        if !Self::close(|q| &mut q.mount) {
            return;
        }
        loop {
            if let Some((item, flags)) = QUEUES.with(|q| q.borrow_mut().mount.items.pop_front()) {
                item.mount(flags);
                continue;
            }
            match QUEUES.with(|q| q.borrow_mut().attached.pop_front()) {
                Some((item, flags)) => item.attached(flags),
                None => break,
            }
        }
        QUEUES.with(|q| q.borrow_mut().mount.draining = false);
    }

    pub fn begin_detach() {
        QUEUES.with(|q| q.borrow_mut().unmount.depth += 1);
    }

    pub fn enqueue_unmount(item: Rc<dyn Mountable>, flags: LifecycleFlags) {
        QUEUES.with(|q| q.borrow_mut().unmount.items.push_back((item, flags)));
    }

    pub fn enqueue_detached(item: Rc<dyn LifecycleCallbacks>, flags: LifecycleFlags) {
        QUEUES.with(|q| q.borrow_mut().detached.push_back((item, flags)));
    }

    /// Closes a detach frame. At the outermost frame all queued unmounts run
    /// first, then the `detached` callbacks.
    pub fn end_detach() {
        if !Self::close(|q| &mut q.unmount) {
            return;
        }
        loop {
            if let Some((item, flags)) = QUEUES.with(|q| q.borrow_mut().unmount.items.pop_front())
            {
                item.unmount(flags);
                continue;
            }
            match QUEUES.with(|q| q.borrow_mut().detached.pop_front()) {
                Some((item, flags)) => item.detached(flags),
                None => break,
            }
        }
        QUEUES.with(|q| q.borrow_mut().unmount.draining = false);
    }

    /// Decrements a frame; returns `true` when the caller should drain it.
    fn close<T: ?Sized>(frame: impl Fn(&mut Queues) -> &mut Frame<T>) -> bool {
        QUEUES.with(|q| {
            let mut q = q.borrow_mut();
            let f = frame(&mut *q);
            if f.depth == 0 {
                log::warn!("lifecycle frame closed without a matching begin");
                return false;
            }
            f.depth -= 1;
            if f.depth > 0 || f.draining {
                return false;
            }
            f.draining = true;
            true
        })
    }
}
