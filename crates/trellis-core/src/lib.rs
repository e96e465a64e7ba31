//! # Lifecycle, Scopes, and Observed Collections
//!
//! `trellis-core` holds the pieces every part of the rendering graph shares:
//!
//! - [`LifecycleState`] / [`LifecycleFlags`]: the bitmask state machine each
//!   bindable/attachable entity moves through, plus the deferral queues in
//!   [`Lifecycle`].
//! - [`ChildList`]: arena-backed doubly-linked lists of children, traversed
//!   forward for bind/attach and in reverse for unbind/detach.
//! - [`Dom`] / [`NodeSequence`]: a small node tree and the relocatable node
//!   runs views are made of.
//! - [`Scope`] / [`BindingContext`]: what expressions evaluate against.
//! - [`ObservedArray`], [`ObservedSet`], [`ObservedMap`]: collections that
//!   report batched index maps through a [`ChangeSet`].
//!
//! ## Scopes
//!
//! ```rust
//! use trellis_core::*;
//!
//! let root = Scope::create(BindingContext::new().with("name", "trellis"));
//! let child = Scope::from_parent(&root, BindingContext::new());
//! child.set_override("$index", 0);
//!
//! assert_eq!(child.get("name").to_string(), "trellis");
//! assert_eq!(child.get("$index").to_string(), "0");
//! ```
//!
//! ## Batched collection changes
//!
//! Mutations are recorded into the observer's index map and delivered to
//! subscribers when the change set flushes:
//!
//! ```rust
//! use std::rc::Rc;
//! use trellis_core::*;
//!
//! let changes = ChangeSet::new();
//! let queue: Rc<dyn ChangeQueue> = changes.clone();
//!
//! let items = ObservedArray::from_values([1, 2, 3]);
//! let observer = Collection::from(items.clone()).observer(&queue);
//!
//! items.remove(1);
//! assert_eq!(observer.index_map(), [0, 2]);
//!
//! changes.flush_changes();
//! assert_eq!(observer.index_map(), [0, 1]);
//! ```

pub mod change_set;
pub mod collection;
pub mod deferred;
pub mod dom;
pub mod error;
pub mod lifecycle;
pub mod links;
pub mod scope;
pub mod tests;
pub mod value;

pub use change_set::*;
pub use collection::*;
pub use deferred::*;
pub use dom::*;
pub use error::{Error, Result};
pub use lifecycle::*;
pub use links::*;
pub use scope::*;
pub use value::*;
