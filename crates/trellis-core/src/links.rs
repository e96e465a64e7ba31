//! Doubly-linked child lists.
//!
//! A parent owns the links; children are stored in an arena and addressed by
//! [`LinkKey`], so insertion and removal anywhere in the list are O(1).
//! Traversal order is head→tail for bind/attach and tail→head for
//! unbind/detach/cache.

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    pub struct LinkKey;
}

struct Link<T> {
    item: T,
    prev: Option<LinkKey>,
    next: Option<LinkKey>,
}

pub struct ChildList<T> {
    links: SlotMap<LinkKey, Link<T>>,
    head: Option<LinkKey>,
    tail: Option<LinkKey>,
}

impl<T> Default for ChildList<T> {
    fn default() -> Self {
        Self {
            links: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }
}

impl<T> ChildList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn head(&self) -> Option<LinkKey> {
        self.head
    }

    pub fn tail(&self) -> Option<LinkKey> {
        self.tail
    }

    pub fn get(&self, key: LinkKey) -> Option<&T> {
        self.links.get(key).map(|l| &l.item)
    }

    pub fn next(&self, key: LinkKey) -> Option<LinkKey> {
        self.links.get(key).and_then(|l| l.next)
    }

    pub fn prev(&self, key: LinkKey) -> Option<LinkKey> {
        self.links.get(key).and_then(|l| l.prev)
    }

    pub fn push_back(&mut self, item: T) -> LinkKey {
        let key = self.links.insert(Link {
            item,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.links[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        key
    }

    /// Inserts `item` directly before `before`. Returns `None` (and drops
    /// nothing) if `before` is not in the list.
    pub fn insert_before(&mut self, before: LinkKey, item: T) -> Option<LinkKey> {
        let prev = self.links.get(before)?.prev;
        let key = self.links.insert(Link {
            item,
            prev,
            next: Some(before),
        });
        self.links[before].prev = Some(key);
        match prev {
            Some(p) => self.links[p].next = Some(key),
            None => self.head = Some(key),
        }
        Some(key)
    }

    pub fn remove(&mut self, key: LinkKey) -> Option<T> {
        let link = self.links.remove(key)?;
        match link.prev {
            Some(p) => self.links[p].next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(n) => self.links[n].prev = link.prev,
            None => self.tail = link.prev,
        }
        Some(link.item)
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            forward: true,
        }
    }

    pub fn iter_rev(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.tail,
            forward: false,
        }
    }
}

impl<T: Clone> ChildList<T> {
    /// Copies the items head→tail so the list can be traversed without
    /// holding a borrow while children run their own lifecycle.
    pub fn snapshot(&self) -> SmallVec<[T; 8]> {
        self.iter().cloned().collect()
    }

    /// Copies the items tail→head.
    pub fn snapshot_rev(&self) -> SmallVec<[T; 8]> {
        self.iter_rev().cloned().collect()
    }
}

pub struct Iter<'a, T> {
    list: &'a ChildList<T>,
    cursor: Option<LinkKey>,
    forward: bool,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let link = self.list.links.get(key)?;
        self.cursor = if self.forward { link.next } else { link.prev };
        Some(&link.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_forward_and_reverse() {
        let mut list = ChildList::new();
        let a = list.push_back("a");
        list.push_back("c");
        let b = list.insert_before(list.tail().unwrap(), "b").unwrap();

        assert_eq!(list.iter().copied().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(list.iter_rev().copied().collect::<Vec<_>>(), ["c", "b", "a"]);

        assert_eq!(list.remove(b), Some("b"));
        assert_eq!(list.remove(a), Some("a"));
        assert_eq!(list.snapshot().as_slice(), ["c"]);
        assert_eq!(list.head(), list.tail());
    }

    #[test]
    fn insert_before_head_moves_head() {
        let mut list = ChildList::new();
        let first = list.push_back(1);
        list.insert_before(first, 0);
        assert_eq!(list.snapshot_rev().as_slice(), [1, 0]);
        assert_eq!(list.len(), 2);
    }
}
