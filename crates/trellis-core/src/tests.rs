#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    use crate::change_set::*;
    use crate::collection::*;
    use crate::deferred::*;
    use crate::dom::*;
    use crate::lifecycle::*;
    use crate::links::*;
    use crate::scope::*;
    use crate::value::*;

    struct Hooked {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl LifecycleCallbacks for Hooked {
        fn bound(&self, _flags: LifecycleFlags) {
            self.log.borrow_mut().push(format!("bound {}", self.name));
        }
        fn unbound(&self, _flags: LifecycleFlags) {
            self.log.borrow_mut().push(format!("unbound {}", self.name));
        }
        fn detached(&self, _flags: LifecycleFlags) {
            self.log.borrow_mut().push(format!("detached {}", self.name));
        }
    }

    impl Mountable for Hooked {
        fn mount(&self, _flags: LifecycleFlags) {}
        fn unmount(&self, _flags: LifecycleFlags) -> bool {
            self.log.borrow_mut().push(format!("unmount {}", self.name));
            false
        }
    }

    fn hooked(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Rc<Hooked> {
        Rc::new(Hooked {
            name,
            log: log.clone(),
        })
    }

    #[test]
    fn test_bound_callbacks_wait_for_outermost_bind() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let parent = hooked("parent", &log);
        let child = hooked("child", &log);

        Lifecycle::begin_bind();
        Lifecycle::begin_bind();
        Lifecycle::enqueue_bound(child, LifecycleFlags::FROM_BIND);
        Lifecycle::end_bind();
        Lifecycle::enqueue_bound(parent, LifecycleFlags::FROM_BIND);
        assert!(log.borrow().is_empty());
        Lifecycle::end_bind();

        assert_eq!(*log.borrow(), ["bound child", "bound parent"]);
    }

    #[test]
    fn test_unmounts_precede_detached_callbacks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let view = hooked("view", &log);

        Lifecycle::begin_detach();
        Lifecycle::enqueue_detached(view.clone(), LifecycleFlags::FROM_DETACH);
        Lifecycle::enqueue_unmount(view, LifecycleFlags::FROM_DETACH);
        Lifecycle::end_detach();

        assert_eq!(*log.borrow(), ["unmount view", "detached view"]);
    }

    #[test]
    fn test_unmatched_end_is_ignored() {
        Lifecycle::end_unbind();
        let log = Rc::new(RefCell::new(Vec::new()));
        Lifecycle::begin_unbind();
        Lifecycle::enqueue_unbound(hooked("x", &log), LifecycleFlags::FROM_UNBIND);
        Lifecycle::end_unbind();
        assert_eq!(*log.borrow(), ["unbound x"]);
    }

    #[test]
    fn test_child_list_reverse_is_lifo() {
        let mut list = ChildList::new();
        for name in ["first", "second", "third"] {
            list.push_back(name);
        }
        let released: Vec<_> = list.snapshot_rev().into_iter().collect();
        assert_eq!(released, ["third", "second", "first"]);
    }

    struct Subscriber(RefCell<Vec<Vec<isize>>>);

    impl BatchedCollectionSubscriber for Subscriber {
        fn handle_batched_change(&self, index_map: &[isize]) {
            self.0.borrow_mut().push(index_map.to_vec());
        }
    }

    #[test]
    fn test_unsubscribed_observer_stays_silent() {
        let changes = ChangeSet::new();
        let queue: Rc<dyn ChangeQueue> = changes.clone();
        let items = ObservedArray::from_values(["a"]);
        let observer = Collection::from(items.clone()).observer(&queue);

        let sub = Rc::new(Subscriber(RefCell::new(Vec::new())));
        let as_dyn: Rc<dyn BatchedCollectionSubscriber> = sub.clone();
        let weak: Weak<dyn BatchedCollectionSubscriber> = Rc::downgrade(&as_dyn);
        observer.subscribe(weak.clone());
        observer.subscribe(weak.clone());
        assert_eq!(observer.subscriber_count(), 1);

        items.push("b");
        changes.flush_changes();
        assert_eq!(sub.0.borrow().len(), 1);

        observer.unsubscribe(&weak);
        items.push("c");
        changes.flush_changes();
        assert_eq!(sub.0.borrow().len(), 1);
    }

    #[test]
    fn test_observer_is_shared_per_collection() {
        let changes = ChangeSet::new();
        let queue: Rc<dyn ChangeQueue> = changes.clone();
        let items = ObservedArray::new();
        let a = Collection::from(items.clone()).observer(&queue);
        let b = Collection::from(items.clone()).observer(&queue);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Collection::from(items.clone()).ptr_eq(&Collection::from(items)));
    }

    #[test]
    fn test_map_iterates_entries_in_insertion_order() {
        let map = ObservedMap::new();
        map.set("x", 1);
        map.set("y", 2);
        map.set("x", 3);
        let mut seen = Vec::new();
        iterate(&Value::from(map), |item, _| seen.push(item.to_string()));
        assert_eq!(seen, ["x,3", "y,2"]);
    }

    #[test]
    fn test_event_override_is_scoped() {
        let ctx = BindingContext::new();
        let scope = Scope::create(ctx.clone());
        let handler = Function::new(|scope| scope.get("$event"));
        ctx.set("onClick", handler.clone());

        let seen = scope.with_override("$event", Value::from("evt"), || handler.call(&scope));
        assert!(seen.same(&Value::from("evt")));
        assert!(matches!(scope.get("$event"), Value::Undefined));
    }

    #[test]
    fn test_deferred_resolution_after_drop_of_listener() {
        let d: Deferred<Value> = Deferred::new();
        let hit = Rc::new(RefCell::new(None));
        {
            let hit = hit.clone();
            d.then(move |r| *hit.borrow_mut() = r.ok());
        }
        d.resolve(Value::from(1));
        assert!(hit.borrow().as_ref().is_some_and(|v| v.same(&Value::from(1))));
    }

    #[test]
    fn test_render_location_conversion() {
        let dom = Dom::new();
        let parent = dom.create_element("div");
        let host = dom.create_element("compose");
        dom.append_child(parent, host).unwrap();
        let location = dom.convert_to_render_location(host).unwrap();
        assert_eq!(dom.parent(location), Some(parent));
        assert_eq!(dom.parent(host), None);
        assert_eq!(dom.outer_html(parent), "<div><!--au-loc--></div>");
    }
}
