#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::{Rc, Weak};

    use trellis_core::*;

    use crate::binding::*;
    use crate::coordinator::*;
    use crate::custom_attribute::*;
    use crate::custom_element::*;
    use crate::resources::compose::*;
    use crate::resources::if_else::*;
    use crate::resources::repeat::*;
    use crate::signaler::*;
    use crate::template::*;
    use crate::view::*;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Host {
        changes: Rc<ChangeSet>,
        ctx: RenderContext,
        root: NodeId,
        location: NodeId,
    }

    fn host() -> Host {
        init_logging();
        let changes = ChangeSet::new();
        let ctx = RenderContext::new(Dom::new(), changes.clone());
        let root = ctx.dom.create_element("div");
        let location = ctx.dom.create_render_location();
        ctx.dom.append_child(root, location).unwrap();
        Host {
            changes,
            ctx,
            root,
            location,
        }
    }

    fn text(name: &str, content: &str) -> Rc<TemplateDefinition> {
        TemplateDefinition::new(name)
            .node(NodeSpec::text(content))
            .build()
    }

    fn show(host: &Host, definition: Rc<TemplateDefinition>, scope: &Scope) -> ViewRef {
        let factory = ViewFactory::from_definition(&host.ctx, definition);
        let view = factory.create().unwrap();
        view.hold(host.location).unwrap();
        view.bind(LifecycleFlags::empty(), scope);
        view.attach(Some(host.root), LifecycleFlags::empty());
        view
    }

    #[test]
    fn if_switches_to_else_on_flush() {
        let host = host();
        let if_factory = ViewFactory::from_definition(&host.ctx, text("then", "a"));
        let else_factory = ViewFactory::from_definition(&host.ctx, text("otherwise", "b"));
        let attribute = If::create(&host.ctx, if_factory, host.location);
        Else::new(else_factory).link(attribute.behavior());

        attribute.set_property("value", Value::from(true), LifecycleFlags::empty());
        attribute.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        attribute.attach(Some(host.root), LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.text_content(host.root), "a");
        let if_view = attribute.behavior().coordinator().current_view().unwrap();

        attribute.set_property("value", Value::from(false), LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.text_content(host.root), "a");
        host.changes.flush_changes();
        assert_eq!(host.ctx.dom.text_content(host.root), "b");
        assert!(!if_view.state().is_attached());
        assert!(!if_view.state().is_bound());

        attribute.set_property(
            "value",
            Value::from(true),
            LifecycleFlags::FROM_FLUSH_CHANGES,
        );
        assert_eq!(host.ctx.dom.text_content(host.root), "a");
        let current = attribute.behavior().coordinator().current_view().unwrap();
        assert!(Rc::ptr_eq(&current, &if_view));
    }

    #[test]
    fn if_controller_renders_from_template() {
        let host = host();
        let definition = TemplateDefinition::new("page")
            .node(NodeSpec::Controller(Controller::If {
                value: Expression::scope("show"),
                template: text("then", "yes"),
                else_template: Some(text("otherwise", "no")),
            }))
            .build();

        let scope = Scope::create(BindingContext::new().with("show", false));
        let view = show(&host, definition, &scope);
        assert_eq!(host.ctx.dom.text_content(host.root), "no");

        view.detach(LifecycleFlags::empty());
        view.unbind(LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.text_content(host.root), "");
    }

    #[test]
    fn repeat_removal_keeps_leading_views() {
        let host = host();
        let definition = TemplateDefinition::new("list")
            .node(NodeSpec::Controller(Controller::Repeat {
                local: "item".into(),
                items: Expression::scope("items"),
                template: TemplateDefinition::new("row")
                    .node(NodeSpec::interpolation(Interpolation::of(Expression::scope(
                        "item",
                    ))))
                    .build(),
            }))
            .build();

        let items = ObservedArray::from_values([1, 2, 3]);
        let scope = Scope::create(BindingContext::new().with("items", items.clone()));
        let _view = show(&host, definition, &scope);
        assert_eq!(host.ctx.dom.text_content(host.root), "123");
        let first = host.ctx.dom.children(host.root)[0];

        items.remove(1);
        assert_eq!(host.ctx.dom.text_content(host.root), "123");
        host.changes.flush_changes();

        assert_eq!(host.ctx.dom.text_content(host.root), "13");
        assert_eq!(host.ctx.dom.children(host.root)[0], first);
    }

    #[test]
    fn repeat_tracks_splice_length() {
        let host = host();
        let factory = ViewFactory::from_definition(
            &host.ctx,
            TemplateDefinition::new("row")
                .node(NodeSpec::interpolation(Interpolation::of(Expression::scope("n"))))
                .build(),
        );
        let repeat = Repeat::create(&host.ctx, factory, host.location, "n");
        let items = ObservedArray::from_values([1, 2, 3, 4, 5]);
        repeat.set_property("items", Value::from(items.clone()), LifecycleFlags::empty());
        repeat.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        repeat.attach(Some(host.root), LifecycleFlags::empty());

        items.splice(1, 2, [Value::from(9)]);
        host.changes.flush_changes();

        assert_eq!(repeat.behavior().views().len(), items.len());
        assert_eq!(host.ctx.dom.text_content(host.root), "1945");
    }

    #[test]
    fn factory_pool_is_bounded() {
        let host = host();
        let definition = TemplateDefinition::new("pooled")
            .node(NodeSpec::text("p"))
            .cache(CacheSize::Fixed(2))
            .build();
        let factory = ViewFactory::from_definition(&host.ctx, definition);

        let views: Vec<ViewRef> = (0..3).map(|_| factory.create().unwrap()).collect();
        let returned: Vec<bool> = views.iter().map(|view| view.release()).collect();
        assert_eq!(returned, [true, true, false]);
        assert_eq!(factory.cached_count(), 2);

        let reused = factory.create().unwrap();
        assert!(views.iter().any(|view| Rc::ptr_eq(view, &reused)));
        assert!(!reused.state().is_cached());
        assert_eq!(factory.cached_count(), 1);
    }

    #[test]
    fn empty_template_cannot_make_views() {
        let host = host();
        let factory = ViewFactory::from_definition(&host.ctx, TemplateDefinition::new("nothing").build());
        assert_eq!(
            factory.create().map(|_| ()),
            Err(Error::EmptyRender("nothing".into()))
        );
    }

    #[test]
    fn only_latest_pending_composition_applies() {
        let host = host();
        let factory = ViewFactory::from_definition(&host.ctx, text("slide", "x"));
        let coordinator = CompositionCoordinator::new();
        let swaps = Rc::new(Cell::new(0));
        let counter = swaps.clone();
        coordinator.on_swap_complete(move || counter.set(counter.get() + 1));

        coordinator.binding(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        coordinator.attaching(Some(host.root), LifecycleFlags::empty());

        let pending: Vec<Deferred<Option<ViewRef>>> = (0..3).map(|_| Deferred::new()).collect();
        for request in &pending {
            coordinator.compose(request.clone());
        }
        let views: Vec<ViewRef> = (0..3)
            .map(|_| {
                let view = factory.create().unwrap();
                view.hold(host.location).unwrap();
                view
            })
            .collect();
        for (request, view) in pending.iter().zip(&views) {
            request.resolve(Some(view.clone()));
        }

        assert_eq!(swaps.get(), 1);
        let current = coordinator.current_view().unwrap();
        assert!(Rc::ptr_eq(&current, &views[2]));
        assert!(views[2].state().is_attached());
        assert!(!views[0].state().is_bound());
        assert_eq!(host.ctx.dom.text_content(host.root), "x");
    }

    #[test]
    fn unbinding_cancels_pending_composition() {
        let host = host();
        let factory = ViewFactory::from_definition(&host.ctx, text("late", "late"));
        let coordinator = CompositionCoordinator::new();
        coordinator.binding(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));

        let request: Deferred<Option<ViewRef>> = Deferred::new();
        coordinator.compose(request.clone());
        coordinator.unbinding(LifecycleFlags::empty());
        request.resolve(Some(factory.create().unwrap()));

        assert!(coordinator.current_view().is_none());
    }

    #[test]
    fn reattach_restores_adjacency() {
        let host = host();
        let definition = TemplateDefinition::new("pair")
            .node(NodeSpec::element("b").child(NodeSpec::text("1")))
            .node(NodeSpec::text("2"))
            .build();
        let view = show(&host, definition, &Scope::create(BindingContext::new()));
        assert_eq!(host.ctx.dom.inner_html(host.root), "<b>1</b>2<!--au-loc-->");

        view.detach(LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.inner_html(host.root), "<!--au-loc-->");
        assert!(view.state().needs_mount());

        view.attach(Some(host.root), LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.inner_html(host.root), "<b>1</b>2<!--au-loc-->");
    }

    #[test]
    fn view_bind_is_idempotent_per_scope() {
        let host = host();
        let definition = TemplateDefinition::new("label")
            .node(NodeSpec::interpolation(Interpolation::of(Expression::scope("label"))))
            .build();
        let context = BindingContext::new().with("label", "one");
        let scope = Scope::create(context.clone());
        let view = show(&host, definition, &scope);

        context.set("label", "two");
        view.bind(LifecycleFlags::empty(), &scope);
        assert_eq!(host.ctx.dom.text_content(host.root), "one");

        view.bind(LifecycleFlags::empty(), &Scope::create(context.clone()));
        assert_eq!(host.ctx.dom.text_content(host.root), "two");

        view.detach(LifecycleFlags::empty());
        view.detach(LifecycleFlags::empty());
        view.unbind(LifecycleFlags::empty());
        view.unbind(LifecycleFlags::empty());
        assert_eq!(view.state() & !LifecycleState::NEEDS_MOUNT, LifecycleState::NONE);
    }

    #[test]
    fn listener_sees_event_and_prevents_default() {
        let host = host();
        let seen = Rc::new(RefCell::new(String::new()));
        let record = seen.clone();
        let handler = Function::new(move |scope| {
            let event = Expression::member(Expression::scope("$event"), "type").evaluate(scope);
            *record.borrow_mut() = event.to_string();
            Value::Bool(false)
        });
        let definition = TemplateDefinition::new("clicker")
            .node(
                NodeSpec::element("button")
                    .instruction(Instruction::Listener {
                        event: "click".into(),
                        expression: Expression::call("onClick"),
                        prevent_default: true,
                    })
                    .instruction(Instruction::Ref {
                        name: "button".into(),
                    }),
            )
            .build();
        let context = BindingContext::new().with("onClick", handler);
        let view = show(&host, definition, &Scope::create(context.clone()));

        let Some(Value::Node(button)) = context.get("button") else {
            panic!("ref was not assigned");
        };
        let event = Event::new("click", button, Value::Null);
        assert!(!host.ctx.dom.dispatch(&event));
        assert_eq!(*seen.borrow(), "click");

        view.unbind(LifecycleFlags::empty());
        assert!(matches!(context.get("button"), Some(Value::Null)));
        assert!(host.ctx.dom.dispatch(&Event::new("click", button, Value::Null)));
    }

    #[test]
    fn property_instruction_writes_attributes() {
        let host = host();
        let definition = TemplateDefinition::new("link")
            .node(NodeSpec::element("a").instruction(Instruction::Property {
                property: "href".into(),
                expression: Expression::scope("url"),
            }))
            .build();
        let scope = Scope::create(BindingContext::new().with("url", "/home"));
        let _view = show(&host, definition, &scope);
        assert_eq!(
            host.ctx.dom.inner_html(host.root),
            "<a href=\"/home\"></a><!--au-loc-->"
        );
    }

    #[test]
    fn containerless_shadow_element_fails_to_render() {
        let host = host();
        let broken = ElementType::html_only(
            TemplateDefinition::new("bad-el")
                .node(NodeSpec::text("x"))
                .containerless()
                .shadow()
                .build(),
        )
        .unwrap();
        let definition = TemplateDefinition::new("page")
            .node(NodeSpec::element("bad-el").instruction(Instruction::Element(
                HydrateElement {
                    component: broken,
                    properties: Vec::new(),
                },
            )))
            .build();
        let factory = ViewFactory::from_definition(&host.ctx, definition);
        assert!(matches!(
            factory.create(),
            Err(Error::ContainerlessShadow(name)) if name == "bad-el"
        ));
    }

    #[test]
    fn compose_renders_view_subject_with_owner_scope() {
        let host = host();
        let inner = ViewFactory::from_definition(
            &host.ctx,
            TemplateDefinition::new("card")
                .node(NodeSpec::interpolation(Interpolation::of(Expression::scope("name"))))
                .build(),
        )
        .create()
        .unwrap();

        let definition = TemplateDefinition::new("page")
            .node(NodeSpec::element(COMPOSE_NAME).instruction(Instruction::Element(
                HydrateElement {
                    component: Compose::element_type().unwrap(),
                    properties: vec![("subject".into(), Expression::scope("subject"))],
                },
            )))
            .build();
        let context = BindingContext::new()
            .with("name", "composed")
            .with("subject", Subject::View(inner.clone()));
        let view = show(&host, definition, &Scope::create(context));

        assert_eq!(
            host.ctx.dom.inner_html(host.root),
            "composed<!--au-loc--><!--au-loc-->"
        );
        assert!(inner.is_locked());
        assert!(inner.state().is_attached());

        view.detach(LifecycleFlags::empty());
        view.unbind(LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.text_content(host.root), "");
        assert!(!inner.state().is_bound());
    }

    #[test]
    fn compose_resolves_pending_template_subject() {
        let host = host();
        let definition = TemplateDefinition::new("page")
            .node(NodeSpec::element(COMPOSE_NAME).instruction(Instruction::Element(
                HydrateElement {
                    component: Compose::element_type().unwrap(),
                    properties: vec![("subject".into(), Expression::scope("subject"))],
                },
            )))
            .build();
        let pending: Deferred<Option<Subject>> = Deferred::new();
        let context =
            BindingContext::new().with("subject", Subject::Pending(pending.clone()));
        let _view = show(&host, definition, &Scope::create(context));
        assert_eq!(host.ctx.dom.text_content(host.root), "");

        pending.resolve(Some(Subject::Template(text("later", "ready"))));
        assert_eq!(host.ctx.dom.text_content(host.root), "ready");
    }

    struct Toggle {
        on: Cell<bool>,
    }

    impl AttributeBehavior for Toggle {
        const NAME: &'static str = "toggle";
        const HOOKS: Hooks = Hooks::CACHING;

        fn caching(&self, _owner: &CustomAttribute<Self>) {
            self.on.set(false);
        }
    }

    #[test]
    fn pooled_views_run_caching_hooks() {
        let host = host();
        let attribute = CustomAttribute::new(Toggle { on: Cell::new(true) });
        let factory = ViewFactory::from_definition(
            &host.ctx,
            TemplateDefinition::new("cached")
                .node(NodeSpec::text("c"))
                .cache(CacheSize::Unbounded)
                .build(),
        );
        let view = factory.create().unwrap();
        view.add_attachable(attribute.clone());

        view.hold(host.location).unwrap();
        view.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        view.attach(Some(host.root), LifecycleFlags::empty());
        assert!(view.release());
        assert!(attribute.behavior().on.get());

        view.detach(LifecycleFlags::empty());
        assert!(!attribute.behavior().on.get());
        assert!(view.state().is_cached());
        assert_eq!(factory.cached_count(), 1);
    }

    fn row(local: &str) -> Rc<TemplateDefinition> {
        TemplateDefinition::new("row")
            .node(NodeSpec::interpolation(Interpolation::of(Expression::scope(local))))
            .build()
    }

    #[test]
    fn repeat_over_set_keeps_unchanged_views() {
        let host = host();
        let factory = ViewFactory::from_definition(&host.ctx, row("n"));
        let repeat = Repeat::create(&host.ctx, factory, host.location, "n");
        let items = ObservedSet::new();
        for n in [1, 2, 3] {
            items.add(n);
        }
        repeat.set_property("items", Value::from(items.clone()), LifecycleFlags::empty());
        repeat.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        repeat.attach(Some(host.root), LifecycleFlags::empty());
        let first = repeat.behavior().views()[0].clone();

        items.delete(&Value::from(2));
        host.changes.flush_changes();

        assert_eq!(host.ctx.dom.text_content(host.root), "13");
        assert!(Rc::ptr_eq(&repeat.behavior().views()[0], &first));
    }

    #[test]
    fn repeat_over_map_yields_entries() {
        let host = host();
        let factory = ViewFactory::from_definition(&host.ctx, row("entry"));
        let repeat = Repeat::create(&host.ctx, factory, host.location, "entry");
        let items = ObservedMap::new();
        items.set("a", 1);
        items.set("b", 2);
        items.set("c", 3);
        repeat.set_property("items", Value::from(items.clone()), LifecycleFlags::empty());
        repeat.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        repeat.attach(Some(host.root), LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.text_content(host.root), "a,1b,2c,3");
        let first = repeat.behavior().views()[0].clone();

        items.delete(&Value::from("b"));
        items.set("a", 9);
        host.changes.flush_changes();

        assert_eq!(host.ctx.dom.text_content(host.root), "a,9c,3");
        assert_eq!(repeat.behavior().views().len(), 2);
        assert!(Rc::ptr_eq(&repeat.behavior().views()[0], &first));
    }

    #[test]
    fn discarded_repeat_views_free_their_nodes() {
        let host = host();
        let factory = ViewFactory::from_definition(&host.ctx, row("n"));
        let repeat = Repeat::create(&host.ctx, factory, host.location, "n");
        repeat.set_property("items", Value::from(5), LifecycleFlags::empty());
        repeat.bind(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        repeat.attach(Some(host.root), LifecycleFlags::empty());
        let first_round: Vec<NodeId> = repeat
            .behavior()
            .views()
            .iter()
            .flat_map(|view| view.nodes().nodes().to_vec())
            .collect();
        assert_eq!(first_round.len(), 5);

        repeat.set_property("items", Value::from(0), LifecycleFlags::empty());
        let settled = host.ctx.dom.node_count();
        assert!(first_round.iter().all(|&node| !host.ctx.dom.contains(node)));

        for _ in 0..50 {
            repeat.set_property("items", Value::from(5), LifecycleFlags::empty());
            repeat.set_property("items", Value::from(0), LifecycleFlags::empty());
        }
        assert_eq!(host.ctx.dom.node_count(), settled);
        assert_eq!(host.ctx.dom.inner_html(host.root), "<!--au-loc-->");
    }

    struct ComposeOnBind {
        coordinator: Weak<CompositionCoordinator>,
        next: RefCell<Option<ViewRef>>,
        state: StateCell,
    }

    impl Bindable for ComposeOnBind {
        fn bind(&self, _flags: LifecycleFlags, _scope: &Scope) {
            self.state.insert(LifecycleState::IS_BOUND);
            let next = self.next.borrow_mut().take();
            if let (Some(coordinator), Some(next)) = (self.coordinator.upgrade(), next) {
                coordinator.compose(next);
            }
        }

        fn unbind(&self, _flags: LifecycleFlags) {
            self.state.remove(LifecycleState::IS_BOUND);
        }

        fn state(&self) -> LifecycleState {
            self.state.get()
        }
    }

    #[test]
    fn compose_during_swap_applies_latest_once() {
        let host = host();
        let coordinator = CompositionCoordinator::new();
        let swaps = Rc::new(Cell::new(0));
        let counter = swaps.clone();
        coordinator.on_swap_complete(move || counter.set(counter.get() + 1));
        coordinator.binding(LifecycleFlags::empty(), &Scope::create(BindingContext::new()));
        coordinator.attaching(Some(host.root), LifecycleFlags::empty());

        let a = ViewFactory::from_definition(&host.ctx, text("a", "a")).create().unwrap();
        let b = ViewFactory::from_definition(&host.ctx, text("b", "b")).create().unwrap();
        a.hold(host.location).unwrap();
        b.hold(host.location).unwrap();
        a.add_bindable(Rc::new(ComposeOnBind {
            coordinator: Rc::downgrade(&coordinator),
            next: RefCell::new(Some(b.clone())),
            state: StateCell::default(),
        }));

        coordinator.compose(a.clone());

        assert_eq!(swaps.get(), 1);
        assert!(!coordinator.is_swapping());
        let current = coordinator.current_view().unwrap();
        assert!(Rc::ptr_eq(&current, &b));
        assert!(!a.state().is_bound());
        assert!(!a.state().is_attached());
        assert_eq!(host.ctx.dom.text_content(host.root), "b");
    }

    #[test]
    fn signaled_attribute_refreshes_on_dispatch() {
        let host = host();
        let definition = TemplateDefinition::new("clock")
            .node(NodeSpec::element("time").instruction(Instruction::SignaledProperty {
                property: "datetime".into(),
                expression: Expression::scope("now"),
                signals: vec!["tick".into()],
            }))
            .build();
        let context = BindingContext::new().with("now", "09:00");
        let view = show(&host, definition, &Scope::create(context.clone()));
        let time = host.ctx.dom.children(host.root)[0];

        context.set("now", "09:01");
        assert_eq!(host.ctx.dom.attribute(time, "datetime").as_deref(), Some("09:00"));
        host.ctx.signaler.dispatch_signal("tick", LifecycleFlags::empty());
        assert_eq!(host.ctx.dom.attribute(time, "datetime").as_deref(), Some("09:01"));

        view.unbind(LifecycleFlags::empty());
        assert_eq!(host.ctx.signaler.listener_count("tick"), 0);
    }

    #[test]
    fn let_element_declares_values_and_leaves_no_node() {
        let host = host();
        let definition = TemplateDefinition::new("greeting")
            .node(NodeSpec::element("let").instruction(Instruction::Let {
                bindings: vec![("who".into(), Expression::scope("user"))],
                to_binding_context: false,
            }))
            .node(NodeSpec::interpolation(
                Interpolation::new().text("hi ").expr(Expression::scope("who")),
            ))
            .build();
        let context = BindingContext::new().with("user", "ada");
        let scope = Scope::create(context.clone());
        let _view = show(&host, definition, &scope);

        assert_eq!(host.ctx.dom.inner_html(host.root), "hi ada<!--au-loc-->");
        assert!(scope.override_value("who").is_some());
        assert!(!context.has("who"));
    }
}
