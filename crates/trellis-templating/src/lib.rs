//! # Views, Elements and Template Controllers
//!
//! `trellis-templating` builds the rendering graph on top of `trellis-core`:
//!
//! - [`TemplateDefinition`] / [`CompiledTemplate`]: pre-compiled templates
//!   rendered into node sequences plus bindings.
//! - [`View`] / [`ViewFactory`]: relocatable views and their bounded pools.
//! - [`CustomElement`] / [`CustomAttribute`]: lifecycle drivers for
//!   user-defined elements and attributes.
//! - [`CompositionCoordinator`]: serialized view swapping.
//! - [`Signaler`]: named signals that re-evaluate subscribed bindings.
//! - Built-in resources: `if`/`else`, `repeat` and `au-compose`.
//!
//! ## Rendering a view
//!
//! ```rust
//! use trellis_core::*;
//! use trellis_templating::*;
//!
//! let context = RenderContext::new(Dom::new(), ChangeSet::new());
//! let root = context.dom.create_element("div");
//! let location = context.dom.create_render_location();
//! context.dom.append_child(root, location).unwrap();
//!
//! let definition = TemplateDefinition::new("greeting")
//!     .node(NodeSpec::interpolation(
//!         Interpolation::new().text("hello ").expr(Expression::scope("name")),
//!     ))
//!     .build();
//! let factory = ViewFactory::from_definition(&context, definition);
//!
//! let view = factory.create().unwrap();
//! view.hold(location).unwrap();
//! view.bind(
//!     LifecycleFlags::empty(),
//!     &Scope::create(BindingContext::new().with("name", "world")),
//! );
//! view.attach(Some(root), LifecycleFlags::empty());
//!
//! assert_eq!(context.dom.text_content(root), "hello world");
//! ```

pub mod binding;
pub mod coordinator;
pub mod custom_attribute;
pub mod custom_element;
pub mod projector;
pub mod resources;
pub mod signaler;
pub mod template;
pub mod tests;
pub mod view;

pub use binding::*;
pub use coordinator::*;
pub use custom_attribute::*;
pub use custom_element::*;
pub use projector::*;
pub use resources::compose::{Compose, Subject, COMPOSE_NAME};
pub use resources::if_else::{Else, If};
pub use resources::repeat::Repeat;
pub use signaler::*;
pub use template::*;
pub use view::*;
