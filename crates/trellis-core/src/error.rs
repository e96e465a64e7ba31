use crate::dom::NodeId;

/// Structural misuse reported by the rendering core.
///
/// Redundant lifecycle calls (binding twice with the same scope, detaching
/// something that is not attached, ...) are no-ops and never produce one of
/// these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("render location {0:?} has no parent node")]
    LocationWithoutParent(NodeId),

    #[error("node {0:?} is not part of the tree")]
    UnknownNode(NodeId),

    #[error("template `{0}` rendered an empty node sequence")]
    EmptyRender(String),

    #[error("containerless element `{0}` was attached without an encapsulation source")]
    MissingEncapsulationSource(String),

    #[error("element `{0}` cannot be containerless and shadow-projected at the same time")]
    ContainerlessShadow(String),

    #[error("element definitions require a name")]
    MissingName,

    #[error("a signal binding needs at least one signal name")]
    MissingSignalName,

    #[error("invalid cache size `{0}`; expected `*` or a non-negative integer")]
    InvalidCacheSize(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
