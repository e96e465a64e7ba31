//! Built-in template controllers and elements.

pub mod compose;
pub mod if_else;
pub mod repeat;
