//! HTTP handlers, called from the dispatch functions in [`crate::server`].

pub mod assets;
pub mod keys;
