//! A prelude designed to be bulk imported for ease of use.
//!
//! ```
//! # #[allow(unused_imports)]
//! use arbor::prelude::*;
//! ```

#[doc(inline)]
pub use super::{
    body::{BodyDescriptor, BodyValue},
    config::ServerConfig,
    declaration::Declaration,
    directory::Directory,
    etag::EntityTag,
    handler::{Completion, Input},
    header::HeaderMatcher,
    incident::Incident,
    matcher::Filter,
    precondition::Validator,
    query::{QueryMatcher, QuerySpec},
    reply::{self, Reply, ResponseContent},
    tree::RouteNode,
    App,
};
