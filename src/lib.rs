//! An embeddable HTTP/1.1 and HTTP/2 server built around a declarative route tree.
//!
//! Routes are declared by attaching [Declaration]s to [RouteNode]s. Every declaration states
//! the methods, query items, headers and body it accepts; when more than one could answer a
//! request, overload resolution picks the most specific one or reports the request as
//! ambiguous. Conditional requests (`If-Match`, `If-None-Match`, `If-Modified-Since`,
//! `If-Unmodified-Since`) are evaluated against the validators of the selected response.
//!
//! ```no_run
//! use arbor::prelude::*;
//! use hyper::StatusCode;
//!
//! let root = RouteNode::new()
//!     .respond(Declaration::new().content(|_| "Hello!"))
//!     .group(
//!         "greet",
//!         RouteNode::new().respond(
//!             Declaration::new()
//!                 .query(QuerySpec::new().required("name"))
//!                 .content(|input| format!("Hello, {}!", input.query().get("name").unwrap_or(""))),
//!         ),
//!     )
//!     .on_incident(|incident| match incident {
//!         Incident::NoResponse => Some("nothing here".with_status(StatusCode::NOT_FOUND)),
//!         _ => None,
//!     });
//!
//! App::new(root).run(&ServerConfig::default()).unwrap();
//! ```
//!
//! [Declaration]: declaration::Declaration
//! [RouteNode]: tree::RouteNode
use hyper::{Body, Request};
use std::{net::SocketAddr, sync::Arc};

pub mod body;
pub mod channel;
pub mod config;
pub mod declaration;
pub mod directory;
pub mod etag;
pub mod handler;
pub mod header;
pub mod incident;
pub mod matcher;
pub mod path;
pub mod precondition;
pub mod prelude;
pub mod processor;
pub mod query;
pub mod reply;
pub mod server;
pub mod tree;

use body::DEFAULT_BODY_LENGTH_LIMIT;
use channel::ChannelRegistry;
use tree::{RouteNode, RouteTree};

/// The http response type produced by an [App].
pub type Response = hyper::Response<Body>;

/// A type-erased error returned by handlers and body consumers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A frozen route tree with the settings needed to serve it.
#[derive(Clone, Debug)]
pub struct App {
    tree: Arc<RouteTree>,
    body_length_limit: u64,
    channels: Arc<ChannelRegistry>,
}

impl App {
    /// Freeze `root` into an immutable route tree.
    pub fn new(root: RouteNode) -> Self {
        Self {
            tree: Arc::new(RouteTree::new(root)),
            body_length_limit: DEFAULT_BODY_LENGTH_LIMIT,
            channels: Arc::new(ChannelRegistry::new()),
        }
    }

    /// Set the body limit of declarations that accept a body without declaring one.
    pub fn body_length_limit(mut self, limit: u64) -> Self {
        self.body_length_limit = limit;
        self
    }

    #[inline]
    pub fn tree(&self) -> &RouteTree {
        &self.tree
    }

    /// Returns the registry of connections accepted by [serve](App::serve).
    #[inline]
    pub fn channels(&self) -> Arc<ChannelRegistry> {
        self.channels.clone()
    }

    /// Process a request in process, without a network round trip.
    pub async fn dispatch(&self, req: Request<Body>, addr: SocketAddr) -> Response {
        processor::dispatch(self.tree.clone(), self.body_length_limit, req, addr).await
    }

    /// Returns a [test client][test::Client] dispatching to this app.
    pub fn test_client(self) -> test::Client {
        test::Client { app: self }
    }
}
