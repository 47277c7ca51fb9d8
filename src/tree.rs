//! Route trees keyed by path segment.
//!
//! A [RouteNode] is built with ordinary method calls and frozen into a [RouteTree], which is
//! immutable and resolves request paths without locking.
//!
//! ```
//! use arbor::{declaration::Declaration, tree::{RouteNode, RouteTree}};
//! use http::Method;
//!
//! let root = RouteNode::new()
//!     .respond(Declaration::new().content(|_| "Hello!"))
//!     .group(
//!         "api/v1",
//!         RouteNode::new()
//!             .methods([Method::GET, Method::POST])
//!             .group("users", RouteNode::new().respond(Declaration::new().content(|_| "[]"))),
//!     );
//!
//! let tree = RouteTree::new(root);
//! let r = tree.resolve(&"/api/v1/users".into(), &Method::GET);
//! assert_eq!(r.candidates.len(), 1);
//!
//! let r = tree.resolve(&"/api/v2".into(), &Method::GET);
//! assert!(r.candidates.is_empty());
//! ```
use super::{
    declaration::{Declaration, MethodSet},
    incident::{Incident, IncidentChain, IncidentHandler},
    path::{Subpath, UrlPath},
    reply::ResponseContent,
};
use http::Method;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A node of a route tree under construction.
#[derive(Clone, Default)]
pub struct RouteNode {
    children: BTreeMap<String, RouteNode>,
    declarations: Vec<Arc<Declaration>>,
    methods: Option<MethodSet>,
    incident_handlers: Vec<IncidentHandler>,
}

impl RouteNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a declaration to this node.
    pub fn respond<D: Into<Declaration>>(mut self, declaration: D) -> Self {
        self.declarations.push(Arc::new(declaration.into()));
        self
    }

    /// Restrict the methods of every declaration at or below this node. Repeated calls
    /// intersect.
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        let set: MethodSet = methods.into_iter().collect();
        self.constrain_methods(&set);
        self
    }

    /// Handle incidents raised at or below this node, unless a nearer handler supplies
    /// content first.
    pub fn on_incident<F>(mut self, f: F) -> Self
    where
        F: Fn(&Incident) -> Option<ResponseContent> + Send + Sync + 'static,
    {
        self.incident_handlers.push(Arc::new(f));
        self
    }

    /// Mount `node` below `path`, which may span several segments. Mounting at a path that
    /// already has routes merges the two.
    pub fn group<P: Into<UrlPath>>(mut self, path: P, node: RouteNode) -> Self {
        let path = path.into();

        let mut target = &mut self;
        for segment in path.segments() {
            target = target.children.entry(segment.clone()).or_default();
        }
        target.merge(node);

        self
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty()
            && self.declarations.is_empty()
            && self.methods.is_none()
            && self.incident_handlers.is_empty()
    }

    fn constrain_methods(&mut self, set: &MethodSet) {
        self.methods = Some(match &self.methods {
            Some(own) => own.intersect(set),
            None => set.clone(),
        });
    }

    fn merge(&mut self, mut incoming: RouteNode) {
        if self.is_empty() {
            *self = incoming;
            return;
        }

        // the incoming node's own modifiers must not leak onto routes already here
        incoming.push_down();

        self.declarations.append(&mut incoming.declarations);
        for (segment, child) in incoming.children {
            self.children.entry(segment).or_default().merge(child);
        }
    }

    /// Move this node's method constraint and incident handlers into its declarations and
    /// children.
    fn push_down(&mut self) {
        let methods = self.methods.take();
        let handlers = std::mem::take(&mut self.incident_handlers);

        for decl in &mut self.declarations {
            let decl = Arc::make_mut(decl);
            if let Some(set) = &methods {
                decl.constrain_methods(set);
            }
            decl.incident_handlers.extend(handlers.iter().cloned());
        }

        for child in self.children.values_mut() {
            if let Some(set) = &methods {
                child.constrain_methods(set);
            }
            child.incident_handlers.extend(handlers.iter().cloned());
        }
    }
}

impl fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (f.debug_struct("RouteNode"))
            .field("children", &self.children)
            .field("declarations", &self.declarations.len())
            .field("methods", &self.methods)
            .field("incident_handlers", &self.incident_handlers.len())
            .finish()
    }
}

/// A declaration reachable for some request.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub declaration: Arc<Declaration>,
    /// The captured remainder of the request path, empty at an exact match.
    pub subpath: UrlPath,
    /// Incident handlers in effect if this candidate is selected, nearest first.
    pub incidents: IncidentChain,
    /// Incident handlers answering a miss reported by the selected handler.
    pub misses: IncidentChain,
}

/// The outcome of resolving a request path.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    /// Incident handlers of the deepest node reached, nearest first.
    pub incidents: IncidentChain,
}

#[derive(Copy, Clone)]
struct Level<'a> {
    node: &'a RouteNode,
    rest: Subpath<'a>,
    /// Every ancestor constraint so far admits the method.
    admitted: bool,
    /// Some ancestor declared a constraint.
    constrained: bool,
}

impl Level<'_> {
    fn permits(&self, decl: &Declaration, method: &Method) -> bool {
        if !self.admitted {
            return false;
        }
        match &decl.methods {
            Some(set) => set.contains(method),
            None if self.constrained => true,
            None => MethodSet::safe().contains(method),
        }
    }
}

/// An immutable route tree.
#[derive(Clone, Debug)]
pub struct RouteTree {
    root: RouteNode,
}

impl From<RouteNode> for RouteTree {
    #[inline]
    fn from(root: RouteNode) -> Self {
        Self::new(root)
    }
}

impl RouteTree {
    pub fn new(root: RouteNode) -> Self {
        Self { root }
    }

    /// Collect the declarations that could respond to `method` at `path`.
    ///
    /// Literal segments are followed as deep as they go. Declarations at the node reached
    /// when the path is exhausted win; failing that, the deepest ancestor with declarations
    /// that capture subpaths receives the rest of the path.
    pub fn resolve(&self, path: &UrlPath, method: &Method) -> Resolution {
        let levels = self.descend(path, method);
        let chain = |depth: usize| {
            let handlers = (levels[..=depth].iter().rev())
                .flat_map(|l| l.node.incident_handlers.iter().cloned());
            IncidentChain::nearest_first(handlers)
        };

        let deepest = levels.len() - 1;
        let last = levels[deepest];
        let mut candidates = Vec::new();

        if last.rest.is_exhausted() {
            let incidents = chain(deepest);
            candidates.extend(
                (last.node.declarations.iter())
                    .filter(|d| last.permits(d, method))
                    .map(|d| {
                        let incidents = incidents.within(&d.incident_handlers);
                        Candidate {
                            declaration: d.clone(),
                            subpath: UrlPath::root(),
                            misses: incidents.clone(),
                            incidents,
                        }
                    }),
            );
        }

        if candidates.is_empty() {
            for (depth, level) in levels.iter().enumerate().rev() {
                if level.rest.is_exhausted() {
                    continue;
                }

                let mut capturing = (level.node.declarations.iter())
                    .filter(|d| d.captures_subpath() && level.permits(d, method))
                    .peekable();
                if capturing.peek().is_none() {
                    continue;
                }

                let incidents = chain(depth);
                candidates.extend(capturing.map(|d| {
                    let incidents = incidents.within(&d.incident_handlers);
                    // a miss below a deeper node belongs to that node alone
                    let misses = match depth == deepest {
                        true => incidents.clone(),
                        false => chain(deepest),
                    };
                    Candidate {
                        declaration: d.clone(),
                        subpath: level.rest.to_path(),
                        incidents,
                        misses,
                    }
                }));
                break;
            }
        }

        Resolution {
            candidates,
            incidents: chain(deepest),
        }
    }

    fn descend<'a>(&'a self, path: &'a UrlPath, method: &Method) -> Vec<Level<'a>> {
        let mut levels = Vec::new();
        let mut node = &self.root;
        let mut rest = path.subpath();
        let mut admitted = true;
        let mut constrained = false;

        loop {
            if let Some(set) = &node.methods {
                admitted &= set.contains(method);
                constrained = true;
            }
            levels.push(Level {
                node,
                rest,
                admitted,
                constrained,
            });

            match rest.head_and_tail() {
                Some((head, tail)) => match node.children.get(head) {
                    Some(child) => {
                        node = child;
                        rest = tail;
                    }
                    None => break,
                },
                None => break,
            }
        }

        levels
    }
}
