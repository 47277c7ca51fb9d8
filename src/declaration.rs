//! Response declarations: the unit of request matching.
use super::{
    body::BodyDescriptor,
    handler::{AsyncFn, Completion, CompletionFn, ContentFn, Handler, Input, NoResponse, OptionalFn},
    header::HeaderMatcher,
    incident::{Incident, IncidentHandler},
    matcher::Filter,
    path::UrlPath,
    precondition::Validator,
    query::QueryMatcher,
    reply::{Reply, ResponseContent},
    BoxError,
};
use http::Method;
use std::{fmt, future::Future, iter::FromIterator, sync::Arc};

/// A set of request methods.
///
/// `HEAD` is implied by `GET`.
///
/// ```
/// use arbor::declaration::MethodSet;
/// use http::Method;
///
/// let set: MethodSet = [Method::GET, Method::POST].into_iter().collect();
/// assert!(set.contains(&Method::HEAD));
/// assert!(!set.contains(&Method::PUT));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSet(Vec<Method>);

impl Default for MethodSet {
    #[inline]
    fn default() -> Self {
        Self::safe()
    }
}

impl MethodSet {
    /// `GET` and `HEAD`.
    pub fn safe() -> Self {
        Self(vec![Method::GET, Method::HEAD])
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method) || (*method == Method::HEAD && self.0.contains(&Method::GET))
    }

    /// The methods contained in both sets.
    pub fn intersect(&self, other: &MethodSet) -> MethodSet {
        let mut out: Vec<Method> = Vec::new();
        let candidates = (self.0.iter().chain(&other.0)).chain(Some(&Method::HEAD));

        for m in candidates {
            if self.contains(m) && other.contains(m) && !out.contains(m) {
                out.push(m.clone());
            }
        }

        MethodSet(out)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

type SubpathFilter = Arc<dyn Fn(&UrlPath) -> Filter<UrlPath> + Send + Sync>;

/// A matchable rule producing response content.
///
/// A declaration responds to `GET` and `HEAD` requests without a query or a body unless told
/// otherwise, and has no response until a content provider is attached.
///
/// ```
/// use arbor::{declaration::Declaration, query::QuerySpec, reply::Reply};
/// use http::{Method, StatusCode};
///
/// let _ = Declaration::new()
///     .methods([Method::POST])
///     .query(QuerySpec::new().required_as::<u32>("id"))
///     .content(|input| {
///         let id: u32 = input.query().parse("id").unwrap_or_default();
///         format!("created {}", id).with_status(StatusCode::CREATED)
///     });
/// ```
#[derive(Clone)]
pub struct Declaration {
    pub(crate) methods: Option<MethodSet>,
    pub(crate) query: QueryMatcher,
    pub(crate) header: HeaderMatcher,
    pub(crate) body: BodyDescriptor,
    pub(crate) subpath: Option<SubpathFilter>,
    pub(crate) validator: Option<Validator>,
    pub(crate) incident_handlers: Vec<IncidentHandler>,
    pub(crate) falls_through: bool,
    pub(crate) handler: Arc<dyn Handler>,
}

impl Default for Declaration {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Declaration {
    pub fn new() -> Self {
        Self {
            methods: None,
            query: QueryMatcher::default(),
            header: HeaderMatcher::default(),
            body: BodyDescriptor::default(),
            subpath: None,
            validator: None,
            incident_handlers: Vec::new(),
            falls_through: false,
            handler: Arc::new(NoResponse),
        }
    }

    /// Restrict the methods this declaration responds to. Repeated calls intersect.
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        let set: MethodSet = methods.into_iter().collect();
        self.constrain_methods(&set);
        self
    }

    pub(crate) fn constrain_methods(&mut self, set: &MethodSet) {
        self.methods = Some(match &self.methods {
            Some(own) => own.intersect(set),
            None => set.clone(),
        });
    }

    /// Returns `true` if this declaration responds to `method`.
    pub fn allows(&self, method: &Method) -> bool {
        match &self.methods {
            Some(set) => set.contains(method),
            None => MethodSet::safe().contains(method),
        }
    }

    pub fn query<Q: Into<QueryMatcher>>(mut self, matcher: Q) -> Self {
        self.query = matcher.into();
        self
    }

    pub fn header(mut self, matcher: HeaderMatcher) -> Self {
        self.header = matcher;
        self
    }

    pub fn body(mut self, descriptor: BodyDescriptor) -> Self {
        self.body = descriptor;
        self
    }

    /// Accept requests whose path continues below the declaring node, if `filter` accepts
    /// the remaining path. The accepted value is exposed as [Input::subpath].
    pub fn subpath<F>(mut self, filter: F) -> Self
    where
        F: Fn(&UrlPath) -> Filter<UrlPath> + Send + Sync + 'static,
    {
        self.subpath = Some(Arc::new(filter));
        self
    }

    /// Accept any remaining path.
    pub fn any_subpath(self) -> Self {
        self.subpath(|p| Filter::Accepted(p.clone()))
    }

    /// Declare validators known before the handler runs. Conditional requests are decided
    /// against them as soon as the request head arrives.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Handle incidents raised once this declaration has been selected. Handlers added
    /// first are consulted first, all before any node level handler.
    pub fn on_incident<F>(mut self, f: F) -> Self
    where
        F: Fn(&Incident) -> Option<ResponseContent> + Send + Sync + 'static,
    {
        self.incident_handlers.push(Arc::new(f));
        self
    }

    /// Treat a handler that produces no response as a routing miss. The `NoResponse`
    /// incident then goes to the deepest node the request path reached, and to this
    /// declaration's own incident handlers only if that is the node it is attached to.
    pub fn fall_through(mut self) -> Self {
        self.falls_through = true;
        self
    }

    /// Respond with whatever `f` returns.
    pub fn content<F, R>(self, f: F) -> Self
    where
        F: Fn(Input) -> R + Send + Sync + 'static,
        R: Reply + 'static,
    {
        self.handler(ContentFn::new(f))
    }

    /// Respond with whatever `f` returns, or fall through to `NoResponse` on `None`.
    pub fn optional_content<F, R>(self, f: F) -> Self
    where
        F: Fn(Input) -> Option<R> + Send + Sync + 'static,
        R: Reply + 'static,
    {
        self.handler(OptionalFn::new(f))
    }

    /// Respond asynchronously. An error becomes a `RequestProcessingError` incident.
    pub fn handle<F, Fut, R, E>(self, f: F) -> Self
    where
        F: Fn(Input) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<R>, E>> + Send + 'static,
        R: Reply + 'static,
        E: Into<BoxError> + 'static,
    {
        self.handler(AsyncFn::new(f))
    }

    /// Respond through a [Completion] token, which may be moved to another task.
    pub fn complete_with<F>(self, f: F) -> Self
    where
        F: Fn(Input, Completion) + Send + Sync + 'static,
    {
        self.handler(CompletionFn::new(f))
    }

    /// Respond with an arbitrary [Handler].
    pub fn handler<H: Handler + 'static>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Returns `true` if this declaration outranks unconstrained declarations during
    /// overload resolution.
    #[inline]
    pub fn is_specific(&self) -> bool {
        self.query.is_specific() || self.header.is_specific()
    }

    #[inline]
    pub(crate) fn captures_subpath(&self) -> bool {
        self.subpath.is_some()
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (f.debug_struct("Declaration"))
            .field("methods", &self.methods)
            .field("query", &self.query)
            .field("header", &self.header)
            .field("body", &self.body)
            .field("subpath", &self.subpath.is_some())
            .field("validator", &self.validator)
            .field("incident_handlers", &self.incident_handlers.len())
            .field("falls_through", &self.falls_through)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuerySpec;

    fn set(ms: &[Method]) -> MethodSet {
        ms.iter().cloned().collect()
    }

    #[test]
    fn head_is_implied_by_get() {
        assert!(set(&[Method::GET]).contains(&Method::HEAD));
        assert!(!set(&[Method::HEAD]).contains(&Method::GET));
        assert!(!set(&[Method::POST]).contains(&Method::HEAD));
    }

    #[test]
    fn intersection() {
        let a = set(&[Method::GET, Method::POST]);
        let b = set(&[Method::POST, Method::PUT]);
        assert_eq!(a.intersect(&b), set(&[Method::POST]));

        let get_only = set(&[Method::GET]);
        let head_only = set(&[Method::HEAD]);
        let both = get_only.intersect(&head_only);
        assert!(both.contains(&Method::HEAD));
        assert!(!both.contains(&Method::GET));

        assert!(set(&[Method::GET]).intersect(&set(&[Method::PUT])).is_empty());
    }

    #[test]
    fn defaults() {
        let d = Declaration::new();
        assert!(d.allows(&Method::GET));
        assert!(d.allows(&Method::HEAD));
        assert!(!d.allows(&Method::POST));
        assert!(!d.is_specific());
        assert!(!d.captures_subpath());

        let d = d.methods([Method::GET, Method::DELETE]).methods([Method::DELETE]);
        assert!(d.allows(&Method::DELETE));
        assert!(!d.allows(&Method::GET));
    }

    #[test]
    fn specificity() {
        let d = Declaration::new().query(QuerySpec::new().optional("a"));
        assert!(!d.is_specific());

        let d = Declaration::new().query(QuerySpec::new().required("a"));
        assert!(d.is_specific());

        let d = Declaration::new().header(HeaderMatcher::required(http::header::ACCEPT));
        assert!(d.is_specific());
    }
}
