//! Response providers and the request input they receive.
use super::{
    body::BodyValue,
    header::HeaderError,
    path::UrlPath,
    query::QueryValue,
    reply::{Reply, ResponseContent},
    BoxError,
};
use futures::{
    channel::oneshot,
    future::{ready, BoxFuture, FutureExt},
};
use headers::{Header, HeaderMapExt};
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use std::{future::Future, marker::PhantomData, net::SocketAddr};
use tracing::debug;

/// The result of running a [Handler]. `Ok(None)` means the handler has no response for the
/// request.
pub type Handled = Result<Option<ResponseContent>, BoxError>;

/// Everything a response provider learns about a matched request.
#[derive(Debug)]
pub struct Input {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) subpath: UrlPath,
    pub(crate) query: QueryValue,
    pub(crate) header: Option<HeaderValue>,
    pub(crate) body: BodyValue,
}

impl Input {
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The part of the request path captured below the declaring node.
    #[inline]
    pub fn subpath(&self) -> &UrlPath {
        &self.subpath
    }

    /// The value produced by the declaration's query matcher.
    #[inline]
    pub fn query(&self) -> &QueryValue {
        &self.query
    }

    /// The value produced by the declaration's header matcher.
    #[inline]
    pub fn header(&self) -> Option<&HeaderValue> {
        self.header.as_ref()
    }

    #[inline]
    pub fn body(&self) -> &BodyValue {
        &self.body
    }

    /// Take ownership of the request body.
    #[inline]
    pub fn take_body(&mut self) -> BodyValue {
        std::mem::take(&mut self.body)
    }

    /// Decode a typed header, failing with a [HeaderError] (a `400` reply) if it is missing
    /// or malformed.
    pub fn typed_header<H: Header>(&self) -> Result<H, HeaderError> {
        (self.headers.typed_get::<H>()).ok_or_else(|| HeaderError(H::name().clone()))
    }
}

/// A provider of response content.
pub trait Handler: Sync + Send {
    fn handle(&self, input: Input) -> BoxFuture<'static, Handled>;
}

/// A handler that never has a response.
#[derive(Copy, Clone, Debug)]
pub struct NoResponse;

impl Handler for NoResponse {
    fn handle(&self, _: Input) -> BoxFuture<'static, Handled> {
        ready(Ok(None)).boxed()
    }
}

/// A synchronous handler that always replies.
pub struct ContentFn<F> {
    fun: F,
}

impl<F> ContentFn<F> {
    pub fn new<R>(fun: F) -> Self
    where
        F: Fn(Input) -> R,
    {
        Self { fun }
    }
}

impl<F, R> Handler for ContentFn<F>
where
    F: Fn(Input) -> R + Sync + Send,
    R: Reply,
{
    fn handle(&self, input: Input) -> BoxFuture<'static, Handled> {
        ready(Ok(Some((self.fun)(input).into_content()))).boxed()
    }
}

/// A synchronous handler that may decline to reply.
pub struct OptionalFn<F> {
    fun: F,
}

impl<F> OptionalFn<F> {
    pub fn new<R>(fun: F) -> Self
    where
        F: Fn(Input) -> Option<R>,
    {
        Self { fun }
    }
}

impl<F, R> Handler for OptionalFn<F>
where
    F: Fn(Input) -> Option<R> + Sync + Send,
    R: Reply,
{
    fn handle(&self, input: Input) -> BoxFuture<'static, Handled> {
        ready(Ok((self.fun)(input).map(Reply::into_content))).boxed()
    }
}

/// An async, fallible handler.
pub struct AsyncFn<F, Fut> {
    fun: F,
    tag: PhantomData<fn(Fut)>,
}

impl<F: Fn(Input) -> Fut, Fut> AsyncFn<F, Fut> {
    pub fn new(fun: F) -> Self {
        Self {
            fun,
            tag: PhantomData,
        }
    }
}

impl<F, Fut, R, E> Handler for AsyncFn<F, Fut>
where
    F: Fn(Input) -> Fut + Sync + Send,
    Fut: Future<Output = Result<Option<R>, E>> + Send + 'static,
    R: Reply + 'static,
    E: Into<BoxError> + 'static,
{
    fn handle(&self, input: Input) -> BoxFuture<'static, Handled> {
        (self.fun)(input)
            .map(|r| match r {
                Ok(reply) => Ok(reply.map(Reply::into_content)),
                Err(e) => Err(e.into()),
            })
            .boxed()
    }
}

/// A one-shot token through which a handler delivers its result.
///
/// Every method consumes the token, so a result is delivered at most once. Dropping the token
/// without using it counts as having no response.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<Handled>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Handled>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver response content.
    pub fn complete<R: Reply>(self, reply: R) {
        self.send(Ok(Some(reply.into_content())));
    }

    /// Deliver "no response", letting the request fall through to the `NoResponse` incident.
    pub fn no_response(self) {
        self.send(Ok(None));
    }

    /// Deliver a processing error.
    pub fn fail<E: Into<BoxError>>(self, e: E) {
        self.send(Err(e.into()));
    }

    fn send(self, result: Handled) {
        if self.tx.send(result).is_err() {
            debug!("completion delivered after the request went away");
        }
    }
}

/// A handler that receives a [Completion] token alongside its input.
pub struct CompletionFn<F> {
    fun: F,
}

impl<F: Fn(Input, Completion)> CompletionFn<F> {
    pub fn new(fun: F) -> Self {
        Self { fun }
    }
}

impl<F> Handler for CompletionFn<F>
where
    F: Fn(Input, Completion) + Sync + Send,
{
    fn handle(&self, input: Input) -> BoxFuture<'static, Handled> {
        let (completion, rx) = Completion::channel();
        (self.fun)(input, completion);

        rx.map(|r| match r {
            Ok(handled) => handled,
            Err(_) => {
                debug!("completion dropped without a result");
                Ok(None)
            }
        })
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hyper::StatusCode;

    pub(crate) fn input() -> Input {
        Input {
            method: Method::GET,
            uri: Uri::from_static("/"),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            remote_addr: ([127, 0, 0, 1], 4321).into(),
            subpath: UrlPath::root(),
            query: QueryValue::None,
            header: None,
            body: BodyValue::None,
        }
    }

    #[tokio::test]
    async fn content_fns_reply() {
        let h = ContentFn::new(|_| "hi");
        let c = h.handle(input()).await.unwrap().unwrap();
        assert_eq!(c.status(), StatusCode::OK);

        let h = OptionalFn::new(|_| None::<&'static str>);
        assert!(h.handle(input()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn async_fn_errors_are_kept() {
        let h = AsyncFn::new(|_| async { Err::<Option<&'static str>, _>("broken") });
        let err = h.handle(input()).await.unwrap_err();
        assert_eq!(err.to_string(), "broken");
    }

    #[tokio::test]
    async fn completion_tokens() {
        let h = CompletionFn::new(|_, c: Completion| {
            tokio::spawn(async move { c.complete(StatusCode::ACCEPTED) });
        });
        let c = h.handle(input()).await.unwrap().unwrap();
        assert_eq!(c.status(), StatusCode::ACCEPTED);

        let h = CompletionFn::new(|_, c: Completion| drop(c));
        assert!(h.handle(input()).await.unwrap().is_none());

        let h = CompletionFn::new(|_, c: Completion| c.fail("nope"));
        assert!(h.handle(input()).await.is_err());
    }

    #[test]
    fn typed_header_errors_name_the_header() {
        let err = input().typed_header::<headers::ContentType>().unwrap_err();
        assert_eq!(err.0, http::header::CONTENT_TYPE);
    }
}
