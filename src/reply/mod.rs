//! Response content and the [Reply] conversion.
use super::{
    directory::FileProvider, etag::EntityTag, precondition::Validator, BoxError, Response,
};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use headers::{ContentLength, Header, HeaderMapExt, LastModified};
use http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode};
use hyper::{
    header::{CONTENT_TYPE, ETAG, X_CONTENT_TYPE_OPTIONS},
    Body,
};
use serde::Serialize;
use std::{convert::Infallible, fmt, io, path::PathBuf, sync::Arc, time::SystemTime};
use tracing::error;

/// Where the bytes of a response body come from.
pub enum BodySource {
    Empty,
    Bytes(Bytes),
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
    /// A file, opened through `provider` when the response is written.
    File {
        provider: Arc<dyn FileProvider>,
        path: PathBuf,
    },
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Empty => f.write_str("Empty"),
            BodySource::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            BodySource::Stream(_) => f.write_str("Stream"),
            BodySource::File { path, .. } => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// The content of a response: status, headers, body source and validators.
#[derive(Debug)]
pub struct ResponseContent {
    status: StatusCode,
    headers: HeaderMap,
    body: BodySource,
    entity_tag: Option<EntityTag>,
    last_modified: Option<SystemTime>,
    content_length: Option<u64>,
}

impl ResponseContent {
    /// Content with `status` and no body.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: BodySource::Empty,
            entity_tag: None,
            last_modified: None,
            content_length: None,
        }
    }

    /// `200 OK` content with a body.
    pub fn with_body(body: BodySource) -> Self {
        let mut content = Self::empty(StatusCode::OK);
        content.body = body;
        content
    }

    /// Stream the body from `stream`.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::with_body(BodySource::Stream(stream.map_err(Into::into).boxed()))
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[inline]
    pub fn body(&self) -> &BodySource {
        &self.body
    }

    #[inline]
    pub fn entity_tag(&self) -> Option<&EntityTag> {
        self.entity_tag.as_ref()
    }

    #[inline]
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Include a raw header.
    #[inline]
    pub fn with_raw_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Declare the entity tag of this content.
    #[inline]
    pub fn with_entity_tag(mut self, tag: EntityTag) -> Self {
        self.entity_tag = Some(tag);
        self
    }

    /// Declare when this content was last modified.
    #[inline]
    pub fn with_modification_date(mut self, date: SystemTime) -> Self {
        self.last_modified = Some(date);
        self
    }

    /// Declare the body length explicitly, e.g. for streamed bodies.
    #[inline]
    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    /// Returns the validators of this content.
    pub fn validator(&self) -> Validator {
        Validator {
            entity_tag: self.entity_tag.clone(),
            last_modified: self.last_modified,
        }
    }

    /// The `304 Not Modified` form of a validator.
    pub(crate) fn not_modified(validator: Validator) -> Self {
        let mut content = Self::empty(StatusCode::NOT_MODIFIED);
        content.entity_tag = validator.entity_tag;
        content.last_modified = validator.last_modified;
        content
    }

    /// Turn this content into its `304 Not Modified` form, keeping validators and dropping
    /// the body and entity headers.
    pub(crate) fn into_not_modified(self) -> Self {
        let mut content = Self::not_modified(self.validator());
        content.headers = self.headers;
        content.headers.remove(CONTENT_TYPE);
        content.headers.remove(X_CONTENT_TYPE_OPTIONS);
        content
    }

    /// Drop the body of a response to `HEAD`, keeping a known length.
    pub(crate) fn into_head(mut self) -> Self {
        if let BodySource::Bytes(b) = &self.body {
            self.content_length.get_or_insert(b.len() as u64);
        }
        self.body = BodySource::Empty;
        self
    }

    /// Write headers and open the body.
    pub(crate) async fn render(self) -> io::Result<Response> {
        let body = match self.body {
            BodySource::Empty => Body::empty(),
            BodySource::Bytes(b) => Body::from(b),
            BodySource::Stream(s) => Body::wrap_stream(s),
            BodySource::File { provider, path } => Body::wrap_stream(provider.open(&path).await?),
        };

        let mut resp = hyper::Response::new(body);
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;

        let headers = resp.headers_mut();
        if let Some(tag) = self.entity_tag {
            if let Ok(v) = HeaderValue::from_str(&tag.to_string()) {
                headers.insert(ETAG, v);
            }
        }
        if let Some(t) = self.last_modified {
            headers.typed_insert(LastModified::from(t));
        }
        if let Some(n) = self.content_length {
            headers.typed_insert(ContentLength(n));
        }

        Ok(resp)
    }
}

/// A type that can be converted into [ResponseContent].
pub trait Reply: Sized + Send {
    /// Perform the conversion.
    fn into_content(self) -> ResponseContent;

    /// Change the status code to `code`.
    ///
    /// ```
    /// use arbor::reply::{Reply, ResponseContent};
    /// use hyper::StatusCode;
    ///
    /// let c: ResponseContent = "some message" //
    ///     .with_status(StatusCode::IM_A_TEAPOT);
    /// assert_eq!(c.status(), StatusCode::IM_A_TEAPOT);
    /// ```
    #[inline]
    fn with_status(self, code: StatusCode) -> ResponseContent {
        let mut content = self.into_content();
        content.status = code;
        content
    }

    /// Include a typed `header` in the response.
    ///
    /// ```
    /// use arbor::reply::{Reply, ResponseContent};
    /// use headers::ContentType;
    ///
    /// let _: ResponseContent = "some message" //
    ///     .with_header(ContentType::text());
    /// ```
    #[inline]
    fn with_header<H: Header>(self, header: H) -> ResponseContent {
        let mut content = self.into_content();
        content.headers.typed_insert(header);
        content
    }
}

impl Reply for ResponseContent {
    #[inline]
    fn into_content(self) -> ResponseContent {
        self
    }
}

impl<R: Reply, E: Reply> Reply for Result<R, E> {
    #[inline]
    fn into_content(self) -> ResponseContent {
        self.map_or_else(E::into_content, R::into_content)
    }
}

impl Reply for Infallible {
    #[inline]
    fn into_content(self) -> ResponseContent {
        match self {}
    }
}

impl<T: Reply> Reply for Box<T> {
    #[inline]
    fn into_content(self) -> ResponseContent {
        (*self).into_content()
    }
}

impl Reply for StatusCode {
    #[inline]
    fn into_content(self) -> ResponseContent {
        ResponseContent::empty(self)
    }
}

macro_rules! content_type {
    ($mime:literal $( $re_type:ty ),+ $(,)?) => {
        $(impl Reply for $re_type {
            #[inline]
            fn into_content(self) -> ResponseContent {
                ResponseContent::with_body(BodySource::Bytes(self.into()))
                    .with_raw_header(CONTENT_TYPE, HeaderValue::from_static($mime))
                    .with_raw_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))
            }
        })+
    };
}

content_type! { "text/plain; charset=utf-8"
    String,
    &'static str,
}

content_type! { "application/octet-stream"
    Vec<u8>,
    &'static [u8],
    Bytes,
}

/// Returns json [ResponseContent] from an arbitrary serializable value.
///
/// A value that fails to serialize yields an empty `500`.
#[inline]
pub fn json<T: Serialize>(value: &T) -> ResponseContent {
    match serde_json::to_vec(value) {
        Ok(ser) => ResponseContent::with_body(BodySource::Bytes(ser.into()))
            .with_raw_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_raw_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        Err(e) => {
            error!(error = %e, "failed to serialize json reply");
            ResponseContent::empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::to_bytes;
    use std::time::{Duration, UNIX_EPOCH};

    #[tokio::test]
    async fn renders_validators_and_body() {
        let t = UNIX_EPOCH + Duration::from_secs(1_697_123_113);
        let content = "hi"
            .into_content()
            .with_entity_tag(EntityTag::weak("v1").unwrap())
            .with_modification_date(t);

        let resp = content.render().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[ETAG], r#"W/"v1""#);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(
            resp.headers()[hyper::header::LAST_MODIFIED],
            httpdate::fmt_http_date(t).as_str()
        );
        assert_eq!(to_bytes(resp.into_body()).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn not_modified_drops_body_but_keeps_tag() {
        let content = json(&vec![1, 2, 3])
            .with_entity_tag(EntityTag::strong("x").unwrap())
            .into_not_modified();

        assert_eq!(content.status(), StatusCode::NOT_MODIFIED);
        assert!(content.headers().get(CONTENT_TYPE).is_none());

        let resp = content.render().await.unwrap();
        assert_eq!(resp.headers()[ETAG], r#""x""#);
        assert!(to_bytes(resp.into_body()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn head_keeps_length() {
        let resp = "Hello!".into_content().into_head().render().await.unwrap();
        assert_eq!(resp.headers()[hyper::header::CONTENT_LENGTH], "6");
        assert!(to_bytes(resp.into_body()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn streams_render_in_order() {
        let chunks = vec![
            Ok::<_, io::Error>(Bytes::from_static(b"str")),
            Ok(Bytes::from_static(b"eam")),
        ];
        let content =
            ResponseContent::stream(futures::stream::iter(chunks)).with_content_length(6);

        let resp = content.render().await.unwrap();
        assert_eq!(resp.headers()[hyper::header::CONTENT_LENGTH], "6");
        assert_eq!(to_bytes(resp.into_body()).await.unwrap(), "stream");
    }

        #[test]
    fn result_replies_pick_their_side() {
        let ok: Result<&'static str, StatusCode> = Ok("fine");
        assert_eq!(ok.into_content().status(), StatusCode::OK);

        let err: Result<&'static str, StatusCode> = Err(StatusCode::CONFLICT);
        assert_eq!(err.into_content().status(), StatusCode::CONFLICT);
    }
}
