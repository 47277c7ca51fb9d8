//! Header matchers.
use super::{matcher::Filter, reply::Reply, reply::ResponseContent};
use headers::{Header, HeaderMapExt};
use http::{header::HeaderName, HeaderMap, HeaderValue};
use hyper::StatusCode;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// An error encountered during header resolution.
#[derive(Clone, Debug, Error)]
#[error("header {:?} missing or malformed", .0)]
pub struct HeaderError(pub(crate) HeaderName);

impl Reply for HeaderError {
    #[inline]
    fn into_content(self) -> ResponseContent {
        format!("{}", self).with_status(StatusCode::BAD_REQUEST)
    }
}

type CustomHeader = Arc<dyn Fn(&HeaderMap) -> Filter<Option<HeaderValue>> + Send + Sync>;

/// How a declaration constrains request headers.
///
/// Any matcher other than [HeaderMatcher::None] makes a declaration specific, so it
/// outranks otherwise identical declarations during overload resolution.
#[derive(Clone)]
pub enum HeaderMatcher {
    /// Headers are not inspected.
    None,
    /// A user supplied matcher. An accepted value is exposed as [Input::header].
    ///
    /// [Input::header]: super::handler::Input::header
    Custom(CustomHeader),
}

impl Default for HeaderMatcher {
    #[inline]
    fn default() -> Self {
        HeaderMatcher::None
    }
}

impl HeaderMatcher {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&HeaderMap) -> Filter<Option<HeaderValue>> + Send + Sync + 'static,
    {
        HeaderMatcher::Custom(Arc::new(f))
    }

    /// Require a header called `name`, capturing its value.
    ///
    /// ```
    /// use arbor::{header::HeaderMatcher, matcher::Filter};
    /// use http::{header::ACCEPT, HeaderMap, HeaderValue};
    ///
    /// let m = HeaderMatcher::required(ACCEPT);
    /// let mut headers = HeaderMap::new();
    /// assert!(!m.apply(&headers).is_accepted());
    ///
    /// headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
    /// assert_eq!(
    ///     m.apply(&headers),
    ///     Filter::Accepted(Some(HeaderValue::from_static("text/html")))
    /// );
    /// ```
    pub fn required(name: HeaderName) -> Self {
        Self::custom(move |headers| headers.get(&name).cloned().map(Some).into())
    }

    /// Require a header called `name` with exactly `value`.
    pub fn equals(name: HeaderName, value: HeaderValue) -> Self {
        Self::custom(move |headers| match headers.get(&name) {
            Some(v) if *v == value => Filter::Accepted(Some(v.clone())),
            _ => Filter::Rejected,
        })
    }

    /// Require a header that decodes as the typed header `H`.
    ///
    /// ```
    /// use arbor::header::HeaderMatcher;
    /// use headers::{ContentType, HeaderMapExt};
    /// use http::HeaderMap;
    ///
    /// let m = HeaderMatcher::typed::<ContentType>();
    /// let mut headers = HeaderMap::new();
    /// assert!(!m.apply(&headers).is_accepted());
    ///
    /// headers.typed_insert(ContentType::json());
    /// assert!(m.apply(&headers).is_accepted());
    /// ```
    pub fn typed<H: Header + 'static>() -> Self {
        Self::custom(|headers| match headers.typed_get::<H>() {
            Some(_) => Filter::Accepted(headers.get(H::name()).cloned()),
            None => Filter::Rejected,
        })
    }

    #[inline]
    pub fn is_specific(&self) -> bool {
        !matches!(self, HeaderMatcher::None)
    }

    pub fn apply(&self, headers: &HeaderMap) -> Filter<Option<HeaderValue>> {
        match self {
            HeaderMatcher::None => Filter::Accepted(None),
            HeaderMatcher::Custom(f) => f(headers),
        }
    }
}

impl fmt::Debug for HeaderMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderMatcher::None => f.write_str("None"),
            HeaderMatcher::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, USER_AGENT};

    #[test]
    fn none_accepts_without_value() {
        let headers = HeaderMap::new();
        assert_eq!(HeaderMatcher::None.apply(&headers), Filter::Accepted(None));
        assert!(!HeaderMatcher::None.is_specific());
    }

    #[test]
    fn equals_compares_values() {
        let m = HeaderMatcher::equals(USER_AGENT, HeaderValue::from_static("probe"));
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl"));
        assert_eq!(m.apply(&headers), Filter::Rejected);

        headers.insert(USER_AGENT, HeaderValue::from_static("probe"));
        assert!(m.apply(&headers).is_accepted());
        assert!(m.is_specific());
    }

    #[test]
    fn required_rejects_missing() {
        let m = HeaderMatcher::required(ACCEPT);
        assert_eq!(m.apply(&HeaderMap::new()), Filter::Rejected);
    }
}
