//! Conditional request evaluation (`If-Match`, `If-None-Match`, `If-Modified-Since`,
//! `If-Unmodified-Since`).
//!
//! Malformed conditional headers are treated as absent. Parse errors never surface to the
//! client.
use super::etag::{EntityTag, EntityTagList};
use http::{
    header::{HeaderName, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE},
    HeaderMap, Method,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// The validators of a response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validator {
    pub entity_tag: Option<EntityTag>,
    pub last_modified: Option<SystemTime>,
}

impl Validator {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entity_tag.is_none() && self.last_modified.is_none()
    }
}

/// The result of evaluating request preconditions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Proceed,
    NotModified,
    PreconditionFailed,
}

/// The conditional headers of a request, parsed once at header time. Malformed values are
/// already dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions {
    if_match: Option<EntityTagList>,
    if_none_match: Option<EntityTagList>,
    if_modified_since: Option<SystemTime>,
    if_unmodified_since: Option<SystemTime>,
}

fn joined(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let mut values = headers.get_all(name).iter().peekable();
    values.peek()?;

    let mut out = String::new();
    for v in values {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(v.to_str().ok()?);
    }
    Some(out)
}

fn tag_list(headers: &HeaderMap, name: &HeaderName) -> Option<EntityTagList> {
    let raw = joined(headers, name)?;
    match EntityTagList::parse(&raw) {
        Ok(list) => Some(list),
        Err(e) => {
            trace!(header = %name, error = %e, "ignoring malformed entity tag list");
            None
        }
    }
}

fn date(headers: &HeaderMap, name: &HeaderName) -> Option<SystemTime> {
    let raw = headers.get(name)?.to_str().ok()?;
    match httpdate::parse_http_date(raw.trim()) {
        Ok(t) => Some(t),
        Err(e) => {
            trace!(header = %name, error = %e, "ignoring malformed http date");
            None
        }
    }
}

/// Drop sub-second precision; http dates carry whole seconds.
fn truncate(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

#[inline]
fn is_safe(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

impl Conditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_match: tag_list(headers, &IF_MATCH),
            if_none_match: tag_list(headers, &IF_NONE_MATCH),
            if_modified_since: date(headers, &IF_MODIFIED_SINCE),
            if_unmodified_since: date(headers, &IF_UNMODIFIED_SINCE),
        }
    }

    /// Returns `true` if no usable conditional header was sent.
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Evaluate against a response validator.
    pub fn evaluate(&self, method: &Method, validator: &Validator) -> Outcome {
        let tag = validator.entity_tag.as_ref();
        let modified = validator.last_modified.map(truncate);

        if let Some(list) = &self.if_match {
            let satisfied = match (tag, list) {
                (None, _) => false,
                (Some(_), EntityTagList::Any) => true,
                (Some(tag), list) => list.matches(tag, EntityTag::strong_eq),
            };
            if !satisfied {
                return Outcome::PreconditionFailed;
            }
        } else if let (Some(since), Some(modified)) = (self.if_unmodified_since, modified) {
            if modified > since {
                return Outcome::PreconditionFailed;
            }
        }

        if let Some(list) = &self.if_none_match {
            let matched = tag.map_or(false, |tag| list.matches(tag, EntityTag::weak_eq));
            return match matched {
                false => Outcome::Proceed,
                true if is_safe(method) => Outcome::NotModified,
                true => Outcome::PreconditionFailed,
            };
        }

        if let (Some(since), Some(modified)) = (self.if_modified_since, modified) {
            if is_safe(method) && modified <= since {
                return Outcome::NotModified;
            }
        }

        Outcome::Proceed
    }
}

/// Evaluate the conditional headers in `headers` against `validator`.
///
/// ```
/// use arbor::{etag::EntityTag, precondition::{evaluate, Outcome, Validator}};
/// use http::{header::IF_MATCH, HeaderMap, HeaderValue, Method};
///
/// let validator = Validator {
///     entity_tag: EntityTag::strong("s"),
///     last_modified: None,
/// };
///
/// let mut headers = HeaderMap::new();
/// headers.insert(IF_MATCH, HeaderValue::from_static("*"));
/// assert_eq!(evaluate(&Method::GET, &headers, &validator), Outcome::Proceed);
///
/// headers.insert(IF_MATCH, HeaderValue::from_static(r#"W/"s""#));
/// assert_eq!(evaluate(&Method::GET, &headers, &validator), Outcome::PreconditionFailed);
/// ```
pub fn evaluate(method: &Method, headers: &HeaderMap, validator: &Validator) -> Outcome {
    Conditions::from_headers(headers).evaluate(method, validator)
}
