//! Request body descriptors and accumulation.
//!
//! A [BodyDescriptor] decides, at declaration time, how a request body is consumed: not at
//! all, collected into a buffer (optionally decoded as json), or fed chunk by chunk to a
//! [BodySink]. Every descriptor carries a byte limit that is checked on each chunk.
use super::BoxError;
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// The limit applied to declarations that accept a body without declaring one.
pub const DEFAULT_BODY_LENGTH_LIMIT: u64 = 16 * 1024;

/// A request body, in the representation its declaration asked for.
#[derive(Clone, Debug, PartialEq)]
pub enum BodyValue {
    /// No body bytes were received.
    None,
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl Default for BodyValue {
    #[inline]
    fn default() -> Self {
        BodyValue::None
    }
}

impl BodyValue {
    /// Returns the raw bytes of a collected body.
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            BodyValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match self {
            BodyValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Deserialize a json body into `T`. Returns `Ok(None)` if there is no json body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match self {
            BodyValue::Json(v) => T::deserialize(v).map(Some),
            _ => Ok(None),
        }
    }
}

/// An error encountered while consuming a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    /// More bytes arrived than the declaration allows.
    #[error("request body exceeds the limit of {limit} bytes")]
    LimitExceeded { limit: u64 },
    /// The collected body is not valid json.
    #[error("malformed json body: {}", .0)]
    Json(#[from] serde_json::Error),
    /// A streaming consumer failed.
    #[error("body consumer failed: {}", .0)]
    Sink(BoxError),
}

/// A streaming consumer of request body chunks.
pub trait BodySink: Send {
    /// Consume the next chunk, in arrival order.
    fn write(&mut self, chunk: Bytes) -> Result<(), BoxError>;

    /// Called once after the last chunk.
    fn finish(self: Box<Self>) -> Result<BodyValue, BoxError>;
}

type SinkFactory = Arc<dyn Fn() -> Box<dyn BodySink> + Send + Sync>;

#[derive(Clone)]
enum BodyKind {
    None,
    Bytes,
    Json,
    Sink(SinkFactory),
}

/// How a declaration consumes request bodies.
#[derive(Clone)]
pub struct BodyDescriptor {
    kind: BodyKind,
    limit: Option<u64>,
}

impl Default for BodyDescriptor {
    #[inline]
    fn default() -> Self {
        Self::none()
    }
}

impl BodyDescriptor {
    /// Request bodies are prohibited; any body byte exceeds the limit.
    pub fn none() -> Self {
        let kind = BodyKind::None;
        let limit = Some(0);
        Self { kind, limit }
    }

    /// Collect the body into [BodyValue::Bytes].
    pub fn bytes() -> Self {
        let kind = BodyKind::Bytes;
        let limit = None;
        Self { kind, limit }
    }

    /// Collect the body and decode it as json into [BodyValue::Json].
    pub fn json() -> Self {
        let kind = BodyKind::Json;
        let limit = None;
        Self { kind, limit }
    }

    /// Stream the body into a fresh [BodySink] per request.
    pub fn sink<F, S>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: BodySink + 'static,
    {
        let factory: SinkFactory = Arc::new(move || Box::new(factory()) as Box<dyn BodySink>);
        let kind = BodyKind::Sink(factory);
        let limit = None;
        Self { kind, limit }
    }

    /// Fold body chunks into an accumulator as they arrive, converting the result with
    /// `finish` after the last chunk.
    ///
    /// ```
    /// use arbor::body::{BodyDescriptor, BodyValue};
    ///
    /// // count the bytes of a body without buffering it
    /// let _ = BodyDescriptor::reducing(
    ///     0u64,
    ///     |n, chunk| {
    ///         *n += chunk.len() as u64;
    ///         Ok(())
    ///     },
    ///     |n| BodyValue::Json(n.into()),
    /// )
    /// .limit(1 << 20);
    /// ```
    pub fn reducing<T, F, G>(init: T, fold: F, finish: G) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&mut T, &[u8]) -> Result<(), BoxError> + Send + Sync + 'static,
        G: Fn(T) -> BodyValue + Send + Sync + 'static,
    {
        let fold = Arc::new(fold);
        let finish = Arc::new(finish);

        Self::sink(move || Reducer {
            acc: init.clone(),
            fold: fold.clone(),
            finish: finish.clone(),
        })
    }

    /// Set the maximum number of body bytes accepted.
    #[inline]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the limit, falling back to `default` if none was declared.
    #[inline]
    pub fn effective_limit(&self, default: u64) -> u64 {
        self.limit.unwrap_or(default)
    }

    pub(crate) fn accumulator(&self, default_limit: u64) -> Accumulator {
        let collector = match &self.kind {
            BodyKind::None => Collector::Discard,
            BodyKind::Bytes => Collector::Buffer(BytesMut::new(), false),
            BodyKind::Json => Collector::Buffer(BytesMut::new(), true),
            BodyKind::Sink(factory) => Collector::Sink(factory()),
        };

        Accumulator {
            limit: self.effective_limit(default_limit),
            received: 0,
            collector,
        }
    }
}

impl fmt::Debug for BodyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BodyKind::None => "None",
            BodyKind::Bytes => "Bytes",
            BodyKind::Json => "Json",
            BodyKind::Sink(_) => "Sink",
        };
        (f.debug_struct("BodyDescriptor"))
            .field("kind", &kind)
            .field("limit", &self.limit)
            .finish()
    }
}

struct Reducer<T, F, G> {
    acc: T,
    fold: Arc<F>,
    finish: Arc<G>,
}

impl<T, F, G> BodySink for Reducer<T, F, G>
where
    T: Send,
    F: Fn(&mut T, &[u8]) -> Result<(), BoxError> + Send + Sync,
    G: Fn(T) -> BodyValue + Send + Sync,
{
    fn write(&mut self, chunk: Bytes) -> Result<(), BoxError> {
        (*self.fold)(&mut self.acc, &chunk)
    }

    fn finish(self: Box<Self>) -> Result<BodyValue, BoxError> {
        let Reducer { acc, finish, .. } = *self;
        Ok((*finish)(acc))
    }
}

enum Collector {
    Discard,
    Buffer(BytesMut, bool),
    Sink(Box<dyn BodySink>),
}

/// Per-request body state. Owned by exactly one request processor.
pub(crate) struct Accumulator {
    limit: u64,
    received: u64,
    collector: Collector,
}

impl Accumulator {
    /// Reject up front if the announced length is over the limit.
    pub(crate) fn check_length(&self, content_length: u64) -> Result<(), BodyError> {
        if content_length > self.limit {
            return Err(BodyError::LimitExceeded { limit: self.limit });
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, chunk: Bytes) -> Result<(), BodyError> {
        let len = chunk.len() as u64;
        self.received = match self.received.checked_add(len) {
            Some(total) if total <= self.limit => total,
            _ => return Err(BodyError::LimitExceeded { limit: self.limit }),
        };

        match &mut self.collector {
            Collector::Discard => Ok(()),
            Collector::Buffer(buf, _) => {
                buf.extend_from_slice(&chunk);
                Ok(())
            }
            Collector::Sink(sink) => sink.write(chunk).map_err(BodyError::Sink),
        }
    }

    pub(crate) fn finish(self) -> Result<BodyValue, BodyError> {
        match self.collector {
            Collector::Discard => Ok(BodyValue::None),
            Collector::Buffer(buf, _) if buf.is_empty() => Ok(BodyValue::None),
            Collector::Buffer(buf, false) => Ok(BodyValue::Bytes(buf.freeze())),
            Collector::Buffer(buf, true) => Ok(BodyValue::Json(serde_json::from_slice(&buf)?)),
            Collector::Sink(sink) => sink.finish().map_err(BodyError::Sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(desc: &BodyDescriptor, chunks: &[&'static [u8]]) -> Result<BodyValue, BodyError> {
        let mut acc = desc.accumulator(DEFAULT_BODY_LENGTH_LIMIT);
        for c in chunks {
            acc.push(Bytes::from_static(c))?;
        }
        acc.finish()
    }

    #[test]
    fn limit_is_inclusive() {
        let desc = BodyDescriptor::bytes().limit(4);
        let v = feed(&desc, &[b"ab", b"cd"]).unwrap();
        assert_eq!(v, BodyValue::Bytes(Bytes::from_static(b"abcd")));

        let err = feed(&desc, &[b"ab", b"cde"]).unwrap_err();
        assert!(matches!(err, BodyError::LimitExceeded { limit: 4 }));
    }

    #[test]
    fn received_count_never_wraps() {
        let mut acc = Accumulator {
            limit: u64::MAX,
            received: u64::MAX - 2,
            collector: Collector::Discard,
        };
        assert!(acc.push(Bytes::from_static(b"ab")).is_ok());

        let err = acc.push(Bytes::from_static(b"c")).unwrap_err();
        assert!(matches!(err, BodyError::LimitExceeded { limit: u64::MAX }));
    }

    #[test]
    fn none_prohibits_bodies() {
        let desc = BodyDescriptor::none();
        assert_eq!(feed(&desc, &[]).unwrap(), BodyValue::None);
        assert_eq!(feed(&desc, &[b""]).unwrap(), BodyValue::None);
        assert!(feed(&desc, &[b"x"]).is_err());
    }

    #[test]
    fn default_limit_applies_when_undeclared() {
        let desc = BodyDescriptor::bytes();
        assert_eq!(desc.effective_limit(7), 7);

        let acc = desc.accumulator(7);
        assert!(acc.check_length(7).is_ok());
        assert!(acc.check_length(8).is_err());
    }

    #[test]
    fn json_bodies_decode() {
        let desc = BodyDescriptor::json();
        let v = feed(&desc, &[b"{\"a\":", b" 1}"]).unwrap();
        assert_eq!(v, BodyValue::Json(serde_json::json!({ "a": 1 })));

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct A {
            a: u32,
        }
        assert_eq!(v.decode::<A>().unwrap(), Some(A { a: 1 }));

        assert!(matches!(feed(&desc, &[b"{"]), Err(BodyError::Json(_))));
        assert_eq!(feed(&desc, &[]).unwrap(), BodyValue::None);
    }

    #[test]
    fn reducing_folds_chunks_in_order() {
        let desc = BodyDescriptor::reducing(
            String::new(),
            |s, chunk| {
                s.push_str(std::str::from_utf8(chunk)?);
                s.push('|');
                Ok(())
            },
            |s| BodyValue::Json(s.into()),
        );

        let v = feed(&desc, &[b"a", b"b", b"c"]).unwrap();
        assert_eq!(v, BodyValue::Json("a|b|c|".into()));

        // a fresh accumulator per request
        let v = feed(&desc, &[b"z"]).unwrap();
        assert_eq!(v, BodyValue::Json("z|".into()));
    }

    #[test]
    fn sink_errors_surface() {
        let desc = BodyDescriptor::reducing(
            (),
            |_, _| Err("nope".into()),
            |_| BodyValue::None,
        );
        assert!(matches!(feed(&desc, &[b"a"]), Err(BodyError::Sink(_))));
    }
}
