//! Url paths in standardized form.
//!
//! Every [UrlPath] is standardized on construction: empty segments and `.` are dropped, and
//! `..` removes the previously retained segment (or nothing, at the root). Two paths written
//! differently but meaning the same thing therefore compare and hash equal.
use percent_encoding::percent_decode_str;
use std::{fmt, iter::FromIterator};

/// Standardize a sequence of path segments.
///
/// ```
/// use arbor::path::standardize;
///
/// assert_eq!(standardize(["a", "..", "b"]), ["b"]);
/// assert_eq!(standardize(["..", "a"]), ["a"]);
/// assert_eq!(standardize(["a", ".", "", "b"]), ["a", "b"]);
/// ```
pub fn standardize<I, S>(segments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();

    for segment in segments {
        let segment = segment.into();
        match segment.as_str() {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            _ => out.push(segment),
        }
    }

    out
}

/// A standardized url path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlPath {
    segments: Vec<String>,
}

impl UrlPath {
    /// The empty path.
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a raw path, splitting on `/` before percent-decoding each segment.
    ///
    /// Leading, trailing and doubled slashes never produce segments.
    ///
    /// ```
    /// use arbor::path::UrlPath;
    ///
    /// let p = UrlPath::parse("///b/./c/..//b///e///./f/../");
    /// assert_eq!(p, UrlPath::parse("b/b/e"));
    /// assert_eq!(UrlPath::parse("/a%20b/c").segments(), ["a b", "c"]);
    /// ```
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned());

        Self::from_segments(segments)
    }

    /// Construct a path from literal segments. Segments are not split or decoded.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = standardize(segments);
        Self { segments }
    }

    /// Returns the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if this path has no segments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns `true` if the first segments of this path are exactly `prefix`.
    #[inline]
    pub fn starts_with(&self, prefix: &UrlPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Returns a subpath cursor positioned at the first segment.
    #[inline]
    pub fn subpath(&self) -> Subpath<'_> {
        Subpath {
            segments: &self.segments,
        }
    }
}

impl<S: Into<String>> FromIterator<S> for UrlPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_segments(iter)
    }
}

impl From<&str> for UrlPath {
    #[inline]
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for UrlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// A cursor over the unconsumed tail of a [UrlPath].
///
/// Consuming a segment yields a new view; the original is left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subpath<'a> {
    segments: &'a [String],
}

impl<'a> Subpath<'a> {
    /// Split off the next segment, or `None` if exhausted.
    #[inline]
    pub fn head_and_tail(self) -> Option<(&'a str, Subpath<'a>)> {
        let (head, tail) = self.segments.split_first()?;
        Some((head, Subpath { segments: tail }))
    }

    /// Returns `true` if no segments remain.
    #[inline]
    pub fn is_exhausted(self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the remaining segments.
    #[inline]
    pub fn segments(self) -> &'a [String] {
        self.segments
    }

    /// Copy the remaining segments into an owned path.
    pub fn to_path(self) -> UrlPath {
        UrlPath {
            segments: self.segments.to_vec(),
        }
    }
}
