//! Entity tags and the `If-Match` / `If-None-Match` list grammar.
use std::{fmt, iter::Peekable, str::CharIndices};
use thiserror::Error;

/// An opaque validator token with a weak/strong flag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityTag {
    value: String,
    weak: bool,
}

#[inline]
fn is_etagc(c: char) -> bool {
    c == '\x21' || ('\x23'..='\x7e').contains(&c)
}

impl EntityTag {
    /// Create a strong tag. Returns `None` if `value` contains characters not permitted
    /// between the quotes of an entity tag.
    pub fn strong<S: Into<String>>(value: S) -> Option<Self> {
        Self::new(value, false)
    }

    /// Create a weak tag. See [EntityTag::strong].
    pub fn weak<S: Into<String>>(value: S) -> Option<Self> {
        Self::new(value, true)
    }

    fn new<S: Into<String>>(value: S, weak: bool) -> Option<Self> {
        let value = value.into();
        if !value.chars().all(is_etagc) {
            return None;
        }
        Some(Self { value, weak })
    }

    /// Returns the opaque part of the tag.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[inline]
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Strong comparison: neither tag is weak and the values are equal.
    #[inline]
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.value == other.value
    }

    /// Weak comparison: the values are equal.
    #[inline]
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.value == other.value
    }

    /// Returns whether this exact tag (value and weakness) is listed in `header`, or the
    /// header is the wildcard.
    ///
    /// ```
    /// use arbor::etag::EntityTag;
    ///
    /// let abc = EntityTag::strong("abc").unwrap();
    /// assert_eq!(abc.is_in(r#""abc""#), Ok(true));
    /// assert_eq!(abc.is_in(r#""abcc""#), Ok(false));
    ///
    /// let weak = EntityTag::weak("abc").unwrap();
    /// assert_eq!(weak.is_in(r#""abc""#), Ok(false));
    /// assert_eq!(weak.is_in(r#"W/"abc""#), Ok(true));
    /// assert_eq!(weak.is_in("*"), Ok(true));
    /// ```
    pub fn is_in(&self, header: &str) -> Result<bool, ParseError> {
        Ok(match EntityTagList::parse(header)? {
            EntityTagList::Any => true,
            EntityTagList::Tags(tags) => tags.contains(self),
        })
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            f.write_str("W/")?;
        }
        write!(f, "\"{}\"", self.value)
    }
}

/// An error encountered while parsing an entity tag list. Offsets are byte offsets into the
/// header value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of entity tag list")]
    UnexpectedEnd,
    #[error("unexpected character {found:?} at {offset} where an entity tag was expected")]
    UnexpectedLeadingItemCharacter { found: char, offset: usize },
    #[error("expected '/' after weak prefix, found {found:?} at {offset}")]
    ExpectedSlash { found: char, offset: usize },
    #[error("expected opening quote, found {found:?} at {offset}")]
    ExpectedLeadingQuote { found: char, offset: usize },
    #[error("expected ',' between entity tags, found {found:?} at {offset}")]
    ExpectedComma { found: char, offset: usize },
    #[error("unexpected {found:?} at {offset} after wildcard")]
    InvalidWildcard { found: char, offset: usize },
}

/// A parsed `If-Match` or `If-None-Match` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityTagList {
    /// The wildcard `*`.
    Any,
    /// Zero or more listed tags.
    Tags(Vec<EntityTag>),
}

impl EntityTagList {
    /// Parse a comma separated list of entity tags, or the wildcard.
    ///
    /// An empty (or all whitespace) value is an empty list.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut chars = input.char_indices().peekable();
        skip_ws(&mut chars);

        match chars.peek() {
            None => return Ok(EntityTagList::Tags(Vec::new())),
            Some(&(_, '*')) => {
                chars.next();
                skip_ws(&mut chars);
                return match chars.next() {
                    None => Ok(EntityTagList::Any),
                    Some((offset, found)) => Err(ParseError::InvalidWildcard { found, offset }),
                };
            }
            Some(_) => {}
        }

        let mut tags = Vec::new();
        loop {
            tags.push(parse_item(input, &mut chars)?);

            skip_ws(&mut chars);
            match chars.next() {
                None => return Ok(EntityTagList::Tags(tags)),
                Some((_, ',')) => {}
                Some((offset, found)) => return Err(ParseError::ExpectedComma { found, offset }),
            }

            skip_ws(&mut chars);
            if chars.peek().is_none() {
                return Err(ParseError::UnexpectedEnd);
            }
        }
    }

    /// Returns `true` if the wildcard or any listed tag satisfies `eq` against `tag`.
    pub fn matches<F>(&self, tag: &EntityTag, eq: F) -> bool
    where
        F: Fn(&EntityTag, &EntityTag) -> bool,
    {
        match self {
            EntityTagList::Any => true,
            EntityTagList::Tags(tags) => tags.iter().any(|t| eq(t, tag)),
        }
    }
}

type Chars<'a> = Peekable<CharIndices<'a>>;

fn skip_ws(chars: &mut Chars<'_>) {
    while let Some(&(_, ' ')) | Some(&(_, '\t')) = chars.peek() {
        chars.next();
    }
}

fn parse_item(input: &str, chars: &mut Chars<'_>) -> Result<EntityTag, ParseError> {
    let weak = match chars.next() {
        None => return Err(ParseError::UnexpectedEnd),
        Some((_, '"')) => false,
        Some((_, 'W')) => {
            match chars.next() {
                None => return Err(ParseError::UnexpectedEnd),
                Some((_, '/')) => {}
                Some((offset, found)) => return Err(ParseError::ExpectedSlash { found, offset }),
            }
            match chars.next() {
                None => return Err(ParseError::UnexpectedEnd),
                Some((_, '"')) => {}
                Some((offset, found)) => {
                    return Err(ParseError::ExpectedLeadingQuote { found, offset })
                }
            }
            true
        }
        Some((offset, found)) => {
            return Err(ParseError::UnexpectedLeadingItemCharacter { found, offset })
        }
    };

    let start = match chars.peek() {
        Some(&(i, _)) => i,
        None => return Err(ParseError::UnexpectedEnd),
    };

    for (i, c) in chars {
        if c == '"' {
            let value = input[start..i].to_owned();
            return Ok(EntityTag { value, weak });
        }
    }

    Err(ParseError::UnexpectedEnd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong(v: &str) -> EntityTag {
        EntityTag::strong(v).unwrap()
    }

    fn weak(v: &str) -> EntityTag {
        EntityTag::weak(v).unwrap()
    }

    #[test]
    fn tag_construction_rejects_quotes_and_spaces() {
        assert!(EntityTag::strong("").is_some());
        assert!(EntityTag::strong("*").is_some());
        assert!(EntityTag::strong("a\"b").is_none());
        assert!(EntityTag::strong("a b").is_none());
        assert_eq!(weak("w").to_string(), r#"W/"w""#);
        assert_eq!(strong("s").to_string(), r#""s""#);
    }

    #[test]
    fn comparisons() {
        assert!(strong("a").strong_eq(&strong("a")));
        assert!(!strong("a").strong_eq(&weak("a")));
        assert!(!weak("a").strong_eq(&weak("a")));
        assert!(weak("a").weak_eq(&strong("a")));
        assert!(!weak("a").weak_eq(&strong("b")));
    }

    #[test]
    fn empty_and_wildcard() {
        let tag = strong("abc");
        assert_eq!(tag.is_in(""), Ok(false));
        assert_eq!(tag.is_in("   "), Ok(false));
        assert_eq!(tag.is_in("*"), Ok(true));
        assert_eq!(tag.is_in("  *  "), Ok(true));
        assert_eq!(strong("*").is_in(r#""*""#), Ok(true));
        assert_eq!(strong("abc").is_in(r#""*""#), Ok(false));
    }

    #[test]
    fn list_membership() {
        let tag = strong("abc");
        assert_eq!(tag.is_in(r#""x", "abc""#), Ok(true));
        assert_eq!(tag.is_in(r#""x",W/"abc""#), Ok(false));
        assert_eq!(tag.is_in(r#"  "x" ,  "abc"  "#), Ok(true));

        let empty = strong("");
        assert_eq!(empty.is_in(r#"W/"", "abc", W/"""#), Ok(false));
        assert_eq!(empty.is_in(r#"W/"", """#), Ok(true));
    }

    #[test]
    fn parse_errors() {
        use ParseError::*;

        let cases: &[(&str, ParseError)] = &[
            ("xx", UnexpectedLeadingItemCharacter { found: 'x', offset: 0 }),
            ("\"xx", UnexpectedEnd),
            ("S/\"xx\"", UnexpectedLeadingItemCharacter { found: 'S', offset: 0 }),
            ("w/\"xx\"", UnexpectedLeadingItemCharacter { found: 'w', offset: 0 }),
            ("W\"xx\"", ExpectedSlash { found: '"', offset: 1 }),
            ("W /\"xx\"", ExpectedSlash { found: ' ', offset: 1 }),
            ("W/xx", ExpectedLeadingQuote { found: 'x', offset: 2 }),
            ("W/ \"xx\"", ExpectedLeadingQuote { found: ' ', offset: 2 }),
            ("W/*", ExpectedLeadingQuote { found: '*', offset: 2 }),
            ("W/", UnexpectedEnd),
            ("\"xx\" \"yy\"", ExpectedComma { found: '"', offset: 5 }),
            ("\"xx\" yy", ExpectedComma { found: 'y', offset: 5 }),
            ("\"xx\",", UnexpectedEnd),
            ("\"xx\",   ", UnexpectedEnd),
            ("*, \"xx\"", InvalidWildcard { found: ',', offset: 1 }),
            ("* \"*\"", InvalidWildcard { found: '"', offset: 2 }),
            ("\"xx\", * ", UnexpectedLeadingItemCharacter { found: '*', offset: 6 }),
        ];

        for (input, expected) in cases {
            assert_eq!(
                EntityTagList::parse(input).as_ref(),
                Err(expected),
                "input: {:?}",
                input
            );
        }
    }

    #[test]
    fn parses_weak_and_strong_items() {
        let list = EntityTagList::parse(r#"W/"a", "b""#).unwrap();
        assert_eq!(list, EntityTagList::Tags(vec![weak("a"), strong("b")]));

        assert!(list.matches(&strong("a"), EntityTag::weak_eq));
        assert!(!list.matches(&strong("a"), EntityTag::strong_eq));
        assert!(EntityTagList::Any.matches(&weak("z"), EntityTag::strong_eq));
    }
}
