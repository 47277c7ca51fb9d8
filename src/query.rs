//! Query items and the matchers that accept or reject them.
use super::matcher::Filter;
use percent_encoding::percent_decode_str;
use std::{fmt, str::FromStr, sync::Arc};

/// A single `name[=value]` item of a url query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryItem {
    pub name: String,
    /// `None` if the item has no `=`.
    pub value: Option<String>,
}

#[inline]
fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}

impl QueryItem {
    pub fn new<N: Into<String>>(name: N, value: Option<String>) -> Self {
        let name = name.into();
        Self { name, value }
    }

    /// Split a raw query into decoded items. Empty items (`a=1&&b=2`) are skipped.
    ///
    /// ```
    /// use arbor::query::QueryItem;
    ///
    /// let items = QueryItem::parse_all("a=1&flag&b=x%20y");
    /// assert_eq!(items[0], QueryItem::new("a", Some("1".into())));
    /// assert_eq!(items[1], QueryItem::new("flag", None));
    /// assert_eq!(items[2], QueryItem::new("b", Some("x y".into())));
    /// ```
    pub fn parse_all(query: &str) -> Vec<QueryItem> {
        (query.split('&'))
            .filter(|s| !s.is_empty())
            .map(|s| match s.find('=') {
                Some(i) => QueryItem::new(decode(&s[..i]), Some(decode(&s[i + 1..]))),
                None => QueryItem::new(decode(s), None),
            })
            .collect()
    }
}

/// An ordered collection of query items captured by a matcher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryItems(Vec<QueryItem>);

impl QueryItems {
    /// Returns the value of the first item called `name`. An item present without a value
    /// yields `""`.
    pub fn get(&self, name: &str) -> Option<&str> {
        (self.0.iter())
            .find(|i| i.name == name)
            .map(|i| i.value.as_deref().unwrap_or(""))
    }

    /// Parse the value of `name`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|i| i.name == name)
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, QueryItem> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<QueryItem>> for QueryItems {
    #[inline]
    fn from(items: Vec<QueryItem>) -> Self {
        Self(items)
    }
}

/// The value a query matcher produced for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryValue {
    /// The matcher captured nothing.
    None,
    /// Named items.
    Items(QueryItems),
    /// A single value derived by a custom matcher.
    Text(String),
}

impl Default for QueryValue {
    #[inline]
    fn default() -> Self {
        QueryValue::None
    }
}

impl QueryValue {
    /// Returns the value of item `name` if items were captured.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            QueryValue::Items(items) => items.get(name),
            _ => None,
        }
    }

    /// Parse the value of item `name`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    pub fn items(&self) -> Option<&QueryItems> {
        match self {
            QueryValue::Items(items) => Some(items),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            QueryValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for QueryValue {
    #[inline]
    fn from(s: String) -> Self {
        QueryValue::Text(s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ItemKind {
    Required,
    Optional,
    Flag,
}

type Check = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone)]
struct ItemSpec {
    name: String,
    kind: ItemKind,
    check: Option<Check>,
}

/// A structured query shape: a set of named items, each required, optional or a flag.
///
/// Items not named in the shape, and repeated items, cause a rejection.
///
/// ```
/// use arbor::query::{QueryItem, QuerySpec};
///
/// let spec = QuerySpec::new()
///     .required_as::<f32>("from")
///     .optional_as::<f32>("to");
///
/// assert!(spec.apply(&QueryItem::parse_all("from=1.5")).is_accepted());
/// assert!(!spec.apply(&QueryItem::parse_all("to=4")).is_accepted());
/// assert!(!spec.apply(&QueryItem::parse_all("from=1&other=3")).is_accepted());
/// ```
#[derive(Clone, Default)]
pub struct QuerySpec {
    items: Vec<ItemSpec>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    fn item(mut self, name: &str, kind: ItemKind, check: Option<Check>) -> Self {
        let name = name.to_owned();
        self.items.push(ItemSpec { name, kind, check });
        self
    }

    /// An item that must be present. A missing value reads as `""`.
    pub fn required(self, name: &str) -> Self {
        self.item(name, ItemKind::Required, None)
    }

    /// An item that may be present.
    pub fn optional(self, name: &str) -> Self {
        self.item(name, ItemKind::Optional, None)
    }

    /// An item that must be present; its value is not inspected.
    pub fn flag(self, name: &str) -> Self {
        self.item(name, ItemKind::Flag, None)
    }

    /// A required item whose value must parse as `T`.
    pub fn required_as<T: FromStr + 'static>(self, name: &str) -> Self {
        self.item(name, ItemKind::Required, Some(check::<T>()))
    }

    /// An optional item whose value, if present, must parse as `T`.
    pub fn optional_as<T: FromStr + 'static>(self, name: &str) -> Self {
        self.item(name, ItemKind::Optional, Some(check::<T>()))
    }

    /// Returns `true` if any item must be present.
    pub fn is_specific(&self) -> bool {
        (self.items.iter()).any(|i| i.kind != ItemKind::Optional)
    }

    /// Match `items` against this shape.
    pub fn apply(&self, items: &[QueryItem]) -> Filter<QueryValue> {
        let mut seen = vec![false; self.items.len()];
        let mut captured = Vec::with_capacity(items.len());

        for item in items {
            let idx = match self.items.iter().position(|s| s.name == item.name) {
                Some(idx) => idx,
                None => return Filter::Rejected,
            };
            if seen[idx] {
                return Filter::Rejected;
            }
            seen[idx] = true;

            let spec = &self.items[idx];
            if spec.kind == ItemKind::Flag {
                captured.push(item.clone());
                continue;
            }

            let value = item.value.clone().unwrap_or_default();
            if let Some(check) = &spec.check {
                if !check(&value) {
                    return Filter::Rejected;
                }
            }
            captured.push(QueryItem::new(item.name.clone(), Some(value)));
        }

        let missing = (self.items.iter().zip(&seen))
            .any(|(spec, seen)| spec.kind != ItemKind::Optional && !seen);
        if missing {
            return Filter::Rejected;
        }

        Filter::Accepted(QueryValue::Items(captured.into()))
    }
}

fn check<T: FromStr + 'static>() -> Check {
    Arc::new(|s: &str| s.parse::<T>().is_ok())
}

type CustomQuery = Arc<dyn Fn(&[QueryItem]) -> Filter<QueryValue> + Send + Sync>;

/// How a declaration constrains the url query.
#[derive(Clone)]
pub enum QueryMatcher {
    /// The query must have no items.
    Empty,
    /// Any query is accepted; every item is captured.
    Any,
    /// A structured shape.
    Items(QuerySpec),
    /// A user supplied matcher.
    Custom(CustomQuery),
}

impl Default for QueryMatcher {
    #[inline]
    fn default() -> Self {
        QueryMatcher::Empty
    }
}

impl QueryMatcher {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[QueryItem]) -> Filter<QueryValue> + Send + Sync + 'static,
    {
        QueryMatcher::Custom(Arc::new(f))
    }

    /// Returns `true` if this matcher outranks unspecific ones during overload resolution.
    pub fn is_specific(&self) -> bool {
        match self {
            QueryMatcher::Empty | QueryMatcher::Any => false,
            QueryMatcher::Items(spec) => spec.is_specific(),
            QueryMatcher::Custom(_) => true,
        }
    }

    pub fn apply(&self, items: &[QueryItem]) -> Filter<QueryValue> {
        match self {
            QueryMatcher::Empty if items.is_empty() => Filter::Accepted(QueryValue::None),
            QueryMatcher::Empty => Filter::Rejected,
            QueryMatcher::Any => Filter::Accepted(QueryValue::Items(items.to_vec().into())),
            QueryMatcher::Items(spec) => spec.apply(items),
            QueryMatcher::Custom(f) => f(items),
        }
    }
}

impl From<QuerySpec> for QueryMatcher {
    #[inline]
    fn from(spec: QuerySpec) -> Self {
        QueryMatcher::Items(spec)
    }
}

impl fmt::Debug for QueryMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMatcher::Empty => f.write_str("Empty"),
            QueryMatcher::Any => f.write_str("Any"),
            QueryMatcher::Items(spec) => {
                let names: Vec<_> = spec.items.iter().map(|i| &i.name).collect();
                f.debug_tuple("Items").field(&names).finish()
            }
            QueryMatcher::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(m: &QueryMatcher, query: &str) -> Option<QueryValue> {
        m.apply(&QueryItem::parse_all(query)).accepted()
    }

    #[test]
    fn parse_all_handles_missing_values_and_plus() {
        let items = QueryItem::parse_all("a&b=&c=1+2&&=x");
        assert_eq!(
            items,
            vec![
                QueryItem::new("a", None),
                QueryItem::new("b", Some("".into())),
                QueryItem::new("c", Some("1 2".into())),
                QueryItem::new("", Some("x".into())),
            ]
        );
        assert!(QueryItem::parse_all("").is_empty());
    }

    #[test]
    fn empty_rejects_any_item() {
        assert_eq!(accepted(&QueryMatcher::Empty, ""), Some(QueryValue::None));
        assert_eq!(accepted(&QueryMatcher::Empty, "a"), None);
    }

    #[test]
    fn any_captures_everything() {
        let v = accepted(&QueryMatcher::Any, "a=1&a=2&b").unwrap();
        let items = v.items().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(v.get("a"), Some("1"));
        assert_eq!(v.get("b"), Some(""));
    }

    #[test]
    fn structured_items() {
        let m: QueryMatcher = QuerySpec::new()
            .required("string")
            .optional_as::<i32>("int")
            .flag("count")
            .into();

        let v = accepted(&m, "string&count&int=02").unwrap();
        assert_eq!(v.get("string"), Some(""));
        assert_eq!(v.parse::<i32>("int"), Some(2));

        // duplicates
        assert_eq!(accepted(&m, "string=a&string=b&count"), None);
        // missing flag
        assert_eq!(accepted(&m, "string=a"), None);
        // unparsable optional
        assert_eq!(accepted(&m, "string=a&count&int"), None);
        // unknown
        assert_eq!(accepted(&m, "string=a&count&x=1"), None);
    }

    #[test]
    fn specificity() {
        assert!(!QueryMatcher::Empty.is_specific());
        assert!(!QueryMatcher::Any.is_specific());
        assert!(!QueryMatcher::from(QuerySpec::new().optional("a")).is_specific());
        assert!(QueryMatcher::from(QuerySpec::new().optional("a").flag("b")).is_specific());
        assert!(QueryMatcher::custom(|_| Filter::Rejected).is_specific());
    }
}
