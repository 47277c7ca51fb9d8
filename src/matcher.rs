//! Match verdicts and overload resolution between competing declarations.

/// The verdict of a single matcher against a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Filter<T> {
    /// The request satisfies the matcher, producing a value.
    Accepted(T),
    /// The request does not satisfy the matcher.
    Rejected,
    /// The request could be read in more than one way the matcher cannot tell apart.
    Ambiguous,
}

impl<T> Filter<T> {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Filter::Accepted(_))
    }

    /// Transform the accepted value.
    #[inline]
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Filter<U> {
        match self {
            Filter::Accepted(t) => Filter::Accepted(f(t)),
            Filter::Rejected => Filter::Rejected,
            Filter::Ambiguous => Filter::Ambiguous,
        }
    }

    /// Chain another matcher, run only if this one accepted.
    #[inline]
    pub fn and_then<U, F: FnOnce(T) -> Filter<U>>(self, f: F) -> Filter<U> {
        match self {
            Filter::Accepted(t) => f(t),
            Filter::Rejected => Filter::Rejected,
            Filter::Ambiguous => Filter::Ambiguous,
        }
    }

    /// Returns the accepted value, if any.
    #[inline]
    pub fn accepted(self) -> Option<T> {
        match self {
            Filter::Accepted(t) => Some(t),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Filter<T> {
    #[inline]
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Filter::Rejected, Filter::Accepted)
    }
}

/// The outcome of matching one candidate, as seen by overload resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Rejected,
    Ambiguous,
    /// `specific` declarations carry a required query item, a custom query matcher or a
    /// header matcher.
    Accepted { specific: bool },
}

impl Verdict {
    pub(crate) fn of<T>(filter: &Filter<T>, specific: bool) -> Self {
        match filter {
            Filter::Accepted(_) => Verdict::Accepted { specific },
            Filter::Rejected => Verdict::Rejected,
            Filter::Ambiguous => Verdict::Ambiguous,
        }
    }
}

/// The declaration chosen for a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Selection {
    /// Nothing accepted.
    Unmatched,
    /// The index of the single winner.
    One(usize),
    /// More than one declaration accepted and none outranks the rest.
    Ambiguous,
}

/// Choose between candidate verdicts.
///
/// One acceptor wins outright. With several, a lone specific acceptor outranks any number
/// of unspecific ones; every other combination is ambiguous.
pub(crate) fn select(verdicts: &[Verdict]) -> Selection {
    if verdicts.contains(&Verdict::Ambiguous) {
        return Selection::Ambiguous;
    }

    let mut accepted = (verdicts.iter().enumerate()).filter_map(|(i, v)| match v {
        Verdict::Accepted { specific } => Some((i, *specific)),
        _ => None,
    });

    let first = match accepted.next() {
        Some(first) => first,
        None => return Selection::Unmatched,
    };

    let rest: Vec<_> = accepted.collect();
    if rest.is_empty() {
        return Selection::One(first.0);
    }

    let mut specific = Some(first).into_iter().chain(rest).filter(|(_, s)| *s);
    match (specific.next(), specific.next()) {
        (Some((i, _)), None) => Selection::One(i),
        _ => Selection::Ambiguous,
    }
}
