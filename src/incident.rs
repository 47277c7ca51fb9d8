//! Incidents: exceptional routing and processing outcomes, and the handler chains that
//! turn them into responses.
use super::{body::BodyError, reply::ResponseContent};
use hyper::StatusCode;
use std::{error::Error, fmt, sync::Arc};
use thiserror::Error;

/// A named exceptional outcome of routing or processing a request.
#[derive(Clone, Debug, Error)]
pub enum Incident {
    /// The request body exceeded the selected declaration's limit.
    #[error("request body too large")]
    ByteLimitExceeded,
    /// No declaration produced a response.
    #[error("no response")]
    NoResponse,
    /// More than one declaration accepted the request.
    #[error("ambiguous request")]
    AmbiguousRequest,
    /// A handler or body consumer failed.
    #[error("request processing error: {}", .0)]
    RequestProcessingError(Arc<dyn Error + Send + Sync>),
    /// A conditional request header was not satisfied.
    #[error("unsatisfiable precondition")]
    UnsatisfiablePrecondition,
    /// The client broke off or sent an unreadable request body.
    #[error("client error")]
    ClientError,
}

impl Incident {
    /// Wrap an arbitrary error as a processing error.
    pub fn processing<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Incident::RequestProcessingError(Arc::from(e.into()))
    }

    /// The status emitted when no handler supplies content.
    pub fn status(&self) -> StatusCode {
        match self {
            Incident::ByteLimitExceeded => StatusCode::PAYLOAD_TOO_LARGE,
            Incident::NoResponse => StatusCode::NOT_FOUND,
            Incident::AmbiguousRequest => StatusCode::BAD_REQUEST,
            Incident::RequestProcessingError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Incident::UnsatisfiablePrecondition => StatusCode::PRECONDITION_FAILED,
            Incident::ClientError => StatusCode::BAD_REQUEST,
        }
    }

    /// Returns `true` if the connection should not be reused after this incident.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            Incident::ByteLimitExceeded
                | Incident::RequestProcessingError(_)
                | Incident::ClientError
        )
    }
}

impl From<BodyError> for Incident {
    fn from(e: BodyError) -> Self {
        match e {
            BodyError::LimitExceeded { .. } => Incident::ByteLimitExceeded,
            e => Incident::processing(e),
        }
    }
}

/// A function from incident to optional replacement content.
pub type IncidentHandler = Arc<dyn Fn(&Incident) -> Option<ResponseContent> + Send + Sync>;

/// Incident handlers applicable to a request, nearest first.
#[derive(Clone, Default)]
pub struct IncidentChain {
    handlers: Vec<IncidentHandler>,
}

impl IncidentChain {
    pub(crate) fn nearest_first<I: IntoIterator<Item = IncidentHandler>>(handlers: I) -> Self {
        let handlers = handlers.into_iter().collect();
        Self { handlers }
    }

    /// Prepend more specific handlers to this chain.
    pub(crate) fn within<'a, I>(&self, nearer: I) -> Self
    where
        I: IntoIterator<Item = &'a IncidentHandler>,
    {
        let handlers = (nearer.into_iter().cloned())
            .chain(self.handlers.iter().cloned())
            .collect();
        Self { handlers }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The first content any handler supplies, or a status-only response.
    pub fn respond(&self, incident: &Incident) -> ResponseContent {
        (self.responses(incident).next())
            .unwrap_or_else(|| ResponseContent::empty(incident.status()))
    }

    /// The content of every handler that answers `incident`, nearest first. Handlers are
    /// called lazily.
    pub fn responses<'a>(
        &'a self,
        incident: &'a Incident,
    ) -> impl Iterator<Item = ResponseContent> + Send + 'a {
        (self.handlers.iter()).filter_map(move |h| h(incident))
    }
}

impl fmt::Debug for IncidentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidentChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
