//! The per-request state machine.
//!
//! A [RequestProcessor] is created for every inbound request and driven by the protocol
//! layer's events: [on_head](RequestProcessor::on_head) once, then
//! [on_chunk](RequestProcessor::on_chunk) for every body chunk in arrival order, then
//! [on_end](RequestProcessor::on_end). Any of them may finish the request early with a
//! [Terminal], which is handed to [emit](RequestProcessor::emit). A processor is never reused.
use super::{
    body::Accumulator,
    declaration::Declaration,
    handler::Input,
    incident::{Incident, IncidentChain},
    matcher::{select, Filter, Selection, Verdict},
    path::UrlPath,
    precondition::{Conditions, Outcome},
    query::QueryItem,
    reply::ResponseContent,
    tree::RouteTree,
    BoxError, Response,
};
use futures::FutureExt;
use headers::{ContentLength, HeaderMapExt};
use hyper::{
    body::HttpBody,
    header::{HeaderValue, CONNECTION},
    http::request::Parts,
    Body, Method, Request, StatusCode, Version,
};
use std::{mem, net::SocketAddr, panic::AssertUnwindSafe, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// A misuse of the processor protocol, or a handler that panicked.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("request already completed")]
    AlreadyCompleted,
    #[error("request was aborted")]
    Aborted,
    #[error("request head not yet processed")]
    AwaitingHead,
    #[error("request head already processed")]
    HeadReceived,
    #[error("handler panicked")]
    HandlerPanicked,
}

/// How a request ends.
#[derive(Debug)]
pub enum Terminal {
    Content(ResponseContent),
    Incident(Incident),
}

impl From<Incident> for Terminal {
    #[inline]
    fn from(i: Incident) -> Self {
        Terminal::Incident(i)
    }
}

#[inline]
fn misuse(e: ProcessorError) -> Terminal {
    Terminal::Incident(Incident::processing(e))
}

struct Selected {
    declaration: Arc<Declaration>,
    input: Input,
    accumulator: Accumulator,
    /// Replaces the incident chain if the handler reports a miss.
    misses: Option<IncidentChain>,
}

enum State {
    AwaitingHead,
    AwaitingBody(Box<Selected>),
    Complete,
    Aborted,
}

/// Drives one request from head to response.
pub struct RequestProcessor {
    tree: Arc<RouteTree>,
    default_limit: u64,
    remote_addr: SocketAddr,
    state: State,
    method: Method,
    version: Version,
    conditions: Conditions,
    incidents: IncidentChain,
}

impl RequestProcessor {
    /// A processor resolving against `tree`. Declarations that accept a body without
    /// declaring a limit are held to `default_limit` bytes.
    pub fn new(tree: Arc<RouteTree>, default_limit: u64, remote_addr: SocketAddr) -> Self {
        Self {
            tree,
            default_limit,
            remote_addr,
            state: State::AwaitingHead,
            method: Method::GET,
            version: Version::HTTP_11,
            conditions: Conditions::default(),
            incidents: IncidentChain::default(),
        }
    }

    /// Returns `true` once the request has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, State::Complete | State::Aborted)
    }

    /// Process the request head: resolve the route, run matchers and overload resolution,
    /// and prepare body accumulation for the selected declaration.
    pub fn on_head(&mut self, head: Parts) -> Option<Terminal> {
        if !matches!(self.state, State::AwaitingHead) {
            return Some(misuse(ProcessorError::HeadReceived));
        }
        self.state = State::Complete;
        self.method = head.method.clone();
        self.version = head.version;

        let path = UrlPath::parse(head.uri.path());
        let items = QueryItem::parse_all(head.uri.query().unwrap_or(""));
        let resolution = self.tree.resolve(&path, &head.method);
        self.incidents = resolution.incidents;

        let mut verdicts = Vec::with_capacity(resolution.candidates.len());
        let mut values = Vec::with_capacity(resolution.candidates.len());

        for c in &resolution.candidates {
            let d = &c.declaration;

            let filter = match &d.subpath {
                Some(f) => f(&c.subpath),
                None => Filter::Accepted(c.subpath.clone()),
            }
            .and_then(|sub| d.query.apply(&items).map(|q| (sub, q)))
            .and_then(|(sub, q)| d.header.apply(&head.headers).map(|h| (sub, q, h)));

            verdicts.push(Verdict::of(&filter, d.is_specific()));
            values.push(filter.accepted());
        }

        let index = match select(&verdicts) {
            Selection::One(i) => i,
            Selection::Unmatched => {
                debug!(method = %head.method, path = %path, "no declaration matched");
                return Some(Incident::NoResponse.into());
            }
            Selection::Ambiguous => {
                warn!(
                    method = %head.method,
                    path = %path,
                    candidates = verdicts.len(),
                    "ambiguous request: overlapping declarations accept it",
                );
                return Some(Incident::AmbiguousRequest.into());
            }
        };

        let selected = (resolution.candidates.into_iter().nth(index))
            .zip(values.into_iter().nth(index).flatten());
        let (candidate, (subpath, query, header)) = match selected {
            Some(selected) => selected,
            None => return Some(Incident::NoResponse.into()),
        };
        let declaration = candidate.declaration;
        self.incidents = candidate.incidents;
        let misses = declaration.falls_through.then(|| candidate.misses);

        debug!(method = %head.method, path = %path, subpath = %subpath, "selected declaration");

        self.conditions = Conditions::from_headers(&head.headers);
        if let Some(validator) = &declaration.validator {
            match self.conditions.evaluate(&self.method, validator) {
                // settled against the declared validator; content validators are not consulted
                Outcome::Proceed => self.conditions = Conditions::default(),
                Outcome::NotModified => {
                    let content = ResponseContent::not_modified(validator.clone());
                    return Some(Terminal::Content(content));
                }
                Outcome::PreconditionFailed => {
                    return Some(Incident::UnsatisfiablePrecondition.into());
                }
            }
        }

        let accumulator = declaration.body.accumulator(self.default_limit);
        if let Some(ContentLength(len)) = head.headers.typed_get::<ContentLength>() {
            if let Err(e) = accumulator.check_length(len) {
                debug!(content_length = len, error = %e, "rejecting request body up front");
                return Some(Incident::from(e).into());
            }
        }

        let input = Input {
            method: head.method,
            uri: head.uri,
            version: head.version,
            headers: head.headers,
            remote_addr: self.remote_addr,
            subpath,
            query,
            header,
            body: Default::default(),
        };

        self.state = State::AwaitingBody(Box::new(Selected {
            declaration,
            input,
            accumulator,
            misses,
        }));
        None
    }

    /// Feed the next body chunk. Chunks arriving after the request completed are discarded.
    pub fn on_chunk(&mut self, chunk: bytes::Bytes) -> Option<Terminal> {
        let selected = match &mut self.state {
            State::AwaitingBody(selected) => selected,
            State::AwaitingHead => return Some(misuse(ProcessorError::AwaitingHead)),
            State::Complete | State::Aborted => {
                trace!(len = chunk.len(), "discarding body chunk");
                return None;
            }
        };

        if let Err(e) = selected.accumulator.push(chunk) {
            debug!(error = %e, "request body rejected");
            self.state = State::Complete;
            return Some(Incident::from(e).into());
        }
        None
    }

    /// Finish the body and run the selected handler, applying preconditions to its content.
    pub async fn on_end(&mut self) -> Terminal {
        let selected = match mem::replace(&mut self.state, State::Complete) {
            State::AwaitingBody(selected) => *selected,
            State::AwaitingHead => return misuse(ProcessorError::AwaitingHead),
            State::Complete => return misuse(ProcessorError::AlreadyCompleted),
            State::Aborted => {
                self.state = State::Aborted;
                return misuse(ProcessorError::Aborted);
            }
        };

        let Selected {
            declaration,
            mut input,
            accumulator,
            misses,
        } = selected;

        input.body = match accumulator.finish() {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to finish request body");
                return Incident::from(e).into();
            }
        };

        let handled = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            declaration.handler.handle(input)
        })) {
            Ok(fut) => (AssertUnwindSafe(fut).catch_unwind().await)
                .unwrap_or_else(|_| Err(ProcessorError::HandlerPanicked.into())),
            Err(_) => Err(BoxError::from(ProcessorError::HandlerPanicked)),
        };

        let content = match handled {
            Ok(Some(content)) => content,
            Ok(None) => {
                if let Some(misses) = misses {
                    self.incidents = misses;
                }
                return Incident::NoResponse.into();
            }
            Err(e) => {
                error!(error = %e, "request processing failed");
                return Incident::processing(e).into();
            }
        };

        if !content.status().is_success() || self.conditions.is_empty() {
            return Terminal::Content(content);
        }

        match self.conditions.evaluate(&self.method, &content.validator()) {
            Outcome::Proceed => Terminal::Content(content),
            Outcome::NotModified => Terminal::Content(content.into_not_modified()),
            Outcome::PreconditionFailed => Incident::UnsatisfiablePrecondition.into(),
        }
    }

    /// The connection went away: drop any accumulated state without completing.
    pub fn abort(&mut self) {
        if !matches!(self.state, State::Complete) {
            trace!("request aborted");
            self.state = State::Aborted;
        }
    }

    /// Turn a terminal outcome into a response, consulting incident handlers nearest first.
    ///
    /// A handler whose content cannot be opened counts as declining, and the next one is
    /// consulted.
    pub async fn emit(self, terminal: Terminal) -> Response {
        let RequestProcessor {
            method,
            version,
            incidents,
            ..
        } = self;
        let head = method == Method::HEAD;

        let incident = match terminal {
            Terminal::Content(content) => match prepare(head, content).render().await {
                Ok(resp) => return finish(resp, version, false),
                Err(e) => {
                    error!(error = %e, "failed to open response body");
                    Incident::processing(e)
                }
            },
            Terminal::Incident(incident) => incident,
        };

        let resp = respond(&incidents, head, &incident).await;
        finish(resp, version, incident.closes_connection())
    }
}

fn prepare(head: bool, content: ResponseContent) -> ResponseContent {
    match head {
        true => content.into_head(),
        false => content,
    }
}

async fn respond(incidents: &IncidentChain, head: bool, incident: &Incident) -> Response {
    for content in incidents.responses(incident) {
        match prepare(head, content).render().await {
            Ok(resp) => return resp,
            Err(e) => debug!(
                status = %incident.status(),
                error = %e,
                "incident content unavailable, trying the next handler",
            ),
        }
    }
    bare(incident.status())
}

fn finish(mut resp: Response, version: Version, close: bool) -> Response {
    if close && version <= Version::HTTP_11 {
        (resp.headers_mut()).insert(CONNECTION, HeaderValue::from_static("close"));
    }
    resp
}

fn bare(status: StatusCode) -> Response {
    let mut resp = hyper::Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

/// Process a complete hyper request against `tree`.
pub async fn dispatch(
    tree: Arc<RouteTree>,
    default_limit: u64,
    req: Request<Body>,
    remote_addr: SocketAddr,
) -> Response {
    let (head, mut body) = req.into_parts();
    let mut processor = RequestProcessor::new(tree, default_limit, remote_addr);

    if let Some(terminal) = processor.on_head(head) {
        return processor.emit(terminal).await;
    }

    while let Some(chunk) = body.data().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "request body failed");
                processor.abort();
                return processor.emit(Incident::ClientError.into()).await;
            }
        };

        if let Some(terminal) = processor.on_chunk(chunk) {
            return processor.emit(terminal).await;
        }
    }

    let terminal = processor.on_end().await;
    processor.emit(terminal).await
}
