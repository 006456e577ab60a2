//! Handler registry
//!
//! Named handlers plus one distinguished default slot. Registration
//! overwrites; a name that was never registered resolves to the default.

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use jsbridge_types::Response;

/// Something the script side can call.
///
/// `handle` runs on the UI thread. It may answer through the responder now,
/// later, or never.
pub trait BridgeHandler {
    fn handle(&self, data: String, responder: Responder);
}

impl<F> BridgeHandler for F
where
    F: Fn(String, Responder),
{
    fn handle(&self, data: String, responder: Responder) {
        self(data, responder)
    }
}

/// Where a `Responder` delivers its answer
pub trait ResponseSink {
    fn send_response(&self, response: Response);
}

/// One-shot reply channel handed to a handler.
///
/// Consumed by [`Responder::respond`], so a request is answered at most once.
/// A responder for a request without an id discards the answer.
pub struct Responder {
    target: Option<(String, Weak<dyn ResponseSink>)>,
}

impl Responder {
    pub fn new(id: impl Into<String>, sink: Weak<dyn ResponseSink>) -> Self {
        Self {
            target: Some((id.into(), sink)),
        }
    }

    /// A responder whose answers go nowhere
    pub fn noop() -> Self {
        Self { target: None }
    }

    pub fn expects_response(&self) -> bool {
        self.target.is_some()
    }

    /// Correlation id of the request being answered
    pub fn id(&self) -> Option<&str> {
        self.target.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn respond(self, data: impl Into<String>) {
        let Some((id, sink)) = self.target else {
            return;
        };
        match sink.upgrade() {
            Some(sink) => sink.send_response(Response::new(id, data)),
            None => tracing::debug!(id = %id, "bridge dropped before handler responded"),
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder").field("id", &self.id()).finish()
    }
}

/// Default handler of a fresh bridge: logs and answers nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl BridgeHandler for NoopHandler {
    fn handle(&self, data: String, responder: Responder) {
        tracing::debug!(
            id = ?responder.id(),
            len = data.len(),
            "request reached the no-op default handler"
        );
    }
}

/// Outcome of handler resolution
pub enum Route {
    /// The registered handler for the requested name
    Named(Rc<dyn BridgeHandler>),
    /// The default handler (no name, or an unregistered one)
    Fallback(Rc<dyn BridgeHandler>),
    /// No named match and the default was cleared
    Unroutable,
}

impl Route {
    pub fn into_handler(self) -> Option<Rc<dyn BridgeHandler>> {
        match self {
            Route::Named(handler) | Route::Fallback(handler) => Some(handler),
            Route::Unroutable => None,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Route::Named(_))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Route::Named(_) => "Named",
            Route::Fallback(_) => "Fallback",
            Route::Unroutable => "Unroutable",
        })
    }
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Rc<dyn BridgeHandler>>,
    default: Option<Rc<dyn BridgeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: Some(Rc::new(NoopHandler)),
        }
    }

    /// Register `handler` under `name`, replacing any previous one.
    ///
    /// Returns `false` (and registers nothing) for an empty name, which
    /// could never be reached.
    pub fn register(&mut self, name: impl Into<String>, handler: Rc<dyn BridgeHandler>) -> bool {
        let name = name.into();
        if name.is_empty() {
            tracing::warn!("ignoring handler registered under an empty name");
            return false;
        }
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::debug!(handler = %name, "handler replaced");
        }
        true
    }

    pub fn register_all<N, I>(&mut self, handlers: I) -> usize
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Rc<dyn BridgeHandler>)>,
    {
        handlers
            .into_iter()
            .map(|(name, handler)| self.register(name, handler))
            .filter(|registered| *registered)
            .count()
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn set_default(&mut self, handler: Rc<dyn BridgeHandler>) {
        self.default = Some(handler);
    }

    /// Remove the default handler; unmatched requests are then dropped
    pub fn clear_default(&mut self) {
        self.default = None;
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every named handler and the default
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.default = None;
    }

    pub fn resolve(&self, name: Option<&str>) -> Route {
        if let Some(handler) = name.and_then(|n| self.handlers.get(n)) {
            return Route::Named(Rc::clone(handler));
        }
        match &self.default {
            Some(handler) => Route::Fallback(Rc::clone(handler)),
            None => Route::Unroutable,
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
