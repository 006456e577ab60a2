//! The script half of the bridge
//!
//! Mirrors what the page-side bridge script does: it receives injected
//! statements, parses them back into envelopes and answers by navigating to
//! scheme URLs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use chrono::Utc;
use jsbridge_transport::{PageLoadStatus, SchemeRouter, ScriptInjector, RESPONSE_ENTRY_POINT};
use jsbridge_types::{Request, Response};

use crate::error::{PeerError, PeerResult};

/// Prefix of correlation ids minted on the script side
pub const PEER_CALLBACK_ID_PREFIX: &str = "cb";

pub type PeerCallback = Box<dyn FnOnce(String)>;

type PeerHandler = Box<dyn Fn(String, PeerResponder)>;

#[derive(Clone)]
struct Outbox {
    router: SchemeRouter,
    navigations: Rc<RefCell<Vec<String>>>,
}

impl Outbox {
    fn navigate(&self, url: String) {
        tracing::trace!(url = %url, "script navigation");
        self.navigations.borrow_mut().push(url);
    }
}

/// Reply channel handed to script handlers
pub struct PeerResponder {
    target: Option<(String, Outbox)>,
}

impl PeerResponder {
    pub fn expects_response(&self) -> bool {
        self.target.is_some()
    }

    pub fn respond(self, data: impl Into<String>) {
        let Some((id, outbox)) = self.target else {
            return;
        };
        match outbox.router.response_url(&Response::new(id, data)) {
            Ok(url) => outbox.navigate(url),
            Err(e) => tracing::warn!(error = %e, "could not encode script response"),
        }
    }
}

impl fmt::Debug for PeerResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerResponder")
            .field("id", &self.target.as_ref().map(|(id, _)| id))
            .finish()
    }
}

pub struct ScriptPeer {
    injector: ScriptInjector,
    outbox: Outbox,
    handlers: HashMap<String, PeerHandler>,
    default_handler: Option<PeerHandler>,
    // Some until init
    receive_queue: Option<Vec<Request>>,
    callbacks: HashMap<String, PeerCallback>,
    last_id: u64,
}

impl ScriptPeer {
    pub fn new(injector: ScriptInjector, router: SchemeRouter) -> Self {
        Self {
            injector,
            outbox: Outbox {
                router,
                navigations: Rc::new(RefCell::new(Vec::new())),
            },
            handlers: HashMap::new(),
            default_handler: None,
            receive_queue: Some(Vec::new()),
            callbacks: HashMap::new(),
            last_id: 0,
        }
    }

    /// Install the default handler and dispatch requests received so far
    pub fn init<H>(&mut self, default_handler: H) -> PeerResult<()>
    where
        H: Fn(String, PeerResponder) + 'static,
    {
        if self.default_handler.is_some() {
            return Err(PeerError::AlreadyInitialized);
        }
        self.default_handler = Some(Box::new(default_handler));
        let queued = self.receive_queue.take().unwrap_or_default();
        for request in queued {
            self.dispatch_request(request);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.receive_queue.is_none()
    }

    pub fn register_handler<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: Fn(String, PeerResponder) + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    pub fn send(&mut self, data: impl Into<String>) {
        self.do_send(Request::new(data), None);
    }

    pub fn send_with_response<F>(&mut self, data: impl Into<String>, callback: F)
    where
        F: FnOnce(String) + 'static,
    {
        self.do_send(Request::new(data), Some(Box::new(callback)));
    }

    pub fn call_handler(&mut self, name: impl Into<String>, data: impl Into<String>) {
        self.do_send(Request::new(data).with_handler(name), None);
    }

    pub fn call_handler_with_response<F>(
        &mut self,
        name: impl Into<String>,
        data: impl Into<String>,
        callback: F,
    ) where
        F: FnOnce(String) + 'static,
    {
        self.do_send(Request::new(data).with_handler(name), Some(Box::new(callback)));
    }

    /// Signal that the page finished loading
    pub fn page_loaded(&self, status: PageLoadStatus) {
        self.outbox.navigate(self.outbox.router.page_loaded_url(&status));
    }

    /// Run a statement the native side injected
    pub fn evaluate(&mut self, script: &str) -> PeerResult<()> {
        let (entry, json) = self
            .injector
            .parse_command(script)
            .map_err(PeerError::UnrecognizedScript)?;

        if entry == RESPONSE_ENTRY_POINT {
            let response = Response::decode(&json).map_err(PeerError::Envelope)?;
            match self.callbacks.remove(&response.id) {
                Some(callback) => callback(response.data.unwrap_or_default()),
                None => tracing::debug!(id = %response.id, "no script callback for response"),
            }
            return Ok(());
        }

        let request = Request::decode(&json).map_err(PeerError::Envelope)?;
        match self.receive_queue.as_mut() {
            Some(queue) => queue.push(request),
            None => self.dispatch_request(request),
        }
        Ok(())
    }

    /// Navigations issued since the last call, oldest first
    pub fn take_navigations(&self) -> Vec<String> {
        std::mem::take(&mut *self.outbox.navigations.borrow_mut())
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Requests received before `init`
    pub fn queued_requests(&self) -> usize {
        self.receive_queue.as_ref().map_or(0, Vec::len)
    }

    fn do_send(&mut self, mut request: Request, callback: Option<PeerCallback>) {
        if let Some(callback) = callback {
            self.last_id += 1;
            let id = format!(
                "{PEER_CALLBACK_ID_PREFIX}_{}_{}",
                self.last_id,
                Utc::now().timestamp_millis()
            );
            self.callbacks.insert(id.clone(), callback);
            request = request.with_id(id);
        }
        match self.outbox.router.request_url(&request) {
            Ok(url) => self.outbox.navigate(url),
            Err(e) => tracing::warn!(error = %e, "could not encode script request"),
        }
    }

    fn dispatch_request(&self, request: Request) {
        let handler = match request.handler_name.as_deref() {
            Some(name) => self.handlers.get(name),
            None => self.default_handler.as_ref(),
        };
        let Some(handler) = handler else {
            tracing::warn!(handler = ?request.handler_name, "no script handler, request dropped");
            return;
        };

        let responder = PeerResponder {
            target: request.id.map(|id| (id, self.outbox.clone())),
        };
        handler(request.data.unwrap_or_default(), responder);
    }
}

impl Default for ScriptPeer {
    fn default() -> Self {
        Self::new(ScriptInjector::default(), SchemeRouter::default())
    }
}

impl fmt::Debug for ScriptPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptPeer")
            .field("initialized", &self.is_initialized())
            .field("handlers", &self.handlers.len())
            .field("pending_callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsbridge_transport::InboundSignal;
    use std::cell::Cell;

    fn injected_request(request: &Request) -> String {
        ScriptInjector::default().request_script(request).unwrap()
    }

    fn decode(url: &str) -> InboundSignal {
        SchemeRouter::default().classify(url).unwrap().unwrap()
    }

    #[test]
    fn test_requests_queue_until_init() {
        let mut peer = ScriptPeer::default();
        peer.evaluate(&injected_request(&Request::new("early").with_id("native_cb_1_0")))
            .unwrap();
        assert_eq!(peer.queued_requests(), 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        peer.init(move |data, responder: PeerResponder| {
            log.borrow_mut().push(data.clone());
            responder.respond(format!("re:{data}"));
        })
        .unwrap();

        assert!(peer.is_initialized());
        assert_eq!(*seen.borrow(), vec!["early".to_string()]);
        let navigations = peer.take_navigations();
        assert_eq!(
            decode(&navigations[0]),
            InboundSignal::Response(Response::new("native_cb_1_0", "re:early"))
        );
    }

    #[test]
    fn test_init_twice() {
        let mut peer = ScriptPeer::default();
        peer.init(|_, _| {}).unwrap();
        assert_eq!(peer.init(|_, _| {}), Err(PeerError::AlreadyInitialized));
    }

    #[test]
    fn test_named_request_without_handler_is_dropped() {
        let mut peer = ScriptPeer::default();
        let hit = Rc::new(Cell::new(false));
        let flag = Rc::clone(&hit);
        peer.init(move |_, _| flag.set(true)).unwrap();

        peer.evaluate(&injected_request(&Request::new("x").with_handler("missing")))
            .unwrap();
        assert!(!hit.get());
        assert!(peer.take_navigations().is_empty());
    }

    #[test]
    fn test_call_handler_and_response() {
        let mut peer = ScriptPeer::default();
        let answer = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&answer);
        peer.call_handler_with_response("login", "{\"user\":\"a\"}", move |data| {
            *slot.borrow_mut() = Some(data);
        });

        let navigations = peer.take_navigations();
        let InboundSignal::Request(request) = decode(&navigations[0]) else {
            panic!("expected a request");
        };
        assert_eq!(request.handler_name.as_deref(), Some("login"));
        let id = request.id.clone().unwrap();
        assert!(id.starts_with("cb_1_"));

        let script = ScriptInjector::default()
            .response_script(&Response::new(id, "ok"))
            .unwrap();
        peer.evaluate(&script).unwrap();
        assert_eq!(answer.borrow().as_deref(), Some("ok"));
        assert_eq!(peer.pending_callbacks(), 0);

        // duplicate delivery is ignored
        peer.evaluate(&script).unwrap();
    }

    #[test]
    fn test_page_loaded_navigation() {
        let peer = ScriptPeer::default();
        peer.page_loaded(PageLoadStatus::Ok);
        assert_eq!(peer.take_navigations(), vec!["gl://pageLoaded/ok".to_string()]);
    }

    #[test]
    fn test_evaluate_rejects_garbage() {
        let mut peer = ScriptPeer::default();
        let err = peer.evaluate("console.log('hi');").unwrap_err();
        assert_eq!(err.error_code(), "UNRECOGNIZED_SCRIPT");

        let err = peer
            .evaluate(r#"WebViewJavascriptBridge._handleRequestFromNative("{\"id\":");"#)
            .unwrap_err();
        assert!(matches!(err, PeerError::Envelope(_)));
    }
}
