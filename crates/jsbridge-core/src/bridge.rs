//! The bridge dispatcher
//!
//! Owns the pending-callback table, the correlation counter and the startup
//! queue, and routes inbound signals to handlers or callbacks.
//!
//! ```text
//!            send / call_handler
//!   Booting ───────────────────────► startup queue
//!      │ first pageLoaded: flush queue in order
//!      ▼
//!    Live ─────────────────────────► WebView::evaluate_script
//!      │ destroy()
//!      ▼
//!  Destroyed  (every operation fails, scheme URLs still swallowed)
//! ```
//!
//! No internal borrow is held while handlers, callbacks or listeners run, so
//! they may call back into the bridge.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use flume::{Receiver, Sender};
use jsbridge_transport::{
    InboundSignal, NavigationDecision, PageLoadStatus, SchemeRouter, ScriptInjector, WebView,
};
use jsbridge_types::{BridgeError, BridgeResult, Request, Response};

use crate::config::{BridgeConfig, StartupPolicy};
use crate::context::{BoundThread, ThreadPolicy, UiContext};
use crate::handle::{BridgeCommand, BridgeHandle};
use crate::registry::{BridgeHandler, HandlerRegistry, Responder, ResponseSink};

/// Prefix of correlation ids minted on the native side
pub const CALLBACK_ID_PREFIX: &str = "native_cb";

/// Invoked once with the response data
pub type ResponseCallback = Box<dyn FnOnce(String)>;

/// Notified on the first `pageLoaded` of each navigation
pub type PageLoadListener = Rc<dyn Fn(&PageLoadStatus)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Buffering outbound requests until the script side is ready
    Booting,
    /// Dispatching directly
    Live,
    Destroyed,
}

/// Native half of the bridge, bound to one web view and one UI thread.
///
/// Cloning is cheap and yields another handle to the same bridge.
pub struct Bridge<W: WebView + 'static> {
    inner: Rc<Inner<W>>,
}

struct Inner<W: WebView> {
    web_view: W,
    injector: ScriptInjector,
    router: SchemeRouter,
    context: Arc<dyn UiContext>,
    thread_policy: ThreadPolicy,
    startup_policy: StartupPolicy,

    state: Cell<BridgeState>,
    page_loaded: Cell<bool>,
    last_id: Cell<u64>,
    callbacks: RefCell<HashMap<String, ResponseCallback>>,
    startup_queue: RefCell<Vec<Request>>,
    registry: RefCell<HandlerRegistry>,
    listener: RefCell<Option<PageLoadListener>>,

    marshal_tx: Sender<BridgeCommand>,
    marshal_rx: Receiver<BridgeCommand>,
    closed: Arc<AtomicBool>,
}

impl<W: WebView + 'static> Bridge<W> {
    /// Bridge with default configuration, bound to the calling thread
    pub fn new(web_view: W) -> Self {
        Self::with_config(web_view, &BridgeConfig::default())
    }

    /// Bridge bound to the calling thread
    pub fn with_config(web_view: W, config: &BridgeConfig) -> Self {
        Self::with_context(web_view, config, Arc::new(BoundThread::current()))
    }

    /// Bridge bound to the host's UI context
    pub fn with_context(web_view: W, config: &BridgeConfig, context: Arc<dyn UiContext>) -> Self {
        let (marshal_tx, marshal_rx) = flume::unbounded();
        tracing::debug!(
            scheme = %config.scheme,
            namespace = %config.script_namespace,
            startup_policy = ?config.startup_policy,
            "bridge created"
        );
        Self {
            inner: Rc::new(Inner {
                web_view,
                injector: config.injector(),
                router: config.router(),
                context,
                thread_policy: config.thread_policy,
                startup_policy: config.startup_policy,
                state: Cell::new(BridgeState::Booting),
                page_loaded: Cell::new(false),
                last_id: Cell::new(0),
                callbacks: RefCell::new(HashMap::new()),
                startup_queue: RefCell::new(Vec::new()),
                registry: RefCell::new(HandlerRegistry::new()),
                listener: RefCell::new(None),
                marshal_tx,
                marshal_rx,
                closed: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Fire-and-forget send to the script's default handler
    pub fn send(&self, data: impl Into<String>) -> BridgeResult<()> {
        self.inner.ensure_usable("send")?;
        self.inner.submit(None, data.into(), None)
    }

    /// Send to the script's default handler and receive its answer
    pub fn send_with_response<F>(&self, data: impl Into<String>, callback: F) -> BridgeResult<()>
    where
        F: FnOnce(String) + 'static,
    {
        self.inner.ensure_usable("send")?;
        self.inner.submit(None, data.into(), Some(Box::new(callback)))
    }

    /// Fire-and-forget call of a named script handler.
    ///
    /// An empty name behaves like [`Bridge::send`].
    pub fn call_handler(&self, name: impl Into<String>, data: impl Into<String>) -> BridgeResult<()> {
        self.inner.ensure_usable("call_handler")?;
        self.inner.submit(Some(name.into()), data.into(), None)
    }

    pub fn call_handler_with_response<F>(
        &self,
        name: impl Into<String>,
        data: impl Into<String>,
        callback: F,
    ) -> BridgeResult<()>
    where
        F: FnOnce(String) + 'static,
    {
        self.inner.ensure_usable("call_handler")?;
        self.inner
            .submit(Some(name.into()), data.into(), Some(Box::new(callback)))
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    pub fn register_handler<H>(&self, name: impl Into<String>, handler: H) -> BridgeResult<()>
    where
        H: BridgeHandler + 'static,
    {
        self.inner.ensure_usable("register_handler")?;
        self.inner.registry.borrow_mut().register(name, Rc::new(handler));
        Ok(())
    }

    /// Register several handlers; returns how many were accepted
    pub fn register_handlers<N, I>(&self, handlers: I) -> BridgeResult<usize>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Rc<dyn BridgeHandler>)>,
    {
        self.inner.ensure_usable("register_handlers")?;
        Ok(self.inner.registry.borrow_mut().register_all(handlers))
    }

    /// Returns whether a handler was registered under `name`
    pub fn unregister_handler(&self, name: &str) -> BridgeResult<bool> {
        self.inner.ensure_usable("unregister_handler")?;
        Ok(self.inner.registry.borrow_mut().unregister(name))
    }

    pub fn set_default_handler<H>(&self, handler: H) -> BridgeResult<()>
    where
        H: BridgeHandler + 'static,
    {
        self.inner.ensure_usable("set_default_handler")?;
        self.inner.registry.borrow_mut().set_default(Rc::new(handler));
        Ok(())
    }

    /// Without a default, requests that match no named handler are dropped
    pub fn clear_default_handler(&self) -> BridgeResult<()> {
        self.inner.ensure_usable("clear_default_handler")?;
        self.inner.registry.borrow_mut().clear_default();
        Ok(())
    }

    pub fn set_page_load_listener<L>(&self, listener: L) -> BridgeResult<()>
    where
        L: Fn(&PageLoadStatus) + 'static,
    {
        self.inner.ensure_usable("set_page_load_listener")?;
        *self.inner.listener.borrow_mut() = Some(Rc::new(listener));
        Ok(())
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Entry point for every navigation the web view is about to perform.
    ///
    /// URLs under the bridge scheme are consumed and always reported as
    /// [`NavigationDecision::Handled`], even when they fail to decode or the
    /// bridge is destroyed. Everything else proceeds.
    pub fn should_override_url_loading(&self, url: &str) -> NavigationDecision {
        let Some(classified) = self.inner.router.classify(url) else {
            return NavigationDecision::Proceed;
        };

        let signal = match classified {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(code = e.error_code(), error = %e, "dropping inbound signal");
                return NavigationDecision::Handled;
            }
        };

        if let Err(e) = self.handle_signal(signal) {
            if e.is_dropped_silently() {
                tracing::debug!(code = e.error_code(), error = %e, "inbound signal dropped");
            } else {
                tracing::warn!(code = e.error_code(), error = %e, "inbound signal rejected");
            }
        }
        NavigationDecision::Handled
    }

    /// Typed inbound path, for hosts that deliver signals without URLs
    pub fn handle_signal(&self, signal: InboundSignal) -> BridgeResult<()> {
        tracing::trace!(kind = signal.kind(), "inbound signal");
        match signal {
            InboundSignal::Request(request) => self.on_inbound_request(request),
            InboundSignal::Response(response) => self.on_inbound_response(response),
            InboundSignal::PageLoaded(status) => self.on_page_loaded(status),
        }
    }

    /// Route a script request to a handler.
    ///
    /// Fails with `UnroutableRequest` when neither a named nor a default
    /// handler exists; the request is dropped either way.
    pub fn on_inbound_request(&self, request: Request) -> BridgeResult<()> {
        self.inner.ensure_usable("on_inbound_request")?;

        let route = self
            .inner
            .registry
            .borrow()
            .resolve(request.handler_name.as_deref());
        let Some(handler) = route.into_handler() else {
            return Err(BridgeError::UnroutableRequest {
                handler_name: request.handler_name,
            });
        };

        let responder = match request.id {
            Some(id) => Responder::new(id, self.sink()),
            None => Responder::noop(),
        };
        tracing::debug!(
            handler = ?request.handler_name,
            id = ?responder.id(),
            "dispatching script request"
        );
        handler.handle(request.data.unwrap_or_default(), responder);
        Ok(())
    }

    /// Complete the pending call a script response answers.
    ///
    /// Fails with `UnmatchedResponse` for unknown, late and duplicate ids.
    pub fn on_inbound_response(&self, response: Response) -> BridgeResult<()> {
        self.inner.ensure_usable("on_inbound_response")?;

        let callback = self.inner.callbacks.borrow_mut().remove(&response.id);
        match callback {
            Some(callback) => {
                tracing::debug!(id = %response.id, "response matched");
                callback(response.data.unwrap_or_default());
                Ok(())
            }
            None => Err(BridgeError::UnmatchedResponse { id: response.id }),
        }
    }

    /// The script side finished loading and installed its entry points.
    ///
    /// Only the first signal per navigation counts. It flushes the startup
    /// queue (if still booting) and notifies the page-load listener.
    pub fn on_page_loaded(&self, status: PageLoadStatus) -> BridgeResult<()> {
        self.inner.ensure_usable("on_page_loaded")?;

        if self.inner.page_loaded.replace(true) {
            tracing::debug!(status = status.as_payload(), "repeated pageLoaded ignored");
            return Ok(());
        }

        if self.inner.state.get() == BridgeState::Booting {
            self.inner.state.set(BridgeState::Live);
            let queued = std::mem::take(&mut *self.inner.startup_queue.borrow_mut());
            tracing::info!(
                status = status.as_payload(),
                queued = queued.len(),
                "page loaded, bridge live"
            );
            for request in &queued {
                self.inner.dispatch_request(request)?;
            }
        }

        let listener = self.inner.listener.borrow().clone();
        if let Some(listener) = listener {
            listener(&status);
        }
        Ok(())
    }

    /// The web view started loading a new page
    pub fn on_page_started(&self, url: &str) -> BridgeResult<()> {
        self.inner.ensure_usable("on_page_started")?;
        self.inner.page_loaded.set(false);

        if self.inner.startup_policy == StartupPolicy::RearmOnNavigation
            && self.inner.state.get() == BridgeState::Live
        {
            tracing::debug!(url, "startup queue re-armed");
            self.inner.state.set(BridgeState::Booting);
        }
        Ok(())
    }

    // ========================================================================
    // Marshaling
    // ========================================================================

    /// `Send` handle for submitting work from other threads
    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle::new(
            self.inner.marshal_tx.clone(),
            Arc::clone(&self.inner.context),
            Arc::clone(&self.inner.closed),
        )
    }

    /// Run everything submitted through handles; returns how many calls ran
    pub fn drain_marshaled(&self) -> BridgeResult<usize> {
        self.inner.ensure_usable("drain_marshaled")?;

        let mut count = 0;
        while let Ok(command) = self.inner.marshal_rx.try_recv() {
            let callback = command
                .callback
                .map(|cb| -> ResponseCallback { Box::new(cb) });
            self.inner.submit(command.handler_name, command.data, callback)?;
            count += 1;
        }
        Ok(count)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Release every callback, handler, queued request and listener.
    ///
    /// Afterwards every operation returns `Destroyed`. Idempotent.
    pub fn destroy(&self) -> BridgeResult<()> {
        self.inner
            .thread_policy
            .check(self.inner.context.as_ref(), "destroy")?;
        if self.inner.state.replace(BridgeState::Destroyed) == BridgeState::Destroyed {
            return Ok(());
        }
        self.inner.closed.store(true, Ordering::SeqCst);

        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        let queued = std::mem::take(&mut *self.inner.startup_queue.borrow_mut());
        let listener = self.inner.listener.borrow_mut().take();
        self.inner.registry.borrow_mut().clear();
        let marshaled = self.inner.marshal_rx.drain().count();

        tracing::info!(
            pending = callbacks.len(),
            queued = queued.len(),
            marshaled,
            "bridge destroyed"
        );
        drop((callbacks, queued, listener));
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn state(&self) -> BridgeState {
        self.inner.state.get()
    }

    /// Callbacks still waiting for a response
    pub fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    pub fn queued_requests(&self) -> usize {
        self.inner.startup_queue.borrow().len()
    }

    /// Whether `pageLoaded` arrived for the current navigation
    pub fn is_page_loaded(&self) -> bool {
        self.inner.page_loaded.get()
    }

    pub fn router(&self) -> &SchemeRouter {
        &self.inner.router
    }

    pub fn web_view(&self) -> &W {
        &self.inner.web_view
    }

    fn sink(&self) -> Weak<dyn ResponseSink> {
        let weak: Weak<Inner<W>> = Rc::downgrade(&self.inner);
        weak
    }
}

impl<W: WebView + 'static> Clone for Bridge<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<W: WebView + 'static> fmt::Debug for Bridge<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("page_loaded", &self.is_page_loaded())
            .field("pending_callbacks", &self.pending_callbacks())
            .field("queued_requests", &self.queued_requests())
            .finish()
    }
}

impl<W: WebView> Inner<W> {
    fn ensure_usable(&self, operation: &str) -> BridgeResult<()> {
        self.thread_policy.check(self.context.as_ref(), operation)?;
        if self.state.get() == BridgeState::Destroyed {
            return Err(BridgeError::Destroyed);
        }
        Ok(())
    }

    fn next_callback_id(&self) -> String {
        let n = self.last_id.get() + 1;
        self.last_id.set(n);
        format!("{CALLBACK_ID_PREFIX}_{n}_{}", Utc::now().timestamp_millis())
    }

    fn submit(
        &self,
        handler_name: Option<String>,
        data: String,
        callback: Option<ResponseCallback>,
    ) -> BridgeResult<()> {
        let mut request = Request::new(data);
        if let Some(name) = handler_name {
            request = request.with_handler(name);
        }
        if let Some(callback) = callback {
            let id = self.next_callback_id();
            self.callbacks.borrow_mut().insert(id.clone(), callback);
            request = request.with_id(id);
        }

        match self.state.get() {
            BridgeState::Booting => {
                tracing::debug!(id = ?request.id, handler = ?request.handler_name, "queued until page load");
                self.startup_queue.borrow_mut().push(request);
                Ok(())
            }
            BridgeState::Live => self.dispatch_request(&request),
            BridgeState::Destroyed => Err(BridgeError::Destroyed),
        }
    }

    fn dispatch_request(&self, request: &Request) -> BridgeResult<()> {
        let script = self.injector.request_script(request)?;
        tracing::trace!(id = ?request.id, handler = ?request.handler_name, "injecting request");
        self.web_view.evaluate_script(&script);
        Ok(())
    }

    fn dispatch_response(&self, response: &Response) -> BridgeResult<()> {
        let script = self.injector.response_script(response)?;
        tracing::trace!(id = %response.id, "injecting response");
        self.web_view.evaluate_script(&script);
        Ok(())
    }
}

impl<W: WebView> ResponseSink for Inner<W> {
    fn send_response(&self, response: Response) {
        let result = self
            .ensure_usable("respond")
            .and_then(|()| self.dispatch_response(&response));
        if let Err(e) = result {
            tracing::warn!(id = %response.id, code = e.error_code(), "response not delivered");
        }
    }
}
