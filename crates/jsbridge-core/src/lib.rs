//! JsBridge Core - request/response correlation over a web view
//!
//! The [`Bridge`] turns two one-way primitives (inject a script, intercept a
//! navigation) into calls with replies:
//!
//! - outbound `send` / `call_handler` get a fresh correlation id when a
//!   callback is supplied, and are buffered until the page signals it loaded
//! - inbound requests are routed to named handlers or the default handler
//! - inbound responses complete the matching pending callback exactly once
//!
//! The bridge is single-threaded by construction (`!Send`) and checks a
//! [`UiContext`] on every operation. Other threads use a [`BridgeHandle`].
//!
//! # Example
//!
//! ```
//! use jsbridge_core::{Bridge, Responder};
//! use jsbridge_transport::{NavigationDecision, ScriptBus};
//!
//! let bus = ScriptBus::new();
//! let bridge = Bridge::new(bus.web_view());
//! bridge
//!     .register_handler("greet", |name: String, responder: Responder| {
//!         responder.respond(format!("hello {name}"));
//!     })
//!     .unwrap();
//!
//! bridge.send("queued until load").unwrap();
//! assert_eq!(bus.pending(), 0);
//!
//! let decision = bridge.should_override_url_loading("gl://pageLoaded/ok");
//! assert_eq!(decision, NavigationDecision::Handled);
//! assert_eq!(bus.pending(), 1);
//!
//! let decision = bridge.should_override_url_loading("https://example.com/");
//! assert_eq!(decision, NavigationDecision::Proceed);
//! ```

pub mod bridge;
pub mod config;
pub mod context;
pub mod handle;
pub mod registry;

pub use bridge::{Bridge, BridgeState, PageLoadListener, ResponseCallback, CALLBACK_ID_PREFIX};
pub use config::{BridgeConfig, LoggingConfig, StartupPolicy};
pub use context::{BoundThread, ThreadPolicy, UiContext};
pub use handle::{BridgeCommand, BridgeHandle, SendCallback};
pub use registry::{BridgeHandler, HandlerRegistry, NoopHandler, Responder, ResponseSink, Route};

pub use jsbridge_transport::{InboundSignal, NavigationDecision, PageLoadStatus, WebView};
pub use jsbridge_types::{BridgeError, BridgeResult, Request, Response};
