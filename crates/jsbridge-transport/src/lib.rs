//! JsBridge Transport - the two one-way channels between native and script
//!
//! ```text
//! native ──► ScriptInjector ──► "<ns>._handleRequestFromNative(\"…\");" ──► WebView::evaluate_script
//! script ──► navigation to gl://request/<json> ──► SchemeRouter::classify ──► InboundSignal
//! ```
//!
//! Neither direction has framing or acknowledgement. Correlation lives one
//! layer up, in `jsbridge-core`.

pub mod channel;
pub mod scheme;
pub mod script;

use std::rc::Rc;

pub use channel::{ChannelWebView, ScriptBus};
pub use scheme::{
    InboundSignal, PageLoadStatus, SchemeRouter, DEFAULT_SCHEME, PAGE_LOADED_NAMESPACE,
    REQUEST_NAMESPACE, RESPONSE_NAMESPACE,
};
pub use script::{
    escape_for_script_literal, unescape_script_literal, ScriptInjector, DEFAULT_NAMESPACE,
    REQUEST_ENTRY_POINT, RESPONSE_ENTRY_POINT,
};

/// The outbound primitive a host web view provides: run a script statement.
///
/// Implementations must not block and must not call back into the bridge
/// synchronously; script output comes back later as a navigation.
pub trait WebView {
    fn evaluate_script(&self, script: &str);
}

impl<T: WebView + ?Sized> WebView for Rc<T> {
    fn evaluate_script(&self, script: &str) {
        (**self).evaluate_script(script)
    }
}

impl<T: WebView + ?Sized> WebView for Box<T> {
    fn evaluate_script(&self, script: &str) {
        (**self).evaluate_script(script)
    }
}

/// What the host should do with an intercepted navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    /// A bridge signal; the web view must not load it
    Handled,
    /// A real URL; let the host navigation policy load it
    Proceed,
}
