//! Inbound channel: synthetic navigations under a private URL scheme
//!
//! The script side cannot call native code directly, so it asks the web view
//! to navigate to `gl://<namespace>/<payload>`. Every navigation is passed
//! through [`SchemeRouter::classify`]; anything under the scheme is a bridge
//! signal and must never actually load.

use std::borrow::Cow;

use jsbridge_types::{BridgeError, BridgeResult, Request, Response};

/// Scheme used when none is configured
pub const DEFAULT_SCHEME: &str = "gl";

pub const REQUEST_NAMESPACE: &str = "request";
pub const RESPONSE_NAMESPACE: &str = "response";
pub const PAGE_LOADED_NAMESPACE: &str = "pageLoaded";

/// Outcome the script side reports with `pageLoaded`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLoadStatus {
    Ok,
    /// Anything other than `ok`, with the raw payload
    Failed(String),
}

impl PageLoadStatus {
    pub fn from_payload(payload: &str) -> Self {
        if payload.eq_ignore_ascii_case("ok") {
            PageLoadStatus::Ok
        } else {
            PageLoadStatus::Failed(payload.to_string())
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PageLoadStatus::Ok)
    }

    pub fn as_payload(&self) -> &str {
        match self {
            PageLoadStatus::Ok => "ok",
            PageLoadStatus::Failed(payload) => payload,
        }
    }
}

/// A decoded bridge signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundSignal {
    Request(Request),
    Response(Response),
    PageLoaded(PageLoadStatus),
}

impl InboundSignal {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            InboundSignal::Request(_) => REQUEST_NAMESPACE,
            InboundSignal::Response(_) => RESPONSE_NAMESPACE,
            InboundSignal::PageLoaded(_) => PAGE_LOADED_NAMESPACE,
        }
    }
}

/// Recognizes and builds bridge URLs for one scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeRouter {
    scheme: String,
    prefix: String,
    percent_decode: bool,
}

impl SchemeRouter {
    /// `scheme` without the `://` suffix, e.g. `"gl"`
    pub fn new(scheme: impl Into<String>, percent_decode: bool) -> Self {
        let scheme = scheme.into();
        let prefix = format!("{scheme}://");
        Self {
            scheme,
            prefix,
            percent_decode,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Whether the URL is under the bridge scheme
    pub fn owns(&self, url: &str) -> bool {
        self.strip_scheme(url).is_some()
    }

    /// Classify a navigation.
    ///
    /// `None` means the URL is not ours and should load normally. `Some`
    /// means the navigation must be swallowed, whether or not the signal
    /// decodes.
    pub fn classify(&self, url: &str) -> Option<BridgeResult<InboundSignal>> {
        let rest = self.strip_scheme(url)?;
        Some(self.decode_signal(url, rest))
    }

    fn decode_signal(&self, url: &str, rest: &str) -> BridgeResult<InboundSignal> {
        let (namespace, payload) = rest.split_once('/').unwrap_or((rest, ""));
        let payload = self.decode_payload(payload);

        if namespace.eq_ignore_ascii_case(REQUEST_NAMESPACE) {
            Request::decode(&payload).map(InboundSignal::Request)
        } else if namespace.eq_ignore_ascii_case(RESPONSE_NAMESPACE) {
            Response::decode(&payload).map(InboundSignal::Response)
        } else if namespace.eq_ignore_ascii_case(PAGE_LOADED_NAMESPACE) {
            Ok(InboundSignal::PageLoaded(PageLoadStatus::from_payload(&payload)))
        } else {
            Err(BridgeError::UnknownSignal {
                url: url.to_string(),
            })
        }
    }

    /// URL the script side navigates to for a request
    pub fn request_url(&self, request: &Request) -> BridgeResult<String> {
        Ok(self.url(REQUEST_NAMESPACE, &request.encode()?))
    }

    /// URL the script side navigates to for a response
    pub fn response_url(&self, response: &Response) -> BridgeResult<String> {
        Ok(self.url(RESPONSE_NAMESPACE, &response.encode()?))
    }

    pub fn page_loaded_url(&self, status: &PageLoadStatus) -> String {
        self.url(PAGE_LOADED_NAMESPACE, status.as_payload())
    }

    fn url(&self, namespace: &str, payload: &str) -> String {
        let payload: Cow<'_, str> = if self.percent_decode {
            urlencoding::encode(payload)
        } else {
            Cow::Borrowed(payload)
        };
        format!("{}{namespace}/{payload}", self.prefix)
    }

    fn strip_scheme<'a>(&self, url: &'a str) -> Option<&'a str> {
        let head = url.get(..self.prefix.len())?;
        head.eq_ignore_ascii_case(&self.prefix)
            .then(|| &url[self.prefix.len()..])
    }

    fn decode_payload<'a>(&self, payload: &'a str) -> Cow<'a, str> {
        if !self.percent_decode {
            return Cow::Borrowed(payload);
        }
        match urlencoding::decode(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "payload is not valid percent-encoding, using it verbatim");
                Cow::Borrowed(payload)
            }
        }
    }
}

impl Default for SchemeRouter {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEME, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_urls_are_not_ours() {
        let router = SchemeRouter::default();
        assert!(router.classify("https://example.com/gl://request/").is_none());
        assert!(router.classify("about:blank").is_none());
        assert!(router.classify("gl:/request/{}").is_none());
        assert!(router.classify("").is_none());
    }

    #[test]
    fn test_classify_request() {
        let router = SchemeRouter::new("gl", false);
        let signal = router
            .classify(r#"gl://request/{"id":"cb_1_5","handlerName":"login","data":"x"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            signal,
            InboundSignal::Request(Request::new("x").with_id("cb_1_5").with_handler("login"))
        );
    }

    #[test]
    fn test_classify_percent_encoded_response() {
        let router = SchemeRouter::default();
        let url = "gl://response/%7B%22id%22%3A%22native_cb_1_0%22%2C%22data%22%3A%22a%2Fb%22%7D";
        let signal = router.classify(url).unwrap().unwrap();
        assert_eq!(signal, InboundSignal::Response(Response::new("native_cb_1_0", "a/b")));
    }

    #[test]
    fn test_payload_may_contain_slashes() {
        let router = SchemeRouter::new("gl", false);
        let signal = router
            .classify(r#"gl://response/{"id":"1","data":"http://x/y"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(signal, InboundSignal::Response(Response::new("1", "http://x/y")));
    }

    #[test]
    fn test_scheme_and_namespace_case_insensitive() {
        let router = SchemeRouter::default();
        let signal = router.classify("GL://PageLoaded/ok").unwrap().unwrap();
        assert_eq!(signal, InboundSignal::PageLoaded(PageLoadStatus::Ok));
    }

    #[test]
    fn test_page_loaded_statuses() {
        let router = SchemeRouter::default();
        let failed = router.classify("gl://pageLoaded/error").unwrap().unwrap();
        assert_eq!(
            failed,
            InboundSignal::PageLoaded(PageLoadStatus::Failed("error".to_string()))
        );
        let bare = router.classify("gl://pageLoaded").unwrap().unwrap();
        assert!(matches!(bare, InboundSignal::PageLoaded(ref s) if !s.is_ok()));
    }

    #[test]
    fn test_unknown_namespace_is_swallowed_with_error() {
        let router = SchemeRouter::default();
        let err = router.classify("gl://bogus/whatever").unwrap().unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_SIGNAL");
    }

    #[test]
    fn test_truncated_json_is_malformed() {
        let router = SchemeRouter::new("gl", false);
        let err = router.classify(r#"gl://request/{"id":"#).unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope { .. }));
    }

    #[test]
    fn test_invalid_percent_encoding_used_verbatim() {
        let router = SchemeRouter::default();
        // %FF alone is not UTF-8
        let err = router.classify("gl://request/%FF").unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope { .. }));
    }

    #[test]
    fn test_builders_round_trip() {
        for router in [SchemeRouter::default(), SchemeRouter::new("bridge", false)] {
            let request = Request::new(r#"{"q":"a b/c"}"#).with_id("cb_2_9").with_handler("search");
            let url = router.request_url(&request).unwrap();
            assert!(url.starts_with(&format!("{}://request/", router.scheme())));
            assert_eq!(
                router.classify(&url).unwrap().unwrap(),
                InboundSignal::Request(request)
            );

            let url = router.page_loaded_url(&PageLoadStatus::Ok);
            assert_eq!(
                router.classify(&url).unwrap().unwrap(),
                InboundSignal::PageLoaded(PageLoadStatus::Ok)
            );
        }
    }

    #[test]
    fn test_custom_scheme_ignores_default() {
        let router = SchemeRouter::new("app", true);
        assert!(router.owns("app://request/{}"));
        assert!(!router.owns("gl://request/{}"));
    }
}
