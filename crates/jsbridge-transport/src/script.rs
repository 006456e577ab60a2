//! Outbound channel: envelopes as injectable script statements
//!
//! The envelope JSON is embedded in a double-quoted script string literal and
//! handed to a well-known entry point on the script side:
//!
//! ```text
//! WebViewJavascriptBridge._handleRequestFromNative("{\"id\":\"native_cb_1_…\",\"data\":\"hi\"}");
//! ```

use jsbridge_types::{BridgeError, BridgeResult, Request, Response};

/// Script entry point receiving native requests
pub const REQUEST_ENTRY_POINT: &str = "_handleRequestFromNative";

/// Script entry point receiving native responses
pub const RESPONSE_ENTRY_POINT: &str = "_handleResponseFromNative";

/// Global object the script side installs its entry points on
pub const DEFAULT_NAMESPACE: &str = "WebViewJavascriptBridge";

/// Escape JSON text so it survives inside a double-quoted script literal.
///
/// A backslash followed by `u`, `t`, `r` or `n` is left alone. Any other
/// backslash is doubled. When it escapes a quote or another backslash, that
/// character is backslash-escaped too, so `\"` becomes `\\\"` and `\\` becomes
/// `\\\\`, while `\b` becomes `\\b`. Every remaining double quote becomes `\"`.
///
/// JSON escapes of newline, tab, carriage return and the `\uXXXX` controls pass
/// through untouched, so the script engine turns them into raw control
/// characters inside the JSON text and the script side rejects the envelope.
pub fn escape_for_script_literal(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + json.len() / 4);
    let mut chars = json.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek().copied() {
                Some('u' | 't' | 'r' | 'n') => out.push('\\'),
                Some(next @ ('"' | '\\')) => {
                    chars.next();
                    out.push_str("\\\\\\");
                    out.push(next);
                }
                Some(_) | None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Decode the body of a script string literal the way a script engine does.
///
/// Inverse of [`escape_for_script_literal`] for JSON whose strings contain no
/// control characters other than backspace and form feed.
pub fn unescape_script_literal(literal: &str) -> BridgeResult<String> {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars
            .next()
            .ok_or_else(|| BridgeError::malformed("dangling backslash in script literal"))?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' => {
                let code = take_hex(&mut chars, 2)?;
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            'u' => {
                let unit = take_hex(&mut chars, 4)?;
                if (0xD800..0xDC00).contains(&unit) && chars.peek() == Some(&'\\') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.next() == Some('u') {
                        let low = take_hex(&mut lookahead, 4)?;
                        if (0xDC00..0xE000).contains(&low) {
                            chars = lookahead;
                            let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                            continue;
                        }
                    }
                }
                out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            // Line continuation
            '\n' => {}
            other => out.push(other),
        }
    }
    Ok(out)
}

fn take_hex<I>(chars: &mut I, digits: usize) -> BridgeResult<u32>
where
    I: Iterator<Item = char>,
{
    let mut value = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| BridgeError::malformed("bad hex escape in script literal"))?;
        value = value * 16 + digit;
    }
    Ok(value)
}

/// Builds the script statements injected into the web view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInjector {
    namespace: String,
}

impl ScriptInjector {
    /// Create an injector calling entry points on `namespace`; an empty
    /// namespace calls them as globals
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Statement delivering a request to the script side
    pub fn request_script(&self, request: &Request) -> BridgeResult<String> {
        Ok(self.command(REQUEST_ENTRY_POINT, &request.encode()?))
    }

    /// Statement delivering a response to the script side
    pub fn response_script(&self, response: &Response) -> BridgeResult<String> {
        Ok(self.command(RESPONSE_ENTRY_POINT, &response.encode()?))
    }

    /// Recover `(entry point, json)` from a statement built by this injector
    pub fn parse_command(&self, script: &str) -> BridgeResult<(&'static str, String)> {
        let script = script.trim().trim_end_matches(';').trim_end();
        let call = if self.namespace.is_empty() {
            script
        } else {
            script
                .strip_prefix(self.namespace.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .ok_or_else(|| BridgeError::malformed(format!("not a {} call", self.namespace)))?
        };

        let (entry, args) = call
            .split_once('(')
            .ok_or_else(|| BridgeError::malformed("missing call parentheses"))?;
        let entry = match entry.trim() {
            REQUEST_ENTRY_POINT => REQUEST_ENTRY_POINT,
            RESPONSE_ENTRY_POINT => RESPONSE_ENTRY_POINT,
            other => return Err(BridgeError::malformed(format!("unknown entry point {other}"))),
        };
        let literal = args
            .trim_end()
            .strip_suffix(')')
            .and_then(|a| a.trim().strip_prefix('"'))
            .and_then(|a| a.strip_suffix('"'))
            .ok_or_else(|| BridgeError::malformed("argument is not a string literal"))?;

        Ok((entry, unescape_script_literal(literal)?))
    }

    fn command(&self, entry_point: &str, json: &str) -> String {
        let literal = escape_for_script_literal(json);
        if self.namespace.is_empty() {
            format!("{entry_point}(\"{literal}\");")
        } else {
            format!("{}.{entry_point}(\"{literal}\");", self.namespace)
        }
    }
}

impl Default for ScriptInjector {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_escape_quotes_and_backslashes() {
        let json = Request::new(r#"a"b\c"#).encode().unwrap();
        assert_eq!(json, r#"{"data":"a\"b\\c"}"#);
        assert_eq!(
            escape_for_script_literal(&json),
            r#"{\"data\":\"a\\\"b\\\\c\"}"#
        );
    }

    #[test]
    fn test_escape_keeps_utrn_escapes() {
        assert_eq!(escape_for_script_literal(r#"\n\t\r\u0001"#), r#"\n\t\r\u0001"#);
    }

    #[test]
    fn test_escape_trailing_backslash() {
        assert_eq!(escape_for_script_literal("x\\"), "x\\\\");
    }

    #[test]
    fn test_escape_backspace_and_form_feed() {
        let json = Request::new("bs\u{8}ff\u{c}").encode().unwrap();
        assert_eq!(json, r#"{"data":"bs\bff\f"}"#);
        let literal = escape_for_script_literal(&json);
        assert_eq!(literal, r#"{\"data\":\"bs\\bff\\f\"}"#);

        let decoded = Request::decode(&unescape_script_literal(&literal).unwrap()).unwrap();
        assert_eq!(decoded.data_or_empty(), "bs\u{8}ff\u{c}");
    }

    #[test]
    fn test_newline_data_does_not_survive_injection() {
        for data in ["line1\nline2", "tab\there", "bell\u{7}x"] {
            let literal = escape_for_script_literal(&Request::new(data).encode().unwrap());
            let json = unescape_script_literal(&literal).unwrap();
            assert!(Request::decode(&json).is_err(), "{data:?} decoded");
        }
    }

    #[test]
    fn test_escaped_payload_reconstructs_input_data() {
        let request = Request::new(r#"a"b\c"#);
        let literal = escape_for_script_literal(&request.encode().unwrap());
        let json = unescape_script_literal(&literal).unwrap();
        let decoded = Request::decode(&json).unwrap();
        assert_eq!(decoded.data_or_empty(), r#"a"b\c"#);
    }

    #[test]
    fn test_escape_nested_json_payload() {
        let inner = r#"{"user":{"name":"x\"y","path":"C:\\tmp"}}"#;
        let response = Response::new("native_cb_3_1", inner);
        let literal = escape_for_script_literal(&response.encode().unwrap());
        let decoded = Response::decode(&unescape_script_literal(&literal).unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_unescape_js_escapes() {
        assert_eq!(unescape_script_literal(r#"a\nb\'c\x41\u00e9"#).unwrap(), "a\nb'cAé");
        assert_eq!(unescape_script_literal(r#"\ud83d\ude00"#).unwrap(), "😀");
        assert!(unescape_script_literal("oops\\").is_err());
        assert!(unescape_script_literal(r#"\u12"#).is_err());
    }

    #[test]
    fn test_request_script_shape() {
        let injector = ScriptInjector::default();
        let script = injector
            .request_script(&Request::new("hi").with_handler("greet"))
            .unwrap();
        assert_eq!(
            script,
            r#"WebViewJavascriptBridge._handleRequestFromNative("{\"handlerName\":\"greet\",\"data\":\"hi\"}");"#
        );
    }

    #[test]
    fn test_response_script_global_namespace() {
        let injector = ScriptInjector::new("");
        let script = injector.response_script(&Response::new("cb_1_2", "ok")).unwrap();
        assert_eq!(
            script,
            r#"_handleResponseFromNative("{\"id\":\"cb_1_2\",\"data\":\"ok\"}");"#
        );
    }

    #[test]
    fn test_parse_command_round_trip() {
        let injector = ScriptInjector::default();
        let request = Request::new(r#"it's "quoted" \ here"#).with_id("native_cb_9_0");
        let script = injector.request_script(&request).unwrap();

        let (entry, json) = injector.parse_command(&script).unwrap();
        assert_eq!(entry, REQUEST_ENTRY_POINT);
        assert_eq!(Request::decode(&json).unwrap(), request);
    }

    #[test]
    fn test_parse_command_rejects_foreign_scripts() {
        let injector = ScriptInjector::default();
        assert!(injector.parse_command("alert(1);").is_err());
        assert!(injector
            .parse_command("WebViewJavascriptBridge.init(\"x\");")
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_ascii_data_round_trips(
            data in "[ -~\\x08\\x0c]{0,64}",
            handler in "[a-zA-Z_]{0,12}",
        ) {
            let request = Request::new(data).with_handler(handler).with_id("native_cb_1_0");
            let literal = escape_for_script_literal(&request.encode().unwrap());
            let json = unescape_script_literal(&literal).unwrap();
            prop_assert_eq!(Request::decode(&json).unwrap(), request);
        }

        #[test]
        fn prop_escaped_literal_has_no_bare_quotes(data in "[ -~]{0,64}") {
            let literal = escape_for_script_literal(&Response::new("1", data).encode().unwrap());
            let mut backslashes = 0usize;
            for c in literal.chars() {
                if c == '"' {
                    prop_assert!(backslashes % 2 == 1);
                }
                backslashes = if c == '\\' { backslashes + 1 } else { 0 };
            }
        }
    }
}
