//! Request and response envelopes
//!
//! Envelopes are the only thing that crosses the bridge. Every field is a
//! string; `data` is opaque to the bridge and usually carries JSON text chosen
//! by the application.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};

/// A call travelling across the bridge
///
/// - `id` present: the sender expects exactly one `Response` carrying the same id.
/// - `handler_name` present: route to that named handler, otherwise to the default handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, absent for fire-and-forget sends
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Target handler name
    #[serde(
        rename = "handlerName",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_string"
    )]
    pub handler_name: Option<String>,
    /// Opaque payload
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub data: Option<String>,
}

impl Request {
    /// Create a fire-and-forget request for the default handler
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: None,
            handler_name: None,
            data: non_empty(data),
        }
    }

    /// Attach a correlation id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = non_empty(id);
        self
    }

    /// Route to a named handler
    pub fn with_handler(mut self, handler_name: impl Into<String>) -> Self {
        self.handler_name = non_empty(handler_name);
        self
    }

    /// Whether the sender is waiting for a response
    pub fn expects_response(&self) -> bool {
        self.id.is_some()
    }

    /// The payload, or `""` when absent
    pub fn data_or_empty(&self) -> &str {
        self.data.as_deref().unwrap_or_default()
    }

    /// Encode to canonical JSON (absent fields omitted)
    pub fn encode(&self) -> BridgeResult<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::internal(e.to_string()))
    }

    /// Decode from JSON text
    pub fn decode(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::malformed(e.to_string()))
    }
}

/// The answer to a `Request` that carried an id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the originating request; empty when the sender omitted it
    #[serde(default, deserialize_with = "lenient_required_string")]
    pub id: String,
    /// Opaque result payload
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_string")]
    pub data: Option<String>,
}

impl Response {
    /// Create a response for the request with the given id
    pub fn new(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: non_empty(data),
        }
    }

    /// The payload, or `""` when absent
    pub fn data_or_empty(&self) -> &str {
        self.data.as_deref().unwrap_or_default()
    }

    /// Encode to canonical JSON (absent data omitted)
    pub fn encode(&self) -> BridgeResult<String> {
        serde_json::to_string(self).map_err(|e| BridgeError::internal(e.to_string()))
    }

    /// Decode from JSON text
    pub fn decode(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::malformed(e.to_string()))
    }
}

/// Either kind of envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
}

impl Envelope {
    /// Encode the wrapped envelope
    pub fn encode(&self) -> BridgeResult<String> {
        match self {
            Envelope::Request(r) => r.encode(),
            Envelope::Response(r) => r.encode(),
        }
    }
}

impl From<Request> for Envelope {
    fn from(r: Request) -> Self {
        Envelope::Request(r)
    }
}

impl From<Response> for Envelope {
    fn from(r: Response) -> Self {
        Envelope::Response(r)
    }
}

/// `None` for the empty string, `Some` otherwise
pub fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

// Script senders are loose about types: `send({a: 1})` puts an object where a
// string belongs. Non-string values are kept as their JSON text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => non_empty(s),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(Option::unwrap_or_default)
}
