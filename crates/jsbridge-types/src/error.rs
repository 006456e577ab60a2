//! Error types for JsBridge
//!
//! No error ever crosses the bridge boundary. Inbound failures are logged and
//! the message is dropped; outbound failures are returned to the native caller.

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    // ========================================================================
    // Inbound Errors (logged and dropped)
    // ========================================================================

    /// Inbound payload is not a valid envelope
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// No named handler and no default handler for a request
    #[error("No handler for request (handler: {handler_name:?})")]
    UnroutableRequest { handler_name: Option<String> },

    /// Response id not found in the pending-callback table
    #[error("No pending callback for response id {id:?}")]
    UnmatchedResponse { id: String },

    /// URL under the bridge scheme with an unknown namespace
    #[error("Unknown bridge signal: {url}")]
    UnknownSignal { url: String },

    // ========================================================================
    // Caller Errors
    // ========================================================================

    /// Bridge operation attempted off the designated UI thread
    #[error("Bridge operation '{operation}' called off the UI thread")]
    WrongThreadAccess { operation: String },

    /// Bridge has been destroyed
    #[error("Bridge has been destroyed")]
    Destroyed,

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create a malformed envelope error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Create a wrong-thread error for the named operation
    pub fn wrong_thread(operation: impl Into<String>) -> Self {
        Self::WrongThreadAccess {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the dispatcher swallows this error (log, drop the message)
    /// instead of surfacing it to a caller
    pub fn is_dropped_silently(&self) -> bool {
        matches!(
            self,
            Self::MalformedEnvelope { .. }
                | Self::UnroutableRequest { .. }
                | Self::UnmatchedResponse { .. }
                | Self::UnknownSignal { .. }
        )
    }

    /// Get a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope { .. } => "MALFORMED_ENVELOPE",
            Self::UnroutableRequest { .. } => "UNROUTABLE_REQUEST",
            Self::UnmatchedResponse { .. } => "UNMATCHED_RESPONSE",
            Self::UnknownSignal { .. } => "UNKNOWN_SIGNAL",
            Self::WrongThreadAccess { .. } => "WRONG_THREAD_ACCESS",
            Self::Destroyed => "DESTROYED",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
