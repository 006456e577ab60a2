use jsbridge_types::BridgeError;
use thiserror::Error;

pub type PeerResult<T> = std::result::Result<T, PeerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// Script is not a call to one of the bridge entry points
    #[error("Unrecognized script: {0}")]
    UnrecognizedScript(#[source] BridgeError),

    /// Envelope inside a recognized script failed to decode
    #[error("Bad envelope: {0}")]
    Envelope(#[source] BridgeError),

    #[error("init called twice")]
    AlreadyInitialized,
}

impl PeerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnrecognizedScript(_) => "UNRECOGNIZED_SCRIPT",
            Self::Envelope(_) => "BAD_ENVELOPE",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
        }
    }
}
