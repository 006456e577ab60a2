//! JsBridge Peer - the script side of the bridge, in Rust
//!
//! [`ScriptPeer`] behaves like the bridge script a page loads: it parses the
//! statements the native side injects, queues requests until `init`, keeps
//! its own `cb_<n>_<millis>` callback table, and talks back by navigating to
//! `gl://` URLs. Tests and the simulator use it in place of a browser.

mod error;
mod peer;

pub use error::{PeerError, PeerResult};
pub use peer::{PeerCallback, PeerResponder, ScriptPeer, PEER_CALLBACK_ID_PREFIX};
