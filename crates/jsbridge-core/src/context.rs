//! Thread affinity
//!
//! All bridge state lives on one designated UI thread. The host tells the
//! bridge which thread that is through a [`UiContext`]; every public
//! operation checks it before touching state.

use std::thread::{self, ThreadId};

use jsbridge_types::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

/// The host's notion of "the UI thread"
pub trait UiContext: Send + Sync {
    /// Whether the calling thread may touch bridge state
    fn is_ui_thread(&self) -> bool;

    /// Ask the host loop to run `Bridge::drain_marshaled` soon.
    ///
    /// Called from arbitrary threads after work has been marshaled.
    fn notify(&self) {}
}

/// Binds to the thread that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundThread {
    id: ThreadId,
}

impl BoundThread {
    pub fn current() -> Self {
        Self {
            id: thread::current().id(),
        }
    }
}

impl UiContext for BoundThread {
    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.id
    }
}

/// What happens when an operation is called off the UI thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPolicy {
    /// Log at error level and return `WrongThreadAccess`
    Reject,
    /// Panic: a wrong-thread call is a programming error
    Panic,
}

impl ThreadPolicy {
    /// Enforce the policy for `operation`
    pub fn check(self, context: &dyn UiContext, operation: &str) -> BridgeResult<()> {
        if context.is_ui_thread() {
            return Ok(());
        }
        match self {
            ThreadPolicy::Reject => {
                tracing::error!(
                    operation,
                    thread = ?thread::current().id(),
                    "bridge operation called off the UI thread, rejected"
                );
                Err(BridgeError::wrong_thread(operation))
            }
            ThreadPolicy::Panic => panic!(
                "bridge operation '{operation}' called off the UI thread ({:?})",
                thread::current().id()
            ),
        }
    }
}

impl Default for ThreadPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ThreadPolicy::Panic
        } else {
            ThreadPolicy::Reject
        }
    }
}
