//! In-proc script bus standing in for a real web view
//!
//! Outside a web view host there is nothing to inject scripts into, so
//! [`ChannelWebView`] queues each statement and the script side drains them
//! from the [`ScriptBus`].

use flume::{Receiver, Sender};

use crate::WebView;

pub struct ScriptBus {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl ScriptBus {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// A web view whose injected scripts land on this bus
    pub fn web_view(&self) -> ChannelWebView {
        ChannelWebView {
            sender: self.sender.clone(),
        }
    }

    pub fn try_recv(&self) -> Option<String> {
        self.receiver.try_recv().ok()
    }

    /// Everything injected so far, in injection order
    pub fn drain(&self) -> Vec<String> {
        self.receiver.try_iter().collect()
    }

    pub async fn recv(&self) -> Option<String> {
        self.receiver.recv_async().await.ok()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for ScriptBus {
    fn default() -> Self {
        Self::new()
    }
}

/// `WebView` that enqueues scripts instead of evaluating them
#[derive(Debug, Clone)]
pub struct ChannelWebView {
    sender: Sender<String>,
}

impl WebView for ChannelWebView {
    fn evaluate_script(&self, script: &str) {
        if self.sender.send(script.to_string()).is_err() {
            tracing::warn!("script bus closed, dropping injected script");
        }
    }
}
