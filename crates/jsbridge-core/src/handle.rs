//! Cross-thread access to a bridge
//!
//! `Bridge` itself is `!Send`. Work started on other threads goes through a
//! [`BridgeHandle`], which queues it for the UI thread and pokes the host via
//! [`UiContext::notify`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flume::Sender;
use jsbridge_types::{BridgeError, BridgeResult};

use crate::context::UiContext;

/// Response callback that may be created off the UI thread
pub type SendCallback = Box<dyn FnOnce(String) + Send>;

/// An outbound call waiting to run on the UI thread
pub struct BridgeCommand {
    pub handler_name: Option<String>,
    pub data: String,
    pub callback: Option<SendCallback>,
}

impl fmt::Debug for BridgeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeCommand")
            .field("handler_name", &self.handler_name)
            .field("data", &self.data)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// `Send + Sync` handle that marshals outbound calls onto the UI thread
#[derive(Clone)]
pub struct BridgeHandle {
    sender: Sender<BridgeCommand>,
    context: Arc<dyn UiContext>,
    closed: Arc<AtomicBool>,
}

impl BridgeHandle {
    pub(crate) fn new(
        sender: Sender<BridgeCommand>,
        context: Arc<dyn UiContext>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sender,
            context,
            closed,
        }
    }

    /// Fire-and-forget send to the script's default handler
    pub fn send(&self, data: impl Into<String>) -> BridgeResult<()> {
        self.submit(None, data.into(), None)
    }

    pub fn send_with_response<F>(&self, data: impl Into<String>, callback: F) -> BridgeResult<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(None, data.into(), Some(Box::new(callback)))
    }

    pub fn call_handler(&self, name: impl Into<String>, data: impl Into<String>) -> BridgeResult<()> {
        self.submit(Some(name.into()), data.into(), None)
    }

    pub fn call_handler_with_response<F>(
        &self,
        name: impl Into<String>,
        data: impl Into<String>,
        callback: F,
    ) -> BridgeResult<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        self.submit(Some(name.into()), data.into(), Some(Box::new(callback)))
    }

    /// Whether the bridge behind this handle is gone
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.sender.is_disconnected()
    }

    /// `Ok` means the command was queued before the bridge was destroyed.
    /// Commands still queued at `destroy()` are discarded with their callbacks.
    fn submit(
        &self,
        handler_name: Option<String>,
        data: String,
        callback: Option<SendCallback>,
    ) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::Destroyed);
        }
        let command = BridgeCommand {
            handler_name,
            data,
            callback,
        };
        self.sender
            .send(command)
            .map_err(|_| BridgeError::Destroyed)?;
        // destroy() may have drained the queue between the check and the send
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::Destroyed);
        }
        self.context.notify();
        Ok(())
    }
}

impl fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("queued", &self.sender.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingContext(AtomicUsize);

    impl UiContext for CountingContext {
        fn is_ui_thread(&self) -> bool {
            false
        }

        fn notify(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_submit_queues_and_notifies() {
        let (tx, rx) = flume::unbounded();
        let ctx = Arc::new(CountingContext(AtomicUsize::new(0)));
        let handle = BridgeHandle::new(tx, ctx.clone(), Arc::new(AtomicBool::new(false)));

        let worker = handle.clone();
        std::thread::spawn(move || {
            worker.call_handler("toast", "hi").unwrap();
            worker.send_with_response("ping", |_| {}).unwrap();
        })
        .join()
        .unwrap();

        let commands: Vec<BridgeCommand> = rx.try_iter().collect();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].handler_name.as_deref(), Some("toast"));
        assert!(commands[1].callback.is_some());
        assert_eq!(ctx.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_closed_handle_rejects() {
        let (tx, rx) = flume::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let handle = BridgeHandle::new(tx, Arc::new(CountingContext(AtomicUsize::new(0))), closed.clone());

        closed.store(true, Ordering::SeqCst);
        assert_eq!(handle.send("x"), Err(BridgeError::Destroyed));

        closed.store(false, Ordering::SeqCst);
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.send("x"), Err(BridgeError::Destroyed));
    }

    #[test]
    fn test_ok_submit_is_never_queued_after_close() {
        let (tx, rx) = flume::unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        let handle = BridgeHandle::new(tx, Arc::new(CountingContext(AtomicUsize::new(0))), closed.clone());

        let worker = std::thread::spawn(move || {
            let mut accepted = 0usize;
            while handle.call_handler("tick", "x").is_ok() {
                accepted += 1;
            }
            accepted
        });

        let mut drained = 0;
        while drained < 1_000 {
            drained += rx.try_iter().count();
        }
        // same order as Bridge::destroy: close, then discard the queue
        closed.store(true, Ordering::SeqCst);
        drained += rx.drain().count();

        let accepted = worker.join().unwrap();
        assert!(accepted <= drained, "{accepted} accepted, {drained} drained");
    }
}
