//! Per-call cancellation signal
//!
//! Cloned into every task that serves a call. Cancelling any clone stops all
//! of them; the signal is sticky.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CallCancellation {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CallCancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives in every clone, including self
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CallCancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_sticky() {
        let cancel = CallCancellation::new();
        assert!(!cancel.is_cancelled());
        cancel.cancel();
        cancel.cancel();
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_clone_observes_cancel() {
        let cancel = CallCancellation::new();
        let watcher = cancel.clone();
        let waiter = tokio::spawn(async move { watcher.cancelled().await });
        cancel.cancel();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves() {
        let cancel = CallCancellation::new();
        cancel.cancel();
        cancel.clone().cancelled().await;
    }
}
