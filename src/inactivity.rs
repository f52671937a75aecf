//! Per-connection inactivity timer
//!
//! One pending one-shot timer per session. Every `arm` starts a new
//! generation and aborts the previous timer; `expired` only resolves for a
//! timer of the current generation, so an expiry that raced with fresh
//! activity is discarded.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Cancellable idle timer owned by one session
#[derive(Debug)]
pub struct InactivityMonitor {
    timeout: Duration,
    generation: u64,
    fired_tx: mpsc::UnboundedSender<u64>,
    fired_rx: mpsc::UnboundedReceiver<u64>,
    pending: Option<JoinHandle<()>>,
}

impl InactivityMonitor {
    /// Create a disarmed monitor
    pub fn new(timeout: Duration) -> Self {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        Self {
            timeout,
            generation: 0,
            fired_tx,
            fired_rx,
            pending: None,
        }
    }

    /// Cancel any pending timer and start a fresh one
    pub fn arm(&mut self) {
        self.abort_pending();
        self.generation += 1;

        let generation = self.generation;
        let fired = self.fired_tx.clone();
        let timeout = self.timeout;
        self.pending = Some(tokio::spawn(async move {
            sleep(timeout).await;
            let _ = fired.send(generation);
        }));
    }

    /// Cancel the pending timer
    ///
    /// Returns false if nothing was armed.
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        self.abort_pending()
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Resolves when the current timer expires
    ///
    /// Cancel-safe; pends forever while disarmed.
    pub async fn expired(&mut self) {
        while let Some(generation) = self.fired_rx.recv().await {
            if generation == self.generation {
                debug!("Inactivity timeout after {:?}", self.timeout);
                return;
            }
            debug!("Discarding stale inactivity expiry #{}", generation);
        }
    }

    fn abort_pending(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.abort_pending();
    }
}
