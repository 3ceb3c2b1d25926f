//! Process-wide shutdown signal.
//!
//! A thin wrapper over a `tokio::sync::watch` channel carrying a single
//! "stop" flag. Clones share the same flag, so a Ctrl-C handler can trigger
//! it while the accept loop and every worker wait on [`ShutdownSignal::wait`]
//! inside their `tokio::select!`.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable, one-way shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the flag and wakes every waiter. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is set; immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // `wait_for` checks the current value first, so a trigger that raced
        // ahead of this call is not missed. The sender lives in `self`, so the
        // channel cannot close while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
