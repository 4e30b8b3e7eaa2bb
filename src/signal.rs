//! Cancellation for the fetch pipeline.
//!
//! A [`ShutdownToken`] is shared by the pipeline and every fetch task. It is
//! cancelled either when the record cap is reached or when the process
//! receives SIGINT/SIGTERM (see [`ShutdownGuard`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// A token that can be shared across tasks to signal cancellation.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    state: Arc<TokenState>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation and wake every task waiting in [`Self::cancelled`].
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        // registered before the flag check so a concurrent cancel is not missed
        let notified = self.state.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancels a token when the process receives SIGINT or SIGTERM.
///
/// The listener task is aborted when the guard is dropped.
pub struct ShutdownGuard {
    token: ShutdownToken,
    listener: JoinHandle<()>,
}

impl ShutdownGuard {
    /// Start listening for signals.
    ///
    /// If handlers cannot be registered (e.g. in restricted environments) the
    /// guard is still created but only programmatic cancellation works.
    pub fn new(token: ShutdownToken) -> Self {
        let listener_token = token.clone();
        let listener = tokio::spawn(async move {
            if wait_for_signal().await {
                listener_token.cancel();
            }
        });
        Self { token, listener }
    }

    pub fn token(&self) -> ShutdownToken {
        self.token.clone()
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to register SIGINT handler: {}", e);
            None
        }
    };

    let sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            None
        }
    };

    match (sigint, sigterm) {
        (Some(mut int), Some(mut term)) => {
            tokio::select! {
                _ = int.recv() => info!("Received SIGINT, cancelling fetches..."),
                _ = term.recv() => info!("Received SIGTERM, cancelling fetches..."),
            }
            true
        }
        (Some(mut int), None) => {
            int.recv().await;
            info!("Received SIGINT, cancelling fetches...");
            true
        }
        (None, Some(mut term)) => {
            term.recv().await;
            info!("Received SIGTERM, cancelling fetches...");
            true
        }
        (None, None) => {
            warn!("No signal handlers registered - graceful shutdown disabled");
            false
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl-C, cancelling fetches...");
            true
        }
        Err(e) => {
            warn!("Failed to register Ctrl-C handler: {}", e);
            false
        }
    }
}
