use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::warn;

/// Interrupt flag shared between the signal watcher and the batch loop.
///
/// The loop waits on it while reading input and checks it between lines.
/// A running handler always finishes (or fails on its own timeout) before
/// the batch stops.
#[derive(Debug, Clone)]
pub struct Cancellation {
    state: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`Cancellation::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Spawn a task that flips the flag on Ctrl-C (and SIGTERM on unix).
    pub fn watch_signals(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to install SIGTERM handler: {}", e);
                            if signal::ctrl_c().await.is_ok() {
                                flag.interrupt();
                            }
                            return;
                        }
                    };
                tokio::select! {
                    result = signal::ctrl_c() => {
                        if result.is_err() {
                            return;
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }

            #[cfg(not(unix))]
            {
                if signal::ctrl_c().await.is_err() {
                    return;
                }
            }

            flag.interrupt();
        });
    }

    fn interrupt(&self) {
        warn!("Interrupt received, stopping after the current line");
        self.cancel();
    }
}
