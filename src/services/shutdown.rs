//! Shutdown controller.
//!
//! One process-wide flag, flipped by SIGINT/SIGTERM (or by the
//! coordinator on a fatal fault). Workers poll it between cycles;
//! cancellation is cooperative, so the coordinator grants a grace
//! window for in-flight cycles before forcing the stopped event.

use tokio::sync::watch;
use tracing::info;

/// Owner side of the shutdown flag. Created once at launch and passed
/// through initialization; there is no hidden global.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Reader side handed to each worker.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A reader handle for a worker or the coordinator.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request a graceful stop.
    pub fn request(&self) {
        let _ = self.tx.send(true);
    }

    /// Spawn the listener that flips the flag on SIGINT/SIGTERM.
    pub fn listen_for_signals(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            wait_for_termination().await;
            info!("Termination signal received, requesting shutdown");
            let _ = tx.send(true);
        });
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been requested. Non-blocking.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // The sender lives for the whole run; a closed channel also
        // counts as shutdown.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
