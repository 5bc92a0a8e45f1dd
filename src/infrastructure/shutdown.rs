//! Graceful Shutdown Handler
//!
//! One shutdown signal fans out to the watcher, the refresh timer and the
//! orchestrator; each of them holds a `TaskGuard` so the process can wait
//! for them to release their resources before exiting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Notify;

/// Shutdown coordinator for the background tasks.
#[derive(Clone)]
pub struct ShutdownController {
    /// Whether shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    /// Number of background tasks still running
    active_tasks: Arc<AtomicUsize>,
    /// Broadcast channel for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Notify when all tasks have exited
    drain_complete: Arc<Notify>,
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            drain_complete: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiate shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating shutdown");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been initiated, including if it already was.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Number of background tasks still holding a guard.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    fn task_ended(&self) {
        let prev = self.active_tasks.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.drain_complete.notify_waiters();
        }
    }

    /// Wait for all background tasks to exit (with timeout).
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = self.drain_complete.notified();
        tokio::pin!(drained);
        drained.as_mut().enable();

        if self.active_tasks() == 0 {
            return true;
        }

        tokio::select! {
            _ = drained => true,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    "drain timeout: {} tasks still running",
                    self.active_tasks()
                );
                false
            }
        }
    }

    /// Register a background task; the count drops when the guard does.
    pub fn task_guard(&self) -> TaskGuard {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            controller: self.clone(),
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a running background task.
pub struct TaskGuard {
    controller: ShutdownController,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.controller.task_ended();
    }
}

/// Install signal handlers for graceful shutdown.
///
/// Completes when Ctrl+C or SIGTERM is received, or when something else
/// initiated shutdown first.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
        _ = controller.cancelled() => {}
    }

    controller.shutdown();
}
