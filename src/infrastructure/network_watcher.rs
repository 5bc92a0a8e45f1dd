//! Network Change Watcher
//!
//! Emits a notification whenever the host's network interfaces change.
//! Uses the OS notification source where one exists and falls back to
//! periodic reachability probes otherwise.

use crate::adapters::outbound::open_native_interface_events;
use crate::domain::errors::WatcherError;
use crate::domain::ports::InterfaceEvents;
use crate::infrastructure::shutdown::ShutdownController;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Try the OS notification source before polling
    pub use_native: bool,
    /// Consecutive native errors tolerated before switching to polling
    pub max_rearm_failures: u32,
    /// Pause between native re-arm attempts
    pub rearm_delay: Duration,
    /// Well-known address whose reachability confirms a usable network
    pub probe_addr: String,
    /// Interval between probes
    pub probe_interval: Duration,
    /// Connect timeout for each probe
    pub probe_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            use_native: true,
            max_rearm_failures: 3,
            rearm_delay: Duration::from_secs(1),
            probe_addr: "8.8.8.8:53".to_string(),
            probe_interval: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// How changes are currently detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Native,
    Polling,
}

enum NativeExit {
    Cancelled,
    Degraded,
}

/// Detects network-interface changes for the lifetime of the process.
pub struct NetworkChangeWatcher {
    config: WatcherConfig,
    probe_addr: SocketAddr,
    native: Option<Box<dyn InterfaceEvents>>,
}

impl NetworkChangeWatcher {
    /// Create a watcher, opening the native source if configured.
    ///
    /// Must be called inside a Tokio runtime. Fails only when the polling
    /// fallback itself cannot be configured.
    pub fn new(config: WatcherConfig) -> Result<Self, WatcherError> {
        let probe_addr = Self::validate(&config)?;

        let native = if config.use_native {
            match open_native_interface_events() {
                Ok(events) => Some(events),
                Err(e) => {
                    tracing::info!("native interface notifications unavailable ({}), polling", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            probe_addr,
            native,
        })
    }

    /// Create a watcher around a caller-supplied event source.
    pub fn with_events(
        config: WatcherConfig,
        events: Box<dyn InterfaceEvents>,
    ) -> Result<Self, WatcherError> {
        let probe_addr = Self::validate(&config)?;
        Ok(Self {
            config,
            probe_addr,
            native: Some(events),
        })
    }

    fn validate(config: &WatcherConfig) -> Result<SocketAddr, WatcherError> {
        if config.probe_interval.is_zero() {
            return Err(WatcherError::Init("probe interval must be non-zero".into()));
        }
        if config.probe_timeout.is_zero() {
            return Err(WatcherError::Init("probe timeout must be non-zero".into()));
        }
        config
            .probe_addr
            .parse()
            .map_err(|_| WatcherError::Init(format!("invalid probe address {:?}", config.probe_addr)))
    }

    /// Current detection mode.
    pub fn mode(&self) -> WatchMode {
        if self.native.is_some() {
            WatchMode::Native
        } else {
            WatchMode::Polling
        }
    }

    /// Run in a background task.
    pub fn spawn<F>(self, notify: F, shutdown: ShutdownController) -> JoinHandle<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let guard = shutdown.task_guard();
        tokio::spawn(async move {
            self.watch(notify, shutdown).await;
            drop(guard);
        })
    }

    /// Watch until shutdown, calling `notify` on every change.
    ///
    /// `notify` runs on the watcher's task and must not block.
    pub async fn watch<F>(mut self, notify: F, shutdown: ShutdownController)
    where
        F: Fn() + Send + Sync,
    {
        if let Some(mut events) = self.native.take() {
            tracing::info!("watching network changes via native notifications");
            let exit = Self::watch_native(
                events.as_mut(),
                self.probe_addr,
                &self.config,
                &notify,
                &shutdown,
            )
            .await;
            drop(events);
            match exit {
                NativeExit::Cancelled => {
                    tracing::debug!("network watcher stopped");
                    return;
                }
                NativeExit::Degraded => {
                    tracing::warn!(
                        "native notifications failed {} times in a row, degrading to polling",
                        self.config.max_rearm_failures
                    );
                }
            }
        }

        tracing::info!(
            probe = %self.probe_addr,
            interval = ?self.config.probe_interval,
            "watching network changes via reachability probes"
        );
        Self::watch_polling(self.probe_addr, &self.config, &notify, &shutdown).await;
        tracing::debug!("network watcher stopped");
    }

    /// Native event loop.
    ///
    /// A change only notifies once `probe_addr` is reachable; while it is
    /// not, the probe is repeated every `probe_interval`. Link-down events
    /// therefore never cause a refresh on their own.
    async fn watch_native<F>(
        events: &mut dyn InterfaceEvents,
        probe_addr: SocketAddr,
        config: &WatcherConfig,
        notify: &F,
        shutdown: &ShutdownController,
    ) -> NativeExit
    where
        F: Fn() + Send + Sync,
    {
        let mut failures = 0u32;
        let mut pending = false;

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => return NativeExit::Cancelled,
                outcome = events.next_change() => Some(outcome),
                _ = tokio::time::sleep(config.probe_interval), if pending => None,
            };

            match outcome {
                Some(Ok(())) => {
                    failures = 0;
                    tracing::debug!("network interfaces changed");
                    pending = true;
                }
                None => {}
                Some(Err(e)) => {
                    failures += 1;
                    tracing::warn!(failures, "native notification re-arm failed: {}", e);
                    if failures >= config.max_rearm_failures {
                        return NativeExit::Degraded;
                    }
                    tokio::select! {
                        _ = shutdown.cancelled() => return NativeExit::Cancelled,
                        _ = tokio::time::sleep(config.rearm_delay) => {}
                    }
                    continue;
                }
            }

            if pending {
                let reachable = tokio::select! {
                    _ = shutdown.cancelled() => return NativeExit::Cancelled,
                    r = Self::probe(probe_addr, config.probe_timeout) => r,
                };
                match reachable {
                    Ok(()) => {
                        pending = false;
                        notify();
                    }
                    Err(e) => tracing::debug!(
                        probe = %probe_addr,
                        "network changed but probe unreachable ({}), waiting",
                        e
                    ),
                }
            }
        }
    }

    async fn watch_polling<F>(
        probe_addr: SocketAddr,
        config: &WatcherConfig,
        notify: &F,
        shutdown: &ShutdownController,
    ) where
        F: Fn() + Send + Sync,
    {
        let mut interval = tokio::time::interval(config.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last: Option<bool> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }

            let reachable = tokio::select! {
                _ = shutdown.cancelled() => return,
                r = Self::probe(probe_addr, config.probe_timeout) => r.is_ok(),
            };

            match last {
                Some(prev) if prev != reachable => {
                    tracing::info!(reachable, "network reachability changed");
                    notify();
                }
                None => tracing::debug!(reachable, "initial reachability"),
                _ => {}
            }
            last = Some(reachable);
        }
    }

    /// Short-timeout TCP connect to the probe address.
    async fn probe(addr: SocketAddr, timeout: Duration) -> Result<(), String> {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                Ok(())
            }
            Ok(Err(e)) => Err(format!("connection failed: {}", e)),
            Err(_) => Err("connection timeout".to_string()),
        }
    }
}
