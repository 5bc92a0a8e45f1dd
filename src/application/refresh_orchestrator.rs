//! Refresh Orchestrator - Main application use case
//!
//! Decides when to re-resolve the public IP's country. Triggers from the
//! presentation layer, the network watcher and the periodic timer are fed
//! through one channel into a single dispatch loop, which:
//! 1. Keeps at most one resolution in flight
//! 2. Folds triggers arriving meanwhile into one owed follow-up
//! 3. Debounces bursts of network changes
//! 4. Publishes only materially changed states, in order

use crate::domain::entities::{ResolutionResult, ResolutionState, Trigger};
use crate::domain::errors::RegistryError;
use crate::domain::services::ProviderRegistry;
use crate::infrastructure::shutdown::ShutdownController;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback invoked with every published state.
///
/// Runs on the dispatch task; it must return quickly.
pub type StateSubscriber = Arc<dyn Fn(&ResolutionState) + Send + Sync>;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Settle window for network-change bursts (zero disables)
    pub debounce_window: Duration,
    /// Consecutive failures before the published state is cleared
    pub failure_threshold: u32,
    /// Capacity of the trigger queue
    pub queue_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(2),
            failure_threshold: 3,
            queue_capacity: 64,
        }
    }
}

/// Dispatch-loop phase, derived from what is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CoolingDown,
    Resolving,
}

struct Shared {
    registry: Arc<ProviderRegistry>,
    state: RwLock<ResolutionState>,
    subscribers: RwLock<Vec<StateSubscriber>>,
    resolutions_started: AtomicU64,
    trigger_tx: mpsc::Sender<Trigger>,
    shutdown: ShutdownController,
}

/// Cloneable command surface for the presentation layer and the
/// background tasks.
#[derive(Clone)]
pub struct OrchestratorHandle {
    shared: Arc<Shared>,
}

impl OrchestratorHandle {
    /// Queue a trigger. Returns false once shutdown has begun.
    ///
    /// Never blocks: a full queue already guarantees a refresh is owed,
    /// so the trigger is dropped.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        if self.shared.shutdown.is_shutdown() {
            tracing::debug!(%trigger, "rejecting trigger after shutdown");
            return false;
        }
        match self.shared.trigger_tx.try_send(trigger) {
            Ok(()) => true,
            Err(TrySendError::Full(trigger)) => {
                tracing::debug!(%trigger, "trigger queue full, refresh already owed");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Refresh on user request.
    pub fn trigger_manual_refresh(&self) -> bool {
        self.trigger(Trigger::Manual)
    }

    /// Report a network-interface change.
    pub fn notify_network_changed(&self) -> bool {
        self.trigger(Trigger::NetworkChanged)
    }

    /// Switch the active provider and refresh with it.
    ///
    /// Returns `Ok(false)` without refreshing when `name` is already active.
    pub fn switch_provider(&self, name: &str) -> Result<bool, RegistryError> {
        if self.shared.shutdown.is_shutdown() {
            return Ok(false);
        }
        let switched = self.shared.registry.set_active(name)?;
        if switched {
            tracing::info!("switched provider to {}", name);
            self.trigger(Trigger::ProviderSwitch(name.to_string()));
        }
        Ok(switched)
    }

    /// Register a callback for published states.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&ResolutionState) + Send + Sync + 'static,
    {
        self.shared.subscribers.write().push(Arc::new(subscriber));
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ResolutionState {
        self.shared.state.read().clone()
    }

    /// Name of the provider the next resolution will use.
    pub fn active_provider(&self) -> Option<String> {
        self.shared.registry.active_name()
    }

    /// All registered provider names.
    pub fn providers(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    /// Number of resolutions dispatched since start.
    pub fn resolutions_started(&self) -> u64 {
        self.shared.resolutions_started.load(Ordering::SeqCst)
    }

    /// Stop the orchestrator and every task sharing its shutdown controller.
    pub fn shutdown(&self) {
        self.shared.shutdown.shutdown();
    }
}

/// A resolution running on its own worker task.
struct InFlight {
    provider: String,
    trigger: Trigger,
    task: JoinHandle<ResolutionResult>,
}

enum Event {
    Shutdown,
    Trigger(Trigger),
    Finished(ResolutionResult),
    CooldownElapsed,
}

/// The single-flight refresh scheduler.
pub struct RefreshOrchestrator {
    shared: Arc<Shared>,
    config: OrchestratorConfig,
    trigger_rx: mpsc::Receiver<Trigger>,
}

impl RefreshOrchestrator {
    /// Create an orchestrator over a populated registry.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: OrchestratorConfig,
        shutdown: ShutdownController,
    ) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(config.queue_capacity.max(1));
        let initial = ResolutionState::new(registry.active_name().unwrap_or_default());

        Self {
            shared: Arc::new(Shared {
                registry,
                state: RwLock::new(initial),
                subscribers: RwLock::new(Vec::new()),
                resolutions_started: AtomicU64::new(0),
                trigger_tx,
                shutdown,
            }),
            config,
            trigger_rx,
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            shared: self.shared.clone(),
        }
    }

    /// Run the dispatch loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        let guard = self.shared.shutdown.task_guard();
        tokio::spawn(async move {
            self.run().await;
            drop(guard);
        })
    }

    /// Dispatch loop. Returns after shutdown.
    pub async fn run(mut self) {
        let mut in_flight: Option<InFlight> = None;
        let mut owed: Option<Trigger> = None;
        let mut cooldown_until: Option<Instant> = None;

        tracing::debug!("refresh orchestrator started");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shared.shutdown.cancelled() => Event::Shutdown,
                result = wait_finished(&mut in_flight) => Event::Finished(result),
                _ = wait_until(cooldown_until) => Event::CooldownElapsed,
                trigger = self.trigger_rx.recv() => match trigger {
                    Some(trigger) => Event::Trigger(trigger),
                    None => Event::Shutdown,
                },
            };

            match event {
                Event::Shutdown => break,
                Event::Trigger(trigger) => {
                    let settle = trigger == Trigger::NetworkChanged
                        && !self.config.debounce_window.is_zero();
                    match phase_of(&in_flight, cooldown_until) {
                        Phase::Resolving => {
                            tracing::debug!(%trigger, "resolution in flight, coalescing");
                            owed = Some(trigger);
                        }
                        _ if settle => {
                            if cooldown_until.is_none() {
                                tracing::debug!(
                                    window = ?self.config.debounce_window,
                                    "network changed, waiting for it to settle"
                                );
                                cooldown_until = Some(Instant::now() + self.config.debounce_window);
                            }
                            owed = Some(trigger);
                        }
                        _ => {
                            // Any direct request also satisfies a pending cooldown.
                            cooldown_until = None;
                            owed = None;
                            in_flight = self.dispatch(trigger);
                        }
                    }
                }
                Event::CooldownElapsed => {
                    cooldown_until = None;
                    if let Some(trigger) = owed.take() {
                        in_flight = self.dispatch(trigger);
                    }
                }
                Event::Finished(result) => {
                    if let Some(done) = in_flight.take() {
                        tracing::debug!(trigger = %done.trigger, provider = %done.provider, "resolution finished");
                        self.apply(result, &done.provider);
                    }
                    if let Some(trigger) = owed.take() {
                        in_flight = self.dispatch(trigger);
                    }
                }
            }
        }

        if let Some(abandoned) = in_flight.take() {
            tracing::debug!(provider = %abandoned.provider, "abandoning in-flight resolution");
            abandoned.task.abort();
        }
        tracing::debug!("refresh orchestrator stopped");
    }

    /// Start a resolution against the provider active right now.
    fn dispatch(&self, trigger: Trigger) -> Option<InFlight> {
        let Some(client) = self.shared.registry.active() else {
            tracing::warn!(%trigger, "no provider registered, skipping resolution");
            return None;
        };

        let n = self.shared.resolutions_started.fetch_add(1, Ordering::SeqCst) + 1;
        let provider = client.name().to_string();
        tracing::debug!(%trigger, %provider, resolution = n, "starting resolution");

        let task = tokio::spawn(async move { client.resolve().await });
        Some(InFlight {
            provider,
            trigger,
            task,
        })
    }

    /// Fold a finished resolution into the state and publish if it changed.
    fn apply(&self, result: ResolutionResult, provider: &str) {
        let published = {
            let mut state = self.shared.state.write();
            if state.record(result, provider, self.config.failure_threshold) {
                Some(state.clone())
            } else {
                None
            }
        };

        match published {
            Some(state) => {
                tracing::info!(
                    provider = %state.active_provider_name,
                    ip = state.current.ip_address.as_deref().unwrap_or("-"),
                    country = %state.icon_key(),
                    success = state.current.success,
                    failures = state.consecutive_failures,
                    "publishing state"
                );
                self.publish(&state);
            }
            None => tracing::debug!("no material change, not publishing"),
        }
    }

    /// Deliver a state to every subscriber, in registration order.
    ///
    /// A panicking subscriber is logged and skipped; the others still run
    /// and the dispatch loop keeps going.
    fn publish(&self, state: &ResolutionState) {
        let subscribers = self.shared.subscribers.read().clone();
        for (index, subscriber) in subscribers.iter().enumerate() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| subscriber(state))).is_err() {
                tracing::error!(subscriber = index, "subscriber panicked while handling published state");
            }
        }
    }
}

fn phase_of(in_flight: &Option<InFlight>, cooldown_until: Option<Instant>) -> Phase {
    if in_flight.is_some() {
        Phase::Resolving
    } else if cooldown_until.is_some() {
        Phase::CoolingDown
    } else {
        Phase::Idle
    }
}

async fn wait_finished(in_flight: &mut Option<InFlight>) -> ResolutionResult {
    match in_flight {
        Some(flight) => match (&mut flight.task).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(provider = %flight.provider, "resolution task failed: {}", e);
                ResolutionResult::failure()
            }
        },
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
