//! Periodic Refresh Timer
//!
//! Fires on a fixed cadence regardless of other activity so a missed
//! network notification is eventually corrected.

use crate::infrastructure::shutdown::ShutdownController;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Spawn the timer. `on_tick` runs on the timer task and must not block.
///
/// The first tick comes one full `period` after start; the startup refresh
/// is triggered separately. A zero period disables the timer.
pub fn spawn_refresh_timer<F>(period: Duration, shutdown: ShutdownController, on_tick: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    let guard = shutdown.task_guard();

    tokio::spawn(async move {
        let _guard = guard;

        if period.is_zero() {
            tracing::info!("periodic refresh disabled");
            return;
        }

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    tracing::trace!("periodic refresh tick");
                    on_tick();
                }
            }
        }
        tracing::debug!("refresh timer stopped");
    })
}
