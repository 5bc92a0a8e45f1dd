//! Infrastructure Layer
//!
//! Background tasks and cross-cutting concerns.

pub mod network_watcher;
pub mod refresh_timer;
pub mod shutdown;

pub use network_watcher::{NetworkChangeWatcher, WatchMode, WatcherConfig};
pub use refresh_timer::spawn_refresh_timer;
pub use shutdown::{shutdown_signal, ShutdownController, TaskGuard};
