//! Interface Events Port
//!
//! Native source of network-interface change notifications.

use crate::domain::errors::WatcherError;
use async_trait::async_trait;

/// Blocking-style source of "something about the interfaces changed".
///
/// Each call waits for the next change and re-arms the underlying
/// notification before returning, so changes between calls are not lost.
/// An `Err` counts as a failed re-arm; the watcher gives up on the source
/// after a bounded number of consecutive errors.
#[async_trait]
pub trait InterfaceEvents: Send {
    async fn next_change(&mut self) -> Result<(), WatcherError>;
}
