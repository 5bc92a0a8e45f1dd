mod http_provider_client;
#[cfg(target_os = "linux")]
mod netlink_interface_events;

pub use http_provider_client::{build_http_client, HttpProviderClient, RetryPolicy};
#[cfg(target_os = "linux")]
pub use netlink_interface_events::NetlinkInterfaceEvents;

use crate::domain::errors::WatcherError;
use crate::domain::ports::InterfaceEvents;

/// Open the platform's native interface-change source, if it has one.
pub fn open_native_interface_events() -> Result<Box<dyn InterfaceEvents>, WatcherError> {
    #[cfg(target_os = "linux")]
    {
        NetlinkInterfaceEvents::open().map(|events| Box::new(events) as Box<dyn InterfaceEvents>)
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(WatcherError::Unsupported)
    }
}
