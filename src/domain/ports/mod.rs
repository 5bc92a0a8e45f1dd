mod interface_events;
mod provider_client;

pub use interface_events::InterfaceEvents;
pub use provider_client::ProviderClient;
