//! Adapters Layer
//!
//! Inbound adapters drive the application (console commands); outbound
//! adapters implement domain ports (HTTP providers, netlink events).

pub mod inbound;
pub mod outbound;
