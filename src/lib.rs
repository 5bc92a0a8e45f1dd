//! ip-widget Library
//!
//! Keeps the country of the host's current public IP up to date and
//! publishes it to a presentation layer. Exposed as a library for
//! integration tests and embedding.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::{build_http_client, HttpProviderClient, RetryPolicy};
pub use application::{OrchestratorConfig, OrchestratorHandle, RefreshOrchestrator};
pub use config::load_config;
pub use domain::entities::{FieldMap, ProviderDescriptor, ResolutionResult, ResolutionState, Trigger};
pub use domain::errors::{ProviderError, RegistryError, WatcherError};
pub use domain::ports::{InterfaceEvents, ProviderClient};
pub use domain::services::ProviderRegistry;
pub use domain::value_objects::CountryCode;
pub use infrastructure::{NetworkChangeWatcher, ShutdownController, WatcherConfig};
