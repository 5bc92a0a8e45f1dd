//! Provider Client Port
//!
//! Defines the interface for resolving the host's public IP to a country.

use crate::domain::entities::{ProviderDescriptor, ResolutionResult};
use async_trait::async_trait;

/// One geolocation service.
///
/// This is an outbound port. Implementations perform the lookup with their
/// own retry policy and never return an error: every failure mode is
/// folded into a `ResolutionResult` with `success == false`.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Descriptor this client is bound to.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Provider name, shorthand for `descriptor().name`.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Resolve the current public IP and its country.
    async fn resolve(&self) -> ResolutionResult;
}
