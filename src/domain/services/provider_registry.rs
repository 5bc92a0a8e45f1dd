//! Provider Registry Service
//!
//! Holds the available provider clients and which one is active.

use crate::domain::entities::ProviderDescriptor;
use crate::domain::errors::RegistryError;
use crate::domain::ports::ProviderClient;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Builds a client for a descriptor. Lets the registry stay free of any
/// transport details.
pub type ClientFactory = Arc<dyn Fn(ProviderDescriptor) -> Arc<dyn ProviderClient> + Send + Sync>;

/// Registry of provider clients keyed by name.
///
/// Selection is data: switching providers swaps an `Arc` under a single
/// write lock, so `set_active` and `active` never observe a half-made switch.
/// Callers that already hold a client from `active()` keep using it until
/// they are done, even if the active provider changes meanwhile.
pub struct ProviderRegistry {
    factory: ClientFactory,
    providers: DashMap<String, Arc<dyn ProviderClient>>,
    active: RwLock<Option<Arc<dyn ProviderClient>>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(ProviderDescriptor) -> Arc<dyn ProviderClient> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            providers: DashMap::new(),
            active: RwLock::new(None),
        }
    }

    /// Create a registry with the built-in providers, FreeIPAPI active.
    pub fn with_defaults<F>(factory: F) -> Self
    where
        F: Fn(ProviderDescriptor) -> Arc<dyn ProviderClient> + Send + Sync + 'static,
    {
        let registry = Self::new(factory);
        for descriptor in [ProviderDescriptor::free_ip_api(), ProviderDescriptor::ip2location()] {
            // Names are distinct constants.
            let _ = registry.register(descriptor);
        }
        registry
    }

    /// Register a provider from its descriptor.
    ///
    /// The first provider registered becomes active.
    pub fn register(&self, descriptor: ProviderDescriptor) -> Result<(), RegistryError> {
        if self.providers.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateProvider(descriptor.name));
        }
        let client = (self.factory)(descriptor);
        self.register_client(client)
    }

    /// Register an already-built client.
    pub fn register_client(&self, client: Arc<dyn ProviderClient>) -> Result<(), RegistryError> {
        let name = client.name().to_string();
        match self.providers.entry(name.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateProvider(name)),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
            }
        }

        let mut active = self.active.write();
        if active.is_none() {
            tracing::debug!("provider {} is now active", name);
            *active = Some(client);
        }
        Ok(())
    }

    /// Make `name` the active provider.
    ///
    /// Returns `Ok(false)` when `name` is already active, so a no-op switch
    /// never causes a refresh.
    pub fn set_active(&self, name: &str) -> Result<bool, RegistryError> {
        let candidate = self
            .providers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))?;

        let mut active = self.active.write();
        if active.as_ref().is_some_and(|current| current.name() == name) {
            return Ok(false);
        }
        *active = Some(candidate);
        Ok(true)
    }

    /// Client for the currently active provider.
    pub fn active(&self) -> Option<Arc<dyn ProviderClient>> {
        self.active.read().clone()
    }

    /// Name of the currently active provider.
    pub fn active_name(&self) -> Option<String> {
        self.active.read().as_ref().map(|c| c.name().to_string())
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
