use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{ProviderError, RegistryError};
use crate::traits::{MethodFuture, MethodTable, Provider};

type Constructor = Arc<dyn Fn(&Value) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Provider types the bus knows how to build, keyed by type name.
#[derive(Clone, Default)]
pub struct ProviderCatalog {
    constructors: HashMap<String, Constructor>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor. The closure receives the `options` sent with
    /// `create` (`null` when none were given).
    pub fn register<F>(
        &mut self,
        provider_type: impl Into<String>,
        constructor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Value) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync + 'static,
    {
        let provider_type = provider_type.into();
        if self.constructors.contains_key(&provider_type) {
            return Err(RegistryError::AlreadyRegistered(provider_type));
        }
        self.constructors
            .insert(provider_type, Arc::new(constructor));
        Ok(())
    }

    pub fn contains(&self, provider_type: &str) -> bool {
        self.constructors.contains_key(provider_type)
    }

    pub fn types(&self) -> impl Iterator<Item = &String> {
        self.constructors.keys()
    }

    pub fn construct(
        &self,
        provider_type: &str,
        options: &Value,
    ) -> Result<ProviderInstance, RegistryError> {
        let constructor = self
            .constructors
            .get(provider_type)
            .ok_or_else(|| RegistryError::UnknownProviderType(provider_type.to_string()))?;
        let provider = constructor(options).map_err(|source| RegistryError::Construction {
            provider_type: provider_type.to_string(),
            source,
        })?;
        Ok(ProviderInstance::new(provider_type, provider))
    }
}

/// A live provider together with its declared surface.
#[derive(Debug)]
pub struct ProviderInstance {
    provider_type: String,
    methods: MethodTable,
}

impl ProviderInstance {
    pub fn new(provider_type: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self {
            provider_type: provider_type.into(),
            methods: provider.methods(),
        }
    }

    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }
}

/// Live provider instances keyed by caller-chosen name.
#[derive(Default)]
pub struct ProviderRegistry {
    catalog: ProviderCatalog,
    instances: HashMap<String, ProviderInstance>,
}

impl ProviderRegistry {
    pub fn new(catalog: ProviderCatalog) -> Self {
        Self {
            catalog,
            instances: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    /// Builds a `provider_type` instance and stores it under `name`. An
    /// existing instance with the same name is replaced, not merged.
    pub fn create(
        &mut self,
        name: &str,
        provider_type: &str,
        options: &Value,
    ) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidName);
        }
        let instance = self.catalog.construct(provider_type, options)?;
        debug!(
            name,
            provider_type,
            methods = ?instance.methods().names(),
            "provider created"
        );
        self.insert(name, instance);
        Ok(())
    }

    /// Stores a prebuilt instance, returning the one it replaced.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        instance: ProviderInstance,
    ) -> Option<ProviderInstance> {
        let name = name.into();
        let previous = self.instances.insert(name.clone(), instance);
        if let Some(previous) = previous.as_ref() {
            warn!(
                name = %name,
                previous_type = previous.provider_type(),
                "replaced existing provider instance"
            );
        }
        previous
    }

    /// Resolves `provider.method` and starts it. Lookup failures are returned
    /// immediately; the method's own rejection surfaces through the future.
    pub fn call(
        &self,
        provider: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<MethodFuture, RegistryError> {
        let instance = self
            .instances
            .get(provider)
            .ok_or_else(|| RegistryError::UnknownProvider(provider.to_string()))?;
        instance
            .methods()
            .invoke(method, args)
            .ok_or_else(|| RegistryError::UnknownMethod {
                provider: provider.to_string(),
                method: method.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&ProviderInstance> {
        self.instances.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ProviderInstance> {
        self.instances.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.instances.keys()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Drops every live instance.
    pub fn clear(&mut self) {
        self.instances.clear();
    }
}
