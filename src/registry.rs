//! Per-instance adapter registry.
//!
//! A convenience for applications wiring several backends of one primitive
//! (say, a memory cache for tests and a database cache in production) and
//! selecting among them by name. Purely additive: providers take adapters
//! directly and never require a registry.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no default adapter is defined")]
    DefaultAdapterNotDefined,
    #[error("no adapter registered under {name:?}")]
    UnregisteredAdapter { name: String },
}

/// Named adapters with an optional default.
#[derive(Debug, Clone)]
pub struct AdapterRegistry<A> {
    adapters: HashMap<String, A>,
    default: Option<String>,
}

impl<A> Default for AdapterRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AdapterRegistry<A> {
    pub fn new() -> Self {
        Self { adapters: HashMap::new(), default: None }
    }

    /// Register `adapter` under `name`, replacing any previous entry.
    pub fn register(mut self, name: impl Into<String>, adapter: A) -> Self {
        self.adapters.insert(name.into(), adapter);
        self
    }

    /// Register and make it the default in one step.
    pub fn register_default(mut self, name: impl Into<String>, adapter: A) -> Self {
        let name = name.into();
        self.adapters.insert(name.clone(), adapter);
        self.default = Some(name);
        self
    }

    /// Point the default at an already-registered name.
    pub fn with_default(mut self, name: impl Into<String>) -> Result<Self, RegistryError> {
        let name = name.into();
        if !self.adapters.contains_key(&name) {
            return Err(RegistryError::UnregisteredAdapter { name });
        }
        self.default = Some(name);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&A, RegistryError> {
        self.adapters
            .get(name)
            .ok_or_else(|| RegistryError::UnregisteredAdapter { name: name.to_string() })
    }

    pub fn get_default(&self) -> Result<&A, RegistryError> {
        let name = self.default.as_deref().ok_or(RegistryError::DefaultAdapterNotDefined)?;
        self.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}
