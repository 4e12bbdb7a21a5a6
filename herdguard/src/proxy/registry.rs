// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Proxy factory registry

use super::{IsolatingProxy, LoggingProxy, ProxyFactory};
use crate::error::ConfigError;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Name-to-factory map for proxies
#[derive(Clone, Default)]
pub struct ProxyRegistry {
    factories: HashMap<String, Arc<dyn ProxyFactory>>,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `debug` and `isolating` proxies
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert("debug".to_string(), Arc::new(LoggingProxy::wrap));
        registry
            .factories
            .insert("isolating".to_string(), Arc::new(IsolatingProxy::wrap));
        registry
    }

    /// Register a proxy factory under `name`
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<(), ConfigError>
    where
        F: ProxyFactory + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(ConfigError::DuplicateProxy(name.to_string()));
        }
        debug!("Registering cache proxy '{}'", name);
        self.factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Arc<dyn ProxyFactory>, ConfigError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProxy(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl std::fmt::Debug for ProxyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ProxyRegistry")
            .field("proxies", &names)
            .finish()
    }
}
