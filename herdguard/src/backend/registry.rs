// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend factory registry
//!
//! Regions name their backend in configuration; the registry maps that name
//! to a constructor taking the region's [`BackendArguments`].

use super::arguments::BackendArguments;
use super::memory::MemoryBackend;
use super::traits::CacheBackend;
use crate::error::{CacheResult, ConfigError};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for a named backend
pub type BackendFactory =
    Arc<dyn Fn(&BackendArguments) -> CacheResult<Arc<dyn CacheBackend>> + Send + Sync>;

/// Name-to-constructor map for backends
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in backends: `memory` and, when compiled
    /// in, `sled`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert("memory", |args| {
            Ok(Arc::new(MemoryBackend::from_arguments(args)?) as Arc<dyn CacheBackend>)
        });
        #[cfg(feature = "sled-backend")]
        registry.insert("sled", |args| {
            Ok(Arc::new(super::sled::SledBackend::from_arguments(args)?) as Arc<dyn CacheBackend>)
        });
        registry
    }

    fn insert<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&BackendArguments) -> CacheResult<Arc<dyn CacheBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Register a backend constructor under `name`
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(&BackendArguments) -> CacheResult<Arc<dyn CacheBackend>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(ConfigError::DuplicateBackend(name.to_string()));
        }
        debug!("Registering cache backend '{}'", name);
        self.insert(name, factory);
        Ok(())
    }

    /// Look up a constructor without invoking it
    pub fn load(&self, name: &str) -> Result<BackendFactory, ConfigError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))
    }

    /// Construct the backend registered under `name`
    pub fn create(
        &self,
        name: &str,
        arguments: &BackendArguments,
    ) -> CacheResult<Arc<dyn CacheBackend>> {
        let factory = self.load(name)?;
        factory(arguments)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
