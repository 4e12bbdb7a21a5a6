// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend decorators
//!
//! A proxy implements [`CacheBackend`] by wrapping another backend. A region
//! keeps its backend as a [`ProxyChain`]: each `wrap` adds a new outermost
//! layer, and calls flow from the outermost layer inward. A proxy that
//! intercepts an operation must forward it to the next layer exactly once.

pub mod isolating;
pub mod logging;
pub mod registry;

pub use isolating::IsolatingProxy;
pub use logging::LoggingProxy;
pub use registry::ProxyRegistry;

use crate::backend::CacheBackend;
use log::debug;
use std::sync::Arc;

/// Builds a decorator around the next layer of a chain
pub trait ProxyFactory: Send + Sync {
    fn wrap(&self, inner: Arc<dyn CacheBackend>) -> Arc<dyn CacheBackend>;
}

impl<F> ProxyFactory for F
where
    F: Fn(Arc<dyn CacheBackend>) -> Arc<dyn CacheBackend> + Send + Sync,
{
    fn wrap(&self, inner: Arc<dyn CacheBackend>) -> Arc<dyn CacheBackend> {
        self(inner)
    }
}

/// A backend together with the decorators stacked on it
#[derive(Clone)]
pub struct ProxyChain {
    outermost: Arc<dyn CacheBackend>,
    layers: Vec<String>,
}

impl ProxyChain {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            outermost: backend,
            layers: Vec::new(),
        }
    }

    /// Add `factory`'s decorator as the new outermost layer
    pub fn wrap(&mut self, name: &str, factory: &dyn ProxyFactory) {
        debug!("Wrapping cache backend with proxy '{}'", name);
        self.outermost = factory.wrap(Arc::clone(&self.outermost));
        self.layers.push(name.to_string());
    }

    /// The entry point of the chain
    pub fn backend(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&self.outermost)
    }

    /// Decorator names, innermost first
    pub fn layers(&self) -> &[String] {
        &self.layers
    }
}

impl std::fmt::Debug for ProxyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyChain")
            .field("layers", &self.layers)
            .finish()
    }
}
