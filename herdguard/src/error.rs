// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for cache regions
//!
//! Errors fall into a small taxonomy:
//! - configuration errors, reported synchronously to whoever configures a region
//! - backend errors, surfaced unchanged from the storage engine
//! - producer errors, which never pass through this module at all because
//!   `get_or_create*` is generic over the caller's own error type
//!
//! Lock timeouts are not errors; the region degrades to creating without
//! exclusivity instead.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors raised while configuring a region or its registries
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration target is not a cache region")]
    NotARegion,

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("unknown proxy: {0}")]
    UnknownProxy(String),

    #[error("backend already registered: {0}")]
    DuplicateBackend(String),

    #[error("proxy already registered: {0}")]
    DuplicateProxy(String),

    #[error("invalid backend argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("{feature} is not supported by the {backend} backend")]
    Unsupported { backend: String, feature: String },

    #[error("invalid region configuration: {0}")]
    Invalid(String),
}

/// Errors raised by region operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("cache region '{0}' is not configured")]
    NotConfigured(String),

    #[error("failed to convert cached value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("creator returned {got} values for {expected} keys")]
    CreatorArity { expected: usize, got: usize },

    /// A producer failure, for callers that use `CacheError` as their own
    /// error type in `get_or_create`.
    #[error("creator failed: {0}")]
    Creator(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wrap an arbitrary producer failure.
    pub fn creator<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CacheError::Creator(error.into())
    }
}

/// Result type for region operations
pub type CacheResult<T> = Result<T, CacheError>;
