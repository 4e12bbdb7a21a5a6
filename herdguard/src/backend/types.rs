// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend value types and error handling
//!
//! Every value a region writes is wrapped in a [`CacheEntry`] carrying its
//! creation time, so expiration and invalidation can be decided from the
//! entry alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current layout version of [`CacheMetadata`]
pub const ENTRY_VERSION: u32 = 1;

/// Metadata stored alongside every cached payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the payload was produced
    pub created_at: DateTime<Utc>,
    /// Entry layout version
    pub version: u32,
}

/// A cached payload together with its metadata
///
/// Entries are immutable once written; a `set` always replaces the whole
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: serde_json::Value,
    pub metadata: CacheMetadata,
}

impl CacheEntry {
    /// Wrap a payload created right now
    pub fn new(payload: serde_json::Value) -> Self {
        Self::created_at(payload, Utc::now())
    }

    /// Wrap a payload with an explicit creation time
    pub fn created_at(payload: serde_json::Value, created_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            metadata: CacheMetadata {
                created_at,
                version: ENTRY_VERSION,
            },
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    /// Age of the entry; zero if the clock went backwards
    pub fn age(&self) -> std::time::Duration {
        Utc::now()
            .signed_duration_since(self.metadata.created_at)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

/// Error type for backend operations
///
/// "Key not found" is never an error: lookups return `None` instead.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Engine(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

#[cfg(feature = "sled-backend")]
impl From<sled::Error> for BackendError {
    fn from(e: sled::Error) -> Self {
        BackendError::Engine(e.to_string())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
