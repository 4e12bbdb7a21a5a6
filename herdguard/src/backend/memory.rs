// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory backend for single-process deployments and testing

use super::arguments::BackendArguments;
use super::traits::CacheBackend;
use super::types::{BackendResult, CacheEntry};
use crate::error::ConfigError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory backend
///
/// Entries live in a process-local map. Every `get` and `set` copies the
/// entry, so callers never share a value with the cache.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<HashMap<Vec<u8>, CacheEntry>>>,
}

impl MemoryBackend {
    /// Create an empty memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from region arguments
    ///
    /// The memory backend has no cross-process coordination, so asking for
    /// `distributed_lock` is a configuration error rather than a silent
    /// downgrade.
    pub fn from_arguments(arguments: &BackendArguments) -> Result<Self, ConfigError> {
        if arguments.get_bool("distributed_lock")?.unwrap_or(false) {
            return Err(ConfigError::Unsupported {
                backend: "memory".to_string(),
                feature: "distributed_lock".to_string(),
            });
        }
        Ok(Self::new())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.data.read();
        Ok(keys.iter().map(|key| data.get(*key).cloned()).collect())
    }

    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()> {
        self.data.write().insert(key.to_vec(), value.clone());
        Ok(())
    }

    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key.to_vec(), (*value).clone());
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> BackendResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut data = self.data.write();
        for key in keys {
            data.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_multi_keeps_input_order() {
        let backend = MemoryBackend::new();
        backend.set(b"a", &CacheEntry::new(json!("va"))).unwrap();
        backend.set(b"c", &CacheEntry::new(json!("vc"))).unwrap();

        let values = backend
            .get_multi(&[b"a".as_slice(), b"b".as_slice(), b"c".as_slice()])
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].as_ref().unwrap().payload, json!("va"));
        assert!(values[1].is_none());
        assert_eq!(values[2].as_ref().unwrap().payload, json!("vc"));
    }

    #[test]
    fn test_stored_null_is_not_absent() {
        let backend = MemoryBackend::new();
        backend.set(b"k", &CacheEntry::new(json!(null))).unwrap();
        assert_eq!(backend.get(b"k").unwrap().unwrap().payload, json!(null));
        assert!(backend.get(b"other").unwrap().is_none());
    }

    #[test]
    fn test_distributed_lock_is_rejected() {
        let args = BackendArguments::new().with("distributed_lock", true);
        let err = MemoryBackend::from_arguments(&args).err().unwrap();
        assert!(matches!(err, ConfigError::Unsupported { .. }));

        let args = BackendArguments::new().with("distributed_lock", false);
        assert!(MemoryBackend::from_arguments(&args).is_ok());
    }

    #[test]
    fn test_delete_absent_key_and_clear() {
        let backend = MemoryBackend::new();
        backend.delete(b"nothing").unwrap();
        backend
            .delete_multi(&[b"x".as_slice(), b"y".as_slice()])
            .unwrap();

        backend
            .set_multi(&[
                (b"x".as_slice(), &CacheEntry::new(json!(1))),
                (b"y".as_slice(), &CacheEntry::new(json!(2))),
            ])
            .unwrap();
        assert_eq!(backend.len(), 2);
        backend.clear();
        assert!(backend.is_empty());
    }
}
