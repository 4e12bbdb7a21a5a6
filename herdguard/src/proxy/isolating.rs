// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value-isolating proxy
//!
//! Hands the next layer and the caller independent copies of every entry.
//! Registered as the `isolating` proxy, for custom backends that return
//! entries they keep referencing; the built-in engines already copy.

use crate::backend::{BackendResult, CacheBackend, CacheEntry};
use crate::lock::DistributedLock;
use std::sync::Arc;

pub struct IsolatingProxy {
    inner: Arc<dyn CacheBackend>,
}

impl IsolatingProxy {
    pub fn new(inner: Arc<dyn CacheBackend>) -> Self {
        Self { inner }
    }

    pub fn wrap(inner: Arc<dyn CacheBackend>) -> Arc<dyn CacheBackend> {
        Arc::new(Self::new(inner))
    }
}

fn isolate(entry: &CacheEntry) -> CacheEntry {
    CacheEntry {
        payload: entry.payload.clone(),
        metadata: entry.metadata,
    }
}

impl CacheBackend for IsolatingProxy {
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>> {
        Ok(self.inner.get(key)?.as_ref().map(isolate))
    }

    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>> {
        Ok(self
            .inner
            .get_multi(keys)?
            .iter()
            .map(|value| value.as_ref().map(isolate))
            .collect())
    }

    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()> {
        self.inner.set(key, &isolate(value))
    }

    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()> {
        let copies: Vec<CacheEntry> = entries.iter().map(|(_, value)| isolate(value)).collect();
        let entries: Vec<(&[u8], &CacheEntry)> = entries
            .iter()
            .zip(&copies)
            .map(|((key, _), copy)| (*key, copy))
            .collect();
        self.inner.set_multi(&entries)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<()> {
        self.inner.delete(key)
    }

    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()> {
        self.inner.delete_multi(keys)
    }

    fn get_mutex(&self, key: &[u8]) -> Option<Box<dyn DistributedLock>> {
        self.inner.get_mutex(key)
    }

    fn has_lock_timeout(&self) -> bool {
        self.inner.has_lock_timeout()
    }

    fn flush(&self) -> BackendResult<()> {
        self.inner.flush()
    }
}
