// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend capability contract
//!
//! This module defines the trait every storage engine must implement to sit
//! behind a cache region. Decorators in [`crate::proxy`] implement the same
//! trait, so a region never knows how many layers it is talking through.

use super::types::{BackendResult, CacheEntry};
use crate::lock::DistributedLock;
use std::sync::Arc;

/// Storage engine contract used by cache regions
///
/// Keys are already mangled by the region. Any call may perform network or
/// disk I/O; callers must not assume a call is non-blocking.
pub trait CacheBackend: Send + Sync {
    /// Get an entry by key, `None` when absent
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>>;

    /// Get several entries; the result is aligned 1:1 with `keys`
    ///
    /// An empty `keys` slice must return an empty vector without touching
    /// the engine.
    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>>;

    /// Store an entry, replacing any previous one
    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()>;

    /// Store several entries
    ///
    /// Engines with atomic multi-writes should use them; the region does not
    /// compensate for partial failure.
    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()>;

    /// Remove an entry; removing an absent key is not an error
    fn delete(&self, key: &[u8]) -> BackendResult<()>;

    /// Remove several entries
    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()>;

    /// Distributed lock for `key`, or `None` to let the region fall back to
    /// an in-process mutex
    fn get_mutex(&self, _key: &[u8]) -> Option<Box<dyn DistributedLock>> {
        None
    }

    /// Whether locks handed out by [`CacheBackend::get_mutex`] expire on
    /// their own
    fn has_lock_timeout(&self) -> bool {
        false
    }

    /// Flush pending writes
    fn flush(&self) -> BackendResult<()> {
        Ok(())
    }
}

// Forwarding implementations so shared and boxed backends can be used
// wherever a backend is expected.
impl<B: CacheBackend + ?Sized> CacheBackend for Arc<B> {
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>> {
        (**self).get_multi(keys)
    }

    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()> {
        (**self).set(key, value)
    }

    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()> {
        (**self).set_multi(entries)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<()> {
        (**self).delete(key)
    }

    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()> {
        (**self).delete_multi(keys)
    }

    fn get_mutex(&self, key: &[u8]) -> Option<Box<dyn DistributedLock>> {
        (**self).get_mutex(key)
    }

    fn has_lock_timeout(&self) -> bool {
        (**self).has_lock_timeout()
    }

    fn flush(&self) -> BackendResult<()> {
        (**self).flush()
    }
}

impl<B: CacheBackend + ?Sized> CacheBackend for Box<B> {
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>> {
        (**self).get_multi(keys)
    }

    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()> {
        (**self).set(key, value)
    }

    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()> {
        (**self).set_multi(entries)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<()> {
        (**self).delete(key)
    }

    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()> {
        (**self).delete_multi(keys)
    }

    fn get_mutex(&self, key: &[u8]) -> Option<Box<dyn DistributedLock>> {
        (**self).get_mutex(key)
    }

    fn has_lock_timeout(&self) -> bool {
        (**self).has_lock_timeout()
    }

    fn flush(&self) -> BackendResult<()> {
        (**self).flush()
    }
}
