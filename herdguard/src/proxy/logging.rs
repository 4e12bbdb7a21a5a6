// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logging proxy
//!
//! Logs every key and value passing through at debug level without touching
//! arguments or results. Registered as the `debug` proxy.

use crate::backend::{BackendResult, CacheBackend, CacheEntry};
use crate::lock::DistributedLock;
use log::debug;
use std::borrow::Cow;
use std::sync::Arc;

pub struct LoggingProxy {
    inner: Arc<dyn CacheBackend>,
}

impl LoggingProxy {
    pub fn new(inner: Arc<dyn CacheBackend>) -> Self {
        Self { inner }
    }

    /// Factory suitable for [`crate::proxy::ProxyChain::wrap`]
    pub fn wrap(inner: Arc<dyn CacheBackend>) -> Arc<dyn CacheBackend> {
        Arc::new(Self::new(inner))
    }
}

fn show(key: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key)
}

fn show_all<'a>(keys: impl Iterator<Item = &'a [u8]>) -> Vec<Cow<'a, str>> {
    keys.map(show).collect()
}

impl CacheBackend for LoggingProxy {
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>> {
        let value = self.inner.get(key)?;
        debug!("CACHE_GET: Key: {:?} Value: {:?}", show(key), value);
        Ok(value)
    }

    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>> {
        let values = self.inner.get_multi(keys)?;
        debug!(
            "CACHE_GET_MULTI: {:?} Values: {:?}",
            show_all(keys.iter().copied()),
            values
        );
        Ok(values)
    }

    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()> {
        debug!("CACHE_SET: Key: {:?} Value: {:?}", show(key), value);
        self.inner.set(key, value)
    }

    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()> {
        debug!(
            "CACHE_SET_MULTI: {:?}",
            entries
                .iter()
                .map(|(key, value)| (show(key), value))
                .collect::<Vec<_>>()
        );
        self.inner.set_multi(entries)
    }

    fn delete(&self, key: &[u8]) -> BackendResult<()> {
        self.inner.delete(key)?;
        debug!("CACHE_DELETE: {:?}", show(key));
        Ok(())
    }

    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()> {
        debug!("CACHE_DELETE_MULTI: {:?}", show_all(keys.iter().copied()));
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
