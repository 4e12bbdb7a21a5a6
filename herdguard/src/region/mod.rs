// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache regions
//!
//! A [`CacheRegion`] is a long-lived handle on one backend chain. It mangles
//! keys, stamps every value with its creation time, applies expiration and
//! region-wide invalidation, and serializes recomputation of expired keys so
//! that concurrent callers do not stampede the producer.
//!
//! Submodules:
//! - [`invalidation`]: soft and hard invalidation markers
//! - [`stampede`]: the get-or-create protocol
//! - [`config`]: declarative configuration and registries
//! - [`memoize`]: function memoization on top of a region

pub mod config;
pub mod invalidation;
pub mod memoize;
pub mod stampede;

pub use config::{configure_cache_region, RegionConfig, Registry};
pub use invalidation::InvalidationKind;
pub use memoize::{
    dont_cache_none, get_memoization_decorator, MemoizationDecorator, Memoized, MemoizedMulti,
};
pub use stampede::{CreateOptions, ShouldCache};

use crate::backend::{BackendError, CacheBackend, CacheEntry};
use crate::error::{CacheError, CacheResult};
use crate::key::{KeyMangler, MangleKey};
use crate::lock::{KeyLock, KeyLockMap};
use crate::proxy::{ProxyChain, ProxyFactory};
use chrono::{DateTime, Utc};
use invalidation::{marker_timestamp, EntryPolicy, EntryState, InvalidationMemo};
use log::{debug, info};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How long a caller waits for another caller's recomputation by default
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// State fixed when the region is configured
struct Configured {
    chain: RwLock<ProxyChain>,
    expiration_time: Option<Duration>,
    lock_timeout: Duration,
}

impl Configured {
    fn backend(&self) -> Arc<dyn CacheBackend> {
        self.chain.read().backend()
    }
}

/// A memoizing cache region
///
/// Created unconfigured; [`CacheRegion::configure`] attaches a backend
/// exactly once. All operations on an unconfigured region fail with
/// [`CacheError::NotConfigured`], except invalidation which is a no-op.
pub struct CacheRegion {
    name: Option<String>,
    configured: OnceCell<Configured>,
    key_mangler: RwLock<Option<Arc<dyn MangleKey>>>,
    local_locks: KeyLockMap,
}

impl Default for CacheRegion {
    fn default() -> Self {
        Self {
            name: None,
            configured: OnceCell::new(),
            key_mangler: RwLock::new(None),
            local_locks: KeyLockMap::new(),
        }
    }
}

impl CacheRegion {
    /// An unnamed, unconfigured region
    pub fn new() -> Self {
        Self::default()
    }

    /// A named, unconfigured region
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("_")
    }

    /// Attach a backend with the default lock timeout
    ///
    /// Returns `false`, changing nothing, if the region was already
    /// configured.
    pub fn configure(
        &self,
        backend: Arc<dyn CacheBackend>,
        expiration_time: Option<Duration>,
    ) -> bool {
        self.configure_with(backend, expiration_time, DEFAULT_LOCK_TIMEOUT)
    }

    /// Attach a backend; see [`CacheRegion::configure`]
    pub fn configure_with(
        &self,
        backend: Arc<dyn CacheBackend>,
        expiration_time: Option<Duration>,
        lock_timeout: Duration,
    ) -> bool {
        let mut installed = false;
        self.configured.get_or_init(|| {
            installed = true;
            let mut mangler = self.key_mangler.write();
            if mangler.is_none() {
                *mangler = Some(Arc::new(KeyMangler::for_region(self.name.as_deref())));
            }
            Configured {
                chain: RwLock::new(ProxyChain::new(backend)),
                expiration_time,
                lock_timeout,
            }
        });

        if installed {
            info!(
                "Configured cache region '{}' (expiration: {:?}, lock timeout: {:?})",
                self.display_name(),
                expiration_time,
                lock_timeout
            );
        } else {
            debug!("Cache region '{}' is already configured", self.display_name());
        }
        installed
    }

    pub fn is_configured(&self) -> bool {
        self.configured.get().is_some()
    }

    fn configured(&self) -> CacheResult<&Configured> {
        self.configured
            .get()
            .ok_or_else(|| CacheError::NotConfigured(self.display_name().to_string()))
    }

    /// Add a decorator as the new outermost layer of the backend chain
    pub fn wrap(&self, name: &str, factory: &dyn ProxyFactory) -> CacheResult<()> {
        self.configured()?.chain.write().wrap(name, factory);
        Ok(())
    }

    /// Decorator names, innermost first
    pub fn proxy_layers(&self) -> Vec<String> {
        self.configured
            .get()
            .map(|configured| configured.chain.read().layers().to_vec())
            .unwrap_or_default()
    }

    /// The outermost layer of the backend chain
    pub fn backend(&self) -> CacheResult<Arc<dyn CacheBackend>> {
        Ok(self.configured()?.backend())
    }

    pub fn expiration_time(&self) -> Option<Duration> {
        self.configured.get().and_then(|c| c.expiration_time)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.configured
            .get()
            .map_or(DEFAULT_LOCK_TIMEOUT, |c| c.lock_timeout)
    }

    /// Replace the key mangler
    pub fn set_key_mangler<M: MangleKey + 'static>(&self, mangler: M) {
        *self.key_mangler.write() = Some(Arc::new(mangler));
    }

    pub fn has_key_mangler(&self) -> bool {
        self.key_mangler.read().is_some()
    }

    /// Backend key for a logical key
    pub fn mangle_key(&self, key: &str) -> Vec<u8> {
        match self.key_mangler.read().as_ref() {
            Some(mangler) => mangler.mangle(key.as_bytes()),
            None => key.as_bytes().to_vec(),
        }
    }

    /// Get a value, `None` if absent, expired or invalidated
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.get_expiring(key, None)
    }

    /// Like [`CacheRegion::get`], with a per-call expiration override
    pub fn get_expiring<T: DeserializeOwned>(
        &self,
        key: &str,
        expiration_time: Option<Duration>,
    ) -> CacheResult<Option<T>> {
        let configured = self.configured()?;
        let backend = configured.backend();
        let entry = backend.get(&self.mangle_key(key))?;

        let markers = self.invalidation_memo(backend.as_ref());
        let policy = EntryPolicy::new(expiration_time.or(configured.expiration_time), &markers);
        match (policy.classify(entry.as_ref())?, entry) {
            (EntryState::Fresh, Some(entry)) => Ok(Some(decode(entry)?)),
            _ => Ok(None),
        }
    }

    /// Get whatever is stored under `key`, ignoring expiration and
    /// invalidation
    pub fn get_ignoring_expiration<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let backend = self.backend()?;
        match backend.get(&self.mangle_key(key))? {
            Some(entry) => Ok(Some(decode(entry)?)),
            None => Ok(None),
        }
    }

    /// Get several values, aligned with `keys`
    pub fn get_multi<K, T>(&self, keys: &[K]) -> CacheResult<Vec<Option<T>>>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        self.get_multi_expiring(keys, None)
    }

    /// Like [`CacheRegion::get_multi`], with a per-call expiration override
    pub fn get_multi_expiring<K, T>(
        &self,
        keys: &[K],
        expiration_time: Option<Duration>,
    ) -> CacheResult<Vec<Option<T>>>
    where
        K: AsRef<str>,
        T: DeserializeOwned,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let configured = self.configured()?;
        let backend = configured.backend();
        let mangled: Vec<Vec<u8>> = keys.iter().map(|k| self.mangle_key(k.as_ref())).collect();
        let entries = get_aligned(backend.as_ref(), &borrowed(&mangled))?;

        let markers = self.invalidation_memo(backend.as_ref());
        let policy = EntryPolicy::new(expiration_time.or(configured.expiration_time), &markers);
        entries
            .into_iter()
            .map(|entry| -> CacheResult<Option<T>> {
                match (policy.classify(entry.as_ref())?, entry) {
                    (EntryState::Fresh, Some(entry)) => Ok(Some(decode(entry)?)),
                    _ => Ok(None),
                }
            })
            .collect()
    }

    /// Store a value, replacing any previous one
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let backend = self.backend()?;
        backend.set(&self.mangle_key(key), &encode(value)?)?;
        Ok(())
    }

    /// Store several values
    pub fn set_multi<K, T>(&self, entries: &[(K, T)]) -> CacheResult<()>
    where
        K: AsRef<str>,
        T: Serialize,
    {
        if entries.is_empty() {
            return Ok(());
        }
        let backend = self.backend()?;
        let encoded = entries
            .iter()
            .map(|(key, value)| -> CacheResult<(Vec<u8>, CacheEntry)> {
                Ok((self.mangle_key(key.as_ref()), encode(value)?))
            })
            .collect::<CacheResult<Vec<_>>>()?;
        let writes: Vec<(&[u8], &CacheEntry)> = encoded
            .iter()
            .map(|(key, entry)| (key.as_slice(), entry))
            .collect();
        backend.set_multi(&writes)?;
        Ok(())
    }

    /// Remove a value; removing an absent key is not an error
    pub fn delete(&self, key: &str) -> CacheResult<()> {
        let backend = self.backend()?;
        backend.delete(&self.mangle_key(key))?;
        Ok(())
    }

    pub fn delete_multi<K: AsRef<str>>(&self, keys: &[K]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let backend = self.backend()?;
        let mangled: Vec<Vec<u8>> = keys.iter().map(|k| self.mangle_key(k.as_ref())).collect();
        backend.delete_multi(&borrowed(&mangled))?;
        Ok(())
    }

    /// Invalidate every entry created before now
    ///
    /// A hard invalidation makes those entries unservable; a soft one lets
    /// them be served while a single caller refreshes them. Either kind
    /// clears the other marker.
    pub fn invalidate(&self, hard: bool) -> CacheResult<()> {
        if !self.is_configured() {
            return Ok(());
        }
        let kind = if hard {
            InvalidationKind::Hard
        } else {
            InvalidationKind::Soft
        };
        let now = Utc::now();
        self.set(&kind.marker_key(self.name()), &Some(now))?;
        self.set(&kind.other().marker_key(self.name()), &None::<DateTime<Utc>>)?;
        info!(
            "Cache region '{}' {} invalidated at {}",
            self.display_name(),
            kind,
            now
        );
        Ok(())
    }

    /// Remove both invalidation markers
    pub fn reset_invalidation(&self) -> CacheResult<()> {
        if !self.is_configured() {
            return Ok(());
        }
        self.delete_multi(&[
            InvalidationKind::Soft.marker_key(self.name()),
            InvalidationKind::Hard.marker_key(self.name()),
        ])
    }

    /// Current soft invalidation time, read from the backend
    pub fn soft_invalidated(&self) -> CacheResult<Option<DateTime<Utc>>> {
        self.invalidated(InvalidationKind::Soft)
    }

    /// Current hard invalidation time, read from the backend
    pub fn hard_invalidated(&self) -> CacheResult<Option<DateTime<Utc>>> {
        self.invalidated(InvalidationKind::Hard)
    }

    fn invalidated(&self, kind: InvalidationKind) -> CacheResult<Option<DateTime<Utc>>> {
        let Some(configured) = self.configured.get() else {
            return Ok(None);
        };
        let key = self.mangle_key(&kind.marker_key(self.name()));
        marker_timestamp(configured.backend().get(&key)?)
    }

    /// Flush the backend chain
    pub fn shutdown(&self) -> CacheResult<()> {
        if let Some(configured) = self.configured.get() {
            configured.backend().flush()?;
            info!("Cache region '{}' shut down", self.display_name());
        }
        Ok(())
    }

    /// A fresh per-call view of the invalidation markers
    fn invalidation_memo<'a>(&self, backend: &'a dyn CacheBackend) -> InvalidationMemo<'a> {
        InvalidationMemo::new(
            backend,
            self.mangle_key(&InvalidationKind::Soft.marker_key(self.name())),
            self.mangle_key(&InvalidationKind::Hard.marker_key(self.name())),
        )
    }

    /// The lock serializing recomputation of `mangled`
    fn key_lock(&self, backend: &dyn CacheBackend, mangled: &[u8]) -> KeyLock {
        match backend.get_mutex(mangled) {
            Some(lock) => KeyLock::Distributed(lock),
            None => KeyLock::Local(self.local_locks.lock_for(mangled)),
        }
    }
}

impl std::fmt::Debug for CacheRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegion")
            .field("name", &self.name)
            .field("configured", &self.is_configured())
            .field("proxies", &self.proxy_layers())
            .finish()
    }
}

pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<CacheEntry> {
    Ok(CacheEntry::new(serde_json::to_value(value)?))
}

pub(crate) fn decode<T: DeserializeOwned>(entry: CacheEntry) -> CacheResult<T> {
    Ok(serde_json::from_value(entry.payload)?)
}

pub(crate) fn borrowed(keys: &[Vec<u8>]) -> Vec<&[u8]> {
    keys.iter().map(Vec::as_slice).collect()
}

/// `get_multi` with its 1:1 alignment checked
pub(crate) fn get_aligned(
    backend: &dyn CacheBackend,
    keys: &[&[u8]],
) -> CacheResult<Vec<Option<CacheEntry>>> {
    let entries = backend.get_multi(keys)?;
    if entries.len() != keys.len() {
        return Err(BackendError::Engine(format!(
            "get_multi returned {} values for {} keys",
            entries.len(),
            keys.len()
        ))
        .into());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn region() -> CacheRegion {
        let region = CacheRegion::named("tests");
        region.configure(Arc::new(MemoryBackend::new()), None);
        region
    }

    #[test]
    fn test_unconfigured_region() {
        let region = CacheRegion::new();
        assert!(!region.is_configured());
        assert!(matches!(
            region.get::<String>("k"),
            Err(CacheError::NotConfigured(_))
        ));
        region.invalidate(true).unwrap();
        assert_eq!(region.hard_invalidated().unwrap(), None);
        assert!(region.proxy_layers().is_empty());
    }

    #[test]
    fn test_configure_is_idempotent() {
        let first = Arc::new(MemoryBackend::new());
        let region = CacheRegion::named("r");
        assert!(region.configure(first.clone(), Some(Duration::from_secs(5))));
        assert!(!region.configure(Arc::new(MemoryBackend::new()), None));
        assert_eq!(region.expiration_time(), Some(Duration::from_secs(5)));

        region.set("k", "v").unwrap();
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_default_mangler_is_installed() {
        let region = region();
        assert!(region.has_key_mangler());
        assert_eq!(region.mangle_key("k"), b"tests.k".to_vec());

        let custom = CacheRegion::new();
        custom.set_key_mangler(|key: &[u8]| key.to_vec());
        custom.configure(Arc::new(MemoryBackend::new()), None);
        assert_eq!(custom.mangle_key("k"), b"k".to_vec());
    }

    #[test]
    fn test_set_get_delete() {
        let region = region();
        region.set("k", &json!({"a": [1, 2]})).unwrap();
        assert_eq!(
            region.get::<serde_json::Value>("k").unwrap(),
            Some(json!({"a": [1, 2]}))
        );
        region.delete("k").unwrap();
        assert_eq!(region.get::<serde_json::Value>("k").unwrap(), None);
    }

    #[test]
    fn test_stored_none_is_a_value() {
        let region = region();
        region.set("k", &None::<u32>).unwrap();
        assert_eq!(region.get::<Option<u32>>("k").unwrap(), Some(None));
        assert_eq!(region.get::<Option<u32>>("other").unwrap(), None);
    }

    #[test]
    fn test_expired_value_is_hidden_from_get() {
        let region = CacheRegion::new();
        let backend = Arc::new(MemoryBackend::new());
        region.configure(backend.clone(), Some(Duration::from_secs(1)));

        let old = CacheEntry::created_at(json!("old"), Utc::now() - chrono::Duration::seconds(5));
        backend.set(&region.mangle_key("k"), &old).unwrap();

        assert_eq!(region.get::<String>("k").unwrap(), None);
        assert_eq!(
            region.get_ignoring_expiration::<String>("k").unwrap(),
            Some("old".to_string())
        );
        assert_eq!(
            region
                .get_expiring::<String>("k", Some(Duration::from_secs(60)))
                .unwrap(),
            Some("old".to_string())
        );
    }

    #[test]
    fn test_invalidate_sets_one_marker_and_clears_the_other() {
        let region = region();
        region.invalidate(false).unwrap();
        assert!(region.soft_invalidated().unwrap().is_some());
        assert!(region.hard_invalidated().unwrap().is_none());

        region.invalidate(true).unwrap();
        assert!(region.hard_invalidated().unwrap().is_some());
        assert!(region.soft_invalidated().unwrap().is_none());

        region.reset_invalidation().unwrap();
        assert!(region.hard_invalidated().unwrap().is_none());
        assert!(region.get_ignoring_expiration::<serde_json::Value>(
            &InvalidationKind::Hard.marker_key(Some("tests"))
        )
        .unwrap()
        .is_none());
    }

    #[test]
    fn test_hard_invalidation_hides_older_values() {
        let region = region();
        region.set("k", "v").unwrap();
        region.invalidate(true).unwrap();
        assert_eq!(region.get::<String>("k").unwrap(), None);

        region.set("k", "v2").unwrap();
        assert_eq!(region.get::<String>("k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn test_multi_operations() {
        let region = region();
        assert!(region.get_multi::<&str, u32>(&[]).unwrap().is_empty());

        region.set_multi(&[("a", 1), ("c", 3)]).unwrap();
        assert_eq!(
            region.get_multi::<_, u32>(&["a", "b", "c"]).unwrap(),
            vec![Some(1), None, Some(3)]
        );

        region.delete_multi(&["a", "c"]).unwrap();
        assert_eq!(
            region.get_multi::<_, u32>(&["a", "c"]).unwrap(),
            vec![None, None]
        );
    }
}
