// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Get-or-create with stampede protection
//!
//! For every key, concurrent callers split into one creator and any number
//! of waiters:
//! - a fresh value is returned straight away
//! - a stale value (expired or soft-invalidated) is served to everyone who
//!   cannot take the key's lock without waiting; the lock holder recomputes
//! - a missing (or hard-invalidated) value makes callers wait up to the lock
//!   timeout; whoever gets the lock re-reads, and recomputes only if nobody
//!   else has in the meantime
//!
//! A wait that times out proceeds to create without the lock. A creator that
//! fails releases the lock without writing, and its error goes only to its
//! own caller.

use super::invalidation::{EntryPolicy, EntryState};
use super::{decode, encode, get_aligned, CacheRegion};
use crate::backend::{CacheBackend, CacheEntry};
use crate::error::CacheError;
use crate::lock::LockGuard;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Predicate deciding whether a freshly created value is written back
pub type ShouldCache<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Per-call overrides for `get_or_create*`
pub struct CreateOptions<T> {
    /// Expiration used instead of the region's
    pub expiration_time: Option<Duration>,
    /// Values failing this predicate are returned but not cached
    pub should_cache: Option<ShouldCache<T>>,
}

impl<T> Default for CreateOptions<T> {
    fn default() -> Self {
        Self {
            expiration_time: None,
            should_cache: None,
        }
    }
}

impl<T> Clone for CreateOptions<T> {
    fn clone(&self) -> Self {
        Self {
            expiration_time: self.expiration_time,
            should_cache: self.should_cache.clone(),
        }
    }
}

impl<T> CreateOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_expiration_time(mut self, expiration_time: Duration) -> Self {
        self.expiration_time = Some(expiration_time);
        self
    }

    pub fn with_should_cache<F>(mut self, should_cache: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.should_cache = Some(Arc::new(should_cache));
        self
    }

    pub(crate) fn should_cache(&self, value: &T) -> bool {
        self.should_cache
            .as_ref()
            .map_or(true, |should_cache| should_cache(value))
    }
}

impl<T> std::fmt::Debug for CreateOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateOptions")
            .field("expiration_time", &self.expiration_time)
            .field("should_cache", &self.should_cache.is_some())
            .finish()
    }
}

impl CacheRegion {
    /// Return the cached value for `key`, creating it with `creator` when
    /// absent, expired or invalidated
    pub fn get_or_create<T, E, F>(&self, key: &str, creator: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.get_or_create_with(key, creator, &CreateOptions::default())
    }

    /// [`CacheRegion::get_or_create`] with per-call options
    pub fn get_or_create_with<T, E, F>(
        &self,
        key: &str,
        creator: F,
        options: &CreateOptions<T>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Result<T, E>,
    {
        let configured = self.configured()?;
        let backend = configured.backend();
        let mangled = self.mangle_key(key);

        let markers = self.invalidation_memo(backend.as_ref());
        let policy = EntryPolicy::new(
            options.expiration_time.or(configured.expiration_time),
            &markers,
        );

        let entry = backend.get(&mangled).map_err(CacheError::from)?;
        let guard = match cached(&policy, key, entry)? {
            Cached::Fresh(value) => return Ok(value),
            Cached::Stale(stale) => {
                let lock = self.key_lock(backend.as_ref(), &mangled);
                match lock.acquire(None).map_err(CacheError::from)? {
                    Some(guard) => Some(guard),
                    None => {
                        debug!("Serving stale value for {:?} while it is recreated", key);
                        return Ok(stale);
                    }
                }
            }
            Cached::Missing => {
                let guard = self
                    .key_lock(backend.as_ref(), &mangled)
                    .acquire(Some(configured.lock_timeout))
                    .map_err(CacheError::from)?;
                if guard.is_none() {
                    warn!(
                        "Timed out after {:?} waiting for create lock on {:?}; creating without it",
                        configured.lock_timeout, key
                    );
                }
                guard
            }
        };

        // Someone may have finished creating while we waited
        let entry = backend.get(&mangled).map_err(CacheError::from)?;
        if let Cached::Fresh(value) = cached(&policy, key, entry)? {
            debug!("Value for {:?} was created by another caller", key);
            return Ok(value);
        }

        create(backend.as_ref(), &mangled, creator, options, guard)
    }

    /// Multi-key [`CacheRegion::get_or_create`]
    ///
    /// `creator` is called at most once, with the keys that need creating in
    /// input order, and must return one value per key in the same order.
    pub fn get_or_create_multi<K, T, E, F>(&self, keys: &[K], creator: F) -> Result<Vec<T>, E>
    where
        K: AsRef<str>,
        T: Serialize + DeserializeOwned + Clone,
        E: From<CacheError>,
        F: FnOnce(&[&K]) -> Result<Vec<T>, E>,
    {
        self.get_or_create_multi_with(keys, creator, &CreateOptions::default())
    }

    /// [`CacheRegion::get_or_create_multi`] with per-call options
    pub fn get_or_create_multi_with<K, T, E, F>(
        &self,
        keys: &[K],
        creator: F,
        options: &CreateOptions<T>,
    ) -> Result<Vec<T>, E>
    where
        K: AsRef<str>,
        T: Serialize + DeserializeOwned + Clone,
        E: From<CacheError>,
        F: FnOnce(&[&K]) -> Result<Vec<T>, E>,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let configured = self.configured()?;
        let backend = configured.backend();
        let markers = self.invalidation_memo(backend.as_ref());
        let policy = EntryPolicy::new(
            options.expiration_time.or(configured.expiration_time),
            &markers,
        );

        // Repeated keys share one slot
        let mangled: Vec<Vec<u8>> = keys.iter().map(|k| self.mangle_key(k.as_ref())).collect();
        let mut first_index: Vec<usize> = Vec::new();
        let mut slots: Vec<usize> = Vec::with_capacity(keys.len());
        {
            let mut seen: HashMap<&[u8], usize> = HashMap::new();
            for (index, key) in mangled.iter().enumerate() {
                let slot = *seen.entry(key.as_slice()).or_insert_with(|| {
                    first_index.push(index);
                    first_index.len() - 1
                });
                slots.push(slot);
            }
        }
        let unique: Vec<&[u8]> = first_index.iter().map(|&i| mangled[i].as_slice()).collect();

        let mut values: Vec<Option<T>> = (0..unique.len()).map(|_| None).collect();
        let mut pending: Vec<(usize, Option<T>)> = Vec::new();
        for (slot, entry) in get_aligned(backend.as_ref(), &unique)?.into_iter().enumerate() {
            let key = keys[first_index[slot]].as_ref();
            match cached(&policy, key, entry)? {
                Cached::Fresh(value) => values[slot] = Some(value),
                Cached::Stale(stale) => pending.push((slot, Some(stale))),
                Cached::Missing => pending.push((slot, None)),
            }
        }

        let mut guards: Vec<LockGuard> = Vec::new();
        if !pending.is_empty() {
            // Fixed lock order across callers
            pending.sort_by(|a, b| unique[a.0].cmp(unique[b.0]));
            // One wait budget for the whole call, not one per key
            let deadline = Instant::now().checked_add(configured.lock_timeout);

            let mut recheck: Vec<usize> = Vec::new();
            for (slot, stale) in pending {
                let lock = self.key_lock(backend.as_ref(), unique[slot]);
                match stale {
                    Some(stale) => match lock.acquire(None).map_err(CacheError::from)? {
                        Some(guard) => {
                            guards.push(guard);
                            recheck.push(slot);
                        }
                        None => {
                            debug!(
                                "Serving stale value for {:?} while it is recreated",
                                keys[first_index[slot]].as_ref()
                            );
                            values[slot] = Some(stale);
                        }
                    },
                    None => {
                        let wait = deadline.map_or(configured.lock_timeout, |deadline| {
                            deadline.saturating_duration_since(Instant::now())
                        });
                        match lock.acquire(Some(wait)).map_err(CacheError::from)?
                        {
                            Some(guard) => guards.push(guard),
                            None => warn!(
                                "Timed out after {:?} waiting for create lock on {:?}; creating without it",
                                configured.lock_timeout,
                                keys[first_index[slot]].as_ref()
                            ),
                        }
                        recheck.push(slot);
                    }
                }
            }

            recheck.sort_unstable();
            let mut missing: Vec<usize> = Vec::new();
            if !recheck.is_empty() {
                let recheck_keys: Vec<&[u8]> = recheck.iter().map(|&slot| unique[slot]).collect();
                let entries = get_aligned(backend.as_ref(), &recheck_keys)?;
                for (&slot, entry) in recheck.iter().zip(entries) {
                    match cached(&policy, keys[first_index[slot]].as_ref(), entry)? {
                        Cached::Fresh(value) => values[slot] = Some(value),
                        _ => missing.push(slot),
                    }
                }
            }

            if !missing.is_empty() {
                let creator_keys: Vec<&K> = missing
                    .iter()
                    .map(|&slot| &keys[first_index[slot]])
                    .collect();
                let created = creator(&creator_keys)?;
                if created.len() != missing.len() {
                    return Err(CacheError::CreatorArity {
                        expected: missing.len(),
                        got: created.len(),
                    }
                    .into());
                }

                let mut to_store: Vec<(&[u8], CacheEntry)> = Vec::new();
                for (&slot, value) in missing.iter().zip(created) {
                    if options.should_cache(&value) {
                        to_store.push((unique[slot], encode(&value)?));
                    }
                    values[slot] = Some(value);
                }
                let writes: Vec<(&[u8], &CacheEntry)> =
                    to_store.iter().map(|(key, entry)| (*key, entry)).collect();
                backend.set_multi(&writes).map_err(CacheError::from)?;
            }
        }
        drop(guards);

        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            match &values[slot] {
                Some(value) => results.push(value.clone()),
                None => {
                    return Err(CacheError::CreatorArity {
                        expected: keys.len(),
                        got: results.len(),
                    }
                    .into())
                }
            }
        }
        Ok(results)
    }
}

/// A stored entry as seen by get-or-create
enum Cached<T> {
    Fresh(T),
    Stale(T),
    Missing,
}

/// Classify and decode `entry`
///
/// A payload that no longer decodes as `T` counts as missing, so the key is
/// recreated and overwritten instead of failing every later call.
fn cached<T: DeserializeOwned>(
    policy: &EntryPolicy<'_, '_>,
    key: &str,
    entry: Option<CacheEntry>,
) -> Result<Cached<T>, CacheError> {
    let state = policy.classify(entry.as_ref())?;
    let Some(entry) = entry else {
        return Ok(Cached::Missing);
    };
    if state == EntryState::Missing {
        return Ok(Cached::Missing);
    }
    match decode(entry) {
        Ok(value) if state == EntryState::Fresh => Ok(Cached::Fresh(value)),
        Ok(value) => Ok(Cached::Stale(value)),
        Err(e) => {
            warn!("Discarding undecodable cached value for {:?}: {}", key, e);
            Ok(Cached::Missing)
        }
    }
}

/// Run the creator and write its value back before releasing the lock
fn create<T, E, F>(
    backend: &dyn CacheBackend,
    mangled: &[u8],
    creator: F,
    options: &CreateOptions<T>,
    guard: Option<LockGuard>,
) -> Result<T, E>
where
    T: Serialize,
    E: From<CacheError>,
    F: FnOnce() -> Result<T, E>,
{
    let value = creator()?;
    if options.should_cache(&value) {
        backend
            .set(mangled, &encode(&value)?)
            .map_err(CacheError::from)?;
    }
    drop(guard);
    Ok(value)
}
