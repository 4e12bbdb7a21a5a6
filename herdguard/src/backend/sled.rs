// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sled backend implementation
//!
//! Entries are stored as JSON-encoded [`CacheEntry`] values in one sled tree.
//! When distributed locking is enabled, lock records live in a companion
//! tree and are claimed with `compare_and_swap`, so any process sharing the
//! database sees the same locks.

use super::arguments::BackendArguments;
use super::traits::CacheBackend;
use super::types::{BackendResult, CacheEntry};
use crate::error::ConfigError;
use crate::lock::{DistributedLock, LockRecord, LockRecordStore, LockSettings, RecordLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Tree used when the arguments do not name one
pub const DEFAULT_TREE: &str = "herdguard";

const LOCK_TREE_SUFFIX: &str = ".locks";
const LOCK_KEY_PREFIX: &[u8] = b"_lock";

/// Sled-backed cache storage
pub struct SledBackend {
    db: sled::Db,
    tree: sled::Tree,
    locks: Arc<SledLockStore>,
    distributed_lock: bool,
    lock_settings: LockSettings,
}

impl SledBackend {
    /// Open (or create) a database at `path` using the default tree and no
    /// distributed locking
    pub fn open<P: AsRef<Path>>(path: P) -> BackendResult<Self> {
        let db = sled::open(path)?;
        Self::with_db(db, DEFAULT_TREE, false, LockSettings::default())
    }

    /// Build from region arguments
    ///
    /// Recognised arguments: `path` (required), `tree`, `distributed_lock`,
    /// `lock_timeout` and `lock_sleep` (both in seconds).
    pub fn from_arguments(arguments: &BackendArguments) -> Result<Self, ConfigError> {
        let path = arguments.require_str("path")?;
        let tree = arguments.get_str("tree")?.unwrap_or(DEFAULT_TREE);
        let distributed_lock = arguments.get_bool("distributed_lock")?.unwrap_or(false);
        let lock_settings = LockSettings {
            ttl: arguments.get_duration("lock_timeout")?,
            sleep: arguments
                .get_duration("lock_sleep")?
                .unwrap_or(crate::lock::record::DEFAULT_LOCK_SLEEP),
        };

        let db = sled::open(path).map_err(|e| ConfigError::InvalidArgument {
            name: "path".to_string(),
            reason: e.to_string(),
        })?;
        Self::with_db(db, tree, distributed_lock, lock_settings).map_err(|e| {
            ConfigError::InvalidArgument {
                name: "tree".to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn with_db(
        db: sled::Db,
        tree_name: &str,
        distributed_lock: bool,
        lock_settings: LockSettings,
    ) -> BackendResult<Self> {
        let tree = db.open_tree(tree_name)?;
        let lock_tree = db.open_tree(format!("{}{}", tree_name, LOCK_TREE_SUFFIX))?;
        Ok(SledBackend {
            db,
            tree,
            locks: Arc::new(SledLockStore { tree: lock_tree }),
            distributed_lock,
            lock_settings,
        })
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_settings.ttl
    }

    fn decode(bytes: &[u8]) -> BackendResult<CacheEntry> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl CacheBackend for SledBackend {
    fn get(&self, key: &[u8]) -> BackendResult<Option<CacheEntry>> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_multi(&self, keys: &[&[u8]]) -> BackendResult<Vec<Option<CacheEntry>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key)?);
        }
        Ok(results)
    }

    fn set(&self, key: &[u8], value: &CacheEntry) -> BackendResult<()> {
        self.tree.insert(key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn set_multi(&self, entries: &[(&[u8], &CacheEntry)]) -> BackendResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(*key, serde_json::to_vec(value)?);
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> BackendResult<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn delete_multi(&self, keys: &[&[u8]]) -> BackendResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for key in keys {
            batch.remove(*key);
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn get_mutex(&self, key: &[u8]) -> Option<Box<dyn DistributedLock>> {
        if !self.distributed_lock {
            return None;
        }
        let mut lock_key = LOCK_KEY_PREFIX.to_vec();
        lock_key.extend_from_slice(key);
        Some(Box::new(RecordLock::new(
            Arc::clone(&self.locks),
            lock_key,
            self.lock_settings,
        )))
    }

    fn has_lock_timeout(&self) -> bool {
        self.distributed_lock && self.lock_settings.ttl.is_some()
    }

    fn flush(&self) -> BackendResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Lock records kept in a sled tree
pub struct SledLockStore {
    tree: sled::Tree,
}

impl LockRecordStore for SledLockStore {
    fn try_claim(&self, key: &[u8], token: &str, ttl: Option<Duration>) -> BackendResult<bool> {
        let current = self.tree.get(key)?;
        if let Some(bytes) = &current {
            if !LockRecord::decode(bytes)?.is_expired() {
                return Ok(false);
            }
        }

        let record = LockRecord::new(token, ttl).encode()?;
        // A conflict means another process claimed or released in between
        Ok(self
            .tree
            .compare_and_swap(key, current, Some(record))?
            .is_ok())
    }

    fn release(&self, key: &[u8], token: &str) -> BackendResult<()> {
        let Some(current) = self.tree.get(key)? else {
            return Ok(());
        };
        if LockRecord::decode(&current)?.token != token {
            return Ok(());
        }
        let _ = self
            .tree
            .compare_and_swap(key, Some(current), None::<Vec<u8>>)?;
        Ok(())
    }
}
