// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Record-based distributed locks
//!
//! A lock is a small record stored next to the cache data: the owner's token
//! and an optional expiry. Claiming succeeds when no record exists or the
//! existing one has expired; releasing only removes a record that still
//! carries our token.

use super::DistributedLock;
use crate::backend::{BackendError, BackendResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default pause between claim attempts
pub const DEFAULT_LOCK_SLEEP: Duration = Duration::from_millis(100);

/// Timing knobs for record locks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockSettings {
    /// Lifetime of a claimed record; `None` never expires on its own
    pub ttl: Option<Duration>,
    /// Pause between claim attempts while waiting
    pub sleep: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: None,
            sleep: DEFAULT_LOCK_SLEEP,
        }
    }
}

/// Stored form of a held lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LockRecord {
    pub fn new(token: &str, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self {
            token: token.to_string(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Utc::now())
    }

    pub fn encode(&self) -> BackendResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> BackendResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| BackendError::Lock(format!("corrupt lock record: {}", e)))
    }
}

/// Storage for lock records
///
/// Implementations must make `try_claim` atomic with respect to other
/// claimers of the same key.
pub trait LockRecordStore: Send + Sync {
    /// Write a record for `token` unless a live record by someone else exists
    fn try_claim(&self, key: &[u8], token: &str, ttl: Option<Duration>) -> BackendResult<bool>;

    /// Remove the record for `key` if it still belongs to `token`
    fn release(&self, key: &[u8], token: &str) -> BackendResult<()>;
}

/// A [`DistributedLock`] backed by a [`LockRecordStore`]
pub struct RecordLock<S: LockRecordStore + ?Sized> {
    store: Arc<S>,
    key: Vec<u8>,
    token: String,
    settings: LockSettings,
    held: bool,
}

impl<S: LockRecordStore + ?Sized> RecordLock<S> {
    pub fn new(store: Arc<S>, key: Vec<u8>, settings: LockSettings) -> Self {
        Self {
            store,
            key,
            token: uuid::Uuid::new_v4().to_string(),
            settings,
            held: false,
        }
    }
}

impl<S: LockRecordStore + ?Sized> DistributedLock for RecordLock<S> {
    fn acquire(&mut self, wait: Option<Duration>) -> BackendResult<bool> {
        if self.held {
            return Ok(true);
        }

        let deadline = wait.and_then(|wait| Instant::now().checked_add(wait));
        loop {
            if self
                .store
                .try_claim(&self.key, &self.token, self.settings.ttl)?
            {
                self.held = true;
                return Ok(true);
            }

            match (wait, deadline) {
                (None, _) => return Ok(false),
                (Some(_), Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    std::thread::sleep(self.settings.sleep.min(deadline - now));
                }
                (Some(_), None) => std::thread::sleep(self.settings.sleep),
            }
        }
    }

    fn release(&mut self) -> BackendResult<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        self.store.release(&self.key, &self.token)
    }
}
