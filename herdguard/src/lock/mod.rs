// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-key advisory locks
//!
//! A region serializes recomputation of a key through one of two lock kinds:
//! - [`local::KeyLockMap`]: an in-process mutex per mangled key, used when the
//!   backend offers no distributed locking
//! - a backend-provided [`DistributedLock`], typically a [`record::RecordLock`]
//!   built on a TTL'd record in the shared store
//!
//! Both are driven through [`KeyLock`], and a successful acquisition yields a
//! [`LockGuard`] that releases on every exit path, including unwinding.

pub mod local;
pub mod record;

pub use local::{KeyLockMap, LocalKeyLock};
pub use record::{LockRecord, LockRecordStore, LockSettings, RecordLock};

use crate::backend::BackendResult;
use log::warn;
use std::time::Duration;

/// Lock handle returned by backends that coordinate across processes
pub trait DistributedLock: Send {
    /// Try to take the lock
    ///
    /// `None` makes a single non-blocking attempt. `Some(wait)` keeps trying
    /// until `wait` has elapsed. Returns whether the lock is now held.
    fn acquire(&mut self, wait: Option<Duration>) -> BackendResult<bool>;

    /// Give the lock back; releasing a lock that is not held is a no-op
    fn release(&mut self) -> BackendResult<()>;
}

/// The lock guarding one mangled key
pub enum KeyLock {
    Local(LocalKeyLock),
    Distributed(Box<dyn DistributedLock>),
}

impl KeyLock {
    /// Acquire the lock, returning a guard when it is held
    pub fn acquire(mut self, wait: Option<Duration>) -> BackendResult<Option<LockGuard>> {
        let acquired = match &mut self {
            KeyLock::Local(lock) => lock.acquire(wait),
            KeyLock::Distributed(lock) => lock.acquire(wait)?,
        };
        Ok(acquired.then(|| LockGuard { lock: self }))
    }
}

/// A held key lock; dropping it releases the lock
pub struct LockGuard {
    lock: KeyLock,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match &mut self.lock {
            KeyLock::Local(lock) => lock.release(),
            KeyLock::Distributed(lock) => {
                if let Err(e) = lock.release() {
                    warn!("Failed to release distributed lock: {}", e);
                }
            }
        }
    }
}
