// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-process per-key mutexes
//!
//! The map only holds weak references. A key's mutex lives as long as some
//! caller holds or waits on it; once uncontended it is dropped, and an absent
//! entry means "unlocked".

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const MIN_PRUNE_THRESHOLD: usize = 64;

/// A single key's mutex
///
/// Unlike a plain `Mutex<()>` it is not tied to a guard's lifetime, so it can
/// be released from whichever scope ends the creation.
#[derive(Debug, Default)]
struct KeyMutex {
    held: Mutex<bool>,
    released: Condvar,
}

impl KeyMutex {
    fn acquire(&self, wait: Option<Duration>) -> bool {
        let mut held = self.held.lock();
        if !*held {
            *held = true;
            return true;
        }

        let Some(wait) = wait else {
            return false;
        };

        match Instant::now().checked_add(wait) {
            Some(deadline) => {
                while *held {
                    if self.released.wait_until(&mut held, deadline).timed_out() {
                        break;
                    }
                }
            }
            None => {
                while *held {
                    self.released.wait(&mut held);
                }
            }
        }

        if *held {
            return false;
        }
        *held = true;
        true
    }

    fn release(&self) {
        let mut held = self.held.lock();
        *held = false;
        drop(held);
        self.released.notify_one();
    }
}

/// Handle on one key's in-process mutex
#[derive(Debug, Clone)]
pub struct LocalKeyLock {
    mutex: Arc<KeyMutex>,
}

impl LocalKeyLock {
    /// Try to take the mutex; see [`crate::lock::DistributedLock::acquire`]
    /// for the meaning of `wait`
    pub fn acquire(&self, wait: Option<Duration>) -> bool {
        self.mutex.acquire(wait)
    }

    pub fn release(&self) {
        self.mutex.release();
    }
}

#[derive(Debug)]
struct Inner {
    locks: HashMap<Vec<u8>, Weak<KeyMutex>>,
    prune_at: usize,
}

/// Process-wide map from mangled key to its mutex
#[derive(Debug)]
pub struct KeyLockMap {
    inner: Mutex<Inner>,
}

impl Default for KeyLockMap {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                locks: HashMap::new(),
                prune_at: MIN_PRUNE_THRESHOLD,
            }),
        }
    }
}

impl KeyLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mutex for `key`, creating it if nobody currently uses it
    pub fn lock_for(&self, key: &[u8]) -> LocalKeyLock {
        let mut inner = self.inner.lock();

        if let Some(mutex) = inner.locks.get(key).and_then(Weak::upgrade) {
            return LocalKeyLock { mutex };
        }

        if inner.locks.len() >= inner.prune_at {
            inner.locks.retain(|_, weak| weak.strong_count() > 0);
            inner.prune_at = (inner.locks.len() * 2).max(MIN_PRUNE_THRESHOLD);
        }

        let mutex = Arc::new(KeyMutex::default());
        inner.locks.insert(key.to_vec(), Arc::downgrade(&mutex));
        LocalKeyLock { mutex }
    }

    /// Number of keys whose mutex is currently in use
    pub fn active_len(&self) -> usize {
        self.inner
            .lock()
            .locks
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
