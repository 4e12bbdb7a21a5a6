// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Key mangling
//!
//! Maps a logical cache key to a backend key of bounded length. Keys whose
//! mangled form exceeds [`MAX_KEY_SIZE`] bytes are truncated and suffixed
//! with the SHA-1 of the full mangled key, so distinct long keys stay
//! distinct unless their digests collide.

use sha1::{Digest, Sha1};
use std::fmt;

/// Longest key a region will hand to a backend
pub const MAX_KEY_SIZE: usize = 512;

/// Hex length of the digest appended to truncated keys
const DIGEST_HEX_LEN: usize = 40;

/// Prefix used by unnamed regions
pub const DEFAULT_REGION_PREFIX: &str = "_";

/// Bound `key` to [`MAX_KEY_SIZE`] bytes
///
/// Keys within the limit are returned unchanged. Longer keys keep their first
/// `MAX_KEY_SIZE - 41` bytes followed by `-` and the hex SHA-1 of the whole
/// key.
pub fn bound_key(key: &[u8]) -> Vec<u8> {
    if key.len() <= MAX_KEY_SIZE {
        return key.to_vec();
    }

    let digest = hex::encode(Sha1::digest(key));
    let keep = MAX_KEY_SIZE - DIGEST_HEX_LEN - 1;

    let mut bounded = Vec::with_capacity(MAX_KEY_SIZE);
    bounded.extend_from_slice(&key[..keep]);
    bounded.push(b'-');
    bounded.extend_from_slice(digest.as_bytes());
    bounded
}

/// A key mangling function
///
/// Implementations must be pure: the same input always yields the same
/// output.
pub trait MangleKey: Send + Sync {
    fn mangle(&self, key: &[u8]) -> Vec<u8>;
}

impl<F> MangleKey for F
where
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync,
{
    fn mangle(&self, key: &[u8]) -> Vec<u8> {
        self(key)
    }
}

/// Default mangler: `"<region>." + key`, bounded by [`bound_key`]
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMangler {
    prefix: Vec<u8>,
}

impl KeyMangler {
    /// Mangler for a region; unnamed regions use `"_"`
    pub fn for_region(name: Option<&str>) -> Self {
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_REGION_PREFIX,
        };
        let mut prefix = Vec::with_capacity(name.len() + 1);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(b'.');
        Self { prefix }
    }
}

impl MangleKey for KeyMangler {
    fn mangle(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        bound_key(&full)
    }
}

impl fmt::Debug for KeyMangler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMangler")
            .field("prefix", &String::from_utf8_lossy(&self.prefix))
            .finish()
    }
}
