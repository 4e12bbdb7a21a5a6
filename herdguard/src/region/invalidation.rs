// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Region-wide invalidation
//!
//! A region keeps two markers in its own backend, one per
//! [`InvalidationKind`]. Each holds a timestamp (or null): entries created
//! before a soft marker are stale, entries created before a hard marker are
//! treated as absent. Since the markers live next to the data, every process
//! sharing the backend sees the same invalidation.
//!
//! Markers are read straight from the backend chain, bypassing the region's
//! own expiration checks, and are cached for the duration of one top-level
//! call in an [`InvalidationMemo`].

use crate::backend::{CacheBackend, CacheEntry, ENTRY_VERSION};
use crate::error::CacheResult;
use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;
use std::time::Duration;

/// Which invalidation marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationKind {
    /// Entries created earlier may still be served while being refreshed
    Soft,
    /// Entries created earlier are never served
    Hard,
}

impl InvalidationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationKind::Soft => "soft",
            InvalidationKind::Hard => "hard",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            InvalidationKind::Soft => InvalidationKind::Hard,
            InvalidationKind::Hard => InvalidationKind::Soft,
        }
    }

    /// Logical (unmangled) key of this marker for a region
    pub fn marker_key(&self, region_name: Option<&str>) -> String {
        format!(
            "_RegionExpiration.{}.{}",
            self.as_str(),
            region_name.unwrap_or("_")
        )
    }
}

impl std::fmt::Display for InvalidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a marker entry; a missing entry means no invalidation
pub(crate) fn marker_timestamp(entry: Option<CacheEntry>) -> CacheResult<Option<DateTime<Utc>>> {
    match entry {
        Some(entry) => Ok(serde_json::from_value(entry.payload)?),
        None => Ok(None),
    }
}

/// Invalidation markers as seen by one call
///
/// Each marker is fetched at most once, on first use, and forgotten when the
/// memo is dropped. Memos are never shared between calls.
pub(crate) struct InvalidationMemo<'a> {
    backend: &'a dyn CacheBackend,
    soft_key: Vec<u8>,
    hard_key: Vec<u8>,
    soft: OnceCell<Option<DateTime<Utc>>>,
    hard: OnceCell<Option<DateTime<Utc>>>,
}

impl<'a> InvalidationMemo<'a> {
    pub(crate) fn new(backend: &'a dyn CacheBackend, soft_key: Vec<u8>, hard_key: Vec<u8>) -> Self {
        Self {
            backend,
            soft_key,
            hard_key,
            soft: OnceCell::new(),
            hard: OnceCell::new(),
        }
    }

    pub(crate) fn get(&self, kind: InvalidationKind) -> CacheResult<Option<DateTime<Utc>>> {
        let (cell, key) = match kind {
            InvalidationKind::Soft => (&self.soft, &self.soft_key),
            InvalidationKind::Hard => (&self.hard, &self.hard_key),
        };
        cell.get_or_try_init(|| -> CacheResult<_> { marker_timestamp(self.backend.get(key)?) })
            .copied()
    }
}

/// How a stored entry should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Serve as is
    Fresh,
    /// Needs refreshing, but may be served while someone else refreshes it
    Stale,
    /// Absent, or must not be served
    Missing,
}

/// Expiration plus invalidation, applied to one entry at a time
pub(crate) struct EntryPolicy<'m, 'a> {
    expiration: Option<Duration>,
    markers: &'m InvalidationMemo<'a>,
}

impl<'m, 'a> EntryPolicy<'m, 'a> {
    pub(crate) fn new(expiration: Option<Duration>, markers: &'m InvalidationMemo<'a>) -> Self {
        Self {
            expiration,
            markers,
        }
    }

    pub(crate) fn classify(&self, entry: Option<&CacheEntry>) -> CacheResult<EntryState> {
        let Some(entry) = entry else {
            return Ok(EntryState::Missing);
        };
        if entry.metadata.version != ENTRY_VERSION {
            return Ok(EntryState::Missing);
        }

        let created = entry.created();
        if let Some(hard) = self.markers.get(InvalidationKind::Hard)? {
            if created < hard {
                return Ok(EntryState::Missing);
            }
        }

        if let Some(expiration) = self.expiration {
            if entry.age() > expiration {
                return Ok(EntryState::Stale);
            }
        }

        if let Some(soft) = self.markers.get(InvalidationKind::Soft)? {
            if created < soft {
                return Ok(EntryState::Stale);
            }
        }

        Ok(EntryState::Fresh)
    }
}
