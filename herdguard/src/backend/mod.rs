// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache storage backends
//!
//! A backend stores opaque [`CacheEntry`] values under byte keys. The region
//! layer never depends on a concrete engine, only on [`CacheBackend`]:
//! - [`memory::MemoryBackend`]: process-local map
//! - [`sled::SledBackend`]: embedded persistent store with optional
//!   cross-process locks (feature `sled-backend`)

pub mod arguments;
pub mod memory;
pub mod registry;
#[cfg(feature = "sled-backend")]
pub mod sled;
pub mod traits;
pub mod types;

pub use arguments::BackendArguments;
pub use memory::MemoryBackend;
pub use registry::{BackendFactory, BackendRegistry};
#[cfg(feature = "sled-backend")]
pub use self::sled::SledBackend;
pub use traits::CacheBackend;
pub use types::{BackendError, BackendResult, CacheEntry, CacheMetadata, ENTRY_VERSION};
