// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! herdguard - stampede-protected cache regions
//!
//! A [`CacheRegion`] fronts a pluggable key/value backend and turns it into a
//! memoizing cache: values carry their creation time, expire by age, can be
//! invalidated region-wide, and are recomputed by exactly one caller at a
//! time while everybody else waits or keeps serving the stale value.
//!
//! # Features
//!
//! - **Stampede protection**: per-key locks around recomputation, local or
//!   distributed through the backend
//! - **Soft and hard invalidation**: region-wide markers stored alongside the
//!   data so every process sharing a backend sees them
//! - **Backends**: an in-process memory map and an embedded Sled store
//! - **Proxies**: stackable decorators over any backend
//! - **Memoization**: cache the results of functions keyed by their arguments
//!
//! # Usage
//!
//! ```ignore
//! use herdguard::{CacheRegion, MemoryBackend};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let region = CacheRegion::named("users");
//! region.configure(Arc::new(MemoryBackend::new()), Some(Duration::from_secs(60)));
//!
//! let name: String = region.get_or_create("user:1", || -> Result<_, herdguard::CacheError> {
//!     Ok(load_user_name(1))
//! })?;
//! ```

pub mod backend;
pub mod error;
pub mod key;
pub mod lock;
pub mod proxy;
pub mod region;

pub use backend::{
    BackendArguments, BackendError, BackendRegistry, BackendResult, CacheBackend, CacheEntry,
    CacheMetadata, MemoryBackend,
};
#[cfg(feature = "sled-backend")]
pub use backend::SledBackend;
pub use error::{CacheError, CacheResult, ConfigError};
pub use key::{function_key, function_multi_keys, KeyArgs, KeyMangler, KeyPart, MangleKey};
pub use lock::DistributedLock;
pub use proxy::{IsolatingProxy, LoggingProxy, ProxyFactory, ProxyRegistry};
pub use region::{
    configure_cache_region, dont_cache_none, get_memoization_decorator, CacheRegion,
    CreateOptions, InvalidationKind, MemoizationDecorator, Memoized, MemoizedMulti, RegionConfig,
    Registry, ShouldCache,
};

/// herdguard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// herdguard crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
