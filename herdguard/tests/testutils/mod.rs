//! Test utilities for herdguard integration tests
//!
//! `RegionFixture` builds a configured region over either built-in backend.
//! Sled fixtures own their temporary directory, so keep the fixture alive
//! for as long as the region is used.

#![allow(dead_code)]

use herdguard::{CacheRegion, RegionConfig, Registry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

static REGION_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A region name no other test in this process uses
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, REGION_SEQ.fetch_add(1, Ordering::SeqCst))
}

pub struct RegionFixture {
    pub region: Arc<CacheRegion>,
    _dir: Option<TempDir>,
}

impl RegionFixture {
    pub fn memory(expiration_time: Option<Duration>) -> Self {
        Self::build(RegionConfig::new("memory"), expiration_time, None)
    }

    pub fn sled(expiration_time: Option<Duration>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = RegionConfig::new("sled")
            .with_argument("path", dir.path().to_string_lossy().into_owned());
        Self::build(config, expiration_time, Some(dir))
    }

    /// Fixture for a backend by registry name
    pub fn for_backend(backend: &str, expiration_time: Option<Duration>) -> Self {
        match backend {
            "memory" => Self::memory(expiration_time),
            "sled" => Self::sled(expiration_time),
            other => panic!("no fixture for backend {}", other),
        }
    }

    fn build(
        mut config: RegionConfig,
        expiration_time: Option<Duration>,
        dir: Option<TempDir>,
    ) -> Self {
        init_logging();
        config.expiration_time = expiration_time;
        let region = Arc::new(CacheRegion::named(&unique_name(&config.backend)));
        region
            .configure_from(&config, &Registry::with_defaults())
            .expect("Failed to configure region");
        Self { region, _dir: dir }
    }
}
