// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Declarative region configuration

use super::{CacheRegion, DEFAULT_LOCK_TIMEOUT};
use crate::backend::{BackendArguments, BackendRegistry};
use crate::error::{CacheResult, ConfigError};
use crate::proxy::{LoggingProxy, ProxyRegistry};
use log::debug;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::time::Duration;

/// Configuration of one region
///
/// Durations are given in (possibly fractional) seconds:
///
/// ```json
/// {
///   "backend": "sled",
///   "expiration_time": 300,
///   "arguments": {"path": "/var/cache/app", "distributed_lock": true},
///   "proxies": ["isolating"],
///   "debug": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Registered backend name
    pub backend: String,

    /// Default time-to-live; `None` never expires by age
    #[serde(default, with = "optional_seconds")]
    pub expiration_time: Option<Duration>,

    /// Arguments handed to the backend constructor
    #[serde(default)]
    pub arguments: BackendArguments,

    /// Registered proxy names, wrapped in order (the last is outermost)
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Wrap the logging proxy before any other
    #[serde(default)]
    pub debug: bool,

    /// How long waiters block on another caller's recomputation
    #[serde(default = "default_lock_timeout", with = "seconds")]
    pub lock_timeout: Duration,
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            expiration_time: None,
            arguments: BackendArguments::default(),
            proxies: Vec::new(),
            debug: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl RegionConfig {
    pub fn new(backend: &str) -> Self {
        Self {
            backend: backend.to_string(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn with_expiration_time(mut self, expiration_time: Duration) -> Self {
        self.expiration_time = Some(expiration_time);
        self
    }

    pub fn with_argument(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(name, value);
        self
    }

    pub fn with_proxy(mut self, name: &str) -> Self {
        self.proxies.push(name.to_string());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.trim().is_empty() {
            return Err(ConfigError::Invalid("backend name is empty".to_string()));
        }

        if self.expiration_time == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "expiration_time must be positive; omit it to never expire".to_string(),
            ));
        }

        if let Some(proxy) = self.proxies.iter().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "proxy name {:?} is empty",
                proxy
            )));
        }

        Ok(())
    }
}

/// Backend and proxy registries used to resolve a [`RegionConfig`]
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub backends: BackendRegistry,
    pub proxies: ProxyRegistry,
}

impl Registry {
    /// Empty registries
    pub fn new() -> Self {
        Self::default()
    }

    /// Registries holding the built-in backends and proxies
    pub fn with_defaults() -> Self {
        Self {
            backends: BackendRegistry::with_defaults(),
            proxies: ProxyRegistry::with_defaults(),
        }
    }
}

impl CacheRegion {
    /// Configure from a [`RegionConfig`]
    ///
    /// Does nothing and returns `false` if the region is already configured.
    /// Otherwise builds the backend, wraps the logging proxy when `debug` is
    /// set, then wraps the configured proxies in order.
    pub fn configure_from(&self, config: &RegionConfig, registry: &Registry) -> CacheResult<bool> {
        if self.is_configured() {
            return Ok(false);
        }
        config.validate()?;

        // Resolve every proxy before touching the region
        let proxies = config
            .proxies
            .iter()
            .map(|name| Ok((name.as_str(), registry.proxies.load(name)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        debug!(
            "Creating '{}' backend for cache region '{}'",
            config.backend,
            self.display_name()
        );
        let backend = registry.backends.create(&config.backend, &config.arguments)?;
        if !self.configure_with(backend, config.expiration_time, config.lock_timeout) {
            return Ok(false);
        }

        if config.debug {
            self.wrap("debug", &LoggingProxy::wrap)?;
        }
        for (name, factory) in proxies {
            debug!("Adding proxy backend to cache region: {}", name);
            self.wrap(name, factory.as_ref())?;
        }
        Ok(true)
    }
}

/// Configure `target`, which must be a [`CacheRegion`]
///
/// Accepts a region itself or an `Arc` of one. An already configured region
/// is left untouched.
pub fn configure_cache_region(
    target: &dyn Any,
    config: &RegionConfig,
    registry: &Registry,
) -> CacheResult<bool> {
    let region = if let Some(region) = target.downcast_ref::<CacheRegion>() {
        region
    } else if let Some(region) = target.downcast_ref::<std::sync::Arc<CacheRegion>>() {
        region.as_ref()
    } else {
        return Err(ConfigError::NotARegion.into());
    };
    region.configure_from(config, registry)
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&value.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::sync::Arc;

    #[test]
    fn test_parse_from_json() {
        let config = RegionConfig::from_json(
            r#"{"backend": "memory", "expiration_time": 1.5, "proxies": ["isolating"]}"#,
        )
        .unwrap();
        assert_eq!(config.backend, "memory");
        assert_eq!(config.expiration_time, Some(Duration::from_millis(1500)));
        assert_eq!(config.proxies, vec!["isolating".to_string()]);
        assert!(!config.debug);
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);

        let encoded = serde_json::to_string(&config).unwrap();
        assert_eq!(RegionConfig::from_json(&encoded).unwrap(), config);
    }

    #[test]
    fn test_validate() {
        assert!(RegionConfig::new("memory").validate().is_ok());
        assert!(RegionConfig::new(" ").validate().is_err());
        assert!(RegionConfig::new("memory")
            .with_expiration_time(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RegionConfig::from_json(r#"{"backend": "memory", "lock_timeout": -1}"#).is_err());
    }

    #[test]
    fn test_configure_from_wraps_debug_first() {
        let region = CacheRegion::new();
        let config = RegionConfig::new("memory")
            .with_proxy("isolating")
            .with_debug(true);
        assert!(region
            .configure_from(&config, &Registry::with_defaults())
            .unwrap());
        assert_eq!(region.proxy_layers(), vec!["debug", "isolating"]);
    }

    #[test]
    fn test_unknown_proxy_leaves_region_unconfigured() {
        let region = CacheRegion::new();
        let config = RegionConfig::new("memory").with_proxy("nope");
        let err = region
            .configure_from(&config, &Registry::with_defaults())
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(ConfigError::UnknownProxy(_))));
        assert!(!region.is_configured());
    }

    #[test]
    fn test_configure_cache_region_target_types() {
        let registry = Registry::with_defaults();
        let config = RegionConfig::new("memory");

        let err = configure_cache_region(&"xxxxxxx", &config, &registry).unwrap_err();
        assert!(matches!(err, CacheError::Config(ConfigError::NotARegion)));

        let shared = Arc::new(CacheRegion::named("shared"));
        assert!(configure_cache_region(&shared, &config, &registry).unwrap());
        assert!(!configure_cache_region(&shared, &config, &registry).unwrap());
        assert!(shared.is_configured());
    }
}
