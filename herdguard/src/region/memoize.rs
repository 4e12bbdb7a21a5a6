// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Function memoization
//!
//! [`Memoized`] caches a function of one argument tuple under
//! `name|namespace|arg1 arg2 ...`; [`MemoizedMulti`] caches a batched
//! function per argument, so only arguments without a cached value reach the
//! function.

use super::stampede::{CreateOptions, ShouldCache};
use super::CacheRegion;
use crate::error::{CacheError, CacheResult};
use crate::key::{function_key, function_multi_keys, function_namespace, KeyArgs, KeyPart};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// `should_cache` predicate that keeps `None` results out of the cache
pub fn dont_cache_none<T>(value: &Option<T>) -> bool {
    value.is_some()
}

/// Settings shared by memoized functions
struct MemoSettings<T> {
    region: Arc<CacheRegion>,
    name: String,
    namespace: Option<String>,
    options: CreateOptions<T>,
}

impl<T> MemoSettings<T> {
    fn prefix(&self) -> String {
        function_namespace(&self.name, self.namespace.as_deref())
    }
}

/// A memoized function of one argument tuple
pub struct Memoized<A: ?Sized, T, E, F> {
    settings: MemoSettings<T>,
    func: F,
    _marker: PhantomData<fn(&A) -> Result<T, E>>,
}

impl<A, T, E, F> Memoized<A, T, E, F>
where
    A: KeyArgs + ?Sized,
    T: Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: Fn(&A) -> Result<T, E>,
{
    pub fn new(region: Arc<CacheRegion>, name: &str, func: F) -> Self {
        Self {
            settings: MemoSettings {
                region,
                name: name.to_string(),
                namespace: None,
                options: CreateOptions::default(),
            },
            func,
            _marker: PhantomData,
        }
    }

    pub fn with_namespace<N: KeyPart + ?Sized>(mut self, namespace: &N) -> Self {
        self.settings.namespace = Some(namespace.key_part().into_owned());
        self
    }

    pub fn with_expiration_time(mut self, expiration_time: Duration) -> Self {
        self.settings.options.expiration_time = Some(expiration_time);
        self
    }

    pub fn with_should_cache<P>(mut self, should_cache: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.settings.options.should_cache = Some(Arc::new(should_cache));
        self
    }

    /// Cache key for one call
    pub fn key(&self, args: &A) -> String {
        function_key(&self.settings.prefix(), args)
    }

    /// Cached result for `args`, calling the function on a miss
    pub fn call(&self, args: &A) -> Result<T, E> {
        self.settings.region.get_or_create_with(
            &self.key(args),
            || (self.func)(args),
            &self.settings.options,
        )
    }

    /// Cached result for `args` without calling the function
    pub fn get(&self, args: &A) -> CacheResult<Option<T>> {
        self.settings
            .region
            .get_expiring(&self.key(args), self.settings.options.expiration_time)
    }

    /// Store `value` as the result for `args`
    pub fn set(&self, args: &A, value: &T) -> CacheResult<()> {
        self.settings.region.set(&self.key(args), value)
    }

    /// Call the function unconditionally and cache its result
    pub fn refresh(&self, args: &A) -> Result<T, E> {
        let value = (self.func)(args)?;
        self.set(args, &value)?;
        Ok(value)
    }

    /// Drop the cached result for `args`
    pub fn invalidate(&self, args: &A) -> CacheResult<()> {
        self.settings.region.delete(&self.key(args))
    }

    pub fn should_cache(&self) -> Option<&ShouldCache<T>> {
        self.settings.options.should_cache.as_ref()
    }

    pub fn expiration_time(&self) -> Option<Duration> {
        self.settings.options.expiration_time
    }
}

/// Cache key of one argument, remembering its position in the call
struct ArgKey {
    key: String,
    position: usize,
}

impl AsRef<str> for ArgKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// A memoized batched function, cached per argument
pub struct MemoizedMulti<K, T, E, F> {
    settings: MemoSettings<T>,
    func: F,
    _marker: PhantomData<fn(&[&K]) -> Result<Vec<T>, E>>,
}

impl<K, T, E, F> MemoizedMulti<K, T, E, F>
where
    K: KeyPart,
    T: Serialize + DeserializeOwned + Clone,
    E: From<CacheError>,
    F: Fn(&[&K]) -> Result<Vec<T>, E>,
{
    pub fn new(region: Arc<CacheRegion>, name: &str, func: F) -> Self {
        Self {
            settings: MemoSettings {
                region,
                name: name.to_string(),
                namespace: None,
                options: CreateOptions::default(),
            },
            func,
            _marker: PhantomData,
        }
    }

    pub fn with_namespace<N: KeyPart + ?Sized>(mut self, namespace: &N) -> Self {
        self.settings.namespace = Some(namespace.key_part().into_owned());
        self
    }

    pub fn with_expiration_time(mut self, expiration_time: Duration) -> Self {
        self.settings.options.expiration_time = Some(expiration_time);
        self
    }

    pub fn with_should_cache<P>(mut self, should_cache: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.settings.options.should_cache = Some(Arc::new(should_cache));
        self
    }

    /// Cache keys, one per argument
    pub fn keys(&self, args: &[K]) -> Vec<String> {
        function_multi_keys(&self.settings.prefix(), args)
    }

    fn arg_keys(&self, args: &[K]) -> Vec<ArgKey> {
        self.keys(args)
            .into_iter()
            .enumerate()
            .map(|(position, key)| ArgKey { key, position })
            .collect()
    }

    /// Cached results for `args`; the function sees only the uncached ones
    pub fn call(&self, args: &[K]) -> Result<Vec<T>, E> {
        let keys = self.arg_keys(args);
        self.settings.region.get_or_create_multi_with(
            &keys,
            |missing: &[&ArgKey]| {
                let missing_args: Vec<&K> = missing.iter().map(|k| &args[k.position]).collect();
                (self.func)(&missing_args)
            },
            &self.settings.options,
        )
    }

    pub fn get(&self, args: &[K]) -> CacheResult<Vec<Option<T>>> {
        self.settings
            .region
            .get_multi_expiring(&self.keys(args), self.settings.options.expiration_time)
    }

    /// Store `values`, aligned with `args`
    pub fn set(&self, args: &[K], values: &[T]) -> CacheResult<()> {
        if args.len() != values.len() {
            return Err(CacheError::CreatorArity {
                expected: args.len(),
                got: values.len(),
            });
        }
        let entries: Vec<(String, &T)> = self.keys(args).into_iter().zip(values).collect();
        self.settings.region.set_multi(&entries)
    }

    /// Call the function for every argument and cache the results
    pub fn refresh(&self, args: &[K]) -> Result<Vec<T>, E> {
        let all: Vec<&K> = args.iter().collect();
        let values = (self.func)(&all)?;
        self.set(args, &values)?;
        Ok(values)
    }

    pub fn invalidate(&self, args: &[K]) -> CacheResult<()> {
        self.settings.region.delete_multi(&self.keys(args))
    }

    pub fn should_cache(&self) -> Option<&ShouldCache<T>> {
        self.settings.options.should_cache.as_ref()
    }

    pub fn expiration_time(&self) -> Option<Duration> {
        self.settings.options.expiration_time
    }
}

impl CacheRegion {
    /// Memoize `func` in this region under `name`
    pub fn memoize<A, T, E, F>(self: &Arc<Self>, name: &str, func: F) -> Memoized<A, T, E, F>
    where
        A: KeyArgs + ?Sized,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: Fn(&A) -> Result<T, E>,
    {
        Memoized::new(Arc::clone(self), name, func)
    }

    /// Memoize a batched `func` per argument
    pub fn memoize_multi<K, T, E, F>(
        self: &Arc<Self>,
        name: &str,
        func: F,
    ) -> MemoizedMulti<K, T, E, F>
    where
        K: KeyPart,
        T: Serialize + DeserializeOwned + Clone,
        E: From<CacheError>,
        F: Fn(&[&K]) -> Result<Vec<T>, E>,
    {
        MemoizedMulti::new(Arc::clone(self), name, func)
    }
}

/// Preset namespace, expiration and `should_cache` for memoizing several
/// functions the same way
pub struct MemoizationDecorator<T> {
    region: Arc<CacheRegion>,
    namespace: Option<String>,
    expiration_time: Option<Duration>,
    should_cache: Option<ShouldCache<T>>,
}

impl<T> MemoizationDecorator<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn should_cache(&self) -> Option<&ShouldCache<T>> {
        self.should_cache.as_ref()
    }

    pub fn expiration_time(&self) -> Option<Duration> {
        self.expiration_time
    }

    fn settings(&self, name: &str) -> MemoSettings<T> {
        MemoSettings {
            region: Arc::clone(&self.region),
            name: name.to_string(),
            namespace: self.namespace.clone(),
            options: CreateOptions {
                expiration_time: self.expiration_time,
                should_cache: self.should_cache.clone(),
            },
        }
    }

    pub fn decorate<A, E, F>(&self, name: &str, func: F) -> Memoized<A, T, E, F>
    where
        A: KeyArgs + ?Sized,
        E: From<CacheError>,
        F: Fn(&A) -> Result<T, E>,
    {
        Memoized {
            settings: self.settings(name),
            func,
            _marker: PhantomData,
        }
    }

    pub fn decorate_multi<K, E, F>(&self, name: &str, func: F) -> MemoizedMulti<K, T, E, F>
    where
        K: KeyPart,
        T: Clone,
        E: From<CacheError>,
        F: Fn(&[&K]) -> Result<Vec<T>, E>,
    {
        MemoizedMulti {
            settings: self.settings(name),
            func,
            _marker: PhantomData,
        }
    }
}

/// Build a [`MemoizationDecorator`] for `region`
pub fn get_memoization_decorator<T>(
    region: &Arc<CacheRegion>,
    namespace: Option<&str>,
    expiration_time: Option<Duration>,
    should_cache: Option<ShouldCache<T>>,
) -> MemoizationDecorator<T> {
    MemoizationDecorator {
        region: Arc::clone(region),
        namespace: namespace.map(str::to_string),
        expiration_time,
        should_cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::cell::Cell;

    fn region() -> Arc<CacheRegion> {
        let region = Arc::new(CacheRegion::new());
        region.configure(Arc::new(MemoryBackend::new()), None);
        region
    }

    #[test]
    fn test_key_layout() {
        let region = region();
        let add = region
            .memoize("add", |(a, b): &(i64, i64)| Ok::<_, CacheError>(a + b))
            .with_namespace("math");
        assert_eq!(add.key(&(3, 4)), "add|math|3 4");
    }

    #[test]
    fn test_get_set_refresh_invalidate() {
        let region = region();
        let calls = Cell::new(0);
        let double = region.memoize("double", |(x,): &(u32,)| {
            calls.set(calls.get() + 1);
            Ok::<_, CacheError>(x * 2)
        });

        assert_eq!(double.get(&(2,)).unwrap(), None);
        assert_eq!(double.call(&(2,)).unwrap(), 4);
        assert_eq!(double.call(&(2,)).unwrap(), 4);
        assert_eq!(calls.get(), 1);

        double.set(&(2,), &99).unwrap();
        assert_eq!(double.call(&(2,)).unwrap(), 99);

        assert_eq!(double.refresh(&(2,)).unwrap(), 4);
        assert_eq!(double.get(&(2,)).unwrap(), Some(4));
        assert_eq!(calls.get(), 2);

        double.invalidate(&(2,)).unwrap();
        assert_eq!(double.get(&(2,)).unwrap(), None);
    }

    #[test]
    fn test_dont_cache_none() {
        let region = region();
        let calls = Cell::new(0);
        let lookup = region
            .memoize("lookup", |(id,): &(u32,)| {
                calls.set(calls.get() + 1);
                Ok::<_, CacheError>(if *id == 0 { None } else { Some(*id) })
            })
            .with_should_cache(dont_cache_none);

        lookup.call(&(0,)).unwrap();
        lookup.call(&(0,)).unwrap();
        assert_eq!(calls.get(), 2);

        lookup.call(&(1,)).unwrap();
        lookup.call(&(1,)).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_decorator_presets() {
        let region = region();
        let decorator = get_memoization_decorator::<Option<u32>>(
            &region,
            Some("ns"),
            Some(Duration::from_secs(60)),
            Some(Arc::new(dont_cache_none::<u32>)),
        );
        assert_eq!(decorator.expiration_time(), Some(Duration::from_secs(60)));
        assert!(decorator.should_cache().unwrap()(&Some(1)));

        let memo = decorator.decorate("f", |(x,): &(u32,)| Ok::<_, CacheError>(Some(*x)));
        assert_eq!(memo.key(&(1,)), "f|ns|1");
        assert_eq!(memo.expiration_time(), Some(Duration::from_secs(60)));
        assert!(memo.should_cache().is_some());
    }

    #[test]
    fn test_multi_set_and_get() {
        let region = region();
        let squares = region.memoize_multi("sq", |xs: &[&u32]| {
            Ok::<_, CacheError>(xs.iter().map(|x| *x * *x).collect::<Vec<u32>>())
        });

        squares.set(&[2, 3], &[40, 90]).unwrap();
        assert_eq!(squares.get(&[2, 3, 4]).unwrap(), vec![Some(40), Some(90), None]);
        assert_eq!(squares.call(&[3, 4]).unwrap(), vec![90, 16]);
        assert_eq!(squares.refresh(&[2]).unwrap(), vec![4]);
        assert_eq!(squares.get(&[2]).unwrap(), vec![Some(4)]);

        squares.invalidate(&[2, 3, 4]).unwrap();
        assert_eq!(squares.get(&[2, 3, 4]).unwrap(), vec![None, None, None]);
        assert!(matches!(
            squares.set(&[1], &[]),
            Err(CacheError::CreatorArity { .. })
        ));
    }
}
