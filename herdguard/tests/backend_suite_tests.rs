//! Region behaviour that every backend must share
//!
//! The same scenarios run against each built-in backend through the
//! `backend_suite!` macro.

#[path = "testutils/mod.rs"]
mod testutils;

use herdguard::{CacheError, CreateOptions};
use std::cell::Cell;
use std::time::Duration;
use testutils::RegionFixture;

#[derive(Debug)]
struct Boom;

impl From<CacheError> for Boom {
    fn from(e: CacheError) -> Self {
        panic!("unexpected cache error: {}", e)
    }
}

macro_rules! backend_suite {
    ($module:ident, $backend:expr) => {
        mod $module {
            use super::*;

            fn fixture() -> RegionFixture {
                RegionFixture::for_backend($backend, None)
            }

            #[test]
            fn test_get_nothing() {
                let fixture = fixture();
                assert_eq!(fixture.region.get::<String>("some key").unwrap(), None);
            }

            #[test]
            fn test_set_get_value() {
                let fixture = fixture();
                fixture.region.set("some key", "some value").unwrap();
                assert_eq!(
                    fixture.region.get::<String>("some key").unwrap(),
                    Some("some value".to_string())
                );
            }

            #[test]
            fn test_delete() {
                let fixture = fixture();
                fixture.region.set("some key", &42u32).unwrap();
                fixture.region.delete("some key").unwrap();
                fixture.region.delete("never set").unwrap();
                assert_eq!(fixture.region.get::<u32>("some key").unwrap(), None);
            }

            #[test]
            fn test_set_get_many() {
                let fixture = fixture();
                let entries: Vec<(String, String)> = (0..50)
                    .map(|i| (format!("key {}", i), format!("value {}", i)))
                    .collect();
                fixture.region.set_multi(&entries).unwrap();

                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                let values: Vec<Option<String>> = fixture.region.get_multi(&keys).unwrap();
                assert_eq!(values.len(), 50);
                for (i, value) in values.iter().enumerate() {
                    assert_eq!(value.as_deref(), Some(format!("value {}", i).as_str()));
                }

                fixture.region.delete_multi(&keys[..25]).unwrap();
                let values: Vec<Option<String>> = fixture.region.get_multi(&keys).unwrap();
                assert!(values[..25].iter().all(Option::is_none));
                assert!(values[25..].iter().all(Option::is_some));
            }

            #[test]
            fn test_empty_multi() {
                let fixture = fixture();
                let none: [&str; 0] = [];
                assert!(fixture.region.get_multi::<_, String>(&none).unwrap().is_empty());
                fixture.region.set_multi::<&str, String>(&[]).unwrap();
                fixture.region.delete_multi(&none).unwrap();

                let created: Vec<String> = fixture
                    .region
                    .get_or_create_multi(&none, |_: &[&&str]| -> Result<Vec<String>, CacheError> {
                        panic!("creator called for no keys")
                    })
                    .unwrap();
                assert!(created.is_empty());
            }

            #[test]
            fn test_get_multi_keeps_gaps() {
                let fixture = fixture();
                fixture.region.set("a", "va").unwrap();
                fixture.region.set("c", "vc").unwrap();
                let values: Vec<Option<String>> =
                    fixture.region.get_multi(&["a", "b", "c"]).unwrap();
                assert_eq!(
                    values,
                    vec![Some("va".to_string()), None, Some("vc".to_string())]
                );
            }

            #[test]
            fn test_creator_runs_once() {
                let fixture = fixture();
                let calls = Cell::new(0);
                for _ in 0..3 {
                    let value: String = fixture
                        .region
                        .get_or_create("some key", || {
                            calls.set(calls.get() + 1);
                            Ok::<_, CacheError>("some value".to_string())
                        })
                        .unwrap();
                    assert_eq!(value, "some value");
                }
                assert_eq!(calls.get(), 1);
            }

            #[test]
            fn test_expired_value_is_recreated() {
                let fixture = fixture();
                let options = CreateOptions::new().with_expiration_time(Duration::from_millis(50));
                let calls = Cell::new(0);
                let create = || {
                    calls.set(calls.get() + 1);
                    Ok::<_, CacheError>(calls.get())
                };

                assert_eq!(fixture.region.get_or_create_with("k", create, &options).unwrap(), 1);
                assert_eq!(fixture.region.get_or_create_with("k", create, &options).unwrap(), 1);
                std::thread::sleep(Duration::from_millis(120));
                assert_eq!(fixture.region.get_or_create_with("k", create, &options).unwrap(), 2);
            }

            #[test]
            fn test_creator_error_is_not_cached() {
                let fixture = fixture();
                let result: Result<u32, CacheError> = fixture
                    .region
                    .get_or_create("k", || Err(CacheError::creator("exploding creator")));
                assert!(matches!(result, Err(CacheError::Creator(_))));
                assert_eq!(fixture.region.get_ignoring_expiration::<u32>("k").unwrap(), None);

                let value: u32 = fixture.region.get_or_create("k", || Ok::<_, Boom>(7)).unwrap();
                assert_eq!(value, 7);
            }

            #[test]
            fn test_soft_and_hard_invalidation() {
                let fixture = fixture();
                let calls = Cell::new(0);
                let create = || {
                    calls.set(calls.get() + 1);
                    Ok::<_, CacheError>(calls.get())
                };

                assert_eq!(fixture.region.get_or_create("k", create).unwrap(), 1);
                std::thread::sleep(Duration::from_millis(5));
                fixture.region.invalidate(false).unwrap();
                assert!(fixture.region.soft_invalidated().unwrap().is_some());
                assert_eq!(fixture.region.get::<u32>("k").unwrap(), None);
                assert_eq!(fixture.region.get_or_create("k", create).unwrap(), 2);

                std::thread::sleep(Duration::from_millis(5));
                fixture.region.invalidate(true).unwrap();
                assert!(fixture.region.hard_invalidated().unwrap().is_some());
                assert_eq!(fixture.region.soft_invalidated().unwrap(), None);
                assert_eq!(fixture.region.get_or_create("k", create).unwrap(), 3);

                fixture.region.reset_invalidation().unwrap();
                assert_eq!(fixture.region.hard_invalidated().unwrap(), None);
                assert_eq!(fixture.region.get::<u32>("k").unwrap(), Some(3));
            }

            #[test]
            fn test_decorated_function() {
                let fixture = fixture();
                let calls = Cell::new(0);
                let add = fixture.region.memoize("add", |(x, y): &(i64, i64)| {
                    calls.set(calls.get() + 1);
                    Ok::<_, CacheError>(x + y)
                });
                assert_eq!(add.call(&(1, 2)).unwrap(), 3);
                assert_eq!(add.call(&(1, 2)).unwrap(), 3);
                assert_eq!(add.call(&(2, 1)).unwrap(), 3);
                assert_eq!(calls.get(), 2);
            }

            #[test]
            fn test_multi_creates_missing_keys_in_order() {
                let fixture = fixture();
                fixture.region.set("b", "cached b").unwrap();
                let seen = Cell::new(Vec::<String>::new());
                let values: Vec<String> = fixture
                    .region
                    .get_or_create_multi(&["a", "b", "c", "a"], |keys: &[&&str]| {
                        seen.set(keys.iter().map(|k| k.to_string()).collect());
                        Ok::<_, CacheError>(keys.iter().map(|k| format!("new {}", k)).collect())
                    })
                    .unwrap();
                assert_eq!(values, vec!["new a", "cached b", "new c", "new a"]);
                assert_eq!(seen.take(), vec!["a".to_string(), "c".to_string()]);
            }
        }
    };
}

backend_suite!(memory_backend, "memory");

#[cfg(feature = "sled-backend")]
backend_suite!(sled_backend, "sled");
