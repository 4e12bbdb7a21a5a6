//! Concurrent get-or-create
//!
//! These tests start real threads and depend on timing, so they run
//! serially.

#[path = "testutils/mod.rs"]
mod testutils;

use herdguard::{CacheBackend, CacheEntry, CacheError, CacheRegion, MemoryBackend};
use serde_json::json;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use testutils::{init_logging, RegionFixture};

const THREADS: usize = 8;

fn run_canary(region: Arc<CacheRegion>) -> usize {
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let region = Arc::clone(&region);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                region
                    .get_or_create("canary", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(200));
                        Ok::<_, CacheError>("tweet".to_string())
                    })
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "tweet");
    }
    calls.load(Ordering::SeqCst)
}

#[test]
#[serial]
fn test_single_creator_under_contention() {
    let fixture = RegionFixture::memory(None);
    assert_eq!(run_canary(Arc::clone(&fixture.region)), 1);
}

#[test]
#[serial]
#[cfg(feature = "sled-backend")]
fn test_single_creator_with_distributed_lock() {
    use herdguard::{BackendArguments, SledBackend};

    init_logging();
    let dir = tempfile::TempDir::new().unwrap();
    let arguments = BackendArguments::new()
        .with("path", dir.path().to_string_lossy().into_owned())
        .with("distributed_lock", true)
        .with("lock_sleep", 0.01);
    let backend: Arc<dyn CacheBackend> = Arc::new(SledBackend::from_arguments(&arguments).unwrap());

    // Two regions over one store stand in for two processes
    let first = Arc::new(CacheRegion::named("shared"));
    let second = Arc::new(CacheRegion::named("shared"));
    first.configure(Arc::clone(&backend), None);
    second.configure(Arc::clone(&backend), None);

    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|region| {
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                region
                    .get_or_create("canary", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(200));
                        Ok::<_, CacheError>(42u32)
                    })
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_stale_value_served_while_recreating() {
    init_logging();
    let backend = Arc::new(MemoryBackend::new());
    let region = Arc::new(CacheRegion::named("stale"));
    region.configure(backend.clone(), Some(Duration::from_secs(1)));

    let old = CacheEntry::created_at(
        json!("old"),
        chrono::Utc::now() - chrono::Duration::seconds(10),
    );
    backend.set(&region.mangle_key("k"), &old).unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let creator = {
        let region = Arc::clone(&region);
        thread::spawn(move || {
            region
                .get_or_create("k", move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok::<_, CacheError>("new".to_string())
                })
                .unwrap()
        })
    };

    started_rx.recv().unwrap();
    let served: String = region
        .get_or_create("k", || -> Result<String, CacheError> {
            panic!("a second creator ran while the first held the lock")
        })
        .unwrap();
    assert_eq!(served, "old");

    release_tx.send(()).unwrap();
    assert_eq!(creator.join().unwrap(), "new");
    assert_eq!(region.get::<String>("k").unwrap(), Some("new".to_string()));
}

#[test]
#[serial]
fn test_hard_invalidation_blocks_stale_value() {
    init_logging();
    let region = Arc::new(CacheRegion::named("hard"));
    region.configure(Arc::new(MemoryBackend::new()), None);

    let calls = AtomicUsize::new(0);
    let create = || Ok::<_, CacheError>(calls.fetch_add(1, Ordering::SeqCst) + 1);
    assert_eq!(region.get_or_create("k", create).unwrap(), 1);

    thread::sleep(Duration::from_millis(5));
    region.invalidate(true).unwrap();
    assert_eq!(region.get::<usize>("k").unwrap(), None);
    assert_eq!(region.get_or_create("k", create).unwrap(), 2);
    assert_eq!(region.get_or_create("k", create).unwrap(), 2);
}

#[test]
#[serial]
fn test_lock_timeout_creates_without_lock() {
    init_logging();
    let region = Arc::new(CacheRegion::named("timeout"));
    region.configure_with(
        Arc::new(MemoryBackend::new()),
        None,
        Duration::from_millis(50),
    );

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let slow = {
        let region = Arc::clone(&region);
        thread::spawn(move || {
            region
                .get_or_create("k", move || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok::<_, CacheError>(1u32)
                })
                .unwrap()
        })
    };

    started_rx.recv().unwrap();
    let fast: u32 = region.get_or_create("k", || Ok::<_, CacheError>(2)).unwrap();
    assert_eq!(fast, 2);

    release_tx.send(()).unwrap();
    assert_eq!(slow.join().unwrap(), 1);
}

#[test]
#[serial]
fn test_multi_single_creator_under_contention() {
    let fixture = RegionFixture::memory(None);
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let region = Arc::clone(&fixture.region);
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Same keys, different orders
                let keys = if i % 2 == 0 { ["x", "y", "z"] } else { ["z", "y", "x"] };
                barrier.wait();
                let values: Vec<String> = region
                    .get_or_create_multi(&keys, |missing: &[&&str]| {
                        calls.fetch_add(missing.len(), Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        Ok::<_, CacheError>(missing.iter().map(|k| k.to_uppercase()).collect())
                    })
                    .unwrap();
                (keys, values)
            })
        })
        .collect();

    for handle in handles {
        let (keys, values) = handle.join().unwrap();
        let expected: Vec<String> = keys.iter().map(|k| k.to_uppercase()).collect();
        assert_eq!(values, expected);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
