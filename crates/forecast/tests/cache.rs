//! Model cache concurrency and invalidation behaviour.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{CountingStore, fast_retry, trained_store};
use forecast::{
    ArtifactStore, ForecastError, MemoryStore, ModelCache, StorageError, artifact_name,
};
use types::ModelKind;

#[test]
fn test_concurrent_get_reads_storage_once() {
    let store = Arc::new(
        CountingStore::new(trained_store()).with_delay(Duration::from_millis(30)),
    );
    let cache = ModelCache::new(store.clone(), fast_retry());

    let artifacts: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| cache.get(ModelKind::RandomForest).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(store.loads_of(ModelKind::RandomForest), 1);
    assert!(artifacts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.loaded_types(), vec![ModelKind::RandomForest]);
}

#[test]
fn test_reload_after_invalidation_only_for_requested_types() {
    let store = Arc::new(CountingStore::new(trained_store()));
    let cache = ModelCache::new(store.clone(), fast_retry());

    for kind in ModelKind::ALL {
        cache.get(kind).unwrap();
    }
    let before = cache.get(ModelKind::Linear).unwrap();
    assert_eq!(cache.loaded_types().len(), 4);

    cache.invalidate_all();
    assert!(cache.loaded_types().is_empty());

    for _ in 0..3 {
        cache.get(ModelKind::Linear).unwrap();
        cache.get(ModelKind::Poisson).unwrap();
    }

    assert_eq!(store.loads_of(ModelKind::Linear), 2);
    assert_eq!(store.loads_of(ModelKind::Poisson), 2);
    assert_eq!(store.loads_of(ModelKind::RandomForest), 1);
    assert_eq!(store.loads_of(ModelKind::GradientBoosting), 1);
    assert!(!Arc::ptr_eq(&before, &cache.get(ModelKind::Linear).unwrap()));
    // The holder of the old artifact can still use it.
    assert_eq!(before.model_type, ModelKind::Linear);
}

#[test]
fn test_transient_errors_are_retried() {
    let store = Arc::new(CountingStore::new(trained_store()).failing_first(2));
    let cache = ModelCache::new(store.clone(), fast_retry());

    cache.get(ModelKind::GradientBoosting).unwrap();
    assert_eq!(store.loads_of(ModelKind::GradientBoosting), 3);
}

#[test]
fn test_persistent_io_failure_surfaces_as_transient() {
    let store = Arc::new(CountingStore::new(trained_store()).failing_first(100));
    let cache = ModelCache::new(store.clone(), fast_retry());

    let err = cache.get(ModelKind::Linear).unwrap_err();
    assert!(matches!(err, ForecastError::TransientStorage(_)), "{err}");
    assert_eq!(store.loads_of(ModelKind::Linear), 3);
    assert!(!cache.is_loaded(ModelKind::Linear));
}

#[test]
fn test_missing_artifact_is_not_retried() {
    let store = Arc::new(CountingStore::new(Arc::new(MemoryStore::new())));
    let cache = ModelCache::new(store.clone(), fast_retry());

    let err = cache.get(ModelKind::Poisson).unwrap_err();
    assert!(matches!(err, ForecastError::ArtifactNotFound(ModelKind::Poisson)));
    assert_eq!(store.loads_of(ModelKind::Poisson), 1);
}

/// Store whose reads of one blob block until the test releases them.
struct GatedStore {
    inner: Arc<MemoryStore>,
    gated: String,
    gate: Barrier,
}

impl GatedStore {
    fn new(kind: ModelKind) -> Self {
        Self {
            inner: trained_store(),
            gated: artifact_name(kind),
            gate: Barrier::new(2),
        }
    }
}

impl ArtifactStore for GatedStore {
    fn load_blob(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        if name == self.gated {
            self.gate.wait(); // loader has started
            self.gate.wait(); // test has done its work
        }
        self.inner.load_blob(name)
    }

    fn save_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.inner.save_blob(name, bytes)
    }
}

#[test]
fn test_load_racing_invalidation_is_not_published() {
    let store = Arc::new(GatedStore::new(ModelKind::Poisson));
    let cache = ModelCache::new(store.clone(), fast_retry());

    thread::scope(|s| {
        let loader = s.spawn(|| cache.get(ModelKind::Poisson));
        store.gate.wait();
        cache.invalidate_all();
        store.gate.wait();

        let artifact = loader.join().unwrap().unwrap();
        assert_eq!(artifact.model_type, ModelKind::Poisson);
    });

    assert!(!cache.is_loaded(ModelKind::Poisson));
}

#[test]
fn test_waiters_share_one_retry_loop() {
    let store = Arc::new(
        CountingStore::new(trained_store())
            .with_delay(Duration::from_millis(10))
            .failing_first(1),
    );
    let cache = ModelCache::new(store.clone(), fast_retry());

    thread::scope(|s| {
        for _ in 0..6 {
            s.spawn(|| cache.get(ModelKind::Linear).unwrap());
        }
    });

    // One failed read plus one successful retry, whatever the number of callers.
    assert_eq!(store.loads_of(ModelKind::Linear), 2);
}

#[test]
fn test_slow_load_does_not_block_other_kinds() {
    let store = Arc::new(GatedStore::new(ModelKind::GradientBoosting));
    let cache = ModelCache::new(store.clone(), fast_retry());

    thread::scope(|s| {
        let loader = s.spawn(|| cache.get(ModelKind::GradientBoosting));
        store.gate.wait();

        // The gradient boosting slot is mid-load; other kinds load freely.
        let linear = cache.get(ModelKind::Linear).unwrap();
        assert_eq!(linear.model_type, ModelKind::Linear);
        assert!(cache.is_loaded(ModelKind::Linear));
        assert!(!cache.is_loaded(ModelKind::GradientBoosting));

        store.gate.wait();
        loader.join().unwrap().unwrap();
    });

    assert!(cache.is_loaded(ModelKind::GradientBoosting));
}
