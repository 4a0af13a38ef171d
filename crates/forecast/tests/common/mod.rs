#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use forecast::{
    ArtifactStore, ForecastConfig, MemoryStore, ModelCache, PredictorService, RetryPolicy,
    StorageError, Trainer, TrainingConfig, artifact_name,
};
use history::{HistorySource, InMemoryHistory};
use parking_lot::Mutex;
use types::{HistoricalRow, ModelKind, PredictionRequest};

pub const REGIONS: [&str; 3] = ["LIMA", "CUSCO", "PIURA"];
pub const PLANS: [&str; 2] = ["GRATUITO", "EMPRENDEDOR"];
pub const AGE_GROUPS: [&str; 2] = ["18-29", "60+"];

/// Two years of monthly counts for 24 groups, deterministic.
pub fn synthetic_rows() -> Vec<HistoricalRow> {
    let mut rows = Vec::new();
    for (r, region) in REGIONS.iter().enumerate() {
        for (p, plan) in PLANS.iter().enumerate() {
            for (s, sex) in ["M", "F"].iter().enumerate() {
                for (a, age) in AGE_GROUPS.iter().enumerate() {
                    for t in 0..24u32 {
                        let year = 2022 + (t / 12) as i32;
                        let month = t % 12 + 1;
                        let seasonal = if matches!(month, 1 | 2 | 6 | 7 | 8 | 12) { 1.3 } else { 1.0 };
                        let base = 20.0 * (r + 1) as f64 + 8.0 * p as f64 + 5.0 * s as f64 + 12.0 * a as f64;
                        let wobble = ((r * 7 + p * 5 + s * 3 + a + t as usize * 3) % 5) as f64;
                        let count = (base * seasonal + 0.5 * t as f64 + wobble).round();
                        rows.push(HistoricalRow {
                            year,
                            month,
                            region: region.to_string(),
                            sex: sex.to_string(),
                            age_group: age.to_string(),
                            service_category: "GENERAL".into(),
                            insurance_plan: plan.to_string(),
                            ipress_level: "I".into(),
                            count,
                        });
                    }
                }
            }
        }
    }
    rows
}

pub fn history() -> Arc<dyn HistorySource> {
    Arc::new(InMemoryHistory::new(synthetic_rows()))
}

/// Small ensembles so the suite stays fast.
pub fn quick_training_config() -> TrainingConfig {
    let mut config = TrainingConfig {
        cv_folds: 3,
        force_sequential: true,
        ..Default::default()
    };
    config.hyperparameters.random_forest.n_trees = 8;
    config.hyperparameters.random_forest.max_depth = 8;
    config.hyperparameters.gradient_boosting.n_estimators = 25;
    config
}

/// Every model trained once per test binary into a memory store.
pub fn trained_store() -> Arc<MemoryStore> {
    static STORE: OnceLock<Arc<MemoryStore>> = OnceLock::new();
    STORE
        .get_or_init(|| {
            let store = Arc::new(MemoryStore::new());
            let trainer = Trainer::new(quick_training_config(), history(), store.clone());
            trainer.train_all().expect("fixture training succeeds");
            store
        })
        .clone()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
    }
}

pub fn service_over(store: Arc<dyn ArtifactStore>) -> PredictorService {
    let cache = Arc::new(ModelCache::new(store, fast_retry()));
    PredictorService::new(ForecastConfig::default(), cache, history()).expect("valid config")
}

pub fn request(year: i32, month: u32, region: &str) -> PredictionRequest {
    PredictionRequest {
        year,
        month,
        region: region.into(),
        age_group: "18-29".into(),
        sex: "F".into(),
        ipress_level: None,
        service_category: None,
        insurance_plan: "GRATUITO".into(),
        model_type: None,
    }
}

// =============================================================================
// Counting store
// =============================================================================

/// Wraps a store, counting reads per blob; can delay reads and fail the
/// first few with an I/O error.
pub struct CountingStore {
    inner: Arc<dyn ArtifactStore>,
    loads: Mutex<HashMap<String, usize>>,
    delay: Duration,
    failures_remaining: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn ArtifactStore>) -> Self {
        Self {
            inner,
            loads: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            failures_remaining: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn loads_of(&self, kind: ModelKind) -> usize {
        self.loads
            .lock()
            .get(&artifact_name(kind))
            .copied()
            .unwrap_or(0)
    }
}

impl ArtifactStore for CountingStore {
    fn load_blob(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        *self.loads.lock().entry(name.to_string()).or_insert(0) += 1;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(StorageError::Io {
                name: name.to_string(),
                source: io::Error::new(io::ErrorKind::TimedOut, "storage timed out"),
            });
        }
        self.inner.load_blob(name)
    }

    fn save_blob(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.inner.save_blob(name, bytes)
    }
}
