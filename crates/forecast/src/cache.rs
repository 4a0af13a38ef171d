//! Process-wide model cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ ModelCache                                                   │
//! │  slots[ModelKind::slot()]                                    │
//! │    ├─ artifact: RwLock<Option<Arc<ModelArtifact>>>  (reads)  │
//! │    └─ load:     Mutex<()>                     (one loader)   │
//! │  epoch: AtomicU64          (bumped by invalidate_all)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per type: UNLOADED --get--> LOADED --invalidate_all--> UNLOADED.
//!
//! - Concurrent `get` calls for an unloaded type serialize on that slot's
//!   load mutex, so storage is read once; other types are unaffected.
//! - A load that started before an `invalidate_all` still returns its
//!   artifact to its caller but does not publish it.
//! - Missing artifacts are not retried. Other I/O failures are retried with
//!   exponential backoff, then surfaced as transient.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use ml::ModelArtifact;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use types::ModelKind;

use crate::error::{ForecastError, Result};
use crate::store::{ArtifactStore, StorageError};

/// Retry behaviour for storage reads.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubles each time.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Default)]
struct Slot {
    artifact: RwLock<Option<Arc<ModelArtifact>>>,
    load: Mutex<()>,
}

impl Slot {
    #[inline]
    fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.artifact.read().clone()
    }
}

pub struct ModelCache {
    store: Arc<dyn ArtifactStore>,
    slots: [Slot; ModelKind::ALL.len()],
    epoch: AtomicU64,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("loaded", &self.loaded_types())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .field("policy", &self.policy)
            .finish()
    }
}

impl ModelCache {
    pub fn new(store: Arc<dyn ArtifactStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            slots: Default::default(),
            epoch: AtomicU64::new(0),
            policy,
        }
    }

    /// Artifact for `kind`, loading it from storage on first use.
    pub fn get(&self, kind: ModelKind) -> Result<Arc<ModelArtifact>> {
        let slot = &self.slots[kind.slot()];
        if let Some(artifact) = slot.current() {
            return Ok(artifact);
        }

        // Held for the whole retry loop, backoff sleeps included: waiters on
        // this kind queue behind one loader and never issue their own reads.
        // Other kinds have their own slot lock.
        let _loading = slot.load.lock();
        // Another caller may have finished the load while we waited.
        if let Some(artifact) = slot.current() {
            return Ok(artifact);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let artifact = Arc::new(self.load_with_retry(kind)?);

        let mut published = slot.artifact.write();
        if self.epoch.load(Ordering::Acquire) == epoch {
            *published = Some(Arc::clone(&artifact));
            info!(
                model = %kind,
                test_r2 = artifact.metrics.test.r2,
                n_samples = artifact.n_samples,
                "Loaded model artifact"
            );
        } else {
            debug!(model = %kind, "Invalidated during load; not publishing");
        }

        Ok(artifact)
    }

    /// Drop every loaded artifact. In-flight holders keep their `Arc`.
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let mut dropped = 0;
        for slot in &self.slots {
            if slot.artifact.write().take().is_some() {
                dropped += 1;
            }
        }
        info!(dropped, "Invalidated model cache");
    }

    pub fn is_loaded(&self, kind: ModelKind) -> bool {
        self.slots[kind.slot()].artifact.read().is_some()
    }

    pub fn loaded_types(&self) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|k| self.is_loaded(*k))
            .collect()
    }

    fn load_with_retry(&self, kind: ModelKind) -> Result<ModelArtifact> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.base_backoff;

        for attempt in 1..=max_attempts {
            match self.store.load(kind) {
                Ok(bytes) => return decode(kind, &bytes),
                Err(StorageError::NotFound(_)) => return Err(ForecastError::ArtifactNotFound(kind)),
                Err(StorageError::InvalidName(name)) => {
                    return Err(ForecastError::ContractViolation(format!(
                        "invalid artifact name '{name}'"
                    )));
                }
                Err(err) if attempt < max_attempts => {
                    warn!(model = %kind, attempt, error = %err, "Artifact read failed; retrying");
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    return Err(ForecastError::TransientStorage(format!(
                        "{err} (after {attempt} attempts)"
                    )));
                }
            }
        }

        Err(ForecastError::TransientStorage(format!(
            "no attempt made to read {kind}"
        )))
    }
}

fn decode(kind: ModelKind, bytes: &[u8]) -> Result<ModelArtifact> {
    let artifact =
        ModelArtifact::from_json_slice(bytes).map_err(|e| ForecastError::CorruptArtifact {
            model: kind,
            reason: e.to_string(),
        })?;
    if artifact.model_type != kind {
        return Err(ForecastError::CorruptArtifact {
            model: kind,
            reason: format!("file holds a {} artifact", artifact.model_type),
        });
    }
    Ok(artifact)
}
