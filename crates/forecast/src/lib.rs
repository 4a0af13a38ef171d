//! Demand forecasting service layer.
//!
//! # Architecture
//!
//! ```text
//! Trainer ──save──► ArtifactStore ──load──► ModelCache ──Arc<ModelArtifact>──► PredictorService
//!    ▲                                                                              │
//!    └──────────────────────── HistorySource ◄──── series(group, before) ───────────┘
//! ```
//!
//! - [`store`]: byte storage for artifacts and reports
//! - [`cache`]: load-once, per-type artifact cache with invalidation
//! - [`predictor`]: single and batch prediction, model catalog
//! - [`training`]: offline training and comparative report
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use forecast::{ForecastConfig, PredictorService};
//!
//! let history = Arc::new(history::SqliteHistory::open("attentions.db")?);
//! let service = PredictorService::from_config(ForecastConfig::default(), history)?;
//! let result = service.predict_one(&request)?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod predictor;
pub mod store;
pub mod training;

pub use cache::{ModelCache, RetryPolicy};
pub use config::{ForecastConfig, SampleRows, TrainingConfig};
pub use error::ForecastError;
pub use predictor::PredictorService;
pub use store::{ArtifactStore, DirectoryStore, MemoryStore, StorageError, artifact_name};
pub use training::{COMPARATIVE_REPORT, ComparativeReport, Trainer, TrainingReport, TrainingSet};
