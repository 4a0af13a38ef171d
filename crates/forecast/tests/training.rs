//! End-to-end training into a directory store.

mod common;

use std::sync::Arc;

use common::{history, quick_training_config, request, synthetic_rows, trained_store};
use forecast::{
    ArtifactStore, COMPARATIVE_REPORT, ComparativeReport, DirectoryStore, MemoryStore,
    SampleRows, Trainer, artifact_name,
};
use history::{HistorySource, InMemoryHistory};
use ml::{EncoderInput, ModelArtifact, TemporalFeatures};
use types::{ModelKind, Period, PeriodRange};

#[test]
fn test_train_all_writes_artifacts_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::new(dir.path()));
    let trainer = Trainer::new(quick_training_config(), history(), store.clone());

    let report = trainer.train_all().unwrap();

    assert_eq!(report.models.len(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(report.cleaning.total, 24 * 24);
    assert_eq!(report.cleaning.kept, 24 * 24);
    for kind in ModelKind::ALL {
        assert!(dir.path().join(artifact_name(kind)).is_file(), "{kind}");
    }

    let best = report
        .models
        .iter()
        .max_by(|a, b| a.metrics.test.r2.total_cmp(&b.metrics.test.r2))
        .unwrap();
    assert_eq!(report.best_model, Some(best.model_type));

    let on_disk: ComparativeReport =
        serde_json::from_slice(&store.load_blob(COMPARATIVE_REPORT).unwrap()).unwrap();
    assert_eq!(on_disk, report);

    // No temp files left behind.
    let stray = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .count();
    assert_eq!(stray, 0);
}

#[test]
fn test_report_metrics_are_sane() {
    let store = trained_store();
    for kind in ModelKind::ALL {
        let artifact = ModelArtifact::from_json_slice(&store.load(kind).unwrap()).unwrap();
        let m = artifact.metrics;

        assert_eq!(artifact.model_type, kind);
        assert_eq!(artifact.requires_scaling, kind.requires_scaling());
        assert!(m.test.rmse.is_finite() && m.test.rmse >= 0.0);
        assert!(m.test.mae <= m.test.rmse + 1e-9);
        assert!(m.train.r2 > 0.5, "{kind} train r2 {}", m.train.r2);
        assert!(m.cv_r2_mean.is_some() && m.cv_r2_std.is_some());
        assert!(artifact.thresholds.low_upper <= artifact.thresholds.high_lower);

        let goodness = m.aic.is_some() && m.pseudo_r2.is_some();
        assert_eq!(goodness, kind == ModelKind::Poisson, "{kind}");
    }
}

#[test]
fn test_persisted_artifact_predicts_identically() {
    let store = trained_store();
    let req = request(2024, 7, "PIURA");
    let temporal = TemporalFeatures {
        lag_1: 64.0,
        rolling_mean_3: 61.0,
        rolling_mean_6: 58.5,
        cold_start: false,
    };

    for kind in ModelKind::ALL {
        let loaded = ModelArtifact::from_json_slice(&store.load(kind).unwrap()).unwrap();
        let reloaded = ModelArtifact::from_json_str(&loaded.to_json().unwrap()).unwrap();
        assert_eq!(loaded, reloaded);

        let a = loaded.encode(&EncoderInput::from(&req), &temporal).unwrap();
        let b = reloaded.encode(&EncoderInput::from(&req), &temporal).unwrap();
        let pa = loaded.predict(&a.vector).unwrap();
        let pb = reloaded.predict(&b.vector).unwrap();
        assert_eq!(pa.to_bits(), pb.to_bits(), "{kind}");
    }
}

#[test]
fn test_same_seed_same_models() {
    let config = quick_training_config();
    let a = Trainer::new(config.clone(), history(), Arc::new(MemoryStore::new()));
    let b = Trainer::new(config, history(), Arc::new(MemoryStore::new()));

    let set_a = a.prepare().unwrap();
    let set_b = b.prepare().unwrap();
    assert_eq!(set_a.train, set_b.train);
    assert_eq!(set_a.test, set_b.test);

    for kind in [ModelKind::RandomForest, ModelKind::GradientBoosting] {
        let ra = a.fit_artifact(kind, &set_a).unwrap();
        let rb = b.fit_artifact(kind, &set_b).unwrap();
        assert_eq!(ra.regressor, rb.regressor, "{kind}");
        assert_eq!(ra.metrics.test, rb.metrics.test);
    }
}

#[test]
fn test_split_is_disjoint_and_covers_rows() {
    let trainer = Trainer::new(quick_training_config(), history(), Arc::new(MemoryStore::new()));
    let set = trainer.prepare().unwrap();

    let mut all: Vec<usize> = set.train.iter().chain(&set.test).copied().collect();
    all.sort_unstable();
    assert_eq!(all, (0..set.rows.len()).collect::<Vec<_>>());

    let expected_test = (set.rows.len() as f64 * 0.2).round() as usize;
    assert!(set.test.len().abs_diff(expected_test) <= 1);
}

#[test]
fn test_single_model_training_replaces_artifact() {
    let store = Arc::new(MemoryStore::new());
    let trainer = Trainer::new(quick_training_config(), history(), store.clone());

    let report = trainer.train(ModelKind::Linear).unwrap();
    assert_eq!(report.model_type, ModelKind::Linear);
    assert_eq!(report.n_train + report.n_test, report.n_samples);
    assert!(store.load(ModelKind::Linear).is_ok());
    assert!(store.load(ModelKind::Poisson).is_err());
    assert!(store.load_blob(COMPARATIVE_REPORT).is_err());
}

#[test]
fn test_training_features_match_serving_features() {
    let mut rows = synthetic_rows();
    // Same group as rows[0] but an IPRESS level cleaning rejects.
    let mut rejected = rows[0].clone();
    rejected.year = 2023;
    rejected.month = 5;
    rejected.ipress_level = "IV".into();
    rejected.count = 1000.0;
    let key = rejected.group_key();
    rows.push(rejected);

    let source: Arc<dyn HistorySource> = Arc::new(InMemoryHistory::new(rows));
    let trainer = Trainer::new(quick_training_config(), source.clone(), Arc::new(MemoryStore::new()));
    let set = trainer.prepare().unwrap();
    assert_eq!(set.cleaning.unknown_category, 1);

    for (row, trained) in set.rows.iter().zip(&set.temporal) {
        let series = source.series(&row.group_key(), row.period()).unwrap();
        let served = TemporalFeatures::from_series(&series, row.period());
        assert_eq!(*trained, served, "{:?} {:?}", row.group_key(), row.period());
    }

    let count_at = |year, month| {
        set.rows
            .iter()
            .find(|r| r.group_key() == key && r.period() == Period::new(year, month))
            .map(|r| r.count)
            .unwrap()
    };
    let june = set
        .rows
        .iter()
        .position(|r| r.group_key() == key && r.period() == Period::new(2023, 6))
        .unwrap();
    assert_eq!(set.temporal[june].lag_1, count_at(2023, 5) + 1000.0);
}

#[test]
fn test_period_range_keeps_prior_history_for_features() {
    let mut config = quick_training_config();
    config.period_range = Some(PeriodRange {
        start: Period::new(2023, 1),
        end: Period::new(2023, 12),
    });
    let trainer = Trainer::new(config, history(), Arc::new(MemoryStore::new()));
    let set = trainer.prepare().unwrap();

    assert_eq!(set.rows.len(), 24 * 12);
    assert!(set.rows.iter().all(|r| r.year == 2023));
    assert!(set.temporal.iter().all(|t| !t.cold_start));
}

#[test]
fn test_large_history_is_sampled_reproducibly() {
    let mut config = quick_training_config();
    config.sample_rows = SampleRows::Fixed(200);

    let first = Trainer::new(config.clone(), history(), Arc::new(MemoryStore::new()))
        .prepare()
        .unwrap();
    let second = Trainer::new(config, history(), Arc::new(MemoryStore::new()))
        .prepare()
        .unwrap();

    assert_eq!(first.cleaning.sampled_from, Some(24 * 24));
    assert_eq!(first.cleaning.total, 200);
    assert_eq!(first.rows.len(), 200);
    assert_eq!(first.rows, second.rows);
    assert_eq!(first.train, second.train);

    // The sample preserves the source's period ordering.
    assert!(first.rows.windows(2).all(|w| w[0].period() <= w[1].period()));

    let full = Trainer::new(quick_training_config(), history(), Arc::new(MemoryStore::new()))
        .prepare()
        .unwrap();
    assert_eq!(full.cleaning.sampled_from, None);
    assert_eq!(full.rows.len(), 24 * 24);
}
