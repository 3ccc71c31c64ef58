// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Resolve precision              (Layer 5 - ml)
//   Step 2: Load or build the corpus index (Layer 4 / 6)
//   Step 3: Write labels.txt once          (Layer 6 - infra)
//   Step 4: Save the effective config      (Layer 6 - infra)
//   Step 5: Build the batch source         (Layer 4 - data)
//   Step 6: Run training loop              (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::{
    batch_source::BatchSource,
    dataset::CorpusDataset,
    indexer::CorpusIndexer,
    rasterizer::{Materializer, Rasterizer},
};
use crate::error::{PipelineError, PipelineResult};
use crate::infra::{
    checkpoint::{save_config, CheckpointController, CheckpointPaths, CheckpointPolicy},
    index_cache::IndexCache,
    labels_file::ensure_labels_file,
    metrics::MetricsLogger,
};
use crate::ml::{
    precision::Precision,
    trainer::{run_training, TrainingRun, EXPORT_SUFFIX},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every setting of a run. Only the corpus directory comes from
// the command line; the rest are compile-time defaults.
// Serialisable so the effective values land in train_config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:           PathBuf,
    pub output_dir:         PathBuf,
    pub batch_size:         usize,
    pub epochs:             usize,
    pub optimizer:          String,
    pub sgd_learning_rate:  f64,
    pub sgd_momentum:       f64,
    pub adam_learning_rate: f64,
    pub adam_betas:         (f64, f64),
    pub adam_epsilon:       f64,
    pub rolling_window:     usize,
    pub keep_backups:       bool,
    pub mixed_precision:    bool,
    pub prefetch_depth:     usize,
    pub num_workers:        usize,
    pub input_size:         usize,
    pub index_cache_file:   String,
    pub labels_file:        String,
    pub snapshot_file:      String,
    pub export_file:        String,
    pub metrics_file:       String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:           default_data_dir(),
            output_dir:         PathBuf::from("."),
            batch_size:         1000,
            epochs:             4,
            optimizer:          "SGD".to_string(),
            sgd_learning_rate:  0.01,
            sgd_momentum:       0.0,
            adam_learning_rate: 0.001,
            adam_betas:         (0.9, 0.99),
            adam_epsilon:       1e-4,
            rolling_window:     100,
            keep_backups:       true,
            mixed_precision:    false,
            prefetch_depth:     2,
            num_workers:        4,
            input_size:         64,
            index_cache_file:   "index_cache.bin".to_string(),
            labels_file:        "labels.txt".to_string(),
            snapshot_file:      "cnn_model.bin".to_string(),
            export_file:        "cnn_model.json.gz".to_string(),
            metrics_file:       "metrics.csv".to_string(),
        }
    }
}

/// `~/data/quickdraw`, or a relative `data/quickdraw` when no
/// home directory can be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("data").join("quickdraw"))
        .unwrap_or_else(|| PathBuf::from("data/quickdraw"))
}

/// Validated optimiser choice with its own hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum OptimizerSettings {
    Sgd  { learning_rate: f64, momentum: f64 },
    Adam { learning_rate: f64, beta_1: f64, beta_2: f64, epsilon: f64 },
}

impl TrainConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Resolve a file name against the output directory.
    pub fn output_path(&self, file: &str) -> PathBuf {
        self.output_dir.join(file)
    }

    /// Parse the optimiser name (case-insensitive) and check its
    /// hyperparameters.
    pub fn optimizer_settings(&self) -> PipelineResult<OptimizerSettings> {
        match self.optimizer.to_ascii_lowercase().as_str() {
            "sgd" => {
                positive("SGD learning rate", self.sgd_learning_rate)?;
                if !(0.0..1.0).contains(&self.sgd_momentum) {
                    return Err(PipelineError::invalid_config(format!(
                        "SGD momentum must be in [0, 1), got {}",
                        self.sgd_momentum
                    )));
                }
                Ok(OptimizerSettings::Sgd {
                    learning_rate: self.sgd_learning_rate,
                    momentum:      self.sgd_momentum,
                })
            }
            "adam" => {
                positive("Adam learning rate", self.adam_learning_rate)?;
                positive("Adam epsilon", self.adam_epsilon)?;
                let (beta_1, beta_2) = self.adam_betas;
                for beta in [beta_1, beta_2] {
                    if !(0.0..1.0).contains(&beta) {
                        return Err(PipelineError::invalid_config(format!(
                            "Adam betas must be in [0, 1), got {beta}"
                        )));
                    }
                }
                Ok(OptimizerSettings::Adam {
                    learning_rate: self.adam_learning_rate,
                    beta_1,
                    beta_2,
                    epsilon: self.adam_epsilon,
                })
            }
            other => Err(PipelineError::invalid_config(format!(
                "unknown optimizer '{other}' (expected SGD or Adam)"
            ))),
        }
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.batch_size == 0 {
            return Err(PipelineError::invalid_config("batch size must be positive"));
        }
        if self.epochs == 0 {
            return Err(PipelineError::invalid_config("epoch count must be positive"));
        }
        if self.rolling_window == 0 {
            return Err(PipelineError::invalid_config("rolling window must be positive"));
        }
        if self.input_size < 4 || self.input_size % 4 != 0 {
            return Err(PipelineError::invalid_config(format!(
                "input size must be a positive multiple of 4, got {}",
                self.input_size
            )));
        }
        if !self.export_file.ends_with(EXPORT_SUFFIX) {
            return Err(PipelineError::invalid_config(format!(
                "export file must end in {EXPORT_SUFFIX}, got '{}'",
                self.export_file
            )));
        }
        self.optimizer_settings().map(|_| ())
    }
}

fn positive(name: &str, value: f64) -> PipelineResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(format!("{name} must be positive, got {value}")))
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.validate()?;
        fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("Cannot create output directory '{}'", cfg.output_dir.display()))?;

        // ── Step 1: Precision capability ──────────────────────────────────────
        let precision  = Precision::resolve(cfg.mixed_precision);
        let batch_size = precision.batch_size(cfg.batch_size);

        // ── Step 2: Corpus index, cached across runs ──────────────────────────
        let indexer = CorpusIndexer::new(&cfg.data_dir, batch_size)
            .with_label_multiple(precision.label_multiple());
        let cache = IndexCache::new(cfg.output_path(&cfg.index_cache_file));
        let index = Arc::new(
            cache
                .load_or_build(&indexer)
                .with_context(|| format!("Cannot index corpus in '{}'", cfg.data_dir.display()))?,
        );

        // ── Step 3: Label list for the inference side ─────────────────────────
        ensure_labels_file(&cfg.output_path(&cfg.labels_file), &index.vocabulary)?;
        tracing::info!("Total number of labels: {}", index.vocabulary.len());

        // ── Step 4: Effective config ──────────────────────────────────────────
        let mut effective = cfg.clone();
        effective.batch_size = batch_size;
        save_config(&cfg.output_dir, &effective)?;

        // ── Step 5: Batch source ──────────────────────────────────────────────
        let num_classes = index.vocabulary.len();
        let dataset = CorpusDataset::new(index)
            .with_materializer(Materializer::new(Rasterizer::new(cfg.input_size as u32)));
        let batches = BatchSource::new(Arc::new(dataset), batch_size, cfg.num_workers, cfg.prefetch_depth)?;

        // ── Step 6: Training loop (Layer 5) ───────────────────────────────────
        let controller = CheckpointController::new(
            CheckpointPaths::new(&cfg.output_dir, &cfg.snapshot_file, &cfg.export_file),
            CheckpointPolicy { rolling_window: cfg.rolling_window, keep_backups: cfg.keep_backups },
        );
        let metrics = MetricsLogger::new(cfg.output_path(&cfg.metrics_file))?;

        run_training(
            &effective,
            precision,
            TrainingRun { batches, controller, metrics, num_classes },
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.epochs, 4);
        assert_eq!(cfg.rolling_window, 100);
        assert!(cfg.keep_backups);
        assert!(cfg.data_dir.ends_with("data/quickdraw"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_optimizer_names_are_case_insensitive() {
        let mut cfg = TrainConfig::default();
        assert_eq!(
            cfg.optimizer_settings().unwrap(),
            OptimizerSettings::Sgd { learning_rate: 0.01, momentum: 0.0 }
        );

        cfg.optimizer = "adam".to_string();
        assert_eq!(
            cfg.optimizer_settings().unwrap(),
            OptimizerSettings::Adam { learning_rate: 0.001, beta_1: 0.9, beta_2: 0.99, epsilon: 1e-4 }
        );
    }

    #[test]
    fn test_unknown_optimizer_is_fatal_input() {
        let cfg = TrainConfig { optimizer: "rmsprop".to_string(), ..TrainConfig::default() };
        let err = cfg.optimizer_settings().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FatalInput);
    }

    #[test]
    fn test_bad_hyperparameters_are_rejected() {
        let cfg = TrainConfig { sgd_learning_rate: 0.0, ..TrainConfig::default() };
        assert!(cfg.optimizer_settings().is_err());

        let cfg = TrainConfig {
            optimizer:  "Adam".to_string(),
            adam_betas: (0.9, 1.5),
            ..TrainConfig::default()
        };
        assert!(cfg.optimizer_settings().is_err());

        let cfg = TrainConfig { input_size: 30, ..TrainConfig::default() };
        assert!(cfg.validate().is_err());

        let cfg = TrainConfig { export_file: "cnn_model.json".to_string(), ..TrainConfig::default() };
        assert!(cfg.validate().is_err());
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_serialises_to_json() {
        let cfg  = TrainConfig::default().with_data_dir("/tmp/corpus");
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data_dir, PathBuf::from("/tmp/corpus"));
        assert_eq!(back.snapshot_file, "cnn_model.bin");
    }

    #[test]
    fn test_missing_corpus_aborts_before_training() {
        let out = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            data_dir:   out.path().join("does-not-exist"),
            output_dir: out.path().to_path_buf(),
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        let pipeline = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(pipeline, PipelineError::CorpusUnavailable { .. }));
    }
}
