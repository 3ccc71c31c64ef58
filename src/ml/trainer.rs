// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Single control thread, strictly sequential steps:
//
//   for each epoch:
//       for each prefetched batch (fresh shuffle per epoch):
//           forward → cross-entropy → backward → optimiser step
//           checkpoint controller observes the correct count
//       checkpoint controller overwrites snapshot + export
//       metrics.csv gets one row
//
// Key Burn insight:
//   - Training uses an Autodiff backend for gradients
//   - model.valid() returns the model on the inner backend,
//     used for the export shape check (dropout disabled)
//   - argmax(1) returns [batch,1] so we flatten before .equal()
//
// The optimiser is a closed choice (SGD or Adam). Each arm
// builds its concrete optimiser and enters the same generic
// `fit`, so the loop never sees which one is active.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, AdamConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    record::{BinFileRecorder, FullPrecisionSettings, JsonGzFileRecorder},
    tensor::{backend::AutodiffBackend, Distribution},
};
use std::path::Path;

use crate::application::train_use_case::{OptimizerSettings, TrainConfig};
use crate::data::{batch_source::BatchSource, batcher::{DrawingBatch, DrawingBatcher}};
use crate::domain::traits::{ModelArtifacts, SampleSource};
use crate::error::{PipelineError, PipelineResult};
use crate::infra::{
    checkpoint::{CheckpointController, CheckpointEvent},
    metrics::{EpochAccumulator, MetricsLogger},
};
use crate::ml::{
    model::{ClassifierConfig, DrawingClassifier},
    precision::{FullBackend, MixedBackend, Precision},
};

/// File name ending the gzipped JSON export must carry.
pub const EXPORT_SUFFIX: &str = ".json.gz";

// ─── Learner ──────────────────────────────────────────────────────────────────
/// Result of one optimisation step.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub correct: usize,
    pub loss:    f64,
}

/// Model + optimiser, advanced one batch at a time.
pub struct Learner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DrawingClassifier<B>, B>,
{
    model:         DrawingClassifier<B>,
    optim:         O,
    learning_rate: f64,
    device:        B::Device,
}

impl<B, O> Learner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DrawingClassifier<B>, B>,
{
    pub fn new(model: DrawingClassifier<B>, optim: O, learning_rate: f64, device: B::Device) -> Self {
        Self { model, optim, learning_rate, device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn train_step(&mut self, batch: DrawingBatch<B>) -> StepOutcome {
        let (loss, logits) = self.model.forward_loss(batch.images, batch.labels.clone());

        let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
        let correct: i64 = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(batch.labels)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);

        StepOutcome { correct: correct.max(0) as usize, loss: loss_val }
    }
}

impl<B, O> ModelArtifacts for Learner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<DrawingClassifier<B>, B>,
{
    fn save_snapshot(&self, path: &Path) -> PipelineResult<()> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|e| PipelineError::artifact(path, e))
    }

    /// Check the output shape with one random single-sample forward
    /// pass, then write the parameters as gzipped JSON.
    fn export(&self, path: &Path) -> PipelineResult<()> {
        let model = self.model.valid();
        let side  = model.input_size;
        let dummy = Tensor::<B::InnerBackend, 4>::random(
            [1, 1, side, side],
            Distribution::Normal(0.0, 1.0),
            &self.device,
        );

        let dims = model.forward(dummy).dims();
        if dims != [1, model.num_classes] {
            return Err(PipelineError::artifact(
                path,
                format!("dummy forward pass produced {dims:?}, expected [1, {}]", model.num_classes),
            ));
        }

        // The recorder swaps the last extension for `json.gz`.
        if !path.to_string_lossy().ends_with(EXPORT_SUFFIX) {
            return Err(PipelineError::artifact(path, format!("export file must end in {EXPORT_SUFFIX}")));
        }
        let recorder = JsonGzFileRecorder::<FullPrecisionSettings>::new();
        model
            .save_file(path.with_extension(""), &recorder)
            .map_err(|e| PipelineError::artifact(path, e))
    }
}

/// Load snapshot weights into a freshly initialised model.
///
/// The recorder restores tensors as stored, so the input width of
/// `fc1` and the class count of `fc3` are compared against the
/// model the snapshot is loaded into.
pub fn load_snapshot<B: Backend>(
    model:  DrawingClassifier<B>,
    path:   &Path,
    device: &B::Device,
) -> PipelineResult<DrawingClassifier<B>> {
    let expected_fc1 = model.fc1.weight.val().dims();
    let expected_fc3 = model.fc3.weight.val().dims();

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let loaded = model
        .load_file(path.to_path_buf(), &recorder, device)
        .map_err(|e| PipelineError::artifact(path, e))?;

    let checks = [
        ("fc1", expected_fc1, loaded.fc1.weight.val().dims()),
        ("fc3", expected_fc3, loaded.fc3.weight.val().dims()),
    ];
    for (layer, expected, found) in checks {
        if found != expected {
            return Err(PipelineError::artifact(
                path,
                format!("snapshot {layer} weight has shape {found:?}, model expects {expected:?}"),
            ));
        }
    }
    Ok(loaded)
}

// ─── Training run ─────────────────────────────────────────────────────────────
/// Everything the loop needs besides the model and optimiser.
pub struct TrainingRun<S: SampleSource + 'static> {
    pub batches:     BatchSource<S>,
    pub controller:  CheckpointController,
    pub metrics:     MetricsLogger,
    pub num_classes: usize,
}

pub fn run_training<S: SampleSource + 'static>(
    cfg:       &TrainConfig,
    precision: Precision,
    run:       TrainingRun<S>,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);

    match precision {
        Precision::Full  => train_loop::<FullBackend, S>(cfg, run, device),
        Precision::Mixed => train_loop::<MixedBackend, S>(cfg, run, device),
    }
}

fn train_loop<B: AutodiffBackend, S: SampleSource + 'static>(
    cfg:    &TrainConfig,
    run:    TrainingRun<S>,
    device: B::Device,
) -> Result<()> {
    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = ClassifierConfig::new(cfg.input_size, run.num_classes);
    let mut model: DrawingClassifier<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {}x{} input, {} classes, {} features",
        cfg.input_size,
        cfg.input_size,
        run.num_classes,
        model_cfg.feature_dim()
    );

    let snapshot = run.controller.paths().snapshot.clone();
    if snapshot.exists() {
        tracing::info!("Loading {}", snapshot.display());
        model = load_snapshot(model, &snapshot, &device)
            .with_context(|| "Existing snapshot does not fit the current vocabulary; move it aside to start fresh")?;
    }

    // ── Optimiser ─────────────────────────────────────────────────────────────
    match cfg.optimizer_settings()? {
        OptimizerSettings::Sgd { learning_rate, momentum } => {
            tracing::info!("Using SGD with learning rate {learning_rate} and momentum {momentum}");
            let momentum = (momentum > 0.0)
                .then(|| MomentumConfig::new().with_momentum(momentum).with_dampening(0.0));
            let optim = SgdConfig::new()
                .with_momentum(momentum)
                .init::<B, DrawingClassifier<B>>();
            fit(Learner::new(model, optim, learning_rate, device), run, cfg.epochs)
        }
        OptimizerSettings::Adam { learning_rate, beta_1, beta_2, epsilon } => {
            let optim = AdamConfig::new()
                .with_beta_1(beta_1 as f32)
                .with_beta_2(beta_2 as f32)
                .with_epsilon(epsilon as f32)
                .init::<B, DrawingClassifier<B>>();
            tracing::info!("Using Adam with learning rate {learning_rate}");
            fit(Learner::new(model, optim, learning_rate, device), run, cfg.epochs)
        }
    }
}

fn fit<B, O, S>(mut learner: Learner<B, O>, run: TrainingRun<S>, epochs: usize) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<DrawingClassifier<B>, B>,
    S: SampleSource + 'static,
{
    let batcher      = DrawingBatcher::<B>::new(learner.device().clone());
    let mut rng      = rand::thread_rng();
    let mut progress = run.controller.start();

    tracing::info!(
        "Total number of samples: {} ({} batches of {})",
        run.batches.len(),
        run.batches.batches_per_epoch(),
        run.batches.batch_size()
    );

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=epochs {
        tracing::info!("Epoch: {epoch}");
        let mut totals = EpochAccumulator::new();

        for (batch_number, batch) in run.batches.epoch(&mut rng)?.enumerate() {
            let batch = batch.with_context(|| format!("Epoch {epoch}, batch {batch_number}"))?;
            let size  = batch.len();

            let outcome = learner.train_step(batcher.batch(&batch));
            totals.add(size, outcome.correct, outcome.loss);

            let events = run.controller.on_step(&mut progress, outcome.correct, &learner)?;
            tracing::info!(
                "EPOCH: {epoch}  BATCH: {batch_number}  SIZE: {size}  CORRECT: {}  (ROLLING AVG: {})",
                outcome.correct,
                progress.rolling().rolling_average()
            );
            for event in events {
                match event {
                    CheckpointEvent::NewRecord { value, backup: Some(path) } => {
                        tracing::info!("Saved model file {} (ROLLING AVG: {value})", path.display());
                    }
                    CheckpointEvent::BackupRemoved(path) => {
                        tracing::debug!("Removed previous backup {}", path.display());
                    }
                    _ => {}
                }
            }
        }

        run.controller.end_epoch(&learner)?;
        run.metrics.log(&totals.finish(epoch, progress.record().value))?;
        tracing::info!("Epoch {epoch} finished, saved model files");
    }

    tracing::info!("Training complete!");
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::SampleBatch;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn learner() -> Learner<TestBackend, impl Optimizer<DrawingClassifier<TestBackend>, TestBackend>> {
        let device = Default::default();
        let model  = ClassifierConfig::new(16, 3).init::<TestBackend>(&device);
        let optim  = SgdConfig::new().init::<TestBackend, DrawingClassifier<TestBackend>>();
        Learner::new(model, optim, 0.01, device)
    }

    fn batch(n: usize) -> SampleBatch {
        SampleBatch {
            images: (0..n * 16 * 16).map(|i| (i % 2) as f32).collect(),
            labels: (0..n).map(|i| i % 3).collect(),
            height: 16,
            width:  16,
        }
    }

    #[test]
    fn test_train_step_reports_bounded_correct_count() {
        let mut learner = learner();
        let batcher = DrawingBatcher::<TestBackend>::new(Default::default());

        for _ in 0..2 {
            let outcome = learner.train_step(batcher.batch(&batch(4)));
            assert!(outcome.correct <= 4);
            assert!(outcome.loss.is_finite());
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir     = tempfile::tempdir().unwrap();
        let path    = dir.path().join("cnn_model.bin");
        let learner = learner();
        learner.save_snapshot(&path).unwrap();
        assert!(path.exists());

        let device = Default::default();
        let fresh  = ClassifierConfig::new(16, 3).init::<TestBackend>(&device);
        let loaded = load_snapshot(fresh, &path, &device).unwrap();
        assert_eq!(loaded.num_classes, 3);
    }

    #[test]
    fn test_snapshot_for_other_vocabulary_is_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnn_model.bin");
        learner().save_snapshot(&path).unwrap();

        let device = Default::default();
        let wider  = ClassifierConfig::new(16, 5).init::<TestBackend>(&device);
        let err    = load_snapshot(wider, &path, &device).unwrap_err();

        assert!(matches!(err, PipelineError::Artifact { .. }));
        let message = err.to_string();
        assert!(message.contains("fc3"), "{message}");
        assert!(message.contains("cnn_model.bin"), "{message}");
    }

    #[test]
    fn test_export_writes_gzipped_json_at_given_path() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cnn_model.partial.json.gz");
        learner().export(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert!(!dir.path().join("cnn_model.partial.json").exists());
        assert!(!dir.path().join("cnn_model.json.gz").exists());
    }

    #[test]
    fn test_export_rejects_plain_json_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = learner().export(&dir.path().join("cnn_model.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Artifact { .. }));
    }
}
