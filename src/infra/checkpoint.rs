// ============================================================
// Layer 6 — Checkpoint Controller
// ============================================================
// Decides, after every training step, which model files to
// write. The model itself is only seen through the
// ModelArtifacts trait, so everything here is testable with
// a fake.
//
// State machine (per run, carried in TrainingProgress):
//
//   WARMUP    fewer than 2 × window steps observed.
//             record = max(record, rolling average), no files.
//
//   TRACKING  rolling average > record  →  write numbered
//             backup cnn_model_<avg>.bin, delete the previous
//             one, record = avg.
//
// Independently, on every step:
//   cnn_model.bin  missing → write it   (atomic)
//   cnn_model.json.gz missing → export it  (atomic)
//
// At every epoch end both are overwritten unconditionally.
//
// File naming convention (output dir):
//   cnn_model.bin        ← canonical snapshot, resume source
//   cnn_model.json.gz    ← export artifact, gzipped JSON
//   cnn_model_518.bin    ← best backup, named by its record
//   train_config.json    ← effective run configuration
//
// Canonical files are written to `<stem>.partial.<exts>` and
// renamed into place. Numbered backups are written directly.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::traits::ModelArtifacts;
use crate::error::{PipelineError, PipelineResult};
use crate::infra::metrics::RollingMetric;

// ─── Paths ────────────────────────────────────────────────────────────────────
/// Where the controller writes. Backups share the snapshot's
/// stem and extension: `cnn_model.bin` → `cnn_model_<N>.bin`.
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    pub snapshot: PathBuf,
    pub export:   PathBuf,
}

impl CheckpointPaths {
    pub fn new(dir: &Path, snapshot_file: &str, export_file: &str) -> Self {
        Self {
            snapshot: dir.join(snapshot_file),
            export:   dir.join(export_file),
        }
    }

    /// Path of the numbered backup for rolling average `value`.
    pub fn backup(&self, value: usize) -> PathBuf {
        let stem = self.snapshot.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
        let name = match self.snapshot.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}_{value}.{ext}"),
            None      => format!("{stem}_{value}"),
        };
        self.snapshot.with_file_name(name)
    }
}

/// `dir/name.ext` → `dir/name.partial.ext`, splitting at the first
/// dot so `cnn_model.json.gz` → `cnn_model.partial.json.gz`.
fn partial_path(path: &Path) -> PathBuf {
    let file = path.file_name().and_then(|s| s.to_str()).unwrap_or("artifact");
    let name = match file.split_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.partial.{ext}"),
        _                                     => format!("{file}.partial"),
    };
    path.with_file_name(name)
}

/// Write through `write` to a sibling temp path, then rename
/// over `path`. On failure the previous file is left untouched.
fn replace_atomically<F>(path: &Path, write: F) -> PipelineResult<()>
where
    F: FnOnce(&Path) -> PipelineResult<()>,
{
    let tmp = partial_path(path);
    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|source| PipelineError::Write { path: path.to_path_buf(), source })
}

// ─── Policy and state ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy)]
pub struct CheckpointPolicy {
    /// Rolling window length; warmup lasts twice this many steps.
    pub rolling_window: usize,
    /// Keep the best numbered backup on disk.
    pub keep_backups:   bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPhase {
    Warmup,
    Tracking,
}

/// Best rolling average so far and the backup it produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub value:  usize,
    pub backup: Option<PathBuf>,
}

/// Everything the controller mutates during a run.
/// Built fresh at process start; never persisted.
#[derive(Debug, Clone)]
pub struct TrainingProgress {
    rolling: RollingMetric,
    record:  CheckpointRecord,
    steps:   u64,
}

impl TrainingProgress {
    pub fn new(rolling_window: usize) -> Self {
        Self {
            rolling: RollingMetric::new(rolling_window),
            record:  CheckpointRecord::default(),
            steps:   0,
        }
    }

    pub fn rolling(&self) -> &RollingMetric {
        &self.rolling
    }

    pub fn record(&self) -> &CheckpointRecord {
        &self.record
    }

    pub fn phase(&self) -> CheckpointPhase {
        if self.steps < 2 * self.rolling.capacity() as u64 {
            CheckpointPhase::Warmup
        } else {
            CheckpointPhase::Tracking
        }
    }
}

/// Observable outcome of a controller call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointEvent {
    NewRecord { value: usize, backup: Option<PathBuf> },
    BackupRemoved(PathBuf),
    SnapshotRegenerated(PathBuf),
    ExportRegenerated(PathBuf),
    EpochSaved,
}

// ─── Controller ───────────────────────────────────────────────────────────────
pub struct CheckpointController {
    paths:  CheckpointPaths,
    policy: CheckpointPolicy,
}

impl CheckpointController {
    pub fn new(paths: CheckpointPaths, policy: CheckpointPolicy) -> Self {
        Self { paths, policy }
    }

    pub fn paths(&self) -> &CheckpointPaths {
        &self.paths
    }

    /// Fresh progress state sized to this controller's window.
    pub fn start(&self) -> TrainingProgress {
        TrainingProgress::new(self.policy.rolling_window)
    }

    /// Observe one step's correct-prediction count.
    pub fn on_step<M: ModelArtifacts>(
        &self,
        progress: &mut TrainingProgress,
        correct:  usize,
        model:    &M,
    ) -> PipelineResult<Vec<CheckpointEvent>> {
        progress.rolling.push(correct);
        progress.steps += 1;
        let average = progress.rolling.rolling_average();
        self.apply_average(progress, average, model)
    }

    /// Record logic for one rolling-average value, followed by
    /// the missing-artifact checks.
    pub fn apply_average<M: ModelArtifacts>(
        &self,
        progress: &mut TrainingProgress,
        average:  usize,
        model:    &M,
    ) -> PipelineResult<Vec<CheckpointEvent>> {
        let mut events = Vec::new();

        match progress.phase() {
            CheckpointPhase::Warmup => {
                progress.record.value = progress.record.value.max(average);
            }
            CheckpointPhase::Tracking if average > progress.record.value => {
                self.new_record(progress, average, model, &mut events)?;
            }
            CheckpointPhase::Tracking => {}
        }

        events.extend(self.ensure_artifacts(model)?);
        Ok(events)
    }

    fn new_record<M: ModelArtifacts>(
        &self,
        progress: &mut TrainingProgress,
        average:  usize,
        model:    &M,
        events:   &mut Vec<CheckpointEvent>,
    ) -> PipelineResult<()> {
        let previous = std::mem::take(&mut progress.record);

        let backup = if self.policy.keep_backups {
            let path = self.paths.backup(average);
            model.save_snapshot(&path)?;

            // The previous backup, or one left behind for the same
            // record value by an earlier run.
            let stale = previous
                .backup
                .or_else(|| (previous.value > 0).then(|| self.paths.backup(previous.value)))
                .filter(|p| p.exists() && *p != path);
            if let Some(stale) = stale {
                fs::remove_file(&stale)
                    .map_err(|source| PipelineError::Write { path: stale.clone(), source })?;
                events.push(CheckpointEvent::BackupRemoved(stale));
            }
            Some(path)
        } else {
            None
        };

        tracing::info!("New record: {average}");
        progress.record = CheckpointRecord { value: average, backup: backup.clone() };
        events.push(CheckpointEvent::NewRecord { value: average, backup });
        Ok(())
    }

    /// Write the canonical snapshot and the export if either is
    /// missing from disk. Idempotent.
    pub fn ensure_artifacts<M: ModelArtifacts>(&self, model: &M) -> PipelineResult<Vec<CheckpointEvent>> {
        let mut events = Vec::new();

        if !self.paths.snapshot.exists() {
            replace_atomically(&self.paths.snapshot, |tmp| model.save_snapshot(tmp))?;
            tracing::info!("Saved {}", self.paths.snapshot.display());
            events.push(CheckpointEvent::SnapshotRegenerated(self.paths.snapshot.clone()));
        }

        if !self.paths.export.exists() {
            replace_atomically(&self.paths.export, |tmp| model.export(tmp))?;
            tracing::info!("Exported {}", self.paths.export.display());
            events.push(CheckpointEvent::ExportRegenerated(self.paths.export.clone()));
        }

        Ok(events)
    }

    /// Overwrite the snapshot and the export.
    pub fn end_epoch<M: ModelArtifacts>(&self, model: &M) -> PipelineResult<CheckpointEvent> {
        replace_atomically(&self.paths.snapshot, |tmp| model.save_snapshot(tmp))?;
        replace_atomically(&self.paths.export, |tmp| model.export(tmp))?;
        tracing::info!(
            "Saved {} and {}",
            self.paths.snapshot.display(),
            self.paths.export.display()
        );
        Ok(CheckpointEvent::EpochSaved)
    }
}

/// Save the effective run configuration next to the model files.
pub fn save_config<C: Serialize>(dir: &Path, cfg: &C) -> Result<PathBuf> {
    let path = dir.join("train_config.json");
    let json = serde_json::to_string_pretty(cfg)?;

    fs::write(&path, json)
        .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

    tracing::debug!("Saved training config to '{}'", path.display());
    Ok(path)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Writes tiny marker files and counts calls.
    #[derive(Default)]
    struct FakeModel {
        snapshots: Cell<usize>,
        exports:   Cell<usize>,
    }

    impl ModelArtifacts for FakeModel {
        fn save_snapshot(&self, path: &Path) -> PipelineResult<()> {
            self.snapshots.set(self.snapshots.get() + 1);
            fs::write(path, b"weights").map_err(|source| PipelineError::Write { path: path.into(), source })
        }

        fn export(&self, path: &Path) -> PipelineResult<()> {
            self.exports.set(self.exports.get() + 1);
            fs::write(path, b"{}").map_err(|source| PipelineError::Write { path: path.into(), source })
        }
    }

    fn controller(dir: &Path, window: usize, keep_backups: bool) -> CheckpointController {
        CheckpointController::new(
            CheckpointPaths::new(dir, "cnn_model.bin", "cnn_model.json.gz"),
            CheckpointPolicy { rolling_window: window, keep_backups },
        )
    }

    fn backups(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("cnn_model_"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_backup_and_partial_names() {
        let paths = CheckpointPaths::new(Path::new("out"), "cnn_model.bin", "cnn_model.json.gz");
        assert_eq!(paths.backup(518), Path::new("out/cnn_model_518.bin"));
        assert_eq!(partial_path(&paths.snapshot), Path::new("out/cnn_model.partial.bin"));
        assert_eq!(partial_path(&paths.export), Path::new("out/cnn_model.partial.json.gz"));
    }

    #[test]
    fn test_first_step_writes_missing_artifacts_once() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 100, true);
        let model = FakeModel::default();
        let mut progress = ctl.start();

        let events = ctl.on_step(&mut progress, 10, &model).unwrap();
        assert_eq!(events.len(), 2);
        assert!(ctl.paths().snapshot.exists());
        assert!(ctl.paths().export.exists());

        for _ in 0..5 {
            assert!(ctl.on_step(&mut progress, 10, &model).unwrap().is_empty());
        }
        assert_eq!(model.snapshots.get(), 1);
        assert_eq!(model.exports.get(), 1);
        assert!(!dir.path().join("cnn_model.partial.bin").exists());
    }

    #[test]
    fn test_deleted_snapshot_is_regenerated_exactly_once() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 100, true);
        let model = FakeModel::default();
        let mut progress = ctl.start();
        ctl.on_step(&mut progress, 1, &model).unwrap();

        fs::remove_file(&ctl.paths().snapshot).unwrap();
        fs::remove_file(&ctl.paths().export).unwrap();

        let mut snapshot_events = 0;
        let mut export_events   = 0;
        for _ in 0..20 {
            for event in ctl.on_step(&mut progress, 1, &model).unwrap() {
                match event {
                    CheckpointEvent::SnapshotRegenerated(_) => snapshot_events += 1,
                    CheckpointEvent::ExportRegenerated(_)   => export_events += 1,
                    _ => {}
                }
            }
        }
        assert_eq!(snapshot_events, 1);
        assert_eq!(export_events, 1);
        assert_eq!(model.snapshots.get(), 2);
        assert_eq!(model.exports.get(), 2);
    }

    #[test]
    fn test_warmup_tracks_record_without_backups() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 10, true);
        let model = FakeModel::default();
        let mut progress = ctl.start();

        for v in 1..20 {
            assert_eq!(progress.phase(), CheckpointPhase::Warmup);
            ctl.on_step(&mut progress, v, &model).unwrap();
        }
        assert_eq!(progress.steps, 19);
        assert!(progress.record().value > 0);
        assert!(progress.record().backup.is_none());
        assert!(backups(dir.path()).is_empty());

        ctl.on_step(&mut progress, 100, &model).unwrap();
        assert_eq!(progress.phase(), CheckpointPhase::Tracking);
    }

    #[test]
    fn test_improvement_replaces_previous_backup() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 100, true);
        let model = FakeModel::default();
        let mut progress = ctl.start();

        for _ in 0..200 {
            ctl.on_step(&mut progress, 5, &model).unwrap();
        }
        assert_eq!(progress.phase(), CheckpointPhase::Tracking);
        assert_eq!(progress.record().value, 5);
        assert!(backups(dir.path()).is_empty());

        ctl.apply_average(&mut progress, 6, &model).unwrap();
        assert_eq!(backups(dir.path()), vec!["cnn_model_6.bin"]);

        for _ in 0..10 {
            ctl.apply_average(&mut progress, 5, &model).unwrap();
        }
        let events = ctl.apply_average(&mut progress, 9, &model).unwrap();
        assert!(events.contains(&CheckpointEvent::BackupRemoved(dir.path().join("cnn_model_6.bin"))));
        assert_eq!(backups(dir.path()), vec!["cnn_model_9.bin"]);
        assert_eq!(progress.record().value, 9);
    }

    #[test]
    fn test_backup_left_by_earlier_run_is_removed() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 100, true);
        let model = FakeModel::default();
        let mut progress = ctl.start();
        fs::write(dir.path().join("cnn_model_5.bin"), b"old").unwrap();

        for _ in 0..200 {
            ctl.on_step(&mut progress, 5, &model).unwrap();
        }
        let new_records = ctl
            .apply_average(&mut progress, 9, &model)
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e, CheckpointEvent::NewRecord { .. }))
            .count();
        assert_eq!(new_records, 1);
        assert_eq!(backups(dir.path()), vec!["cnn_model_9.bin"]);
    }

    #[test]
    fn test_retention_disabled_writes_no_backups() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 2, false);
        let model = FakeModel::default();
        let mut progress = ctl.start();

        for v in [1, 1, 1, 1, 50, 90] {
            ctl.on_step(&mut progress, v, &model).unwrap();
        }
        assert!(progress.record().value >= 50);
        assert!(backups(dir.path()).is_empty());
    }

    #[test]
    fn test_end_epoch_overwrites_both_files() {
        let dir   = tempfile::tempdir().unwrap();
        let ctl   = controller(dir.path(), 100, true);
        let model = FakeModel::default();
        let mut progress = ctl.start();
        ctl.on_step(&mut progress, 1, &model).unwrap();

        assert_eq!(ctl.end_epoch(&model).unwrap(), CheckpointEvent::EpochSaved);
        assert_eq!(model.snapshots.get(), 2);
        assert_eq!(model.exports.get(), 2);
    }

    #[test]
    fn test_failed_write_keeps_previous_snapshot() {
        struct Broken;
        impl ModelArtifacts for Broken {
            fn save_snapshot(&self, path: &Path) -> PipelineResult<()> {
                fs::write(path, b"half").unwrap();
                Err(PipelineError::artifact(path, "disk full"))
            }
            fn export(&self, path: &Path) -> PipelineResult<()> {
                Err(PipelineError::artifact(path, "disk full"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let ctl = controller(dir.path(), 100, true);
        fs::write(&ctl.paths().snapshot, b"good").unwrap();

        assert!(ctl.end_epoch(&Broken).is_err());
        assert_eq!(fs::read(&ctl.paths().snapshot).unwrap(), b"good");
        assert!(!dir.path().join("cnn_model.partial.bin").exists());
    }

    #[test]
    fn test_save_config_writes_pretty_json() {
        let dir  = tempfile::tempdir().unwrap();
        let path = save_config(dir.path(), &serde_json::json!({ "batch_size": 4 })).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("\"batch_size\": 4"));
    }
}
