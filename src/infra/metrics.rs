// ============================================================
// Layer 6 — Training Metrics
// ============================================================
// Two kinds of metrics live here:
//
//   RollingMetric — ring buffer of the last `window` per-batch
//                   correct-prediction counts. Drives the
//                   checkpoint controller; never persisted.
//
//   MetricsLogger — appends one CSV row per finished epoch.
//
// Output file: <output dir>/metrics.csv
//
// Example CSV output:
//   epoch,batches,mean_loss,accuracy,record
//   1,412,2.318842,0.401233,402
//   2,412,1.904411,0.512870,518
//
// Reference: Rust Book §8 (Common Collections)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    collections::VecDeque,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

// ─── RollingMetric ────────────────────────────────────────────────────────────
/// Moving average over the most recent `capacity` step values.
#[derive(Debug, Clone)]
pub struct RollingMetric {
    capacity: usize,
    values:   VecDeque<usize>,
    sum:      usize,
}

impl RollingMetric {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, values: VecDeque::with_capacity(capacity), sum: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push one value, evicting the oldest once the window is full.
    pub fn push(&mut self, value: usize) {
        if self.values.len() == self.capacity {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    /// Mean of the values currently in the window (0.0 when empty).
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum as f64 / self.values.len() as f64
    }

    /// Integer rolling average, as embedded in backup file names.
    pub fn rolling_average(&self) -> usize {
        self.mean().floor() as usize
    }
}

// ─── EpochMetrics ─────────────────────────────────────────────────────────────
/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Training steps completed in this epoch
    pub batches: usize,

    /// Average cross-entropy loss over the epoch's batches
    pub mean_loss: f64,

    /// Fraction of samples predicted correctly, padding included
    pub accuracy: f64,

    /// Best rolling average seen so far
    pub record: usize,
}

/// Accumulates per-step results into an [`EpochMetrics`] row.
#[derive(Debug, Default)]
pub struct EpochAccumulator {
    batches:  usize,
    samples:  usize,
    correct:  usize,
    loss_sum: f64,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, batch_size: usize, correct: usize, loss: f64) {
        self.batches  += 1;
        self.samples  += batch_size;
        self.correct  += correct;
        self.loss_sum += loss;
    }

    pub fn finish(&self, epoch: usize, record: usize) -> EpochMetrics {
        let mean_loss = if self.batches == 0 { 0.0 } else { self.loss_sum / self.batches as f64 };
        let accuracy  = if self.samples == 0 { 0.0 } else { self.correct as f64 / self.samples as f64 };
        EpochMetrics { epoch, batches: self.batches, mean_loss, accuracy, record }
    }
}

// ─── MetricsLogger ────────────────────────────────────────────────────────────
/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// several runs append to the same log.
    pub fn new(csv_path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.into();
        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,batches,mean_loss,accuracy,record")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{}",
            m.epoch, m.batches, m.mean_loss, m.accuracy, m.record,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: loss={:.4}, accuracy={:.4}",
            m.epoch,
            m.mean_loss,
            m.accuracy,
        );
        Ok(())
    }
}
