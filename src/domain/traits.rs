// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams between the data pipeline, the model and
// the checkpoint controller:
//
//   SampleSource   — random access to a fixed number of
//                    samples. CorpusDataset implements it;
//                    the batch source only sees the trait.
//
//   ModelArtifacts — whatever can write a full snapshot of
//                    its parameters and an export artifact.
//                    The burn learner implements it; the
//                    checkpoint controller only sees the trait.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use crate::domain::sample::Sample;
use crate::error::PipelineResult;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Random-access, read-only sample provider.
///
/// `get` must be safe to call concurrently from several worker
/// threads, hence the `Send + Sync` bound.
pub trait SampleSource: Send + Sync {
    /// Total number of logical samples, padding included.
    fn len(&self) -> usize;

    /// Materialise sample `index` (`index < len()`).
    fn get(&self, index: usize) -> PipelineResult<Sample>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── ModelArtifacts ───────────────────────────────────────────────────────────
/// Anything whose current parameter state can be written to disk.
pub trait ModelArtifacts {
    /// Write a full parameter snapshot to `path`, replacing any file there.
    fn save_snapshot(&self, path: &Path) -> PipelineResult<()>;

    /// Write the portable export artifact to `path`, generated by
    /// tracing a fixed-shape dummy single-sample input.
    fn export(&self, path: &Path) -> PipelineResult<()>;
}
