// ============================================================
// Layer 4 — Batch Source
// ============================================================
// Shuffled, fixed-size batches over a SampleSource.
//
// Each call to `epoch()` draws a fresh permutation of ALL
// logical indices (padding slots included) and starts a
// background producer thread that:
//
//   for each chunk of `batch_size` indices:
//       materialise the samples in parallel on a bounded
//       rayon pool → stack them into a SampleBatch →
//       push into a sync_channel of depth `prefetch_depth`
//
// The bounded channel is the backpressure: the producer can
// run at most `prefetch_depth` batches ahead of the training
// step. Dropping the iterator disconnects the channel and
// joins the producer.
//
// Reference: rand crate docs (SliceRandom::shuffle)
//            rayon docs (ThreadPool::install)
//            Rust Book §16 (Fearless Concurrency)

use std::{
    sync::{
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
};

use rand::{seq::SliceRandom, Rng};
use rayon::prelude::*;

use crate::domain::{
    sample::{Sample, SampleBatch},
    traits::SampleSource,
};
use crate::error::{PipelineError, PipelineResult};

pub struct BatchSource<S: SampleSource + 'static> {
    source:         Arc<S>,
    batch_size:     usize,
    prefetch_depth: usize,
    pool:           Arc<rayon::ThreadPool>,
}

impl<S: SampleSource + 'static> BatchSource<S> {
    /// `source.len()` must be a positive multiple of `batch_size`
    /// or a non-empty source would yield a short final batch.
    pub fn new(
        source:         Arc<S>,
        batch_size:     usize,
        num_workers:    usize,
        prefetch_depth: usize,
    ) -> PipelineResult<Self> {
        if batch_size == 0 {
            return Err(PipelineError::invalid_config("batch size must be positive"));
        }
        if source.is_empty() {
            return Err(PipelineError::invalid_config("dataset has no samples"));
        }
        if source.len() % batch_size != 0 {
            return Err(PipelineError::invalid_config(format!(
                "dataset length {} is not a multiple of batch size {}",
                source.len(),
                batch_size
            )));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .thread_name(|i| format!("materialize-{i}"))
            .build()
            .map_err(|e| PipelineError::invalid_config(format!("cannot build worker pool: {e}")))?;

        Ok(Self {
            source,
            batch_size,
            prefetch_depth: prefetch_depth.max(1),
            pool: Arc::new(pool),
        })
    }

    /// Total logical samples, padding included.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batches_per_epoch(&self) -> usize {
        self.len() / self.batch_size
    }

    /// A uniform random permutation of `0..len()`.
    pub fn shuffled_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        order
    }

    /// Start one epoch. Batches are produced in the background.
    pub fn epoch<R: Rng + ?Sized>(&self, rng: &mut R) -> PipelineResult<EpochBatches> {
        let order      = self.shuffled_order(rng);
        let batches    = self.batches_per_epoch();
        let batch_size = self.batch_size;
        let source     = Arc::clone(&self.source);
        let pool       = Arc::clone(&self.pool);

        let (sender, receiver) = mpsc::sync_channel(self.prefetch_depth);

        let handle = thread::Builder::new()
            .name("batch-prefetch".into())
            .spawn(move || {
                for chunk in order.chunks(batch_size) {
                    let result = pool
                        .install(|| {
                            chunk
                                .par_iter()
                                .map(|&i| source.get(i))
                                .collect::<PipelineResult<Vec<Sample>>>()
                        })
                        .and_then(|samples| {
                            SampleBatch::from_samples(samples).ok_or_else(|| {
                                PipelineError::invalid_config("samples in one batch differ in shape")
                            })
                        });

                    let failed = result.is_err();
                    if sender.send(result).is_err() || failed {
                        return;
                    }
                }
            })
            .map_err(|e| PipelineError::invalid_config(format!("cannot spawn prefetch thread: {e}")))?;

        Ok(EpochBatches {
            receiver:  Some(receiver),
            handle:    Some(handle),
            remaining: batches,
        })
    }
}

// ─── EpochBatches ─────────────────────────────────────────────────────────────
/// Iterator over one epoch's batches. Stops after the first error.
pub struct EpochBatches {
    receiver:  Option<Receiver<PipelineResult<SampleBatch>>>,
    handle:    Option<JoinHandle<()>>,
    remaining: usize,
}

impl Iterator for EpochBatches {
    type Item = PipelineResult<SampleBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let receiver = self.receiver.as_ref()?;
        match receiver.recv() {
            Ok(Ok(batch)) => {
                self.remaining -= 1;
                Some(Ok(batch))
            }
            Ok(Err(err)) => {
                self.remaining = 0;
                Some(Err(err))
            }
            Err(_) => {
                self.remaining = 0;
                Some(Err(PipelineError::PrefetchStopped))
            }
        }
    }

    /// An error ends the epoch early, so only the upper bound is exact.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl Drop for EpochBatches {
    fn drop(&mut self) {
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("batch prefetch thread panicked");
            }
        }
    }
}
