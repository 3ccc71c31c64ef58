// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw .ndjson files to tensor batches.
//
//   .ndjson files
//       │
//       ▼
//   CorpusIndexer     → one scan: (file, byte offset) per record
//       │                + frozen label vocabulary
//       ▼
//   CorpusDataset     → logical index → record or padding slot
//       │
//       ▼
//   Materializer      → reseek + parse + rasterise + binarise
//       │
//       ▼
//   BatchSource       → shuffled fixed-size batches, prefetched
//       │
//       ▼
//   DrawingBatcher    → burn tensors for the training step
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Builds the byte-offset index over the corpus directory
pub mod indexer;

/// Re-reads one record and turns it into a binary bitmap
pub mod rasterizer;

/// SampleSource over a CorpusIndex, padding included
pub mod dataset;

/// Shuffled, prefetched, fixed-size batches
pub mod batch_source;

/// SampleBatch → burn tensors
pub mod batcher;
