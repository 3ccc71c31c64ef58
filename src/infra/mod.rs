// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that writes files the next run (or the inference
// side) depends on:
//
//   index_cache.rs — Corpus index persistence
//                    bincode payload behind a magic + version
//                    header, fingerprinted against the live
//                    corpus, replaced atomically.
//
//   labels_file.rs — labels.txt, written once, never rewritten.
//
//   checkpoint.rs  — Checkpoint controller
//                    Rolling-record backups, regeneration of
//                    missing snapshot / export files, epoch-end
//                    saves. Also saves train_config.json.
//
//   metrics.rs     — Rolling metric + per-epoch CSV logger.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling)
//            Burn Book §5 (Checkpointing)

/// Corpus index cache
pub mod index_cache;

/// Label list file
pub mod labels_file;

/// Checkpoint controller and config persistence
pub mod checkpoint;

/// Rolling metric and training metrics CSV logger
pub mod metrics;
