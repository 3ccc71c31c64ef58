// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model math lives here. The data layer only produces
// burn tensors through its batcher; nothing else touches
// burn types.
//
//   model.rs     — The CNN classifier
//                  Two conv blocks (5x5 conv, batch norm,
//                  ReLU, 2x2 max pool), then three linear
//                  layers with dropout between them
//
//   precision.rs — Full vs half precision, resolved once
//                  at startup from config + cargo feature
//
//   trainer.rs   — Learner (forward, loss, backward, step),
//                  snapshot / export writers, and the epoch
//                  loop driving the checkpoint controller
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// CNN drawing classifier architecture
pub mod model;

/// Precision capability and backend aliases
pub mod precision;

/// Training loop with rolling-record checkpointing
pub mod trainer;
