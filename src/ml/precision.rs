// ============================================================
// Layer 5 — Precision Capability
// ============================================================
// Half-precision training is a build-time capability: the
// `mixed-precision` cargo feature compiles the f16 backend in.
// The run asks for it through TrainConfig; `resolve` decides
// once at startup and everything downstream only sees the
// resulting `Precision`.
//
// When half precision is active:
//   batch size  × 1.6, rounded to a multiple of 8
//   vocabulary  padded to a multiple of 8 labels
//
// Both paths run the same generic training loop; only the
// backend type parameter differs.

use burn::backend::{Autodiff, Wgpu};

/// Full-precision training backend.
pub type FullBackend = Autodiff<Wgpu>;

/// Half-precision training backend.
#[cfg(feature = "mixed-precision")]
pub type MixedBackend = Autodiff<Wgpu<burn::tensor::f16>>;

/// Without the feature, `Precision::Mixed` is never resolved;
/// the alias only keeps the dispatch in `run_training` total.
#[cfg(not(feature = "mixed-precision"))]
pub type MixedBackend = FullBackend;

/// Tensor dimensions half-precision kernels want to be divisible by.
pub const MIXED_ALIGNMENT: usize = 8;
/// Batch size growth allowed by the smaller activations.
pub const MIXED_BATCH_SCALE: f64 = 1.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Full,
    Mixed,
}

impl Precision {
    /// Mixed only if requested AND compiled in.
    pub fn resolve(requested: bool) -> Self {
        Self::resolve_with(requested, cfg!(feature = "mixed-precision"))
    }

    fn resolve_with(requested: bool, available: bool) -> Self {
        match (requested, available) {
            (true, true) => {
                tracing::info!("Using mixed precision.");
                Self::Mixed
            }
            (true, false) => {
                tracing::warn!(
                    "Mixed precision requested but this build lacks the `mixed-precision` feature; using full precision"
                );
                Self::Full
            }
            (false, _) => Self::Full,
        }
    }

    /// Effective batch size for this precision.
    pub fn batch_size(self, configured: usize) -> usize {
        match self {
            Self::Full  => configured,
            Self::Mixed => {
                let scaled = configured as f64 * MIXED_BATCH_SCALE / MIXED_ALIGNMENT as f64;
                (scaled.round() as usize).max(1) * MIXED_ALIGNMENT
            }
        }
    }

    /// Multiple the label vocabulary is padded to, if any.
    pub fn label_multiple(self) -> Option<usize> {
        match self {
            Self::Full  => None,
            Self::Mixed => Some(MIXED_ALIGNMENT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_needs_request_and_capability() {
        assert_eq!(Precision::resolve_with(true, true), Precision::Mixed);
        assert_eq!(Precision::resolve_with(true, false), Precision::Full);
        assert_eq!(Precision::resolve_with(false, true), Precision::Full);
        assert_eq!(Precision::resolve(false), Precision::Full);
    }

    #[test]
    fn test_mixed_batch_size_is_scaled_multiple_of_eight() {
        assert_eq!(Precision::Full.batch_size(1000), 1000);
        assert_eq!(Precision::Mixed.batch_size(1000), 1600);
        assert_eq!(Precision::Mixed.batch_size(100) % 8, 0);
        assert_eq!(Precision::Mixed.batch_size(1), 8);
    }

    #[test]
    fn test_label_multiple() {
        assert_eq!(Precision::Full.label_multiple(), None);
        assert_eq!(Precision::Mixed.label_multiple(), Some(8));
    }
}
