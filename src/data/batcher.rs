// ============================================================
// Layer 4 — Drawing Batcher
// ============================================================
// Converts a flat SampleBatch (plain Vec<f32> / Vec<usize>)
// into device tensors for the forward pass.
//
// How batching works here:
//   Input:  N bitmaps of H x W, flattened sample-major
//   Output: images [N, 1, H, W] float, labels [N] int
//
// The prefetch thread only ever builds SampleBatch values;
// tensors are created on the training thread, on the device
// the model lives on.
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::domain::sample::SampleBatch;

/// A batch of drawings ready for the model.
#[derive(Debug, Clone)]
pub struct DrawingBatch<B: Backend> {
    /// Binarised bitmaps — shape: [batch_size, 1, height, width]
    pub images: Tensor<B, 4>,

    /// Label ids — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

/// Holds the target device so tensors are created on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct DrawingBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DrawingBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, batch: &SampleBatch) -> DrawingBatch<B> {
        let n = batch.len();

        let images = Tensor::<B, 1>::from_floats(batch.images.as_slice(), &self.device)
            .reshape([n, 1, batch.height, batch.width]);

        let labels: Vec<i32> = batch.labels.iter().map(|&l| l as i32).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        DrawingBatch { images, labels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batch_shapes() {
        let batch = SampleBatch {
            images: vec![0.0; 3 * 8 * 8],
            labels: vec![0, 1, 2],
            height: 8,
            width:  8,
        };
        let batcher = DrawingBatcher::<TestBackend>::new(Default::default());
        let out = batcher.batch(&batch);
        assert_eq!(out.images.dims(), [3, 1, 8, 8]);
        assert_eq!(out.labels.dims(), [3]);
    }
}
