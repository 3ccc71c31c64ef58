use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Side length of the square input bitmap
    pub input_size:  usize,
    pub num_classes: usize,
    #[config(default = 0.25)]
    pub dropout:     f64,
}

impl ClassifierConfig {
    /// Width of the flattened feature vector after two 2x2 pools.
    pub fn feature_dim(&self) -> usize {
        let side = self.input_size / 4;
        64 * side * side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DrawingClassifier<B> {
        let dim = self.feature_dim();
        DrawingClassifier {
            block1:      self.conv_block(1, 32, device),
            block2:      self.conv_block(32, 64, device),
            fc1:         LinearConfig::new(dim, dim / 4).init(device),
            fc2:         LinearConfig::new(dim / 4, dim / 8).init(device),
            fc3:         LinearConfig::new(dim / 8, self.num_classes).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
            input_size:  self.input_size,
            num_classes: self.num_classes,
        }
    }

    fn conv_block<B: Backend>(&self, channels_in: usize, channels_out: usize, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            conv: Conv2dConfig::new([channels_in, channels_out], [5, 5])
                .with_padding(PaddingConfig2d::Explicit(2, 2))
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(channels_out).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

/// conv 5x5 → batch norm → relu → 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.pool.forward(self.relu.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct DrawingClassifier<B: Backend> {
    pub block1:      ConvBlock<B>,
    pub block2:      ConvBlock<B>,
    pub fc1:         Linear<B>,
    pub fc2:         Linear<B>,
    pub fc3:         Linear<B>,
    pub dropout:     Dropout,
    pub input_size:  usize,
    pub num_classes: usize,
}

impl<B: Backend> DrawingClassifier<B> {
    /// images: [batch, 1, input_size, input_size] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.dropout.forward(self.fc1.forward(x));
        let x = self.dropout.forward(self.fc2.forward(x));
        self.fc3.forward(x)
    }

    pub fn forward_loss(
        &self,
        images: Tensor<B, 4>,
        labels: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>)
    where
        B: AutodiffBackend,
    {
        let logits = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), labels);
        (loss, logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_feature_dim_matches_flattened_conv_output() {
        let cfg = ClassifierConfig::new(64, 345);
        assert_eq!(cfg.feature_dim(), 64 * 16 * 16);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model  = ClassifierConfig::new(16, 5).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 16, 16], &device);
        assert_eq!(model.forward(images).dims(), [3, 5]);
    }
}
