//! Normalization layers: cross-map local response normalization and
//! inference-mode batch normalization.

use burn::{
    nn::{BatchNorm, BatchNormConfig},
    tensor::{Tensor, backend::Backend, module::avg_pool2d},
};

use crate::graph::{BatchNormAccessors, NormalizationInfo};

/// Cross-map local response normalization.
///
/// Computes `x / (kappa + coeff * sum(x^2))^beta` where the sum runs over
/// `norm_size` neighbouring channels, zero padded at the edges.
#[derive(Debug, Clone, Copy)]
pub struct LocalResponseNorm {
    info: NormalizationInfo,
}

impl LocalResponseNorm {
    pub fn new(info: NormalizationInfo) -> Self {
        Self { info }
    }

    /// Performs the forward pass.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = input.dims();
        let size = self.info.norm_size;

        // channels become the pooled row axis, spatial positions the columns
        let squares = input
            .clone()
            .powf_scalar(2.0)
            .reshape([batch, 1, channels, height * width]);
        let window_mean = avg_pool2d(squares, [size, 1], [1, 1], [size / 2, 0], true);
        let window_sum = window_mean
            .reshape([batch, channels, height, width])
            .mul_scalar(size as f32);

        let denominator = window_sum
            .mul_scalar(self.info.scale_coeff())
            .add_scalar(self.info.kappa)
            .powf_scalar(self.info.beta);
        input.div(denominator)
    }
}

/// Batch normalization with frozen statistics, folded into a per-channel
/// scale and shift.
#[derive(Debug)]
pub struct BatchNormLayer<B: Backend> {
    scale: Tensor<B, 4>,
    shift: Tensor<B, 4>,
    num_features: usize,
    epsilon: f32,
}

impl<B: Backend> BatchNormLayer<B> {
    pub fn new(
        num_features: usize,
        epsilon: f32,
        accessors: BatchNormAccessors,
        device: &B::Device,
    ) -> Self {
        let batch_norm: BatchNorm<B, 2> = BatchNormConfig::new(num_features)
            .with_epsilon(epsilon as f64)
            .init(device);

        let gamma = accessors.gamma.fill(batch_norm.gamma.val());
        let beta = accessors.beta.fill(batch_norm.beta.val());
        let mean = accessors.mean.fill(batch_norm.running_mean.value());
        let var = accessors.var.fill(batch_norm.running_var.value());

        // scale = gamma / sqrt(var + eps), shift = beta - mean * scale
        let scale = gamma.div(var.add_scalar(epsilon).sqrt());
        let shift = beta.sub(mean.mul(scale.clone()));

        Self {
            scale: scale.reshape([1, num_features, 1, 1]),
            shift: shift.reshape([1, num_features, 1, 1]),
            num_features,
            epsilon,
        }
    }

    /// Performs the forward pass.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        input.mul(self.scale.clone()).add(self.shift.clone())
    }

    /// Returns the number of normalized channels.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Returns the folded per-channel scale and shift.
    pub fn normalization_params(&self) -> (Tensor<B, 4>, Tensor<B, 4>) {
        (self.scale.clone(), self.shift.clone())
    }
}
