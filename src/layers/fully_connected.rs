//! Fully connected layer implementation.

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{Tensor, backend::Backend},
};

use crate::graph::WeightsAccessor;

/// Configuration for a FullyConnected layer.
#[derive(Debug, Clone)]
pub struct FullyConnectedConfig {
    /// Number of input features (`c * h * w` of the incoming tensor).
    pub input_size: usize,
    /// Number of output features.
    pub output_size: usize,
    pub weights: WeightsAccessor,
    pub bias: WeightsAccessor,
}

impl FullyConnectedConfig {
    /// Creates a new FullyConnectedConfig with dummy weights and bias.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            output_size,
            weights: WeightsAccessor::Dummy,
            bias: WeightsAccessor::Dummy,
        }
    }

    /// Sets the weight and bias accessors.
    pub fn with_accessors(mut self, weights: WeightsAccessor, bias: WeightsAccessor) -> Self {
        self.weights = weights;
        self.bias = bias;
        self
    }

    /// Initializes the FullyConnected layer with the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FullyConnected<B> {
        let mut config = LinearConfig::new(self.input_size, self.output_size)
            .with_bias(self.bias.is_present());
        if let Some(initializer) = self.weights.initializer() {
            config = config.with_initializer(initializer);
        }

        FullyConnected {
            linear: config.init(device),
            input_size: self.input_size,
            output_size: self.output_size,
        }
    }
}

/// A fully connected layer over flattened NCHW tensors.
///
/// Output is returned as `[n, outputs, 1, 1]` so it can keep flowing through
/// the 4D graph.
#[derive(Module, Debug)]
pub struct FullyConnected<B: Backend> {
    linear: Linear<B>,
    input_size: usize,
    output_size: usize,
}

impl<B: Backend> FullyConnected<B> {
    /// Performs the forward pass.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, _, _, _] = input.dims();
        let flat: Tensor<B, 2> = input.flatten(1, 3);
        self.linear
            .forward(flat)
            .reshape([batch, self.output_size, 1, 1])
    }

    /// Returns the input size of this layer.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Returns the output size of this layer.
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}
