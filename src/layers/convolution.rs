//! 2D convolution layer backed by burn's `Conv2d`.

use burn::{
    module::Module,
    nn::{
        PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    tensor::{Tensor, backend::Backend},
};

use crate::graph::{DimensionRoundingType, PadStrideInfo, WeightsAccessor};

/// Configuration for a Convolution layer.
#[derive(Debug, Clone)]
pub struct ConvolutionConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output channels.
    pub filters: usize,
    pub kernel_width: usize,
    pub kernel_height: usize,
    pub pad_stride: PadStrideInfo,
    pub weights: WeightsAccessor,
    /// `WeightsAccessor::None` builds the layer without bias.
    pub bias: WeightsAccessor,
}

impl ConvolutionConfig {
    /// Creates a stride-1, unpadded convolution with dummy weights and bias.
    pub fn new(in_channels: usize, filters: usize, kernel_width: usize, kernel_height: usize) -> Self {
        Self {
            in_channels,
            filters,
            kernel_width,
            kernel_height,
            pad_stride: PadStrideInfo::new(1, 1, 0, 0),
            weights: WeightsAccessor::Dummy,
            bias: WeightsAccessor::Dummy,
        }
    }

    /// Sets strides and padding.
    pub fn with_pad_stride(mut self, pad_stride: PadStrideInfo) -> Self {
        self.pad_stride = pad_stride;
        self
    }

    /// Sets the weight and bias accessors.
    pub fn with_accessors(mut self, weights: WeightsAccessor, bias: WeightsAccessor) -> Self {
        self.weights = weights;
        self.bias = bias;
        self
    }

    /// Initializes the Convolution layer with the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Convolution<B> {
        let ps = self.pad_stride;
        let ceil_rounding = ps.rounding == DimensionRoundingType::Ceil;
        // burn pads symmetrically with floor rounding; anything else is
        // padded before the call
        let (padding, pre_pad) = if ps.is_symmetric() && !ceil_rounding {
            (PaddingConfig2d::Explicit(ps.pad_top, ps.pad_left), [0; 4])
        } else {
            (
                PaddingConfig2d::Valid,
                [ps.pad_left, ps.pad_right, ps.pad_top, ps.pad_bottom],
            )
        };

        let mut config = Conv2dConfig::new(
            [self.in_channels, self.filters],
            [self.kernel_height, self.kernel_width],
        )
        .with_stride([ps.stride_y, ps.stride_x])
        .with_padding(padding)
        .with_bias(self.bias.is_present());
        if let Some(initializer) = self.weights.initializer() {
            config = config.with_initializer(initializer);
        }

        Convolution {
            conv: config.init(device),
            in_channels: self.in_channels,
            filters: self.filters,
            kernel_width: self.kernel_width,
            kernel_height: self.kernel_height,
            stride_x: ps.stride_x,
            stride_y: ps.stride_y,
            pad_left: pre_pad[0],
            pad_right: pre_pad[1],
            pad_top: pre_pad[2],
            pad_bottom: pre_pad[3],
            ceil_rounding,
        }
    }
}

/// A 2D convolution over NCHW tensors.
#[derive(Module, Debug)]
pub struct Convolution<B: Backend> {
    conv: Conv2d<B>,
    in_channels: usize,
    filters: usize,
    kernel_width: usize,
    kernel_height: usize,
    stride_x: usize,
    stride_y: usize,
    pad_left: usize,
    pad_right: usize,
    pad_top: usize,
    pad_bottom: usize,
    /// Extends the right and bottom edges so the last partial window runs.
    ceil_rounding: bool,
}

impl<B: Backend> Convolution<B> {
    /// Performs the forward pass.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let (extra_w, extra_h) = self.ceil_padding(width, height);
        let pads = (
            self.pad_left,
            self.pad_right + extra_w,
            self.pad_top,
            self.pad_bottom + extra_h,
        );
        let input = if pads == (0, 0, 0, 0) {
            input
        } else {
            input.pad(pads, 0.0)
        };
        self.conv.forward(input)
    }

    fn ceil_padding(&self, width: usize, height: usize) -> (usize, usize) {
        if !self.ceil_rounding {
            return (0, 0);
        }
        PadStrideInfo::asymmetric(
            self.stride_x,
            self.stride_y,
            self.pad_left,
            self.pad_right,
            self.pad_top,
            self.pad_bottom,
            DimensionRoundingType::Ceil,
        )
        .ceil_padding(width, height, self.kernel_width, self.kernel_height)
    }

    /// Returns the number of input channels.
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Returns the number of output channels.
    pub fn filters(&self) -> usize {
        self.filters
    }

    /// Returns true if the layer adds a bias.
    pub fn has_bias(&self) -> bool {
        self.conv.bias.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_convolution_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let conv: Convolution<TestBackend> = ConvolutionConfig::new(3, 8, 7, 7)
            .with_pad_stride(PadStrideInfo::new(2, 2, 3, 3))
            .init(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        assert_eq!(conv.forward(input).dims(), [1, 8, 16, 16]);
    }

    #[test]
    fn test_asymmetric_padding_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let ps = PadStrideInfo::asymmetric(1, 1, 0, 1, 0, 1, DimensionRoundingType::Floor);
        let conv: Convolution<TestBackend> = ConvolutionConfig::new(2, 4, 2, 2)
            .with_pad_stride(ps)
            .init(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 2, 5, 5], &device);
        assert_eq!(conv.forward(input).dims(), [1, 4, 5, 5]);
    }

    #[test]
    fn test_dummy_weights_produce_zeros() {
        let device = <TestBackend as Backend>::Device::default();
        let conv: Convolution<TestBackend> = ConvolutionConfig::new(3, 4, 3, 3)
            .with_pad_stride(PadStrideInfo::new(1, 1, 1, 1))
            .init(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 6, 6], &device);
        let sum: f32 = conv.forward(input).abs().sum().into_scalar();
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn test_convolution_without_bias() {
        let device = <TestBackend as Backend>::Device::default();
        let conv: Convolution<TestBackend> = ConvolutionConfig::new(3, 4, 1, 1)
            .with_accessors(WeightsAccessor::Random, WeightsAccessor::None)
            .init(&device);

        assert!(!conv.has_bias());
        assert_eq!(conv.in_channels(), 3);
        assert_eq!(conv.filters(), 4);
    }

    #[test]
    fn test_ceil_rounding_runs_the_partial_window() {
        let device = <TestBackend as Backend>::Device::default();
        let ps = PadStrideInfo::new(2, 2, 0, 0).with_rounding(DimensionRoundingType::Ceil);
        let (width, height) = ps.scaled_dimensions(5, 5, 2, 2).unwrap();
        let conv: Convolution<TestBackend> = ConvolutionConfig::new(1, 1, 2, 2)
            .with_pad_stride(ps)
            .init(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 1, 5, 5], &device);
        assert_eq!((width, height), (3, 3));
        assert_eq!(conv.forward(input).dims(), [1, 1, height, width]);
    }

    #[test]
    fn test_ceil_rounding_with_symmetric_padding() {
        let device = <TestBackend as Backend>::Device::default();
        let ps = PadStrideInfo::new(2, 2, 1, 1).with_rounding(DimensionRoundingType::Ceil);
        let (width, height) = ps.scaled_dimensions(6, 6, 3, 3).unwrap();
        let conv: Convolution<TestBackend> = ConvolutionConfig::new(2, 3, 3, 3)
            .with_pad_stride(ps)
            .init(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 2, 6, 6], &device);
        assert_eq!(conv.forward(input).dims(), [1, 3, height, width]);
    }
}
