//! Width-multiplied classification topologies.
//!
//! Every topology takes a 224x224 RGB image, scales its channel counts by a
//! depth scale and ends in a 1000-way softmax. All weights are dummy.

mod googlenet;
mod resnet50;
mod vgg16;

pub use googlenet::GoogLeNet;
pub use resnet50::ResNet50;
pub use vgg16::Vgg16;

use crate::errors::GraphError;
use crate::example::Topology;
use crate::graph::{
    CaffePreprocessor, InputAccessor, ModelGraph, OutputAccessor, Stream, TensorDescriptor,
};

/// Number of classes every topology predicts.
pub const NUM_CLASSES: usize = 1000;

/// Scales a channel count, truncating, and never returns zero.
pub fn scaled(channels: usize, depth_scale: f32) -> usize {
    ((channels as f32 * depth_scale) as usize).max(1)
}

/// Builds a topology into a graph with a synthetic image input.
pub fn build_graph<T: Topology + ?Sized>(
    topology: &T,
    descriptor: TensorDescriptor,
    depth_scale: f32,
    output: OutputAccessor,
) -> Result<ModelGraph, GraphError> {
    let preprocessor = CaffePreprocessor::new(topology.mean_rgb()).with_bgr(topology.bgr());

    let mut stream = Stream::new(topology.name());
    stream.input(descriptor, InputAccessor::synthetic_image(preprocessor));
    topology.build(&mut stream, depth_scale);
    stream.output(output);

    stream.into_graph()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_truncates() {
        assert_eq!(scaled(64, 0.25), 16);
        assert_eq!(scaled(96, 0.125), 12);
        assert_eq!(scaled(24, 0.125), 3);
        assert_eq!(scaled(4096, 0.125), 512);
        assert_eq!(scaled(64, 1.0), 64);
    }

    #[test]
    fn test_scaled_never_zero() {
        assert_eq!(scaled(16, 0.01), 1);
        assert_eq!(scaled(3, 0.1), 1);
    }
}
