use crate::example::Topology;
use crate::graph::{
    Operation, PadStrideInfo, PoolingInfo, PoolingType, Stream, WeightsAccessor,
};
use crate::layers::Activation;

use super::{NUM_CLASSES, scaled};

/// Convolution blocks as (filters, convolutions).
const BLOCKS: [(usize, usize); 5] = [(64, 2), (128, 2), (256, 3), (512, 3), (512, 3)];

/// VGG16: thirteen 3x3 convolutions in five pooled blocks, then three
/// fully connected layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vgg16;

impl Topology for Vgg16 {
    fn name(&self) -> &'static str {
        "VGG16"
    }

    fn default_depth_scale(&self) -> f32 {
        0.125
    }

    fn mean_rgb(&self) -> [f32; 3] {
        [123.68, 116.779, 103.939]
    }

    fn build(&self, stream: &mut Stream, depth_scale: f32) {
        let relu = || Operation::activation(Activation::Relu);

        for (block, (filters, convolutions)) in BLOCKS.iter().enumerate() {
            let block = block + 1;
            for i in 1..=*convolutions {
                let name = format!("conv{}_{}", block, i);
                stream
                    .add(
                        Operation::convolution(
                            3,
                            3,
                            scaled(*filters, depth_scale),
                            WeightsAccessor::Dummy,
                            WeightsAccessor::Dummy,
                            PadStrideInfo::new(1, 1, 1, 1),
                        )
                        .named(name.clone()),
                    )
                    .add(relu().named(format!("{}/Relu", name)));
            }
            stream.add(
                Operation::pooling(PoolingInfo::new(
                    PoolingType::Max,
                    2,
                    PadStrideInfo::new(2, 2, 0, 0),
                ))
                .named(format!("pool{}", block)),
            );
        }

        let fc = |outputs| {
            Operation::fully_connected(outputs, WeightsAccessor::Dummy, WeightsAccessor::Dummy)
        };
        stream
            .add(fc(scaled(4096, depth_scale)).named("fc6"))
            .add(relu().named("Relu"))
            .add(fc(scaled(4096, depth_scale)).named("fc7"))
            .add(relu().named("Relu_1"))
            .add(fc(NUM_CLASSES).named("fc8"))
            .add(Operation::softmax().named("prob"));
    }
}
