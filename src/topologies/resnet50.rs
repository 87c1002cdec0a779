use crate::example::Topology;
use crate::graph::{
    BatchNormAccessors, BranchMergeMethod, DimensionRoundingType, Operation, PadStrideInfo,
    PoolingInfo, PoolingType, Stream, WeightsAccessor,
};
use crate::layers::Activation;

use super::{NUM_CLASSES, scaled};

const BATCH_NORM_EPSILON: f32 = 0.000_010_009_999_641_6;

/// Residual blocks as (base depth, units, stride).
const BLOCKS: [(usize, usize, usize); 4] = [(64, 3, 2), (128, 4, 2), (256, 6, 2), (512, 3, 1)];

/// ResNet-50 v1 with bottleneck units.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResNet50;

impl Topology for ResNet50 {
    fn name(&self) -> &'static str {
        "ResNet50"
    }

    fn default_depth_scale(&self) -> f32 {
        1.0
    }

    fn mean_rgb(&self) -> [f32; 3] {
        [122.68, 116.67, 104.01]
    }

    fn bgr(&self) -> bool {
        false
    }

    fn build(&self, stream: &mut Stream, depth_scale: f32) {
        stream
            .add(
                Operation::convolution(
                    7,
                    7,
                    scaled(64, depth_scale),
                    WeightsAccessor::Dummy,
                    WeightsAccessor::None,
                    PadStrideInfo::new(2, 2, 3, 3),
                )
                .named("conv1/convolution"),
            )
            .add(batch_norm().named("conv1/BatchNorm"))
            .add(Operation::activation(Activation::Relu).named("conv1/Relu"))
            .add(
                Operation::pooling(PoolingInfo::new(
                    PoolingType::Max,
                    3,
                    PadStrideInfo::asymmetric(2, 2, 0, 1, 0, 1, DimensionRoundingType::Floor),
                ))
                .named("pool1/MaxPool"),
            );

        for (i, (base_depth, units, stride)) in BLOCKS.iter().enumerate() {
            let name = format!("block{}", i + 1);
            residual_block(
                stream,
                &name,
                scaled(*base_depth, depth_scale),
                *units,
                *stride,
            );
        }

        stream
            .add(Operation::pooling(PoolingInfo::global(PoolingType::Avg)).named("pool5"))
            .add(
                Operation::convolution(
                    1,
                    1,
                    NUM_CLASSES,
                    WeightsAccessor::Dummy,
                    WeightsAccessor::Dummy,
                    PadStrideInfo::new(1, 1, 0, 0),
                )
                .named("logits/convolution"),
            )
            .add(Operation::flatten().named("predictions/Reshape"))
            .add(Operation::softmax().named("predictions/Softmax"));
    }
}

fn batch_norm() -> Operation {
    Operation::batch_norm(BatchNormAccessors::default(), BATCH_NORM_EPSILON)
}

fn conv_bn(
    stream: &mut Stream,
    prefix: &str,
    kernel: usize,
    filters: usize,
    pad_stride: PadStrideInfo,
) {
    stream
        .add(
            Operation::convolution(
                kernel,
                kernel,
                filters,
                WeightsAccessor::Dummy,
                WeightsAccessor::None,
                pad_stride,
            )
            .named(format!("{}/convolution", prefix)),
        )
        .add(batch_norm().named(format!("{}/BatchNorm", prefix)));
}

/// Appends `units` bottleneck units; only the last one strides.
fn residual_block(stream: &mut Stream, name: &str, base_depth: usize, units: usize, stride: usize) {
    for i in 0..units {
        let unit = format!("{}/unit{}/bottleneck_v1", name, i + 1);
        let middle_stride = if i == units - 1 { stride } else { 1 };

        let mut right = stream.sub_stream();
        conv_bn(
            &mut right,
            &format!("{}/conv1", unit),
            1,
            base_depth,
            PadStrideInfo::new(1, 1, 0, 0),
        );
        right.add(Operation::activation(Activation::Relu).named(format!("{}/conv1/Relu", unit)));
        conv_bn(
            &mut right,
            &format!("{}/conv2", unit),
            3,
            base_depth,
            PadStrideInfo::new(middle_stride, middle_stride, 1, 1),
        );
        right.add(Operation::activation(Activation::Relu).named(format!("{}/conv2/Relu", unit)));
        conv_bn(
            &mut right,
            &format!("{}/conv3", unit),
            1,
            base_depth * 4,
            PadStrideInfo::new(1, 1, 0, 0),
        );

        let mut left = stream.sub_stream();
        if i == 0 {
            conv_bn(
                &mut left,
                &format!("{}/shortcut", unit),
                1,
                base_depth * 4,
                PadStrideInfo::new(1, 1, 0, 0),
            );
        } else if middle_stride > 1 {
            left.add(
                Operation::pooling(
                    PoolingInfo::new(
                        PoolingType::Max,
                        1,
                        PadStrideInfo::new(middle_stride, middle_stride, 0, 0),
                    )
                    .with_exclude_padding(true),
                )
                .named(format!("{}/shortcut/MaxPool", unit)),
            );
        }

        stream
            .branch_named(
                BranchMergeMethod::Add,
                vec![left, right],
                Some(format!("{}/add", unit)),
            )
            .add(Operation::activation(Activation::Relu).named(format!("{}/Relu", unit)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        DataType, GraphSummary, InputAccessor, OutputAccessor, TensorDescriptor, TensorShape,
    };

    fn summary(size: usize, depth_scale: f32) -> GraphSummary {
        let mut stream = Stream::new("ResNet50");
        stream.input(
            TensorDescriptor::new(TensorShape::new(size, size, 3, 1), DataType::F32),
            InputAccessor::dummy(),
        );
        ResNet50.build(&mut stream, depth_scale);
        stream.output(OutputAccessor::Dummy);
        stream.into_graph().unwrap().summary()
    }

    #[test]
    fn test_resnet50_layer_counts() {
        let summary = summary(224, 1.0);
        // stem + 16 units of 3 + 4 shortcut convolutions + logits
        assert_eq!(summary.count_kind("convolution"), 1 + 48 + 4 + 1);
        assert_eq!(summary.count_kind("batch_norm"), 1 + 48 + 4);
        assert_eq!(summary.count_kind("add"), 16);
        // stem, three strided shortcuts, global average
        assert_eq!(summary.count_kind("pooling"), 5);
    }

    #[test]
    fn test_resnet50_block_shapes() {
        let summary = summary(224, 1.0);
        let shape = |name: &str| summary.layer(name).unwrap().output_shape;

        assert_eq!(shape("pool1/MaxPool"), TensorShape::new(56, 56, 64, 1));
        assert_eq!(
            shape("block1/unit3/bottleneck_v1/Relu"),
            TensorShape::new(28, 28, 256, 1)
        );
        assert_eq!(
            shape("block2/unit4/bottleneck_v1/Relu"),
            TensorShape::new(14, 14, 512, 1)
        );
        assert_eq!(
            shape("block3/unit6/bottleneck_v1/Relu"),
            TensorShape::new(7, 7, 1024, 1)
        );
        assert_eq!(
            shape("block4/unit3/bottleneck_v1/Relu"),
            TensorShape::new(7, 7, 2048, 1)
        );
        assert_eq!(shape("pool5"), TensorShape::new(1, 1, 2048, 1));
        assert_eq!(summary.output_shape, TensorShape::new(1, 1, 1000, 1));
    }

    #[test]
    fn test_resnet50_unscaled_parameters() {
        // Published ResNet-50 v1 size, plus the conv bias of the logits
        // and four tensors per batch norm instead of two trainable ones.
        let summary = summary(224, 1.0);
        assert!(summary.total_parameters > 25_000_000);
        assert!(summary.total_parameters < 26_000_000);
    }

    #[test]
    fn test_resnet50_scaled_widths() {
        let summary = summary(224, 0.5);
        assert_eq!(
            summary.layer("conv1/convolution").unwrap().output_shape.channels,
            32
        );
        assert_eq!(
            summary
                .layer("block4/unit1/bottleneck_v1/shortcut/convolution")
                .unwrap()
                .output_shape
                .channels,
            1024
        );
    }
}
