use crate::example::Topology;
use crate::graph::{
    BranchMergeMethod, DimensionRoundingType, NormalizationInfo, Operation, PadStrideInfo,
    PoolingInfo, PoolingType, Stream, WeightsAccessor,
};
use crate::layers::Activation;

use super::{NUM_CLASSES, scaled};

/// Filter counts of one inception module at full width.
#[derive(Debug, Clone, Copy)]
struct Inception {
    name: &'static str,
    conv_1x1: usize,
    /// (1x1 reduce, 3x3)
    conv_3x3: (usize, usize),
    /// (1x1 reduce, 5x5)
    conv_5x5: (usize, usize),
    pool_proj: usize,
}

const fn inception(
    name: &'static str,
    conv_1x1: usize,
    conv_3x3: (usize, usize),
    conv_5x5: (usize, usize),
    pool_proj: usize,
) -> Inception {
    Inception {
        name,
        conv_1x1,
        conv_3x3,
        conv_5x5,
        pool_proj,
    }
}

const INCEPTION_3: [Inception; 2] = [
    inception("inception_3a", 64, (96, 128), (16, 32), 32),
    inception("inception_3b", 128, (128, 192), (32, 96), 64),
];

const INCEPTION_4: [Inception; 5] = [
    inception("inception_4a", 192, (96, 208), (16, 48), 64),
    inception("inception_4b", 160, (112, 224), (24, 64), 64),
    inception("inception_4c", 128, (128, 256), (24, 64), 64),
    inception("inception_4d", 112, (144, 288), (32, 64), 64),
    inception("inception_4e", 256, (160, 320), (32, 128), 128),
];

const INCEPTION_5: [Inception; 2] = [
    inception("inception_5a", 256, (160, 320), (32, 128), 128),
    inception("inception_5b", 384, (192, 384), (48, 128), 128),
];

/// GoogLeNet (Inception v1) without the auxiliary classifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogLeNet;

impl Topology for GoogLeNet {
    fn name(&self) -> &'static str {
        "GoogleNet"
    }

    fn default_depth_scale(&self) -> f32 {
        0.25
    }

    fn mean_rgb(&self) -> [f32; 3] {
        [122.68, 116.67, 104.01]
    }

    fn build(&self, stream: &mut Stream, depth_scale: f32) {
        let lrn = || Operation::normalization(NormalizationInfo::cross_map(5, 0.0001, 0.75));

        stream
            .add(conv(7, scaled(64, depth_scale), PadStrideInfo::new(2, 2, 3, 3)).named("conv1/7x7_s2"))
            .add(relu().named("conv1/relu_7x7"))
            .add(max_pool_3x3_s2().named("pool1/3x3_s2"))
            .add(lrn().named("pool1/norm1"))
            .add(conv(1, scaled(64, depth_scale), PadStrideInfo::new(1, 1, 0, 0)).named("conv2/3x3_reduce"))
            .add(relu().named("conv2/relu_3x3_reduce"))
            .add(conv(3, scaled(192, depth_scale), PadStrideInfo::new(1, 1, 1, 1)).named("conv2/3x3"))
            .add(relu().named("conv2/relu_3x3"))
            .add(lrn().named("conv2/norm2"))
            .add(max_pool_3x3_s2().named("pool2/3x3_s2"));

        for module in &INCEPTION_3 {
            inception_module(stream, module, depth_scale);
        }
        stream.add(max_pool_3x3_s2().named("pool3/3x3_s2"));
        for module in &INCEPTION_4 {
            inception_module(stream, module, depth_scale);
        }
        stream.add(max_pool_3x3_s2().named("pool4/3x3_s2"));
        for module in &INCEPTION_5 {
            inception_module(stream, module, depth_scale);
        }

        stream
            .add(
                Operation::pooling(PoolingInfo::new(
                    PoolingType::Avg,
                    7,
                    PadStrideInfo::new(1, 1, 0, 0).with_rounding(DimensionRoundingType::Ceil),
                ))
                .named("pool5/7x7_s1"),
            )
            .add(
                Operation::fully_connected(
                    NUM_CLASSES,
                    WeightsAccessor::Dummy,
                    WeightsAccessor::Dummy,
                )
                .named("loss3/classifier"),
            )
            .add(Operation::softmax().named("prob"));
    }
}

fn conv(kernel: usize, filters: usize, pad_stride: PadStrideInfo) -> Operation {
    Operation::convolution(
        kernel,
        kernel,
        filters,
        WeightsAccessor::Dummy,
        WeightsAccessor::Dummy,
        pad_stride,
    )
}

fn relu() -> Operation {
    Operation::activation(Activation::Relu)
}

fn max_pool_3x3_s2() -> Operation {
    Operation::pooling(PoolingInfo::new(
        PoolingType::Max,
        3,
        PadStrideInfo::new(2, 2, 0, 0).with_rounding(DimensionRoundingType::Ceil),
    ))
}

/// Four parallel branches merged by depth concatenation.
fn inception_module(stream: &mut Stream, module: &Inception, depth_scale: f32) {
    let name = module.name;
    let same = PadStrideInfo::new(1, 1, 0, 0);

    let mut a = stream.sub_stream();
    a.add(conv(1, scaled(module.conv_1x1, depth_scale), same).named(format!("{}/1x1", name)))
        .add(relu().named(format!("{}/relu_1x1", name)));

    let (reduce, filters) = module.conv_3x3;
    let mut b = stream.sub_stream();
    b.add(conv(1, scaled(reduce, depth_scale), same).named(format!("{}/3x3_reduce", name)))
        .add(relu().named(format!("{}/relu_3x3_reduce", name)))
        .add(
            conv(3, scaled(filters, depth_scale), PadStrideInfo::new(1, 1, 1, 1))
                .named(format!("{}/3x3", name)),
        )
        .add(relu().named(format!("{}/relu_3x3", name)));

    let (reduce, filters) = module.conv_5x5;
    let mut c = stream.sub_stream();
    c.add(conv(1, scaled(reduce, depth_scale), same).named(format!("{}/5x5_reduce", name)))
        .add(relu().named(format!("{}/relu_5x5_reduce", name)))
        .add(
            conv(5, scaled(filters, depth_scale), PadStrideInfo::new(1, 1, 2, 2))
                .named(format!("{}/5x5", name)),
        )
        .add(relu().named(format!("{}/relu_5x5", name)));

    let mut d = stream.sub_stream();
    d.add(
        Operation::pooling(PoolingInfo::new(
            PoolingType::Max,
            3,
            PadStrideInfo::new(1, 1, 1, 1).with_rounding(DimensionRoundingType::Ceil),
        ))
        .named(format!("{}/pool", name)),
    )
    .add(conv(1, scaled(module.pool_proj, depth_scale), same).named(format!("{}/pool_proj", name)))
    .add(relu().named(format!("{}/relu_pool_proj", name)));

    stream.branch_named(
        BranchMergeMethod::DepthConcatenate,
        vec![a, b, c, d],
        Some(format!("{}/output", name)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        DataType, GraphSummary, InputAccessor, OutputAccessor, TensorDescriptor, TensorShape,
    };

    fn summary(depth_scale: f32) -> GraphSummary {
        let mut stream = Stream::new("GoogleNet");
        stream.input(
            TensorDescriptor::new(TensorShape::new(224, 224, 3, 1), DataType::F32),
            InputAccessor::dummy(),
        );
        GoogLeNet.build(&mut stream, depth_scale);
        stream.output(OutputAccessor::Dummy);
        stream.into_graph().unwrap().summary()
    }

    #[test]
    fn test_googlenet_layer_counts() {
        let summary = summary(0.25);
        // 3 stem convolutions + 6 per inception module
        assert_eq!(summary.count_kind("convolution"), 3 + 9 * 6);
        assert_eq!(summary.count_kind("depth_concatenate"), 9);
        assert_eq!(summary.count_kind("normalization"), 2);
        assert_eq!(summary.count_kind("fully_connected"), 1);
    }

    #[test]
    fn test_googlenet_spatial_sizes() {
        let summary = summary(0.25);
        let shape = |name: &str| summary.layer(name).unwrap().output_shape;

        assert_eq!(shape("conv1/7x7_s2"), TensorShape::new(112, 112, 16, 1));
        assert_eq!(shape("pool1/3x3_s2"), TensorShape::new(56, 56, 16, 1));
        assert_eq!(shape("pool2/3x3_s2"), TensorShape::new(28, 28, 48, 1));
        assert_eq!(shape("pool3/3x3_s2"), TensorShape::new(14, 14, 120, 1));
        assert_eq!(shape("pool4/3x3_s2"), TensorShape::new(7, 7, 208, 1));
        assert_eq!(shape("pool5/7x7_s1"), TensorShape::new(1, 1, 256, 1));
        assert_eq!(summary.output_shape, TensorShape::new(1, 1, 1000, 1));
    }

    #[test]
    fn test_googlenet_inception_widths() {
        let full = summary(1.0);
        let channels = |name: &str| full.layer(name).unwrap().output_shape.channels;

        assert_eq!(channels("inception_3a/output"), 256);
        assert_eq!(channels("inception_3b/output"), 480);
        assert_eq!(channels("inception_4a/output"), 512);
        assert_eq!(channels("inception_4e/output"), 832);
        assert_eq!(channels("inception_5b/output"), 1024);

        let quarter = summary(0.25);
        assert_eq!(
            quarter.layer("inception_3a/output").unwrap().output_shape.channels,
            64
        );
    }
}
