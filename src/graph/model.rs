//! CompiledModel - a graph with burn layers initialized on a device.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use burn::tensor::{Tensor, backend::Backend};
use log::{debug, info};

use crate::errors::GraphError;
use crate::layers::{
    Activation, BatchNormLayer, Convolution, ConvolutionConfig, FullyConnected,
    FullyConnectedConfig, LocalResponseNorm, Pooling,
};

use super::accessor::Prediction;
use super::buffer::{BufferId, DataBuffer};
use super::config::GraphConfig;
use super::core::ModelGraph;
use super::operation::{BatchNormAccessors, OpId, Operation};
use super::tensor::{DataLayout, TensorShape};
use super::tuner::{self, TunerProfile};

/// Execution step in the forward pass.
#[derive(Debug, Clone)]
enum Step {
    Convolution {
        op_id: OpId,
        input: BufferId,
        output: BufferId,
    },
    FullyConnected {
        op_id: OpId,
        input: BufferId,
        output: BufferId,
    },
    BatchNorm {
        op_id: OpId,
        input: BufferId,
        output: BufferId,
    },
    Activation {
        activation: Activation,
        input: BufferId,
        output: BufferId,
    },
    Pooling {
        layer: Pooling,
        input: BufferId,
        output: BufferId,
    },
    Normalization {
        layer: LocalResponseNorm,
        input: BufferId,
        output: BufferId,
    },
    Flatten {
        input: BufferId,
        output: BufferId,
    },
    Softmax {
        beta: f32,
        input: BufferId,
        output: BufferId,
    },
    Concat {
        inputs: Vec<BufferId>,
        output: BufferId,
    },
    Add {
        inputs: Vec<BufferId>,
        output: BufferId,
    },
}

impl Step {
    fn reads(&self) -> Vec<BufferId> {
        match self {
            Step::Concat { inputs, .. } | Step::Add { inputs, .. } => inputs.clone(),
            Step::Convolution { input, .. }
            | Step::FullyConnected { input, .. }
            | Step::BatchNorm { input, .. }
            | Step::Activation { input, .. }
            | Step::Pooling { input, .. }
            | Step::Normalization { input, .. }
            | Step::Flatten { input, .. }
            | Step::Softmax { input, .. } => vec![*input],
        }
    }
}

/// A graph ready to run on a device.
///
/// Holds the initialized layers, the execution plan and the input tensor
/// generated by the graph's input accessor.
#[derive(Debug)]
pub struct CompiledModel<B: Backend> {
    graph: ModelGraph,
    device: B::Device,
    convolutions: HashMap<OpId, Convolution<B>>,
    fully_connected: HashMap<OpId, FullyConnected<B>>,
    batch_norms: HashMap<OpId, BatchNormLayer<B>>,
    steps: Vec<Step>,
    /// Step labels, parallel to `steps`
    labels: Vec<(String, &'static str)>,
    buffer_index: HashMap<BufferId, usize>,
    /// Slots whose last reader is the step at the same position
    releases: Vec<Vec<usize>>,
    input: Tensor<B, 4>,
    tuner_profile: Option<TunerProfile>,
}

impl<B: Backend> CompiledModel<B> {
    /// Compiles a graph on the given device.
    pub fn new(
        graph: ModelGraph,
        device: &B::Device,
        config: &GraphConfig,
    ) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new();
        builder.register_input(graph.input().id());
        for buffer in graph.execution_order() {
            builder.push(buffer)?;
        }
        let output_slot = builder.slot(graph.output().id())?;
        let releases = builder.releases(output_slot)?;

        let convolutions = builder.init_convolutions(device);
        let fully_connected = builder.init_fully_connected(device);
        let batch_norms = builder.init_batch_norms(device);

        let input = graph
            .input_accessor()
            .generate::<B>(graph.descriptor(), device)?;

        let mut model = Self {
            graph,
            device: device.clone(),
            convolutions,
            fully_connected,
            batch_norms,
            steps: builder.steps,
            labels: builder.labels,
            buffer_index: builder.buffer_index,
            releases,
            input,
            tuner_profile: None,
        };
        debug!(
            "Compiled graph {} into {} steps",
            model.graph.name(),
            model.steps.len()
        );

        if config.use_tuner {
            let profile = tuner::tune(&model, config.tuner_file.as_deref())?;
            model.tuner_profile = Some(profile);
        }

        Ok(model)
    }

    /// Performs forward pass through the model.
    ///
    /// `input` is laid out as the input descriptor says; the result is NCHW.
    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 4>, GraphError> {
        self.execute(input, |_| {})
    }

    /// Forward pass that synchronizes the device after every step and
    /// returns the time spent in each one.
    pub fn forward_profiled(
        &self,
        input: Tensor<B, 4>,
    ) -> Result<(Tensor<B, 4>, Vec<Duration>), GraphError> {
        let mut timings = Vec::with_capacity(self.steps.len());
        B::sync(&self.device);
        let mut last = Instant::now();
        let output = self.execute(input, |_| {
            B::sync(&self.device);
            let now = Instant::now();
            timings.push(now - last);
            last = now;
        })?;
        Ok((output, timings))
    }

    /// Runs the graph once on its generated input and feeds the output
    /// accessor.
    pub fn run(&self) -> Result<Vec<Prediction>, GraphError> {
        let output = self.forward(self.input.clone())?;
        self.graph.output_accessor().access(&output)
    }

    /// Blocks until all queued work on the device has finished.
    pub fn sync(&self) {
        B::sync(&self.device);
    }

    fn execute<F: FnMut(usize)>(
        &self,
        input: Tensor<B, 4>,
        mut after_step: F,
    ) -> Result<Tensor<B, 4>, GraphError> {
        let descriptor = self.graph.descriptor();
        let expected = descriptor.physical_dims();
        if input.dims() != expected {
            return Err(GraphError::ShapeMismatch {
                layer: "input".to_string(),
                expected: format!("{:?}", expected),
                actual: format!("{:?}", input.dims()),
            });
        }
        let input = match descriptor.layout {
            DataLayout::Nchw => input,
            DataLayout::Nhwc => input.permute([0, 3, 1, 2]),
        };

        let mut buffers: HashMap<usize, Tensor<B, 4>> = HashMap::new();
        buffers.insert(self.index(self.graph.input().id())?, input);

        for (position, step) in self.steps.iter().enumerate() {
            let (output, result) = match step {
                Step::Convolution {
                    op_id,
                    input,
                    output,
                } => {
                    let layer = self.layer(&self.convolutions, *op_id)?;
                    (output, layer.forward(self.fetch(&buffers, input)?))
                }
                Step::FullyConnected {
                    op_id,
                    input,
                    output,
                } => {
                    let layer = self.layer(&self.fully_connected, *op_id)?;
                    (output, layer.forward(self.fetch(&buffers, input)?))
                }
                Step::BatchNorm {
                    op_id,
                    input,
                    output,
                } => {
                    let layer = self.layer(&self.batch_norms, *op_id)?;
                    (output, layer.forward(self.fetch(&buffers, input)?))
                }
                Step::Activation {
                    activation,
                    input,
                    output,
                } => (output, activation.apply(self.fetch(&buffers, input)?)),
                Step::Pooling {
                    layer,
                    input,
                    output,
                } => (output, layer.forward(self.fetch(&buffers, input)?)),
                Step::Normalization {
                    layer,
                    input,
                    output,
                } => (output, layer.forward(self.fetch(&buffers, input)?)),
                Step::Flatten { input, output } => {
                    let tensor = self.fetch(&buffers, input)?;
                    let [batch, channels, height, width] = tensor.dims();
                    (
                        output,
                        tensor.reshape([batch, channels * height * width, 1, 1]),
                    )
                }
                Step::Softmax {
                    beta,
                    input,
                    output,
                } => {
                    let tensor = self.fetch(&buffers, input)?;
                    let dims = tensor.dims();
                    let flat: Tensor<B, 2> = tensor.flatten(1, 3);
                    let result = burn::tensor::activation::softmax(flat.mul_scalar(*beta), 1);
                    (output, result.reshape(dims))
                }
                Step::Concat { inputs, output } => {
                    let tensors = inputs
                        .iter()
                        .map(|id| self.fetch(&buffers, id))
                        .collect::<Result<Vec<_>, _>>()?;
                    (output, Tensor::cat(tensors, 1))
                }
                Step::Add { inputs, output } => {
                    let mut result = self.fetch(&buffers, &inputs[0])?;
                    for id in &inputs[1..] {
                        result = result.add(self.fetch(&buffers, id)?);
                    }
                    (output, result)
                }
            };

            buffers.insert(self.index(*output)?, result);
            for slot in &self.releases[position] {
                buffers.remove(slot);
            }
            after_step(position);
        }

        let output_idx = self.index(self.graph.output().id())?;
        buffers.remove(&output_idx).ok_or_else(|| {
            GraphError::InvalidGraph("Output buffer was not computed".to_string())
        })
    }

    fn index(&self, id: BufferId) -> Result<usize, GraphError> {
        self.buffer_index
            .get(&id)
            .copied()
            .ok_or_else(|| GraphError::InvalidGraph(format!("Unknown buffer {}", id)))
    }

    fn fetch(
        &self,
        buffers: &HashMap<usize, Tensor<B, 4>>,
        id: &BufferId,
    ) -> Result<Tensor<B, 4>, GraphError> {
        let idx = self.index(*id)?;
        buffers.get(&idx).cloned().ok_or_else(|| {
            GraphError::InvalidGraph(format!("Buffer {} read before it was written", id))
        })
    }

    fn layer<'a, L>(&self, layers: &'a HashMap<OpId, L>, op_id: OpId) -> Result<&'a L, GraphError> {
        layers
            .get(&op_id)
            .ok_or_else(|| GraphError::InvalidGraph(format!("Operation {} was not initialized", op_id)))
    }

    /// Returns the graph this model was compiled from.
    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Returns the input tensor generated at compile time.
    pub fn input(&self) -> &Tensor<B, 4> {
        &self.input
    }

    /// Returns the logical output shape.
    pub fn output_shape(&self) -> TensorShape {
        self.graph.output_shape()
    }

    /// Number of execution steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Layer name and kind of every step, in execution order.
    pub fn step_labels(&self) -> &[(String, &'static str)] {
        &self.labels
    }

    /// Returns the profile recorded by the tuner pass, if it ran.
    pub fn tuner_profile(&self) -> Option<&TunerProfile> {
        self.tuner_profile.as_ref()
    }

    /// Logs the setup of this model.
    pub fn log_setup(&self) {
        let summary = self.graph.summary();
        summary.log();
        info!(
            "Graph {} finalized: {} steps, input {} ({}, {})",
            self.graph.name(),
            self.steps.len(),
            self.graph.descriptor().shape,
            self.graph.descriptor().data_type,
            self.graph.descriptor().layout
        );
    }
}

/// Builder for constructing the CompiledModel execution order.
struct GraphBuilder {
    buffer_index: HashMap<BufferId, usize>,
    next_idx: usize,
    steps: Vec<Step>,
    labels: Vec<(String, &'static str)>,
    conv_info: HashMap<OpId, ConvolutionConfig>,
    fc_info: HashMap<OpId, FullyConnectedConfig>,
    batch_norm_info: HashMap<OpId, (usize, f32, BatchNormAccessors)>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self {
            buffer_index: HashMap::new(),
            next_idx: 0,
            steps: Vec::new(),
            labels: Vec::new(),
            conv_info: HashMap::new(),
            fc_info: HashMap::new(),
            batch_norm_info: HashMap::new(),
        }
    }

    fn register_input(&mut self, id: BufferId) {
        self.buffer_index.insert(id, self.next_idx);
        self.next_idx += 1;
    }

    fn slot(&self, id: BufferId) -> Result<usize, GraphError> {
        self.buffer_index
            .get(&id)
            .copied()
            .ok_or_else(|| GraphError::InvalidGraph(format!("Unknown buffer {}", id)))
    }

    /// Adds the step producing `buffer`; its inputs must already be known.
    fn push(&mut self, buffer: &DataBuffer) -> Result<(), GraphError> {
        let Some(producer) = buffer.producer() else {
            return Err(GraphError::InvalidGraph(
                "Buffer has no producer and is not a registered input".to_string(),
            ));
        };
        let inputs = buffer.inputs();
        let Some(first) = inputs.first() else {
            return Err(GraphError::invalid_layer(
                buffer.display_name(),
                "layer has no inputs",
            ));
        };
        for input in inputs {
            self.slot(input.id())?;
        }

        self.buffer_index.insert(buffer.id(), self.next_idx);
        self.next_idx += 1;

        let input = first.id();
        let output = buffer.id();
        let in_shape = first.shape();

        let step = match producer {
            Operation::Convolution {
                id,
                kernel_width,
                kernel_height,
                filters,
                pad_stride,
                weights,
                bias,
            } => {
                self.conv_info.entry(*id).or_insert_with(|| {
                    ConvolutionConfig::new(in_shape.channels, *filters, *kernel_width, *kernel_height)
                        .with_pad_stride(*pad_stride)
                        .with_accessors(*weights, *bias)
                });
                Step::Convolution {
                    op_id: *id,
                    input,
                    output,
                }
            }
            Operation::FullyConnected {
                id,
                outputs,
                weights,
                bias,
            } => {
                self.fc_info.entry(*id).or_insert_with(|| {
                    FullyConnectedConfig::new(in_shape.item_size(), *outputs)
                        .with_accessors(*weights, *bias)
                });
                Step::FullyConnected {
                    op_id: *id,
                    input,
                    output,
                }
            }
            Operation::BatchNorm {
                id,
                epsilon,
                accessors,
            } => {
                self.batch_norm_info
                    .entry(*id)
                    .or_insert((in_shape.channels, *epsilon, *accessors));
                Step::BatchNorm {
                    op_id: *id,
                    input,
                    output,
                }
            }
            Operation::Activation { activation, .. } => {
                debug!("{}: {}", buffer.display_name(), activation.name());
                Step::Activation {
                    activation: *activation,
                    input,
                    output,
                }
            }
            Operation::Pooling { info, .. } => Step::Pooling {
                layer: Pooling::new(*info),
                input,
                output,
            },
            Operation::Normalization { info, .. } => Step::Normalization {
                layer: LocalResponseNorm::new(*info),
                input,
                output,
            },
            Operation::Flatten { .. } => Step::Flatten { input, output },
            Operation::Softmax { beta, .. } => Step::Softmax {
                beta: *beta,
                input,
                output,
            },
            Operation::Concat { .. } => Step::Concat {
                inputs: inputs.iter().map(|b| b.id()).collect(),
                output,
            },
            Operation::Add { .. } => Step::Add {
                inputs: inputs.iter().map(|b| b.id()).collect(),
                output,
            },
        };

        self.steps.push(step);
        self.labels.push((buffer.display_name(), producer.kind()));
        Ok(())
    }

    /// For each step, the slots that no later step reads.
    fn releases(&self, output_slot: usize) -> Result<Vec<Vec<usize>>, GraphError> {
        let mut last_use: HashMap<usize, usize> = HashMap::new();
        for (position, step) in self.steps.iter().enumerate() {
            for id in step.reads() {
                last_use.insert(self.slot(id)?, position);
            }
        }

        let mut releases = vec![Vec::new(); self.steps.len()];
        for (slot, position) in last_use {
            if slot != output_slot {
                releases[position].push(slot);
            }
        }
        Ok(releases)
    }

    fn init_convolutions<B: Backend>(&self, device: &B::Device) -> HashMap<OpId, Convolution<B>> {
        self.conv_info
            .iter()
            .map(|(&op_id, config)| (op_id, config.init(device)))
            .collect()
    }

    fn init_fully_connected<B: Backend>(
        &self,
        device: &B::Device,
    ) -> HashMap<OpId, FullyConnected<B>> {
        self.fc_info
            .iter()
            .map(|(&op_id, config)| (op_id, config.init(device)))
            .collect()
    }

    fn init_batch_norms<B: Backend>(&self, device: &B::Device) -> HashMap<OpId, BatchNormLayer<B>> {
        self.batch_norm_info
            .iter()
            .map(|(&op_id, &(num_features, epsilon, accessors))| {
                (
                    op_id,
                    BatchNormLayer::new(num_features, epsilon, accessors, device),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::accessor::{
        CaffePreprocessor, InputAccessor, OutputAccessor, WeightsAccessor,
    };
    use crate::graph::operation::{
        BranchMergeMethod, DimensionRoundingType, NormalizationInfo, PadStrideInfo, PoolingInfo,
        PoolingType,
    };
    use crate::graph::stream::Stream;
    use crate::graph::tensor::{DataType, TensorDescriptor};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn device() -> <TestBackend as Backend>::Device {
        <TestBackend as Backend>::Device::default()
    }

    fn descriptor(w: usize, c: usize) -> TensorDescriptor {
        TensorDescriptor::new(TensorShape::new(w, w, c, 1), DataType::F32)
    }

    fn conv(k: usize, filters: usize, weights: WeightsAccessor, ps: PadStrideInfo) -> Operation {
        Operation::convolution(k, k, filters, weights, weights, ps)
    }

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.to_data().to_vec().unwrap()
    }

    #[test]
    fn test_forward_shape_matches_inference() {
        let mut stream = Stream::new("shapes");
        stream
            .input(descriptor(16, 3), InputAccessor::dummy())
            .add(conv(3, 8, WeightsAccessor::Random, PadStrideInfo::new(2, 2, 1, 1)))
            .add(Operation::activation(Activation::Relu))
            .add(Operation::pooling(PoolingInfo::new(
                PoolingType::Max,
                3,
                PadStrideInfo::new(2, 2, 0, 0).with_rounding(DimensionRoundingType::Ceil),
            )))
            .add(Operation::normalization(NormalizationInfo::cross_map(5, 1e-4, 0.75)))
            .add(Operation::fully_connected(10, WeightsAccessor::Random, WeightsAccessor::Random))
            .add(Operation::softmax())
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        let output = model.forward(model.input().clone()).unwrap();
        assert_eq!(output.dims(), model.output_shape().nchw());
        assert_eq!(output.dims(), [1, 10, 1, 1]);

        let total: f32 = values(output).iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_ceil_convolution_concatenates_with_ceil_pooling() {
        let ceil = PadStrideInfo::new(2, 2, 0, 0).with_rounding(DimensionRoundingType::Ceil);
        let mut stream = Stream::new("ceil");
        stream.input(descriptor(5, 2), InputAccessor::dummy());
        let mut convolved = stream.sub_stream();
        convolved.add(conv(2, 4, WeightsAccessor::Random, ceil));
        let mut pooled = stream.sub_stream();
        pooled.add(Operation::pooling(PoolingInfo::new(PoolingType::Max, 2, ceil)));
        stream
            .branch(BranchMergeMethod::DepthConcatenate, vec![convolved, pooled])
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();
        assert_eq!(model.output_shape().nchw(), [1, 6, 3, 3]);

        let output = model.forward(model.input().clone()).unwrap();
        assert_eq!(output.dims(), model.output_shape().nchw());
        model.run().unwrap();
    }

    #[test]
    fn test_concat_forward() {
        let mut stream = Stream::new("concat");
        stream.input(descriptor(4, 2), InputAccessor::dummy());
        let mut a = stream.sub_stream();
        a.add(Operation::activation(Activation::Linear { a: 2.0, b: 0.0 }));
        let b = stream.sub_stream();
        stream
            .branch(BranchMergeMethod::DepthConcatenate, vec![a, b])
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 2, 4, 4], &device());
        let output = model.forward(input).unwrap();
        assert_eq!(output.dims(), [1, 4, 4, 4]);

        let out = values(output);
        assert_eq!(out[0], 2.0);
        assert_eq!(out[2 * 16], 1.0);
    }

    #[test]
    fn test_residual_add_forward() {
        let mut stream = Stream::new("residual");
        stream.input(descriptor(4, 3), InputAccessor::dummy());
        let mut residual = stream.sub_stream();
        residual
            .add(conv(1, 3, WeightsAccessor::Dummy, PadStrideInfo::new(1, 1, 0, 0)))
            .add(Operation::batch_norm(BatchNormAccessors::default(), 1e-5));
        let identity = stream.sub_stream();
        stream
            .branch(BranchMergeMethod::Add, vec![residual, identity])
            .add(Operation::activation(Activation::Relu))
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device()).mul_scalar(-1.0);
        let out = values(model.forward(input.clone()).unwrap());
        assert!(out.iter().all(|v| *v == 0.0));

        let out = values(model.forward(input.mul_scalar(-2.0)).unwrap());
        assert!(out.iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_nhwc_input_is_permuted() {
        let mut stream = Stream::new("nhwc");
        stream
            .input(
                descriptor(3, 2).with_layout(DataLayout::Nhwc),
                InputAccessor::dummy(),
            )
            .add(Operation::flatten())
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        assert_eq!(model.input().dims(), [1, 3, 3, 2]);
        let output = model.forward(model.input().clone()).unwrap();
        assert_eq!(output.dims(), [1, 18, 1, 1]);
    }

    #[test]
    fn test_wrong_input_shape_is_rejected() {
        let mut stream = Stream::new("wrong_input");
        stream
            .input(descriptor(4, 3), InputAccessor::dummy())
            .add(Operation::flatten())
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 5, 5], &device());
        assert!(matches!(
            model.forward(input),
            Err(GraphError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_intermediate_buffers_are_released() {
        let mut stream = Stream::new("chain");
        stream
            .input(descriptor(4, 1), InputAccessor::dummy())
            .add(Operation::activation(Activation::Relu))
            .add(Operation::activation(Activation::Relu))
            .add(Operation::activation(Activation::Relu))
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        // every slot except the output is dropped right after its reader
        let released: usize = model.releases.iter().map(|r| r.len()).sum();
        assert_eq!(released, 3);
        assert!(model.releases.iter().all(|r| r.len() <= 1));
    }

    #[test]
    fn test_run_reports_top_predictions() {
        let labels: Vec<String> = (0..4).map(|i| format!("class_{}", i)).collect();
        let mut stream = Stream::new("run");
        stream
            .input(
                descriptor(2, 3),
                InputAccessor::synthetic_image(CaffePreprocessor::new([100.0, 100.0, 100.0])),
            )
            .add(Operation::fully_connected(4, WeightsAccessor::Dummy, WeightsAccessor::Dummy))
            .add(Operation::softmax())
            .output(OutputAccessor::top_n(2, labels));
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        let predictions = model.run().unwrap();
        assert_eq!(predictions.len(), 2);
        assert!((predictions[0].probability - 0.25).abs() < 1e-5);
        model.sync();
    }

    #[test]
    fn test_profiled_forward_times_every_step() {
        let mut stream = Stream::new("profiled");
        stream
            .input(descriptor(4, 2), InputAccessor::dummy())
            .add(Operation::activation(Activation::Relu))
            .add(Operation::flatten())
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        let (output, timings) = model.forward_profiled(model.input().clone()).unwrap();
        assert_eq!(output.dims(), [1, 32, 1, 1]);
        assert_eq!(timings.len(), model.step_count());
        assert_eq!(model.step_labels()[1].1, "flatten");
    }

    #[test]
    fn test_shared_operation_is_initialized_once() {
        let shared = conv(1, 2, WeightsAccessor::Random, PadStrideInfo::new(1, 1, 0, 0));
        let mut stream = Stream::new("shared");
        stream.input(descriptor(4, 2), InputAccessor::dummy());
        let mut a = stream.sub_stream();
        a.add(shared.clone());
        let mut b = stream.sub_stream();
        b.add(shared);
        stream
            .branch(BranchMergeMethod::Add, vec![a, b])
            .output(OutputAccessor::Dummy);
        let model = stream
            .finalize::<TestBackend>(&device(), &GraphConfig::default())
            .unwrap();

        assert_eq!(model.convolutions.len(), 1);
        assert_eq!(model.step_count(), 3);
    }
}
