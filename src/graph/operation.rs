//! Operations for the computation graph.
//!
//! Each operation is a parameter bundle; the numerical work is done by burn
//! once the graph is compiled. Shape inference happens here, when a layer is
//! appended, so a malformed topology fails before any device is touched.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::GraphError;
use crate::layers::Activation;

use super::accessor::WeightsAccessor;
use super::buffer::DataBuffer;
use super::tensor::TensorShape;

/// Unique identifier for an operation.
pub type OpId = usize;

/// Global counter for unique operation IDs.
static OP_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Generates a new unique operation ID.
fn next_op_id() -> OpId {
    OP_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Rounding applied when the window does not tile the padded input exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DimensionRoundingType {
    #[default]
    Floor,
    Ceil,
}

/// Strides, paddings and rounding of a sliding-window layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadStrideInfo {
    pub stride_x: usize,
    pub stride_y: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
    pub rounding: DimensionRoundingType,
}

impl PadStrideInfo {
    /// Symmetric padding with floor rounding.
    pub fn new(stride_x: usize, stride_y: usize, pad_x: usize, pad_y: usize) -> Self {
        Self {
            stride_x,
            stride_y,
            pad_left: pad_x,
            pad_right: pad_x,
            pad_top: pad_y,
            pad_bottom: pad_y,
            rounding: DimensionRoundingType::Floor,
        }
    }

    /// Per-side padding.
    pub fn asymmetric(
        stride_x: usize,
        stride_y: usize,
        pad_left: usize,
        pad_right: usize,
        pad_top: usize,
        pad_bottom: usize,
        rounding: DimensionRoundingType,
    ) -> Self {
        Self {
            stride_x,
            stride_y,
            pad_left,
            pad_right,
            pad_top,
            pad_bottom,
            rounding,
        }
    }

    /// Sets the rounding type.
    pub fn with_rounding(mut self, rounding: DimensionRoundingType) -> Self {
        self.rounding = rounding;
        self
    }

    /// Returns true when opposite sides are padded equally.
    pub fn is_symmetric(&self) -> bool {
        self.pad_left == self.pad_right && self.pad_top == self.pad_bottom
    }

    /// Output width and height for a kernel sliding over an input.
    ///
    /// Returns `None` when a stride is zero or the kernel does not fit.
    /// With ceil rounding the last window must start inside the input or
    /// its left or top padding.
    pub fn scaled_dimensions(
        &self,
        width: usize,
        height: usize,
        kernel_width: usize,
        kernel_height: usize,
    ) -> Option<(usize, usize)> {
        let out_w = scaled_dimension(
            width,
            self.pad_left,
            self.pad_right,
            kernel_width,
            self.stride_x,
            self.rounding,
        )?;
        let out_h = scaled_dimension(
            height,
            self.pad_top,
            self.pad_bottom,
            kernel_height,
            self.stride_y,
            self.rounding,
        )?;
        Some((out_w, out_h))
    }

    /// Extra right and bottom padding that turns a floor-rounded window
    /// into the ceil-rounded output size.
    pub fn ceil_padding(
        &self,
        width: usize,
        height: usize,
        kernel_width: usize,
        kernel_height: usize,
    ) -> (usize, usize) {
        if self.rounding == DimensionRoundingType::Floor {
            return (0, 0);
        }
        let extra = |size: usize, before: usize, after: usize, kernel: usize, stride: usize| {
            match scaled_dimension(size, before, after, kernel, stride, self.rounding) {
                Some(out) => ((out - 1) * stride + kernel).saturating_sub(size + before + after),
                None => 0,
            }
        };
        (
            extra(
                width,
                self.pad_left,
                self.pad_right,
                kernel_width,
                self.stride_x,
            ),
            extra(
                height,
                self.pad_top,
                self.pad_bottom,
                kernel_height,
                self.stride_y,
            ),
        )
    }
}

fn scaled_dimension(
    size: usize,
    pad_before: usize,
    pad_after: usize,
    kernel: usize,
    stride: usize,
    rounding: DimensionRoundingType,
) -> Option<usize> {
    let padded = size + pad_before + pad_after;
    if stride == 0 || kernel == 0 || padded < kernel {
        return None;
    }
    let span = padded - kernel;
    Some(match rounding {
        DimensionRoundingType::Floor => span / stride + 1,
        DimensionRoundingType::Ceil => {
            let out = span.div_ceil(stride) + 1;
            // drop a last window that would only cover padding
            if out > 1 && (out - 1) * stride >= size + pad_before {
                out - 1
            } else {
                out
            }
        }
    })
}

/// Pooling reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolingType {
    Max,
    Avg,
}

/// Pooling layer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolingInfo {
    pub pool_type: PoolingType,
    pub pool_size: usize,
    pub pad_stride: PadStrideInfo,
    /// Average pooling ignores padded elements when counting.
    pub exclude_padding: bool,
    /// Pool over the whole spatial extent.
    pub global: bool,
}

impl PoolingInfo {
    /// Square window pooling.
    pub fn new(pool_type: PoolingType, pool_size: usize, pad_stride: PadStrideInfo) -> Self {
        Self {
            pool_type,
            pool_size,
            pad_stride,
            exclude_padding: false,
            global: false,
        }
    }

    /// Global pooling over width and height.
    pub fn global(pool_type: PoolingType) -> Self {
        Self {
            pool_type,
            pool_size: 0,
            pad_stride: PadStrideInfo::new(1, 1, 0, 0),
            exclude_padding: false,
            global: true,
        }
    }

    /// Sets whether padding is excluded from averages.
    pub fn with_exclude_padding(mut self, exclude_padding: bool) -> Self {
        self.exclude_padding = exclude_padding;
        self
    }
}

/// Cross-map local response normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationInfo {
    pub norm_size: usize,
    pub alpha: f32,
    pub beta: f32,
    pub kappa: f32,
    /// Divide alpha by the window size.
    pub is_scaled: bool,
}

impl NormalizationInfo {
    /// Cross-map normalization with kappa = 1 and scaled alpha.
    pub fn cross_map(norm_size: usize, alpha: f32, beta: f32) -> Self {
        Self {
            norm_size,
            alpha,
            beta,
            kappa: 1.0,
            is_scaled: true,
        }
    }

    /// Sets kappa.
    pub fn with_kappa(mut self, kappa: f32) -> Self {
        self.kappa = kappa;
        self
    }

    /// Coefficient applied to the sum of squares.
    pub fn scale_coeff(&self) -> f32 {
        if self.is_scaled {
            self.alpha / self.norm_size as f32
        } else {
            self.alpha
        }
    }
}

/// Accessors for the four batch normalization tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchNormAccessors {
    pub mean: WeightsAccessor,
    pub var: WeightsAccessor,
    pub gamma: WeightsAccessor,
    pub beta: WeightsAccessor,
}

impl BatchNormAccessors {
    /// Uses the same accessor for all four tensors.
    pub fn all(accessor: WeightsAccessor) -> Self {
        Self {
            mean: accessor,
            var: accessor,
            gamma: accessor,
            beta: accessor,
        }
    }
}

/// How sub-streams are merged back into their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchMergeMethod {
    DepthConcatenate,
    Add,
}

/// A computation operation in the graph.
#[derive(Debug, Clone)]
pub enum Operation {
    Convolution {
        id: OpId,
        kernel_width: usize,
        kernel_height: usize,
        filters: usize,
        pad_stride: PadStrideInfo,
        weights: WeightsAccessor,
        bias: WeightsAccessor,
    },
    Activation {
        id: OpId,
        activation: Activation,
    },
    Pooling {
        id: OpId,
        info: PoolingInfo,
    },
    Normalization {
        id: OpId,
        info: NormalizationInfo,
    },
    BatchNorm {
        id: OpId,
        epsilon: f32,
        accessors: BatchNormAccessors,
    },
    FullyConnected {
        id: OpId,
        outputs: usize,
        weights: WeightsAccessor,
        bias: WeightsAccessor,
    },
    Flatten {
        id: OpId,
    },
    Softmax {
        id: OpId,
        beta: f32,
    },
    /// Concatenation along the channel dimension.
    Concat {
        id: OpId,
    },
    /// Element-wise addition of buffers.
    Add {
        id: OpId,
    },
}

impl Operation {
    /// Creates a convolution; `bias` may be `WeightsAccessor::None`.
    pub fn convolution(
        kernel_width: usize,
        kernel_height: usize,
        filters: usize,
        weights: WeightsAccessor,
        bias: WeightsAccessor,
        pad_stride: PadStrideInfo,
    ) -> Self {
        Self::Convolution {
            id: next_op_id(),
            kernel_width,
            kernel_height,
            filters,
            pad_stride,
            weights,
            bias,
        }
    }

    /// Creates an activation layer.
    pub fn activation(activation: Activation) -> Self {
        Self::Activation {
            id: next_op_id(),
            activation,
        }
    }

    /// Creates a pooling layer.
    pub fn pooling(info: PoolingInfo) -> Self {
        Self::Pooling {
            id: next_op_id(),
            info,
        }
    }

    /// Creates a local response normalization layer.
    pub fn normalization(info: NormalizationInfo) -> Self {
        Self::Normalization {
            id: next_op_id(),
            info,
        }
    }

    /// Creates a batch normalization layer.
    pub fn batch_norm(accessors: BatchNormAccessors, epsilon: f32) -> Self {
        Self::BatchNorm {
            id: next_op_id(),
            epsilon,
            accessors,
        }
    }

    /// Creates a fully connected layer.
    pub fn fully_connected(outputs: usize, weights: WeightsAccessor, bias: WeightsAccessor) -> Self {
        Self::FullyConnected {
            id: next_op_id(),
            outputs,
            weights,
            bias,
        }
    }

    /// Creates a flatten layer.
    pub fn flatten() -> Self {
        Self::Flatten { id: next_op_id() }
    }

    /// Creates a softmax layer with beta = 1.
    pub fn softmax() -> Self {
        Self::softmax_with_beta(1.0)
    }

    /// Creates a softmax layer scaling its input by beta.
    pub fn softmax_with_beta(beta: f32) -> Self {
        Self::Softmax {
            id: next_op_id(),
            beta,
        }
    }

    /// Creates a depth concatenation.
    pub fn concat() -> Self {
        Self::Concat { id: next_op_id() }
    }

    /// Creates an element-wise addition.
    pub fn add() -> Self {
        Self::Add { id: next_op_id() }
    }

    /// Creates the merge operation for a branch.
    pub fn merge(method: BranchMergeMethod) -> Self {
        match method {
            BranchMergeMethod::DepthConcatenate => Self::concat(),
            BranchMergeMethod::Add => Self::add(),
        }
    }

    /// Attaches a name to this operation.
    pub fn named(self, name: impl Into<String>) -> Layer {
        Layer {
            operation: self,
            name: Some(name.into()),
        }
    }

    /// Returns the unique ID of this operation.
    pub fn id(&self) -> OpId {
        match self {
            Self::Convolution { id, .. } => *id,
            Self::Activation { id, .. } => *id,
            Self::Pooling { id, .. } => *id,
            Self::Normalization { id, .. } => *id,
            Self::BatchNorm { id, .. } => *id,
            Self::FullyConnected { id, .. } => *id,
            Self::Flatten { id } => *id,
            Self::Softmax { id, .. } => *id,
            Self::Concat { id } => *id,
            Self::Add { id } => *id,
        }
    }

    /// Short kind name used in summaries and generated layer names.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Convolution { .. } => "convolution",
            Self::Activation { .. } => "activation",
            Self::Pooling { .. } => "pooling",
            Self::Normalization { .. } => "normalization",
            Self::BatchNorm { .. } => "batch_norm",
            Self::FullyConnected { .. } => "fully_connected",
            Self::Flatten { .. } => "flatten",
            Self::Softmax { .. } => "softmax",
            Self::Concat { .. } => "depth_concatenate",
            Self::Add { .. } => "add",
        }
    }

    /// Infers the output shape for the given input shapes.
    pub fn output_shape(
        &self,
        inputs: &[TensorShape],
        layer: &str,
    ) -> Result<TensorShape, GraphError> {
        let Some(&first) = inputs.first() else {
            return Err(GraphError::invalid_layer(layer, "layer has no inputs"));
        };

        match self {
            Self::Convolution {
                kernel_width,
                kernel_height,
                filters,
                pad_stride,
                weights,
                ..
            } => {
                if *filters == 0 {
                    return Err(GraphError::invalid_layer(layer, "filters must be non-zero"));
                }
                if !weights.is_present() {
                    return Err(GraphError::invalid_layer(layer, "convolution needs weights"));
                }
                let (width, height) = window_dimensions(
                    pad_stride,
                    first,
                    *kernel_width,
                    *kernel_height,
                    layer,
                )?;
                Ok(TensorShape::new(width, height, *filters, first.batches))
            }
            Self::Pooling { info, .. } => {
                if info.global {
                    return Ok(TensorShape::new(1, 1, first.channels, first.batches));
                }
                let (width, height) =
                    window_dimensions(&info.pad_stride, first, info.pool_size, info.pool_size, layer)?;
                Ok(TensorShape::new(width, height, first.channels, first.batches))
            }
            Self::Normalization { info, .. } => {
                if info.norm_size == 0 || info.norm_size % 2 == 0 {
                    return Err(GraphError::invalid_layer(
                        layer,
                        "normalization size must be odd",
                    ));
                }
                Ok(first)
            }
            Self::FullyConnected {
                outputs, weights, ..
            } => {
                if *outputs == 0 {
                    return Err(GraphError::invalid_layer(layer, "outputs must be non-zero"));
                }
                if !weights.is_present() {
                    return Err(GraphError::invalid_layer(
                        layer,
                        "fully connected layer needs weights",
                    ));
                }
                Ok(TensorShape::new(1, 1, *outputs, first.batches))
            }
            Self::Flatten { .. } => Ok(TensorShape::new(1, 1, first.item_size(), first.batches)),
            Self::Activation { .. } | Self::BatchNorm { .. } | Self::Softmax { .. } => Ok(first),
            Self::Concat { .. } => {
                let mut channels = 0;
                for shape in inputs {
                    if (shape.width, shape.height, shape.batches)
                        != (first.width, first.height, first.batches)
                    {
                        return Err(GraphError::ShapeMismatch {
                            layer: layer.to_string(),
                            expected: first.with_channels(shape.channels).to_string(),
                            actual: shape.to_string(),
                        });
                    }
                    channels += shape.channels;
                }
                Ok(first.with_channels(channels))
            }
            Self::Add { .. } => {
                if inputs.len() < 2 {
                    return Err(GraphError::invalid_layer(layer, "add requires at least 2 inputs"));
                }
                if let Some(other) = inputs.iter().find(|s| **s != first) {
                    return Err(GraphError::ShapeMismatch {
                        layer: layer.to_string(),
                        expected: first.to_string(),
                        actual: other.to_string(),
                    });
                }
                Ok(first)
            }
        }
    }

    /// Number of parameters this operation holds for the given input shape.
    pub fn parameter_count(&self, input: TensorShape) -> usize {
        match self {
            Self::Convolution {
                kernel_width,
                kernel_height,
                filters,
                bias,
                ..
            } => {
                let weights = kernel_width * kernel_height * input.channels * filters;
                weights + if bias.is_present() { *filters } else { 0 }
            }
            Self::FullyConnected { outputs, bias, .. } => {
                input.item_size() * outputs + if bias.is_present() { *outputs } else { 0 }
            }
            Self::BatchNorm { .. } => 4 * input.channels,
            _ => 0,
        }
    }

    /// Applies this operation to input buffers, returning a new DataBuffer.
    pub fn apply_multi(
        &self,
        inputs: Vec<DataBuffer>,
        name: Option<String>,
    ) -> Result<DataBuffer, GraphError> {
        let shapes: Vec<TensorShape> = inputs.iter().map(|b| b.shape()).collect();
        let label = name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.kind(), self.id()));
        let shape = self.output_shape(&shapes, &label)?;
        Ok(DataBuffer::new(shape, Some(self.clone()), inputs, name))
    }

    /// Applies this operation to a single input buffer.
    pub fn apply(&self, input: DataBuffer, name: Option<String>) -> Result<DataBuffer, GraphError> {
        self.apply_multi(vec![input], name)
    }
}

fn window_dimensions(
    pad_stride: &PadStrideInfo,
    input: TensorShape,
    kernel_width: usize,
    kernel_height: usize,
    layer: &str,
) -> Result<(usize, usize), GraphError> {
    if pad_stride.stride_x == 0 || pad_stride.stride_y == 0 {
        return Err(GraphError::invalid_layer(layer, "stride must be non-zero"));
    }
    pad_stride
        .scaled_dimensions(input.width, input.height, kernel_width, kernel_height)
        .ok_or_else(|| {
            GraphError::invalid_layer(
                layer,
                format!(
                    "{}x{} window does not fit a padded {}x{} input",
                    kernel_width, kernel_height, input.width, input.height
                ),
            )
        })
}

/// An operation together with an optional layer name.
#[derive(Debug, Clone)]
pub struct Layer {
    pub(crate) operation: Operation,
    pub(crate) name: Option<String>,
}

impl Layer {
    /// Returns the operation.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Returns the layer name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl From<Operation> for Layer {
    fn from(operation: Operation) -> Self {
        Self {
            operation,
            name: None,
        }
    }
}
