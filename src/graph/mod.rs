//! Graph API for building and running layer graphs.
//!
//! Graphs are described without a device through [`Stream`], checked and
//! shape-inferred into a [`ModelGraph`], then compiled on a burn backend.
//!
//! # Example
//!
//! ```
//! use widthnet::graph::{
//!     BranchMergeMethod, DataType, GraphConfig, InputAccessor, Operation, OutputAccessor,
//!     Stream, TensorDescriptor, TensorShape,
//! };
//! use widthnet::layers::Activation;
//! use burn::backend::NdArray;
//! use burn::tensor::backend::Backend;
//!
//! type TestBackend = NdArray;
//! let device = <TestBackend as Backend>::Device::default();
//!
//! // Describe the graph (no device needed)
//! let mut stream = Stream::new("example");
//! stream.input(
//!     TensorDescriptor::new(TensorShape::new(4, 4, 2, 1), DataType::F32),
//!     InputAccessor::dummy(),
//! );
//! let mut left = stream.sub_stream();
//! left.add(Operation::activation(Activation::Relu));
//! let right = stream.sub_stream();
//! stream
//!     .branch(BranchMergeMethod::DepthConcatenate, vec![left, right])
//!     .output(OutputAccessor::Dummy);
//!
//! // Compile on a device and run once
//! let model = stream.finalize::<TestBackend>(&device, &GraphConfig::default()).unwrap();
//! model.run().unwrap();
//! assert_eq!(model.output_shape(), TensorShape::new(4, 4, 4, 1));
//! ```

mod accessor;
mod buffer;
mod config;
mod core;
mod model;
mod operation;
mod stream;
mod summary;
mod tensor;
mod tuner;

pub use accessor::{
    CaffePreprocessor, InputAccessor, InputFill, OutputAccessor, Prediction, WeightsAccessor,
};
pub use buffer::{BufferId, DataBuffer, InputBuffer};
pub use config::GraphConfig;
pub use self::core::{GraphId, ModelGraph};
pub use model::CompiledModel;
pub use operation::{
    BatchNormAccessors, BranchMergeMethod, DimensionRoundingType, Layer, NormalizationInfo, OpId,
    Operation, PadStrideInfo, PoolingInfo, PoolingType,
};
pub use stream::Stream;
pub use summary::{GraphSummary, LayerSummary};
pub use tensor::{DataLayout, DataType, TensorDescriptor, TensorShape};
pub use tuner::{LayerTiming, TunerProfile, tune};
