//! # widthnet
//!
//! Width-multiplied GoogLeNet, ResNet-50 and VGG16 inference benchmarks.
//!
//! Each topology is declared layer by layer on a [`graph::Stream`], with
//! every channel count scaled by a depth scale and every weight left dummy.
//! The graph is then compiled on a burn backend and run repeatedly to
//! measure inference throughput.
//!
//! ## Features
//!
//! - **Burn Backends**: ndarray on the CPU (`--target neon`) and wgpu on
//!   the GPU (`--target cl`), in f32 or f16.
//! - **Graph API**: streams, sub-streams and branch merges, with shape
//!   inference when a layer is appended.
//! - **Benchmark Protocol**: warm-up runs, device sync, then annotated timed
//!   runs.
//!
//! ## Example
//!
//! ```
//! use widthnet::prelude::*;
//!
//! let descriptor = TensorDescriptor::new(TensorShape::new(224, 224, 3, 1), DataType::F32);
//! let graph = build_graph(&Vgg16, descriptor, 0.125, OutputAccessor::Dummy).unwrap();
//!
//! let summary = graph.summary();
//! assert_eq!(summary.count_kind("convolution"), 13);
//! assert_eq!(summary.output_shape, TensorShape::new(1, 1, 1000, 1));
//! ```

pub mod benchmark;
pub mod errors;
pub mod example;
pub mod graph;
pub mod layers;
pub mod topologies;

// Re-exports for convenience
pub use errors::GraphError;
pub use example::{Topology, run_example};
pub use layers::activation::Activation;

/// CPU backend used for `--target neon`.
pub type CpuBackend = burn::backend::NdArray;

/// GPU backend used for `--target cl`.
pub type GpuBackend = burn::backend::Wgpu;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::benchmark::{BenchmarkProtocol, BenchmarkReport, run_benchmark};
    pub use crate::errors::GraphError;
    pub use crate::example::{CommonGraphParams, Target, Topology, run_example};
    pub use crate::graph::{
        CompiledModel, DataLayout, DataType, GraphConfig, ModelGraph, OutputAccessor, Stream,
        TensorDescriptor, TensorShape,
    };
    pub use crate::layers::activation::Activation;
    pub use crate::topologies::{GoogLeNet, ResNet50, Vgg16, build_graph, scaled};
    pub use crate::{CpuBackend, GpuBackend};
}
