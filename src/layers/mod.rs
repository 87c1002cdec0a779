//! Neural network layer implementations.
//!
//! Thin wrappers over burn that execute the graph operations: convolution,
//! pooling, normalization, fully connected and the activation functions.

pub mod activation;
pub mod convolution;
pub mod fully_connected;
pub mod normalization;
pub mod pooling;

pub use activation::Activation;
pub use convolution::{Convolution, ConvolutionConfig};
pub use fully_connected::{FullyConnected, FullyConnectedConfig};
pub use normalization::{BatchNormLayer, LocalResponseNorm};
pub use pooling::Pooling;
