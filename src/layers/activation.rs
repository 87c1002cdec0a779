//! Activation functions for activation layers.

use burn::tensor::{Tensor, backend::Backend};
use serde::{Deserialize, Serialize};

/// Supported activation functions.
///
/// Parameterised variants carry their bounds or coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Activation {
    /// No activation (identity function).
    #[default]
    Identity,
    /// Rectified Linear Unit: f(x) = max(0, x)
    Relu,
    /// f(x) = min(upper, max(0, x))
    BoundedRelu { upper: f32 },
    /// f(x) = min(upper, max(lower, x))
    LuBoundedRelu { upper: f32, lower: f32 },
    /// f(x) = x for x > 0, else slope * x
    LeakyRelu { slope: f32 },
    /// Logistic sigmoid: f(x) = 1 / (1 + exp(-x))
    Logistic,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// f(x) = ln(1 + exp(x))
    SoftRelu,
    /// f(x) = |x|
    Abs,
    /// f(x) = x^2
    Square,
    /// f(x) = sqrt(x)
    Sqrt,
    /// f(x) = a * x + b
    Linear { a: f32, b: f32 },
}

impl Activation {
    /// Applies the activation function to a tensor.
    pub fn apply<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match *self {
            Activation::Identity => tensor,
            Activation::Relu => burn::tensor::activation::relu(tensor),
            Activation::BoundedRelu { upper } => tensor.clamp(0.0, upper),
            Activation::LuBoundedRelu { upper, lower } => tensor.clamp(lower, upper),
            Activation::LeakyRelu { slope } => {
                burn::tensor::activation::leaky_relu(tensor, slope as f64)
            }
            Activation::Logistic => burn::tensor::activation::sigmoid(tensor),
            Activation::Tanh => burn::tensor::activation::tanh(tensor),
            Activation::SoftRelu => burn::tensor::activation::softplus(tensor, 1.0),
            Activation::Abs => tensor.abs(),
            Activation::Square => tensor.powf_scalar(2.0),
            Activation::Sqrt => tensor.sqrt(),
            Activation::Linear { a, b } => tensor.mul_scalar(a).add_scalar(b),
        }
    }

    /// Returns the upper-case name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Identity => "IDENTITY",
            Activation::Relu => "RELU",
            Activation::BoundedRelu { .. } => "BOUNDED_RELU",
            Activation::LuBoundedRelu { .. } => "LU_BOUNDED_RELU",
            Activation::LeakyRelu { .. } => "LEAKY_RELU",
            Activation::Logistic => "LOGISTIC",
            Activation::Tanh => "TANH",
            Activation::SoftRelu => "SOFT_RELU",
            Activation::Abs => "ABS",
            Activation::Square => "SQUARE",
            Activation::Sqrt => "SQRT",
            Activation::Linear { .. } => "LINEAR",
        }
    }
}
