//! Graph construction and execution error types.

use thiserror::Error;

/// Errors that can occur while building, compiling or running a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph has no input layer defined")]
    NoInputLayer,

    #[error("Invalid configuration for layer {layer}: {message}")]
    InvalidLayerConfig { layer: String, message: String },

    #[error("Shape mismatch in layer {layer}: expected {expected}, got {actual}")]
    ShapeMismatch {
        layer: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("{0}")]
    UnsupportedConfiguration(String),

    #[error("Failed to parse command line arguments: {0}")]
    Arguments(#[from] clap::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tensor data error: {0}")]
    Data(String),
}

impl GraphError {
    /// Creates an invalid layer configuration error.
    pub fn invalid_layer(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLayerConfig {
            layer: layer.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported configuration error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_is_verbatim() {
        let err = GraphError::unsupported("QASYMM8 not supported for this graph");
        assert_eq!(err.to_string(), "QASYMM8 not supported for this graph");
    }

    #[test]
    fn test_invalid_layer_message() {
        let err = GraphError::invalid_layer("conv1", "stride must be non-zero");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for layer conv1: stride must be non-zero"
        );
    }
}
