//! Per-layer graph summary, logged when a graph is set up.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::core::ModelGraph;
use super::tensor::TensorShape;
use crate::errors::GraphError;

/// One row of the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub index: usize,
    pub name: String,
    pub kind: String,
    pub output_shape: TensorShape,
    pub parameters: usize,
}

/// Layer-by-layer description of a graph in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub name: String,
    pub input_shape: TensorShape,
    pub output_shape: TensorShape,
    pub layers: Vec<LayerSummary>,
    pub total_parameters: usize,
}

impl GraphSummary {
    /// Walks the graph in execution order.
    pub fn from_graph(graph: &ModelGraph) -> Self {
        let layers: Vec<LayerSummary> = graph
            .execution_order()
            .iter()
            .enumerate()
            .filter_map(|(index, buffer)| {
                let producer = buffer.producer()?;
                let input_shape = buffer.inputs().first()?.shape();
                Some(LayerSummary {
                    index,
                    name: buffer.display_name(),
                    kind: producer.kind().to_string(),
                    output_shape: buffer.shape(),
                    parameters: producer.parameter_count(input_shape),
                })
            })
            .collect();

        Self {
            name: graph.name().to_string(),
            input_shape: graph.input().shape(),
            output_shape: graph.output_shape(),
            total_parameters: layers.iter().map(|l| l.parameters).sum(),
            layers,
        }
    }

    /// Finds a layer by name.
    pub fn layer(&self, name: &str) -> Option<&LayerSummary> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Number of layers of the given kind.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.layers.iter().filter(|l| l.kind == kind).count()
    }

    /// Logs totals at info level and each layer at debug level.
    pub fn log(&self) {
        info!(
            "Graph {}: {} layers, input {}, output {}, {} parameters",
            self.name,
            self.layers.len(),
            self.input_shape,
            self.output_shape,
            self.total_parameters
        );
        for layer in &self.layers {
            debug!(
                "  [{:>3}] {:<40} {:<18} {:<16} {}",
                layer.index, layer.name, layer.kind, layer.output_shape, layer.parameters
            );
        }
    }

    /// Serializes the summary as pretty JSON.
    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::accessor::{InputAccessor, OutputAccessor, WeightsAccessor};
    use crate::graph::buffer::InputBuffer;
    use crate::graph::operation::{Operation, PadStrideInfo};
    use crate::graph::tensor::{DataType, TensorDescriptor};
    use crate::layers::Activation;

    fn graph() -> ModelGraph {
        let input = InputBuffer::new(TensorDescriptor::new(
            TensorShape::new(8, 8, 3, 1),
            DataType::F32,
        ));
        let conv = Operation::convolution(
            3,
            3,
            4,
            WeightsAccessor::Dummy,
            WeightsAccessor::Dummy,
            PadStrideInfo::new(1, 1, 1, 1),
        )
        .apply(input.buffer(), Some("conv1".to_string()))
        .unwrap();
        let relu = Operation::activation(Activation::Relu)
            .apply(conv, Some("conv1/relu".to_string()))
            .unwrap();
        let fc = Operation::fully_connected(10, WeightsAccessor::Dummy, WeightsAccessor::Dummy)
            .apply(relu, Some("fc".to_string()))
            .unwrap();
        ModelGraph::new("summary", input, InputAccessor::dummy(), fc, OutputAccessor::Dummy)
            .unwrap()
    }

    #[test]
    fn test_summary_layers() {
        let summary = graph().summary();

        assert_eq!(summary.layers.len(), 3);
        assert_eq!(summary.count_kind("activation"), 1);

        let conv = summary.layer("conv1").unwrap();
        assert_eq!(conv.kind, "convolution");
        assert_eq!(conv.output_shape, TensorShape::new(8, 8, 4, 1));
        assert_eq!(conv.parameters, 3 * 3 * 3 * 4 + 4);

        let fc = summary.layer("fc").unwrap();
        assert_eq!(fc.parameters, 8 * 8 * 4 * 10 + 10);
        assert_eq!(summary.total_parameters, conv.parameters + fc.parameters);
    }

    #[test]
    fn test_summary_json() {
        let summary = graph().summary();
        let json = summary.to_json().unwrap();
        let parsed: GraphSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, summary);
        assert!(json.contains("\"conv1/relu\""));
    }
}
