//! ModelGraph - graph structure without weights.
//!
//! This module contains the non-generic ModelGraph that represents
//! the computation graph structure. Weights are only created when
//! `compile()` is called.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::tensor::backend::Backend;

use super::accessor::{InputAccessor, OutputAccessor};
use super::buffer::{BufferId, DataBuffer, InputBuffer};
use super::config::GraphConfig;
use super::model::CompiledModel;
use super::summary::GraphSummary;
use super::tensor::{TensorDescriptor, TensorShape};
use crate::errors::GraphError;

/// Global counter for unique graph IDs.
static GRAPH_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique identifier for a ModelGraph.
pub type GraphId = usize;

fn next_graph_id() -> GraphId {
    GRAPH_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// ModelGraph represents the computation graph structure without weights.
///
/// Call `compile()` to create a `CompiledModel` with actual weight tensors.
///
/// # Example
///
/// ```
/// use widthnet::graph::{
///     DataType, GraphConfig, InputAccessor, OutputAccessor, PadStrideInfo, Stream,
///     TensorDescriptor, TensorShape, WeightsAccessor, Operation,
/// };
/// use widthnet::layers::Activation;
/// use burn::backend::NdArray;
/// use burn::tensor::backend::Backend;
///
/// let device = <NdArray as Backend>::Device::default();
/// let descriptor = TensorDescriptor::new(TensorShape::new(8, 8, 3, 1), DataType::F32);
///
/// let mut stream = Stream::new("tiny");
/// stream
///     .input(descriptor, InputAccessor::dummy())
///     .add(Operation::convolution(
///         3, 3, 4,
///         WeightsAccessor::Dummy, WeightsAccessor::Dummy,
///         PadStrideInfo::new(1, 1, 1, 1),
///     ))
///     .add(Operation::activation(Activation::Relu))
///     .output(OutputAccessor::Dummy);
/// let graph = stream.into_graph().unwrap();
///
/// // Compile to create weights
/// let model = graph.compile::<NdArray>(&device, &GraphConfig::default()).unwrap();
/// assert_eq!(model.output_shape(), TensorShape::new(8, 8, 4, 1));
/// ```
#[derive(Clone, Debug)]
pub struct ModelGraph {
    id: GraphId,
    name: String,
    input: InputBuffer,
    input_accessor: InputAccessor,
    /// Output buffer (carries the graph structure via its producers)
    output: DataBuffer,
    output_accessor: OutputAccessor,
    /// Produced buffers in execution order
    order: Vec<DataBuffer>,
}

impl ModelGraph {
    /// Creates a new ModelGraph from its input and output buffers.
    ///
    /// Fails if the output depends on a buffer that is neither produced by
    /// an operation nor the registered input.
    pub fn new(
        name: impl Into<String>,
        input: InputBuffer,
        input_accessor: InputAccessor,
        output: DataBuffer,
        output_accessor: OutputAccessor,
    ) -> Result<Self, GraphError> {
        let mut visited = HashSet::new();
        visited.insert(input.id());
        let mut order = Vec::new();
        collect_order(&output, &mut visited, &mut order)?;

        Ok(Self {
            id: next_graph_id(),
            name: name.into(),
            input,
            input_accessor,
            output,
            output_accessor,
            order,
        })
    }

    /// Returns the unique ID of this graph.
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the input buffer.
    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    /// Returns the descriptor of the graph input.
    pub fn descriptor(&self) -> &TensorDescriptor {
        self.input.descriptor()
    }

    pub fn input_accessor(&self) -> &InputAccessor {
        &self.input_accessor
    }

    /// Returns the output buffer.
    pub fn output(&self) -> &DataBuffer {
        &self.output
    }

    /// Returns the logical shape of the graph output.
    pub fn output_shape(&self) -> TensorShape {
        self.output.shape()
    }

    pub fn output_accessor(&self) -> &OutputAccessor {
        &self.output_accessor
    }

    /// Returns the produced buffers in the order they are computed.
    pub fn execution_order(&self) -> &[DataBuffer] {
        &self.order
    }

    /// Returns the number of layers in the graph.
    pub fn layer_count(&self) -> usize {
        self.order.len()
    }

    /// Builds a per-layer summary of this graph.
    pub fn summary(&self) -> GraphSummary {
        GraphSummary::from_graph(self)
    }

    /// Compiles this graph into a CompiledModel with initialized weights.
    ///
    /// This is where the actual weight tensors are created on the specified
    /// device, together with the input tensor.
    pub fn compile<B: Backend>(
        &self,
        device: &B::Device,
        config: &GraphConfig,
    ) -> Result<CompiledModel<B>, GraphError> {
        CompiledModel::new(self.clone(), device, config)
    }
}

/// Post-order walk from `buffer` towards the input.
fn collect_order(
    buffer: &DataBuffer,
    visited: &mut HashSet<BufferId>,
    order: &mut Vec<DataBuffer>,
) -> Result<(), GraphError> {
    if visited.contains(&buffer.id()) {
        return Ok(());
    }
    if buffer.producer().is_none() {
        return Err(GraphError::InvalidGraph(format!(
            "Buffer {} has no producer and is not a registered input",
            buffer.display_name()
        )));
    }

    for input in buffer.inputs() {
        collect_order(input, visited, order)?;
    }

    visited.insert(buffer.id());
    order.push(buffer.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::operation::{BranchMergeMethod, Operation};
    use crate::graph::tensor::DataType;
    use crate::layers::Activation;

    fn input() -> InputBuffer {
        InputBuffer::new(TensorDescriptor::new(
            TensorShape::new(4, 4, 2, 1),
            DataType::F32,
        ))
    }

    #[test]
    fn test_graph_creation() {
        let input = input();
        let hidden = Operation::activation(Activation::Relu)
            .apply(input.buffer(), None)
            .unwrap();
        let output = Operation::flatten().apply(hidden, None).unwrap();
        let graph = ModelGraph::new(
            "test",
            input,
            InputAccessor::dummy(),
            output,
            OutputAccessor::Dummy,
        )
        .unwrap();

        assert_eq!(graph.name(), "test");
        assert_eq!(graph.layer_count(), 2);
        assert_eq!(graph.output_shape(), TensorShape::new(1, 1, 32, 1));
    }

    #[test]
    fn test_shared_buffers_are_visited_once() {
        let input = input();
        let x = input.buffer();
        let a = Operation::activation(Activation::Relu)
            .apply(x.clone(), None)
            .unwrap();
        let merged = Operation::merge(BranchMergeMethod::Add)
            .apply_multi(vec![a.clone(), a, x], None)
            .unwrap();
        let graph = ModelGraph::new(
            "diamond",
            input,
            InputAccessor::dummy(),
            merged,
            OutputAccessor::Dummy,
        )
        .unwrap();

        let kinds: Vec<&str> = graph
            .execution_order()
            .iter()
            .filter_map(|b| b.producer().map(|p| p.kind()))
            .collect();
        assert_eq!(kinds, vec!["activation", "add"]);
    }

    #[test]
    fn test_unregistered_input_is_rejected() {
        let registered = input();
        let stray = input();
        let output = Operation::flatten().apply(stray.buffer(), None).unwrap();
        let result = ModelGraph::new(
            "bad",
            registered,
            InputAccessor::dummy(),
            output,
            OutputAccessor::Dummy,
        );

        assert!(matches!(result, Err(GraphError::InvalidGraph(_))));
    }

    #[test]
    fn test_graph_ids_are_unique() {
        let make = || {
            let input = input();
            let output = Operation::flatten().apply(input.buffer(), None).unwrap();
            ModelGraph::new("g", input, InputAccessor::dummy(), output, OutputAccessor::Dummy)
                .unwrap()
        };
        assert_ne!(make().id(), make().id());
    }
}
