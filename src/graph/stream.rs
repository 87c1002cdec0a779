//! Stream - sequential graph builder with sub-streams and branch merges.
//!
//! A stream appends layers to its current tail. Sub-streams fork from that
//! tail and are merged back with `branch`. The first error is kept and every
//! later call is ignored, so a topology can be written as one long chain
//! and checked once at the end.

use burn::tensor::backend::Backend;
use log::debug;

use super::accessor::{InputAccessor, OutputAccessor};
use super::buffer::{DataBuffer, InputBuffer};
use super::config::GraphConfig;
use super::core::ModelGraph;
use super::model::CompiledModel;
use super::operation::{BranchMergeMethod, Layer, Operation};
use super::tensor::{TensorDescriptor, TensorShape};
use crate::errors::GraphError;

/// Graph builder.
#[derive(Debug)]
pub struct Stream {
    name: String,
    input: Option<(InputBuffer, InputAccessor)>,
    tail: Option<DataBuffer>,
    output: Option<OutputAccessor>,
    error: Option<GraphError>,
}

impl Stream {
    /// Creates an empty stream for the named graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: None,
            tail: None,
            output: None,
            error: None,
        }
    }

    /// Returns the graph name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defines the graph input.
    pub fn input(&mut self, descriptor: TensorDescriptor, accessor: InputAccessor) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        if self.input.is_some() || self.tail.is_some() {
            self.error = Some(GraphError::InvalidGraph(
                "Stream already has an input".to_string(),
            ));
            return self;
        }

        let input = InputBuffer::new(descriptor);
        self.tail = Some(input.buffer());
        self.input = Some((input, accessor));
        self
    }

    /// Appends a layer to the stream.
    pub fn add(&mut self, layer: impl Into<Layer>) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        let Some(tail) = self.tail.take() else {
            self.error = Some(GraphError::NoInputLayer);
            return self;
        };

        let Layer { operation, name } = layer.into();
        match operation.apply(tail, name) {
            Ok(buffer) => {
                debug!("{}: {} -> {}", self.name, buffer.display_name(), buffer.shape());
                self.tail = Some(buffer);
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Forks a sub-stream from the current tail.
    ///
    /// A sub-stream with no layers added is an identity branch.
    pub fn sub_stream(&self) -> Stream {
        Stream {
            name: self.name.clone(),
            input: None,
            tail: self.tail.clone(),
            output: None,
            error: None,
        }
    }

    /// Merges sub-streams into this stream; the merge becomes the new tail.
    pub fn branch(&mut self, method: BranchMergeMethod, sub_streams: Vec<Stream>) -> &mut Self {
        self.branch_named(method, sub_streams, None::<String>)
    }

    /// Same as [`Stream::branch`] with a name for the merge layer.
    pub fn branch_named(
        &mut self,
        method: BranchMergeMethod,
        sub_streams: Vec<Stream>,
        name: Option<impl Into<String>>,
    ) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        if sub_streams.is_empty() {
            self.error = Some(GraphError::InvalidGraph(
                "Branch needs at least one sub-stream".to_string(),
            ));
            return self;
        }

        let mut tails = Vec::with_capacity(sub_streams.len());
        for sub in sub_streams {
            if let Some(e) = sub.error {
                self.error = Some(e);
                return self;
            }
            match sub.tail {
                Some(tail) => tails.push(tail),
                None => {
                    self.error = Some(GraphError::NoInputLayer);
                    return self;
                }
            }
        }

        let merged = if tails.len() == 1 && method == BranchMergeMethod::DepthConcatenate {
            tails.pop().ok_or(GraphError::NoInputLayer)
        } else {
            Operation::merge(method).apply_multi(tails, name.map(Into::into))
        };
        match merged {
            Ok(buffer) => self.tail = Some(buffer),
            Err(e) => self.error = Some(e),
        }
        self
    }

    /// Marks the current tail as the graph output.
    pub fn output(&mut self, accessor: OutputAccessor) -> &mut Self {
        if self.error.is_none() && self.tail.is_none() {
            self.error = Some(GraphError::NoInputLayer);
        }
        self.output = Some(accessor);
        self
    }

    /// Shape of the current tail, if any.
    pub fn tail_shape(&self) -> Option<TensorShape> {
        self.tail.as_ref().map(|t| t.shape())
    }

    /// Returns the first recorded error, if any.
    pub fn error(&self) -> Option<&GraphError> {
        self.error.as_ref()
    }

    /// Converts the stream into a backend-free graph.
    pub fn into_graph(self) -> Result<ModelGraph, GraphError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let Some((input, input_accessor)) = self.input else {
            return Err(GraphError::NoInputLayer);
        };
        let Some(output_accessor) = self.output else {
            return Err(GraphError::InvalidGraph(
                "Stream has no output layer".to_string(),
            ));
        };
        let tail = self.tail.ok_or(GraphError::NoInputLayer)?;

        ModelGraph::new(self.name, input, input_accessor, tail, output_accessor)
    }

    /// Builds the graph and compiles it on the given device.
    pub fn finalize<B: Backend>(
        self,
        device: &B::Device,
        config: &GraphConfig,
    ) -> Result<CompiledModel<B>, GraphError> {
        self.into_graph()?.compile(device, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::accessor::WeightsAccessor;
    use crate::graph::operation::PadStrideInfo;
    use crate::graph::tensor::DataType;
    use crate::layers::Activation;

    fn descriptor(w: usize, c: usize) -> TensorDescriptor {
        TensorDescriptor::new(TensorShape::new(w, w, c, 1), DataType::F32)
    }

    fn conv1x1(filters: usize) -> Operation {
        Operation::convolution(
            1,
            1,
            filters,
            WeightsAccessor::Dummy,
            WeightsAccessor::Dummy,
            PadStrideInfo::new(1, 1, 0, 0),
        )
    }

    #[test]
    fn test_sequential_stream() {
        let mut stream = Stream::new("seq");
        stream
            .input(descriptor(8, 3), InputAccessor::dummy())
            .add(conv1x1(16).named("conv"))
            .add(Operation::activation(Activation::Relu))
            .output(OutputAccessor::Dummy);

        assert_eq!(stream.tail_shape(), Some(TensorShape::new(8, 8, 16, 1)));
        let graph = stream.into_graph().unwrap();
        assert_eq!(graph.layer_count(), 2);
    }

    #[test]
    fn test_depth_concatenate_branch() {
        let mut stream = Stream::new("concat");
        stream.input(descriptor(8, 3), InputAccessor::dummy());

        let mut a = stream.sub_stream();
        a.add(conv1x1(4));
        let mut b = stream.sub_stream();
        b.add(conv1x1(6));
        let identity = stream.sub_stream();

        stream.branch(BranchMergeMethod::DepthConcatenate, vec![a, b, identity]);
        assert_eq!(stream.tail_shape(), Some(TensorShape::new(8, 8, 13, 1)));
    }

    #[test]
    fn test_add_branch_with_identity() {
        let mut stream = Stream::new("residual");
        stream.input(descriptor(4, 8), InputAccessor::dummy());

        let mut residual = stream.sub_stream();
        residual.add(conv1x1(8));
        let identity = stream.sub_stream();

        stream
            .branch_named(BranchMergeMethod::Add, vec![residual, identity], Some("add"))
            .output(OutputAccessor::Dummy);
        let graph = stream.into_graph().unwrap();
        assert_eq!(graph.summary().layer("add").map(|l| l.kind.as_str()), Some("add"));
    }

    #[test]
    fn test_add_branch_shape_mismatch() {
        let mut stream = Stream::new("mismatch");
        stream.input(descriptor(4, 8), InputAccessor::dummy());

        let mut residual = stream.sub_stream();
        residual.add(conv1x1(16));
        let identity = stream.sub_stream();

        stream.branch(BranchMergeMethod::Add, vec![residual, identity]);
        assert!(matches!(stream.error(), Some(GraphError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_add_without_input_records_error() {
        let mut stream = Stream::new("empty");
        stream.add(conv1x1(4)).output(OutputAccessor::Dummy);
        assert!(matches!(stream.into_graph(), Err(GraphError::NoInputLayer)));
    }

    #[test]
    fn test_first_error_is_kept() {
        let mut stream = Stream::new("errors");
        stream
            .input(descriptor(4, 3), InputAccessor::dummy())
            .add(Operation::convolution(
                9,
                9,
                4,
                WeightsAccessor::Dummy,
                WeightsAccessor::Dummy,
                PadStrideInfo::new(1, 1, 0, 0),
            ).named("too_big"))
            .add(Operation::add())
            .output(OutputAccessor::Dummy);

        let err = stream.into_graph().unwrap_err();
        assert!(err.to_string().contains("too_big"));
    }

    #[test]
    fn test_sub_stream_error_propagates() {
        let mut stream = Stream::new("sub_error");
        stream.input(descriptor(4, 3), InputAccessor::dummy());
        let mut bad = stream.sub_stream();
        bad.add(Operation::add());

        stream.branch(BranchMergeMethod::DepthConcatenate, vec![bad]);
        assert!(stream.error().is_some());
    }

    #[test]
    fn test_missing_output_is_rejected() {
        let mut stream = Stream::new("no_output");
        stream.input(descriptor(4, 3), InputAccessor::dummy());
        assert!(matches!(stream.into_graph(), Err(GraphError::InvalidGraph(_))));
    }

    #[test]
    fn test_double_input_is_rejected() {
        let mut stream = Stream::new("two_inputs");
        stream
            .input(descriptor(4, 3), InputAccessor::dummy())
            .input(descriptor(4, 3), InputAccessor::dummy());
        assert!(stream.error().is_some());
    }
}
