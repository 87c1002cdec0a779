//! DataBuffer and InputBuffer - core graph node types.
//!
//! A DataBuffer is the tensor produced by one layer. It keeps the operation
//! that produced it and the buffers that operation read, so the whole graph
//! hangs off the output buffer. Nodes are shared, so merging branches that
//! fork from a common prefix does not copy that prefix.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::operation::Operation;
use super::tensor::{TensorDescriptor, TensorShape};

/// Global counter for unique buffer IDs.
static BUFFER_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique identifier for a DataBuffer.
pub type BufferId = usize;

/// DataBuffer represents a node in the computation graph.
#[derive(Clone, Debug)]
pub struct DataBuffer {
    node: Arc<BufferNode>,
}

#[derive(Debug)]
struct BufferNode {
    id: BufferId,
    shape: TensorShape,
    producer: Option<Operation>,
    inputs: Vec<DataBuffer>,
    name: Option<String>,
}

impl DataBuffer {
    pub(crate) fn new(
        shape: TensorShape,
        producer: Option<Operation>,
        inputs: Vec<DataBuffer>,
        name: Option<String>,
    ) -> Self {
        Self {
            node: Arc::new(BufferNode {
                id: BUFFER_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
                shape,
                producer,
                inputs,
                name,
            }),
        }
    }

    /// Returns the unique ID of this buffer.
    pub fn id(&self) -> BufferId {
        self.node.id
    }

    /// Returns the logical shape of this buffer.
    pub fn shape(&self) -> TensorShape {
        self.node.shape
    }

    /// Returns true if this is an input buffer (no producer).
    pub fn is_input(&self) -> bool {
        self.node.producer.is_none()
    }

    /// Returns the producer operation, if any.
    pub fn producer(&self) -> Option<&Operation> {
        self.node.producer.as_ref()
    }

    /// Returns the input buffers.
    pub fn inputs(&self) -> &[DataBuffer] {
        &self.node.inputs
    }

    /// Returns the layer name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.node.name.as_deref()
    }

    /// Returns the layer name, or a generated one based on the producer.
    pub fn display_name(&self) -> String {
        match (&self.node.name, &self.node.producer) {
            (Some(name), _) => name.clone(),
            (None, Some(op)) => format!("{}_{}", op.kind(), op.id()),
            (None, None) => "input".to_string(),
        }
    }
}

/// InputBuffer represents the input of the computation graph.
#[derive(Clone, Debug)]
pub struct InputBuffer {
    buffer: DataBuffer,
    descriptor: TensorDescriptor,
}

impl InputBuffer {
    /// Creates a new InputBuffer for the given descriptor.
    pub fn new(descriptor: TensorDescriptor) -> Self {
        Self {
            buffer: DataBuffer::new(descriptor.shape, None, vec![], Some("input".to_string())),
            descriptor,
        }
    }

    /// Returns the DataBuffer for use in graph building.
    pub fn buffer(&self) -> DataBuffer {
        self.buffer.clone()
    }

    /// Returns the descriptor of this input.
    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    /// Returns the logical shape of this input.
    pub fn shape(&self) -> TensorShape {
        self.descriptor.shape
    }

    /// Returns the buffer ID.
    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tensor::DataType;

    fn descriptor() -> TensorDescriptor {
        TensorDescriptor::new(TensorShape::new(8, 8, 3, 1), DataType::F32)
    }

    #[test]
    fn test_input_buffer_creation() {
        let input = InputBuffer::new(descriptor());
        assert_eq!(input.shape(), TensorShape::new(8, 8, 3, 1));
        assert!(input.buffer().is_input());
        assert_eq!(input.buffer().display_name(), "input");
    }

    #[test]
    fn test_buffer_ids_are_unique() {
        let input1 = InputBuffer::new(descriptor());
        let input2 = InputBuffer::new(descriptor());
        assert_ne!(input1.id(), input2.id());
    }

    #[test]
    fn test_data_buffer_clone_keeps_id() {
        let input = InputBuffer::new(descriptor());
        let buf1 = input.buffer();
        let buf2 = input.buffer();
        assert_eq!(buf1.id(), buf2.id());
    }
}
