//! Tensor shapes and descriptors.
//!
//! Shapes inside the graph are always logical (width, height, channels,
//! batches). The data layout only matters at the graph boundary, where the
//! input descriptor decides how the caller lays out its tensor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical 4D tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub batches: usize,
}

impl TensorShape {
    /// Creates a shape from width, height, channels and batches.
    pub fn new(width: usize, height: usize, channels: usize, batches: usize) -> Self {
        Self {
            width,
            height,
            channels,
            batches,
        }
    }

    /// Total number of elements.
    pub fn total_size(&self) -> usize {
        self.width * self.height * self.channels * self.batches
    }

    /// Number of elements in a single batch item.
    pub fn item_size(&self) -> usize {
        self.width * self.height * self.channels
    }

    /// Returns the dims in NCHW order, the order burn operates in.
    pub fn nchw(&self) -> [usize; 4] {
        [self.batches, self.channels, self.height, self.width]
    }

    /// Returns the dims ordered for the given layout.
    pub fn dims(&self, layout: DataLayout) -> [usize; 4] {
        match layout {
            DataLayout::Nchw => self.nchw(),
            DataLayout::Nhwc => [self.batches, self.height, self.width, self.channels],
        }
    }

    /// Returns a copy with a different channel count.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{}x{}",
            self.width, self.height, self.channels, self.batches
        )
    }
}

/// Element type requested for the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataType {
    #[default]
    F32,
    F16,
    QAsymm8,
}

impl DataType {
    /// Returns true for quantized asymmetric types.
    pub fn is_quantized_asymmetric(&self) -> bool {
        matches!(self, DataType::QAsymm8)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::F32 => "F32",
            DataType::F16 => "F16",
            DataType::QAsymm8 => "QASYMM8",
        };
        f.write_str(name)
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" => Ok(DataType::F32),
            "f16" => Ok(DataType::F16),
            "qasymm8" => Ok(DataType::QAsymm8),
            other => Err(format!(
                "unknown data type '{}' (expected f32, f16 or qasymm8)",
                other
            )),
        }
    }
}

/// Memory layout of a 4D tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataLayout {
    #[default]
    Nchw,
    Nhwc,
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataLayout::Nchw => "NCHW",
            DataLayout::Nhwc => "NHWC",
        };
        f.write_str(name)
    }
}

impl FromStr for DataLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" => Ok(DataLayout::Nchw),
            "nhwc" => Ok(DataLayout::Nhwc),
            other => Err(format!(
                "unknown data layout '{}' (expected nchw or nhwc)",
                other
            )),
        }
    }
}

/// Describes the tensor fed into a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub shape: TensorShape,
    pub data_type: DataType,
    pub layout: DataLayout,
}

impl TensorDescriptor {
    /// Creates a descriptor with the default (NCHW) layout.
    pub fn new(shape: TensorShape, data_type: DataType) -> Self {
        Self {
            shape,
            data_type,
            layout: DataLayout::default(),
        }
    }

    /// Sets the data layout.
    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Physical dims of the tensor the caller must provide.
    pub fn physical_dims(&self) -> [usize; 4] {
        self.shape.dims(self.layout)
    }
}
