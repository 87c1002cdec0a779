//! Accessors: where a graph's weights, input and output data come from.
//!
//! No trained weights are ever loaded. Weight accessors only decide whether
//! a parameter tensor is zero-filled, left at burn's default initialization
//! or absent altogether.

use std::path::Path;

use burn::nn::Initializer;
use burn::tensor::{Distribution, Tensor, backend::Backend};
use log::info;

use super::tensor::{DataLayout, TensorDescriptor};
use crate::errors::GraphError;

/// Source of a layer's parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightsAccessor {
    /// Zero-filled placeholder standing in for a trained tensor.
    #[default]
    Dummy,
    /// burn's default initializer for the layer.
    Random,
    /// No tensor at all (e.g. a convolution without bias).
    None,
}

impl WeightsAccessor {
    /// Returns true unless the tensor is absent.
    pub fn is_present(&self) -> bool {
        !matches!(self, WeightsAccessor::None)
    }

    /// Initializer override for burn layer configs.
    ///
    /// `None` keeps whatever the config would use by default.
    pub fn initializer(&self) -> Option<Initializer> {
        match self {
            WeightsAccessor::Dummy => Some(Initializer::Zeros),
            WeightsAccessor::Random | WeightsAccessor::None => None,
        }
    }

    /// Applies this accessor to an already initialized tensor.
    pub fn fill<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            WeightsAccessor::Dummy => tensor.zeros_like(),
            WeightsAccessor::Random | WeightsAccessor::None => tensor,
        }
    }
}

/// Caffe-style image preprocessing: optional RGB to BGR swap followed by
/// per-channel mean subtraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaffePreprocessor {
    mean_rgb: [f32; 3],
    bgr: bool,
}

impl CaffePreprocessor {
    /// Creates a preprocessor that converts to BGR.
    pub fn new(mean_rgb: [f32; 3]) -> Self {
        Self {
            mean_rgb,
            bgr: true,
        }
    }

    /// Sets whether the image is converted to BGR.
    pub fn with_bgr(mut self, bgr: bool) -> Self {
        self.bgr = bgr;
        self
    }

    /// Returns the mean values in the channel order of the processed image.
    pub fn channel_mean(&self) -> [f32; 3] {
        let [r, g, b] = self.mean_rgb;
        if self.bgr { [b, g, r] } else { [r, g, b] }
    }

    /// Preprocesses an RGB image in NCHW order.
    pub fn preprocess<B: Backend>(&self, image: Tensor<B, 4>) -> Result<Tensor<B, 4>, GraphError> {
        let [_, channels, _, _] = image.dims();
        if channels != 3 {
            return Err(GraphError::InvalidGraph(format!(
                "Caffe preprocessing expects 3 channels, got {}",
                channels
            )));
        }

        let device = image.device();
        let image = if self.bgr { image.flip([1]) } else { image };
        let mean = Tensor::<B, 1>::from_floats(self.channel_mean().as_slice(), &device)
            .reshape([1, 3, 1, 1]);

        Ok(image.sub(mean))
    }
}

/// How the synthetic input tensor is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFill {
    Zeros,
    Uniform { low: f64, high: f64 },
}

/// Source of the graph's input tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct InputAccessor {
    fill: InputFill,
    preprocessor: Option<CaffePreprocessor>,
}

impl InputAccessor {
    /// Zero-filled input with no preprocessing.
    pub fn dummy() -> Self {
        Self {
            fill: InputFill::Zeros,
            preprocessor: None,
        }
    }

    /// Random 8-bit-range image data passed through the given preprocessor.
    pub fn synthetic_image(preprocessor: CaffePreprocessor) -> Self {
        Self {
            fill: InputFill::Uniform {
                low: 0.0,
                high: 255.0,
            },
            preprocessor: Some(preprocessor),
        }
    }

    /// Returns the preprocessor, if any.
    pub fn preprocessor(&self) -> Option<&CaffePreprocessor> {
        self.preprocessor.as_ref()
    }

    /// Generates the input tensor in the descriptor's layout.
    pub fn generate<B: Backend>(
        &self,
        descriptor: &TensorDescriptor,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>, GraphError> {
        let dims = descriptor.shape.nchw();
        let image = match self.fill {
            InputFill::Zeros => Tensor::<B, 4>::zeros(dims, device),
            InputFill::Uniform { low, high } => {
                Tensor::<B, 4>::random(dims, Distribution::Uniform(low, high), device)
            }
        };

        let image = match &self.preprocessor {
            Some(preprocessor) => preprocessor.preprocess(image)?,
            None => image,
        };

        Ok(match descriptor.layout {
            DataLayout::Nchw => image,
            DataLayout::Nhwc => image.permute([0, 2, 3, 1]),
        })
    }
}

impl Default for InputAccessor {
    fn default() -> Self {
        Self::dummy()
    }
}

/// A single classification result.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class: usize,
    pub label: Option<String>,
    pub probability: f32,
}

/// Consumer of the graph's output tensor.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OutputAccessor {
    /// Discards the output.
    #[default]
    Dummy,
    /// Logs the `n` most probable classes of the first batch item.
    TopN { n: usize, labels: Vec<String> },
}

impl OutputAccessor {
    /// Creates a top-N accessor with the given labels.
    pub fn top_n(n: usize, labels: Vec<String>) -> Self {
        Self::TopN { n, labels }
    }

    /// Creates a top-N accessor reading one label per line from a file.
    pub fn from_labels_file(path: impl AsRef<Path>, n: usize) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        let labels = content.lines().map(|l| l.trim().to_string()).collect();
        Ok(Self::top_n(n, labels))
    }

    /// Consumes an output tensor, returning the predictions it reported.
    pub fn access<B: Backend>(&self, output: &Tensor<B, 4>) -> Result<Vec<Prediction>, GraphError> {
        let OutputAccessor::TopN { n, labels } = self else {
            return Ok(Vec::new());
        };

        let [_, channels, height, width] = output.dims();
        let item_size = channels * height * width;
        let scores: Vec<f32> = output
            .to_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| GraphError::Data(format!("{:?}", e)))?;

        let mut ranked: Vec<(usize, f32)> =
            scores.into_iter().take(item_size).enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let predictions: Vec<Prediction> = ranked
            .into_iter()
            .take(*n)
            .map(|(class, probability)| Prediction {
                class,
                label: labels.get(class).cloned(),
                probability,
            })
            .collect();

        info!("---------- Top {} predictions ----------", n);
        for p in &predictions {
            info!(
                "{:.4} - [id = {}], {}",
                p.probability,
                p.class,
                p.label.as_deref().unwrap_or("")
            );
        }

        Ok(predictions)
    }
}
