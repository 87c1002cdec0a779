//! Example harness shared by the topology binaries.
//!
//! Parses the common command line, rejects configurations a topology does
//! not support, builds the graph on the backend picked by target and data
//! type, then runs the benchmark protocol.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::{NdArray, Wgpu};
use burn::tensor::backend::Backend;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use log::{info, warn};

use crate::benchmark::{BenchmarkProtocol, BenchmarkReport, run_benchmark};
use crate::errors::GraphError;
use crate::graph::{
    DataLayout, DataType, GraphConfig, OutputAccessor, Stream, TensorDescriptor, TensorShape,
};
use crate::topologies::build_graph;

/// Number of predictions reported when a labels file is given.
const TOP_N: usize = 5;

/// Device family the graph runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Target {
    /// CPU, through the ndarray backend
    #[default]
    Neon,
    /// GPU, through the wgpu backend
    Cl,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Neon => f.write_str("NEON"),
            Target::Cl => f.write_str("CL"),
        }
    }
}

fn parse_depth_scale(s: &str) -> Result<f32, String> {
    let scale: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(format!("depth scale must be a positive number, got {}", s))
    }
}

/// Command line options common to every topology binary.
#[derive(Debug, Clone, Parser)]
#[command(about = "Width-multiplied CNN graph benchmark", long_about = None)]
pub struct CommonGraphOptions {
    /// Number of CPU threads
    #[arg(long, default_value_t = 1)]
    pub threads: usize,

    /// Target device
    #[arg(long, value_enum, default_value_t = Target::Neon)]
    pub target: Target,

    /// Data type: f32, f16 or qasymm8
    #[arg(long = "type", value_name = "TYPE", default_value = "f32")]
    pub data_type: DataType,

    /// Data layout: nchw or nhwc
    #[arg(long, default_value = "nchw")]
    pub layout: DataLayout,

    /// Run a per-layer profiling pass when the graph is finalized
    #[arg(long)]
    pub enable_tuner: bool,

    /// File the profiling pass writes its results to
    #[arg(long, value_name = "PATH")]
    pub tuner_file: Option<PathBuf>,

    /// Labels file, one label per line; enables top-5 output
    #[arg(long, value_name = "PATH")]
    pub labels: Option<PathBuf>,

    /// Warm-up iterations before timing
    #[arg(long, default_value_t = 10)]
    pub warmup: usize,

    /// Timed iterations
    #[arg(long, default_value_t = 20)]
    pub iterations: usize,

    /// Overrides the topology's width multiplier
    #[arg(long, value_parser = parse_depth_scale)]
    pub depth_scale: Option<f32>,
}

/// Resolved parameters of one example run.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonGraphParams {
    pub threads: usize,
    pub target: Target,
    pub data_type: DataType,
    pub data_layout: DataLayout,
    pub enable_tuner: bool,
    pub tuner_file: Option<PathBuf>,
    pub labels: Option<PathBuf>,
    pub depth_scale: f32,
    pub protocol: BenchmarkProtocol,
}

impl CommonGraphParams {
    /// Resolves options against a topology's defaults.
    pub fn from_options<T: Topology + ?Sized>(options: CommonGraphOptions, topology: &T) -> Self {
        Self {
            threads: options.threads,
            target: options.target,
            data_type: options.data_type,
            data_layout: options.layout,
            enable_tuner: options.enable_tuner,
            tuner_file: options.tuner_file,
            labels: options.labels,
            depth_scale: options
                .depth_scale
                .unwrap_or_else(|| topology.default_depth_scale()),
            protocol: BenchmarkProtocol::new()
                .warmup_iterations(options.warmup)
                .timed_iterations(options.iterations),
        }
    }

    /// Default parameters for a topology.
    pub fn for_topology<T: Topology + ?Sized>(topology: &T) -> Self {
        Self::from_options(CommonGraphOptions::parse_from([topology.name()]), topology)
    }

    /// Descriptor of the 224x224 RGB graph input.
    pub fn input_descriptor(&self) -> TensorDescriptor {
        TensorDescriptor::new(TensorShape::new(224, 224, 3, 1), self.data_type)
            .with_layout(self.data_layout)
    }

    /// Finalization settings.
    pub fn graph_config(&self) -> GraphConfig {
        let mut config = GraphConfig::new()
            .num_threads(self.threads)
            .use_tuner(self.enable_tuner);
        if let Some(path) = &self.tuner_file {
            config = config.tuner_file(path);
        }
        config
    }

    /// Top-5 accessor when a labels file is given, otherwise a dummy.
    pub fn output_accessor(&self) -> Result<OutputAccessor, GraphError> {
        match &self.labels {
            Some(path) => OutputAccessor::from_labels_file(path, TOP_N),
            None => Ok(OutputAccessor::Dummy),
        }
    }
}

impl fmt::Display for CommonGraphParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        writeln!(f, "Threads : {}", self.threads)?;
        writeln!(f, "Target : {}", self.target)?;
        writeln!(f, "Data type : {}", self.data_type)?;
        writeln!(f, "Data layout : {}", self.data_layout)?;
        writeln!(f, "Tuner enabled? : {}", self.enable_tuner)?;
        writeln!(f, "Tuner file : {}", path(&self.tuner_file))?;
        writeln!(f, "Labels file : {}", path(&self.labels))?;
        writeln!(f, "Depth scale : {}", self.depth_scale)?;
        writeln!(f, "Warm-up iterations : {}", self.protocol.warmup_iterations)?;
        write!(f, "Timed iterations : {}", self.protocol.timed_iterations)
    }
}

/// A network topology the harness can build and benchmark.
pub trait Topology {
    /// Graph name.
    fn name(&self) -> &'static str;

    /// Width multiplier used when none is given on the command line.
    fn default_depth_scale(&self) -> f32;

    /// Per-channel mean subtracted from the input image.
    fn mean_rgb(&self) -> [f32; 3];

    /// Whether the input image is converted to BGR.
    fn bgr(&self) -> bool {
        true
    }

    /// Rejects unsupported configurations before any graph is built.
    fn validate(&self, params: &CommonGraphParams) -> Result<(), GraphError> {
        if params.data_type.is_quantized_asymmetric() {
            return Err(GraphError::unsupported("QASYMM8 not supported for this graph"));
        }
        if params.data_type == DataType::F16 && params.target == Target::Neon {
            return Err(GraphError::unsupported("F16 NEON not supported for this graph"));
        }
        Ok(())
    }

    /// Appends the topology's layers to a stream that already has its input.
    fn build(&self, stream: &mut Stream, depth_scale: f32);
}

/// Runs a topology with the given command line.
///
/// Returns `Ok(None)` when help was requested; nothing is built then.
pub fn run_example<T, I, S>(topology: &T, args: I) -> Result<Option<BenchmarkReport>, GraphError>
where
    T: Topology + ?Sized,
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let options = match CommonGraphOptions::try_parse_from(args) {
        Ok(options) => options,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let params = CommonGraphParams::from_options(options, topology);
    topology.validate(&params)?;
    info!("{} parameters:\n{}", topology.name(), params);

    let report = match (params.target, params.data_type) {
        (Target::Neon, DataType::F32) => {
            params.graph_config().init_cpu_pool();
            execute::<NdArray, T>(topology, &params, &NdArrayDevice::Cpu)?
        }
        (Target::Cl, DataType::F32) => {
            warn_ignored_threads(&params);
            execute::<Wgpu, T>(topology, &params, &WgpuDevice::default())?
        }
        (Target::Cl, DataType::F16) => {
            warn_ignored_threads(&params);
            execute::<Wgpu<half::f16>, T>(topology, &params, &WgpuDevice::default())?
        }
        (target, data_type) => {
            return Err(GraphError::unsupported(format!(
                "{} {} not supported for this graph",
                data_type, target
            )));
        }
    };

    Ok(Some(report))
}

fn warn_ignored_threads(params: &CommonGraphParams) {
    if params.threads > 1 {
        warn!("--threads {} is ignored on {}", params.threads, params.target);
    }
}

fn execute<B: Backend, T: Topology + ?Sized>(
    topology: &T,
    params: &CommonGraphParams,
    device: &B::Device,
) -> Result<BenchmarkReport, GraphError> {
    let graph = build_graph(
        topology,
        params.input_descriptor(),
        params.depth_scale,
        params.output_accessor()?,
    )?;
    let mut model = graph.compile::<B>(device, &params.graph_config())?;
    model.log_setup();

    let report = run_benchmark(&mut model, params.protocol)?;
    report.log();
    Ok(report)
}
