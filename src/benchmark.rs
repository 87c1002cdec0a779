//! Benchmark protocol: warm-up runs, then timed runs bounded by device
//! synchronization and profiling annotations.

use std::fmt;
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use log::{debug, info};
use serde::Serialize;

use crate::errors::GraphError;
use crate::graph::CompiledModel;

/// Annotation emitted right before the timed loop.
pub const RUN_START: &str = "graph-run-start";
/// Annotation emitted right after the timed loop.
pub const RUN_END: &str = "graph-run-end";

/// Something the benchmark can run and synchronize.
pub trait BenchmarkTarget {
    fn name(&self) -> &str;

    /// Executes the graph once.
    fn run_once(&mut self) -> Result<(), GraphError>;

    /// Waits for all queued work to finish.
    fn sync(&mut self);
}

impl<B: Backend> BenchmarkTarget for CompiledModel<B> {
    fn name(&self) -> &str {
        self.graph().name()
    }

    fn run_once(&mut self) -> Result<(), GraphError> {
        self.run().map(|_| ())
    }

    fn sync(&mut self) {
        CompiledModel::sync(self);
    }
}

/// Iteration counts of a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BenchmarkProtocol {
    pub warmup_iterations: usize,
    pub timed_iterations: usize,
}

impl Default for BenchmarkProtocol {
    fn default() -> Self {
        Self {
            warmup_iterations: 10,
            timed_iterations: 20,
        }
    }
}

impl BenchmarkProtocol {
    /// Creates a protocol with the default counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of warm-up runs.
    pub fn warmup_iterations(mut self, iterations: usize) -> Self {
        self.warmup_iterations = iterations;
        self
    }

    /// Sets the number of timed runs.
    pub fn timed_iterations(mut self, iterations: usize) -> Self {
        self.timed_iterations = iterations;
        self
    }
}

/// A named point in time of a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub label: String,
    /// Offset from the start of the benchmark
    pub at: Duration,
}

/// Collects annotations relative to a fixed origin.
#[derive(Debug)]
pub struct Annotations {
    origin: Instant,
    marks: Vec<Annotation>,
}

impl Annotations {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            marks: Vec::new(),
        }
    }

    /// Records and logs an annotation.
    pub fn annotate(&mut self, label: &str) {
        let at = self.origin.elapsed();
        info!("Annotation {} at {:.6}s", label, at.as_secs_f64());
        self.marks.push(Annotation {
            label: label.to_string(),
            at,
        });
    }

    pub fn into_vec(self) -> Vec<Annotation> {
        self.marks
    }
}

impl Default for Annotations {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a benchmark run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub graph: String,
    pub protocol: BenchmarkProtocol,
    /// Time between the start and end annotations
    pub total: Duration,
    pub annotations: Vec<Annotation>,
}

impl BenchmarkReport {
    /// Mean duration of one timed run.
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.protocol.timed_iterations) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total / n,
        }
    }

    /// Timed runs per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 {
            self.protocol.timed_iterations as f64 / secs
        } else {
            0.0
        }
    }

    /// Logs the report.
    pub fn log(&self) {
        info!("{}", self);
        info!(
            "{} runs, mean {:.3?} per run, {:.2} runs/s",
            self.protocol.timed_iterations,
            self.mean(),
            self.throughput()
        );
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time spent: {:.6}s", self.total.as_secs_f64())
    }
}

/// Runs the benchmark protocol against a target.
///
/// Any failed run aborts the benchmark.
pub fn run_benchmark<T: BenchmarkTarget>(
    target: &mut T,
    protocol: BenchmarkProtocol,
) -> Result<BenchmarkReport, GraphError> {
    let mut annotations = Annotations::new();

    info!(
        "Running {} warm-up and {} timed iterations of {}",
        protocol.warmup_iterations,
        protocol.timed_iterations,
        target.name()
    );
    for i in 0..protocol.warmup_iterations {
        debug!("warm-up {}", i);
        target.run_once()?;
    }
    target.sync();

    annotations.annotate(RUN_START);
    let start = Instant::now();
    for i in 0..protocol.timed_iterations {
        debug!("timed run {}", i);
        target.run_once()?;
    }
    target.sync();
    let total = start.elapsed();
    annotations.annotate(RUN_END);

    Ok(BenchmarkReport {
        graph: target.name().to_string(),
        protocol,
        total,
        annotations: annotations.into_vec(),
    })
}
