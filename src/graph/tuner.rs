//! Tuner pass: times every step of a compiled graph once and optionally
//! stores the timings as JSON.

use std::path::Path;

use burn::tensor::backend::Backend;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::model::CompiledModel;
use crate::errors::GraphError;

/// Timing of a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerTiming {
    pub name: String,
    pub kind: String,
    pub micros: f64,
}

/// Per-layer timings recorded by the tuner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerProfile {
    pub graph: String,
    pub layers: Vec<LayerTiming>,
    pub total_micros: f64,
}

impl TunerProfile {
    /// Returns the `n` slowest layers, slowest first.
    pub fn slowest(&self, n: usize) -> Vec<&LayerTiming> {
        let mut layers: Vec<&LayerTiming> = self.layers.iter().collect();
        layers.sort_by(|a, b| b.micros.total_cmp(&a.micros));
        layers.truncate(n);
        layers
    }

    /// Writes the profile as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads a profile written by [`TunerProfile::save`].
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Runs one profiled forward pass and records the time of every step.
pub fn tune<B: Backend>(
    model: &CompiledModel<B>,
    tuner_file: Option<&Path>,
) -> Result<TunerProfile, GraphError> {
    info!("Tuning graph {}", model.graph().name());
    let (_, timings) = model.forward_profiled(model.input().clone())?;

    let layers: Vec<LayerTiming> = model
        .step_labels()
        .iter()
        .zip(timings)
        .map(|((name, kind), elapsed)| LayerTiming {
            name: name.clone(),
            kind: kind.to_string(),
            micros: elapsed.as_secs_f64() * 1e6,
        })
        .collect();
    let profile = TunerProfile {
        graph: model.graph().name().to_string(),
        total_micros: layers.iter().map(|l| l.micros).sum(),
        layers,
    };

    info!(
        "Tuner: {} layers, {:.1} us total",
        profile.layers.len(),
        profile.total_micros
    );
    for layer in profile.slowest(5) {
        info!("  {:<40} {:<18} {:>10.1} us", layer.name, layer.kind, layer.micros);
    }

    if let Some(path) = tuner_file {
        if path.exists() {
            warn!("Overwriting tuner file {}", path.display());
        }
        profile.save(path)?;
        info!("Tuner results written to {}", path.display());
    }

    Ok(profile)
}
