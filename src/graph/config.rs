//! Graph finalization configuration.

use std::path::PathBuf;

use log::{debug, warn};

/// Options applied when a graph is finalized on a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    /// CPU worker threads; 0 leaves the pool at its default size.
    pub num_threads: usize,
    /// Run a per-layer profiling pass at finalize time.
    pub use_tuner: bool,
    /// Where the profiling results are written.
    pub tuner_file: Option<PathBuf>,
}

impl GraphConfig {
    /// Creates a new GraphConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of CPU threads.
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Enables or disables the tuner pass.
    pub fn use_tuner(mut self, enabled: bool) -> Self {
        self.use_tuner = enabled;
        self
    }

    /// Sets the tuner output file.
    pub fn tuner_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tuner_file = Some(path.into());
        self
    }

    /// Sizes the global rayon pool the CPU backend runs on.
    ///
    /// Returns false when the pool was already initialized; the setting is
    /// then ignored.
    pub fn init_cpu_pool(&self) -> bool {
        if self.num_threads == 0 {
            return true;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build_global()
        {
            Ok(()) => {
                debug!("Using {} CPU threads", self.num_threads);
                true
            }
            Err(e) => {
                warn!("Could not set CPU threads to {}: {}", self.num_threads, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.num_threads, 0);
        assert!(!config.use_tuner);
        assert!(config.tuner_file.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = GraphConfig::new()
            .num_threads(4)
            .use_tuner(true)
            .tuner_file("tuner.json");

        assert_eq!(config.num_threads, 4);
        assert!(config.use_tuner);
        assert_eq!(config.tuner_file, Some(PathBuf::from("tuner.json")));
    }

    #[test]
    fn test_zero_threads_leaves_pool_alone() {
        assert!(GraphConfig::default().init_cpu_pool());
    }
}
