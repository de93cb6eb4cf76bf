//! File system paths for the pipeline.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Name of the base directory under the user's home.
const BASE_DIR_NAME: &str = ".content-analytics";

/// Manages file system paths for the pipeline.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.content-analytics)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.content-analytics`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (<base>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory holding the durable queue files.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Durable queue for asset interaction events.
    pub fn asset_queue_file(&self) -> PathBuf {
        self.data_dir().join("assets.sqlite")
    }

    /// Durable queue for experience interaction events.
    pub fn experience_queue_file(&self) -> PathBuf {
        self.data_dir().join("experiences.sqlite")
    }

    /// Durable queue for featurization registration requests.
    pub fn featurization_queue_file(&self) -> PathBuf {
        self.data_dir().join("featurization.sqlite")
    }

    /// Logs directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL log file.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("pipeline.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
