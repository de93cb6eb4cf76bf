//! Configuration, paths, and logging setup for the content analytics pipeline.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    BatchingConfig, Config, FeaturizationConfig, DEFAULT_FEATURIZATION_URL, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
