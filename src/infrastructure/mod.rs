pub mod detector;
pub mod staging;

use std::path::PathBuf;
use thiserror::Error;

/// Failures that must stop the process before it accepts traffic.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Failed to prepare staging directory {path}: {source}")]
    StagingDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}
