//! Error handling and custom error types
//!
//! Provides unified error handling across the pipeline using thiserror.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image rejected: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Failed to read image metadata from {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to process image {}: {source}", path.display())]
    Processing {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{failed} of {total} image outputs failed; first failure: {first}")]
    ProcessingBatch {
        failed: usize,
        total: usize,
        first: Box<Error>,
    },

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    pub(crate) fn processing(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Error::Processing {
            path: path.into(),
            source,
        }
    }

    /// True for failures the uploader caused and can fix by sending another file.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Metadata { .. } | Error::UnsupportedFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
