//! Image processing and format conversion
//!
//! Validates uploads and turns them into resized, recompressed derivatives
//! (WebP, JPEG, PNG, AVIF) for responsive delivery.

pub mod cleanup;
pub mod encode;
pub mod mock;
pub mod processor;
pub mod validate;

pub use cleanup::cleanup_files;
pub use mock::MockImageOptimizer;
pub use processor::{optimize_original, read_metadata, resize_and_optimize, ImageOptimizer};
pub use validate::{validate_image, validate_with_limits};

use crate::models::{ProcessingOptions, ProcessingResult, ValidationResult};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn process_image(
        &self,
        input: &Path,
        options: &ProcessingOptions,
    ) -> Result<ProcessingResult>;
    async fn validate_image(&self, path: &Path) -> Result<ValidationResult>;
    async fn cleanup(&self, paths: &[PathBuf]);
}
