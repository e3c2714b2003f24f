//! Upload validation against size, dimension and format limits.

use super::processor::read_metadata;
use crate::models::{ValidationLimits, ValidationResult};
use crate::{Error, Result};
use std::path::Path;

/// Validate with the default limits (10 MiB, 4000 px, jpeg/png/webp/gif).
pub fn validate_image(path: &Path) -> Result<ValidationResult> {
    validate_with_limits(path, &ValidationLimits::default())
}

/// Checks every limit and reports all violations together.
///
/// Only the header is read. A header that cannot be read is an error rather
/// than a violation.
pub fn validate_with_limits(path: &Path, limits: &ValidationLimits) -> Result<ValidationResult> {
    let metadata = read_metadata(path).map_err(|source| Error::Metadata {
        path: path.to_path_buf(),
        source,
    })?;

    let mut violations = Vec::new();

    if metadata.size_bytes > limits.max_file_size {
        violations.push(format!(
            "File size {} bytes exceeds the maximum of {} bytes",
            metadata.size_bytes, limits.max_file_size
        ));
    }

    if metadata.width > limits.max_dimension || metadata.height > limits.max_dimension {
        violations.push(format!(
            "Dimensions {}x{} exceed the maximum of {}px per side",
            metadata.width, metadata.height, limits.max_dimension
        ));
    }

    if !limits
        .allowed_formats
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&metadata.format))
    {
        violations.push(format!(
            "Format '{}' is not allowed (allowed: {})",
            metadata.format,
            limits.allowed_formats.join(", ")
        ));
    }

    if !violations.is_empty() {
        tracing::debug!(
            "Validation of {} found {} violation(s)",
            path.display(),
            violations.len()
        );
    }

    Ok(ValidationResult {
        valid: violations.is_empty(),
        violations,
        metadata,
    })
}
