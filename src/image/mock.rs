use super::ImageService;
use crate::models::{
    derivative_filename, optimized_filename, Derivative, OptimizedOriginal, ProcessingOptions,
    ProcessingResult, SourceMetadata, ValidationResult,
};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory stand-in for [`super::ImageOptimizer`]. Writes nothing to disk.
#[derive(Clone)]
pub struct MockImageOptimizer {
    process_count: Arc<Mutex<usize>>,
    cleaned: Arc<Mutex<Vec<PathBuf>>>,
    metadata: SourceMetadata,
    violations: Vec<String>,
    should_fail: bool,
}

impl MockImageOptimizer {
    pub fn new() -> Self {
        Self {
            process_count: Arc::new(Mutex::new(0)),
            cleaned: Arc::new(Mutex::new(Vec::new())),
            metadata: SourceMetadata {
                width: 1600,
                height: 900,
                format: "jpeg".to_string(),
                size_bytes: 250_000,
            },
            violations: Vec::new(),
            should_fail: false,
        }
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_violation(mut self, violation: &str) -> Self {
        self.violations.push(violation.to_string());
        self
    }

    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.should_fail = should_fail;
        self
    }

    pub fn get_process_count(&self) -> usize {
        *self.process_count.lock().unwrap()
    }

    pub fn get_cleaned(&self) -> Vec<PathBuf> {
        self.cleaned.lock().unwrap().clone()
    }
}

impl Default for MockImageOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for MockImageOptimizer {
    async fn process_image(
        &self,
        input: &Path,
        options: &ProcessingOptions,
    ) -> Result<ProcessingResult> {
        if self.should_fail {
            return Err(crate::Error::processing(
                input,
                image::ImageError::IoError(std::io::Error::other("Mock failure")),
            ));
        }

        *self.process_count.lock().unwrap() += 1;

        options.check()?;
        let dir = options.resolve_output_dir(input)?;
        let basename = options.resolve_basename(input)?;

        let mut derivatives = Vec::with_capacity(options.sizes.len() * options.formats.len());
        for spec in &options.sizes {
            let (width, height) = spec.fit_within(self.metadata.width, self.metadata.height);
            for format in &options.formats {
                let filename = derivative_filename(&basename, &spec.name, *format);
                derivatives.push(Derivative {
                    size: spec.name.clone(),
                    format: *format,
                    path: dir.join(&filename),
                    filename,
                    width,
                    height,
                    spec: spec.clone(),
                });
            }
        }

        let optimized = options.preserve_original.then(|| {
            let format = self.metadata.optimized_format();
            let filename = optimized_filename(&basename, format);
            OptimizedOriginal {
                format,
                path: dir.join(&filename),
                filename,
                width: self.metadata.width,
                height: self.metadata.height,
            }
        });

        Ok(ProcessingResult {
            original: input.to_path_buf(),
            derivatives,
            metadata: self.metadata.clone(),
            optimized,
        })
    }

    async fn validate_image(&self, _path: &Path) -> Result<ValidationResult> {
        Ok(ValidationResult {
            valid: self.violations.is_empty(),
            violations: self.violations.clone(),
            metadata: self.metadata.clone(),
        })
    }

    async fn cleanup(&self, paths: &[PathBuf]) {
        self.cleaned.lock().unwrap().extend_from_slice(paths);
    }
}
