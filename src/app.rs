//! Upload ingest orchestration: validate, process, clean up on failure.

use crate::cdn::{CdnUrlService, CloudinaryUrlBuilder};
use crate::image::{ImageOptimizer, ImageService, MockImageOptimizer};
use crate::models::{
    CdnUrlOptions, Config, ProcessingOptions, ProcessingResult, ResponsiveUrls, ValidationResult,
};
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Entry point a request handler or the CLI drives.
pub struct App {
    image: Box<dyn ImageService>,
    cdn: Box<dyn CdnUrlService>,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub image: Box<dyn ImageService>,
    pub cdn: Box<dyn CdnUrlService>,
}

impl App {
    pub fn with_services(services: AppServices) -> Self {
        Self {
            image: services.image,
            cdn: services.cdn,
        }
    }

    /// Construct an app from environment configuration (`Config::from_env`).
    pub fn new(config: &Config) -> Self {
        let image: Box<dyn ImageService> = if config.dry_run {
            info!("DRY_RUN enabled, image files will not be written");
            Box::new(MockImageOptimizer::new())
        } else {
            Box::new(ImageOptimizer::from_config(config))
        };

        Self::with_services(AppServices {
            image,
            cdn: Box::new(CloudinaryUrlBuilder::from_config(config)),
        })
    }

    pub async fn validate(&self, input: &Path) -> Result<ValidationResult> {
        self.image.validate_image(input).await
    }

    /// Validate `input` and, if it passes, write every derivative.
    ///
    /// A rejected upload writes nothing. A failed processing call has already
    /// removed what it wrote, so outputs of earlier calls are left alone.
    pub async fn ingest(
        &self,
        input: &Path,
        options: &ProcessingOptions,
    ) -> Result<ProcessingResult> {
        let validation = self.image.validate_image(input).await?;
        if !validation.valid {
            warn!(
                "Rejected {}: {}",
                input.display(),
                validation.violations.join("; ")
            );
        }
        let metadata = validation.into_result()?;

        match self.image.process_image(input, options).await {
            Ok(result) => {
                info!(
                    "Ingested {} ({}x{} {})",
                    input.display(),
                    metadata.width,
                    metadata.height,
                    metadata.format
                );
                Ok(result)
            }
            Err(e) => {
                error!("Processing {} failed: {}", input.display(), e);
                Err(e)
            }
        }
    }

    /// Remove outputs of an earlier ingest, e.g. when a course image is replaced.
    pub async fn discard(&self, result: &ProcessingResult) {
        self.image.cleanup(&result.output_paths()).await;
    }

    pub async fn cleanup(&self, paths: &[PathBuf]) {
        self.image.cleanup(paths).await;
    }

    pub fn responsive_urls(&self, public_id: &str, options: &CdnUrlOptions) -> ResponsiveUrls {
        self.cdn.responsive_urls(public_id, options)
    }
}
