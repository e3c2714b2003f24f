use super::cleanup::cleanup_files;
use super::encode::encode;
use super::validate::validate_with_limits;
use super::ImageService;
use crate::models::{
    default_concurrency, derivative_filename, fit_box, format_name, optimized_filename, Config,
    Derivative, OptimizedOriginal, OutputFormat, ProcessingOptions, ProcessingResult,
    QualityTable, ResizeParams, SizeSpec, SourceMetadata, ValidationLimits, ValidationResult,
};
use crate::{Error, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, ImageResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Produces resized and recompressed derivatives of uploaded images.
///
/// Holds no per-call state; one value can serve any number of concurrent calls.
#[derive(Debug, Clone)]
pub struct ImageOptimizer {
    max_concurrency: usize,
    limits: ValidationLimits,
}

impl ImageOptimizer {
    pub fn new() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            limits: ValidationLimits::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_max_concurrency(config.max_concurrency)
            .with_limits(config.limits.clone())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_limits(mut self, limits: ValidationLimits) -> Self {
        self.limits = limits;
        self
    }

    async fn load(&self, input: &Path) -> Result<(SourceMetadata, DynamicImage)> {
        let input = input.to_path_buf();
        run_blocking(move || {
            let metadata =
                read_metadata(&input).map_err(|e| Error::processing(input.clone(), e))?;
            let image = decode(&input).map_err(|e| Error::processing(input.clone(), e))?;
            Ok((metadata, image))
        })
        .await
    }

    /// Renders every job. On any failure the outputs this call did write are
    /// removed before the error is returned.
    async fn render_all(&self, image: DynamicImage, jobs: Vec<Job>) -> Result<Vec<Rendered>> {
        let total = jobs.len();
        let image = Arc::new(image);
        let outcomes =
            run_bounded(self.max_concurrency, jobs, move |job: Job| job.run(&image)).await?;

        let mut rendered = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(output) => rendered.push(output),
                Err(e) => {
                    warn!("Image output {} of {} failed: {}", index + 1, total, e);
                    failures.push(e);
                }
            }
        }

        let failed = failures.len();
        let mut failures = failures.into_iter();
        let Some(first) = failures.next() else {
            return Ok(rendered);
        };

        let written: Vec<PathBuf> = rendered.iter().map(|r| r.path().to_path_buf()).collect();
        if !written.is_empty() {
            info!("Removing {} outputs written before the failure", written.len());
            self.cleanup(&written).await;
        }

        if failed == 1 {
            return Err(first);
        }
        Err(Error::ProcessingBatch {
            failed,
            total,
            first: Box::new(first),
        })
    }
}

impl Default for ImageOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageService for ImageOptimizer {
    async fn process_image(
        &self,
        input: &Path,
        options: &ProcessingOptions,
    ) -> Result<ProcessingResult> {
        options.check()?;
        let output_dir = options.resolve_output_dir(input)?;
        let basename = options.resolve_basename(input)?;

        let (metadata, image) = self.load(input).await?;
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| Error::processing(&output_dir, ImageError::IoError(e)))?;

        let mut jobs = Vec::with_capacity(options.sizes.len() * options.formats.len() + 1);
        for size in &options.sizes {
            for format in &options.formats {
                let filename = derivative_filename(&basename, &size.name, *format);
                jobs.push(Job::Derivative {
                    spec: size.clone(),
                    format: *format,
                    quality: options.quality.get(*format),
                    path: output_dir.join(&filename),
                    filename,
                });
            }
        }
        if options.preserve_original {
            let format = metadata.optimized_format();
            let filename = optimized_filename(&basename, format);
            jobs.push(Job::Original {
                format,
                quality: options.quality.get(format),
                path: output_dir.join(&filename),
                filename,
            });
        }

        let mut derivatives = Vec::new();
        let mut optimized = None;
        for output in self.render_all(image, jobs).await? {
            match output {
                Rendered::Derivative(derivative) => derivatives.push(derivative),
                Rendered::Original(original) => optimized = Some(original),
            }
        }

        let result = ProcessingResult {
            original: input.to_path_buf(),
            derivatives,
            metadata,
            optimized,
        };
        info!(
            "Processed {} into {} outputs under {}",
            input.display(),
            result.output_count(),
            output_dir.display()
        );
        Ok(result)
    }

    async fn validate_image(&self, path: &Path) -> Result<ValidationResult> {
        let path = path.to_path_buf();
        let limits = self.limits.clone();
        run_blocking(move || validate_with_limits(&path, &limits)).await
    }

    async fn cleanup(&self, paths: &[PathBuf]) {
        let paths = paths.to_vec();
        if let Err(e) = run_blocking(move || {
            cleanup_files(&paths);
            Ok(())
        })
        .await
        {
            warn!("Cleanup task failed: {}", e);
        }
    }
}

enum Job {
    Derivative {
        spec: SizeSpec,
        format: OutputFormat,
        quality: u8,
        path: PathBuf,
        filename: String,
    },
    Original {
        format: OutputFormat,
        quality: u8,
        path: PathBuf,
        filename: String,
    },
}

enum Rendered {
    Derivative(Derivative),
    Original(OptimizedOriginal),
}

impl Rendered {
    fn path(&self) -> &Path {
        match self {
            Rendered::Derivative(derivative) => &derivative.path,
            Rendered::Original(original) => &original.path,
        }
    }
}

impl Job {
    fn run(self, image: &DynamicImage) -> Result<Rendered> {
        match self {
            Job::Derivative {
                spec,
                format,
                quality,
                path,
                filename,
            } => {
                let (width, height) = spec.fit_within(image.width(), image.height());
                let resized = image.resize_to_fill(width, height, FilterType::Lanczos3);
                write_encoded(&resized, format, quality, &path)?;
                debug!("Wrote {} ({}x{})", path.display(), width, height);
                Ok(Rendered::Derivative(Derivative {
                    size: spec.name.clone(),
                    format,
                    path,
                    filename,
                    width,
                    height,
                    spec,
                }))
            }
            Job::Original {
                format,
                quality,
                path,
                filename,
            } => {
                write_encoded(image, format, quality, &path)?;
                debug!("Wrote optimized original {}", path.display());
                Ok(Rendered::Original(OptimizedOriginal {
                    format,
                    path,
                    filename,
                    width: image.width(),
                    height: image.height(),
                }))
            }
        }
    }
}

/// Reads dimensions, container format and byte size without decoding pixels.
pub fn read_metadata(path: &Path) -> ImageResult<SourceMetadata> {
    let size_bytes = fs::metadata(path)?.len();
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions()?;

    Ok(SourceMetadata {
        width,
        height,
        format: format.map(format_name).unwrap_or_else(|| "unknown".to_string()),
        size_bytes,
    })
}

fn decode(path: &Path) -> ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

fn write_encoded(
    image: &DynamicImage,
    format: OutputFormat,
    quality: u8,
    path: &Path,
) -> Result<()> {
    let bytes = encode(image, format, quality).map_err(|e| Error::processing(path, e))?;

    // Stage beside the target so a failed write never leaves a truncated output
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let staging = path.with_file_name(format!(".{}.partial", name));
    fs::write(&staging, bytes)
        .and_then(|()| fs::rename(&staging, path))
        .map_err(|e| {
            let _ = fs::remove_file(&staging);
            Error::processing(path, ImageError::IoError(e))
        })
}

/// Decode `input`, cover-resize it to the requested box without enlarging,
/// encode and write to `output`.
pub fn resize_and_optimize(input: &Path, output: &Path, params: ResizeParams) -> Result<()> {
    let image = decode(input).map_err(|e| Error::processing(input, e))?;
    let (width, height) = fit_box(params.width, params.height, image.width(), image.height());
    let resized = image.resize_to_fill(width, height, FilterType::Lanczos3);
    write_encoded(&resized, params.format, params.quality, output)
}

/// Re-encode `input` at its native resolution using the default quality for
/// `format`.
pub fn optimize_original(input: &Path, output: &Path, format: OutputFormat) -> Result<()> {
    let image = decode(input).map_err(|e| Error::processing(input, e))?;
    write_encoded(&image, format, QualityTable::default().get(format), output)
}

/// Runs `work` over `units` on the blocking pool with at most
/// `max_concurrency` in flight. Every unit runs; outcomes keep input order.
async fn run_bounded<T, R, F>(
    max_concurrency: usize,
    units: Vec<T>,
    work: F,
) -> Result<Vec<Result<R>>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Result<R> + Send + Sync + 'static,
{
    let total = units.len();
    let work = Arc::new(work);
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, unit) in units.into_iter().enumerate() {
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|e| Error::Invariant(format!("Render semaphore closed: {}", e)))?;
        let work = Arc::clone(&work);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            (index, work(unit))
        });
    }

    let mut outcomes: Vec<Result<R>> = (0..total)
        .map(|_| Err(Error::Invariant("Image output task did not finish".to_string())))
        .collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = outcome,
            Err(e) => warn!("Image processing task join error: {}", e),
        }
    }
    Ok(outcomes)
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))?
}
