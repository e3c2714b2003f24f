//! Data models and structures
//!
//! Defines the size table, processing options and the result records the
//! optimizer hands back to callers, plus environment configuration.

use crate::{Error, Result};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 4000;
pub const DEFAULT_CDN_BASE_URL: &str = "https://res.cloudinary.com";
pub const FALLBACK_QUALITY: u8 = 80;
const OPTIMIZED_SUFFIX: &str = "optimized";

const DEFAULT_SIZE_TABLE: [(&str, u32, u32); 4] = [
    ("large", 800, 450),
    ("medium", 400, 225),
    ("small", 200, 113),
    ("thumbnail", 150, 150),
];

const ALLOWED_INPUT_FORMATS: [&str; 5] = ["jpeg", "jpg", "png", "webp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Png,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Webp,
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Avif,
    ];

    /// File extension used for outputs; identical to the format name.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Avif => "avif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Avif => "image/avif",
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::WebP => Some(OutputFormat::Webp),
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::Avif => Some(OutputFormat::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "webp" => Ok(OutputFormat::Webp),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "avif" => Ok(OutputFormat::Avif),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Lowercase name for a detected container format, as reported in metadata.
pub fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        other => other
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| format!("{:?}", other).to_lowercase()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl SizeSpec {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Target box for a source of the given size. See [`fit_box`].
    pub fn fit_within(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        fit_box(self.width, self.height, source_width, source_height)
    }
}

/// Returns the requested box when the source covers it; otherwise the box is
/// scaled down uniformly until it fits inside the source.
pub fn fit_box(width: u32, height: u32, source_width: u32, source_height: u32) -> (u32, u32) {
    let (width, height) = (width.max(1), height.max(1));
    let (source_width, source_height) = (source_width.max(1), source_height.max(1));
    if width <= source_width && height <= source_height {
        return (width, height);
    }

    let scale = f64::min(
        source_width as f64 / width as f64,
        source_height as f64 / height as f64,
    );
    let fitted_width = ((width as f64 * scale).floor() as u32).clamp(1, source_width);
    let fitted_height = ((height as f64 * scale).floor() as u32).clamp(1, source_height);
    (fitted_width, fitted_height)
}

pub fn default_sizes() -> Vec<SizeSpec> {
    DEFAULT_SIZE_TABLE
        .iter()
        .map(|(name, width, height)| SizeSpec::new(*name, *width, *height))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTable(BTreeMap<OutputFormat, u8>);

impl QualityTable {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, format: OutputFormat, quality: u8) -> Self {
        self.0.insert(format, quality.clamp(1, 100));
        self
    }

    pub fn get(&self, format: OutputFormat) -> u8 {
        self.0.get(&format).copied().unwrap_or(FALLBACK_QUALITY)
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        Self::empty()
            .with(OutputFormat::Webp, 80)
            .with(OutputFormat::Jpeg, 85)
            .with(OutputFormat::Png, 85)
            .with(OutputFormat::Avif, 50)
    }
}

/// Options for one `process_image` call.
///
/// `output_dir` and `basename` default to the input's directory and file stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub output_dir: Option<PathBuf>,
    pub basename: Option<String>,
    pub sizes: Vec<SizeSpec>,
    pub formats: Vec<OutputFormat>,
    pub quality: QualityTable,
    pub preserve_original: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            basename: None,
            sizes: default_sizes(),
            formats: vec![OutputFormat::Webp, OutputFormat::Jpeg],
            quality: QualityTable::default(),
            preserve_original: true,
        }
    }
}

impl ProcessingOptions {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_basename(mut self, basename: impl Into<String>) -> Self {
        self.basename = Some(basename.into());
        self
    }

    pub fn with_sizes(mut self, sizes: Vec<SizeSpec>) -> Self {
        self.sizes = sizes;
        self
    }

    /// Repeated formats are kept once, in first-seen order.
    pub fn with_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.formats = Vec::with_capacity(formats.len());
        for format in formats {
            if !self.formats.contains(&format) {
                self.formats.push(format);
            }
        }
        self
    }

    pub fn with_quality(mut self, quality: QualityTable) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_preserve_original(mut self, preserve: bool) -> Self {
        self.preserve_original = preserve;
        self
    }

    /// Absolute directory outputs are written to.
    pub fn resolve_output_dir(&self, input: &Path) -> Result<PathBuf> {
        let dir = match (&self.output_dir, input.parent()) {
            (Some(dir), _) => dir.as_path(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent,
            (None, _) => Path::new("."),
        };
        Ok(std::path::absolute(dir)?)
    }

    pub fn resolve_basename(&self, input: &Path) -> Result<String> {
        if let Some(basename) = &self.basename {
            return Ok(basename.clone());
        }
        input
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Invariant(format!("Input path has no file name: {}", input.display()))
            })
    }

    /// Rejects tables that would make two outputs share a file name.
    pub fn check(&self) -> Result<()> {
        for (i, size) in self.sizes.iter().enumerate() {
            if size.name == OPTIMIZED_SUFFIX {
                return Err(Error::Config(format!(
                    "Size name '{}' is reserved for the optimized original",
                    OPTIMIZED_SUFFIX
                )));
            }
            if self.sizes[..i].iter().any(|earlier| earlier.name == size.name) {
                return Err(Error::Config(format!("Duplicate size name '{}'", size.name)));
            }
        }
        for (i, format) in self.formats.iter().enumerate() {
            if self.formats[..i].contains(format) {
                return Err(Error::Config(format!("Duplicate output format '{}'", format)));
            }
        }
        Ok(())
    }
}

pub fn derivative_filename(basename: &str, size_name: &str, format: OutputFormat) -> String {
    format!("{}_{}.{}", basename, size_name, format.extension())
}

pub fn optimized_filename(basename: &str, format: OutputFormat) -> String {
    format!("{}_{}.{}", basename, OPTIMIZED_SUFFIX, format.extension())
}

/// Parameters for a single resize-and-encode unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub size_bytes: u64,
}

impl SourceMetadata {
    /// Format of the optimized original; sources we cannot encode become png.
    pub fn optimized_format(&self) -> OutputFormat {
        self.format.parse().unwrap_or(OutputFormat::Png)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivative {
    pub size: String,
    pub format: OutputFormat,
    pub path: PathBuf,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub spec: SizeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizedOriginal {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub original: PathBuf,
    pub derivatives: Vec<Derivative>,
    pub metadata: SourceMetadata,
    pub optimized: Option<OptimizedOriginal>,
}

impl ProcessingResult {
    pub fn output_count(&self) -> usize {
        self.derivatives.len() + usize::from(self.optimized.is_some())
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.derivatives
            .iter()
            .map(|d| d.path.clone())
            .chain(self.optimized.iter().map(|o| o.path.clone()))
            .collect()
    }

    pub fn find(&self, size: &str, format: OutputFormat) -> Option<&Derivative> {
        self.derivatives
            .iter()
            .find(|d| d.size == size && d.format == format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationLimits {
    pub max_file_size: u64,
    pub max_dimension: u32,
    pub allowed_formats: Vec<String>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_dimension: DEFAULT_MAX_DIMENSION,
            allowed_formats: ALLOWED_INPUT_FORMATS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<String>,
    pub metadata: SourceMetadata,
}

impl ValidationResult {
    pub fn into_result(self) -> Result<SourceMetadata> {
        if self.valid {
            Ok(self.metadata)
        } else {
            Err(Error::Validation(self.violations))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnUrlOptions {
    pub sizes: Vec<SizeSpec>,
    pub formats: Vec<String>,
    pub quality: String,
}

impl Default for CdnUrlOptions {
    fn default() -> Self {
        Self {
            sizes: default_sizes(),
            formats: vec!["webp".to_string(), "auto".to_string()],
            quality: "auto".to_string(),
        }
    }
}

/// Size name to format to URL.
pub type ResponsiveUrls = BTreeMap<String, BTreeMap<String, String>>;

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub cloud_name: String,
    pub cdn_base_url: String,
    pub max_concurrency: usize,
    pub limits: ValidationLimits,
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let limits = ValidationLimits {
            max_file_size: parse_var(&lookup, "IMAGE_MAX_FILE_SIZE")?
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
            max_dimension: parse_var(&lookup, "IMAGE_MAX_DIMENSION")?
                .unwrap_or(DEFAULT_MAX_DIMENSION),
            ..ValidationLimits::default()
        };

        let max_concurrency = match parse_var::<usize, _>(&lookup, "IMAGE_MAX_CONCURRENCY")? {
            Some(0) => {
                return Err(Error::Config(
                    "IMAGE_MAX_CONCURRENCY must be at least 1".to_string(),
                ))
            }
            Some(n) => n,
            None => default_concurrency(),
        };

        let dry_run = lookup("DRY_RUN")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            cloud_name: lookup("CLOUDINARY_CLOUD_NAME").unwrap_or_else(|| "demo".to_string()),
            cdn_base_url: lookup("CDN_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_CDN_BASE_URL.to_string()),
            max_concurrency,
            limits,
            dry_run,
        })
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_size_table() {
        let sizes = default_sizes();
        let names: Vec<&str> = sizes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["large", "medium", "small", "thumbnail"]);
        assert_eq!(sizes[2], SizeSpec::new("small", 200, 113));
    }

    #[test]
    fn test_fit_within_keeps_box_when_source_is_large() {
        let spec = SizeSpec::new("large", 800, 450);
        assert_eq!(spec.fit_within(1920, 1080), (800, 450));
        assert_eq!(spec.fit_within(800, 450), (800, 450));
    }

    #[test]
    fn test_fit_within_never_exceeds_source() {
        let spec = SizeSpec::new("large", 800, 450);
        assert_eq!(spec.fit_within(100, 60), (100, 56));

        let square = SizeSpec::new("thumbnail", 150, 150);
        assert_eq!(square.fit_within(400, 90), (90, 90));
        assert_eq!(square.fit_within(1, 1), (1, 1));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("WEBP".parse::<OutputFormat>().unwrap(), OutputFormat::Webp);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("avif".parse::<OutputFormat>().unwrap(), OutputFormat::Avif);
        assert!(matches!(
            "bmp".parse::<OutputFormat>(),
            Err(Error::UnsupportedFormat(f)) if f == "bmp"
        ));
    }

    #[test]
    fn test_format_name() {
        assert_eq!(format_name(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_name(ImageFormat::Png), "png");
        assert_eq!(format_name(ImageFormat::Bmp), "bmp");
        assert_eq!(format_name(ImageFormat::Gif), "gif");
    }

    #[test]
    fn test_quality_table_defaults_and_fallback() {
        let table = QualityTable::default();
        assert_eq!(table.get(OutputFormat::Webp), 80);
        assert_eq!(table.get(OutputFormat::Jpeg), 85);
        assert_eq!(table.get(OutputFormat::Png), 85);

        let custom = QualityTable::empty().with(OutputFormat::Jpeg, 60);
        assert_eq!(custom.get(OutputFormat::Jpeg), 60);
        assert_eq!(custom.get(OutputFormat::Webp), FALLBACK_QUALITY);
    }

    #[test]
    fn test_options_resolve_from_input_path() {
        let options = ProcessingOptions::default();
        let input = Path::new("/uploads/courses/cover.png");
        assert_eq!(
            options.resolve_output_dir(input).unwrap(),
            PathBuf::from("/uploads/courses")
        );
        assert_eq!(options.resolve_basename(input).unwrap(), "cover");
    }

    #[test]
    fn test_relative_output_dir_becomes_absolute() {
        let cwd = std::env::current_dir().unwrap();

        let bare = ProcessingOptions::default()
            .resolve_output_dir(Path::new("cover.png"))
            .unwrap();
        assert_eq!(bare, cwd);

        let nested = ProcessingOptions::default()
            .with_output_dir("public/images")
            .resolve_output_dir(Path::new("/uploads/cover.png"))
            .unwrap();
        assert!(nested.is_absolute());
        assert_eq!(nested, cwd.join("public/images"));
    }

    #[test]
    fn test_with_formats_drops_repeats() {
        let options = ProcessingOptions::default().with_formats(vec![
            OutputFormat::Jpeg,
            OutputFormat::Webp,
            OutputFormat::Jpeg,
        ]);
        assert_eq!(options.formats, vec![OutputFormat::Jpeg, OutputFormat::Webp]);
        assert!(options.check().is_ok());
    }

    #[test]
    fn test_check_rejects_colliding_outputs() {
        assert!(ProcessingOptions::default().check().is_ok());

        let repeated_size = ProcessingOptions::default().with_sizes(vec![
            SizeSpec::new("thumbnail", 150, 150),
            SizeSpec::new("thumbnail", 100, 100),
        ]);
        assert!(matches!(repeated_size.check(), Err(Error::Config(m)) if m.contains("thumbnail")));

        let reserved = ProcessingOptions::default()
            .with_sizes(vec![SizeSpec::new("optimized", 640, 360)]);
        assert!(matches!(reserved.check(), Err(Error::Config(m)) if m.contains("reserved")));

        let mut repeated_format = ProcessingOptions::default();
        repeated_format.formats = vec![OutputFormat::Png, OutputFormat::Png];
        assert!(matches!(repeated_format.check(), Err(Error::Config(m)) if m.contains("png")));
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.cloud_name, "demo");
        assert_eq!(config.cdn_base_url, DEFAULT_CDN_BASE_URL);
        assert!(config.max_concurrency >= 1);
        assert_eq!(config.limits, ValidationLimits::default());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CLOUDINARY_CLOUD_NAME", "courses"),
            ("CDN_BASE_URL", "https://media.example.com/"),
            ("IMAGE_MAX_CONCURRENCY", "2"),
            ("IMAGE_MAX_DIMENSION", "2048"),
            ("DRY_RUN", "true"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.cloud_name, "courses");
        assert_eq!(config.cdn_base_url, "https://media.example.com");
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.limits.max_dimension, 2048);
        assert!(config.dry_run);
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let err = Config::from_lookup(|k| {
            (k == "IMAGE_MAX_FILE_SIZE").then(|| "ten megabytes".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("IMAGE_MAX_FILE_SIZE"));

        let err = Config::from_lookup(|k| (k == "IMAGE_MAX_CONCURRENCY").then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
