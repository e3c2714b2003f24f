use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use course_image_optimizer::app::App;
use course_image_optimizer::image::{optimize_original, resize_and_optimize};
use course_image_optimizer::models::{
    CdnUrlOptions, Config, OutputFormat, ProcessingOptions, ResizeParams,
};
use course_image_optimizer::negotiate::select_format;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "course-image-optimizer")]
#[command(about = "Validate, resize and recompress course images")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate an upload, then write every size/format derivative.
    Process {
        input: PathBuf,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        basename: Option<String>,
        /// Output format; repeat for several. Defaults to webp and jpeg.
        #[arg(long = "format", value_name = "FORMAT", value_parser = parse_format_arg)]
        formats: Vec<OutputFormat>,
        /// Skip the optimized copy at original dimensions.
        #[arg(long)]
        no_original: bool,
    },
    /// Check an upload against size, dimension and format limits.
    Validate { input: PathBuf },
    /// Resize one image to a box and re-encode it.
    Resize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, value_parser = parse_format_arg)]
        format: OutputFormat,
        #[arg(long, default_value_t = 80)]
        quality: u8,
    },
    /// Re-encode one image at its original dimensions.
    Optimize {
        input: PathBuf,
        output: PathBuf,
        /// Defaults to the output file's extension.
        #[arg(long, value_parser = parse_format_arg)]
        format: Option<OutputFormat>,
    },
    /// Print CDN transformation URLs for a hosted original.
    Urls {
        public_id: String,
        #[arg(long = "format", value_name = "FORMAT")]
        formats: Vec<String>,
        #[arg(long, default_value = "auto")]
        quality: String,
    },
    /// Print the output format to serve a client.
    Format {
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long)]
        accept: Option<String>,
    },
    /// Delete files, ignoring ones that are already gone.
    Cleanup {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn parse_format_arg(input: &str) -> std::result::Result<OutputFormat, String> {
    input
        .parse()
        .map_err(|_| format!("Invalid format '{}'. Expected webp, jpeg, png or avif", input))
}

fn format_from_extension(path: &Path) -> Result<OutputFormat> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .with_context(|| format!("{} has no file extension", path.display()))?;
    Ok(extension.parse()?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Process {
            input,
            output_dir,
            basename,
            formats,
            no_original,
        } => {
            let mut options = ProcessingOptions::default().with_preserve_original(!no_original);
            if let Some(dir) = output_dir {
                options = options.with_output_dir(dir);
            }
            if let Some(basename) = basename {
                options = options.with_basename(basename);
            }
            if !formats.is_empty() {
                options = options.with_formats(formats);
            }
            let result = app.ingest(&input, &options).await?;
            print_json(&result)?;
        }
        Command::Validate { input } => {
            let result = app.validate(&input).await?;
            print_json(&result)?;
            if !result.valid {
                std::process::exit(1);
            }
        }
        Command::Resize {
            input,
            output,
            width,
            height,
            format,
            quality,
        } => {
            let params = ResizeParams {
                width,
                height,
                format,
                quality,
            };
            tokio::task::spawn_blocking(move || resize_and_optimize(&input, &output, params))
                .await??;
        }
        Command::Optimize {
            input,
            output,
            format,
        } => {
            let format = match format {
                Some(format) => format,
                None => format_from_extension(&output)?,
            };
            tokio::task::spawn_blocking(move || optimize_original(&input, &output, format))
                .await??;
        }
        Command::Urls {
            public_id,
            formats,
            quality,
        } => {
            let mut options = CdnUrlOptions {
                quality,
                ..CdnUrlOptions::default()
            };
            if !formats.is_empty() {
                options.formats = formats;
            }
            print_json(&app.responsive_urls(&public_id, &options))?;
        }
        Command::Format { user_agent, accept } => {
            println!(
                "{}",
                select_format(accept.as_deref(), user_agent.as_deref())
            );
        }
        Command::Cleanup { paths } => {
            app.cleanup(&paths).await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_image_optimizer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let app = App::new(&config);

    match run(&app, args.command).await {
        Ok(()) => {
            info!("Done");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_arg_valid() {
        assert_eq!(parse_format_arg("JPG").unwrap(), OutputFormat::Jpeg);
        assert_eq!(parse_format_arg("avif").unwrap(), OutputFormat::Avif);
    }

    #[test]
    fn test_parse_format_arg_invalid() {
        let err = parse_format_arg("tiff").unwrap_err();
        assert!(err.contains("webp, jpeg, png or avif"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            format_from_extension(Path::new("out/cover.webp")).unwrap(),
            OutputFormat::Webp
        );
        assert!(format_from_extension(Path::new("out/cover")).is_err());
    }

    #[test]
    fn test_cli_parses_repeated_formats() {
        let args = CliArgs::try_parse_from([
            "course-image-optimizer",
            "process",
            "cover.png",
            "--format",
            "webp",
            "--format",
            "avif",
            "--no-original",
        ])
        .unwrap();

        match args.command {
            Command::Process {
                formats,
                no_original,
                ..
            } => {
                assert_eq!(formats, vec![OutputFormat::Webp, OutputFormat::Avif]);
                assert!(no_original);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
