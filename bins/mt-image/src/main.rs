//! mt-image: resize and convert images in bulk.

use clap::{Args, Parser, Subcommand};
use multitool_cli::output::{self, format_count, format_duration, format_size, Row, Status};
use multitool_cli::progress;
use multitool_core::config::{Config, ResizeDefaults};
use multitool_core::{Error, ErrorCode, Result, ResultExt};
use multitool_image::{
    detect_format, read_dimensions, BatchError, Dimensions, DirectorySink, Exporter, FileInput,
    Mode, OutputFormat, ResizeConfig, ResizeSession,
};
use multitool_telemetry::{metrics, names, TelemetryConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "mt-image")]
#[command(about = "Resize and convert images in bulk")]
#[command(version)]
struct Cli {
    /// Path to a configuration file
    #[arg(long, global = true, env = "MT_IMAGE_CONFIG")]
    config: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resize every input to one target size and format
    Resize(ResizeArgs),
    /// Show the format and size of an image
    Inspect {
        /// Path to image file
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ResizeArgs {
    /// Images to process
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target width in pixels
    #[arg(short = 'W', long, value_parser = clap::value_parser!(u32).range(1..))]
    width: Option<u32>,

    /// Target height in pixels
    #[arg(short = 'H', long, value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,

    /// Output format: jpeg, png, webp or avif
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Encoder quality for JPEG, WebP and AVIF (10-100)
    #[arg(short, long)]
    quality: Option<u32>,

    /// Do not keep the first image's aspect ratio when one side is given
    #[arg(long)]
    no_aspect_lock: bool,

    /// Output directory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Appended to each output file stem
    #[arg(long)]
    suffix: Option<String>,

    /// Pause between saved files, in milliseconds
    #[arg(long)]
    stagger_ms: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ResizeReport {
    output_dir: PathBuf,
    size: Dimensions,
    format: OutputFormat,
    quality: u8,
    elapsed_ms: u64,
    files: Vec<FileReport>,
    metrics: serde_json::Value,
}

#[derive(Serialize)]
struct FileReport {
    source: String,
    output: String,
    size: Dimensions,
    requested_format: OutputFormat,
    format: OutputFormat,
    bytes_before: usize,
    bytes_after: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = match &cli.command {
        Commands::Resize(args) => args.json,
        Commands::Inspect { json, .. } => *json,
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(e, json),
    };

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.schema.logging.level.clone()
    };
    multitool_telemetry::init_with_config(TelemetryConfig::with_level(level))?;

    if let Some(path) = &config.path {
        tracing::debug!(path = %path, "loaded configuration");
    }

    let result = match cli.command {
        Commands::Resize(args) => resize(args, &config).await,
        Commands::Inspect { path, json } => inspect(path, json),
    };

    if let Err(e) = result {
        fail(e, json);
    }
    Ok(())
}

/// Report `err` (as a JSON error report when `json` is set) and exit with its
/// category's code.
fn fail(err: Error, json: bool) -> ! {
    match serde_json::to_string_pretty(&err.to_report()) {
        Ok(report) if json => println!("{report}"),
        _ => Status::error(&err.to_string()),
    }
    std::process::exit(err.exit_code());
}

/// Settings from the configuration file with command-line overrides applied.
fn resize_config(args: &ResizeArgs, defaults: &ResizeDefaults) -> Result<ResizeConfig> {
    let format = match args.format {
        Some(format) => format,
        None => defaults
            .format
            .parse()
            .map_err(|e: String| Error::invalid_config_value("resize.format", e))?,
    };

    let mut config = ResizeConfig::default();
    config.set_output_format(format);
    config.set_quality(args.quality.unwrap_or(u32::from(defaults.quality)));
    config.set_aspect_locked(defaults.aspect_lock && !args.no_aspect_lock);
    config.set_jpeg_background(defaults.jpeg_background);
    Ok(config)
}

fn batch_error(err: BatchError) -> Error {
    match &err {
        BatchError::AlreadyProcessing => Error::new(ErrorCode::AlreadyProcessing, err.to_string()),
        BatchError::MissingTarget => Error::new(ErrorCode::InputError, err.to_string())
            .with_suggestion("Pass --width and/or --height"),
        BatchError::Failed { failures, .. } => {
            let details = failures
                .iter()
                .map(|f| format!("{}: {}", f.name, f.source))
                .collect::<Vec<_>>()
                .join("; ");
            Error::batch_failed(err.to_string()).with_context(details)
        }
    }
}

async fn resize(args: ResizeArgs, config: &Config) -> Result<()> {
    let export = &config.schema.export;
    let settings = resize_config(&args, &config.schema.resize).context("Reading [resize] settings")?;
    let exporter = Exporter::new(
        args.suffix.clone().unwrap_or_else(|| export.suffix.clone()),
        Duration::from_millis(args.stagger_ms.unwrap_or(export.stagger_ms)),
    );
    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&export.output_dir));

    let mut session = ResizeSession::new(settings, exporter);
    if args.files.len() == 1 {
        session.set_mode(Mode::Single);
    }

    for path in &args.files {
        let file = match FileInput::from_path(path) {
            Ok(file) => file,
            Err(e) => {
                Status::warning(&format!("Skipping {}: {}", path.display(), e));
                continue;
            }
        };
        if session.add_file(file).is_none() {
            Status::warning(&format!("Skipping {}: not a readable image", path.display()));
        }
    }

    if session.registry().is_empty() {
        return Err(Error::no_images());
    }

    let applied = match (args.width, args.height) {
        (Some(width), Some(height)) => session.set_size(width, height),
        (Some(width), None) => session.set_width(width),
        (None, Some(height)) => session.set_height(height),
        (None, None) => true,
    };
    if !applied {
        return Err(Error::invalid_config_value("size", "0"));
    }

    let count = session.registry().len();
    let pb = if args.json {
        progress::hidden()
    } else {
        progress::spinner(&format!("Resizing {}...", format_count(count, "image", "images")))
    };

    let started = Instant::now();
    if let Err(e) = session.process_all().await {
        progress::finish_error(&pb, "Batch failed");
        return Err(batch_error(e));
    }
    let elapsed = started.elapsed();
    progress::finish_success(&pb, &format!("Resized {} in {}", format_count(count, "image", "images"), format_duration(elapsed)));

    let sink = DirectorySink::new(&out_dir);
    let exported = session
        .export_all(&sink)
        .await
        .map_err(|e| Error::export(e.to_string()).with_source(e))
        .context(format!("Writing to {}", out_dir.display()))?;
    if exported == 0 {
        return Err(Error::new(ErrorCode::NothingToExport, "No processed images to save"));
    }

    let files: Vec<FileReport> = session
        .entries()
        .filter_map(|entry| {
            let artifact = entry.artifact()?;
            Some(FileReport {
                source: entry.name().to_string(),
                output: session.exporter().filename_for(entry)?,
                size: artifact.dimensions(),
                requested_format: artifact.requested_format(),
                format: artifact.format(),
                bytes_before: entry.byte_size(),
                bytes_after: artifact.len(),
            })
        })
        .collect();

    if args.json {
        let report = ResizeReport {
            output_dir: out_dir,
            size: session.config().target().unwrap_or(Dimensions::new(0, 0)),
            format: session.config().output_format(),
            quality: session.config().quality(),
            elapsed_ms: elapsed.as_millis() as u64,
            files,
            metrics: metrics().export_json(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let rows: Vec<Row> = files
        .iter()
        .map(|f| Row {
            name: f.output.clone(),
            dimensions: f.size.to_string(),
            before: f.bytes_before as u64,
            after: f.bytes_after as u64,
            note: (f.format != f.requested_format)
                .then(|| format!("{} unavailable, wrote {}", f.requested_format, f.format)),
        })
        .collect();

    let fallbacks = metrics().counter(names::FALLBACK_JPEG);
    if fallbacks > 0 {
        Status::warning(&format!(
            "{} written as JPEG; {} encoding is unavailable",
            format_count(fallbacks as usize, "image was", "images were"),
            session.config().output_format()
        ));
    }

    Status::header("Results");
    output::print_table(&rows);
    println!();
    Status::success(&format!(
        "Saved {} to {}",
        format_count(exported, "file", "files"),
        out_dir.display()
    ));
    tracing::debug!(metrics = %metrics().export_json(), "session metrics");
    Ok(())
}

fn inspect(path: PathBuf, json: bool) -> Result<()> {
    if !path.exists() {
        return Err(Error::file_not_found(&path));
    }
    let data = std::fs::read(&path)?;
    let format = detect_format(&data).map_err(|e| {
        Error::new(ErrorCode::UnsupportedMedia, format!("{}: {}", path.display(), e))
    })?;
    let size = read_dimensions(&data)
        .map_err(|e| Error::new(ErrorCode::InputError, format!("{}: {}", path.display(), e)))?;

    if json {
        let report = serde_json::json!({
            "path": path.to_string_lossy(),
            "format": format,
            "mime_type": format.mime_type(),
            "width": size.width,
            "height": size.height,
            "size_bytes": data.len(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        Status::header(&path.display().to_string());
        Status::field("Format", &format!("{:?}", format));
        Status::field("MIME", format.mime_type());
        Status::field("Dimensions", &size.to_string());
        Status::field("Size", &format_size(data.len() as u64));
    }
    Ok(())
}
