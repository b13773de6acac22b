//! Chroma-key CLI tool
//!
//! Command-line interface for keying solid backdrops out of rendered images,
//! and for inspecting which backdrop color a photo should be rendered on.

use super::config::CliConfigBuilder;
use crate::{
    color::Color,
    compositor::{CompositeOptions, CompositeOutput, TransparencyStats},
    processor::ChromaKeyProcessor,
    selector::ChromakeySelection,
    services::ImageIOService,
    tracing_config::{events, init_cli_tracing, spans, TracingFormat},
    types::RenderRequest,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Instrument;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Chroma-key background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "chroma-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input images or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Backdrop color the images were rendered on, as #RRGGBB or #RGB [default: #00ff00]
    #[arg(long, value_name = "HEX")]
    pub target_color: Option<Color>,

    /// Keying tolerance (0-255) [default: 50]
    #[arg(short, long)]
    pub tolerance: Option<u8>,

    /// Key the target color as given instead of detecting the rendered backdrop
    #[arg(long)]
    pub no_auto_detect: bool,

    /// Disable the soft alpha ramp at the mask edge
    #[arg(long)]
    pub no_feather: bool,

    /// Print the recommended backdrop color for each input and exit
    #[arg(long, conflicts_with = "analyze")]
    pub select_only: bool,

    /// Print analysis, backdrop selection and render prompt as JSON and exit
    #[arg(long)]
    pub analyze: bool,

    /// JSON configuration file; command-line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of files processed concurrently (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Process directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for batch processing (e.g., "*.png")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

/// What the run does with each input
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Mode {
    Composite,
    SelectOnly,
    Analyze,
}

impl Mode {
    fn from_cli(cli: &Cli) -> Self {
        if cli.select_only {
            Self::SelectOnly
        } else if cli.analyze {
            Self::Analyze
        } else {
            Self::Composite
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl std::fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
enum FileOutcome {
    Keyed {
        key_color: Color,
        stats: TransparencyStats,
        target: OutputTarget,
        elapsed_ms: u64,
    },
    Selected(ChromakeySelection),
    Analyzed(Box<RenderRequest>),
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let options = CliConfigBuilder::composite_options(&cli, &config);

    events::progress("Starting chroma-key CLI");
    info!("Input(s): {}", cli.input.join(", "));
    debug!(
        "Target: {}, tolerance: {}, auto-detect: {}, feather: {}",
        options.target, options.tolerance, options.auto_detect, options.edge_feather
    );

    let processor = ChromaKeyProcessor::new(config).context("Failed to create processor")?;

    let start_time = Instant::now();
    let session = spans::session(&session_id, options.tolerance);
    let processed_count = process_inputs(&cli, &processor, &options)
        .instrument(session)
        .await?;

    let total_time = start_time.elapsed();
    info!(
        "Processed {} image(s) in {:.2}s",
        processed_count,
        total_time.as_secs_f64()
    );

    Ok(())
}

/// Process all inputs with bounded concurrency
async fn process_inputs(
    cli: &Cli,
    processor: &ChromaKeyProcessor,
    options: &CompositeOptions,
) -> Result<usize> {
    let mode = Mode::from_cli(cli);

    // Handle stdin specially (single input)
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli.output.as_deref(), processor, mode, options);
    }

    let all_files = collect_input_files(cli)?;
    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }

    let file_count = all_files.len();
    info!("Found {} image file(s) to process", file_count);

    let output_dir = prepare_output_dir(cli.output.as_deref(), file_count)?;

    let progress = if mode == Mode::Composite && file_count > 1 {
        Some(create_progress_bar(file_count)?)
    } else {
        None
    };

    let jobs = effective_jobs(cli.jobs);
    let batch_start_time = Instant::now();

    let outcomes = stream::iter(all_files.into_iter().map(|input_file| {
        let target = resolve_output_target(
            &input_file,
            cli.output.as_deref(),
            output_dir.as_deref(),
            file_count,
        );
        let processor = processor.clone();
        let options = *options;
        let progress = progress.clone();

        async move {
            if let Some(ref pb) = progress {
                pb.set_message(format!("Processing {}", input_file.display()));
            }

            let path = input_file.clone();
            let result = tokio::task::spawn_blocking(move || {
                process_single_file(&processor, mode, &path, &target, &options)
            })
            .await
            .context("Processing task failed")
            .and_then(|result| result);

            if let Some(ref pb) = progress {
                pb.inc(1);
            }
            (input_file, result)
        }
    }))
    .buffered(jobs)
    .collect::<Vec<_>>()
    .instrument(spans::batch_processing(file_count))
    .await;

    let mut processed_count = 0;
    let mut failed_count = 0;

    for (input_file, result) in outcomes {
        match result {
            Ok(outcome) => {
                report_outcome(&input_file.display().to_string(), &outcome, processor)?;
                processed_count += 1;
            },
            Err(e) => {
                events::error_with_context(
                    &*e,
                    &format!("Failed to process {}", input_file.display()),
                );
                failed_count += 1;
            },
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {processed_count}, Failed: {failed_count}"
        ));
    }

    if failed_count > 0 {
        events::warning_with_recommendation(
            &format!("Some files failed to process. Processed: {processed_count}, Failed: {failed_count}"),
            "check that the inputs were rendered on a solid backdrop, or rerun with -v",
        );
    }

    if file_count > 1 {
        let batch_total_time = batch_start_time.elapsed();
        info!("Batch processing summary:");
        info!("  Files processed: {}", processed_count);
        info!("  Files failed: {}", failed_count);
        info!("  Total time: {:.2}s", batch_total_time.as_secs_f64());
        info!(
            "  Average per file: {:.2}s",
            if processed_count > 0 {
                batch_total_time.as_secs_f64() / (processed_count as f64)
            } else {
                0.0
            }
        );
    }

    Ok(processed_count)
}

/// Process an image read from stdin
fn process_stdin(
    output_target: Option<&str>,
    processor: &ChromaKeyProcessor,
    mode: Mode,
    options: &CompositeOptions,
) -> Result<usize> {
    events::progress("Reading image from stdin");

    let image_data = read_stdin()?;
    match detect_image_format(&image_data) {
        Some(format) => info!("Detected image format: {}", format.to_uppercase()),
        None => warn!("Could not detect image format from stdin data; decoding may fail"),
    }

    let target = match output_target {
        Some(path) if path != "-" => OutputTarget::File(PathBuf::from(path)),
        _ => OutputTarget::Stdout,
    };

    let outcome = run_mode(processor, mode, &image_data, &target, options)?;
    report_outcome("stdin", &outcome, processor)?;
    Ok(1)
}

/// Read, process and write a single file
fn process_single_file(
    processor: &ChromaKeyProcessor,
    mode: Mode,
    input_path: &Path,
    target: &OutputTarget,
    options: &CompositeOptions,
) -> Result<FileOutcome> {
    let image_data = ImageIOService::read_bytes(input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;
    let format = detect_image_format(&image_data).unwrap_or("unknown");

    let _span = spans::file_processing(input_path, format).entered();
    run_mode(processor, mode, &image_data, target, options)
}

fn run_mode(
    processor: &ChromaKeyProcessor,
    mode: Mode,
    image_data: &[u8],
    target: &OutputTarget,
    options: &CompositeOptions,
) -> Result<FileOutcome> {
    match mode {
        Mode::SelectOnly => Ok(FileOutcome::Selected(
            processor.select_chromakey_color(image_data),
        )),
        Mode::Analyze => processor
            .prepare(image_data)
            .map(|request| FileOutcome::Analyzed(Box::new(request)))
            .context("Failed to analyze image"),
        Mode::Composite => key_and_write(processor, image_data, target, options),
    }
}

fn key_and_write(
    processor: &ChromaKeyProcessor,
    image_data: &[u8],
    target: &OutputTarget,
    options: &CompositeOptions,
) -> Result<FileOutcome> {
    let start_time = Instant::now();
    let output = processor.remove_colored_background(image_data, options);
    let elapsed_ms = start_time.elapsed().as_millis() as u64;
    events::performance_metric("compositing", elapsed_ms);

    match output {
        CompositeOutput::Keyed {
            png,
            key_color,
            stats,
        } => {
            match target {
                OutputTarget::Stdout => write_stdout(&png)?,
                OutputTarget::File(path) => ImageIOService::save_bytes(path, &png)
                    .with_context(|| format!("Failed to save {}", path.display()))?,
            }
            Ok(FileOutcome::Keyed {
                key_color,
                stats,
                target: target.clone(),
                elapsed_ms,
            })
        },
        CompositeOutput::Unchanged { reason, .. } => {
            anyhow::bail!("Background could not be keyed: {}", reason)
        },
    }
}

/// Log or print the result for one input
fn report_outcome(
    label: &str,
    outcome: &FileOutcome,
    processor: &ChromaKeyProcessor,
) -> Result<()> {
    match outcome {
        FileOutcome::Keyed {
            key_color,
            stats,
            target,
            elapsed_ms,
        } => {
            info!(
                "{}: keyed {} ({} {:.1}% transparent, {:.1}% edge) in {}ms -> {}",
                label,
                key_color,
                key_color.to_hex(),
                stats.transparent_percent(),
                stats.semi_transparent_percent(),
                elapsed_ms,
                target
            );
            if stats.transparent_pixels == 0 {
                events::warning_with_recommendation(
                    &format!("{}: no pixel matched the backdrop", label),
                    "pass the rendered color with --target-color or raise --tolerance",
                );
            }
        },
        FileOutcome::Selected(selection) => {
            println!(
                "{}: {} {} {} (safety {:.1}){}",
                label,
                selection.name,
                selection.color,
                selection.color.to_hex(),
                selection.safety_score,
                if selection.is_low_confidence(processor.config().low_confidence_threshold) {
                    " [low confidence]"
                } else {
                    ""
                }
            );
        },
        FileOutcome::Analyzed(request) => {
            let report = serde_json::json!({
                "input": label,
                "analysis": &request.analysis,
                "selection": &request.selection,
                "prompt": &request.prompt,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize analysis")?
            );
        },
    }
    Ok(())
}

fn create_progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn effective_jobs(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

/// Expand the input list into a sorted list of image files
fn collect_input_files(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for input in &cli.input {
        let path = PathBuf::from(input);

        if path.is_file() {
            if is_image_file(&path, &IMAGE_EXTENSIONS) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    // Sort for a stable processing and reporting order
    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

/// Validate and create the batch output directory
fn prepare_output_dir(output: Option<&str>, file_count: usize) -> Result<Option<PathBuf>> {
    if file_count <= 1 {
        return Ok(None);
    }
    let Some(output) = output else {
        return Ok(None);
    };
    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }

    let output_path = PathBuf::from(output);
    if !output_path.exists() {
        std::fs::create_dir_all(&output_path).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;
    } else if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    Ok(Some(output_path))
}

fn resolve_output_target(
    input_path: &Path,
    output: Option<&str>,
    output_dir: Option<&Path>,
    file_count: usize,
) -> OutputTarget {
    if file_count == 1 {
        return match output {
            Some("-") => OutputTarget::Stdout,
            Some(path) => OutputTarget::File(PathBuf::from(path)),
            None => OutputTarget::File(generate_output_path(input_path)),
        };
    }
    match output_dir {
        Some(dir) => OutputTarget::File(generate_output_path_with_dir(input_path, dir)),
        None => OutputTarget::File(generate_output_path(input_path)),
    }
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }

    Ok(buffer)
}

/// Detect image format from binary data by examining magic bytes
fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    const SIGNATURES: [(&[u8], &str); 6] = [
        (&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], "png"),
        (&[0xFF, 0xD8, 0xFF], "jpg"),
        (&[0x49, 0x49, 0x2A, 0x00], "tiff"),
        (&[0x4D, 0x4D, 0x00, 0x2A], "tiff"),
        (&[0x47, 0x49, 0x46, 0x38], "gif"),
        (&[0x42, 0x4D], "bmp"),
    ];

    if data.len() < 4 {
        return None;
    }

    // WebP: RIFF....WEBP
    if data.get(0..4).is_some_and(|slice| slice == b"RIFF")
        && data.get(8..12).is_some_and(|slice| slice == b"WEBP")
    {
        return Some("webp");
    }

    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, format)| *format)
}

/// Write image data to stdout
fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Find image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path, &IMAGE_EXTENSIONS) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path, &IMAGE_EXTENSIONS) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()))
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            } else {
                false
            }
        },
        None => true,
    }
}

/// Default output path next to the input
fn generate_output_path(input_path: &Path) -> PathBuf {
    let stem = input_path.file_stem().unwrap_or_default();
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(format!("{}_transparent.png", stem.to_string_lossy()))
}

/// Output path inside a batch output directory
fn generate_output_path_with_dir(input_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = input_path.file_stem().unwrap_or_default();
    output_dir.join(format!("{}_transparent.png", stem.to_string_lossy()))
}
