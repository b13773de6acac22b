#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

//! # Chroma-Key Background Removal Library
//!
//! Background removal in three steps:
//!
//! 1. choose a backdrop color as far as possible from every color of the
//!    subject,
//! 2. have an external generative model render the subject on that solid
//!    color (behind the [`BackdropRenderer`] trait),
//! 3. key the rendered backdrop out into real alpha transparency, with
//!    optional edge feathering.
//!
//! ## Features
//!
//! - **Palette Selection**: weighted minimax scoring over six saturated
//!   backdrop colors, with a safety score
//! - **Backdrop Detection**: border sampling and clustering to find the color
//!   the model actually rendered
//! - **Keying**: Euclidean RGB distance mask with a linear feather band,
//!   PNG RGBA output
//! - **Graceful Degradation**: the core functions never fail; they fall back
//!   to documented defaults and log why
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chroma_bgremove::{remove_colored_background, select_chromakey_color, Color};
//!
//! # fn example(photo: Vec<u8>, rendered: Vec<u8>) {
//! // Pick a backdrop for the photo
//! let selection = select_chromakey_color(&photo);
//! println!("render on {} {}", selection.name, selection.color);
//!
//! // ... the generative model renders the subject on `selection.color` ...
//!
//! // Key the rendered backdrop out
//! let output = remove_colored_background(&rendered, selection.color, 50, true, true);
//! std::fs::write("out.png", output.bytes()).unwrap();
//! # }
//! ```
//!
//! ## Full Pipeline
//!
//! ```rust,no_run
//! use chroma_bgremove::{ChromaKeyConfig, ChromaKeyProcessor, PassthroughRenderer};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ChromaKeyConfig::builder().tolerance(40).build()?;
//! let processor = ChromaKeyProcessor::new(config)?;
//!
//! let input = tokio::fs::read("rendered.png").await?;
//! let result = processor.process_with_renderer(&PassthroughRenderer, input).await?;
//! result.save_png("output.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and tracing setup
//! - `webp-support` (default): WebP input decoding
//! - `tracing-json`: JSON log output for the CLI

pub mod analysis;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod compositor;
pub mod config;
pub mod detector;
pub mod error;
pub mod processor;
pub mod profile;
pub mod prompt;
pub mod selector;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

// Public API exports
pub use analysis::{analyze_image, resize_if_needed, ImageAnalysis, ImageAnalyzer};
pub use color::{Color, DistanceStats, MAX_RGB_DISTANCE};
pub use compositor::{
    ChromaKeyCompositor, CompositeOptions, CompositeOutput, TransparencyStats,
};
pub use config::{ChromaKeyConfig, ChromaKeyConfigBuilder, DEFAULT_CLUSTER_TOLERANCE, DEFAULT_TOLERANCE};
pub use detector::{BackgroundDetection, BackgroundDetector};
pub use error::{ChromaKeyError, Result};
pub use processor::{BackdropRenderer, ChromaKeyProcessor, PassthroughRenderer};
pub use profile::{SubjectProfile, SubjectProfiler};
pub use prompt::PromptBuilder;
pub use selector::{ChromakeySelection, ChromakeySelector, CHROMAKEY_PALETTE};
pub use services::ImageIOService;
pub use types::{ChromaKeyResult, ProcessingMetadata, ProcessingTimings, RenderRequest};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Choose the backdrop color farthest from the subject's colors
///
/// Never fails: undecodable input yields green with a safety score of 0.
/// A safety score under 50 is logged as a low-confidence selection.
///
/// # Examples
///
/// ```rust,no_run
/// use chroma_bgremove::select_chromakey_color;
///
/// let photo = std::fs::read("photo.jpg").unwrap();
/// let selection = select_chromakey_color(&photo);
/// println!("{} {} (safety {:.1})", selection.name, selection.color, selection.safety_score);
/// ```
#[must_use]
pub fn select_chromakey_color(image_bytes: &[u8]) -> ChromakeySelection {
    ChromakeySelector::default().select_bytes(image_bytes)
}

/// Fallible form of [`select_chromakey_color`]
pub fn try_select_chromakey_color(image_bytes: &[u8]) -> Result<ChromakeySelection> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    ChromakeySelector::default().select(&image)
}

/// Estimate the backdrop color actually present in a rendered image
///
/// `requested` is the color the renderer was asked for; it enables
/// cross-validation and is the fallback when nothing can be sampled.
/// `tolerance` is the clustering radius, not the keying tolerance of
/// [`remove_colored_background`]: `None` means [`DEFAULT_CLUSTER_TOLERANCE`]
/// (30), whereas keying defaults to [`DEFAULT_TOLERANCE`] (50).
#[must_use]
pub fn detect_background_color(
    image_bytes: &[u8],
    requested: Option<Color>,
    tolerance: Option<u8>,
) -> Color {
    BackgroundDetector::default()
        .with_cluster_tolerance(tolerance)
        .detect_bytes(image_bytes, requested)
        .color
}

/// Fallible form of [`detect_background_color`] returning full detection details
pub fn try_detect_background_color(
    image_bytes: &[u8],
    requested: Option<Color>,
    tolerance: Option<u8>,
) -> Result<BackgroundDetection> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    BackgroundDetector::default()
        .with_cluster_tolerance(tolerance)
        .detect(&image, requested)
}

/// Key a solid backdrop out of a rendered image
///
/// Pixels within `√3·tolerance` of the key color become fully transparent;
/// with `edge_feather` a ring of width `tolerance/2` beyond that gets a
/// linear alpha ramp. With `auto_detect` the key color is the detected
/// backdrop rather than `target`.
///
/// Never fails: on any error the original bytes come back as
/// [`CompositeOutput::Unchanged`].
#[must_use]
pub fn remove_colored_background(
    image_bytes: &[u8],
    target: Color,
    tolerance: u8,
    auto_detect: bool,
    edge_feather: bool,
) -> CompositeOutput {
    let options = CompositeOptions {
        target,
        tolerance,
        auto_detect,
        edge_feather,
    };
    ChromaKeyCompositor::default().composite(image_bytes, &options)
}

/// Fallible form of [`remove_colored_background`]
pub fn try_remove_colored_background(
    image_bytes: &[u8],
    options: &CompositeOptions,
) -> Result<CompositeOutput> {
    ChromaKeyCompositor::default().try_composite(image_bytes, options)
}

/// Key a rendered image read from an async stream
///
/// ```rust,no_run
/// use chroma_bgremove::{remove_colored_background_from_reader, CompositeOptions};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("rendered.png").await?;
/// let output = remove_colored_background_from_reader(file, &CompositeOptions::default()).await?;
/// tokio::fs::write("output.png", output.bytes()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_colored_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    options: &CompositeOptions,
) -> Result<CompositeOutput> {
    let buffer = ImageIOService::read_from_reader(reader).await?;
    let options = *options;
    tokio::task::spawn_blocking(move || {
        ChromaKeyCompositor::default().composite(&buffer, &options)
    })
    .await
    .map_err(|e| ChromaKeyError::internal(format!("Compositing task failed: {}", e)))
}
