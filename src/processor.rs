//! Unified chroma-key processor
//!
//! `ChromaKeyProcessor` wires the pipeline stages together behind one
//! validated configuration. The library functions, the CLI and any bot
//! frontend all go through it, so every caller gets the same behavior.
//!
//! The generative model that paints the backdrop is not part of this crate.
//! Callers plug it in through the [`BackdropRenderer`] trait.

use crate::{
    analysis::{try_resize_if_needed, ImageAnalysis, ImageAnalyzer},
    color::Color,
    compositor::{ChromaKeyCompositor, CompositeOptions, CompositeOutput},
    config::ChromaKeyConfig,
    detector::{BackgroundDetection, BackgroundDetector},
    error::{ChromaKeyError, Result},
    profile::SubjectProfiler,
    prompt::PromptBuilder,
    selector::{ChromakeySelection, ChromakeySelector},
    services::ImageIOService,
    types::{ChromaKeyResult, ProcessingMetadata, ProcessingTimings, RenderRequest},
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use log::{debug, info};
use std::path::Path;
use tracing::{info as trace_info, instrument, span, Instrument, Level};

/// External service that renders the subject on a solid backdrop
///
/// Implementations receive the prepared input bytes and the request carrying
/// the chosen backdrop color and instruction text, and return the rendered
/// image bytes.
#[async_trait]
pub trait BackdropRenderer: Send + Sync {
    /// Short identifier recorded in result metadata
    fn name(&self) -> &str;

    /// Render the subject against `request.selection.color`
    ///
    /// # Errors
    ///
    /// Implementations should report failures as `ChromaKeyError::Render`;
    /// any other error kind is converted to one by the processor.
    async fn render(&self, request: &RenderRequest, image_bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Renderer that returns its input unchanged
///
/// Used when the input was already rendered on a solid backdrop.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRenderer;

#[async_trait]
impl BackdropRenderer for PassthroughRenderer {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn render(&self, _request: &RenderRequest, image_bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(image_bytes.to_vec())
    }
}

/// Chroma-key pipeline processor
///
/// Cheap to clone; clones share no mutable state and can run concurrently.
#[derive(Debug, Clone)]
pub struct ChromaKeyProcessor {
    config: ChromaKeyConfig,
    analyzer: ImageAnalyzer,
    selector: ChromakeySelector,
    compositor: ChromaKeyCompositor,
}

impl ChromaKeyProcessor {
    /// Create a processor from a configuration
    ///
    /// # Errors
    ///
    /// Returns `ChromaKeyError::InvalidConfig` when the configuration fails
    /// validation.
    pub fn new(config: ChromaKeyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: ImageAnalyzer::new(SubjectProfiler::from_config(&config)),
            selector: ChromakeySelector::from_config(&config),
            compositor: ChromaKeyCompositor::from_config(&config),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ChromaKeyConfig {
        &self.config
    }

    /// Pick the backdrop color for an input image (green on failure)
    #[must_use]
    pub fn select_chromakey_color(&self, image_bytes: &[u8]) -> ChromakeySelection {
        let _span = span!(Level::DEBUG, "chromakey_selection", bytes = image_bytes.len()).entered();
        self.selector.select_bytes(image_bytes)
    }

    /// Detect the rendered backdrop color with full detection details
    #[must_use]
    pub fn detect_background(
        &self,
        image_bytes: &[u8],
        requested: Option<Color>,
        cluster_tolerance: Option<u8>,
    ) -> BackgroundDetection {
        let _span = span!(Level::DEBUG, "background_detection", requested = ?requested).entered();
        let mut detector = BackgroundDetector::from_config(&self.config);
        if cluster_tolerance.is_some() {
            detector = detector.with_cluster_tolerance(cluster_tolerance);
        }
        detector.detect_bytes(image_bytes, requested)
    }

    /// Key out the backdrop of a rendered image
    #[must_use]
    pub fn remove_colored_background(
        &self,
        image_bytes: &[u8],
        options: &CompositeOptions,
    ) -> CompositeOutput {
        let _span = span!(
            Level::INFO,
            "compositing",
            target = %options.target,
            tolerance = options.tolerance
        )
        .entered();
        self.compositor.composite(image_bytes, options)
    }

    /// Measure an input image (neutral analysis on failure)
    #[must_use]
    pub fn analyze(&self, image_bytes: &[u8]) -> ImageAnalysis {
        self.analyzer.analyze_bytes(image_bytes)
    }

    /// Build the render request for an input image
    ///
    /// # Errors
    ///
    /// Returns an error when the input cannot be decoded.
    pub fn prepare(&self, image_bytes: &[u8]) -> Result<RenderRequest> {
        let mut timings = ProcessingTimings::new();
        let image = ImageIOService::load_from_bytes(image_bytes)?;
        self.build_request(&image, &mut timings)
    }

    /// Composite a rendered image for a previously prepared request
    ///
    /// Never fails: when keying is impossible the output carries the rendered
    /// bytes unchanged.
    #[must_use]
    pub fn finalize(&self, rendered_bytes: &[u8], request: &RenderRequest) -> ChromaKeyResult {
        let mut metadata = ProcessingMetadata::new("none");
        let start = Instant::now();
        let output = self.composite_timed(rendered_bytes, request, &mut metadata);
        metadata.timings.total_ms = start.elapsed().as_millis() as u64;

        ChromaKeyResult {
            request: request.clone(),
            output,
            metadata,
        }
    }

    /// Run the full pipeline with an external renderer
    ///
    /// CPU-bound stages run on the blocking thread pool; only the renderer
    /// call is awaited on the async runtime.
    ///
    /// # Errors
    ///
    /// Returns an error when the input cannot be decoded or the renderer
    /// fails. Compositing failures do not error; see [`Self::finalize`].
    #[instrument(skip(self, renderer, image_bytes), fields(renderer = renderer.name(), bytes = image_bytes.len()))]
    pub async fn process_with_renderer(
        &self,
        renderer: &dyn BackdropRenderer,
        image_bytes: Vec<u8>,
    ) -> Result<ChromaKeyResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();

        let processor = self.clone();
        let (prepared_bytes, request, dimensions, prepare_timings) =
            tokio::task::spawn_blocking(move || {
                let mut timings = ProcessingTimings::new();
                processor
                    .prepare_input(&image_bytes, &mut timings)
                    .map(|(bytes, request, dims)| (bytes, request, dims, timings))
            })
            .await
            .map_err(|e| ChromaKeyError::internal(format!("Preparation task failed: {}", e)))??;
        timings.decode_ms = prepare_timings.decode_ms;
        timings.analysis_ms = prepare_timings.analysis_ms;
        timings.selection_ms = prepare_timings.selection_ms;

        trace_info!(
            backdrop = %request.selection.color,
            safety_score = request.selection.safety_score,
            "Requesting backdrop render"
        );

        let render_start = Instant::now();
        let rendered = renderer
            .render(&request, &prepared_bytes)
            .instrument(tracing::info_span!("render", renderer = renderer.name()))
            .await
            .map_err(|e| match e {
                ChromaKeyError::Render(_) => e,
                other => ChromaKeyError::render(other.to_string()),
            })?;
        timings.render_ms = Some(render_start.elapsed().as_millis() as u64);

        let processor = self.clone();
        let renderer_name = renderer.name().to_string();
        let mut result = tokio::task::spawn_blocking(move || {
            let mut metadata = ProcessingMetadata::new(renderer_name);
            let output = processor.composite_timed(&rendered, &request, &mut metadata);
            ChromaKeyResult {
                request,
                output,
                metadata,
            }
        })
        .await
        .map_err(|e| ChromaKeyError::internal(format!("Compositing task failed: {}", e)))?;

        timings.compositing_ms = result.metadata.timings.compositing_ms;
        timings.encode_ms = result.metadata.timings.encode_ms;
        timings.total_ms = total_start.elapsed().as_millis() as u64;
        result.metadata.timings = timings;
        result.metadata.input_dimensions = dimensions;

        info!(
            "Pipeline finished in {}ms (render {}ms, keyed: {})",
            result.metadata.timings.total_ms,
            result.metadata.timings.render_ms.unwrap_or(0),
            result.is_keyed()
        );

        Ok(result)
    }

    /// Read a file and run the full pipeline on it
    ///
    /// # Errors
    ///
    /// Returns file I/O errors in addition to those of
    /// [`Self::process_with_renderer`].
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        renderer: &dyn BackdropRenderer,
        input_path: P,
    ) -> Result<ChromaKeyResult> {
        let path = input_path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChromaKeyError::file_io_error("read input image", path, &e))?;
        self.process_with_renderer(renderer, bytes).await
    }

    /// Decode, downscale oversized input, analyze and select
    fn prepare_input(
        &self,
        image_bytes: &[u8],
        timings: &mut ProcessingTimings,
    ) -> Result<(Vec<u8>, RenderRequest, (u32, u32))> {
        let decode_start = Instant::now();
        let image = ImageIOService::load_from_bytes(image_bytes)?;
        let dimensions = image.dimensions();
        let max_side = self.config.max_input_dimension;

        let (image, bytes) = if dimensions.0 > max_side || dimensions.1 > max_side {
            let resized = try_resize_if_needed(image_bytes, max_side)?;
            (ImageIOService::load_from_bytes(&resized)?, resized)
        } else {
            (image, image_bytes.to_vec())
        };
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;

        let request = self.build_request(&image, timings)?;
        Ok((bytes, request, dimensions))
    }

    fn build_request(&self, image: &DynamicImage, timings: &mut ProcessingTimings) -> Result<RenderRequest> {
        let analysis = {
            let _span = span!(Level::DEBUG, "analysis", width = image.width(), height = image.height()).entered();
            let start = Instant::now();
            let analysis = self.analyzer.analyze(image);
            timings.analysis_ms = start.elapsed().as_millis() as u64;
            analysis
        };

        let selection = {
            let _span = span!(Level::DEBUG, "chromakey_selection").entered();
            let start = Instant::now();
            let selection = self.selector.select(image)?;
            timings.selection_ms = start.elapsed().as_millis() as u64;
            selection
        };

        if analysis.is_subject_green == Some(true) && selection.color == Color::GREEN {
            log::warn!("Green subject was assigned a green backdrop");
        }

        let prompt = PromptBuilder::build_prompt(&analysis, &selection);
        debug!("Render prompt: {}", prompt);

        Ok(RenderRequest {
            analysis,
            selection,
            prompt,
        })
    }

    fn composite_timed(
        &self,
        rendered_bytes: &[u8],
        request: &RenderRequest,
        metadata: &mut ProcessingMetadata,
    ) -> CompositeOutput {
        let options = CompositeOptions::from_config(request.selection.color, &self.config);
        let _span = span!(
            Level::INFO,
            "compositing",
            target = %options.target,
            tolerance = options.tolerance,
            auto_detect = options.auto_detect
        )
        .entered();

        let image = match ImageIOService::load_from_bytes(rendered_bytes) {
            Ok(image) => image,
            Err(e) => {
                log::error!("Rendered image could not be decoded: {}", e);
                return CompositeOutput::Unchanged {
                    original: rendered_bytes.to_vec(),
                    reason: e.to_string(),
                };
            }
        };
        if metadata.input_dimensions == (0, 0) {
            metadata.input_dimensions = image.dimensions();
        }

        let start = Instant::now();
        let keyed = self.compositor.key_image(&image, &options);
        metadata.timings.compositing_ms = start.elapsed().as_millis() as u64;

        let encode_start = Instant::now();
        let encoded = ImageIOService::encode_png(&keyed.image);
        metadata.timings.encode_ms = encode_start.elapsed().as_millis() as u64;

        match encoded {
            Ok(png) => CompositeOutput::Keyed {
                png,
                key_color: keyed.key_color,
                stats: keyed.stats,
            },
            Err(e) => {
                log::error!("PNG encoding failed, returning rendered image: {}", e);
                CompositeOutput::Unchanged {
                    original: rendered_bytes.to_vec(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl Default for ChromaKeyProcessor {
    fn default() -> Self {
        let config = ChromaKeyConfig::default();
        Self {
            analyzer: ImageAnalyzer::new(SubjectProfiler::from_config(&config)),
            selector: ChromakeySelector::from_config(&config),
            compositor: ChromaKeyCompositor::from_config(&config),
            config,
        }
    }
}
