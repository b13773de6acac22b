//! Integration tests for complete chroma-key workflows
//!
//! These tests run the full pipeline end to end, using mock renderers in
//! place of the generative model that paints the backdrop.

mod common;

use async_trait::async_trait;
use chroma_bgremove::{
    color::distance, BackdropRenderer, ChromaKeyConfig, ChromaKeyError, ChromaKeyProcessor,
    Color, PassthroughRenderer, RenderRequest, Result,
};
use common::*;
use image::{Rgb, RgbImage};
use std::sync::Mutex;

const STUDIO_WHITE: [u8; 3] = [250, 250, 250];

fn portrait() -> RgbImage {
    subject_on_backdrop(120, 90, STUDIO_WHITE, SKIN)
}

/// Replaces the white studio backdrop with a shade of the requested color
struct ShadeRenderer {
    offset: u8,
    received: Mutex<Vec<(u32, u32)>>,
}

impl ShadeRenderer {
    fn new(offset: u8) -> Self {
        Self {
            offset,
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BackdropRenderer for ShadeRenderer {
    fn name(&self) -> &str {
        "shade"
    }

    async fn render(&self, request: &RenderRequest, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let input = image::load_from_memory(image_bytes)?.to_rgb8();
        self.received.lock().unwrap().push(input.dimensions());

        let backdrop = request.backdrop_color();
        let shade = Rgb([
            backdrop.r.saturating_sub(self.offset),
            backdrop.g.saturating_sub(self.offset),
            backdrop.b.saturating_sub(self.offset),
        ]);
        let rendered = RgbImage::from_fn(input.width(), input.height(), |x, y| {
            let pixel = *input.get_pixel(x, y);
            if distance(Color::from(pixel), Color::from(STUDIO_WHITE)) < 20.0 {
                shade
            } else {
                pixel
            }
        });
        Ok(encode_png(&rendered))
    }
}

/// Returns bytes that are not an image
struct CorruptRenderer;

#[async_trait]
impl BackdropRenderer for CorruptRenderer {
    fn name(&self) -> &str {
        "corrupt"
    }

    async fn render(&self, _request: &RenderRequest, _image_bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(b"<html>rate limited</html>".to_vec())
    }
}

struct UnavailableRenderer;

#[async_trait]
impl BackdropRenderer for UnavailableRenderer {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn render(&self, _request: &RenderRequest, _image_bytes: &[u8]) -> Result<Vec<u8>> {
        Err(ChromaKeyError::render("service unavailable"))
    }
}

#[tokio::test]
async fn test_full_pipeline_with_off_shade_backdrop() -> Result<()> {
    let processor = ChromaKeyProcessor::default();
    let renderer = ShadeRenderer::new(15);

    let result = processor
        .process_with_renderer(&renderer, encode_png(&portrait()))
        .await?;

    assert!(result.is_keyed());
    assert_ne!(result.request.selection.color, Color::from(SKIN));
    assert!(result.request.prompt.contains(&result.request.selection.name));

    // The detected key is the shade actually painted, not the requested color
    let key = result.key_color().unwrap();
    let requested = result.request.backdrop_color();
    assert!(distance(key, requested) > 0.0);
    assert!(distance(key, requested) < 30.0);

    let keyed = decode_rgba(result.bytes());
    assert_eq!(keyed.dimensions(), (120, 90));
    assert_eq!(keyed.get_pixel(1, 1)[3], 0);
    assert_eq!(keyed.get_pixel(60, 45)[3], 255);

    let stats = result.stats().unwrap();
    assert!(stats.transparent_percent() > 60.0);
    assert!(stats.opaque_pixels > 0);

    assert_eq!(result.metadata.renderer, "shade");
    assert_eq!(result.metadata.input_dimensions, (120, 90));
    assert!(result.metadata.timings.render_ms.is_some());
    Ok(())
}

#[tokio::test]
async fn test_prepare_and_finalize_around_external_render() -> Result<()> {
    let processor = ChromaKeyProcessor::default();
    let input = encode_png(&portrait());

    let request = processor.prepare(&input)?;
    assert!(request.analysis.is_valid());
    assert_eq!((request.analysis.width, request.analysis.height), (120, 90));

    let rendered = ShadeRenderer::new(0).render(&request, &input).await?;
    let result = processor.finalize(&rendered, &request);

    assert!(result.is_keyed());
    assert_eq!(result.key_color(), Some(request.backdrop_color()));
    assert_eq!(result.metadata.renderer, "none");

    let summary: serde_json::Value = serde_json::from_str(&result.summary_json()?).unwrap();
    assert_eq!(summary["keyed"], true);
    assert_eq!(summary["key_color"], request.backdrop_color().to_hex());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_render_is_returned_unchanged() -> Result<()> {
    let processor = ChromaKeyProcessor::default();
    let result = processor
        .process_with_renderer(&CorruptRenderer, encode_png(&portrait()))
        .await?;

    assert!(!result.is_keyed());
    assert_eq!(result.bytes(), b"<html>rate limited</html>");
    Ok(())
}

#[tokio::test]
async fn test_renderer_failure_propagates() {
    let processor = ChromaKeyProcessor::default();
    let err = processor
        .process_with_renderer(&UnavailableRenderer, encode_png(&portrait()))
        .await
        .unwrap_err();

    assert!(matches!(err, ChromaKeyError::Render(_)));
    assert!(err.to_string().contains("service unavailable"));
}

#[tokio::test]
async fn test_undecodable_input_fails_before_rendering() {
    let renderer = ShadeRenderer::new(0);
    let result = ChromaKeyProcessor::default()
        .process_with_renderer(&renderer, b"not an image".to_vec())
        .await;

    assert!(result.is_err());
    assert!(renderer.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_oversized_input_is_downscaled_before_rendering() -> Result<()> {
    let config = ChromaKeyConfig::builder().max_input_dimension(60).build()?;
    let processor = ChromaKeyProcessor::new(config)?;
    let renderer = ShadeRenderer::new(0);

    let result = processor
        .process_with_renderer(&renderer, encode_png(&portrait()))
        .await?;

    assert_eq!(renderer.received.lock().unwrap().as_slice(), &[(60, 45)]);
    assert_eq!(result.metadata.input_dimensions, (120, 90));
    assert_eq!(decode_rgba(result.bytes()).dimensions(), (60, 45));
    Ok(())
}

#[tokio::test]
async fn test_passthrough_on_prerendered_green_screen() -> Result<()> {
    let config = ChromaKeyConfig::builder().tolerance(30).build()?;
    let processor = ChromaKeyProcessor::new(config)?;

    let green_screen = encode_png(&subject_on_backdrop(80, 80, STUDIO_GREEN, [200, 30, 30]));
    let result = processor
        .process_with_renderer(&PassthroughRenderer, green_screen)
        .await?;

    // The selection targets the input, but auto-detection keys what is really there
    assert!(result.is_keyed());
    assert!(distance(result.key_color().unwrap(), Color::from(STUDIO_GREEN)) < 1.0);
    assert_eq!(decode_rgba(result.bytes()).get_pixel(0, 0)[3], 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_pipelines_share_a_processor() -> Result<()> {
    let processor = ChromaKeyProcessor::default();
    let renderer = std::sync::Arc::new(ShadeRenderer::new(10));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let processor = processor.clone();
            let renderer = renderer.clone();
            let subject = [200, 40 + i * 30, 40];
            tokio::spawn(async move {
                let input = encode_png(&subject_on_backdrop(64, 64, STUDIO_WHITE, subject));
                processor.process_with_renderer(renderer.as_ref(), input).await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.expect("pipeline task panicked")?;
        assert!(result.is_keyed());
        assert_eq!(decode_rgba(result.bytes()).get_pixel(32, 32)[3], 255);
    }
    assert_eq!(renderer.received.lock().unwrap().len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_process_file_reads_from_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input_path = dir.path().join("portrait.png");
    std::fs::write(&input_path, encode_png(&portrait()))?;

    let processor = ChromaKeyProcessor::default();
    let result = processor
        .process_file(&ShadeRenderer::new(5), &input_path)
        .await?;

    let output_path = dir.path().join("out").join("portrait_transparent.png");
    result.save_png(&output_path)?;
    assert_eq!(decode_rgba(&std::fs::read(&output_path)?).get_pixel(0, 0)[3], 0);

    let missing = processor
        .process_file(&PassthroughRenderer, dir.path().join("missing.png"))
        .await;
    assert!(matches!(missing, Err(ChromaKeyError::Io(_))));
    Ok(())
}
