//! Result and metadata types for pipeline runs

use crate::{
    analysis::ImageAnalysis,
    color::Color,
    compositor::{CompositeOutput, TransparencyStats},
    error::Result,
    selector::ChromakeySelection,
    services::ImageIOService,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version tag recorded in every result's metadata
pub const PIPELINE_VERSION: &str = "2";

/// Everything the renderer needs to produce a backdrop image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub analysis: ImageAnalysis,
    pub selection: ChromakeySelection,
    /// Instruction text for the generative model
    pub prompt: String,
}

impl RenderRequest {
    /// Backdrop color the renderer is asked to use
    #[must_use]
    pub fn backdrop_color(&self) -> Color {
        self.selection.color
    }
}

/// Per-stage timing breakdown in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Input decoding and resize
    pub decode_ms: u64,

    /// Heuristic analysis and subject profiling
    pub analysis_ms: u64,

    /// Chromakey palette scoring
    pub selection_ms: u64,

    /// External renderer call, when one was made
    pub render_ms: Option<u64>,

    /// Background detection and alpha masking
    pub compositing_ms: u64,

    /// PNG encoding of the result
    pub encode_ms: u64,

    /// Total end-to-end time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn measured_ms(&self) -> u64 {
        self.decode_ms
            + self.analysis_ms
            + self.selection_ms
            + self.render_ms.unwrap_or(0)
            + self.compositing_ms
            + self.encode_ms
    }

    /// Share of the total spent waiting on the renderer
    #[must_use]
    pub fn render_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.render_ms.unwrap_or(0) as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        self.total_ms.saturating_sub(self.measured_ms())
    }
}

/// Metadata about one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub timings: ProcessingTimings,

    /// Name reported by the renderer, `"none"` when finalizing directly
    pub renderer: String,

    pub pipeline_version: String,

    /// When the run completed
    pub timestamp: DateTime<Utc>,

    pub input_dimensions: (u32, u32),
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(renderer: impl Into<String>) -> Self {
        Self {
            timings: ProcessingTimings::new(),
            renderer: renderer.into(),
            pipeline_version: PIPELINE_VERSION.to_string(),
            timestamp: Utc::now(),
            input_dimensions: (0, 0),
        }
    }
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone)]
pub struct ChromaKeyResult {
    pub request: RenderRequest,
    pub output: CompositeOutput,
    pub metadata: ProcessingMetadata,
}

impl ChromaKeyResult {
    /// Whether a transparent image was produced
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.output.is_keyed()
    }

    #[must_use]
    pub fn key_color(&self) -> Option<Color> {
        self.output.key_color()
    }

    #[must_use]
    pub fn stats(&self) -> Option<&TransparencyStats> {
        self.output.stats()
    }

    /// Output bytes (transparent PNG or the unmodified rendered image)
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.output.bytes()
    }

    /// Write the output bytes to `path`
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageIOService::save_bytes(path, self.bytes())
    }

    /// Serialize request, statistics and metadata as a JSON summary
    pub fn summary_json(&self) -> Result<String> {
        let summary = serde_json::json!({
            "keyed": self.is_keyed(),
            "key_color": self.key_color().map(Color::to_hex),
            "stats": self.stats(),
            "selection": &self.request.selection,
            "analysis": &self.request.analysis,
            "metadata": &self.metadata,
        });
        Ok(serde_json::to_string_pretty(&summary)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_overhead() {
        let timings = ProcessingTimings {
            decode_ms: 5,
            analysis_ms: 10,
            selection_ms: 5,
            render_ms: Some(60),
            compositing_ms: 15,
            encode_ms: 3,
            total_ms: 100,
        };
        assert_eq!(timings.other_overhead_ms(), 2);
        assert!((timings.render_ratio() - 0.6).abs() < 1e-12);
        assert_eq!(ProcessingTimings::new().render_ratio(), 0.0);
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = ProcessingMetadata::new("passthrough");
        assert_eq!(metadata.renderer, "passthrough");
        assert_eq!(metadata.pipeline_version, PIPELINE_VERSION);
        assert!(metadata.timings.render_ms.is_none());
    }

    #[test]
    fn test_summary_json_for_unchanged_output() {
        let result = ChromaKeyResult {
            request: RenderRequest {
                analysis: ImageAnalysis::failed("x"),
                selection: ChromakeySelection::fallback(),
                prompt: String::new(),
            },
            output: CompositeOutput::Unchanged {
                original: vec![1, 2, 3],
                reason: "decode".to_string(),
            },
            metadata: ProcessingMetadata::new("none"),
        };
        let json = result.summary_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["keyed"], false);
        assert!(value["key_color"].is_null());
        assert_eq!(result.bytes(), &[1, 2, 3]);
    }
}
