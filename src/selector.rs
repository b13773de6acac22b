//! Chromakey color selection
//!
//! Picks the palette color farthest from every color of the subject, using a
//! weighted minimax score over the downsampled pixels.

use crate::{
    color::{distance, Color, DistanceStats},
    config::ChromaKeyConfig,
    error::{ChromaKeyError, Result},
    services::ImageIOService,
    utils::ImagePreprocessor,
};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Candidate backdrop colors, in tie-breaking order
pub const CHROMAKEY_PALETTE: [(&str, Color); 6] = [
    ("green", Color::GREEN),
    ("blue", Color::BLUE),
    ("magenta", Color::MAGENTA),
    ("cyan", Color::CYAN),
    ("yellow", Color::YELLOW),
    ("red", Color::RED),
];

const MIN_WEIGHT: f64 = 0.5;
const PERCENTILE_WEIGHT: f64 = 0.3;
const MEAN_WEIGHT: f64 = 0.2;

/// Selected backdrop color and how safely it separates from the subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromakeySelection {
    pub color: Color,
    pub name: String,
    /// Minimum distance from the color to any sampled subject pixel
    pub safety_score: f64,
    pub weighted_score: f64,
    pub mean_distance: f64,
    pub percentile10_distance: f64,
}

impl ChromakeySelection {
    /// Green with zero safety, returned when the image cannot be analyzed
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            color: Color::GREEN,
            name: "green".to_string(),
            safety_score: 0.0,
            weighted_score: 0.0,
            mean_distance: 0.0,
            percentile10_distance: 0.0,
        }
    }

    /// Whether the safety score falls under `threshold`
    #[must_use]
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.safety_score < threshold
    }
}

/// Weighted minimax score: `0.5·min + 0.3·p10 + 0.2·mean`
#[must_use]
pub fn weighted_score(stats: &DistanceStats) -> f64 {
    MIN_WEIGHT * stats.min + PERCENTILE_WEIGHT * stats.percentile10 + MEAN_WEIGHT * stats.mean
}

/// Palette selector
#[derive(Debug, Clone)]
pub struct ChromakeySelector {
    analysis_size: u32,
    low_confidence_threshold: f64,
}

impl Default for ChromakeySelector {
    fn default() -> Self {
        Self::from_config(&ChromaKeyConfig::default())
    }
}

impl ChromakeySelector {
    #[must_use]
    pub fn from_config(config: &ChromaKeyConfig) -> Self {
        Self {
            analysis_size: config.analysis_size,
            low_confidence_threshold: config.low_confidence_threshold,
        }
    }

    /// Select from encoded image bytes, falling back to green on failure
    #[must_use]
    pub fn select_bytes(&self, image_bytes: &[u8]) -> ChromakeySelection {
        match ImageIOService::load_from_bytes(image_bytes).and_then(|image| self.select(&image)) {
            Ok(selection) => selection,
            Err(e) => {
                log::warn!("Chromakey selection failed, defaulting to green: {}", e);
                ChromakeySelection::fallback()
            }
        }
    }

    /// Select the best palette color for a decoded image
    pub fn select(&self, image: &DynamicImage) -> Result<ChromakeySelection> {
        let sample = ImagePreprocessor::downsample_to_fit(&image.to_rgb8(), self.analysis_size);
        self.select_from_sample(&sample)
    }

    /// Select using every pixel of an already downsampled buffer
    pub fn select_from_sample(&self, sample: &RgbImage) -> Result<ChromakeySelection> {
        let pixels = ImagePreprocessor::pixels(sample);
        if pixels.is_empty() {
            return Err(ChromaKeyError::empty_sample("no pixels to compare against"));
        }

        let mut best: Option<ChromakeySelection> = None;
        for (name, candidate) in CHROMAKEY_PALETTE {
            let distances: Vec<f64> = pixels.iter().map(|&p| distance(candidate, p)).collect();
            let stats = DistanceStats::from_distances(&distances)
                .ok_or_else(|| ChromaKeyError::empty_sample("no distances computed"))?;
            let score = weighted_score(&stats);

            log::debug!(
                "Candidate {} {}: min={:.1} p10={:.1} mean={:.1} score={:.1}",
                name,
                candidate,
                stats.min,
                stats.percentile10,
                stats.mean,
                score
            );

            // Strictly greater keeps the earlier palette entry on ties
            if best.as_ref().map_or(true, |b| score > b.weighted_score) {
                best = Some(ChromakeySelection {
                    color: candidate,
                    name: name.to_string(),
                    safety_score: stats.min,
                    weighted_score: score,
                    mean_distance: stats.mean,
                    percentile10_distance: stats.percentile10,
                });
            }
        }

        let selection =
            best.ok_or_else(|| ChromaKeyError::internal("chromakey palette is empty"))?;

        if selection.is_low_confidence(self.low_confidence_threshold) {
            log::warn!(
                "Low confidence chromakey selection: {} has safety score {:.1} (< {:.0}); \
                 the subject contains colors close to every candidate",
                selection.name,
                selection.safety_score,
                self.low_confidence_threshold
            );
        } else {
            log::info!(
                "Selected {} chromakey {} (safety score {:.1})",
                selection.name,
                selection.color,
                selection.safety_score
            );
        }

        Ok(selection)
    }
}
