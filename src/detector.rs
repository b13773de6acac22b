//! Background color detection
//!
//! Generative models rarely render the exact backdrop color they were asked
//! for. The detector samples a band along the image border, groups similar
//! pixels and reports the color the backdrop actually has.

use crate::{
    color::{distance, Color},
    config::{ChromaKeyConfig, DEFAULT_CLUSTER_TOLERANCE},
    error::{ChromaKeyError, Result},
    services::ImageIOService,
    utils::ImagePreprocessor,
};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

/// A group of similar border pixels
///
/// Membership is decided against the first member, not the running mean.
#[derive(Debug, Clone)]
pub struct ColorCluster {
    representative: Color,
    sums: [u64; 3],
    count: usize,
}

impl ColorCluster {
    fn new(first: Color) -> Self {
        Self {
            representative: first,
            sums: [u64::from(first.r), u64::from(first.g), u64::from(first.b)],
            count: 1,
        }
    }

    fn push(&mut self, color: Color) {
        self.sums[0] += u64::from(color.r);
        self.sums[1] += u64::from(color.g);
        self.sums[2] += u64::from(color.b);
        self.count += 1;
    }

    #[must_use]
    pub fn representative(&self) -> Color {
        self.representative
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Integer mean of all members
    #[must_use]
    pub fn mean(&self) -> Color {
        let n = self.count.max(1) as u64;
        let channel = |sum: u64| u8::try_from(sum / n).unwrap_or(u8::MAX);
        Color::new(
            channel(self.sums[0]),
            channel(self.sums[1]),
            channel(self.sums[2]),
        )
    }
}

/// Greedy single-pass clustering
///
/// Each color joins the first existing cluster whose representative lies
/// within `tolerance`, otherwise it starts a new cluster. Clusters are
/// returned largest first; equal sizes keep creation order.
#[must_use]
pub fn cluster_colors(colors: &[Color], tolerance: f64) -> Vec<ColorCluster> {
    let mut clusters: Vec<ColorCluster> = Vec::new();

    for &color in colors {
        match clusters
            .iter_mut()
            .find(|cluster| distance(cluster.representative, color) <= tolerance)
        {
            Some(cluster) => cluster.push(color),
            None => clusters.push(ColorCluster::new(color)),
        }
    }

    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    clusters
}

/// Outcome of a background detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundDetection {
    pub color: Color,
    /// Share of sampled border pixels in the chosen cluster
    pub cluster_share: f64,
    pub cluster_count: usize,
    pub sampled_pixels: usize,
    /// A smaller cluster was preferred because it matched the requested color
    pub cross_validated: bool,
    /// No cluster was available and a default color was returned
    pub fallback: bool,
}

impl BackgroundDetection {
    /// Requested color if given, else pure green
    #[must_use]
    pub fn fallback(requested: Option<Color>) -> Self {
        Self {
            color: requested.unwrap_or(Color::GREEN),
            cluster_share: 0.0,
            cluster_count: 0,
            sampled_pixels: 0,
            cross_validated: false,
            fallback: true,
        }
    }
}

/// Border-band background detector
#[derive(Debug, Clone)]
pub struct BackgroundDetector {
    analysis_size: u32,
    border_thickness: u32,
    cluster_tolerance: f64,
    cross_validation_threshold: f64,
    min_cluster_share: f64,
    max_candidate_clusters: usize,
}

impl Default for BackgroundDetector {
    fn default() -> Self {
        Self::from_config(&ChromaKeyConfig::default())
    }
}

impl BackgroundDetector {
    #[must_use]
    pub fn from_config(config: &ChromaKeyConfig) -> Self {
        Self {
            analysis_size: config.analysis_size,
            border_thickness: config.border_thickness,
            cluster_tolerance: f64::from(config.cluster_tolerance),
            cross_validation_threshold: config.cross_validation_threshold,
            min_cluster_share: config.min_cluster_share,
            max_candidate_clusters: config.max_candidate_clusters,
        }
    }

    /// Override the clustering tolerance (`None` restores the default of 30)
    #[must_use]
    pub fn with_cluster_tolerance(mut self, tolerance: Option<u8>) -> Self {
        self.cluster_tolerance = f64::from(tolerance.unwrap_or(DEFAULT_CLUSTER_TOLERANCE));
        self
    }

    /// Detect from encoded bytes, falling back to the requested color or green
    #[must_use]
    pub fn detect_bytes(&self, image_bytes: &[u8], requested: Option<Color>) -> BackgroundDetection {
        match ImageIOService::load_from_bytes(image_bytes)
            .and_then(|image| self.detect(&image, requested))
        {
            Ok(detection) => detection,
            Err(e) => {
                let detection = BackgroundDetection::fallback(requested);
                log::warn!(
                    "Background detection failed, using {}: {}",
                    detection.color,
                    e
                );
                detection
            }
        }
    }

    /// Detect the backdrop color of a decoded image
    pub fn detect(&self, image: &DynamicImage, requested: Option<Color>) -> Result<BackgroundDetection> {
        let sample = ImagePreprocessor::downsample_to_fit(&image.to_rgb8(), self.analysis_size);
        self.detect_from_sample(&sample, requested)
    }

    /// Detect using the border band of an already downsampled buffer
    pub fn detect_from_sample(
        &self,
        sample: &RgbImage,
        requested: Option<Color>,
    ) -> Result<BackgroundDetection> {
        let border = ImagePreprocessor::border_pixels(sample, self.border_thickness);
        if border.is_empty() {
            return Err(ChromaKeyError::empty_sample("border band has no pixels"));
        }

        let clusters = cluster_colors(&border, self.cluster_tolerance);
        let dominant = clusters
            .first()
            .ok_or_else(|| ChromaKeyError::empty_sample("no border clusters"))?;

        let sampled = border.len();
        let share = |cluster: &ColorCluster| cluster.count as f64 / sampled as f64;

        let mut chosen = dominant;
        let mut cross_validated = false;

        if let Some(requested) = requested {
            let detected_distance = distance(dominant.mean(), requested);
            if detected_distance > self.cross_validation_threshold {
                log::warn!(
                    "Detected background {} is {:.1} away from requested {}; checking smaller clusters",
                    dominant.mean(),
                    detected_distance,
                    requested
                );

                let alternative = clusters
                    .iter()
                    .take(self.max_candidate_clusters)
                    .skip(1)
                    .find(|cluster| {
                        distance(cluster.mean(), requested) <= self.cross_validation_threshold
                            && share(cluster) >= self.min_cluster_share
                    });

                if let Some(cluster) = alternative {
                    log::info!(
                        "Using cluster {} ({:.1}% of border) closer to the requested color",
                        cluster.mean(),
                        share(cluster) * 100.0
                    );
                    chosen = cluster;
                    cross_validated = true;
                }
            }
        }

        let detection = BackgroundDetection {
            color: chosen.mean(),
            cluster_share: share(chosen),
            cluster_count: clusters.len(),
            sampled_pixels: sampled,
            cross_validated,
            fallback: false,
        };

        log::debug!(
            "Detected background {} from {} border pixels in {} clusters ({:.1}% share)",
            detection.color,
            detection.sampled_pixels,
            detection.cluster_count,
            detection.cluster_share * 100.0
        );

        Ok(detection)
    }
}
