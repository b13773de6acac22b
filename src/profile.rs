//! Subject color profiling
//!
//! Estimates the dominant color at the center of the image, where the
//! subject usually sits, and classifies it as green-dominant or not. A green
//! subject must not be rendered on a green backdrop.

use crate::{
    color::Color,
    config::ChromaKeyConfig,
    error::{ChromaKeyError, Result},
    services::ImageIOService,
    utils::ImagePreprocessor,
};
use image::{DynamicImage, RgbImage};
use kmeans_colors::get_kmeans;
use palette::{cast::from_component_slice, Srgb};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum green channel value for a green-dominant classification
const GREEN_MIN_CHANNEL: u8 = 80;

/// Minimum `g / (r + g + b)` share for a green-dominant classification
const GREEN_MIN_RATIO: f64 = 0.3;

const KMEANS_MAX_ITER: usize = 20;
const KMEANS_CONVERGE: f32 = 0.0025;

/// Dominant subject color and its green classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub dominant_color: Color,
    pub is_green: bool,
}

impl SubjectProfile {
    /// Neutral profile used when the image cannot be analyzed
    pub const FALLBACK: Self = Self {
        dominant_color: Color::GRAY,
        is_green: false,
    };

    #[must_use]
    pub fn from_color(dominant_color: Color) -> Self {
        Self {
            dominant_color,
            is_green: is_green_dominant(dominant_color),
        }
    }
}

/// Green-dominant iff green beats both other channels, is at least 80 and
/// holds more than 30% of the channel sum
#[must_use]
pub fn is_green_dominant(color: Color) -> bool {
    color.g > color.r
        && color.g > color.b
        && color.g >= GREEN_MIN_CHANNEL
        && color.green_ratio() > GREEN_MIN_RATIO
}

/// Center-crop k-means profiler
#[derive(Debug, Clone)]
pub struct SubjectProfiler {
    analysis_size: u32,
    clusters: usize,
    seed: u64,
}

impl Default for SubjectProfiler {
    fn default() -> Self {
        Self::from_config(&ChromaKeyConfig::default())
    }
}

impl SubjectProfiler {
    #[must_use]
    pub fn from_config(config: &ChromaKeyConfig) -> Self {
        Self {
            analysis_size: config.analysis_size,
            clusters: config.kmeans_clusters.max(1),
            seed: config.kmeans_seed,
        }
    }

    /// Profile encoded image bytes, substituting the neutral fallback on failure
    #[must_use]
    pub fn profile_bytes(&self, image_bytes: &[u8]) -> SubjectProfile {
        match ImageIOService::load_from_bytes(image_bytes).and_then(|image| self.profile(&image)) {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!("Subject profiling failed, using neutral gray: {}", e);
                SubjectProfile::FALLBACK
            }
        }
    }

    /// Profile a decoded image
    pub fn profile(&self, image: &DynamicImage) -> Result<SubjectProfile> {
        let square = ImagePreprocessor::resize_square(&image.to_rgb8(), self.analysis_size);
        let center = ImagePreprocessor::center_crop(&square, 0.5);
        let dominant = self.dominant_color(&center)?;

        let profile = SubjectProfile::from_color(dominant);
        log::debug!(
            "Subject dominant color {} (green-dominant: {})",
            profile.dominant_color,
            profile.is_green
        );
        Ok(profile)
    }

    /// Centroid of the largest k-means cluster
    ///
    /// When the sample holds no more distinct colors than clusters, the most
    /// frequent exact color is returned instead.
    pub fn dominant_color(&self, sample: &RgbImage) -> Result<Color> {
        if sample.width() == 0 || sample.height() == 0 {
            return Err(ChromaKeyError::empty_sample("center crop has no pixels"));
        }

        let mut counts: HashMap<Color, usize> = HashMap::new();
        for pixel in sample.pixels() {
            *counts.entry(Color::from(*pixel)).or_insert(0) += 1;
        }
        if counts.len() <= self.clusters {
            return exact_mode(&counts)
                .ok_or_else(|| ChromaKeyError::empty_sample("center crop has no pixels"));
        }

        let pixels: Vec<Srgb<f32>> = from_component_slice::<Srgb<u8>>(sample.as_raw())
            .iter()
            .map(|&pixel| pixel.into_format::<f32>())
            .collect();

        let result = get_kmeans(
            self.clusters,
            KMEANS_MAX_ITER,
            KMEANS_CONVERGE,
            false,
            &pixels,
            self.seed,
        );

        let mut members = vec![0usize; result.centroids.len()];
        for &index in &result.indices {
            if let Some(count) = members.get_mut(usize::from(index)) {
                *count += 1;
            }
        }

        // Lowest index wins ties so the result is stable for a given seed
        let largest = members
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
            .map(|(index, _)| index)
            .ok_or_else(|| ChromaKeyError::processing("k-means produced no clusters"))?;

        let centroid = result
            .centroids
            .get(largest)
            .ok_or_else(|| ChromaKeyError::internal("largest cluster has no centroid"))?;
        let rgb: Srgb<u8> = (*centroid).into_format();

        Ok(Color::new(rgb.red, rgb.green, rgb.blue))
    }
}

/// Most frequent color; ties go to the smallest color value
fn exact_mode(counts: &HashMap<Color, usize>) -> Option<Color> {
    counts
        .iter()
        .max_by(|(ca, a), (cb, b)| a.cmp(b).then(cb.to_array().cmp(&ca.to_array())))
        .map(|(color, _)| *color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn encode(image: &RgbImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_green_classification() {
        assert!(is_green_dominant(Color::new(10, 200, 10)));
        assert!(is_green_dominant(Color::new(40, 90, 40)));
        // Green channel too weak
        assert!(!is_green_dominant(Color::new(10, 70, 10)));
        // Not strictly above red
        assert!(!is_green_dominant(Color::new(200, 200, 10)));
        assert!(!is_green_dominant(Color::new(10, 200, 220)));
        assert!(!is_green_dominant(Color::GRAY));
    }

    #[test]
    fn test_profile_solid_subject() {
        let image = RgbImage::from_pixel(300, 300, Rgb([30, 180, 40]));
        let profile = SubjectProfiler::default().profile_bytes(&encode(&image));
        assert_eq!(profile.dominant_color, Color::new(30, 180, 40));
        assert!(profile.is_green);
    }

    #[test]
    fn test_profile_uses_center_region() {
        // Red frame around a blue center
        let mut image = RgbImage::from_pixel(400, 400, Rgb([255, 0, 0]));
        for y in 120..280 {
            for x in 120..280 {
                image.put_pixel(x, y, Rgb([0, 0, 255]));
            }
        }
        let profile = SubjectProfiler::default().profile_bytes(&encode(&image));
        assert!(profile.dominant_color.distance(Color::BLUE) < 30.0);
        assert!(!profile.is_green);
    }

    #[test]
    fn test_profile_noisy_subject_is_deterministic() {
        let image = RgbImage::from_fn(200, 200, |x, y| {
            let n = ((x * 31 + y * 17) % 40) as u8;
            Rgb([20 + n, 150 + n, 30 + n])
        });
        let bytes = encode(&image);
        let profiler = SubjectProfiler::default();
        let first = profiler.profile_bytes(&bytes);
        let second = profiler.profile_bytes(&bytes);
        assert_eq!(first, second);
        assert!(first.is_green);
    }

    #[test]
    fn test_profile_fallback_on_garbage() {
        let profile = SubjectProfiler::default().profile_bytes(b"not an image");
        assert_eq!(profile, SubjectProfile::FALLBACK);
        assert_eq!(profile.dominant_color, Color::new(128, 128, 128));
    }
}
