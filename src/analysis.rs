//! Image analysis heuristics
//!
//! Cheap global measurements used to tailor the rendering instructions:
//! fine edge detail (hair, fur), glass or alpha content, motion blur, and
//! overall brightness and contrast.

use crate::{
    color::Color,
    error::Result,
    profile::{SubjectProfile, SubjectProfiler},
    services::ImageIOService,
    utils::ImagePreprocessor,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Side of the grayscale grid the edge heuristics run on
const EDGE_GRID: u32 = 100;

/// Gradient variance above which fine edge detail is assumed
const HAIR_VARIANCE_THRESHOLD: f32 = 1000.0;

/// Second-derivative variance below which the image is considered blurred
const BLUR_VARIANCE_THRESHOLD: f32 = 100.0;

/// Channel mean above which bright glass or reflections are assumed
const BRIGHT_CHANNEL_THRESHOLD: f64 = 240.0;

/// Largest side accepted before `resize_if_needed` downscales
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Measured characteristics of an input image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub width: u32,
    pub height: u32,
    pub has_hair: bool,
    pub has_transparent_objects: bool,
    pub has_motion_blur: bool,
    /// Mean of the per-channel means, 0-255
    pub brightness: f64,
    /// Mean of the per-channel standard deviations
    pub contrast: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_dominant_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subject_green: Option<bool>,
    /// Set when the image could not be analyzed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageAnalysis {
    /// Neutral analysis carrying the failure reason
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            width: 0,
            height: 0,
            has_hair: false,
            has_transparent_objects: false,
            has_motion_blur: false,
            brightness: 128.0,
            contrast: 50.0,
            subject_dominant_color: None,
            is_subject_green: None,
            error: Some(reason.into()),
        }
    }

    /// Attach a subject profile
    #[must_use]
    pub fn with_profile(mut self, profile: SubjectProfile) -> Self {
        self.subject_dominant_color = Some(profile.dominant_color);
        self.is_subject_green = Some(profile.is_green);
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Heuristic image analyzer
#[derive(Debug, Clone, Default)]
pub struct ImageAnalyzer {
    profiler: SubjectProfiler,
}

impl ImageAnalyzer {
    #[must_use]
    pub fn new(profiler: SubjectProfiler) -> Self {
        Self { profiler }
    }

    /// Analyze encoded bytes; failures produce [`ImageAnalysis::failed`]
    #[must_use]
    pub fn analyze_bytes(&self, image_bytes: &[u8]) -> ImageAnalysis {
        match ImageIOService::load_from_bytes(image_bytes) {
            Ok(image) => self.analyze(&image),
            Err(e) => {
                log::warn!("Image analysis failed: {}", e);
                ImageAnalysis::failed(e.to_string())
            }
        }
    }

    /// Analyze a decoded image, including the subject profile
    #[must_use]
    pub fn analyze(&self, image: &DynamicImage) -> ImageAnalysis {
        let analysis = analyze_image(image);
        match self.profiler.profile(image) {
            Ok(profile) => analysis.with_profile(profile),
            Err(e) => {
                log::warn!("Subject profiling skipped during analysis: {}", e);
                analysis.with_profile(SubjectProfile::FALLBACK)
            }
        }
    }
}

/// Measure an image without profiling the subject
#[must_use]
pub fn analyze_image(image: &DynamicImage) -> ImageAnalysis {
    let (width, height) = image.dimensions();
    let (means, std_devs) = channel_statistics(image);

    let gray = ImagePreprocessor::grayscale_array(image, EDGE_GRID);
    let analysis = ImageAnalysis {
        width,
        height,
        has_hair: edge_variance(gray.view()) > HAIR_VARIANCE_THRESHOLD,
        has_transparent_objects: image.color().has_alpha()
            || means.iter().copied().fold(f64::MIN, f64::max) > BRIGHT_CHANNEL_THRESHOLD,
        has_motion_blur: laplacian_variance(gray.view()) < BLUR_VARIANCE_THRESHOLD,
        brightness: means.iter().sum::<f64>() / 3.0,
        contrast: std_devs.iter().sum::<f64>() / 3.0,
        subject_dominant_color: None,
        is_subject_green: None,
        error: None,
    };

    log::debug!(
        "Analysis {}x{}: hair={} transparent={} blur={} brightness={:.1} contrast={:.1}",
        analysis.width,
        analysis.height,
        analysis.has_hair,
        analysis.has_transparent_objects,
        analysis.has_motion_blur,
        analysis.brightness,
        analysis.contrast
    );

    analysis
}

/// Per-channel mean and population standard deviation of the RGB image
fn channel_statistics(image: &DynamicImage) -> ([f64; 3], [f64; 3]) {
    let rgb = image.to_rgb8();
    let count = f64::from(rgb.width()) * f64::from(rgb.height());
    if count == 0.0 {
        return ([0.0; 3], [0.0; 3]);
    }

    let mut sums = [0.0f64; 3];
    let mut squares = [0.0f64; 3];
    for pixel in rgb.pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            let v = f64::from(value);
            sums[channel] += v;
            squares[channel] += v * v;
        }
    }

    let means = sums.map(|s| s / count);
    let mut std_devs = [0.0f64; 3];
    for channel in 0..3 {
        let variance = squares[channel] / count - means[channel] * means[channel];
        std_devs[channel] = variance.max(0.0).sqrt();
    }
    (means, std_devs)
}

/// Population variance of all elements, 0 when empty
fn variance(values: &Array2<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.var(0.0)
}

/// Absolute first difference along an axis
fn abs_diff(array: ArrayView2<'_, f32>, axis: Axis) -> Array2<f32> {
    let len = array.len_of(axis);
    if len < 2 {
        return Array2::zeros((0, 0));
    }
    let (head, tail) = match axis.index() {
        0 => (array.slice(s![..len - 1, ..]), array.slice(s![1.., ..])),
        _ => (array.slice(s![.., ..len - 1]), array.slice(s![.., 1..])),
    };
    (&tail - &head).mapv(f32::abs)
}

/// `var(|∂x|) + var(|∂y|)` on the grayscale grid
fn edge_variance(gray: ArrayView2<'_, f32>) -> f32 {
    variance(&abs_diff(gray, Axis(1))) + variance(&abs_diff(gray, Axis(0)))
}

/// Variance of the absolute vertical second difference
fn laplacian_variance(gray: ArrayView2<'_, f32>) -> f32 {
    // Signed first difference, then absolute second difference
    let len = gray.len_of(Axis(0));
    if len < 3 {
        return 0.0;
    }
    let first = &gray.slice(s![1.., ..]) - &gray.slice(s![..len - 1, ..]);
    variance(&abs_diff(first.view(), Axis(0)))
}

/// Downscale images whose longer side exceeds `max_size` and re-encode as PNG
///
/// Aspect ratio is preserved with the longer side landing exactly on
/// `max_size`. Images within bounds are only re-encoded. Any failure returns
/// the input bytes unchanged.
#[must_use]
pub fn resize_if_needed(image_bytes: &[u8], max_size: u32) -> Vec<u8> {
    match try_resize_if_needed(image_bytes, max_size) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Resize skipped, keeping original bytes: {}", e);
            image_bytes.to_vec()
        }
    }
}

/// Fallible form of [`resize_if_needed`]
pub fn try_resize_if_needed(image_bytes: &[u8], max_size: u32) -> Result<Vec<u8>> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    let (width, height) = image.dimensions();
    let max_size = max_size.max(1);

    let image = if width > max_size || height > max_size {
        let (new_width, new_height) = if width > height {
            let scaled = (f64::from(height) * f64::from(max_size) / f64::from(width)) as u32;
            (max_size, scaled.max(1))
        } else {
            let scaled = (f64::from(width) * f64::from(max_size) / f64::from(height)) as u32;
            (scaled.max(1), max_size)
        };
        log::info!(
            "Resizing {}x{} to {}x{}",
            width,
            height,
            new_width,
            new_height
        );
        image.resize_exact(new_width, new_height, FilterType::Lanczos3)
    } else {
        image
    };

    let mut buffer = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
    Ok(buffer)
}
