//! Chroma-key compositing
//!
//! Turns the solid backdrop of a rendered image into real transparency. The
//! mask only ever lowers alpha; RGB values pass through untouched so keying
//! an already keyed image changes nothing.

use crate::{
    color::{Color, MAX_RGB_DISTANCE},
    config::{ChromaKeyConfig, DEFAULT_TOLERANCE},
    detector::BackgroundDetector,
    error::Result,
    services::ImageIOService,
};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Per-channel tolerance is scaled by `√3` into a Euclidean radius
const TOLERANCE_SCALE: f64 = 1.732_050_807_568_877_2;

/// Feather band width as a fraction of the tolerance
const FEATHER_FRACTION: f64 = 0.5;

/// Parameters for a single compositing call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeOptions {
    /// Backdrop color that was requested from the renderer
    pub target: Color,
    pub tolerance: u8,
    pub auto_detect: bool,
    pub edge_feather: bool,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            target: Color::GREEN,
            tolerance: DEFAULT_TOLERANCE,
            auto_detect: true,
            edge_feather: true,
        }
    }
}

impl CompositeOptions {
    #[must_use]
    pub fn from_config(target: Color, config: &ChromaKeyConfig) -> Self {
        Self {
            target,
            tolerance: config.tolerance,
            auto_detect: config.auto_detect,
            edge_feather: config.edge_feather,
        }
    }

    /// Euclidean radius under which pixels become fully transparent
    #[must_use]
    pub fn threshold(&self) -> f64 {
        TOLERANCE_SCALE * f64::from(self.tolerance)
    }

    /// Squared radius of the fully transparent core, `3·tolerance²`
    ///
    /// Core membership is decided on this exact value so a pixel exactly
    /// `tolerance` away in every channel is always keyed.
    #[must_use]
    pub fn threshold_squared(&self) -> u32 {
        3 * u32::from(self.tolerance).pow(2)
    }

    /// Width of the feathered ring outside the threshold
    #[must_use]
    pub fn feather_width(&self) -> f64 {
        FEATHER_FRACTION * f64::from(self.tolerance)
    }
}

/// Alpha channel census of a composited image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub total_pixels: u64,
    /// Alpha 0
    pub transparent_pixels: u64,
    /// Alpha strictly between 0 and 255
    pub semi_transparent_pixels: u64,
    /// Alpha 255
    pub opaque_pixels: u64,
}

impl TransparencyStats {
    #[must_use]
    pub fn from_image(image: &RgbaImage) -> Self {
        let mut stats = Self::default();
        for pixel in image.pixels() {
            stats.record(pixel[3]);
        }
        stats
    }

    fn record(&mut self, alpha: u8) {
        self.total_pixels += 1;
        match alpha {
            0 => self.transparent_pixels += 1,
            255 => self.opaque_pixels += 1,
            _ => self.semi_transparent_pixels += 1,
        }
    }

    fn percent(&self, count: u64) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            count as f64 / self.total_pixels as f64 * 100.0
        }
    }

    #[must_use]
    pub fn transparent_percent(&self) -> f64 {
        self.percent(self.transparent_pixels)
    }

    #[must_use]
    pub fn semi_transparent_percent(&self) -> f64 {
        self.percent(self.semi_transparent_pixels)
    }

    #[must_use]
    pub fn opaque_percent(&self) -> f64 {
        self.percent(self.opaque_pixels)
    }
}

/// Result of a compositing call
///
/// `Unchanged` carries the caller's original bytes whenever keying could
/// not be performed, so the caller always has something to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeOutput {
    Keyed {
        /// PNG-encoded RGBA8 image
        png: Vec<u8>,
        /// Color actually keyed out (detected or requested)
        key_color: Color,
        stats: TransparencyStats,
    },
    Unchanged {
        original: Vec<u8>,
        reason: String,
    },
}

impl CompositeOutput {
    /// Bytes to deliver: the PNG when keyed, the original input otherwise
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Keyed { png, .. } => png,
            Self::Unchanged { original, .. } => original,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Keyed { png, .. } => png,
            Self::Unchanged { original, .. } => original,
        }
    }

    #[must_use]
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Keyed { .. })
    }

    #[must_use]
    pub fn key_color(&self) -> Option<Color> {
        match self {
            Self::Keyed { key_color, .. } => Some(*key_color),
            Self::Unchanged { .. } => None,
        }
    }

    #[must_use]
    pub fn stats(&self) -> Option<&TransparencyStats> {
        match self {
            Self::Keyed { stats, .. } => Some(stats),
            Self::Unchanged { .. } => None,
        }
    }
}

/// Alpha for a pixel at `squared_distance` from the key color
///
/// `existing` is the pixel's current alpha; the result never exceeds it.
#[must_use]
pub fn key_alpha(squared_distance: u32, existing: u8, options: &CompositeOptions) -> u8 {
    if squared_distance <= options.threshold_squared() {
        return 0;
    }

    let band = options.feather_width();
    if options.edge_feather && band > 0.0 {
        let threshold = options.threshold();
        let distance = f64::from(squared_distance).sqrt();
        if distance <= threshold + band {
            let ramp = (255.0 * (distance - threshold) / band).clamp(0.0, 255.0) as u8;
            return existing.min(ramp);
        }
    }

    existing
}

/// Apply the chroma-key mask to an RGBA buffer in place
pub fn apply_chroma_key(
    image: &mut RgbaImage,
    key_color: Color,
    options: &CompositeOptions,
) -> TransparencyStats {
    let mut stats = TransparencyStats::default();
    for pixel in image.pixels_mut() {
        if let Some(squared) = key_color.squared_distance_to_channels(&pixel.0) {
            pixel[3] = key_alpha(squared, pixel[3], options);
        }
        stats.record(pixel[3]);
    }
    stats
}

/// Keyed image before encoding
#[derive(Debug, Clone)]
pub struct KeyedImage {
    pub image: RgbaImage,
    pub key_color: Color,
    pub stats: TransparencyStats,
}

/// Chroma-key compositor
#[derive(Debug, Clone, Default)]
pub struct ChromaKeyCompositor {
    detector: BackgroundDetector,
}

impl ChromaKeyCompositor {
    #[must_use]
    pub fn new(detector: BackgroundDetector) -> Self {
        Self { detector }
    }

    #[must_use]
    pub fn from_config(config: &ChromaKeyConfig) -> Self {
        Self::new(BackgroundDetector::from_config(config))
    }

    /// Composite encoded bytes, returning the original bytes on failure
    #[must_use]
    pub fn composite(&self, image_bytes: &[u8], options: &CompositeOptions) -> CompositeOutput {
        match self.try_composite(image_bytes, options) {
            Ok(output) => output,
            Err(e) => {
                log::error!("Chroma keying failed, returning original image: {}", e);
                CompositeOutput::Unchanged {
                    original: image_bytes.to_vec(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Composite encoded bytes, propagating decode and encode errors
    pub fn try_composite(
        &self,
        image_bytes: &[u8],
        options: &CompositeOptions,
    ) -> Result<CompositeOutput> {
        let image = ImageIOService::load_from_bytes(image_bytes)?;
        let keyed = self.key_image(&image, options);
        let png = ImageIOService::encode_png(&keyed.image)?;

        Ok(CompositeOutput::Keyed {
            png,
            key_color: keyed.key_color,
            stats: keyed.stats,
        })
    }

    /// Resolve the key color and mask a decoded image
    #[must_use]
    pub fn key_image(&self, image: &DynamicImage, options: &CompositeOptions) -> KeyedImage {
        let key_color = self.resolve_key_color(image, options);

        let mut rgba = image.to_rgba8();
        let stats = apply_chroma_key(&mut rgba, key_color, options);

        log::info!(
            "Keyed {} at tolerance {} (threshold {:.1}, feather {}): {}/{} transparent ({:.2}%)",
            key_color,
            options.tolerance,
            options.threshold().min(MAX_RGB_DISTANCE),
            options.edge_feather,
            stats.transparent_pixels,
            stats.total_pixels,
            stats.transparent_percent()
        );

        KeyedImage {
            image: rgba,
            key_color,
            stats,
        }
    }

    fn resolve_key_color(&self, image: &DynamicImage, options: &CompositeOptions) -> Color {
        if !options.auto_detect {
            return options.target;
        }

        match self.detector.detect(image, Some(options.target)) {
            Ok(detection) => {
                if detection.color != options.target {
                    log::info!(
                        "Rendered backdrop is {} (requested {}, {:.1} away)",
                        detection.color,
                        options.target,
                        detection.color.distance(options.target)
                    );
                }
                detection.color
            }
            Err(e) => {
                log::warn!(
                    "Background detection failed, keying requested {}: {}",
                    options.target,
                    e
                );
                options.target
            }
        }
    }
}
