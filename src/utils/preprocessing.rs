//! Shared image sampling utilities
//!
//! Every analysis stage works on a bounded, downsampled copy of the input so
//! its cost does not depend on the original resolution. Only compositing
//! touches the full-resolution buffer.

use crate::color::Color;
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array2;

/// Filter used for all analysis downsampling
const ANALYSIS_FILTER: FilterType = FilterType::Triangle;

/// Shared image sampling utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize to exactly `size`×`size`, ignoring aspect ratio
    #[must_use]
    pub fn resize_square(image: &RgbImage, size: u32) -> RgbImage {
        let size = size.max(1);
        if image.dimensions() == (size, size) {
            return image.clone();
        }
        image::imageops::resize(image, size, size, ANALYSIS_FILTER)
    }

    /// Downsample so that neither side exceeds `max_side`, keeping aspect ratio
    ///
    /// Images already within bounds are returned unchanged; they are never
    /// upscaled.
    #[must_use]
    pub fn downsample_to_fit(image: &RgbImage, max_side: u32) -> RgbImage {
        let (width, height) = image.dimensions();
        let max_side = max_side.max(1);
        if width <= max_side && height <= max_side {
            return image.clone();
        }

        let scale = f64::from(max_side) / f64::from(width.max(height));
        let new_width = ((f64::from(width) * scale).round() as u32).clamp(1, max_side);
        let new_height = ((f64::from(height) * scale).round() as u32).clamp(1, max_side);

        image::imageops::resize(image, new_width, new_height, ANALYSIS_FILTER)
    }

    /// Crop a centered square whose side is `fraction` of the shorter side
    #[must_use]
    pub fn center_crop(image: &RgbImage, fraction: f64) -> RgbImage {
        let (width, height) = image.dimensions();
        let side = ((f64::from(width.min(height)) * fraction.clamp(0.0, 1.0)) as u32).max(1);
        let side_x = side.min(width);
        let side_y = side.min(height);
        let x = (width - side_x) / 2;
        let y = (height - side_y) / 2;

        image::imageops::crop_imm(image, x, y, side_x, side_y).to_image()
    }

    /// Effective border band thickness: capped at a tenth of the shorter side, at least 1
    #[must_use]
    pub fn border_band(width: u32, height: u32, thickness: u32) -> u32 {
        thickness.min(width.min(height) / 10).max(1)
    }

    /// Collect every pixel inside the border band around all four edges
    ///
    /// Each pixel is sampled once even where edge bands overlap at corners.
    #[must_use]
    pub fn border_pixels(image: &RgbImage, thickness: u32) -> Vec<Color> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let band = Self::border_band(width, height, thickness);

        image
            .enumerate_pixels()
            .filter(|(x, y, _)| {
                *x < band || *y < band || *x >= width.saturating_sub(band) || *y >= height.saturating_sub(band)
            })
            .map(|(_, _, pixel)| Color::from(*pixel))
            .collect()
    }

    /// Flatten an RGB buffer into a list of colors
    #[must_use]
    pub fn pixels(image: &RgbImage) -> Vec<Color> {
        image.pixels().map(|pixel| Color::from(*pixel)).collect()
    }

    /// Grayscale copy resized to `size`×`size`, as a row-major `f32` array
    #[must_use]
    pub fn grayscale_array(image: &DynamicImage, size: u32) -> Array2<f32> {
        let size = size.max(1);
        let gray = image::imageops::resize(&image.to_luma8(), size, size, ANALYSIS_FILTER);
        let side = size as usize;

        let mut array = Array2::<f32>::zeros((side, side));
        for (x, y, pixel) in gray.enumerate_pixels() {
            if let Some(cell) = array.get_mut((y as usize, x as usize)) {
                *cell = f32::from(pixel[0]);
            }
        }
        array
    }
}
