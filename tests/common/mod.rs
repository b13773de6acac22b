//! Shared fixtures for integration tests
//!
//! All images are synthesized in memory so the suite needs no assets.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};

pub const STUDIO_GREEN: [u8; 3] = [10, 200, 10];
pub const SKIN: [u8; 3] = [224, 172, 105];

/// Uniform RGB image
pub fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Subject square covering the middle half of a solid backdrop
pub fn subject_on_backdrop(
    width: u32,
    height: u32,
    backdrop: [u8; 3],
    subject: [u8; 3],
) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let inside_x = x >= width / 4 && x < width * 3 / 4;
        let inside_y = y >= height / 4 && y < height * 3 / 4;
        if inside_x && inside_y {
            Rgb(subject)
        } else {
            Rgb(backdrop)
        }
    })
}

/// Left half `left`, right half `right`
pub fn split(width: u32, height: u32, left: [u8; 3], right: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| if x < width / 2 { Rgb(left) } else { Rgb(right) })
}

/// Horizontal blend from `from` to `to`, one step per column
pub fn gradient(width: u32, height: u32, from: [u8; 3], to: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        let t = f64::from(x) / f64::from(width.saturating_sub(1).max(1));
        let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
        Rgb([mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])])
    })
}

pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(image.clone()), ImageFormat::Png)
}

pub fn encode_rgba_png(image: &RgbaImage) -> Vec<u8> {
    encode(&DynamicImage::ImageRgba8(image.clone()), ImageFormat::Png)
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), format)
        .expect("encoding a synthetic image should not fail");
    buffer
}

pub fn decode_rgba(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes)
        .expect("output should decode")
        .to_rgba8()
}
