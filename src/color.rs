//! Color value type and the distance/statistics primitives used by every
//! stage of the pipeline.
//!
//! All similarity decisions use plain Euclidean distance in RGB space. This
//! is a known approximation of perceptual difference (no Lab conversion),
//! accepted for simplicity and speed.

use crate::error::{ChromaKeyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest possible Euclidean distance between two RGB colors (`255·√3`)
pub const MAX_RGB_DISTANCE: f64 = 441.672_955_930_063_7;

/// An 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const GRAY: Self = Self::new(128, 128, 128);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const BLUE: Self = Self::new(0, 0, 255);
    pub const CYAN: Self = Self::new(0, 255, 255);
    pub const MAGENTA: Self = Self::new(255, 0, 255);
    pub const YELLOW: Self = Self::new(255, 255, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from the first three channels of a pixel slice
    ///
    /// Returns `None` for slices shorter than three channels.
    #[must_use]
    pub fn from_channels(channels: &[u8]) -> Option<Self> {
        match channels {
            [r, g, b, ..] => Some(Self::new(*r, *g, *b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Euclidean distance to another color
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        distance(self, other)
    }

    /// Euclidean distance to a raw pixel (RGB or RGBA; alpha is ignored)
    #[must_use]
    pub fn distance_to_channels(self, channels: &[u8]) -> f64 {
        match channels {
            [r, g, b, ..] => channel_distance([self.r, self.g, self.b], [*r, *g, *b]),
            _ => MAX_RGB_DISTANCE,
        }
    }

    /// Squared Euclidean distance to a raw pixel, exact in integers
    ///
    /// `None` when the pixel has fewer than three channels.
    #[must_use]
    pub fn squared_distance_to_channels(self, channels: &[u8]) -> Option<u32> {
        match channels {
            [r, g, b, ..] => Some(
                [self.r, self.g, self.b]
                    .iter()
                    .zip([*r, *g, *b].iter())
                    .map(|(&x, &y)| u32::from(x.abs_diff(y)).pow(2))
                    .sum(),
            ),
            _ => None,
        }
    }

    /// Share of the green channel in `r + g + b` (0 for black)
    #[must_use]
    pub fn green_ratio(self) -> f64 {
        let total = f64::from(self.r) + f64::from(self.g) + f64::from(self.b);
        if total == 0.0 {
            0.0
        } else {
            f64::from(self.g) / total
        }
    }

    /// Parse a hex color string
    ///
    /// Supports both `#RRGGBB` and `#RGB`, with or without the `#` prefix.
    ///
    /// ```rust
    /// use chroma_bgremove::Color;
    ///
    /// assert_eq!(Color::parse_hex("#00ff00").unwrap(), Color::GREEN);
    /// assert_eq!(Color::parse_hex("f0f").unwrap(), Color::MAGENTA);
    /// ```
    pub fn parse_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChromaKeyError::invalid_config(format!(
                "Invalid hex color '{}': non-hex digits",
                hex
            )));
        }

        let component = |range: std::ops::Range<usize>, name: &str| -> Result<u8> {
            hex.get(range)
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| {
                    ChromaKeyError::invalid_config(format!(
                        "Invalid {} component in hex color",
                        name
                    ))
                })
        };

        match hex.len() {
            6 => Ok(Self::new(
                component(0..2, "red")?,
                component(2..4, "green")?,
                component(4..6, "blue")?,
            )),
            // #RGB expands each digit to a doubled pair
            3 => Ok(Self::new(
                component(0..1, "red")? * 17,
                component(1..2, "green")? * 17,
                component(2..3, "blue")? * 17,
            )),
            _ => Err(ChromaKeyError::invalid_config(
                "Color must be in #RRGGBB or #RGB format",
            )),
        }
    }

    /// Format as a lowercase `#rrggbb` string
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({}, {}, {})", self.r, self.g, self.b)
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

impl From<image::Rgb<u8>> for Color {
    fn from(pixel: image::Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        Self::new(r, g, b)
    }
}

impl From<Color> for image::Rgb<u8> {
    fn from(color: Color) -> Self {
        image::Rgb(color.to_array())
    }
}

impl std::str::FromStr for Color {
    type Err = ChromaKeyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_hex(s)
    }
}

/// Euclidean distance between two colors in RGB space
#[must_use]
pub fn distance(a: Color, b: Color) -> f64 {
    channel_distance(a.to_array(), b.to_array())
}

fn channel_distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Summary statistics over a set of distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceStats {
    pub min: f64,
    pub mean: f64,
    pub percentile10: f64,
}

impl DistanceStats {
    /// Compute min, mean and 10th percentile; `None` for an empty slice
    #[must_use]
    pub fn from_distances(distances: &[f64]) -> Option<Self> {
        Some(Self {
            min: min(distances)?,
            mean: mean(distances)?,
            percentile10: percentile(distances, 10.0)?,
        })
    }
}

/// Smallest value, `None` when empty
#[must_use]
pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().min_by(f64::total_cmp)
}

/// Arithmetic mean, `None` when empty
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Percentile with linear interpolation between closest ranks
///
/// `p` is clamped to `0..=100`. Returns `None` when `values` is empty.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let low = *sorted.get(lo)?;
    let high = *sorted.get(hi)?;

    Some(low + (high - low) * (rank - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identity_and_symmetry() {
        let colors = [
            Color::BLACK,
            Color::WHITE,
            Color::new(12, 200, 77),
            Color::new(255, 1, 128),
        ];
        for &a in &colors {
            assert_eq!(distance(a, a), 0.0);
            for &b in &colors {
                assert_eq!(distance(a, b), distance(b, a));
            }
        }
    }

    #[test]
    fn test_distance_known_values() {
        assert!((distance(Color::BLACK, Color::WHITE) - MAX_RGB_DISTANCE).abs() < 1e-9);
        assert!((distance(Color::new(0, 0, 0), Color::new(3, 4, 0)) - 5.0).abs() < 1e-12);
        assert!((Color::RED.distance(Color::GREEN) - 255.0 * 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_distance_to_channels_ignores_alpha() {
        let key = Color::GREEN;
        assert_eq!(key.distance_to_channels(&[0, 255, 0, 0]), 0.0);
        assert_eq!(key.distance_to_channels(&[0, 255, 0]), 0.0);
        assert_eq!(key.distance_to_channels(&[0, 255]), MAX_RGB_DISTANCE);
        assert_eq!(key.squared_distance_to_channels(&[10, 245, 10, 0]), Some(300));
        assert_eq!(key.squared_distance_to_channels(&[255, 0, 255]), Some(195_075));
        assert_eq!(key.squared_distance_to_channels(&[0, 255]), None);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(Color::parse_hex("#ff0000").unwrap(), Color::RED);
        assert_eq!(Color::parse_hex("00FF00").unwrap(), Color::GREEN);
        assert_eq!(Color::parse_hex("#fff").unwrap(), Color::WHITE);
        assert_eq!(Color::parse_hex("#0a0").unwrap(), Color::new(0, 170, 0));

        assert!(Color::parse_hex("#gggggg").is_err());
        assert!(Color::parse_hex("#ff").is_err());
        assert!(Color::parse_hex("#fffffff").is_err());
        assert!("#00ffff".parse::<Color>().is_ok());
    }

    #[test]
    fn test_to_hex_and_display() {
        let color = Color::new(255, 128, 0);
        assert_eq!(color.to_hex(), "#ff8000");
        assert_eq!(color.to_string(), "RGB(255, 128, 0)");
    }

    #[test]
    fn test_green_ratio() {
        assert_eq!(Color::BLACK.green_ratio(), 0.0);
        assert_eq!(Color::GREEN.green_ratio(), 1.0);
        assert!((Color::new(100, 100, 100).green_ratio() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert!((percentile(&values, 50.0).unwrap() - 3.0).abs() < 1e-12);
        assert!((percentile(&values, 0.0).unwrap() - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 100.0).unwrap() - 5.0).abs() < 1e-12);
        assert!((percentile(&values, 10.0).unwrap() - 1.4).abs() < 1e-12);
        assert_eq!(percentile(&[], 10.0), None);
    }

    #[test]
    fn test_distance_stats() {
        let stats = DistanceStats::from_distances(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(stats.min, 10.0);
        assert!((stats.mean - 20.0).abs() < 1e-12);
        assert!((stats.percentile10 - 12.0).abs() < 1e-12);
        assert!(DistanceStats::from_distances(&[]).is_none());
    }

    #[test]
    fn test_color_serde() {
        let json = serde_json::to_string(&Color::CYAN).unwrap();
        assert_eq!(json, r#"{"r":0,"g":255,"b":255}"#);
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::CYAN);
    }
}
