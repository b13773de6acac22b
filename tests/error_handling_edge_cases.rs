//! Error handling and edge case testing
//!
//! Covers degenerate inputs, boundary configuration values and the
//! fallbacks the public operations promise instead of failing.

mod common;

use chroma_bgremove::{
    analysis::DEFAULT_MAX_DIMENSION, detect_background_color, remove_colored_background,
    resize_if_needed, select_chromakey_color, try_detect_background_color,
    try_remove_colored_background, try_select_chromakey_color, ChromaKeyConfig, ChromaKeyError,
    ChromaKeyProcessor, ChromakeySelection, Color, CompositeOptions, CompositeOutput,
    ImageAnalyzer, Result,
};
use common::*;
use image::ImageFormat;

#[test]
fn test_empty_input_uses_documented_fallbacks() {
    let empty: &[u8] = &[];

    assert_eq!(select_chromakey_color(empty), ChromakeySelection::fallback());
    assert_eq!(detect_background_color(empty, None, None), Color::GREEN);
    assert_eq!(
        detect_background_color(empty, Some(Color::BLUE), None),
        Color::BLUE
    );

    match remove_colored_background(empty, Color::GREEN, 50, true, true) {
        CompositeOutput::Unchanged { original, reason } => {
            assert!(original.is_empty());
            assert!(!reason.is_empty());
        },
        CompositeOutput::Keyed { .. } => panic!("empty input cannot be keyed"),
    }
}

#[test]
fn test_truncated_png_is_returned_unchanged() {
    let mut bytes = encode_png(&subject_on_backdrop(50, 50, STUDIO_GREEN, SKIN));
    bytes.truncate(bytes.len() / 3);

    let output = remove_colored_background(&bytes, Color::GREEN, 50, true, true);
    assert!(!output.is_keyed());
    assert_eq!(output.bytes(), bytes.as_slice());
    assert!(output.key_color().is_none());
    assert!(output.stats().is_none());
}

#[test]
fn test_try_variants_report_decode_errors() {
    let garbage = b"definitely not an image";

    assert!(matches!(
        try_select_chromakey_color(garbage),
        Err(ChromaKeyError::Decode(_))
    ));
    assert!(try_detect_background_color(garbage, None, Some(10)).is_err());
    assert!(try_remove_colored_background(garbage, &CompositeOptions::default()).is_err());
}

#[test]
fn test_single_pixel_image() -> Result<()> {
    let bytes = encode_png(&solid(1, 1, [0, 255, 0]));

    let selection = try_select_chromakey_color(&bytes)?;
    assert_ne!(selection.color, Color::GREEN);

    let detection = try_detect_background_color(&bytes, None, None)?;
    assert_eq!(detection.color, Color::GREEN);
    assert_eq!(detection.sampled_pixels, 1);
    assert!(!detection.fallback);

    let output = try_remove_colored_background(&bytes, &CompositeOptions::default())?;
    assert_eq!(decode_rgba(output.bytes()).get_pixel(0, 0)[3], 0);
    Ok(())
}

#[test]
fn test_extreme_aspect_ratio() -> Result<()> {
    let bytes = encode_png(&split(1000, 2, [0, 255, 0], [255, 0, 0]));

    let output = try_remove_colored_background(
        &bytes,
        &CompositeOptions {
            auto_detect: false,
            ..CompositeOptions::default()
        },
    )?;
    let keyed = decode_rgba(output.bytes());
    assert_eq!(keyed.dimensions(), (1000, 2));
    assert_eq!(keyed.get_pixel(0, 0)[3], 0);
    assert_eq!(keyed.get_pixel(999, 1)[3], 255);

    let selection = try_select_chromakey_color(&bytes)?;
    assert_ne!(selection.color, Color::GREEN);
    assert_ne!(selection.color, Color::RED);
    Ok(())
}

#[test]
fn test_lossy_input_formats_are_accepted() -> Result<()> {
    let image = image::DynamicImage::ImageRgb8(subject_on_backdrop(64, 64, STUDIO_GREEN, SKIN));
    let jpeg = encode(&image, ImageFormat::Jpeg);

    let output = try_remove_colored_background(&jpeg, &CompositeOptions::default())?;
    let keyed = decode_rgba(output.bytes());
    assert_eq!(keyed.get_pixel(2, 2)[3], 0);
    assert_eq!(keyed.get_pixel(32, 32)[3], 255);
    Ok(())
}

#[test]
fn test_config_boundaries() {
    for size in [16, 200, 2048] {
        assert!(ChromaKeyConfig::builder().analysis_size(size).build().is_ok());
    }
    for size in [0, 15, 2049] {
        let err = ChromaKeyConfig::builder()
            .analysis_size(size)
            .build()
            .unwrap_err();
        assert!(matches!(err, ChromaKeyError::InvalidConfig(_)));
        assert!(err.to_string().contains("16-2048"));
    }

    assert!(ChromaKeyConfig::builder().tolerance(0).build().is_ok());
    assert!(ChromaKeyConfig::builder().tolerance(255).build().is_ok());
    assert!(ChromaKeyConfig::builder().cluster_tolerance(0).build().is_err());
    assert!(ChromaKeyConfig::builder()
        .cross_validation_threshold(500.0)
        .build()
        .is_err());
    assert!(ChromaKeyConfig::builder()
        .low_confidence_threshold(-1.0)
        .build()
        .is_err());
    assert!(ChromaKeyConfig::builder().max_input_dimension(0).build().is_err());
}

#[test]
fn test_processor_rejects_invalid_config() {
    let mut config = ChromaKeyConfig::default();
    config.max_candidate_clusters = 0;
    assert!(matches!(
        ChromaKeyProcessor::new(config),
        Err(ChromaKeyError::InvalidConfig(_))
    ));
}

#[test]
fn test_hex_color_parsing_errors() {
    assert_eq!("#0F0".parse::<Color>().unwrap(), Color::GREEN);
    assert_eq!(" 00ff00 ".parse::<Color>().unwrap(), Color::GREEN);

    for bad in ["", "#", "#12", "#1234", "#gggggg", "not a color"] {
        assert!(bad.parse::<Color>().is_err(), "{:?} should not parse", bad);
    }
}

#[test]
fn test_analysis_of_undecodable_input() {
    let analysis = ImageAnalyzer::default().analyze_bytes(b"garbage");
    assert!(!analysis.is_valid());
    assert_eq!((analysis.width, analysis.height), (0, 0));
    assert_eq!(analysis.brightness, 128.0);
    assert_eq!(analysis.contrast, 50.0);
    assert!(analysis.error.is_some());
}

#[test]
fn test_resize_if_needed_edge_cases() {
    assert_eq!(resize_if_needed(b"garbage", 100), b"garbage".to_vec());

    let wide = encode_png(&solid(300, 150, [1, 2, 3]));
    let resized = image::load_from_memory(&resize_if_needed(&wide, 100)).unwrap();
    assert_eq!((resized.width(), resized.height()), (100, 50));

    let small = encode_png(&solid(40, 30, [1, 2, 3]));
    let kept = image::load_from_memory(&resize_if_needed(&small, DEFAULT_MAX_DIMENSION)).unwrap();
    assert_eq!((kept.width(), kept.height()), (40, 30));
}

#[test]
fn test_error_messages() {
    assert_eq!(
        ChromaKeyError::render("upstream timeout").to_string(),
        "Render error: upstream timeout"
    );
    assert!(ChromaKeyError::empty_sample("border")
        .to_string()
        .starts_with("Empty sample"));
}
