//! Image I/O operations service
//!
//! This module separates decoding, encoding and file access from the
//! compositing logic, making the pipeline stages testable on in-memory
//! buffers.

use crate::error::{ChromaKeyError, Result};
use image::{DynamicImage, RgbaImage};
use std::path::Path;

/// Service for handling image input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from bytes
    ///
    /// Any format enabled on the `image` crate is accepted. Zero-sized
    /// images are rejected since no stage can sample them.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use chroma_bgremove::services::ImageIOService;
    ///
    /// let image_data = std::fs::read("input.jpg")?;
    /// let image = ImageIOService::load_from_bytes(&image_data)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ChromaKeyError::decode("Empty input buffer"));
        }

        let image = image::load_from_memory(bytes).map_err(|e| {
            ChromaKeyError::decode(format!(
                "Failed to decode image from bytes ({} bytes): {}",
                bytes.len(),
                e
            ))
        })?;

        if image.width() == 0 || image.height() == 0 {
            return Err(ChromaKeyError::empty_sample(format!(
                "Decoded image has no pixels ({}x{})",
                image.width(),
                image.height()
            )));
        }

        Ok(image)
    }

    /// Load an image from a file path
    ///
    /// Decoding is content-based, so a misleading extension does not matter.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let bytes = Self::read_bytes(path.as_ref())?;
        Self::load_from_bytes(&bytes).map_err(|e| {
            ChromaKeyError::processing_stage_error(
                "image loading",
                &e.to_string(),
                Some(&format!("path: {}", path.as_ref().display())),
            )
        })
    }

    /// Read a file into memory
    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(ChromaKeyError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }
        std::fs::read(path_ref)
            .map_err(|e| ChromaKeyError::file_io_error("read image data", path_ref, &e))
    }

    /// Read all bytes from an async reader
    pub async fn read_from_reader<R: tokio::io::AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            ChromaKeyError::processing(format!("Failed to read from stream: {}", e))
        })?;
        Ok(buffer)
    }

    /// Encode an RGBA buffer as PNG
    ///
    /// PNG keeps the full 8-bit alpha channel lossless, which is why it is
    /// the only output format of the compositor.
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        image.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Write encoded bytes to a file, creating the parent directory
    pub fn save_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ChromaKeyError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        if !Self::has_png_extension(path_ref) {
            log::warn!(
                "Output path {} does not end in .png; the data written is PNG with alpha",
                path_ref.display()
            );
        }

        std::fs::write(path_ref, bytes)
            .map_err(|e| ChromaKeyError::file_io_error("write output image", path_ref, &e))
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
                )
            })
    }

    fn has_png_extension(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    }
}
