//! Error types for chroma-key compositing operations

use thiserror::Error;

/// Result type alias for chroma-key operations
pub type Result<T> = std::result::Result<T, ChromaKeyError>;

/// Error types for chroma-key operations
///
/// The public core operations in the crate root never surface these; they
/// substitute documented fallbacks instead. The `try_*` variants, the
/// processor and the CLI propagate them.
#[derive(Error, Debug)]
pub enum ChromaKeyError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image codec errors raised by the `image` crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Input bytes could not be decoded as a raster image
    #[error("Decode error: {0}")]
    Decode(String),

    /// A sampling step produced nothing to work with
    #[error("Empty sample: {0}")]
    EmptySample(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pixel processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// The external backdrop renderer failed
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChromaKeyError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new empty-sample error
    pub fn empty_sample<S: Into<String>>(msg: S) -> Self {
        Self::EmptySample(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new render error
    pub fn render<S: Into<String>>(msg: S) -> Self {
        Self::Render(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = ChromaKeyError::invalid_config("test config error");
        assert!(matches!(err, ChromaKeyError::InvalidConfig(_)));

        let err = ChromaKeyError::decode("truncated PNG");
        assert!(matches!(err, ChromaKeyError::Decode(_)));

        let err = ChromaKeyError::empty_sample("no border pixels");
        assert!(matches!(err, ChromaKeyError::EmptySample(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ChromaKeyError::render("model timed out");
        assert_eq!(err.to_string(), "Render error: model timed out");
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = ChromaKeyError::file_io_error("read image", Path::new("/tmp/in.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read image"));
        assert!(error_string.contains("/tmp/in.png"));

        let err = ChromaKeyError::config_value_error("tolerance", 300, "0-255", Some(50));
        let error_string = err.to_string();
        assert!(error_string.contains("tolerance"));
        assert!(error_string.contains("300"));
        assert!(error_string.contains("0-255"));
        assert!(error_string.contains("Recommended: 50"));

        let err = ChromaKeyError::processing_stage_error(
            "compositing",
            "buffer size mismatch",
            Some("640x480 RGBA"),
        );
        let error_string = err.to_string();
        assert!(error_string.contains("compositing"));
        assert!(error_string.contains("640x480 RGBA"));
    }
}
