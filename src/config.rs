//! Configuration types for chroma-key compositing operations

use crate::error::{ChromaKeyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default keying tolerance (per-channel-equivalent radius)
pub const DEFAULT_TOLERANCE: u8 = 50;

/// Default tolerance used when grouping border pixels into clusters
pub const DEFAULT_CLUSTER_TOLERANCE: u8 = 30;

/// Configuration for the chroma-key pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaKeyConfig {
    /// Keying tolerance; background radius is `√3 · tolerance`
    pub tolerance: u8,

    /// Soften the mask edge with a linear alpha ramp
    pub edge_feather: bool,

    /// Re-detect the backdrop actually rendered instead of trusting the requested color
    pub auto_detect: bool,

    /// Side of the square grid analysis work is downsampled to
    pub analysis_size: u32,

    /// Border band thickness in analysis-grid pixels (capped at size/10)
    pub border_thickness: u32,

    /// Euclidean radius for grouping border pixels
    pub cluster_tolerance: u8,

    /// Distance above which the detected color is checked against the requested one
    pub cross_validation_threshold: f64,

    /// Minimum share of sampled border pixels a fallback cluster must hold
    pub min_cluster_share: f64,

    /// How many of the largest clusters are considered during cross-validation
    pub max_candidate_clusters: usize,

    /// Safety score under which a chromakey selection is reported as low confidence
    pub low_confidence_threshold: f64,

    /// Number of k-means clusters for the subject profile
    pub kmeans_clusters: usize,

    /// Seed for k-means initialisation
    pub kmeans_seed: u64,

    /// Largest side accepted before `resize_if_needed` downscales
    pub max_input_dimension: u32,
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            edge_feather: true,
            auto_detect: true,
            analysis_size: 200,
            border_thickness: 10,
            cluster_tolerance: DEFAULT_CLUSTER_TOLERANCE,
            cross_validation_threshold: 150.0,
            min_cluster_share: 0.05,
            max_candidate_clusters: 5,
            low_confidence_threshold: 50.0,
            kmeans_clusters: 5,
            kmeans_seed: 0,
            max_input_dimension: 4096,
        }
    }
}

impl ChromaKeyConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use chroma_bgremove::ChromaKeyConfig;
    ///
    /// let config = ChromaKeyConfig::builder()
    ///     .tolerance(40)
    ///     .edge_feather(false)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.tolerance, 40);
    /// ```
    #[must_use]
    pub fn builder() -> ChromaKeyConfigBuilder {
        ChromaKeyConfigBuilder::default()
    }

    /// Load a configuration from a JSON document
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChromaKeyError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&content)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - `analysis_size`: 16-2048
    /// - `border_thickness`: at least 1
    /// - `cluster_tolerance`: at least 1
    /// - `cross_validation_threshold`: finite, 0-442
    /// - `min_cluster_share`: 0.0-1.0
    /// - `max_candidate_clusters`: at least 1
    /// - `low_confidence_threshold`: finite, non-negative
    /// - `kmeans_clusters`: 1-255
    /// - `max_input_dimension`: at least 1
    pub fn validate(&self) -> Result<()> {
        if !(16..=2048).contains(&self.analysis_size) {
            return Err(ChromaKeyError::config_value_error(
                "analysis size",
                self.analysis_size,
                "16-2048",
                Some(200),
            ));
        }

        if self.border_thickness == 0 {
            return Err(ChromaKeyError::config_value_error(
                "border thickness",
                self.border_thickness,
                ">= 1",
                Some(10),
            ));
        }

        if self.cluster_tolerance == 0 {
            return Err(ChromaKeyError::config_value_error(
                "cluster tolerance",
                self.cluster_tolerance,
                "1-255",
                Some(DEFAULT_CLUSTER_TOLERANCE),
            ));
        }

        if !self.cross_validation_threshold.is_finite()
            || !(0.0..=442.0).contains(&self.cross_validation_threshold)
        {
            return Err(ChromaKeyError::config_value_error(
                "cross-validation threshold",
                self.cross_validation_threshold,
                "0-442",
                Some(150.0),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_cluster_share) {
            return Err(ChromaKeyError::config_value_error(
                "minimum cluster share",
                self.min_cluster_share,
                "0.0-1.0",
                Some(0.05),
            ));
        }

        if self.max_candidate_clusters == 0 {
            return Err(ChromaKeyError::config_value_error(
                "candidate cluster count",
                self.max_candidate_clusters,
                ">= 1",
                Some(5),
            ));
        }

        if !self.low_confidence_threshold.is_finite() || self.low_confidence_threshold < 0.0 {
            return Err(ChromaKeyError::config_value_error(
                "low confidence threshold",
                self.low_confidence_threshold,
                ">= 0",
                Some(50.0),
            ));
        }

        if !(1..=255).contains(&self.kmeans_clusters) {
            return Err(ChromaKeyError::config_value_error(
                "k-means cluster count",
                self.kmeans_clusters,
                "1-255",
                Some(5),
            ));
        }

        if self.max_input_dimension == 0 {
            return Err(ChromaKeyError::config_value_error(
                "maximum input dimension",
                self.max_input_dimension,
                ">= 1",
                Some(4096),
            ));
        }

        Ok(())
    }
}

/// Builder for `ChromaKeyConfig`
#[derive(Debug, Default)]
pub struct ChromaKeyConfigBuilder {
    config: ChromaKeyConfig,
}

impl ChromaKeyConfigBuilder {
    #[must_use]
    pub fn tolerance(mut self, tolerance: u8) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn edge_feather(mut self, feather: bool) -> Self {
        self.config.edge_feather = feather;
        self
    }

    #[must_use]
    pub fn auto_detect(mut self, auto_detect: bool) -> Self {
        self.config.auto_detect = auto_detect;
        self
    }

    #[must_use]
    pub fn analysis_size(mut self, size: u32) -> Self {
        self.config.analysis_size = size;
        self
    }

    #[must_use]
    pub fn border_thickness(mut self, thickness: u32) -> Self {
        self.config.border_thickness = thickness;
        self
    }

    #[must_use]
    pub fn cluster_tolerance(mut self, tolerance: u8) -> Self {
        self.config.cluster_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn cross_validation_threshold(mut self, threshold: f64) -> Self {
        self.config.cross_validation_threshold = threshold;
        self
    }

    /// Set the minimum cluster share (clamped to 0.0-1.0)
    #[must_use]
    pub fn min_cluster_share(mut self, share: f64) -> Self {
        self.config.min_cluster_share = share.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn max_candidate_clusters(mut self, count: usize) -> Self {
        self.config.max_candidate_clusters = count;
        self
    }

    #[must_use]
    pub fn low_confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.low_confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn kmeans_clusters(mut self, k: usize) -> Self {
        self.config.kmeans_clusters = k;
        self
    }

    #[must_use]
    pub fn kmeans_seed(mut self, seed: u64) -> Self {
        self.config.kmeans_seed = seed;
        self
    }

    #[must_use]
    pub fn max_input_dimension(mut self, dimension: u32) -> Self {
        self.config.max_input_dimension = dimension;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ChromaKeyConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
