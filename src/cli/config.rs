//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{color::Color, compositor::CompositeOptions, config::ChromaKeyConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated `ChromaKeyConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: JSON file (if any), then flag overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<ChromaKeyConfig> {
        let mut config = match &cli.config {
            Some(path) => ChromaKeyConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => ChromaKeyConfig::default(),
        };

        if let Some(tolerance) = cli.tolerance {
            config.tolerance = tolerance;
        }
        if cli.no_auto_detect {
            config.auto_detect = false;
        }
        if cli.no_feather {
            config.edge_feather = false;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Keying options for this run; the target defaults to green
    pub(crate) fn composite_options(cli: &Cli, config: &ChromaKeyConfig) -> CompositeOptions {
        CompositeOptions::from_config(cli.target_color.unwrap_or(Color::GREEN), config)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.input.len() > 1 && cli.input.iter().any(|input| input == "-") {
            anyhow::bail!("stdin (-) cannot be combined with other inputs");
        }

        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern: {}", pattern))?;
        }

        if (cli.select_only || cli.analyze) && cli.output.is_some() {
            log::warn!("--output is ignored with --select-only and --analyze");
        }

        Ok(())
    }
}
