/// Configuration for the preview pipeline.
///
/// Everything a pipeline invocation depends on is carried explicitly in a
/// [`PreviewConfig`]; nothing is read from ambient state once a renderer is built.
use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PreviewError, Result};
use crate::highlight::HighlightMode;
use crate::parser::ParserConfig;
use crate::sanitize::SanitizeSchema;

pub const ENV_DEBOUNCE_MS: &str = "MATHPAD_DEBOUNCE_MS";
pub const ENV_HIGHLIGHT: &str = "MATHPAD_HIGHLIGHT";
pub const ENV_SANITIZE_EXTENSIONS: &str = "MATHPAD_SANITIZE_EXTENSIONS";
pub const ENV_GFM: &str = "MATHPAD_GFM";
pub const ENV_MATH: &str = "MATHPAD_MATH";

/// Default quiescence window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Main configuration struct for the preview core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Quiescence window of the debounce scheduler, in milliseconds
    pub debounce_ms: u64,
    /// How code blocks get their language class
    pub highlight: HighlightMode,
    /// Additional allowed tags and their attributes, on top of the minimal allowlist
    pub schema_extensions: BTreeMap<String, Vec<String>>,
    /// Parser configuration
    pub parser: ParserConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            highlight: HighlightMode::default(),
            schema_extensions: BTreeMap::new(),
            parser: ParserConfig::default(),
        }
    }
}

impl PreviewConfig {
    /// Creates a builder for configuring the preview.
    pub fn builder() -> PreviewConfigBuilder {
        PreviewConfigBuilder::new()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The sanitization schema: the minimal allowlist merged with the extensions.
    pub fn schema(&self) -> SanitizeSchema {
        SanitizeSchema::with_extensions(&self.schema_extensions)
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DEBOUNCE_MS) {
            config.debounce_ms = value.trim().parse().map_err(|_| {
                PreviewError::config_error(
                    ENV_DEBOUNCE_MS,
                    format!("expected milliseconds, got `{value}`"),
                )
            })?;
        }
        if let Some(value) = lookup(ENV_HIGHLIGHT) {
            config.highlight = value
                .parse()
                .map_err(|_| PreviewError::config_error(ENV_HIGHLIGHT, format!("unknown mode `{value}`")))?;
        }
        if let Some(value) = lookup(ENV_SANITIZE_EXTENSIONS) {
            config.schema_extensions = serde_json::from_str(&value).map_err(|error| {
                PreviewError::config_error(ENV_SANITIZE_EXTENSIONS, error.to_string())
            })?;
        }
        if let Some(value) = lookup(ENV_GFM) {
            config.parser.gfm = parse_flag(ENV_GFM, &value)?;
        }
        if let Some(value) = lookup(ENV_MATH) {
            config.parser.math = parse_flag(ENV_MATH, &value)?;
        }

        debug!(
            debounce_ms = config.debounce_ms,
            highlight = ?config.highlight,
            extensions = config.schema_extensions.len(),
            "loaded preview configuration"
        );
        Ok(config)
    }

    /// Loads the configuration from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PreviewError::config_error(
            key,
            format!("expected a boolean, got `{value}`"),
        )),
    }
}

/// Builder for PreviewConfig to provide a fluent configuration API.
#[derive(Debug, Default)]
pub struct PreviewConfigBuilder {
    config: PreviewConfig,
}

impl PreviewConfigBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounce_ms(mut self, millis: u64) -> Self {
        self.config.debounce_ms = millis;
        self
    }

    pub fn highlight(mut self, mode: HighlightMode) -> Self {
        self.config.highlight = mode;
        self
    }

    /// Allows `tag` with `attributes` in addition to the minimal allowlist.
    pub fn allow_tag(mut self, tag: &str, attributes: &[&str]) -> Self {
        let entry = self.config.schema_extensions.entry(tag.to_string()).or_default();
        entry.extend(attributes.iter().map(|attribute| attribute.to_string()));
        self
    }

    /// Sets the parser configuration.
    pub fn parser(mut self, parser_config: ParserConfig) -> Self {
        self.config.parser = parser_config;
        self
    }

    pub fn enable_gfm(mut self, enabled: bool) -> Self {
        self.config.parser.gfm = enabled;
        self
    }

    pub fn enable_math(mut self, enabled: bool) -> Self {
        self.config.parser.math = enabled;
        self
    }

    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.config.parser.max_nesting_depth = depth;
        self
    }

    pub fn build(self) -> PreviewConfig {
        self.config
    }
}
