/// Error handling module for the preview pipeline.
///
/// Parsing never fails (malformed input degrades to literal text) and sanitizer
/// rejections are silent by design, so the variants here cover the stages that can
/// genuinely go wrong: transformation, generation, configuration and typesetting.
use thiserror::Error;

/// Main error type for the preview core.
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Display-tree transformation errors.
    #[error("Transform error: {message}")]
    Transform { message: String },

    /// Markup generation errors.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// Invalid configuration value.
    #[error("Configuration error in {key}: {message}")]
    Config { key: String, message: String },

    /// Configuration JSON that does not deserialize.
    #[error("Configuration JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// A pipeline stage panicked; the payload message is preserved when it is a string.
    #[error("Pipeline panicked: {message}")]
    Panicked { message: String },
}

/// Convenience type alias for Results in the preview core.
pub type Result<T> = std::result::Result<T, PreviewError>;

impl PreviewError {
    /// Creates a new transform error.
    pub fn transform_error(message: impl Into<String>) -> Self {
        PreviewError::Transform {
            message: message.into(),
        }
    }

    /// Creates a new generation error.
    pub fn generation_error(message: impl Into<String>) -> Self {
        PreviewError::Generation {
            message: message.into(),
        }
    }

    /// Creates a new configuration error for the given key.
    pub fn config_error(key: impl Into<String>, message: impl Into<String>) -> Self {
        PreviewError::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the pipeline stage this error belongs to, for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            PreviewError::Transform { .. } => "transform",
            PreviewError::Generation { .. } => "generate",
            PreviewError::Config { .. } | PreviewError::Json { .. } => "config",
            PreviewError::Panicked { .. } => "pipeline",
        }
    }
}

impl From<std::fmt::Error> for PreviewError {
    fn from(_: std::fmt::Error) -> Self {
        PreviewError::generation_error("formatter error while writing markup")
    }
}

/// Errors reported by an external math engine.
///
/// These never abort the pipeline: the typesetting trigger logs them and the next
/// edit's render is a fresh attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypesetError {
    /// The engine is present but not ready to accept work.
    #[error("math engine unavailable: {reason}")]
    Unavailable { reason: String },

    /// The engine threw while typesetting.
    #[error("math engine failed: {message}")]
    Failed { message: String },
}

impl TypesetError {
    pub fn failed(message: impl Into<String>) -> Self {
        TypesetError::Failed {
            message: message.into(),
        }
    }
}
