//! Explicit composition of the four rendering stages.
//!
//! Parser → Transformer → Sanitizer → Serializer, each a plain function of the
//! previous stage's output. [`Renderer::render_edit`] is the per-edit entry point used
//! by the scheduler: it never fails, degrading to [`FALLBACK_HTML`] instead.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace};

use crate::ast::Document;
use crate::codegen::{Generated, HtmlGenerator, PlaceholderSpan};
use crate::config::PreviewConfig;
use crate::dom::Transformer;
use crate::error::{PreviewError, Result};
use crate::parser::{ParserConfig, parse_with_config};
use crate::sanitize::SanitizeSchema;

/// Safe fragment shown when an edit cannot be rendered.
pub const FALLBACK_HTML: &str = "<div class=\"error\">Failed to render content</div>";

/// One snapshot of the source text, tagged with its edit sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub sequence: u64,
    pub text: String,
}

impl Edit {
    pub fn new(sequence: u64, text: impl Into<String>) -> Self {
        Self {
            sequence,
            text: text.into(),
        }
    }
}

/// Output of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub sequence: u64,
    pub html: String,
    pub has_math: bool,
    pub placeholders: Vec<PlaceholderSpan>,
    /// Set when `html` is [`FALLBACK_HTML`] standing in for a failed render.
    pub fallback: bool,
}

impl RenderResult {
    pub fn fallback(sequence: u64) -> Self {
        Self {
            sequence,
            html: FALLBACK_HTML.to_string(),
            has_math: false,
            placeholders: Vec::new(),
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

/// The rendering pipeline with its configuration resolved once.
#[derive(Debug, Clone)]
pub struct Renderer {
    parser: ParserConfig,
    transformer: Transformer,
    schema: SanitizeSchema,
    generator: HtmlGenerator,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&PreviewConfig::default())
    }
}

impl Renderer {
    pub fn new(config: &PreviewConfig) -> Self {
        Self {
            parser: config.parser.clone(),
            transformer: Transformer::new(config.highlight),
            schema: config.schema(),
            generator: HtmlGenerator::new(),
        }
    }

    /// Runs all four stages over `text`.
    pub fn render(&self, text: &str) -> Result<Generated> {
        let document = parse_with_config(text, &self.parser);
        self.render_ast(&document)
    }

    /// Runs the stages after parsing over an already built AST.
    pub fn render_ast(&self, document: &Document) -> Result<Generated> {
        let display = self.transformer.transform(document)?;
        let sanitized = self.schema.sanitize(display);
        self.generator.generate(&sanitized)
    }

    /// Renders one edit. Errors and panics in any stage yield the fallback fragment.
    pub fn render_edit(&self, edit: &Edit) -> RenderResult {
        guarded(edit.sequence, || self.render(&edit.text))
    }
}

fn guarded<F>(sequence: u64, stages: F) -> RenderResult
where
    F: FnOnce() -> Result<Generated>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(stages)).unwrap_or_else(|payload| {
        Err(PreviewError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    });

    match outcome {
        Ok(generated) => {
            trace!(
                sequence,
                bytes = generated.html.len(),
                math = generated.placeholders.len(),
                "rendered edit"
            );
            RenderResult {
                sequence,
                has_math: generated.has_math(),
                html: generated.html,
                placeholders: generated.placeholders,
                fallback: false,
            }
        }
        Err(err) => {
            error!(sequence, stage = err.stage(), error = %err, "rendering failed, showing fallback");
            RenderResult::fallback(sequence)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
