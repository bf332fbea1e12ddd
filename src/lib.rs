//! Live preview core for markdown with embedded mathematics.
//!
//! Source text goes through four synchronous stages,
//! parser → [`dom::Transformer`] → [`sanitize::SanitizeSchema`] → [`codegen::HtmlGenerator`],
//! composed by [`pipeline::Renderer`]. [`scheduler::PreviewScheduler`] debounces edits
//! in front of the pipeline and commits results strictly in edit order, and
//! [`typeset::TypesetTrigger`] hands mounted math regions to an external engine.

// Core modules
pub mod ast;
pub mod codegen;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod lexer;
pub mod parser;
pub mod sanitize;

// Pipeline, scheduling and boundary modules
pub mod config;
pub mod pipeline;
pub mod scheduler;
pub mod stats;
pub mod typeset;

// Re-export key types for public API
pub use ast::{Block, Document, Inline, Visitable, Visitor};
pub use codegen::{Generated, HtmlGenerator, PlaceholderSpan};
pub use config::{PreviewConfig, PreviewConfigBuilder};
pub use dom::{DomChild, DomNode, MathPlaceholder};
pub use error::{PreviewError, Result, TypesetError};
pub use highlight::HighlightMode;
pub use lexer::{Lexer, Position, Token};
pub use parser::ParserConfig;
pub use pipeline::{Edit, FALLBACK_HTML, RenderResult, Renderer};
pub use sanitize::SanitizeSchema;
pub use scheduler::{Completion, DebounceState, Debouncer, PreviewScheduler, RenderPipeline};
pub use stats::TextStats;
pub use typeset::{MathElement, MathEngine, MountedMarkup, MountedSurface, TypesetOutcome, TypesetTrigger};

/// Converts source text to sanitized HTML with the default configuration.
///
/// Never fails: input the pipeline cannot handle yields [`FALLBACK_HTML`].
///
/// # Examples
///
/// ```
/// use mathpad::to_html;
///
/// let html = to_html("# Hello, $x^2$!");
/// assert_eq!(
///     html,
///     "<h1>Hello, <span class=\"math math-inline\">x^2</span>!</h1>\n"
/// );
/// ```
pub fn to_html(source: &str) -> String {
    Renderer::default().render_edit(&Edit::new(0, source)).html
}

/// Parse source text into an Abstract Syntax Tree.
pub fn parse_to_ast(source: &str) -> Document {
    parser::parse(source)
}

/// Convert an AST to the display tree, before sanitization.
pub fn ast_to_dom(ast: &Document, highlight: HighlightMode) -> Result<DomNode> {
    dom::from_ast(ast, highlight)
}

/// Sanitize a display tree with the minimal allowlist and serialize it.
pub fn dom_to_html(dom: DomNode) -> Result<String> {
    let sanitized = SanitizeSchema::default().sanitize(dom);
    Ok(codegen::generate_html(&sanitized)?.html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        assert_eq!(to_html("# Hello, World!"), "<h1>Hello, World!</h1>\n");
    }

    #[test]
    fn test_parse_to_ast_function() {
        let document = parse_to_ast("# Hello, World!");
        assert_eq!(document.blocks.len(), 1);
        assert!(matches!(document.blocks[0], ast::Block::Heading { level: 1, .. }));
    }

    #[test]
    fn test_intermediate_representation_access() {
        let document = parse_to_ast("Text with [a link](javascript:alert(1)).");
        let dom = ast_to_dom(&document, HighlightMode::Auto).expect("transform should succeed");
        let html = dom_to_html(dom).expect("generation should succeed");
        assert_eq!(html, "<p>Text with <a>a link</a>.</p>\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(to_html(""), "");
        assert_eq!(to_html("\n\n  \n"), "");
    }
}
