// Parser module: line-oriented block parsing with an inline pass per text container
mod block;
mod config;
mod inline;
mod utils;


pub use config::ParserConfig;

use crate::ast::Document;
use block::BlockParser;
use tracing::trace;

/// Structural parser over one source snapshot. Parsing never fails: malformed or
/// unrecognized constructs degrade to literal text.
pub struct Parser<'input> {
    input: &'input str,
    config: ParserConfig,
}

impl<'input> Parser<'input> {
    pub fn new(input: &'input str, config: ParserConfig) -> Self {
        Self { input, config }
    }

    pub fn with_defaults(input: &'input str) -> Self {
        Self::new(input, ParserConfig::default())
    }

    pub fn parse(self) -> Document {
        let blocks = BlockParser::new(&self.config).parse(self.input);
        trace!(blocks = blocks.len(), bytes = self.input.len(), "parsed document");
        Document { blocks }
    }
}

/// Parse markup using the default parser configuration.
pub fn parse(source: &str) -> Document {
    Parser::with_defaults(source).parse()
}

/// Parse function with custom configuration.
pub fn parse_with_config(source: &str, config: &ParserConfig) -> Document {
    Parser::new(source, config.clone()).parse()
}
