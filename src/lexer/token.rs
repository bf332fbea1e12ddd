use crate::ast::{Alignment, ListKind};
use crate::lexer::Position;

/// Line-level token. The lexer classifies each source line once; the block parser
/// aggregates lines into blocks and hands paragraph text to the inline parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    /// Empty or whitespace-only line.
    Blank,
    /// ATX heading `## Section`, closing `#` run already stripped.
    AtxHeading { level: u8, content: &'input str },
    /// Setext underline: `===` (level 1) or a run of `-` (level 2).
    SetextUnderline { level: u8 },
    /// Thematic break `***`, `- - -`, `___`.
    ThematicBreak,
    /// Opening or closing code fence.
    CodeFence {
        marker: char,
        length: usize,
        info: Option<&'input str>,
    },
    /// Line opening with a block math delimiter; `rest` follows the delimiter.
    MathFence {
        delimiter: MathDelimiter,
        rest: &'input str,
    },
    /// Block quote marker `>`; `content` follows the marker and one optional space.
    BlockQuote { content: &'input str },
    /// List item marker `- item` or `1. item`.
    ListMarker {
        kind: ListKind,
        /// Width of the marker plus the padding before the content.
        marker_width: usize,
        content: &'input str,
        task: Option<bool>,
    },
    /// GFM table delimiter row `| --- | :-: |`.
    TableDelimiter { alignments: Vec<Alignment> },
    /// Start of a raw markup block (`<div>`, `</p>`, `<!--`, `<script>`).
    HtmlBlock { kind: HtmlBlockKind },
    /// Anything else.
    Text { content: &'input str },
}

/// Block math delimiters recognized at the start of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathDelimiter {
    /// `$$`, both opening and closing.
    Dollars,
    /// `\[`
    BracketOpen,
    /// `\]`
    BracketClose,
}

impl MathDelimiter {
    /// Closing delimiter that ends a block opened by `self`.
    pub fn closing(&self) -> &'static str {
        match self {
            MathDelimiter::Dollars => "$$",
            MathDelimiter::BracketOpen | MathDelimiter::BracketClose => "\\]",
        }
    }
}

/// How far a raw markup block extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlBlockKind {
    /// `<script>`, `<style>`, `<pre>`, `<textarea>` and comments: up to and including
    /// the line containing `end`, blank lines included.
    Verbatim { end: &'static str },
    /// A block-level element such as `<div>` or `</table>`: up to the next blank line.
    Block,
    /// A line holding one complete tag and nothing else: up to the next blank line.
    Standalone,
}

impl HtmlBlockKind {
    /// Standalone tags never interrupt an open paragraph.
    pub fn interrupts_paragraph(&self) -> bool {
        !matches!(self, HtmlBlockKind::Standalone)
    }

    /// Whether `line` ends a block of this kind that is already open.
    pub fn ends_at(&self, line: &str) -> bool {
        match self {
            HtmlBlockKind::Verbatim { end } => line.to_ascii_lowercase().contains(end),
            HtmlBlockKind::Block | HtmlBlockKind::Standalone => line.trim().is_empty(),
        }
    }
}

/// One classified source line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineToken<'input> {
    pub token: Token<'input>,
    /// Visual indentation width (tabs advance to the next multiple of 4).
    pub indent: usize,
    /// The full line without its line ending.
    pub raw: &'input str,
    pub position: Position,
}

impl<'input> LineToken<'input> {
    /// The line with its indentation removed.
    pub fn content(&self) -> &'input str {
        self.raw.trim_start_matches([' ', '\t'])
    }

    pub fn is_blank(&self) -> bool {
        matches!(self.token, Token::Blank)
    }
}

/// A markup tag recognized inside raw source fragments or mounted output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTag<'input> {
    /// Tag name as written; callers compare case-insensitively.
    pub name: &'input str,
    pub closing: bool,
    pub self_closing: bool,
    /// Attribute names with their unquoted values; `None` for bare attributes.
    pub attributes: Vec<(&'input str, Option<&'input str>)>,
}

impl RawTag<'_> {
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.unwrap_or(""))
    }
}
