/// Lexical analysis module for classifying markup input line by line.
///
/// Block structure in the source language is line oriented, so the lexer yields one
/// [`LineToken`] per source line. Inline structure is recovered later by the inline
/// parser on the joined paragraph text.
pub mod position;
mod rules;
pub mod token;

pub use position::Position;
pub(crate) use rules::{html_inline_len, scan_raw_tags, split_table_row};
pub use token::{HtmlBlockKind, LineToken, MathDelimiter, RawTag, Token};

/// Tab stops are every four columns.
pub const TAB_WIDTH: usize = 4;

/// The main lexer struct for classifying markup input.
pub struct Lexer<'input> {
    input: &'input str,
    offset: usize,
    line: usize,
}

impl<'input> Lexer<'input> {
    /// Creates a new lexer for the given input string.
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            offset: 0,
            line: 1,
        }
    }

    /// Returns the position of the next line to be classified.
    pub fn position(&self) -> Position {
        Position::at(self.line, 1, self.offset)
    }

    /// Classifies the next source line. Returns `None` once the input is exhausted.
    pub fn next_token(&mut self) -> Option<LineToken<'input>> {
        if self.offset >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.offset..];
        let (raw, consumed) = match remaining.find(['\n', '\r']) {
            Some(end) => {
                let ending = if remaining[end..].starts_with("\r\n") { 2 } else { 1 };
                (&remaining[..end], end + ending)
            }
            None => (remaining, remaining.len()),
        };

        let indent = indent_width(raw);
        let content = raw.trim_start_matches([' ', '\t']);
        let position = Position::at(self.line, raw.len() - content.len() + 1, self.offset);

        let token = if content.trim().is_empty() {
            Token::Blank
        } else {
            rules::classify(content)
        };

        self.offset += consumed;
        self.line += 1;

        Some(LineToken {
            token,
            indent,
            raw,
            position,
        })
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = LineToken<'input>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Classifies every line of `input`.
pub fn tokenize(input: &str) -> Vec<LineToken<'_>> {
    Lexer::new(input).collect()
}

/// Visual width of the leading whitespace of `line`.
pub fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += TAB_WIDTH - width % TAB_WIDTH,
            _ => break,
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_splitting() {
        let tokens = tokenize("a\nb\r\nc\rd");
        let raws: Vec<_> = tokens.iter().map(|t| t.raw).collect();
        assert_eq!(raws, vec!["a", "b", "c", "d"]);
        assert_eq!(tokens[1].position, Position::at(2, 1, 2));
        assert_eq!(tokens[2].position.offset, 5);
    }

    #[test]
    fn test_trailing_newline_yields_no_extra_line() {
        assert_eq!(tokenize("a\n").len(), 1);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_blank_and_indent() {
        let tokens = tokenize("   \n\t  code\n  - item");
        assert!(tokens[0].is_blank());
        assert_eq!(tokens[1].indent, 6);
        assert_eq!(tokens[1].content(), "code");
        assert_eq!(tokens[2].indent, 2);
        assert_eq!(tokens[2].position.column, 3);
        assert!(matches!(tokens[2].token, Token::ListMarker { .. }));
    }

    #[test]
    fn test_lexer_position_advances() {
        let mut lexer = Lexer::new("# one\ntwo");
        assert_eq!(lexer.position(), Position::new());
        let first = lexer.next_token().expect("first line");
        assert!(matches!(first.token, Token::AtxHeading { level: 1, .. }));
        assert_eq!(lexer.position(), Position::at(2, 1, 6));
    }
}
