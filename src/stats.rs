use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::ast::{Block, Inline, Visitable, Visitor};
use crate::parser::parse;

/// Words per minute used for the reading time estimate.
pub const WORDS_PER_MINUTE: usize = 200;

/// Document statistics for a status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextStats {
    pub words: usize,
    /// Grapheme clusters, so `é` written with a combining accent counts once.
    pub characters: usize,
    pub characters_no_whitespace: usize,
    pub reading_minutes: usize,
    /// Display math: math blocks plus `$$…$$` / `\[…\]` inside paragraphs.
    pub math_blocks: usize,
}

impl TextStats {
    pub fn calculate(text: &str) -> Self {
        let words = text.split_whitespace().count();
        let (characters, characters_no_whitespace) =
            text.graphemes(true).fold((0, 0), |(all, visible), grapheme| {
                let blank = grapheme.chars().all(char::is_whitespace);
                (all + 1, visible + usize::from(!blank))
            });

        let mut counter = MathCounter::default();
        parse(text).accept(&mut counter);

        Self {
            words,
            characters,
            characters_no_whitespace,
            reading_minutes: words.div_ceil(WORDS_PER_MINUTE),
            math_blocks: counter.display,
        }
    }
}

#[derive(Default)]
struct MathCounter {
    display: usize,
}

impl Visitor for MathCounter {
    fn visit_block(&mut self, block: &Block) {
        if let Block::MathBlock { .. } = block {
            self.display += 1;
        }
    }

    fn visit_inline(&mut self, inline: &Inline) {
        if let Inline::MathInline { display: true, .. } = inline {
            self.display += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(TextStats::calculate(""), TextStats::default());
    }

    #[test]
    fn test_counts() {
        let stats = TextStats::calculate("Hello  wörld\n\ne\u{301}!");
        assert_eq!(stats.words, 3);
        assert_eq!(stats.characters, 16);
        assert_eq!(stats.characters_no_whitespace, 12);
        assert_eq!(stats.reading_minutes, 1);
    }

    #[test]
    fn test_reading_time_rounds_up() {
        let text = "word ".repeat(401);
        assert_eq!(TextStats::calculate(&text).reading_minutes, 3);
    }

    #[test]
    fn test_math_blocks() {
        let text = "$$\na^2\n$$\n\nInline $x$ and $$y$$ and \\[z\\].\n\n```\n$$not math$$\n```";
        assert_eq!(TextStats::calculate(text).math_blocks, 3);
    }
}
