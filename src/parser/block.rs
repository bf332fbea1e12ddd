use crate::ast::{Alignment, Block, Inline, ListItem, ListKind, TableCell, TableRow};
use crate::lexer::{
    HtmlBlockKind, LineToken, MathDelimiter, Position, Token, split_table_row, tokenize,
};
use crate::parser::ParserConfig;
use crate::parser::inline::InlineParser;
use crate::parser::utils::{ParagraphBuffer, language_of, strip_columns};

/// Block parser over classified lines. Container blocks (block quotes, list items)
/// strip their markers and re-parse the inner source one level deeper.
pub(crate) struct BlockParser<'c> {
    config: &'c ParserConfig,
    depth: usize,
}

impl<'c> BlockParser<'c> {
    pub(crate) fn new(config: &'c ParserConfig) -> Self {
        Self { config, depth: 0 }
    }

    fn nested(&self) -> Self {
        Self {
            config: self.config,
            depth: self.depth + 1,
        }
    }

    fn can_nest(&self) -> bool {
        self.depth < self.config.max_nesting_depth
    }

    /// Positions are only meaningful for lines of the original source.
    fn locate(&self, position: Position) -> Option<Position> {
        (self.depth == 0).then_some(position)
    }

    fn inlines(&self, text: &str) -> Vec<Inline> {
        InlineParser::new(self.config).parse(text)
    }

    pub(crate) fn parse(&self, source: &str) -> Vec<Block> {
        let lines = tokenize(source);
        let mut blocks = Vec::new();
        let mut paragraph = ParagraphBuffer::default();
        let mut idx = 0;
        while idx < lines.len() {
            idx = self.parse_line(&lines, idx, &mut paragraph, &mut blocks);
        }
        self.flush(&mut paragraph, &mut blocks);
        blocks
    }

    fn flush(&self, paragraph: &mut ParagraphBuffer<'_>, blocks: &mut Vec<Block>) {
        if let Some((text, position)) = paragraph.take_text() {
            let content = self.inlines(&text);
            if !content.is_empty() {
                blocks.push(Block::Paragraph {
                    content,
                    position: self.locate(position),
                });
            }
        }
    }

    /// Handles the line at `idx` and returns the index of the next unconsumed line.
    fn parse_line<'s>(
        &self,
        lines: &[LineToken<'s>],
        idx: usize,
        paragraph: &mut ParagraphBuffer<'s>,
        blocks: &mut Vec<Block>,
    ) -> usize {
        let line = &lines[idx];

        if line.is_blank() {
            self.flush(paragraph, blocks);
            return idx + 1;
        }

        if line.indent >= 4 {
            if paragraph.is_open() {
                paragraph.push(line.content(), line.position);
                return idx + 1;
            }
            return self.parse_indented_code(lines, idx, blocks);
        }

        match &line.token {
            Token::AtxHeading { level, content } => {
                self.flush(paragraph, blocks);
                blocks.push(Block::Heading {
                    level: *level,
                    content: self.inlines(content),
                    position: self.locate(line.position),
                });
                idx + 1
            }
            Token::SetextUnderline { level } if paragraph.is_open() => {
                if let Some((text, position)) = paragraph.take_text() {
                    blocks.push(Block::Heading {
                        level: *level,
                        content: self.inlines(&text),
                        position: self.locate(position),
                    });
                }
                idx + 1
            }
            Token::SetextUnderline { level: 2 } | Token::ThematicBreak => {
                self.flush(paragraph, blocks);
                blocks.push(Block::ThematicBreak {
                    position: self.locate(line.position),
                });
                idx + 1
            }
            Token::CodeFence {
                marker,
                length,
                info,
            } => {
                self.flush(paragraph, blocks);
                self.parse_fenced_code(lines, idx, *marker, *length, *info, blocks)
            }
            Token::MathFence { delimiter, rest }
                if self.config.math && *delimiter != MathDelimiter::BracketClose =>
            {
                match self.parse_math_block(lines, idx, *delimiter, rest) {
                    Some((block, next)) => {
                        self.flush(paragraph, blocks);
                        blocks.push(block);
                        next
                    }
                    None => {
                        paragraph.push(line.content(), line.position);
                        idx + 1
                    }
                }
            }
            Token::BlockQuote { .. } if self.can_nest() => {
                self.flush(paragraph, blocks);
                self.parse_blockquote(lines, idx, blocks)
            }
            Token::ListMarker { kind, content, .. }
                if self.can_nest()
                    && (!paragraph.is_open() || interrupts_paragraph(kind, content)) =>
            {
                self.flush(paragraph, blocks);
                self.parse_list(lines, idx, *kind, blocks)
            }
            Token::TableDelimiter { alignments }
                if self.config.gfm
                    && paragraph
                        .last_line()
                        .is_some_and(|header| split_table_row(header).len() == alignments.len()) =>
            {
                match paragraph.pop_last() {
                    Some(header) => {
                        self.flush(paragraph, blocks);
                        self.parse_table(lines, idx, header, alignments, blocks)
                    }
                    None => idx + 1,
                }
            }
            Token::HtmlBlock { kind } if !paragraph.is_open() || kind.interrupts_paragraph() => {
                self.flush(paragraph, blocks);
                self.parse_raw_block(lines, idx, *kind, blocks)
            }
            _ => {
                paragraph.push(line.content(), line.position);
                idx + 1
            }
        }
    }

    fn parse_indented_code(&self, lines: &[LineToken<'_>], idx: usize, blocks: &mut Vec<Block>) -> usize {
        let mut body = Vec::new();
        let mut next = idx;
        while let Some(line) = lines.get(next) {
            if !line.is_blank() && line.indent < 4 {
                break;
            }
            body.push(strip_columns(line.raw, 4));
            next += 1;
        }
        while body.last().is_some_and(|line| line.trim().is_empty()) {
            body.pop();
        }

        blocks.push(Block::CodeBlock {
            info: None,
            language: None,
            content: code_content(&body),
            position: self.locate(lines[idx].position),
        });
        next
    }

    fn parse_fenced_code(
        &self,
        lines: &[LineToken<'_>],
        idx: usize,
        marker: char,
        length: usize,
        info: Option<&str>,
        blocks: &mut Vec<Block>,
    ) -> usize {
        let fence_indent = lines[idx].indent;
        let mut body = Vec::new();
        let mut next = idx + 1;
        // An unclosed fence runs to the end of the input.
        while let Some(line) = lines.get(next) {
            next += 1;
            let closes = line.indent < 4
                && matches!(
                    line.token,
                    Token::CodeFence { marker: m, length: l, info: None } if m == marker && l >= length
                );
            if closes {
                break;
            }
            body.push(strip_columns(line.raw, fence_indent));
        }

        blocks.push(Block::CodeBlock {
            info: info.map(str::to_string),
            language: info.and_then(language_of),
            content: code_content(&body),
            position: self.locate(lines[idx].position),
        });
        next
    }

    /// Block math up to the line ending in the closing delimiter. `None` when the fence
    /// never closes; the caller then keeps the line as paragraph text.
    fn parse_math_block(
        &self,
        lines: &[LineToken<'_>],
        idx: usize,
        delimiter: MathDelimiter,
        rest: &str,
    ) -> Option<(Block, usize)> {
        let closing = delimiter.closing();
        let position = self.locate(lines[idx].position);
        let opener = rest.trim();

        if let Some(source) = opener.strip_suffix(closing) {
            let source = source.trim();
            return (!source.is_empty()).then(|| {
                (
                    Block::MathBlock {
                        source: source.to_string(),
                        position,
                    },
                    idx + 1,
                )
            });
        }

        let mut parts = Vec::new();
        if !opener.is_empty() {
            parts.push(opener);
        }
        for (offset, line) in lines[idx + 1..].iter().enumerate() {
            let raw = line.raw.trim_end();
            if let Some(before) = raw.strip_suffix(closing) {
                if !before.trim().is_empty() {
                    parts.push(before);
                }
                let source = parts.join("\n");
                return Some((
                    Block::MathBlock {
                        source: source.trim().to_string(),
                        position,
                    },
                    idx + offset + 2,
                ));
            }
            parts.push(line.raw);
        }
        None
    }

    fn parse_blockquote(&self, lines: &[LineToken<'_>], idx: usize, blocks: &mut Vec<Block>) -> usize {
        let mut inner = Vec::new();
        let mut next = idx;
        let mut lazy = false;
        while let Some(line) = lines.get(next) {
            match &line.token {
                Token::BlockQuote { content } if line.indent < 4 => {
                    inner.push(*content);
                    lazy = !content.trim().is_empty();
                }
                Token::Text { .. } if lazy => inner.push(line.content()),
                _ => break,
            }
            next += 1;
        }

        blocks.push(Block::BlockQuote {
            content: self.nested().parse(&inner.join("\n")),
            position: self.locate(lines[idx].position),
        });
        next
    }

    fn parse_list(
        &self,
        lines: &[LineToken<'_>],
        idx: usize,
        kind: ListKind,
        blocks: &mut Vec<Block>,
    ) -> usize {
        let mut items = Vec::new();
        let mut loose = false;
        let mut blank_before_item = false;
        let mut next = idx;

        while let Some(line) = lines.get(next) {
            let Token::ListMarker {
                kind: item_kind,
                marker_width,
                content,
                task,
            } = &line.token
            else {
                break;
            };
            if !kind.continues(item_kind) {
                break;
            }
            loose |= blank_before_item;

            let width = line.indent + marker_width;
            let (first, task) = if self.config.gfm {
                (*content, *task)
            } else {
                (line.content().get(*marker_width..).unwrap_or(""), None)
            };

            let mut item_lines = vec![first.to_string()];
            let mut blank_run = 0;
            next += 1;
            while let Some(line) = lines.get(next) {
                if line.is_blank() {
                    blank_run += 1;
                } else if line.indent >= width {
                    if blank_run > 0 {
                        loose = true;
                        item_lines.extend(std::iter::repeat_n(String::new(), blank_run));
                        blank_run = 0;
                    }
                    item_lines.push(strip_columns(line.raw, width));
                } else if blank_run == 0 && matches!(line.token, Token::Text { .. }) {
                    item_lines.push(line.content().to_string());
                } else {
                    break;
                }
                next += 1;
            }
            blank_before_item = blank_run > 0;

            items.push(ListItem {
                content: self.nested().parse(&item_lines.join("\n")),
                task,
            });
        }

        blocks.push(Block::List {
            kind,
            tight: !loose,
            items,
            position: self.locate(lines[idx].position),
        });
        next
    }

    fn parse_table(
        &self,
        lines: &[LineToken<'_>],
        idx: usize,
        (header, position): (&str, Position),
        alignments: &[Alignment],
        blocks: &mut Vec<Block>,
    ) -> usize {
        let columns = alignments.len();
        let header = self.table_row(header, columns);
        let mut rows = Vec::new();
        let mut next = idx + 1;
        while let Some(line) = lines.get(next) {
            match line.token {
                Token::Text { .. } | Token::HtmlBlock { .. } if line.indent < 4 => {
                    rows.push(self.table_row(line.content(), columns));
                }
                _ => break,
            }
            next += 1;
        }

        blocks.push(Block::Table {
            alignments: alignments.to_vec(),
            header,
            rows,
            position: self.locate(position),
        });
        next
    }

    /// Cells beyond the column count are dropped and missing cells are empty.
    fn table_row(&self, line: &str, columns: usize) -> TableRow {
        let mut cells: Vec<TableCell> = split_table_row(line)
            .into_iter()
            .take(columns)
            .map(|cell| TableCell {
                content: self.inlines(&cell.trim().replace("\\|", "|")),
            })
            .collect();
        cells.resize_with(columns, TableCell::default);
        TableRow { cells }
    }

    /// Verbatim blocks run to the line holding their end marker, or to the end of the
    /// input when it never appears; the others stop at the next blank line.
    fn parse_raw_block(
        &self,
        lines: &[LineToken<'_>],
        idx: usize,
        kind: HtmlBlockKind,
        blocks: &mut Vec<Block>,
    ) -> usize {
        let mut body = Vec::new();
        let mut next = idx;
        while let Some(line) = lines.get(next) {
            match kind {
                HtmlBlockKind::Verbatim { .. } => {
                    body.push(line.raw);
                    next += 1;
                    if kind.ends_at(line.raw) {
                        break;
                    }
                }
                HtmlBlockKind::Block | HtmlBlockKind::Standalone => {
                    if kind.ends_at(line.raw) {
                        break;
                    }
                    body.push(line.raw);
                    next += 1;
                }
            }
        }

        blocks.push(Block::Raw {
            content: body.join("\n"),
            position: self.locate(lines[idx].position),
        });
        next
    }
}

/// An ordered list can only interrupt a paragraph when it starts at 1, and an empty
/// item never does.
fn interrupts_paragraph(kind: &ListKind, content: &str) -> bool {
    !content.trim().is_empty()
        && match kind {
            ListKind::Bullet { .. } => true,
            ListKind::Ordered { start, .. } => *start == 1,
        }
}

fn code_content(lines: &[String]) -> String {
    lines.iter().fold(String::new(), |mut content, line| {
        content.push_str(line);
        content.push('\n');
        content
    })
}
