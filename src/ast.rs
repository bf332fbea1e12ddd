use crate::lexer::Position;

/// Trait for visitor pattern support over the markup AST.
pub trait Visitable {
    /// Accept a visitor for immutable, depth-first traversal.
    fn accept<V: Visitor>(&self, visitor: &mut V);
}

/// Visitor trait for immutable AST traversal.
///
/// Every method has an empty default so visitors only implement what they need.
pub trait Visitor {
    fn visit_document(&mut self, _document: &Document) {}
    fn visit_block(&mut self, _block: &Block) {}
    fn visit_inline(&mut self, _inline: &Inline) {}
}

/// Root document node containing the entire parsed source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

/// Block-level constructs.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// ATX or setext heading with level (1-6) and inline content.
    Heading {
        level: u8,
        content: Vec<Inline>,
        position: Option<Position>,
    },
    /// Paragraph containing inline elements.
    Paragraph {
        content: Vec<Inline>,
        position: Option<Position>,
    },
    /// Fenced or indented code block. `language` is the first word of `info`.
    CodeBlock {
        info: Option<String>,
        language: Option<String>,
        content: String,
        position: Option<Position>,
    },
    /// Blockquote containing nested blocks.
    BlockQuote {
        content: Vec<Block>,
        position: Option<Position>,
    },
    /// Ordered or unordered list.
    List {
        kind: ListKind,
        tight: bool,
        items: Vec<ListItem>,
        position: Option<Position>,
    },
    /// GFM table with a header row and zero or more body rows.
    Table {
        alignments: Vec<Alignment>,
        header: TableRow,
        rows: Vec<TableRow>,
        position: Option<Position>,
    },
    /// Display math; `source` is the verbatim text between the delimiters.
    MathBlock {
        source: String,
        position: Option<Position>,
    },
    /// Thematic break (horizontal rule).
    ThematicBreak { position: Option<Position> },
    /// Literal embedded markup block.
    Raw {
        content: String,
        position: Option<Position>,
    },
}

/// Inline constructs.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    /// Plain text content.
    Text(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    /// GFM `~~strikethrough~~`.
    Strikethrough(Vec<Inline>),
    /// Inline code span.
    Code(String),
    /// Link with inline content, destination, and optional title.
    Link {
        content: Vec<Inline>,
        url: String,
        title: Option<String>,
    },
    /// Image with alt text, source, and optional title.
    Image {
        alt: String,
        url: String,
        title: Option<String>,
    },
    /// Math inside running text. `display` is set for `$$…$$` and `\[…\]` spans.
    MathInline { source: String, display: bool },
    /// Literal embedded markup span.
    Raw(String),
    SoftBreak,
    HardBreak,
}

/// List type and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Bullet list with marker character (-, +, *)
    Bullet { marker: char },
    /// Ordered list with start number and delimiter (. or ))
    Ordered { start: u32, delimiter: char },
}

impl ListKind {
    pub fn is_ordered(&self) -> bool {
        matches!(self, ListKind::Ordered { .. })
    }

    /// Two markers continue the same list when they are the same bullet character or
    /// the same ordered delimiter.
    pub fn continues(&self, other: &ListKind) -> bool {
        match (self, other) {
            (ListKind::Bullet { marker: a }, ListKind::Bullet { marker: b }) => a == b,
            (
                ListKind::Ordered { delimiter: a, .. },
                ListKind::Ordered { delimiter: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Individual list item.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub content: Vec<Block>,
    /// `None` for a plain item, `Some(checked)` for a GFM task item.
    pub task: Option<bool>,
}

/// Column alignment from a table delimiter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    None,
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Value for the `align` attribute, if any.
    pub fn as_attribute(&self) -> Option<&'static str> {
        match self {
            Alignment::None => None,
            Alignment::Left => Some("left"),
            Alignment::Center => Some("center"),
            Alignment::Right => Some("right"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCell {
    pub content: Vec<Inline>,
}

impl Visitable for Document {
    fn accept<V: Visitor>(&self, visitor: &mut V) {
        visitor.visit_document(self);
        for block in &self.blocks {
            block.accept(visitor);
        }
    }
}

impl Visitable for Block {
    fn accept<V: Visitor>(&self, visitor: &mut V) {
        visitor.visit_block(self);
        match self {
            Block::Heading { content, .. } | Block::Paragraph { content, .. } => {
                for inline in content {
                    inline.accept(visitor);
                }
            }
            Block::BlockQuote { content, .. } => {
                for block in content {
                    block.accept(visitor);
                }
            }
            Block::List { items, .. } => {
                for item in items {
                    for block in &item.content {
                        block.accept(visitor);
                    }
                }
            }
            Block::Table { header, rows, .. } => {
                for row in std::iter::once(header).chain(rows) {
                    for cell in &row.cells {
                        for inline in &cell.content {
                            inline.accept(visitor);
                        }
                    }
                }
            }
            Block::CodeBlock { .. }
            | Block::MathBlock { .. }
            | Block::ThematicBreak { .. }
            | Block::Raw { .. } => {}
        }
    }
}

impl Visitable for Inline {
    fn accept<V: Visitor>(&self, visitor: &mut V) {
        visitor.visit_inline(self);
        match self {
            Inline::Emphasis(content)
            | Inline::Strong(content)
            | Inline::Strikethrough(content)
            | Inline::Link { content, .. } => {
                for inline in content {
                    inline.accept(visitor);
                }
            }
            Inline::Text(_)
            | Inline::Code(_)
            | Inline::Image { .. }
            | Inline::MathInline { .. }
            | Inline::Raw(_)
            | Inline::SoftBreak
            | Inline::HardBreak => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        blocks: usize,
        inlines: usize,
    }

    impl Visitor for Counter {
        fn visit_block(&mut self, _block: &Block) {
            self.blocks += 1;
        }

        fn visit_inline(&mut self, _inline: &Inline) {
            self.inlines += 1;
        }
    }

    #[test]
    fn visitor_walks_nested_structure() {
        let document = Document {
            blocks: vec![
                Block::BlockQuote {
                    content: vec![Block::Paragraph {
                        content: vec![Inline::Strong(vec![Inline::Text("a".into())])],
                        position: None,
                    }],
                    position: None,
                },
                Block::Table {
                    alignments: vec![Alignment::None],
                    header: TableRow {
                        cells: vec![TableCell {
                            content: vec![Inline::Text("h".into())],
                        }],
                    },
                    rows: vec![TableRow {
                        cells: vec![TableCell {
                            content: vec![Inline::MathInline {
                                source: "x".into(),
                                display: false,
                            }],
                        }],
                    }],
                    position: None,
                },
            ],
        };

        let mut counter = Counter::default();
        document.accept(&mut counter);
        assert_eq!(counter.blocks, 3);
        assert_eq!(counter.inlines, 4);
    }

    #[test]
    fn list_kinds_continue_only_with_same_marker() {
        let dash = ListKind::Bullet { marker: '-' };
        let star = ListKind::Bullet { marker: '*' };
        let dot = ListKind::Ordered {
            start: 1,
            delimiter: '.',
        };
        let dot_later = ListKind::Ordered {
            start: 7,
            delimiter: '.',
        };
        assert!(dash.continues(&dash));
        assert!(!dash.continues(&star));
        assert!(dot.continues(&dot_later));
        assert!(!dot.continues(&dash));
        assert!(dot.is_ordered());
    }
}
