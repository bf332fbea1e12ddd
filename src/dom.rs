use tracing::trace;

use crate::ast::{Alignment, Block, Document, Inline, ListItem, ListKind, TableRow};
use crate::error::{PreviewError, Result};
use crate::highlight::{HighlightMode, language_class};
use crate::sanitize::{RawVerdict, closes, judge_raw};

/// Tag of the virtual root node; only its children are serialized.
pub const DOCUMENT_TAG: &str = "#document";

/// Represents an element in the display tree.
/// This is a generic, intermediate representation that decouples the AST
/// from the final output format.
#[derive(Debug, Clone, PartialEq)]
pub struct DomNode {
    pub tag: String,
    /// Attributes in emission order.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<DomChild>,
}

/// A child of a display tree element.
#[derive(Debug, Clone, PartialEq)]
pub enum DomChild {
    Element(DomNode),
    /// Text content; escaped by the serializer.
    Text(String),
    /// Opaque math region. Never escaped as markup, never inspected by the sanitizer.
    Math(MathPlaceholder),
}

/// Verbatim math source awaiting the external typesetting engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathPlaceholder {
    pub source: String,
    pub display: bool,
}

impl From<DomNode> for DomChild {
    fn from(node: DomNode) -> Self {
        DomChild::Element(node)
    }
}

impl DomNode {
    /// Creates a new display node with a given tag name (e.g., "h1", "p").
    pub fn new(tag: &str) -> Self {
        DomNode {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The virtual root.
    pub fn document() -> Self {
        Self::new(DOCUMENT_TAG)
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_children(mut self, children: Vec<DomChild>) -> Self {
        self.children = children;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text and math source of the subtree.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        collect_text(&self.children, &mut text);
        text
    }
}

fn collect_text(children: &[DomChild], text: &mut String) {
    for child in children {
        match child {
            DomChild::Element(node) => collect_text(&node.children, text),
            DomChild::Text(value) => text.push_str(value),
            DomChild::Math(math) => text.push_str(&math.source),
        }
    }
}

/// Appends text, merging with a preceding text child.
fn push_text(children: &mut Vec<DomChild>, value: &str) {
    if let Some(DomChild::Text(last)) = children.last_mut() {
        last.push_str(value);
    } else {
        children.push(DomChild::Text(value.to_string()));
    }
}

/// Maps the markup AST onto the display tree.
///
/// The mapping is one to one except for three things: code blocks gain a
/// `language-<name>` class, math becomes [`MathPlaceholder`] children, and literal
/// markup from the source becomes escaped text (or is removed entirely when the
/// sanitizer's deny policy flags it).
#[derive(Debug, Clone, Copy, Default)]
pub struct Transformer {
    highlight: HighlightMode,
}

impl Transformer {
    pub fn new(highlight: HighlightMode) -> Self {
        Self { highlight }
    }

    pub fn transform(&self, document: &Document) -> Result<DomNode> {
        let mut root = DomNode::document();
        self.transform_blocks(&document.blocks, false, &mut root.children)?;
        Ok(root)
    }

    /// `tight` unwraps paragraphs, as inside the items of a tight list.
    ///
    /// A deny-subtree element left open by a block also removes the following sibling
    /// blocks, up to and including the one that closes it.
    fn transform_blocks(&self, blocks: &[Block], tight: bool, output: &mut Vec<DomChild>) -> Result<()> {
        let mut blocks = blocks.iter();
        while let Some(block) = blocks.next() {
            if let Some(tag) = self.transform_block(block, tight, output)? {
                trace!(tag = %tag, "dropping blocks up to the closing tag");
                for skipped in blocks.by_ref() {
                    if block_closes(skipped, &tag) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the deny-subtree element `block` leaves open, if any.
    fn transform_block(
        &self,
        block: &Block,
        tight: bool,
        output: &mut Vec<DomChild>,
    ) -> Result<Option<String>> {
        match block {
            Block::Heading { level, content, .. } => {
                if !(1..=6).contains(level) {
                    return Err(PreviewError::transform_error(format!(
                        "heading level {level} is outside 1-6"
                    )));
                }
                let heading = DomNode::new(&format!("h{level}")).with_children(self.inlines(content));
                output.push(heading.into());
            }
            Block::Paragraph { content, .. } => {
                let (children, open) = self.inlines_leaving_open(content);
                if tight {
                    output.extend(children);
                } else {
                    output.push(DomNode::new("p").with_children(children).into());
                }
                return Ok(open);
            }
            Block::CodeBlock {
                language, content, ..
            } => {
                let mut code = DomNode::new("code");
                if let Some(class) = language_class(language.as_deref(), content, self.highlight) {
                    code = code.with_attribute("class", &class);
                }
                code.children.push(DomChild::Text(content.clone()));
                output.push(DomNode::new("pre").with_children(vec![code.into()]).into());
            }
            Block::BlockQuote { content, .. } => {
                let mut quote = DomNode::new("blockquote");
                self.transform_blocks(content, false, &mut quote.children)?;
                output.push(quote.into());
            }
            Block::List {
                kind, tight, items, ..
            } => {
                let mut list = match kind {
                    ListKind::Ordered { start, .. } if *start != 1 => {
                        DomNode::new("ol").with_attribute("start", &start.to_string())
                    }
                    ListKind::Ordered { .. } => DomNode::new("ol"),
                    ListKind::Bullet { .. } => DomNode::new("ul"),
                };
                for item in items {
                    list.children.push(self.list_item(item, *tight)?.into());
                }
                output.push(list.into());
            }
            Block::Table {
                alignments,
                header,
                rows,
                ..
            } => output.push(self.table(alignments, header, rows).into()),
            Block::MathBlock { source, .. } => output.push(DomChild::Math(MathPlaceholder {
                source: source.clone(),
                display: true,
            })),
            Block::ThematicBreak { .. } => output.push(DomNode::new("hr").into()),
            Block::Raw { content, .. } => match judge_raw(content) {
                RawVerdict::Escape if tight => push_text(output, content),
                RawVerdict::Escape => {
                    output.push(
                        DomNode::new("p")
                            .with_children(vec![DomChild::Text(content.clone())])
                            .into(),
                    );
                }
                RawVerdict::Drop => trace!("dropped raw block"),
                RawVerdict::DropUntilClose(tag) => return Ok(Some(tag)),
            },
        }
        Ok(None)
    }

    fn list_item(&self, item: &ListItem, tight: bool) -> Result<DomNode> {
        let mut li = DomNode::new("li");
        self.transform_blocks(&item.content, tight, &mut li.children)?;

        if let Some(checked) = item.task {
            let mut checkbox = DomNode::new("input").with_attribute("type", "checkbox");
            if checked {
                checkbox = checkbox.with_attribute("checked", "");
            }
            checkbox = checkbox.with_attribute("disabled", "");

            let prefix: [DomChild; 2] = [checkbox.into(), DomChild::Text(" ".to_string())];
            // Loose items carry the checkbox inside their leading paragraph.
            match li.children.first_mut() {
                Some(DomChild::Element(paragraph)) if paragraph.tag == "p" => {
                    paragraph.children.splice(0..0, prefix);
                }
                _ => {
                    li.children.splice(0..0, prefix);
                }
            }
        }
        Ok(li)
    }

    fn table(&self, alignments: &[Alignment], header: &TableRow, rows: &[TableRow]) -> DomNode {
        let mut table = DomNode::new("table");
        table.children.push(
            DomNode::new("thead")
                .with_children(vec![self.table_row(header, alignments, "th").into()])
                .into(),
        );
        if !rows.is_empty() {
            let body = rows
                .iter()
                .map(|row| self.table_row(row, alignments, "td").into())
                .collect();
            table
                .children
                .push(DomNode::new("tbody").with_children(body).into());
        }
        table
    }

    fn table_row(&self, row: &TableRow, alignments: &[Alignment], cell_tag: &str) -> DomNode {
        let cells = row
            .cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let mut node = DomNode::new(cell_tag);
                if let Some(align) = alignments.get(idx).and_then(Alignment::as_attribute) {
                    node = node.with_attribute("align", align);
                }
                node.with_children(self.inlines(&cell.content)).into()
            })
            .collect();
        DomNode::new("tr").with_children(cells)
    }

    fn inlines(&self, inlines: &[Inline]) -> Vec<DomChild> {
        self.inlines_leaving_open(inlines).0
    }

    /// Converts inlines, also reporting a deny-subtree element whose closing tag is
    /// not among them.
    fn inlines_leaving_open(&self, inlines: &[Inline]) -> (Vec<DomChild>, Option<String>) {
        let mut output = Vec::new();
        let mut open = None;
        let mut iter = inlines.iter();

        while let Some(inline) = iter.next() {
            match inline {
                Inline::Text(text) => push_text(&mut output, text),
                Inline::Emphasis(content) => {
                    output.push(DomNode::new("em").with_children(self.inlines(content)).into())
                }
                Inline::Strong(content) => {
                    output.push(DomNode::new("strong").with_children(self.inlines(content)).into())
                }
                Inline::Strikethrough(content) => {
                    output.push(DomNode::new("del").with_children(self.inlines(content)).into())
                }
                Inline::Code(code) => output.push(
                    DomNode::new("code")
                        .with_children(vec![DomChild::Text(code.clone())])
                        .into(),
                ),
                Inline::Link {
                    content,
                    url,
                    title,
                } => {
                    let mut link = DomNode::new("a").with_attribute("href", url);
                    if let Some(title) = title {
                        link = link.with_attribute("title", title);
                    }
                    output.push(link.with_children(self.inlines(content)).into());
                }
                Inline::Image { alt, url, title } => {
                    let mut image = DomNode::new("img")
                        .with_attribute("src", url)
                        .with_attribute("alt", alt);
                    if let Some(title) = title {
                        image = image.with_attribute("title", title);
                    }
                    output.push(image.into());
                }
                Inline::MathInline { source, display } => {
                    output.push(DomChild::Math(MathPlaceholder {
                        source: source.clone(),
                        display: *display,
                    }))
                }
                Inline::Raw(fragment) => match judge_raw(fragment) {
                    RawVerdict::Escape => push_text(&mut output, fragment),
                    RawVerdict::Drop => trace!(fragment = %fragment, "dropped raw fragment"),
                    RawVerdict::DropUntilClose(tag) => {
                        trace!(tag = %tag, "dropped raw element and its content");
                        let closed = iter
                            .by_ref()
                            .any(|skipped| matches!(skipped, Inline::Raw(fragment) if closes(fragment, &tag)));
                        if !closed {
                            open = Some(tag);
                        }
                    }
                },
                Inline::SoftBreak => push_text(&mut output, "\n"),
                Inline::HardBreak => {
                    output.push(DomNode::new("br").into());
                    push_text(&mut output, "\n");
                }
            }
        }
        (output, open)
    }
}

/// Whether `block` holds the closing tag of the deny-subtree element `tag`.
fn block_closes(block: &Block, tag: &str) -> bool {
    match block {
        Block::Raw { content, .. } => closes(content, tag),
        Block::Paragraph { content, .. } => content
            .iter()
            .any(|inline| matches!(inline, Inline::Raw(fragment) if closes(fragment, tag))),
        _ => false,
    }
}

/// Converts a markup AST into the display tree with the given highlight mode.
pub fn from_ast(document: &Document, highlight: HighlightMode) -> Result<DomNode> {
    Transformer::new(highlight).transform(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn transform(source: &str) -> DomNode {
        from_ast(&parse(source), HighlightMode::Explicit).expect("transform should succeed")
    }

    fn element(child: &DomChild) -> &DomNode {
        match child {
            DomChild::Element(node) => node,
            other => panic!("expected element, found {other:?}"),
        }
    }

    #[test]
    fn maps_heading_and_math() {
        let root = transform("# Title\n\nSome **bold** text with $x^2$.");
        assert_eq!(root.tag, DOCUMENT_TAG);
        let heading = element(&root.children[0]);
        assert_eq!(heading.tag, "h1");
        assert_eq!(heading.text_content(), "Title");

        let paragraph = element(&root.children[1]);
        assert_eq!(element(&paragraph.children[1]).tag, "strong");
        assert!(paragraph.children.contains(&DomChild::Math(MathPlaceholder {
            source: "x^2".to_string(),
            display: false,
        })));
    }

    #[test]
    fn code_blocks_get_language_class() {
        let root = transform("```Rust\nfn main() {}\n```");
        let pre = element(&root.children[0]);
        let code = element(&pre.children[0]);
        assert_eq!(code.attribute("class"), Some("language-rust"));
        assert_eq!(code.children, vec![DomChild::Text("fn main() {}\n".to_string())]);
    }

    #[test]
    fn raw_markup_becomes_text() {
        let root = transform("a <b>bold</b> word");
        let paragraph = element(&root.children[0]);
        assert_eq!(
            paragraph.children,
            vec![DomChild::Text("a <b>bold</b> word".to_string())]
        );

        let root = transform("<div>\nblock\n</div>");
        let paragraph = element(&root.children[0]);
        assert_eq!(paragraph.tag, "p");
        assert_eq!(paragraph.text_content(), "<div>\nblock\n</div>");
    }

    #[test]
    fn dangerous_raw_markup_is_removed() {
        let root = transform("x <script>alert(1)</script> y <img src=a onerror=b> z");
        let paragraph = element(&root.children[0]);
        assert_eq!(paragraph.children, vec![DomChild::Text("x  y  z".to_string())]);

        let root = transform("<script>alert(1)</script>\n\nafter");
        assert_eq!(root.children.len(), 1);
        assert_eq!(element(&root.children[0]).text_content(), "after");
    }

    #[test]
    fn script_and_style_bodies_with_blank_lines_are_removed() {
        let root = transform("<script>\nvar token = steal();\n\nsend(token);\n</script>");
        assert!(root.children.is_empty(), "{:?}", root.children);

        let root = transform("<style>\n.x{color:red}\n\n.y{}\n</style>\n\nshown");
        assert_eq!(root.children.len(), 1);
        assert_eq!(element(&root.children[0]).text_content(), "shown");
    }

    #[test]
    fn unclosed_element_drops_following_blocks_until_closed() {
        let root = transform("<div>\n<script>\nvar a;\n\nleak();\n\n</script>\n\nafter");
        assert_eq!(root.children.len(), 1, "{:?}", root.children);
        assert_eq!(element(&root.children[0]).text_content(), "after");

        let root = transform("intro <script>\n\nleak();\n\nend </script> tail\n\nafter");
        let texts: Vec<_> = root
            .children
            .iter()
            .map(|child| element(child).text_content())
            .collect();
        assert_eq!(texts, vec!["intro ".to_string(), "after".to_string()]);
    }

    #[test]
    fn tight_lists_unwrap_paragraphs() {
        let root = transform("- [x] done\n- plain");
        let list = element(&root.children[0]);
        assert_eq!(list.tag, "ul");
        let first = element(&list.children[0]);
        let checkbox = element(&first.children[0]);
        assert_eq!(checkbox.tag, "input");
        assert_eq!(checkbox.attribute("checked"), Some(""));
        assert_eq!(first.text_content(), " done");
        let second = element(&list.children[1]);
        assert_eq!(second.children, vec![DomChild::Text("plain".to_string())]);
    }

    #[test]
    fn loose_ordered_lists_keep_paragraphs() {
        let root = transform("3. a\n\n4. b");
        let list = element(&root.children[0]);
        assert_eq!(list.tag, "ol");
        assert_eq!(list.attribute("start"), Some("3"));
        let item = element(&list.children[0]);
        assert_eq!(element(&item.children[0]).tag, "p");
    }

    #[test]
    fn tables_carry_alignment() {
        let root = transform("| a | b |\n| :-: | --- |\n| 1 | 2 |");
        let table = element(&root.children[0]);
        let head = element(&table.children[0]);
        let row = element(&head.children[0]);
        let first = element(&row.children[0]);
        assert_eq!(first.tag, "th");
        assert_eq!(first.attribute("align"), Some("center"));
        assert_eq!(element(&row.children[1]).attribute("align"), None);
        assert_eq!(element(&table.children[1]).tag, "tbody");
    }

    #[test]
    fn rejects_invalid_heading_levels() {
        let document = Document {
            blocks: vec![Block::Heading {
                level: 9,
                content: Vec::new(),
                position: None,
            }],
        };
        let error = from_ast(&document, HighlightMode::Auto).expect_err("level 9 is invalid");
        assert_eq!(error.stage(), "transform");
    }
}
