use std::fmt::Write;
use std::ops::Range;

use crate::dom::{DOCUMENT_TAG, DomChild, DomNode, MathPlaceholder};
use crate::error::{PreviewError, Result};

/// Class of the inline math wrapper element.
pub const MATH_INLINE_CLASS: &str = "math math-inline";
/// Class of the display math wrapper element.
pub const MATH_DISPLAY_CLASS: &str = "math math-display";

/// Serialized markup plus the location of every math wrapper in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    pub html: String,
    pub placeholders: Vec<PlaceholderSpan>,
}

impl Generated {
    pub fn has_math(&self) -> bool {
        !self.placeholders.is_empty()
    }
}

/// A math wrapper emitted into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderSpan {
    /// Byte range of the whole wrapper element in [`Generated::html`].
    pub range: Range<usize>,
    /// Verbatim math source.
    pub source: String,
    pub display: bool,
}

/// Low level markup writer.
#[derive(Debug, Default)]
pub struct HtmlWriter {
    buffer: String,
    placeholders: Vec<PlaceholderSpan>,
}

impl HtmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes an opening tag with attributes in the given order.
    pub fn write_opening_tag(&mut self, tag: &str, attributes: &[(String, String)]) -> Result<()> {
        self.buffer.push('<');
        self.buffer.push_str(tag);
        for (key, value) in attributes {
            if value.is_empty() {
                write!(self.buffer, " {key}")?;
            } else {
                write!(self.buffer, " {key}=\"{}\"", escape_html_attribute(value))?;
            }
        }
        self.buffer.push('>');
        Ok(())
    }

    pub fn write_closing_tag(&mut self, tag: &str) {
        self.buffer.push_str("</");
        self.buffer.push_str(tag);
        self.buffer.push('>');
    }

    /// Writes text content, escaping reserved characters.
    pub fn write_text(&mut self, text: &str) {
        self.buffer.push_str(&escape_html(text));
    }

    /// Writes a math wrapper. Only `&`, `<` and `>` are encoded so the mounted text
    /// content is the source byte-for-byte.
    pub fn write_math(&mut self, math: &MathPlaceholder, flow: bool) -> Result<()> {
        let start = self.buffer.len();
        let (tag, class) = match (math.display, flow) {
            (true, true) => ("div", MATH_DISPLAY_CLASS),
            (true, false) => ("span", MATH_DISPLAY_CLASS),
            (false, _) => ("span", MATH_INLINE_CLASS),
        };
        write!(self.buffer, "<{tag} class=\"{class}\">{}</{tag}>", escape_math(&math.source))?;
        self.placeholders.push(PlaceholderSpan {
            range: start..self.buffer.len(),
            source: math.source.clone(),
            display: math.display,
        });
        if tag == "div" {
            self.buffer.push('\n');
        }
        Ok(())
    }

    /// Starts a new line unless the output is empty or already at a line start.
    fn ensure_line_start(&mut self) {
        if !self.buffer.is_empty() && !self.buffer.ends_with('\n') {
            self.buffer.push('\n');
        }
    }

    pub fn finish(self) -> Generated {
        Generated {
            html: self.buffer,
            placeholders: self.placeholders,
        }
    }
}

/// Escapes markup special characters in text content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Escapes markup special characters in attribute values.
pub fn escape_html_attribute(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            c => escaped.push_str(&escape_html(c.encode_utf8(&mut [0; 4]))),
        }
    }
    escaped
}

fn escape_math(source: &str) -> String {
    let mut escaped = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Serializes a sanitized display tree.
///
/// Emission is depth first and deterministic: attributes appear in the order the
/// node carries them, which after sanitization is the schema's declared order.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlGenerator;

impl HtmlGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generates markup for the children of `root`.
    pub fn generate(&self, root: &DomNode) -> Result<Generated> {
        let mut writer = HtmlWriter::new();
        self.render_children(&root.children, is_flow_container(&root.tag), &mut writer)?;
        Ok(writer.finish())
    }

    fn render_children(&self, children: &[DomChild], flow: bool, writer: &mut HtmlWriter) -> Result<()> {
        for child in children {
            match child {
                DomChild::Element(element) => self.render_dom_node(element, writer)?,
                DomChild::Text(text) => writer.write_text(text),
                DomChild::Math(math) => {
                    if math.display && flow {
                        writer.ensure_line_start();
                    }
                    writer.write_math(math, flow)?;
                }
            }
        }
        Ok(())
    }

    fn render_dom_node(&self, node: &DomNode, writer: &mut HtmlWriter) -> Result<()> {
        if !is_valid_tag(&node.tag) {
            return Err(PreviewError::generation_error(format!(
                "invalid element name `{}`",
                node.tag
            )));
        }
        if let Some((name, _)) = node.attributes.iter().find(|(name, _)| !is_valid_tag(name)) {
            return Err(PreviewError::generation_error(format!(
                "invalid attribute name `{name}` on <{}>",
                node.tag
            )));
        }

        let block = self.is_block_element(&node.tag);
        if block {
            writer.ensure_line_start();
        }

        writer.write_opening_tag(&node.tag, &node.attributes)?;
        if self.is_self_closing_tag(&node.tag) {
            if block {
                writer.buffer.push('\n');
            }
            return Ok(());
        }

        self.render_children(&node.children, is_flow_container(&node.tag), writer)?;

        writer.write_closing_tag(&node.tag);
        if block {
            writer.buffer.push('\n');
        }
        Ok(())
    }

    /// Checks if a tag is a void element
    fn is_self_closing_tag(&self, tag: &str) -> bool {
        matches!(
            tag,
            "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "param" | "source" | "track" | "wbr"
        )
    }

    /// Checks if an element is a block-level element
    fn is_block_element(&self, tag: &str) -> bool {
        matches!(
            tag,
            "address" | "article" | "aside" | "blockquote" | "details" | "dialog" | "dd" | "div" | "dl" | "dt" | "fieldset" | "figcaption" | "figure" | "footer" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "header" | "hgroup" | "hr" | "li" | "main" | "nav" | "ol" | "p" | "pre" | "section" | "table" | "tbody" | "td" | "th" | "thead" | "tr" | "ul"
        )
    }
}

/// Containers whose children may be block level; display math becomes a `div` there.
fn is_flow_container(tag: &str) -> bool {
    matches!(tag, DOCUMENT_TAG | "blockquote" | "li" | "div" | "section" | "article")
}

fn is_valid_tag(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

/// Serializes `root` with the default generator.
pub fn generate_html(root: &DomNode) -> Result<Generated> {
    HtmlGenerator::new().generate(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> DomChild {
        DomChild::Text(value.to_string())
    }

    fn root(children: Vec<DomChild>) -> DomNode {
        DomNode::document().with_children(children)
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
        assert_eq!(escape_html_attribute("a\"b\nc"), "a&quot;b&#10;c");
    }

    #[test]
    fn test_block_elements_end_lines() {
        let dom = root(vec![
            DomNode::new("h1").with_children(vec![text("Title")]).into(),
            DomNode::new("p")
                .with_children(vec![
                    text("a "),
                    DomNode::new("strong").with_children(vec![text("b")]).into(),
                ])
                .into(),
            DomNode::new("hr").into(),
        ]);
        let generated = generate_html(&dom).expect("generation should succeed");
        assert_eq!(generated.html, "<h1>Title</h1>\n<p>a <strong>b</strong></p>\n<hr>\n");
        assert!(!generated.has_math());
    }

    #[test]
    fn test_nested_lists_start_on_new_lines() {
        let nested = DomNode::new("ul")
            .with_children(vec![DomNode::new("li").with_children(vec![text("x")]).into()]);
        let dom = root(vec![DomNode::new("ul")
            .with_children(vec![DomNode::new("li")
                .with_children(vec![text("two"), nested.into()])
                .into()])
            .into()]);
        let generated = generate_html(&dom).expect("generation should succeed");
        assert_eq!(generated.html, "<ul>\n<li>two\n<ul>\n<li>x</li>\n</ul>\n</li>\n</ul>\n");
    }

    #[test]
    fn test_attributes_and_void_elements() {
        let dom = root(vec![DomNode::new("p")
            .with_children(vec![
                DomNode::new("input")
                    .with_attribute("type", "checkbox")
                    .with_attribute("disabled", "")
                    .into(),
                DomNode::new("a")
                    .with_attribute("href", "https://x.y/?a=1&b=\"2\"")
                    .with_children(vec![text("l")])
                    .into(),
            ])
            .into()]);
        let generated = generate_html(&dom).expect("generation should succeed");
        assert_eq!(
            generated.html,
            "<p><input type=\"checkbox\" disabled><a href=\"https://x.y/?a=1&amp;b=&quot;2&quot;\">l</a></p>\n"
        );
    }

    #[test]
    fn test_math_wrappers_record_spans() {
        let inline = MathPlaceholder {
            source: "a<b && c_1".to_string(),
            display: false,
        };
        let display = MathPlaceholder {
            source: "\\frac{1}{2}".to_string(),
            display: true,
        };
        let dom = root(vec![
            DomNode::new("p")
                .with_children(vec![text("x "), DomChild::Math(inline)])
                .into(),
            DomChild::Math(display),
        ]);
        let generated = generate_html(&dom).expect("generation should succeed");
        assert_eq!(
            generated.html,
            "<p>x <span class=\"math math-inline\">a&lt;b &amp;&amp; c_1</span></p>\n\
             <div class=\"math math-display\">\\frac{1}{2}</div>\n"
        );
        assert_eq!(generated.placeholders.len(), 2);
        let first = &generated.placeholders[0];
        assert_eq!(first.source, "a<b && c_1");
        assert!(generated.html[first.range.clone()].starts_with("<span"));
        let second = &generated.placeholders[1];
        assert!(second.display);
        assert!(generated.html[second.range.clone()].ends_with("</div>"));
    }

    #[test]
    fn test_display_math_inside_paragraph_uses_span() {
        let dom = root(vec![DomNode::new("p")
            .with_children(vec![DomChild::Math(MathPlaceholder {
                source: "x".to_string(),
                display: true,
            })])
            .into()]);
        let generated = generate_html(&dom).expect("generation should succeed");
        assert_eq!(generated.html, "<p><span class=\"math math-display\">x</span></p>\n");
    }

    #[test]
    fn test_rejects_invalid_names() {
        let dom = root(vec![DomNode::new("bad tag").into()]);
        assert!(generate_html(&dom).is_err());

        let dom = root(vec![DomNode::new("p").with_attribute("x\"y", "1").into()]);
        let error = generate_html(&dom).expect_err("attribute name is invalid");
        assert_eq!(error.stage(), "generate");
    }
}
