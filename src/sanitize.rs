//! Default-deny sanitization of the display tree.
//!
//! Elements whose tag is in the schema keep only the attributes the schema lists for
//! them, in schema order. Unknown elements are unwrapped: the wrapper goes, the content
//! stays. Elements in [`DENY_SUBTREE`] are removed together with their content. Math
//! placeholders and text pass through untouched.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::dom::{DomChild, DomNode};
use crate::lexer::scan_raw_tags;

/// Elements removed together with their content. No schema extension can allow them.
pub const DENY_SUBTREE: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "frame",
    "frameset", "applet", "textarea", "title",
];

const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "cite",
    "action",
    "formaction",
    "poster",
    "background",
];

const DENIED_SCHEMES: &[&str] = &["javascript", "vbscript", "data"];

/// The minimal allowlist: document structure, emphasis, lists, tables, code, links and
/// images.
const DEFAULT_ALLOWLIST: &[(&str, &[&str])] = &[
    ("a", &["href", "title"]),
    ("blockquote", &[]),
    ("br", &[]),
    ("code", &["class"]),
    ("del", &[]),
    ("em", &[]),
    ("h1", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("hr", &[]),
    ("img", &["src", "alt", "title"]),
    ("input", &["type", "checked", "disabled"]),
    ("li", &[]),
    ("ol", &["start"]),
    ("p", &[]),
    ("pre", &[]),
    ("strong", &[]),
    ("table", &[]),
    ("tbody", &[]),
    ("td", &["align"]),
    ("th", &["align"]),
    ("thead", &[]),
    ("tr", &[]),
    ("ul", &[]),
];

pub fn is_deny_subtree(tag: &str) -> bool {
    DENY_SUBTREE
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(tag))
}

/// `on*` event handler attributes.
pub fn is_event_handler(attribute: &str) -> bool {
    attribute
        .get(..2)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("on"))
}

/// Whether `value` is acceptable for the URL attribute `attribute`. Relative URLs are
/// always allowed; absolute ones need a scheme permitted for that attribute.
pub fn is_allowed_url(attribute: &str, value: &str) -> bool {
    let Some(scheme) = url_scheme(value) else {
        return true;
    };
    let permitted: &[&str] = match attribute.to_ascii_lowercase().as_str() {
        "href" | "cite" => &["http", "https", "mailto"],
        _ => &["http", "https"],
    };
    permitted.contains(&scheme.as_str())
}

/// Lowercased scheme of `value`, ignoring ASCII whitespace and control characters the
/// way browsers do. `None` for relative URLs.
fn url_scheme(value: &str) -> Option<String> {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let end = normalized.find([':', '/', '?', '#'])?;
    normalized[end..]
        .starts_with(':')
        .then(|| normalized[..end].to_string())
}

fn has_denied_scheme(value: &str) -> bool {
    url_scheme(value).is_some_and(|scheme| DENIED_SCHEMES.contains(&scheme.as_str()))
}

/// What the transformer does with a literal markup fragment from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawVerdict {
    /// Harmless: shown as escaped text.
    Escape,
    /// Carries a handler, a denied URL or a closed deny-subtree element: removed.
    Drop,
    /// Opens a deny-subtree element without closing it: removed together with the
    /// following siblings up to the matching closing tag.
    DropUntilClose(String),
}

/// Applies the deny policy to a literal markup fragment.
pub fn judge_raw(fragment: &str) -> RawVerdict {
    let tags = scan_raw_tags(fragment);
    let mut verdict = RawVerdict::Escape;

    for (idx, (_, tag)) in tags.iter().enumerate() {
        let dangerous_attribute = tag.attributes.iter().any(|(name, value)| {
            is_event_handler(name) || value.is_some_and(has_denied_scheme)
        });
        if dangerous_attribute {
            return RawVerdict::Drop;
        }

        if is_deny_subtree(tag.name) && !tag.closing && !tag.self_closing {
            let closed = tags[idx + 1..]
                .iter()
                .any(|(_, later)| later.closing && later.is_named(tag.name));
            verdict = if closed {
                RawVerdict::Drop
            } else {
                RawVerdict::DropUntilClose(tag.name.to_ascii_lowercase())
            };
        } else if is_deny_subtree(tag.name) && verdict == RawVerdict::Escape {
            verdict = RawVerdict::Drop;
        }
    }
    verdict
}

/// Whether `fragment` is the closing tag of `name`.
pub fn closes(fragment: &str, name: &str) -> bool {
    scan_raw_tags(fragment)
        .iter()
        .any(|(_, tag)| tag.closing && tag.is_named(name))
}

/// Tag name to permitted attribute names, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeSchema {
    tags: BTreeMap<String, Vec<String>>,
}

impl Default for SanitizeSchema {
    fn default() -> Self {
        let mut schema = Self::empty();
        for &(tag, attributes) in DEFAULT_ALLOWLIST {
            schema.extend(tag, attributes);
        }
        schema
    }
}

impl SanitizeSchema {
    /// A schema that allows nothing; every element is unwrapped.
    pub fn empty() -> Self {
        Self {
            tags: BTreeMap::new(),
        }
    }

    /// Default schema plus configured extensions.
    pub fn with_extensions(extensions: &BTreeMap<String, Vec<String>>) -> Self {
        let mut schema = Self::default();
        for (tag, attributes) in extensions {
            schema.extend(tag, attributes.as_slice());
        }
        schema
    }

    /// Allows `tag` with `attributes`. New attribute names are appended after the ones
    /// already declared. Deny-subtree tags and event handlers are ignored; returns
    /// whether the tag is allowed afterwards.
    pub fn extend<S: AsRef<str>>(&mut self, tag: &str, attributes: &[S]) -> bool {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.is_empty() || is_deny_subtree(&tag) {
            debug!(tag = %tag, "refused schema extension for denied element");
            return false;
        }

        let allowed = self.tags.entry(tag).or_default();
        for attribute in attributes {
            let attribute = attribute.as_ref().trim().to_ascii_lowercase();
            if attribute.is_empty() || is_event_handler(&attribute) {
                debug!(attribute = %attribute, "refused schema extension for attribute");
                continue;
            }
            if !allowed.contains(&attribute) {
                allowed.push(attribute);
            }
        }
        true
    }

    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(&tag.to_ascii_lowercase())
    }

    pub fn allowed_attributes(&self, tag: &str) -> Option<&[String]> {
        self.tags
            .get(&tag.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Sanitizes the children of `root`; the root itself is kept as the container.
    pub fn sanitize(&self, root: DomNode) -> DomNode {
        DomNode {
            tag: root.tag,
            attributes: Vec::new(),
            children: self.sanitize_children(root.children),
        }
    }

    fn sanitize_children(&self, children: Vec<DomChild>) -> Vec<DomChild> {
        let mut output = Vec::with_capacity(children.len());
        for child in children {
            match child {
                DomChild::Element(node) => self.sanitize_element(node, &mut output),
                DomChild::Text(_) | DomChild::Math(_) => output.push(child),
            }
        }
        output
    }

    fn sanitize_element(&self, node: DomNode, output: &mut Vec<DomChild>) {
        let tag = node.tag.to_ascii_lowercase();
        if is_deny_subtree(&tag) {
            debug!(tag = %tag, "dropped element subtree");
            return;
        }

        let Some(allowed) = self.tags.get(&tag) else {
            trace!(tag = %tag, "unwrapped element");
            output.extend(self.sanitize_children(node.children));
            return;
        };

        let attributes = allowed
            .iter()
            .filter_map(|name| {
                let value = node.attribute(name)?;
                if is_event_handler(name)
                    || (URL_ATTRIBUTES.contains(&name.as_str()) && !is_allowed_url(name, value))
                {
                    debug!(tag = %tag, attribute = %name, "dropped attribute");
                    return None;
                }
                Some((name.clone(), value.to_string()))
            })
            .collect();

        output.push(DomChild::Element(DomNode {
            tag,
            attributes,
            children: self.sanitize_children(node.children),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MathPlaceholder;

    fn element(tag: &str, attributes: &[(&str, &str)], children: Vec<DomChild>) -> DomChild {
        let mut node = DomNode::new(tag);
        for (name, value) in attributes {
            node = node.with_attribute(name, value);
        }
        node.children = children;
        DomChild::Element(node)
    }

    fn text(value: &str) -> DomChild {
        DomChild::Text(value.to_string())
    }

    fn document(children: Vec<DomChild>) -> DomNode {
        let mut root = DomNode::document();
        root.children = children;
        root
    }

    #[test]
    fn keeps_allowed_tags_and_orders_attributes() {
        let schema = SanitizeSchema::default();
        let input = document(vec![element(
            "a",
            &[("title", "t"), ("onclick", "x()"), ("href", "https://x.y")],
            vec![text("link")],
        )]);
        let output = schema.sanitize(input);
        assert_eq!(
            output.children,
            vec![element(
                "a",
                &[("href", "https://x.y"), ("title", "t")],
                vec![text("link")]
            )]
        );
    }

    #[test]
    fn unwraps_unknown_tags() {
        let schema = SanitizeSchema::default();
        let input = document(vec![element(
            "p",
            &[],
            vec![element("span", &[("class", "x")], vec![text("kept")])],
        )]);
        let output = schema.sanitize(input);
        assert_eq!(output.children, vec![element("p", &[], vec![text("kept")])]);
    }

    #[test]
    fn drops_deny_subtree_with_content() {
        let schema = SanitizeSchema::default();
        let input = document(vec![
            element("script", &[], vec![text("alert(1)")]),
            element("div", &[], vec![element("style", &[], vec![text("*{}")]), text("ok")]),
        ]);
        let output = schema.sanitize(input);
        assert_eq!(output.children, vec![text("ok")]);
    }

    #[test]
    fn math_passes_through() {
        let schema = SanitizeSchema::empty();
        let math = DomChild::Math(MathPlaceholder {
            source: "<script>".to_string(),
            display: false,
        });
        let output = schema.sanitize(document(vec![math.clone()]));
        assert_eq!(output.children, vec![math]);
    }

    #[test]
    fn filters_url_schemes() {
        assert!(is_allowed_url("href", "https://example.com"));
        assert!(is_allowed_url("href", "mailto:me@example.com"));
        assert!(is_allowed_url("href", "/relative/path?q=a:b"));
        assert!(is_allowed_url("href", "#anchor"));
        assert!(!is_allowed_url("href", "javascript:alert(1)"));
        assert!(!is_allowed_url("href", " JaVa\tScRiPt:alert(1)"));
        assert!(!is_allowed_url("src", "mailto:me@example.com"));
        assert!(!is_allowed_url("src", "data:image/png;base64,xx"));
        assert!(!is_allowed_url("href", "vbscript:msgbox"));
    }

    #[test]
    fn image_sources_are_checked() {
        let schema = SanitizeSchema::default();
        let input = document(vec![element(
            "img",
            &[("src", "javascript:x"), ("alt", "a")],
            vec![],
        )]);
        let output = schema.sanitize(input);
        assert_eq!(output.children, vec![element("img", &[("alt", "a")], vec![])]);
    }

    #[test]
    fn extensions_cannot_allow_scripts_or_handlers() {
        let mut schema = SanitizeSchema::default();
        assert!(!schema.extend("script", &["src"]));
        assert!(schema.extend("span", &["class", "onmouseover"]));
        assert!(schema.extend("a", &["rel", "href"]));
        assert!(!schema.allows_tag("script"));
        assert_eq!(
            schema.allowed_attributes("span"),
            Some(&["class".to_string()][..])
        );
        assert_eq!(
            schema.allowed_attributes("A"),
            Some(&["href".to_string(), "title".to_string(), "rel".to_string()][..])
        );
    }

    #[test]
    fn judges_raw_fragments() {
        assert_eq!(judge_raw("<b>"), RawVerdict::Escape);
        assert_eq!(judge_raw("<!-- note -->"), RawVerdict::Escape);
        assert_eq!(judge_raw("<img src=x onerror=alert(1)>"), RawVerdict::Drop);
        assert_eq!(judge_raw("<a href=\"javascript:alert(1)\">"), RawVerdict::Drop);
        assert_eq!(judge_raw("<script>alert(1)</script>"), RawVerdict::Drop);
        assert_eq!(judge_raw("</script>"), RawVerdict::Drop);
        assert_eq!(
            judge_raw("<SCRIPT type=\"text/javascript\">"),
            RawVerdict::DropUntilClose("script".to_string())
        );
        assert!(closes("</Script>", "script"));
        assert!(!closes("<script>", "script"));
    }
}
