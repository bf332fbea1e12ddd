//! Boundary to the external math typesetting engine.
//!
//! The rendering core only emits inert data: markup with math wrapper elements. After
//! the host mounts that markup, a [`TypesetTrigger`] finds the wrappers on the mounted
//! surface and hands them to the engine. A missing engine is a no-op and an engine
//! failure is logged; neither affects later invocations.

use std::future::Future;

use tracing::{debug, trace, warn};

use crate::codegen::Generated;
use crate::error::TypesetError;
use crate::lexer::scan_raw_tags;

/// A math region found on the mounted surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathElement {
    /// Text content of the wrapper; equals the original math source.
    pub source: String,
    pub display: bool,
}

/// The external engine's "typeset these elements" entry point.
pub trait MathEngine {
    fn typeset(&self, elements: &[MathElement]) -> impl Future<Output = Result<(), TypesetError>>;
}

/// A display surface after mount.
pub trait MountedSurface {
    fn math_elements(&self) -> Vec<MathElement>;
}

/// Mounted markup as produced by the serializer.
#[derive(Debug, Clone, Copy)]
pub struct MountedMarkup<'a> {
    html: &'a str,
}

impl<'a> MountedMarkup<'a> {
    pub fn new(html: &'a str) -> Self {
        Self { html }
    }
}

impl MountedSurface for MountedMarkup<'_> {
    fn math_elements(&self) -> Vec<MathElement> {
        let tags = scan_raw_tags(self.html);
        let mut elements = Vec::new();

        for (idx, (range, tag)) in tags.iter().enumerate() {
            if tag.closing {
                continue;
            }
            let Some(display) = tag.attribute("class").and_then(math_class) else {
                continue;
            };
            let close = tags[idx + 1..]
                .iter()
                .find(|(_, later)| later.closing && later.is_named(tag.name));
            let Some((close_range, _)) = close else {
                trace!(tag = %tag.name, "unterminated math wrapper");
                continue;
            };
            elements.push(MathElement {
                source: decode_entities(&self.html[range.end..close_range.start]),
                display,
            });
        }
        elements
    }
}

impl MountedSurface for Generated {
    fn math_elements(&self) -> Vec<MathElement> {
        self.placeholders
            .iter()
            .map(|span| MathElement {
                source: span.source.clone(),
                display: span.display,
            })
            .collect()
    }
}

/// `Some(display)` when `class` marks a math wrapper.
fn math_class(class: &str) -> Option<bool> {
    let classes: Vec<&str> = class.split_ascii_whitespace().collect();
    if !classes.contains(&"math") {
        return None;
    }
    if classes.contains(&"math-display") {
        Some(true)
    } else if classes.contains(&"math-inline") {
        Some(false)
    } else {
        None
    }
}

/// Decodes the character references a serializer may emit in text content.
fn decode_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let entity = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| Some((decode_entity(&rest[1..end])?, end)));
        match entity {
            Some((ch, end)) => {
                decoded.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// What one trigger invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypesetOutcome {
    /// No engine is installed, or it reported itself unavailable.
    NoEngine,
    NothingToTypeset,
    /// The engine typeset this many elements.
    Typeset(usize),
    Failed(TypesetError),
}

/// Invokes the math engine over the math elements of a mounted surface.
#[derive(Debug, Clone)]
pub struct TypesetTrigger<E> {
    engine: Option<E>,
}

impl<E: MathEngine> TypesetTrigger<E> {
    pub fn new(engine: Option<E>) -> Self {
        Self { engine }
    }

    pub fn with_engine(engine: E) -> Self {
        Self::new(Some(engine))
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub async fn trigger<S>(&self, surface: &S) -> TypesetOutcome
    where
        S: MountedSurface + ?Sized,
    {
        let Some(engine) = &self.engine else {
            trace!("no math engine installed, skipping typeset");
            return TypesetOutcome::NoEngine;
        };

        let elements = surface.math_elements();
        if elements.is_empty() {
            return TypesetOutcome::NothingToTypeset;
        }

        match engine.typeset(&elements).await {
            Ok(()) => {
                debug!(count = elements.len(), "typeset math elements");
                TypesetOutcome::Typeset(elements.len())
            }
            Err(TypesetError::Unavailable { reason }) => {
                debug!(reason = %reason, "math engine unavailable, skipping typeset");
                TypesetOutcome::NoEngine
            }
            Err(err) => {
                warn!(count = elements.len(), error = %err, "math typesetting failed");
                TypesetOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Renderer;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingEngine {
        calls: RefCell<Vec<Vec<MathElement>>>,
        fail_on: Option<&'static str>,
    }

    impl MathEngine for RecordingEngine {
        async fn typeset(&self, elements: &[MathElement]) -> Result<(), TypesetError> {
            self.calls.borrow_mut().push(elements.to_vec());
            match self.fail_on {
                Some(bad) if elements.iter().any(|e| e.source == bad) => {
                    Err(TypesetError::failed(format!("cannot typeset {bad}")))
                }
                _ => Ok(()),
            }
        }
    }

    struct OfflineEngine;

    impl MathEngine for OfflineEngine {
        async fn typeset(&self, _elements: &[MathElement]) -> Result<(), TypesetError> {
            Err(TypesetError::Unavailable {
                reason: "script not loaded".to_string(),
            })
        }
    }

    #[test]
    fn finds_wrappers_in_mounted_markup() {
        let html = "<p>a <span class=\"math math-inline\">x_1 &lt; y &amp;&amp; *z*</span></p>\n\
                    <div class=\"math math-display\">\\frac{a}{b}</div>\n\
                    <span class=\"other\">no</span>";
        let elements = MountedMarkup::new(html).math_elements();
        assert_eq!(
            elements,
            vec![
                MathElement {
                    source: "x_1 < y && *z*".to_string(),
                    display: false,
                },
                MathElement {
                    source: "\\frac{a}{b}".to_string(),
                    display: true,
                },
            ]
        );
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(decode_entities("&lt;a&gt; &amp;amp; &#x27;&#39;"), "<a> &amp; ''");
        assert_eq!(decode_entities("a & b &unknown; &"), "a & b &unknown; &");
    }

    #[test]
    fn mounted_text_matches_source() {
        let source = "Inline $a<b \\& c_{1}$ and\n\n$$\n\\sum_{i} x^*_i # \n$$";
        let generated = Renderer::default().render(source).expect("render should succeed");
        let from_markup = MountedMarkup::new(&generated.html).math_elements();
        assert_eq!(from_markup, generated.math_elements());
        assert_eq!(from_markup[0].source, "a<b \\& c_{1}");
        assert_eq!(from_markup[1].source, "\\sum_{i} x^*_i #");
    }

    #[tokio::test]
    async fn missing_engine_is_a_no_op() {
        let trigger: TypesetTrigger<RecordingEngine> = TypesetTrigger::new(None);
        let outcome = trigger.trigger(&MountedMarkup::new("<span class=\"math math-inline\">x</span>")).await;
        assert_eq!(outcome, TypesetOutcome::NoEngine);

        let trigger = TypesetTrigger::with_engine(OfflineEngine);
        let outcome = trigger.trigger(&MountedMarkup::new("<span class=\"math math-inline\">x</span>")).await;
        assert_eq!(outcome, TypesetOutcome::NoEngine);
    }

    #[tokio::test]
    async fn typesets_exactly_the_math_elements() {
        let trigger = TypesetTrigger::with_engine(RecordingEngine::default());
        assert_eq!(
            trigger.trigger(&MountedMarkup::new("<p>plain</p>")).await,
            TypesetOutcome::NothingToTypeset
        );

        let html = "<p><span class=\"math math-inline\">a</span> and <span class=\"math math-inline\">b</span></p>";
        assert_eq!(trigger.trigger(&MountedMarkup::new(html)).await, TypesetOutcome::Typeset(2));

        let engine = trigger.engine.as_ref().expect("engine installed");
        let calls = engine.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1].source, "b");
    }

    #[tokio::test]
    async fn failures_do_not_block_later_invocations() {
        let trigger = TypesetTrigger::with_engine(RecordingEngine {
            fail_on: Some("bad"),
            ..Default::default()
        });
        let outcome = trigger
            .trigger(&MountedMarkup::new("<span class=\"math math-inline\">bad</span>"))
            .await;
        assert!(matches!(outcome, TypesetOutcome::Failed(TypesetError::Failed { .. })));

        let outcome = trigger
            .trigger(&MountedMarkup::new("<span class=\"math math-inline\">good</span>"))
            .await;
        assert_eq!(outcome, TypesetOutcome::Typeset(1));
    }
}
