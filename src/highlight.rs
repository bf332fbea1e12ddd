//! Language classes for code blocks.
//!
//! The preview only tags code blocks with a `language-<name>` class; colouring is left
//! to the host stylesheet. In auto mode, blocks without a declared language are
//! identified from their first line with syntect's bundled syntax definitions.

use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use syntect::parsing::SyntaxSet;

use crate::error::PreviewError;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

/// How code blocks get their language class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightMode {
    /// Declared language, falling back to first-line detection.
    #[default]
    Auto,
    /// Declared language only.
    Explicit,
}

impl FromStr for HighlightMode {
    type Err = PreviewError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(HighlightMode::Auto),
            "explicit" => Ok(HighlightMode::Explicit),
            other => Err(PreviewError::config_error(
                "highlight",
                format!("expected `auto` or `explicit`, got `{other}`"),
            )),
        }
    }
}

/// Class attribute value for a code block, if any.
pub fn language_class(declared: Option<&str>, code: &str, mode: HighlightMode) -> Option<String> {
    let language = match (declared.and_then(normalize_language), mode) {
        (Some(language), _) => Some(language),
        (None, HighlightMode::Auto) => detect_language(code),
        (None, HighlightMode::Explicit) => None,
    };
    language.map(|language| format!("language-{language}"))
}

/// Lowercases a declared language and drops characters that cannot appear in a class name.
fn normalize_language(declared: &str) -> Option<String> {
    let language: String = declared
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'))
        .collect::<String>()
        .to_ascii_lowercase();
    (!language.is_empty()).then_some(language)
}

/// Detects a language from the first non-empty line (shebangs, `<?php`, modelines).
pub fn detect_language(code: &str) -> Option<String> {
    let first_line = code.lines().find(|line| !line.trim().is_empty())?;
    let syntax = SYNTAX_SET.find_syntax_by_first_line(first_line)?;
    let extension = syntax.file_extensions.first()?.to_ascii_lowercase();
    Some(
        match extension.as_str() {
            "py" => "python",
            "sh" => "bash",
            "rb" => "ruby",
            "pl" => "perl",
            "js" => "javascript",
            other => other,
        }
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_language_wins() {
        assert_eq!(
            language_class(Some("Rust"), "", HighlightMode::Auto),
            Some("language-rust".to_string())
        );
        assert_eq!(
            language_class(Some("c++"), "", HighlightMode::Explicit),
            Some("language-c++".to_string())
        );
        assert_eq!(
            language_class(Some("\"><x"), "", HighlightMode::Explicit),
            Some("language-x".to_string())
        );
    }

    #[test]
    fn explicit_mode_never_detects() {
        let code = "#!/usr/bin/env python\nprint(1)\n";
        assert_eq!(language_class(None, code, HighlightMode::Explicit), None);
        assert_eq!(
            language_class(None, code, HighlightMode::Auto),
            Some("language-python".to_string())
        );
    }

    #[test]
    fn plain_text_is_not_detected() {
        assert_eq!(detect_language("just some words"), None);
        assert_eq!(detect_language(""), None);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("AUTO".parse::<HighlightMode>().ok(), Some(HighlightMode::Auto));
        assert_eq!(
            "explicit".parse::<HighlightMode>().ok(),
            Some(HighlightMode::Explicit)
        );
        assert!("sometimes".parse::<HighlightMode>().is_err());
    }
}
