use serde::{Deserialize, Serialize};

/// Configuration for the parser behavior and options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Whether to enable GitHub Flavored Markdown extensions (tables, task items,
    /// strikethrough, literal autolinks)
    pub gfm: bool,
    /// Whether `$…$`, `$$…$$`, `\(…\)` and `\[…\]` are math
    pub math: bool,
    /// Maximum nesting depth of block containers and inline spans; deeper content
    /// stays literal text
    pub max_nesting_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            gfm: true,
            math: true,
            max_nesting_depth: 64,
        }
    }
}
