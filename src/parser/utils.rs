use crate::lexer::{Position, TAB_WIDTH};

/// Paragraph lines collected until a blank line or another block closes them.
#[derive(Debug, Default)]
pub(crate) struct ParagraphBuffer<'s> {
    lines: Vec<(&'s str, Position)>,
}

impl<'s> ParagraphBuffer<'s> {
    pub(crate) fn push(&mut self, line: &'s str, position: Position) {
        self.lines.push((line, position));
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.lines.is_empty()
    }

    pub(crate) fn last_line(&self) -> Option<&'s str> {
        self.lines.last().map(|(line, _)| *line)
    }

    /// Removes the last line, e.g. when it turns out to be a table header.
    pub(crate) fn pop_last(&mut self) -> Option<(&'s str, Position)> {
        self.lines.pop()
    }

    /// Joined paragraph text and the position of its first line. Trailing whitespace is
    /// dropped so a final hard-break marker does not survive.
    pub(crate) fn take_text(&mut self) -> Option<(String, Position)> {
        let position = self.lines.first().map(|(_, position)| *position)?;
        let text = self
            .lines
            .drain(..)
            .map(|(line, _)| line)
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim_end().to_string();
        Some((text, position))
    }
}

/// Removes up to `width` columns of leading whitespace. A tab that straddles the
/// boundary leaves its remaining columns as spaces.
pub(crate) fn strip_columns(line: &str, width: usize) -> String {
    let mut column = 0;
    for (idx, ch) in line.char_indices() {
        if column >= width {
            return line[idx..].to_string();
        }
        match ch {
            ' ' => column += 1,
            '\t' => {
                column += TAB_WIDTH - column % TAB_WIDTH;
                if column > width {
                    return format!("{}{}", " ".repeat(column - width), &line[idx + 1..]);
                }
            }
            _ => return line[idx..].to_string(),
        }
    }
    String::new()
}

/// First word of a fence info string.
pub(crate) fn language_of(info: &str) -> Option<String> {
    info.split_whitespace().next().map(str::to_string)
}
