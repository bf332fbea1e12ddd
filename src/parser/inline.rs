use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;

use crate::ast::Inline;
use crate::lexer::html_inline_len;
use crate::parser::ParserConfig;

/// Inline parser over the joined text of one paragraph, heading or table cell.
///
/// Works on a `(byte offset, char)` index of the text; every construct that fails to
/// close is pushed back as literal text.
pub(crate) struct InlineParser<'c> {
    config: &'c ParserConfig,
    depth: usize,
}

impl<'c> InlineParser<'c> {
    pub(crate) fn new(config: &'c ParserConfig) -> Self {
        Self { config, depth: 0 }
    }

    /// Parser for the content of an emphasis or link, `None` once the nesting limit is hit.
    fn nested(&self) -> Option<InlineParser<'c>> {
        (self.depth < self.config.max_nesting_depth).then(|| InlineParser {
            config: self.config,
            depth: self.depth + 1,
        })
    }

    pub(crate) fn parse(&self, text: &str) -> Vec<Inline> {
        let mut output = Vec::new();
        self.parse_into(text, &mut output);
        output
    }

    fn parse_into(&self, text: &str, output: &mut Vec<Inline>) {
        if text.is_empty() {
            return;
        }

        let scan = Scan::new(text, self.config.math);
        let chars = &scan.chars;
        let mut buffer = String::new();
        let mut idx = 0usize;

        while idx < chars.len() {
            let (_, ch) = chars[idx];

            if ch == '\\' {
                match scan.char_at(idx + 1) {
                    Some('\n') => {
                        buffer.truncate(buffer.trim_end_matches(' ').len());
                        flush_text(&mut buffer, output);
                        output.push(Inline::HardBreak);
                        idx += 2;
                        continue;
                    }
                    Some(open @ ('(' | '[')) if self.config.math => {
                        if let Some((next, inline)) = scan.bracket_math(idx, open) {
                            flush_text(&mut buffer, output);
                            output.push(inline);
                            idx = next;
                            continue;
                        }
                        buffer.push(open);
                        idx += 2;
                        continue;
                    }
                    Some(next) if next.is_ascii_punctuation() => {
                        buffer.push(next);
                        idx += 2;
                        continue;
                    }
                    _ => {}
                }
            }

            if ch == '\n' {
                let hard = buffer.ends_with("  ");
                buffer.truncate(buffer.trim_end_matches(' ').len());
                flush_text(&mut buffer, output);
                output.push(if hard {
                    Inline::HardBreak
                } else {
                    Inline::SoftBreak
                });
                idx += 1;
                continue;
            }

            let span = match ch {
                '`' => scan.code_span(idx),
                '$' if self.config.math => scan.dollar_math(idx),
                '*' | '_' => self.emphasis(&scan, idx, ch),
                '~' if self.config.gfm => self.strikethrough(&scan, idx),
                '!' => scan.image(idx),
                '[' => self.link(&scan, idx),
                '<' => scan.angle_bracket(idx),
                'h' | 'w' if self.config.gfm => scan.literal_autolink(idx),
                _ => None,
            };

            match span {
                Some((next, inline)) => {
                    flush_text(&mut buffer, output);
                    output.push(inline);
                    idx = next;
                }
                None if matches!(ch, '`' | '$' | '*' | '_' | '~') => {
                    // An unmatched delimiter run stays literal as a whole.
                    let run = scan.run_length(idx, ch);
                    buffer.extend(std::iter::repeat_n(ch, run));
                    idx += run;
                }
                None => {
                    buffer.push(ch);
                    idx += 1;
                }
            }
        }

        flush_text(&mut buffer, output);
    }

    fn emphasis(&self, scan: &Scan<'_>, start: usize, marker: char) -> Option<(usize, Inline)> {
        let run = scan.run_length(start, marker);
        if run > 3 {
            return None;
        }
        let following = scan.char_at(start + run)?;
        if following.is_whitespace() {
            return None;
        }
        if marker == '_' && start > 0 && scan.chars[start - 1].1.is_alphanumeric() {
            return None;
        }

        let close = scan.find_matching_emphasis(start, marker, run)?;
        let inner = &scan.text[scan.chars[start + run].0..scan.chars[close].0];
        let content = self.nested()?.parse(inner);
        let inline = match run {
            1 => Inline::Emphasis(content),
            2 => Inline::Strong(content),
            _ => Inline::Strong(vec![Inline::Emphasis(content)]),
        };
        Some((close + run, inline))
    }

    fn strikethrough(&self, scan: &Scan<'_>, start: usize) -> Option<(usize, Inline)> {
        if scan.run_length(start, '~') != 2 {
            return None;
        }
        let close = scan.find_matching_emphasis(start, '~', 2)?;
        let inner = &scan.text[scan.chars[start + 2].0..scan.chars[close].0];
        let content = self.nested()?.parse(inner);
        Some((close + 2, Inline::Strikethrough(content)))
    }

    fn link(&self, scan: &Scan<'_>, start: usize) -> Option<(usize, Inline)> {
        let close = scan.find_closing_bracket(start)?;
        let (end, url, title) = parse_inline_link(scan.text, &scan.chars, close)?;
        let label = &scan.text[scan.chars[start].0 + 1..scan.chars[close].0];
        let content = self.nested()?.parse(label);
        Some((
            end,
            Inline::Link {
                content,
                url,
                title,
            },
        ))
    }
}

/// Closing delimiters searched for by openers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Delimiter {
    /// Backtick run of the given length.
    Code(usize),
    /// Emphasis or strikethrough run of the given marker and length.
    Emphasis(char, usize),
    Dollar,
    DoubleDollar,
    /// `\)` or `\]`, keyed by the opening char.
    BracketMath(char),
    Comment,
}

/// Indexed view of one inline text.
///
/// A search for a closing delimiter that runs off the end of the text is recorded, so
/// later openers of the same kind fail without rescanning. Link brackets are paired
/// in a single pass on first use.
struct Scan<'t> {
    text: &'t str,
    chars: Vec<(usize, char)>,
    math: bool,
    /// Earliest opener whose search found no closer, per delimiter.
    exhausted: RefCell<HashMap<Delimiter, usize>>,
    brackets: OnceCell<HashMap<usize, usize>>,
}

impl<'t> Scan<'t> {
    fn new(text: &'t str, math: bool) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            math,
            exhausted: RefCell::default(),
            brackets: OnceCell::new(),
        }
    }

    fn char_at(&self, idx: usize) -> Option<char> {
        self.chars.get(idx).map(|&(_, ch)| ch)
    }

    /// Byte offset of the char at `idx`, or the text length past the end.
    fn byte_at(&self, idx: usize) -> usize {
        byte_at(self.text, &self.chars, idx)
    }

    /// Char index of the first char at or after `byte`.
    fn char_index(&self, byte: usize) -> usize {
        self.chars.partition_point(|&(offset, _)| offset < byte)
    }

    fn run_length(&self, start: usize, marker: char) -> usize {
        self.chars[start..]
            .iter()
            .take_while(|&&(_, ch)| ch == marker)
            .count()
    }

    /// Runs `search` for the closer of `delimiter` opened at `start` unless an earlier
    /// opener of the same kind already found none.
    fn find_closer(
        &self,
        delimiter: Delimiter,
        start: usize,
        search: impl FnOnce() -> Option<usize>,
    ) -> Option<usize> {
        if self
            .exhausted
            .borrow()
            .get(&delimiter)
            .is_some_and(|&from| start >= from)
        {
            return None;
        }
        let found = search();
        if found.is_none() {
            self.exhausted
                .borrow_mut()
                .entry(delimiter)
                .and_modify(|from| *from = (*from).min(start))
                .or_insert(start);
        }
        found
    }

    /// End of the escape, code span, math span, autolink or tag starting at `idx`.
    /// Delimiters inside these never pair with delimiters outside.
    fn atomic_end(&self, idx: usize) -> Option<usize> {
        match self.char_at(idx)? {
            '\\' => match self.char_at(idx + 1)? {
                open @ ('(' | '[') if self.math => Some(
                    self.bracket_math(idx, open)
                        .map_or(idx + 2, |(end, _)| end),
                ),
                _ => Some(idx + 2),
            },
            '`' => self.code_span(idx).map(|(end, _)| end),
            '$' if self.math => self.dollar_math(idx).map(|(end, _)| end),
            '<' => self.angle_bracket(idx).map(|(end, _)| end),
            _ => None,
        }
    }

    /// Index after the atomic span at `idx`, or after the literal char or delimiter run
    /// there when no span starts at `idx`.
    fn skip(&self, idx: usize) -> usize {
        match self.atomic_end(idx) {
            Some(end) => end,
            None => match self.chars[idx].1 {
                ch @ ('`' | '$') => idx + self.run_length(idx, ch),
                _ => idx + 1,
            },
        }
    }

    fn find_matching_emphasis(&self, start: usize, marker: char, run_len: usize) -> Option<usize> {
        self.find_closer(Delimiter::Emphasis(marker, run_len), start, || {
            let mut search = start + run_len;
            while search < self.chars.len() {
                if self.chars[search].1 == marker {
                    let close_len = self.run_length(search, marker);
                    let closes = close_len == run_len
                        && search > start + run_len
                        && !self.chars[search - 1].1.is_whitespace()
                        && (marker != '_'
                            || self
                                .char_at(search + close_len)
                                .is_none_or(|next| !next.is_alphanumeric()));
                    if closes {
                        return Some(search);
                    }
                    search += close_len;
                } else {
                    search = self.skip(search);
                }
            }
            None
        })
    }

    fn find_closing_bracket(&self, open: usize) -> Option<usize> {
        self.closing_brackets().get(&open).copied()
    }

    /// Closing bracket index for every `[` that has one.
    fn closing_brackets(&self) -> &HashMap<usize, usize> {
        self.brackets.get_or_init(|| {
            let mut matched = HashMap::new();
            let mut open = Vec::new();
            let mut idx = 0;
            while idx < self.chars.len() {
                match self.chars[idx].1 {
                    '[' => open.push(idx),
                    ']' => {
                        if let Some(start) = open.pop() {
                            matched.insert(start, idx);
                        }
                    }
                    _ => {
                        idx = self.skip(idx);
                        continue;
                    }
                }
                idx += 1;
            }
            matched
        })
    }

    fn code_span(&self, start: usize) -> Option<(usize, Inline)> {
        let run = self.run_length(start, '`');
        let close = self.find_closer(Delimiter::Code(run), start, || {
            let mut search = start + run;
            while search < self.chars.len() {
                if self.chars[search].1 == '`' {
                    let close = self.run_length(search, '`');
                    if close == run {
                        return Some(search);
                    }
                    search += close;
                } else {
                    search += 1;
                }
            }
            None
        })?;
        let content = &self.text[self.chars[start + run].0..self.chars[close].0];
        Some((close + run, Inline::Code(normalize_code(content))))
    }

    fn dollar_math(&self, start: usize) -> Option<(usize, Inline)> {
        match self.run_length(start, '$') {
            1 => {
                let first = self.char_at(start + 1)?;
                if first.is_whitespace() {
                    return None;
                }
                let close = self.find_closer(Delimiter::Dollar, start, || {
                    let mut search = start + 1;
                    while search < self.chars.len() {
                        match self.chars[search].1 {
                            '\\' => search += 2,
                            '$' => {
                                let run = self.run_length(search, '$');
                                if run == 1
                                    && search > start + 1
                                    && !self.chars[search - 1].1.is_whitespace()
                                {
                                    return Some(search);
                                }
                                search += run;
                            }
                            _ => search += 1,
                        }
                    }
                    None
                })?;
                let source = &self.text[self.chars[start + 1].0..self.chars[close].0];
                Some((
                    close + 1,
                    Inline::MathInline {
                        source: source.to_string(),
                        display: false,
                    },
                ))
            }
            2 => {
                let open = self.chars[start].0 + 2;
                let end = self.find_closer(Delimiter::DoubleDollar, start, || {
                    self.text[open..].find("$$").map(|found| open + found)
                })?;
                let source = self.text[open..end].trim();
                if source.is_empty() {
                    return None;
                }
                Some((
                    self.char_index(end + 2),
                    Inline::MathInline {
                        source: source.to_string(),
                        display: true,
                    },
                ))
            }
            _ => None,
        }
    }

    /// `\(…\)` and `\[…\]` spans; `start` points at the backslash.
    fn bracket_math(&self, start: usize, open: char) -> Option<(usize, Inline)> {
        let closing = if open == '(' { "\\)" } else { "\\]" };
        let content_start = self.chars[start].0 + 2;
        let end = self.find_closer(Delimiter::BracketMath(open), start, || {
            self.text[content_start..]
                .find(closing)
                .map(|found| content_start + found)
        })?;
        let source = self.text[content_start..end].trim();
        if source.is_empty() {
            return None;
        }
        Some((
            self.char_index(end + closing.len()),
            Inline::MathInline {
                source: source.to_string(),
                display: open == '[',
            },
        ))
    }

    fn image(&self, start: usize) -> Option<(usize, Inline)> {
        if self.char_at(start + 1)? != '[' {
            return None;
        }
        let close = self.find_closing_bracket(start + 1)?;
        let (end, url, title) = parse_inline_link(self.text, &self.chars, close)?;
        let alt = self.text[self.chars[start + 1].0 + 1..self.chars[close].0].to_string();
        Some((end, Inline::Image { alt, url, title }))
    }

    /// Index of the `>` ending an autolink opened at `start`; autolinks hold no
    /// whitespace and no `<`.
    fn autolink_end(&self, start: usize) -> Option<usize> {
        self.chars
            .iter()
            .enumerate()
            .skip(start + 1)
            .find(|&(_, &(_, ch))| ch == '>' || ch == '<' || ch.is_whitespace())
            .and_then(|(idx, &(_, ch))| (ch == '>').then_some(idx))
    }

    fn angle_bracket(&self, start: usize) -> Option<(usize, Inline)> {
        let open = self.chars[start].0;
        if let Some(close) = self.autolink_end(start) {
            let candidate = &self.text[open + 1..self.chars[close].0];
            if is_autolink(candidate) {
                let url = if candidate.contains(':') {
                    candidate.to_string()
                } else {
                    format!("mailto:{candidate}")
                };
                return Some((
                    close + 1,
                    Inline::Link {
                        content: vec![Inline::Text(candidate.to_string())],
                        url,
                        title: None,
                    },
                ));
            }
        }

        let rest = &self.text[open..];
        let len = if rest.starts_with("<!--") {
            self.find_closer(Delimiter::Comment, start, || html_inline_len(rest))?
        } else {
            html_inline_len(rest)?
        };
        Some((
            self.char_index(open + len),
            Inline::Raw(rest[..len].to_string()),
        ))
    }

    /// GFM literal autolinks: `https://…`, `http://…` and `www.…` at a word boundary.
    fn literal_autolink(&self, start: usize) -> Option<(usize, Inline)> {
        if start > 0 {
            let (_, previous) = self.chars[start - 1];
            if !(previous.is_whitespace() || matches!(previous, '(' | '*' | '_' | '~')) {
                return None;
            }
        }

        let rest = &self.text[self.chars[start].0..];
        let prefix = ["https://", "http://", "www."]
            .into_iter()
            .find(|prefix| rest.starts_with(prefix))?;
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '<')
            .unwrap_or(rest.len());
        let candidate = trim_autolink_tail(&rest[..end]);
        if candidate.len() <= prefix.len() {
            return None;
        }

        let url = if prefix == "www." {
            format!("http://{candidate}")
        } else {
            candidate.to_string()
        };
        Some((
            self.char_index(self.byte_at(start) + candidate.len()),
            Inline::Link {
                content: vec![Inline::Text(candidate.to_string())],
                url,
                title: None,
            },
        ))
    }
}

fn flush_text(buffer: &mut String, output: &mut Vec<Inline>) {
    if buffer.is_empty() {
        return;
    }
    output.push(Inline::Text(std::mem::take(buffer)));
}

fn byte_at(text: &str, chars: &[(usize, char)], idx: usize) -> usize {
    chars.get(idx).map_or(text.len(), |&(offset, _)| offset)
}

fn find_char(chars: &[(usize, char)], start: usize, target: char) -> Option<usize> {
    chars
        .iter()
        .skip(start)
        .position(|&(_, ch)| ch == target)
        .map(|found| start + found)
}

fn skip_spaces(chars: &[(usize, char)], mut idx: usize) -> usize {
    while chars
        .get(idx)
        .is_some_and(|&(_, ch)| matches!(ch, ' ' | '\t' | '\n'))
    {
        idx += 1;
    }
    idx
}

fn normalize_code(content: &str) -> String {
    let content = content.replace('\n', " ");
    let stripped = content
        .strip_prefix(' ')
        .and_then(|inner| inner.strip_suffix(' '));
    match stripped {
        Some(inner) if !content.trim().is_empty() => inner.to_string(),
        _ => content,
    }
}

fn is_autolink(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return false;
    }
    candidate.starts_with("http://")
        || candidate.starts_with("https://")
        || candidate.starts_with("mailto:")
        || (candidate.contains('@') && !candidate.contains(['<', '>', '"', '\'']))
}

fn trim_autolink_tail(mut candidate: &str) -> &str {
    loop {
        if let Some(stripped) = candidate.strip_suffix(['?', '!', '.', ',', ':', '*', '_', '~', '\'', '"', ';']) {
            candidate = stripped;
        } else if candidate.ends_with(')')
            && candidate.matches(')').count() > candidate.matches('(').count()
        {
            candidate = &candidate[..candidate.len() - 1];
        } else {
            return candidate;
        }
    }
}

fn parse_link_destination(
    text: &str,
    chars: &[(usize, char)],
    start: usize,
) -> Option<(usize, String)> {
    let &(byte_idx, ch) = chars.get(start)?;

    // Handle <...> destination
    if ch == '<' {
        let close_idx = find_char(chars, start + 1, '>')?;
        let dest = text[byte_idx + 1..chars[close_idx].0].to_string();
        return Some((close_idx + 1, dest));
    }

    let mut end = start;
    let mut paren_depth = 0;
    while end < chars.len() {
        let (_, ch) = chars[end];
        match ch {
            '(' => paren_depth += 1,
            ')' if paren_depth > 0 => paren_depth -= 1,
            ')' => break,
            ' ' | '\t' | '\n' | '\r' => break,
            _ if ch.is_control() => break,
            _ => {}
        }
        end += 1;
    }

    (end > start).then(|| (end, text[byte_idx..byte_at(text, chars, end)].to_string()))
}

fn parse_link_title(text: &str, chars: &[(usize, char)], start: usize) -> Option<(usize, String)> {
    let &(byte_idx, open) = chars.get(start)?;
    let close = match open {
        '"' => '"',
        '\'' => '\'',
        '(' => ')',
        _ => return None,
    };

    let mut escaped = false;
    for (idx, &(offset, ch)) in chars.iter().enumerate().skip(start + 1) {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            _ if ch == close => return Some((idx + 1, text[byte_idx + 1..offset].to_string())),
            '(' if open == '(' => return None,
            _ => {}
        }
    }
    None
}

/// Parses `(destination "title")` after the closing bracket at `close`; returns the char
/// index after the closing parenthesis.
fn parse_inline_link(
    text: &str,
    chars: &[(usize, char)],
    close: usize,
) -> Option<(usize, String, Option<String>)> {
    if chars.get(close + 1)?.1 != '(' {
        return None;
    }
    let mut idx = skip_spaces(chars, close + 2);

    let destination = if chars.get(idx)?.1 == ')' {
        String::new()
    } else {
        let (end, destination) = parse_link_destination(text, chars, idx)?;
        idx = end;
        destination
    };

    idx = skip_spaces(chars, idx);
    let title = match parse_link_title(text, chars, idx) {
        Some((end, title)) => {
            idx = skip_spaces(chars, end);
            Some(title)
        }
        None => None,
    };

    (chars.get(idx)?.1 == ')').then(|| (idx + 1, destination, title))
}
