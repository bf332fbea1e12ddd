use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{is_a, tag, take_until, take_while, take_while1, take_while_m_n};
use nom::character::complete::{char, multispace0, multispace1, one_of, satisfy, space0, space1};
use nom::combinator::{all_consuming, eof, map, opt, peek, recognize, rest, verify};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::{many0, many1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::Err as NomErr;
use std::ops::Range;

use super::token::*;
use crate::ast::{Alignment, ListKind};

/// Classifies a non-blank line with its indentation already removed.
pub(super) fn classify(line: &str) -> Token<'_> {
    alt((
        parse_code_fence,
        parse_math_fence,
        parse_atx_heading,
        parse_setext_underline,
        parse_thematic_break,
        parse_blockquote,
        parse_list_marker,
        parse_table_delimiter,
        parse_html_block,
    ))(line)
    .map(|(_, token)| token)
    .unwrap_or(Token::Text { content: line })
}

fn reject<O>(input: &str, kind: ErrorKind) -> IResult<&str, O> {
    Err(NomErr::Error(NomError::new(input, kind)))
}

pub(super) fn parse_code_fence(input: &str) -> IResult<&str, Token<'_>> {
    let (info, fence) = alt((is_a("`"), is_a("~")))(input)?;
    if fence.len() < 3 || (fence.starts_with('`') && info.contains('`')) {
        return reject(input, ErrorKind::Verify);
    }
    let info = info.trim();
    Ok((
        "",
        Token::CodeFence {
            marker: if fence.starts_with('~') { '~' } else { '`' },
            length: fence.len(),
            info: (!info.is_empty()).then_some(info),
        },
    ))
}

pub(super) fn parse_math_fence(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(preceded(tag("$$"), rest), |after| Token::MathFence {
            delimiter: MathDelimiter::Dollars,
            rest: after,
        }),
        map(preceded(tag("\\["), rest), |after| Token::MathFence {
            delimiter: MathDelimiter::BracketOpen,
            rest: after,
        }),
        map(preceded(tag("\\]"), rest), |after| Token::MathFence {
            delimiter: MathDelimiter::BracketClose,
            rest: after,
        }),
    ))(input)
}

pub(super) fn parse_atx_heading(input: &str) -> IResult<&str, Token<'_>> {
    map(
        tuple((
            take_while_m_n(1, 6, |c: char| c == '#'),
            alt((space1::<&str, NomError<&str>>, eof)),
            rest,
        )),
        |(hashes, _, content): (&str, &str, &str)| Token::AtxHeading {
            level: hashes.len() as u8,
            content: strip_closing_sequence(content),
        },
    )(input)
}

/// Drops an optional closing `#` run, which must be preceded by whitespace.
fn strip_closing_sequence(content: &str) -> &str {
    let trimmed = content.trim();
    let without = trimmed.trim_end_matches('#');
    if without.is_empty() {
        return "";
    }
    if without.len() != trimmed.len() && without.ends_with([' ', '\t']) {
        without.trim_end()
    } else {
        trimmed
    }
}

pub(super) fn parse_setext_underline(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(terminated(is_a("="), pair(space0, eof)), |_| {
            Token::SetextUnderline { level: 1 }
        }),
        map(terminated(is_a("-"), pair(space0, eof)), |_| {
            Token::SetextUnderline { level: 2 }
        }),
    ))(input)
}

fn break_run<'a>(marker: char) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    verify(
        recognize(many1(alt((char(marker), char(' '), char('\t'))))),
        move |run: &str| run.chars().filter(|c| *c == marker).count() >= 3,
    )
}

pub(super) fn parse_thematic_break(input: &str) -> IResult<&str, Token<'_>> {
    map(
        terminated(alt((break_run('-'), break_run('*'), break_run('_'))), eof),
        |_| Token::ThematicBreak,
    )(input)
}

pub(super) fn parse_blockquote(input: &str) -> IResult<&str, Token<'_>> {
    map(preceded(pair(char('>'), opt(char(' '))), rest), |content| {
        Token::BlockQuote { content }
    })(input)
}

fn parse_bullet_marker(input: &str) -> IResult<&str, ListKind> {
    map(one_of("-+*"), |marker| ListKind::Bullet { marker })(input)
}

fn parse_ordered_marker(input: &str) -> IResult<&str, ListKind> {
    map(
        pair(
            take_while_m_n(1, 9, |c: char| c.is_ascii_digit()),
            one_of(".)"),
        ),
        |(digits, delimiter): (&str, char)| ListKind::Ordered {
            start: digits.parse().unwrap_or(1),
            delimiter,
        },
    )(input)
}

fn parse_task_box(input: &str) -> IResult<&str, bool> {
    map(
        terminated(
            delimited(char('['), one_of(" xX"), char(']')),
            alt((space1, eof)),
        ),
        |mark| mark != ' ',
    )(input)
}

pub(super) fn parse_list_marker(input: &str) -> IResult<&str, Token<'_>> {
    let (after_marker, kind) = alt((parse_bullet_marker, parse_ordered_marker))(input)?;
    let (content, spaces) = alt((space1, eof))(after_marker)?;
    let marker_len = input.len() - after_marker.len();

    // Five or more spaces after the marker: the content column sits one space in and
    // the remaining spaces belong to the content.
    let (padding, content) = if spaces.len() >= 5 {
        (1, &after_marker[1..])
    } else {
        (spaces.len().max(1), content)
    };

    let (content, task) = match parse_task_box(content) {
        Ok((rest, checked)) => (rest, Some(checked)),
        Err(_) => (content, None),
    };

    Ok((
        "",
        Token::ListMarker {
            kind,
            marker_width: marker_len + padding,
            content,
            task,
        },
    ))
}

fn parse_alignment(cell: &str) -> IResult<&str, Alignment> {
    map(
        all_consuming(tuple((
            opt(char(':')),
            is_a("-"),
            opt(char(':')),
        ))),
        |(left, _, right)| match (left.is_some(), right.is_some()) {
            (true, true) => Alignment::Center,
            (true, false) => Alignment::Left,
            (false, true) => Alignment::Right,
            (false, false) => Alignment::None,
        },
    )(cell)
}

pub(super) fn parse_table_delimiter(input: &str) -> IResult<&str, Token<'_>> {
    if !input.contains('|') {
        return reject(input, ErrorKind::Char);
    }
    let alignments = split_table_row(input)
        .into_iter()
        .map(|cell| parse_alignment(cell.trim()).map(|(_, alignment)| alignment))
        .collect::<Result<Vec<_>, _>>()?;
    if alignments.is_empty() {
        return reject(input, ErrorKind::Many1);
    }
    Ok(("", Token::TableDelimiter { alignments }))
}

/// Elements whose raw block runs to the closing tag, with the closing tag to look for.
const VERBATIM_TAGS: &[(&str, &str)] = &[
    ("script", "</script>"),
    ("pre", "</pre>"),
    ("style", "</style>"),
    ("textarea", "</textarea>"),
];

/// Block-level elements that open a raw block on their own.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "base", "basefont", "blockquote", "body", "caption",
    "center", "col", "colgroup", "dd", "details", "dialog", "dir", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "frame", "frameset", "h1", "h2",
    "h3", "h4", "h5", "h6", "head", "header", "hr", "html", "iframe", "legend", "li",
    "link", "main", "menu", "menuitem", "nav", "noframes", "ol", "optgroup", "option", "p",
    "param", "search", "section", "summary", "table", "tbody", "td", "tfoot", "th",
    "thead", "title", "tr", "track", "ul",
];

/// `<name` or `</name` followed by whitespace, `>`, `/>` or the end of the line.
fn html_tag_start(input: &str) -> IResult<&str, (bool, &str)> {
    terminated(
        pair(
            map(preceded(char('<'), opt(char('/'))), |slash: Option<char>| slash.is_some()),
            tag_name,
        ),
        peek(alt((
            recognize(satisfy(|c: char| c.is_whitespace() || c == '>')),
            tag("/>"),
            eof,
        ))),
    )(input)
}

fn html_block_kind(input: &str) -> IResult<&str, HtmlBlockKind> {
    if input.starts_with("<!--") {
        return Ok((input, HtmlBlockKind::Verbatim { end: "-->" }));
    }
    if let Ok((_, (closing, name))) = html_tag_start(input) {
        let name = name.to_ascii_lowercase();
        if let Some(&(_, end)) = VERBATIM_TAGS.iter().find(|(tag, _)| *tag == name)
            && !closing
        {
            return Ok((input, HtmlBlockKind::Verbatim { end }));
        }
        if BLOCK_TAGS.contains(&name.as_str()) {
            return Ok((input, HtmlBlockKind::Block));
        }
    }
    map(all_consuming(terminated(parse_raw_tag, multispace0)), |_| {
        HtmlBlockKind::Standalone
    })(input)
}

pub(super) fn parse_html_block(input: &str) -> IResult<&str, Token<'_>> {
    map(html_block_kind, |kind| Token::HtmlBlock { kind })(input)
}

fn html_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("<!--"), take_until("-->"), tag("-->"))))(input)
}

fn quoted_inner(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
    ))(input)
}

fn attribute_value(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace0, char('='), multispace0)),
        alt((
            quoted_inner,
            take_while1(|c: char| {
                !c.is_whitespace() && !matches!(c, '"' | '\'' | '=' | '<' | '>' | '`')
            }),
        )),
    )(input)
}

fn attribute(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    preceded(
        multispace1,
        pair(
            take_while1(|c: char| {
                !c.is_whitespace() && !matches!(c, '/' | '>' | '=' | '"' | '\'' | '<')
            }),
            opt(attribute_value),
        ),
    )(input)
}

fn tag_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '-'),
    ))(input)
}

/// Parses one opening, closing or self-closing tag at the start of `input`.
pub(crate) fn parse_raw_tag(input: &str) -> IResult<&str, RawTag<'_>> {
    map(
        tuple((
            char('<'),
            opt(char('/')),
            tag_name,
            many0(attribute),
            multispace0,
            opt(char('/')),
            char('>'),
        )),
        |(_, closing, name, attributes, _, self_closing, _)| RawTag {
            name,
            closing: closing.is_some(),
            self_closing: self_closing.is_some(),
            attributes,
        },
    )(input)
}

/// Byte length of an inline markup tag or comment at the start of `input`.
pub(crate) fn html_inline_len(input: &str) -> Option<usize> {
    alt((html_comment, recognize(parse_raw_tag)))(input)
        .ok()
        .map(|(rest, _)| input.len() - rest.len())
}

/// Every well-formed tag in `fragment` with its byte range, comment bodies included.
pub(crate) fn scan_raw_tags(fragment: &str) -> Vec<(Range<usize>, RawTag<'_>)> {
    let mut tags = Vec::new();
    let mut cursor = 0;
    while let Some(found) = fragment[cursor..].find('<') {
        let start = cursor + found;
        match parse_raw_tag(&fragment[start..]) {
            Ok((rest, tag)) => {
                let end = fragment.len() - rest.len();
                tags.push((start..end, tag));
                cursor = end;
            }
            Err(_) => cursor = start + 1,
        }
    }
    tags
}

/// Splits a table row into raw cell strings. Outer pipes are optional; `\|` and
/// pipes inside code spans do not split.
pub(crate) fn split_table_row(line: &str) -> Vec<&str> {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = match line.strip_suffix('|') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => line,
    };

    let mut cells = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut in_code = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '`' => in_code = !in_code,
            '|' if !in_code => {
                cells.push(&line[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    cells.push(&line[start..]);
    cells
}
