//! Decoding of formatter output.
//!
//! Which decoder runs is decided by the [`OutputProtocol`] the command was
//! built for, never by sniffing the bytes.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::command::OutputProtocol;
use crate::error::ParseError;

/// An edit: remove `length` bytes at `offset` (original coordinates), insert `value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub offset: usize,
    pub length: usize,
    pub value: String,
}

impl Replacement {
    pub fn new(offset: usize, length: usize, value: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            value: value.into(),
        }
    }

    /// Byte length change this replacement introduces, `None` if it does not fit an `isize`
    pub fn drift(&self) -> Option<isize> {
        let inserted = isize::try_from(self.value.len()).ok()?;
        let removed = isize::try_from(self.length).ok()?;
        inserted.checked_sub(removed)
    }

    /// Exclusive end in original coordinates, `None` on overflow
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }
}

/// Normalised formatter output
///
/// `cursor` is always in post-format coordinates as reported by the formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatResult {
    /// Ordered, non-overlapping edits against the submitted text
    ReplacementSet {
        cursor: usize,
        replacements: Vec<Replacement>,
    },
    /// The complete reformatted file
    FullText { cursor: usize, text: String },
}

impl FormatResult {
    pub fn cursor(&self) -> usize {
        match self {
            FormatResult::ReplacementSet { cursor, .. } | FormatResult::FullText { cursor, .. } => {
                *cursor
            }
        }
    }

    /// True for an empty replacement list (the formatter had nothing to change)
    pub fn is_noop(&self) -> bool {
        matches!(self, FormatResult::ReplacementSet { replacements, .. } if replacements.is_empty())
    }
}

/// Decode `output` according to the protocol the formatter was asked for
pub fn parse(protocol: OutputProtocol, output: &[u8]) -> Result<FormatResult, ParseError> {
    let text = std::str::from_utf8(output)?;
    match protocol {
        OutputProtocol::ReplacementsXml => parse_replacements_xml(text),
        OutputProtocol::CursorHeaderText => parse_full_text(text),
    }
}

fn root_regex() -> &'static Regex {
    static ROOT_REGEX: OnceLock<Regex> = OnceLock::new();
    ROOT_REGEX.get_or_init(|| {
        Regex::new(
            r"(?s)\A\s*(?:<\?xml[^>]*\?>\s*)?<replacements\b([^>]*?)(?:/>|>(.*)</replacements>)\s*\z",
        )
        .expect("Invalid root regex")
    })
}

fn element_regex() -> &'static Regex {
    static ELEMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    ELEMENT_REGEX.get_or_init(|| {
        Regex::new(r"<cursor>([^<]*)</cursor>|<replacement\b([^>]*?)(?:/>|>([^<]*)</replacement>)")
            .expect("Invalid element regex")
    })
}

fn attribute_regex() -> &'static Regex {
    static ATTRIBUTE_REGEX: OnceLock<Regex> = OnceLock::new();
    ATTRIBUTE_REGEX.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w:.-]*)\s*=\s*(?:'([^']*)'|"([^"]*)")"#)
            .expect("Invalid attribute regex")
    })
}

/// Parse the `<replacements>` document emitted by `-output-replacements-xml`
///
/// ```text
/// <?xml version='1.0'?>
/// <replacements xml:space='preserve' incomplete_format='false'>
/// <cursor>3</cursor>
/// <replacement offset='3' length='2'> </replacement>
/// </replacements>
/// ```
///
/// Anything between elements other than whitespace is rejected, so a
/// truncated or garbled document never yields a partial replacement list.
pub fn parse_replacements_xml(xml: &str) -> Result<FormatResult, ParseError> {
    let root = root_regex()
        .captures(xml)
        .ok_or_else(|| ParseError::Malformed("expected a <replacements> document".to_string()))?;

    let root_attributes = parse_attributes(root.get(1).map_or("", |m| m.as_str()))?;
    if root_attributes
        .iter()
        .any(|(name, value)| name == "incomplete_format" && value == "true")
    {
        log::warn!("formatter reported an incomplete format");
    }

    let body = root.get(2).map_or("", |m| m.as_str());
    let mut cursor = None;
    let mut replacements = Vec::new();
    let mut last_end = 0;

    for element in element_regex().captures_iter(body) {
        let Some(whole) = element.get(0) else {
            continue;
        };
        expect_whitespace(&body[last_end..whole.start()])?;
        last_end = whole.end();

        if let Some(value) = element.get(1) {
            if cursor.is_some() {
                return Err(ParseError::Malformed("duplicate <cursor> element".to_string()));
            }
            cursor = Some(parse_number("cursor", value.as_str())?);
            continue;
        }

        let attributes = parse_attributes(element.get(2).map_or("", |m| m.as_str()))?;
        let offset = required_attribute(&attributes, "offset")?;
        let length = required_attribute(&attributes, "length")?;
        let value = element
            .get(3)
            .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned())
            .unwrap_or_default();

        replacements.push(Replacement {
            offset,
            length,
            value,
        });
    }
    expect_whitespace(&body[last_end..])?;

    let cursor = cursor.ok_or(ParseError::MissingCursor)?;
    Ok(FormatResult::ReplacementSet {
        cursor,
        replacements,
    })
}

#[derive(Debug, Deserialize)]
struct CursorHeader {
    #[serde(rename = "Cursor")]
    cursor: usize,
    #[serde(rename = "IncompleteFormat", default)]
    incomplete_format: bool,
}

/// Parse `-cursor` text output: a one-line JSON header, then the whole file
///
/// Only the first line break splits the stream; everything after it is the
/// reformatted file verbatim.
pub fn parse_full_text(output: &str) -> Result<FormatResult, ParseError> {
    let (header, text) = output.split_once('\n').unwrap_or((output, ""));
    let header: CursorHeader = serde_json::from_str(header.trim_end_matches('\r'))?;

    if header.incomplete_format {
        log::warn!("formatter reported an incomplete format");
    }

    Ok(FormatResult::FullText {
        cursor: header.cursor,
        text: text.to_string(),
    })
}

fn parse_attributes(raw: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut attributes = Vec::new();
    let mut last_end = 0;

    for attribute in attribute_regex().captures_iter(raw) {
        let Some(whole) = attribute.get(0) else {
            continue;
        };
        expect_whitespace(&raw[last_end..whole.start()])?;
        last_end = whole.end();

        let name = attribute[1].to_string();
        let value = attribute
            .get(2)
            .or_else(|| attribute.get(3))
            .map_or("", |m| m.as_str());
        attributes.push((name, html_escape::decode_html_entities(value).into_owned()));
    }
    expect_whitespace(&raw[last_end..])?;

    Ok(attributes)
}

fn required_attribute(attributes: &[(String, String)], name: &'static str) -> Result<usize, ParseError> {
    let (_, value) = attributes
        .iter()
        .find(|(n, _)| n == name)
        .ok_or_else(|| ParseError::Malformed(format!("<replacement> without {name} attribute")))?;
    parse_number(name, value)
}

fn parse_number(field: &'static str, value: &str) -> Result<usize, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn expect_whitespace(between: &str) -> Result<(), ParseError> {
    if between.trim().is_empty() {
        Ok(())
    } else {
        Err(ParseError::Malformed(format!(
            "unexpected content {:?}",
            between.trim()
        )))
    }
}
