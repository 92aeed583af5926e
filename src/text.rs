//! JSON token writer and document parser
//!
//! Output goes through a [`serde_json::ser::Formatter`] one token at a
//! time, so the MessagePack side can stream without building a tree.
//! String bodies are escaped byte by byte: bytes that are not valid UTF-8
//! are passed through unchanged rather than replaced.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::ser::{CharEscape, Formatter};
use serde_json::value::RawValue;
use serde_json::{Number, Value as JsonValue};

use crate::error::{Error, Result};
use crate::options::Options;

/// Incremental JSON writer
pub struct TextEmitter<W, F> {
    writer: W,
    formatter: F,
}

impl<W: Write, F: Formatter> TextEmitter<W, F> {
    /// Create an emitter writing through the given formatter
    pub fn new(writer: W, formatter: F) -> Self {
        Self { writer, formatter }
    }

    /// Direct access to the output, for payloads that need no escaping
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Unwrap the output
    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn null(&mut self) -> io::Result<()> {
        self.formatter.write_null(&mut self.writer)
    }

    pub fn bool(&mut self, value: bool) -> io::Result<()> {
        self.formatter.write_bool(&mut self.writer, value)
    }

    pub fn i64(&mut self, value: i64) -> io::Result<()> {
        self.formatter.write_i64(&mut self.writer, value)
    }

    pub fn u64(&mut self, value: u64) -> io::Result<()> {
        self.formatter.write_u64(&mut self.writer, value)
    }

    /// Finite values only
    pub fn f32(&mut self, value: f32) -> io::Result<()> {
        self.formatter.write_f32(&mut self.writer, value)
    }

    /// Finite values only
    pub fn f64(&mut self, value: f64) -> io::Result<()> {
        self.formatter.write_f64(&mut self.writer, value)
    }

    /// Write a complete string value
    pub fn string(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.begin_string()?;
        self.string_fragment(bytes)?;
        self.end_string()
    }

    pub fn begin_string(&mut self) -> io::Result<()> {
        self.formatter.begin_string(&mut self.writer)
    }

    pub fn end_string(&mut self) -> io::Result<()> {
        self.formatter.end_string(&mut self.writer)
    }

    /// Write part of a string body, escaping quotes, backslashes and
    /// control characters
    pub fn string_fragment(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut start = 0;
        for (i, &byte) in bytes.iter().enumerate() {
            let escape = match byte {
                b'"' => CharEscape::Quote,
                b'\\' => CharEscape::ReverseSolidus,
                0x08 => CharEscape::Backspace,
                0x0C => CharEscape::FormFeed,
                b'\n' => CharEscape::LineFeed,
                b'\r' => CharEscape::CarriageReturn,
                b'\t' => CharEscape::Tab,
                0x00..=0x1F => CharEscape::AsciiControl(byte),
                _ => continue,
            };
            if start < i {
                self.writer.write_all(&bytes[start..i])?;
            }
            self.formatter.write_char_escape(&mut self.writer, escape)?;
            start = i + 1;
        }
        if start < bytes.len() {
            self.writer.write_all(&bytes[start..])?;
        }
        Ok(())
    }

    /// Write text verbatim in value position (debug placeholders)
    pub fn raw(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes())
    }

    pub fn begin_array(&mut self) -> io::Result<()> {
        self.formatter.begin_array(&mut self.writer)
    }

    pub fn begin_element(&mut self, first: bool) -> io::Result<()> {
        self.formatter.begin_array_value(&mut self.writer, first)
    }

    pub fn end_element(&mut self) -> io::Result<()> {
        self.formatter.end_array_value(&mut self.writer)
    }

    pub fn end_array(&mut self) -> io::Result<()> {
        self.formatter.end_array(&mut self.writer)
    }

    pub fn begin_object(&mut self) -> io::Result<()> {
        self.formatter.begin_object(&mut self.writer)
    }

    pub fn begin_key(&mut self, first: bool) -> io::Result<()> {
        self.formatter.begin_object_key(&mut self.writer, first)
    }

    /// Close a key and open its value
    pub fn end_key(&mut self) -> io::Result<()> {
        self.formatter.end_object_key(&mut self.writer)?;
        self.formatter.begin_object_value(&mut self.writer)
    }

    pub fn end_value(&mut self) -> io::Result<()> {
        self.formatter.end_object_value(&mut self.writer)
    }

    pub fn end_object(&mut self) -> io::Result<()> {
        self.formatter.end_object(&mut self.writer)
    }
}

/// Parsed JSON document.
///
/// Objects keep every member in source order, duplicate keys included.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonNode {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<JsonNode>),
    Object(Vec<(String, JsonNode)>),
}

/// Parse a complete JSON document.
///
/// In lax mode comments and trailing commas are blanked out first, so
/// reported offsets still point into the original input. Containers nested
/// deeper than `max_depth` are a grammar error.
pub fn parse_document(input: &[u8], options: &Options) -> Result<JsonNode> {
    let text: Cow<[u8]> = if options.lax {
        Cow::Owned(strip_lax(input))
    } else {
        Cow::Borrowed(input)
    };

    // Validates the whole document, including trailing data
    let root: &RawValue = serde_json::from_slice(&text).map_err(|err| {
        let offset = offset_of(input, err.line(), err.column());
        Error::grammar(offset, format!("error parsing JSON: {}", err))
    })?;

    TreeBuilder {
        base: &text,
        max_depth: options.max_depth,
    }
    .node(root, 0)
}

/// Builds a [`JsonNode`] one container level at a time
struct TreeBuilder<'a> {
    base: &'a [u8],
    max_depth: usize,
}

impl<'a> TreeBuilder<'a> {
    fn node(&self, raw: &'a RawValue, depth: usize) -> Result<JsonNode> {
        let text = raw.get();
        match text.as_bytes().first() {
            Some(b'{') => {
                self.check_depth(text, depth)?;
                let Members(members) = self.parse(text)?;
                let mut pairs = Vec::with_capacity(members.len());
                for (key, value) in members {
                    pairs.push((key, self.node(value, depth + 1)?));
                }
                Ok(JsonNode::Object(pairs))
            }
            Some(b'[') => {
                self.check_depth(text, depth)?;
                let items: Vec<&RawValue> = self.parse(text)?;
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    nodes.push(self.node(item, depth + 1)?);
                }
                Ok(JsonNode::Array(nodes))
            }
            _ => match self.parse::<JsonValue>(text)? {
                JsonValue::Null => Ok(JsonNode::Null),
                JsonValue::Bool(b) => Ok(JsonNode::Bool(b)),
                JsonValue::Number(n) => Ok(JsonNode::Number(n)),
                JsonValue::String(s) => Ok(JsonNode::String(s)),
                JsonValue::Array(_) | JsonValue::Object(_) => {
                    Err(Error::grammar(self.offset(text), "expected a scalar JSON value"))
                }
            },
        }
    }

    fn parse<T: Deserialize<'a>>(&self, text: &'a str) -> Result<T> {
        serde_json::from_str(text).map_err(|err| {
            let offset = self.offset(text) + offset_of(text.as_bytes(), err.line(), err.column());
            Error::grammar(offset, format!("error parsing JSON: {}", err))
        })
    }

    fn check_depth(&self, text: &str, depth: usize) -> Result<()> {
        if depth >= self.max_depth {
            return Err(Error::grammar(
                self.offset(text),
                format!("nesting exceeds maximum depth of {}", self.max_depth),
            ));
        }
        Ok(())
    }

    /// Byte offset of a slice borrowed from the document
    fn offset(&self, text: &str) -> u64 {
        (text.as_ptr() as usize).saturating_sub(self.base.as_ptr() as usize) as u64
    }
}

/// Object members in source order, values left unparsed
struct Members<'a>(Vec<(String, &'a RawValue)>);

impl<'de> Deserialize<'de> for Members<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(MembersVisitor)
    }
}

struct MembersVisitor;

impl<'de> Visitor<'de> for MembersVisitor {
    type Value = Members<'de>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut members = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, &'de RawValue>()? {
            members.push((key, value));
        }
        Ok(Members(members))
    }
}

/// Convert a 1-based line/column into a byte offset
fn offset_of(input: &[u8], line: usize, column: usize) -> u64 {
    if line == 0 {
        return 0;
    }
    let line_start = input
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'\n')
        .nth(line.saturating_sub(2))
        .map(|(i, _)| i + 1);
    let line_start = if line == 1 { 0 } else { line_start.unwrap_or(input.len()) };
    (line_start + column.saturating_sub(1)).min(input.len()) as u64
}

/// Replace `//` and `/* */` comments and trailing commas with spaces.
///
/// Newlines inside comments are kept so line numbers don't shift.
pub fn strip_lax(input: &[u8]) -> Vec<u8> {
    let mut out = input.to_vec();
    let mut i = 0;
    let mut in_string = false;

    while i < out.len() {
        let byte = out[i];
        if in_string {
            match byte {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match (byte, out.get(i + 1).copied()) {
            (b'"', _) => {
                in_string = true;
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < out.len() && out[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                out[i] = b' ';
                out[i + 1] = b' ';
                i += 2;
                while i < out.len() && !(out[i] == b'*' && out.get(i + 1) == Some(&b'/')) {
                    if out[i] != b'\n' {
                        out[i] = b' ';
                    }
                    i += 1;
                }
                if i < out.len() {
                    out[i] = b' ';
                    out[i + 1] = b' ';
                    i += 2;
                }
            }
            _ => i += 1,
        }
    }

    // Comments are gone, so a comma followed only by whitespace and a
    // closing bracket is trailing
    in_string = false;
    i = 0;
    while i < out.len() {
        let byte = out[i];
        if in_string {
            match byte {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else if byte == b'"' {
            in_string = true;
        } else if byte == b',' {
            // Only a comma after a value can trail: `[,]` stays an error
            let prev = out[..i].iter().rev().find(|b| !b.is_ascii_whitespace());
            let next = out[i + 1..].iter().find(|b| !b.is_ascii_whitespace());
            let after_value = !matches!(prev, None | Some(b'[') | Some(b'{') | Some(b',') | Some(b':'));
            if after_value && matches!(next, Some(b']') | Some(b'}')) {
                out[i] = b' ';
            }
        }
        i += 1;
    }

    out
}
