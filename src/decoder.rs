//! MessagePack → JSON decoder
//!
//! Streams in a single pass: each MessagePack tag is read and immediately
//! written as the matching JSON token, recursing into containers. Memory
//! use is bounded by nesting depth plus the largest single str/bin/ext.
//!
//! ## Bin and ext values
//!
//! JSON has no byte strings, so bin/ext values are:
//! - written as base64 strings when base64 mode is on (see [`crate::escape`])
//! - written as `<bin size:N ..>` placeholders in debug mode (not valid JSON)
//! - rejected otherwise
//!
//! ## Continuous mode
//!
//! A stream may hold several top-level documents back to back. After each
//! document one byte is peeked: a clean end of input ends the run, anything
//! else starts the next document.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use tracing::debug;

use crate::binary::{BinaryReader, Tag};
use crate::error::{Error, Location, Result};
use crate::escape::{self, PREVIEW_LEN};
use crate::options::{Base64Mode, ContinuousMode, Options};
use crate::text::TextEmitter;
use crate::value::Value;

/// Decodes MessagePack into JSON text
pub struct Decoder {
    options: Options,
}

impl Decoder {
    /// Create a decoder with the given options
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Switch debug viewing mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Set the multiple-document mode
    pub fn with_continuous(mut self, mode: ContinuousMode) -> Self {
        self.options.continuous = mode;
        self
    }

    /// Options in use
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Convert MessagePack from `input` into JSON on `output`.
    ///
    /// Returns the number of documents written. Any error ends the run,
    /// including in continuous mode.
    pub fn convert<R: Read, W: Write>(&self, input: R, output: W) -> Result<usize> {
        if self.options.pretty_output() {
            self.convert_with(input, output, PrettyFormatter::new)
        } else {
            self.convert_with(input, output, || CompactFormatter)
        }
    }

    /// Convert MessagePack bytes into a JSON string
    pub fn to_json(&self, input: &[u8]) -> Result<String> {
        let mut out = Vec::new();
        self.convert(input, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn convert_with<R, W, F>(&self, input: R, mut output: W, formatter: impl Fn() -> F) -> Result<usize>
    where
        R: Read,
        W: Write,
        F: Formatter,
    {
        let mut reader = BinaryReader::new(input);
        let pretty = self.options.pretty_output();
        let mut count = 0;

        loop {
            let start = reader.offset();
            Projector {
                options: &self.options,
                reader: &mut reader,
                emitter: TextEmitter::new(&mut output, formatter()),
            }
            .element(0)?;
            count += 1;
            debug!(document = count, start, end = reader.offset(), "converted document");

            let more = !reader.is_exhausted()?;
            match self.options.continuous {
                ContinuousMode::Off if more => {
                    return Err(Error::grammar(
                        reader.offset(),
                        "trailing data after document. Try continuous mode (-c)",
                    ));
                }
                ContinuousMode::Off => break,
                _ if !more => break,
                ContinuousMode::Undelimited => output.write_all(b"\n")?,
                ContinuousMode::Delimited(delim) => {
                    let mut buf = [0u8; 4];
                    output.write_all(delim.encode_utf8(&mut buf).as_bytes())?;
                    if pretty {
                        output.write_all(b"\n")?;
                    }
                }
            }
        }

        if pretty {
            output.write_all(b"\n")?;
        }
        output.flush()?;
        Ok(count)
    }

    /// Read one MessagePack document into a value tree.
    ///
    /// Unsigned integers that fit in `i64` become [`Value::Int64`].
    pub fn read_value<R: Read>(&self, reader: &mut BinaryReader<R>) -> Result<Value> {
        self.read_node(reader, 0)
    }

    /// Read every document in `input` (one unless continuous mode is on)
    pub fn read_values<R: Read>(&self, input: R) -> Result<Vec<Value>> {
        let mut reader = BinaryReader::new(input);
        let mut values = vec![self.read_value(&mut reader)?];
        while !reader.is_exhausted()? {
            if self.options.continuous == ContinuousMode::Off {
                return Err(Error::grammar(reader.offset(), "trailing data after document"));
            }
            values.push(self.read_value(&mut reader)?);
        }
        Ok(values)
    }

    fn read_node<R: Read>(&self, reader: &mut BinaryReader<R>, depth: usize) -> Result<Value> {
        let offset = reader.offset();
        let tag = reader.read_tag()?;
        Ok(match tag {
            Tag::Nil => Value::Null,
            Tag::Bool(b) => Value::Bool(b),
            Tag::Int(n) => Value::Int64(n),
            Tag::UInt(n) => Value::from(n),
            Tag::F32(f) => Value::Float32(f),
            Tag::F64(f) => Value::Float64(f),
            Tag::Str(len) => {
                let bytes = reader.read_bytes(len)?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| Error::data(Location::Offset(offset), "str is not valid UTF-8"))?;
                Value::String(text)
            }
            Tag::Bin(len) => Value::Bin(reader.read_bytes(len)?),
            Tag::Ext(exttype, len) => Value::Ext(exttype, reader.read_bytes(len)?),
            Tag::Array(count) => {
                check_depth(offset, depth, self.options.max_depth)?;
                // Counts come from the input, so don't trust them for capacity
                let mut items = Vec::with_capacity((count as usize).min(1024));
                for _ in 0..count {
                    items.push(self.read_node(reader, depth + 1)?);
                }
                Value::Array(items)
            }
            Tag::Map(count) => {
                check_depth(offset, depth, self.options.max_depth)?;
                let mut pairs = Vec::with_capacity((count as usize).min(1024));
                for _ in 0..count {
                    let key = self.read_node(reader, depth + 1)?;
                    let value = self.read_node(reader, depth + 1)?;
                    pairs.push((key, value));
                }
                Value::Map(pairs)
            }
        })
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// State for converting one document
struct Projector<'a, R, W, F> {
    options: &'a Options,
    reader: &'a mut BinaryReader<R>,
    emitter: TextEmitter<W, F>,
}

impl<R: Read, W: Write, F: Formatter> Projector<'_, R, W, F> {
    fn element(&mut self, depth: usize) -> Result<()> {
        let offset = self.reader.offset();
        let tag = self.reader.read_tag()?;
        self.value(offset, tag, depth)
    }

    fn value(&mut self, offset: u64, tag: Tag, depth: usize) -> Result<()> {
        match tag {
            Tag::Nil => self.emitter.null()?,
            Tag::Bool(b) => self.emitter.bool(b)?,
            Tag::Int(n) => self.emitter.i64(n)?,
            Tag::UInt(n) => self.emitter.u64(n)?,
            Tag::F32(f) if f.is_finite() => self.emitter.f32(f)?,
            Tag::F32(f) => self.non_finite(offset, f as f64)?,
            Tag::F64(f) if f.is_finite() => self.emitter.f64(f)?,
            Tag::F64(f) => self.non_finite(offset, f)?,
            Tag::Str(len) => {
                let bytes = self.reader.read_bytes(len)?;
                self.emitter.string(&bytes)?;
            }
            Tag::Bin(len) => self.bin(offset, len)?,
            Tag::Ext(exttype, len) => self.ext(offset, exttype, len)?,
            Tag::Array(count) => {
                check_depth(offset, depth, self.options.max_depth)?;
                self.emitter.begin_array()?;
                for i in 0..count {
                    self.emitter.begin_element(i == 0)?;
                    self.element(depth + 1)?;
                    self.emitter.end_element()?;
                }
                self.emitter.end_array()?;
            }
            Tag::Map(count) => {
                check_depth(offset, depth, self.options.max_depth)?;
                self.emitter.begin_object()?;
                for i in 0..count {
                    self.emitter.begin_key(i == 0)?;
                    self.key(depth + 1)?;
                    self.emitter.end_key()?;
                    self.element(depth + 1)?;
                    self.emitter.end_value()?;
                }
                self.emitter.end_object()?;
            }
        }
        Ok(())
    }

    fn key(&mut self, depth: usize) -> Result<()> {
        let offset = self.reader.offset();
        let tag = self.reader.read_tag()?;
        match tag {
            Tag::Str(len) => {
                let bytes = self.reader.read_bytes(len)?;
                self.emitter.string(&bytes)?;
                Ok(())
            }
            _ if self.options.allows_any_key() => self.value(offset, tag, depth),
            _ => Err(Error::data(
                Location::Offset(offset),
                format!(
                    "map key is not a string (found {}). Try debug viewing mode (-d)",
                    tag.type_name()
                ),
            )),
        }
    }

    fn bin(&mut self, offset: u64, len: u32) -> Result<()> {
        match self.options.base64 {
            Base64Mode::Prefixed | Base64Mode::Unprefixed => {
                self.emitter.begin_string()?;
                self.emitter.raw(escape::bin_prefix(self.options.base64))?;
                self.stream_base64(len)?;
                self.emitter.end_string()?;
            }
            Base64Mode::Disabled if self.options.debug => {
                let preview = self.preview(len)?;
                self.emitter.raw(&escape::bin_placeholder(len, &preview))?;
            }
            Base64Mode::Disabled => {
                return Err(Error::data(
                    Location::Offset(offset),
                    format!(
                        "bin of size {} unencodable in JSON. Try debug viewing mode (-d) or base64 mode (-b)",
                        len
                    ),
                ));
            }
        }
        Ok(())
    }

    fn ext(&mut self, offset: u64, exttype: i8, len: u32) -> Result<()> {
        if self.options.base64.is_enabled() {
            self.emitter.begin_string()?;
            self.emitter.raw(&escape::ext_prefix(exttype))?;
            self.stream_base64(len)?;
            self.emitter.end_string()?;
        } else if self.options.debug {
            let preview = self.preview(len)?;
            self.emitter.raw(&escape::ext_placeholder(exttype, len, &preview))?;
        } else {
            return Err(Error::data(
                Location::Offset(offset),
                format!(
                    "ext type {} of size {} unencodable in JSON. Try debug viewing mode (-d) or base64 mode (-b)",
                    exttype, len
                ),
            ));
        }
        Ok(())
    }

    /// Copy `len` payload bytes to the output as base64.
    ///
    /// Base64 output needs no JSON escaping, so it bypasses the formatter.
    fn stream_base64(&mut self, len: u32) -> Result<()> {
        let start = self.reader.offset();
        let mut payload = Read::take(&mut *self.reader, len as u64);
        let mut encoder = EncoderWriter::new(self.emitter.writer_mut(), &STANDARD);
        let copied = io::copy(&mut payload, &mut encoder)?;
        encoder.finish()?;
        if copied < len as u64 {
            return Err(Error::grammar(start, "unexpected end of input, data is truncated"));
        }
        Ok(())
    }

    /// Read the first bytes for a placeholder and skip the rest
    fn preview(&mut self, len: u32) -> Result<Vec<u8>> {
        let shown = len.min(PREVIEW_LEN as u32);
        let preview = self.reader.read_bytes(shown)?;
        self.reader.skip_bytes(len - shown)?;
        Ok(preview)
    }

    fn non_finite(&mut self, offset: u64, f: f64) -> Result<()> {
        if !self.options.debug {
            return Err(Error::data(
                Location::Offset(offset),
                format!("non-finite float {} cannot be represented in JSON. Try debug viewing mode (-d)", f),
            ));
        }
        let text = if f.is_nan() {
            "NaN"
        } else if f > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        };
        self.emitter.raw(text)?;
        Ok(())
    }
}

fn check_depth(offset: u64, depth: usize, max_depth: usize) -> Result<()> {
    if depth >= max_depth {
        return Err(Error::grammar(
            offset,
            format!("nesting exceeds maximum depth of {}", max_depth),
        ));
    }
    Ok(())
}
