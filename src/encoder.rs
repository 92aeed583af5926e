//! JSON → MessagePack encoder
//!
//! MessagePack writes each container's element count before its contents,
//! and JSON gives no count until the container closes, so the whole input
//! is parsed into a [`Value`] tree first. Encoding goes into a buffer that
//! reaches the output only once the document has fully converted.

use std::fmt;
use std::io::{self, Read, Write};

use rmp::encode;
use serde_json::Number;
use tracing::debug;

use crate::error::{Error, Location, Result};
use crate::escape;
use crate::options::Options;
use crate::text::{parse_document, JsonNode};
use crate::value::Value;

/// Encodes JSON text as MessagePack
pub struct Encoder {
    options: Options,
}

impl Encoder {
    /// Create an encoder with the given options
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Options in use
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Convert one JSON document from `input` into MessagePack on `output`.
    ///
    /// Nothing is written unless the whole document converts.
    pub fn convert<R: Read, W: Write>(&self, mut input: R, mut output: W) -> Result<()> {
        let mut text = Vec::new();
        input.read_to_end(&mut text)?;
        debug!(bytes = text.len(), lax = self.options.lax, "read JSON input");

        let value = self.parse(&text)?;
        let encoded = self.encode_value(&value)?;

        output.write_all(&encoded)?;
        output.flush()?;
        debug!(bytes = encoded.len(), "wrote MessagePack document");
        Ok(())
    }

    /// Parse JSON text into a value tree, decoding tagged strings
    pub fn parse(&self, text: &[u8]) -> Result<Value> {
        let json = parse_document(text, &self.options)?;
        self.build(&json, &mut JsonPath::default())
    }

    /// Encode a value tree as one MessagePack document
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_value(&mut buf, value, &mut JsonPath::default())?;
        Ok(buf)
    }

    fn build(&self, node: &JsonNode, path: &mut JsonPath) -> Result<Value> {
        match node {
            JsonNode::Null => Ok(Value::Null),
            JsonNode::Bool(b) => Ok(Value::Bool(*b)),
            JsonNode::Number(n) => self.build_number(n, path),
            JsonNode::String(s) => escape::decode_string(s, &self.options, true)
                .map_err(|e| Error::data(path.location(), e.to_string())),
            JsonNode::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push_index(i);
                    values.push(self.build(item, path)?);
                    path.pop();
                }
                Ok(Value::Array(values))
            }
            JsonNode::Object(members) => {
                let mut pairs = Vec::with_capacity(members.len());
                for (key, item) in members {
                    path.push_key(key);
                    // Keys only honor explicit tags
                    let key_value = escape::decode_string(key, &self.options, false)
                        .map_err(|e| Error::data(path.location(), format!("map key: {}", e)))?;
                    pairs.push((key_value, self.build(item, path)?));
                    path.pop();
                }
                Ok(Value::Map(pairs))
            }
        }
    }

    /// Integers must fit in 64 bits; anything else with a fraction or
    /// exponent is a float.
    fn build_number(&self, n: &Number, path: &JsonPath) -> Result<Value> {
        if let Some(i) = n.as_i64() {
            return Ok(Value::Int64(i));
        }
        if let Some(u) = n.as_u64() {
            return Ok(Value::UInt64(u));
        }

        let literal = n.to_string();
        let is_integer = !literal.contains(['.', 'e', 'E']);
        match n.as_f64() {
            Some(f) if !is_integer => {
                if self.options.use_float {
                    Ok(Value::Float32(f as f32))
                } else {
                    Ok(Value::Float64(f))
                }
            }
            _ => Err(Error::data(
                path.location(),
                format!("JSON number cannot be encoded in MessagePack: \"{}\"", literal),
            )),
        }
    }

    fn check_depth(&self, path: &JsonPath) -> Result<()> {
        if path.depth() >= self.options.max_depth {
            return Err(Error::data(
                path.location(),
                format!("nesting exceeds maximum depth of {}", self.options.max_depth),
            ));
        }
        Ok(())
    }

    fn write_value(&self, buf: &mut Vec<u8>, value: &Value, path: &mut JsonPath) -> Result<()> {
        match value {
            Value::Null => {
                encode::write_nil(buf).map_err(write_err)?;
            }
            Value::Bool(b) => {
                encode::write_bool(buf, *b).map_err(write_err)?;
            }
            Value::Int64(n) => {
                encode::write_sint(buf, *n).map_err(write_err)?;
            }
            Value::UInt64(n) => {
                encode::write_uint(buf, *n).map_err(write_err)?;
            }
            Value::Float32(f) => {
                encode::write_f32(buf, *f).map_err(write_err)?;
            }
            Value::Float64(f) => {
                encode::write_f64(buf, *f).map_err(write_err)?;
            }
            Value::String(s) => {
                encode::write_str_len(buf, len32(s.len(), "str", path)?).map_err(write_err)?;
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bin(data) => {
                encode::write_bin_len(buf, len32(data.len(), "bin", path)?).map_err(write_err)?;
                buf.extend_from_slice(data);
            }
            Value::Ext(exttype, data) => {
                encode::write_ext_meta(buf, len32(data.len(), "ext", path)?, *exttype).map_err(write_err)?;
                buf.extend_from_slice(data);
            }
            Value::Array(items) => {
                self.check_depth(path)?;
                encode::write_array_len(buf, len32(items.len(), "array", path)?).map_err(write_err)?;
                for (i, item) in items.iter().enumerate() {
                    path.push_index(i);
                    self.write_value(buf, item, path)?;
                    path.pop();
                }
            }
            Value::Map(pairs) => {
                self.check_depth(path)?;
                encode::write_map_len(buf, len32(pairs.len(), "map", path)?).map_err(write_err)?;
                for (key, item) in pairs {
                    match key {
                        Value::String(s) => path.push_key(s),
                        other => path.push_key(&format!("<{}>", other.type_name())),
                    }
                    if !key.is_string_like() && !self.options.allows_any_key() {
                        return Err(Error::data(
                            path.location(),
                            format!("map key is not a string (found {})", key.type_name()),
                        ));
                    }
                    self.write_value(buf, key, path)?;
                    self.write_value(buf, item, path)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

fn len32(len: usize, kind: &str, path: &JsonPath) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::data(
            path.location(),
            format!("{} of length {} is too large for MessagePack", kind, len),
        )
    })
}

fn write_err<E: fmt::Display>(err: E) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

/// Position in a JSON document, rendered like `$.items[2].name`
#[derive(Debug, Default)]
struct JsonPath {
    text: String,
    marks: Vec<usize>,
}

impl JsonPath {
    fn push_key(&mut self, key: &str) {
        self.marks.push(self.text.len());
        if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.text.push('.');
            self.text.push_str(key);
        } else {
            self.text.push_str(&format!("[{:?}]", key));
        }
    }

    fn push_index(&mut self, index: usize) {
        self.marks.push(self.text.len());
        self.text.push_str(&format!("[{}]", index));
    }

    fn pop(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.text.truncate(mark);
        }
    }

    fn depth(&self) -> usize {
        self.marks.len()
    }

    fn location(&self) -> Location {
        Location::Path(format!("${}", self.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Base64Mode;

    fn parse(text: &str) -> Result<Value> {
        Encoder::default().parse(text.as_bytes())
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse("null").unwrap(), Value::Null);
        assert_eq!(parse("true").unwrap(), Value::Bool(true));
        assert_eq!(parse("-42").unwrap(), Value::Int64(-42));
        assert_eq!(parse("1.5").unwrap(), Value::Float64(1.5));
        assert_eq!(parse("1e2").unwrap(), Value::Float64(100.0));
        assert_eq!(parse(r#""hi""#).unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_parse_integer_ranges() {
        assert_eq!(parse("9223372036854775807").unwrap(), Value::Int64(i64::MAX));
        assert_eq!(parse("-9223372036854775808").unwrap(), Value::Int64(i64::MIN));
        assert_eq!(parse("18446744073709551615").unwrap(), Value::UInt64(u64::MAX));

        let err = parse("18446744073709551616").unwrap_err();
        assert!(err.is_data());
        assert!(err.to_string().contains("18446744073709551616"));

        assert!(parse("-9223372036854775809").unwrap_err().is_data());
    }

    #[test]
    fn test_parse_float_out_of_range() {
        assert!(parse("1e400").unwrap_err().is_data());
    }

    #[test]
    fn test_use_float_narrows() {
        let encoder = Encoder::new(Options::new().with_use_float(true));
        assert_eq!(encoder.parse(b"0.5").unwrap(), Value::Float32(0.5));
        assert_eq!(encoder.encode_value(&Value::Float32(0.5)).unwrap(), vec![0xCA, 0x3F, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_map_order_preserved() {
        let value = parse(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![
                (Value::from("z"), Value::Int64(1)),
                (Value::from("a"), Value::Int64(2)),
                (Value::from("m"), Value::Int64(3)),
            ])
        );
    }

    #[test]
    fn test_encode_bytes() {
        let encoder = Encoder::default();
        let value = parse(r#"{"a": [1, -1, null, "x"]}"#).unwrap();
        assert_eq!(
            encoder.encode_value(&value).unwrap(),
            vec![0x81, 0xA1, b'a', 0x94, 0x01, 0xFF, 0xC0, 0xA1, b'x']
        );
    }

    #[test]
    fn test_encode_compact_integers() {
        let encoder = Encoder::default();
        assert_eq!(encoder.encode_value(&Value::Int64(200)).unwrap(), vec![0xCC, 200]);
        assert_eq!(encoder.encode_value(&Value::Int64(-100)).unwrap(), vec![0xD0, 0x9C]);
        assert_eq!(
            encoder.encode_value(&Value::UInt64(u64::MAX)).unwrap(),
            vec![0xCF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_tags_decoded_to_bin_and_ext() {
        let encoder = Encoder::new(Options::new().with_base64(Base64Mode::Prefixed));
        let value = encoder.parse(br#"["base64:AQID", "ext:4:base64:/w=="]"#).unwrap();
        assert_eq!(value, Value::Array(vec![Value::Bin(vec![1, 2, 3]), Value::Ext(4, vec![0xFF])]));
        assert_eq!(
            encoder.encode_value(&value).unwrap(),
            vec![0x92, 0xC4, 0x03, 1, 2, 3, 0xD4, 0x04, 0xFF]
        );
    }

    #[test]
    fn test_bad_tag_reports_path() {
        let encoder = Encoder::new(Options::new().with_base64(Base64Mode::Prefixed));
        let err = encoder.parse(br#"{"items": [1, "ext:300:base64:AA=="]}"#).unwrap_err();
        match err {
            Error::Data { location, message } => {
                assert_eq!(location, Location::Path("$.items[1]".into()));
                assert!(message.contains("out-of-bounds ext type: 300"));
            }
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn test_keys_skip_detection_but_honor_tags() {
        let encoder = Encoder::new(Options::new().with_base64(Base64Mode::Prefixed).with_base64_min_len(4));
        let value = encoder.parse(br#"{"SGVsbG8=": "SGVsbG8=", "base64:AQ==": 1}"#).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![
                (Value::from("SGVsbG8="), Value::Bin(b"Hello".to_vec())),
                (Value::Bin(vec![1]), Value::Int64(1)),
            ])
        );
    }

    #[test]
    fn test_non_string_key_rejected_when_strict() {
        let value = Value::Map(vec![(Value::Int64(1), Value::Null)]);
        let err = Encoder::default().encode_value(&value).unwrap_err();
        assert!(err.to_string().contains("map key is not a string"));

        let loose = Encoder::new(Options::new().with_strict_keys(false));
        assert_eq!(loose.encode_value(&value).unwrap(), vec![0x81, 0x01, 0xC0]);
    }

    #[test]
    fn test_depth_limit() {
        let encoder = Encoder::new(Options::new().with_max_depth(2));
        assert!(encoder.parse(b"[[1]]").is_ok());
        assert!(encoder.parse(b"[[[1]]]").unwrap_err().is_grammar());

        let deep = Value::Array(vec![Value::Array(vec![Value::Array(vec![])])]);
        match encoder.encode_value(&deep).unwrap_err() {
            Error::Data { location, message } => {
                assert_eq!(location, Location::Path("$[0][0]".into()));
                assert!(message.contains("maximum depth of 2"));
            }
            other => panic!("expected data error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_keys_all_encoded() {
        let encoder = Encoder::default();
        let value = encoder.parse(br#"{"k": 1, "k": 2}"#).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![(Value::from("k"), Value::Int64(1)), (Value::from("k"), Value::Int64(2))])
        );
        assert_eq!(
            encoder.encode_value(&value).unwrap(),
            vec![0x82, 0xA1, b'k', 0x01, 0xA1, b'k', 0x02]
        );
    }

    #[test]
    fn test_convert_writes_nothing_on_failure() {
        let encoder = Encoder::new(Options::new().with_base64(Base64Mode::Prefixed));
        let mut out = Vec::new();
        let err = encoder
            .convert(&br#"[1, 2, "base64:!!"]"#[..], &mut out)
            .unwrap_err();
        assert!(err.is_data());
        assert!(out.is_empty());
    }

    #[test]
    fn test_convert_parse_error() {
        let mut out = Vec::new();
        let err = Encoder::default().convert(&b"[1, 2"[..], &mut out).unwrap_err();
        assert!(err.is_grammar());
        assert!(out.is_empty());
    }

    #[test]
    fn test_path_rendering() {
        let mut path = JsonPath::default();
        path.push_key("items");
        path.push_index(3);
        path.push_key("odd key");
        assert_eq!(path.location(), Location::Path(r#"$.items[3]["odd key"]"#.into()));
        path.pop();
        path.pop();
        assert_eq!(path.location(), Location::Path("$.items".into()));
    }
}
