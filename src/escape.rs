//! Base64 tagging of bin/ext values
//!
//! JSON has no byte-string type, so bin and ext values travel as strings:
//!
//! ```text
//! bin  -> "base64:AAEC"          (or bare "AAEC" in unprefixed mode)
//! ext  -> "ext:5:base64:AAEC"    (always prefixed, the type must survive)
//! ```
//!
//! ## Detection rules
//!
//! When reading JSON strings (in order):
//! 1. `ext:` prefix with tags enabled → ext, malformed is an error
//! 2. `base64:` prefix with tags enabled → bin, malformed is an error
//! 3. Detection enabled, long enough, and only base64 characters → bin
//! 4. Otherwise → plain string
//!
//! Rule 3 is a heuristic: any string that happens to look like base64 is
//! reinterpreted as bytes. It never applies to map keys.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::options::{Base64Mode, Options};
use crate::value::Value;

// Tag constants
pub const BASE64_PREFIX: &str = "base64:";
pub const EXT_PREFIX: &str = "ext:";

/// Bytes shown in a debug placeholder before truncating with `...`
pub const PREVIEW_LEN: usize = 8;

const NEWLINE: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// Decoder that tolerates missing padding and stray trailing bits
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Error for a tagged string that cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// Payload after a tag is not base64
    #[error("string prefixed with \"{prefix}\" contains invalid base64")]
    InvalidBase64 { prefix: &'static str },
    /// `ext:` not followed by `<type>:base64:`
    #[error("string prefixed with \"ext:\" contains invalid prefix. Expected \"ext:<type>:base64:<data>\"")]
    InvalidExtPrefix,
    /// Ext type outside -128..=127
    #[error("string prefixed with \"ext:\" has out-of-bounds ext type: {0}")]
    ExtTypeOutOfBounds(i64),
}

/// Check that every byte is in the base64 alphabet, padding, CR or LF.
///
/// Spaces are rejected, otherwise most ordinary text would qualify.
pub fn is_base64(data: &[u8]) -> bool {
    data.iter().all(|&c| {
        c.is_ascii_alphanumeric()
            || c == b'+'
            || c == b'/'
            || c == b'='
            || c == CARRIAGE_RETURN
            || c == NEWLINE
    })
}

/// Decode base64 text, ignoring embedded line breaks
pub fn decode_base64(text: &[u8]) -> Option<Vec<u8>> {
    let filtered: Vec<u8> = text
        .iter()
        .copied()
        .filter(|&c| c != NEWLINE && c != CARRIAGE_RETURN)
        .collect();
    LENIENT.decode(filtered).ok()
}

/// Tag written before bin data in the given mode
pub fn bin_prefix(mode: Base64Mode) -> &'static str {
    match mode {
        Base64Mode::Prefixed => BASE64_PREFIX,
        Base64Mode::Unprefixed | Base64Mode::Disabled => "",
    }
}

/// Tag written before ext data, e.g. `ext:-3:base64:`
pub fn ext_prefix(exttype: i8) -> String {
    format!("{}{}:{}", EXT_PREFIX, exttype, BASE64_PREFIX)
}

/// JSON string form of a bin value
pub fn encode_bin(data: &[u8], mode: Base64Mode) -> String {
    format!("{}{}", bin_prefix(mode), STANDARD.encode(data))
}

/// JSON string form of an ext value
pub fn encode_ext(exttype: i8, data: &[u8]) -> String {
    format!("{}{}", ext_prefix(exttype), STANDARD.encode(data))
}

/// Classify a JSON string, decoding tagged or detected base64.
///
/// `allow_detection` is false for map keys.
pub fn decode_string(text: &str, options: &Options, allow_detection: bool) -> Result<Value, TagError> {
    if options.recognizes_tags() {
        if let Some(rest) = text.strip_prefix(EXT_PREFIX) {
            return decode_ext(rest);
        }

        if let Some(payload) = text.strip_prefix(BASE64_PREFIX) {
            if !is_base64(payload.as_bytes()) {
                return Err(TagError::InvalidBase64 { prefix: BASE64_PREFIX });
            }
            let data = decode_base64(payload.as_bytes())
                .ok_or(TagError::InvalidBase64 { prefix: BASE64_PREFIX })?;
            return Ok(Value::Bin(data));
        }
    }

    if allow_detection
        && options.detects_base64()
        && text.len() >= options.base64_min_len
        && is_base64(text.as_bytes())
    {
        // Characters alone don't make it decodable (e.g. a length of 4n+1)
        if let Some(data) = decode_base64(text.as_bytes()) {
            return Ok(Value::Bin(data));
        }
    }

    Ok(Value::String(text.to_string()))
}

/// Parse `<type>:base64:<data>` following the `ext:` tag
fn decode_ext(rest: &str) -> Result<Value, TagError> {
    let digits_end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());

    let exttype: i64 = rest[..digits_end]
        .parse()
        .map_err(|_| TagError::InvalidExtPrefix)?;

    let payload = rest[digits_end..]
        .strip_prefix(':')
        .and_then(|r| r.strip_prefix(BASE64_PREFIX))
        .ok_or(TagError::InvalidExtPrefix)?;

    let exttype = i8::try_from(exttype).map_err(|_| TagError::ExtTypeOutOfBounds(exttype))?;

    if !is_base64(payload.as_bytes()) {
        return Err(TagError::InvalidBase64 { prefix: EXT_PREFIX });
    }
    let data = decode_base64(payload.as_bytes()).ok_or(TagError::InvalidBase64 { prefix: EXT_PREFIX })?;

    Ok(Value::Ext(exttype, data))
}

/// Debug placeholder for a bin value, e.g. `<bin size:3 01 02 03>`
pub fn bin_placeholder(len: u32, preview: &[u8]) -> String {
    format!("<bin size:{}{}>", len, hex_preview(len, preview))
}

/// Debug placeholder for an ext value, e.g. `<ext type:5 size:1 FF>`
pub fn ext_placeholder(exttype: i8, len: u32, preview: &[u8]) -> String {
    format!("<ext type:{} size:{}{}>", exttype, len, hex_preview(len, preview))
}

fn hex_preview(len: u32, preview: &[u8]) -> String {
    let mut out = String::with_capacity(preview.len() * 3 + 4);
    for byte in preview.iter().take(PREVIEW_LEN) {
        out.push_str(&format!(" {:02X}", byte));
    }
    if len as usize > preview.len().min(PREVIEW_LEN) {
        out.push_str(" ...");
    }
    out
}
