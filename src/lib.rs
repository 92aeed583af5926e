//! # emx-mpjson
//!
//! Lossless conversion between MessagePack and JSON, in both directions.
//!
//! ## MessagePack → JSON
//!
//! [`Decoder`] streams: each MessagePack tag is turned into a JSON token as
//! soon as it is read, so no document tree is ever held in memory.
//!
//! ```text
//! {"name": "alice", "tags": [1, 2]}   <-   82 A4 6E 61 6D 65 ...
//! ```
//!
//! ## JSON → MessagePack
//!
//! [`Encoder`] parses the whole document first. MessagePack declares every
//! container's size before its contents, which JSON only reveals once the
//! container is closed.
//!
//! ## Bin and ext values
//!
//! JSON has no byte strings. With base64 mode on, bin and ext values become
//! tagged strings that convert back exactly:
//!
//! ```text
//! bin  <->  "base64:AAEC"
//! ext  <->  "ext:5:base64:AAEC"
//! ```
//!
//! Without base64 mode they are an error, unless debug viewing mode is on,
//! which prints `<bin size:3 00 01 02>` placeholders instead. Debug output
//! is for reading and is not valid JSON.
//!
//! ## Example
//!
//! ```
//! use emx_mpjson::{Base64Mode, Decoder, Encoder, Options};
//!
//! let options = Options::new().with_base64(Base64Mode::Prefixed);
//!
//! let value = Encoder::new(options.clone()).parse(br#"{"raw": "base64:AQID"}"#).unwrap();
//! let packed = Encoder::new(options.clone()).encode_value(&value).unwrap();
//!
//! let json = Decoder::new(options).to_json(&packed).unwrap();
//! assert_eq!(json, r#"{"raw":"base64:AQID"}"#);
//! ```

pub mod binary;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod escape;
pub mod options;
pub mod text;
pub mod value;

pub use binary::{BinaryReader, Tag};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, Location, Result};
pub use escape::TagError;
pub use options::{Base64Mode, ContinuousMode, Options};
pub use value::Value;
