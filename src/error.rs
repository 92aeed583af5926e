//! Conversion errors

use std::fmt;
use std::io;

/// Where in the input an error was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Byte offset into MessagePack input
    Offset(u64),
    /// Path into a parsed JSON document, e.g. `$.items[2]`
    Path(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Offset(offset) => write!(f, "offset {}", offset),
            Location::Path(path) => write!(f, "{}", path),
        }
    }
}

/// Error type for all conversions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading the input or writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON text or a malformed MessagePack tag stream
    #[error("parse error at offset {offset}: {message}")]
    Grammar { offset: u64, message: String },

    /// Well-formed input that has no representation in the target format
    #[error("{message} (at {location})")]
    Data { location: Location, message: String },

    /// A buffer for a declared length could not be allocated
    #[error("allocation failure: could not reserve {size} bytes")]
    Alloc { size: usize },
}

impl Error {
    pub(crate) fn grammar(offset: u64, message: impl Into<String>) -> Self {
        Error::Grammar {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn data(location: Location, message: impl Into<String>) -> Self {
        Error::Data {
            location,
            message: message.into(),
        }
    }

    /// True for malformed input
    pub fn is_grammar(&self) -> bool {
        matches!(self, Error::Grammar { .. })
    }

    /// True for input that cannot be represented in the target format
    pub fn is_data(&self) -> bool {
        matches!(self, Error::Data { .. })
    }
}

/// Result type alias for conversions
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_message_names_location() {
        let err = Error::data(Location::Path("$.a[1]".into()), "bin unencodable in JSON");
        assert_eq!(err.to_string(), "bin unencodable in JSON (at $.a[1])");
        assert!(err.is_data());
        assert!(!err.is_grammar());
    }

    #[test]
    fn test_grammar_error_message() {
        let err = Error::grammar(17, "unexpected end of input");
        assert_eq!(err.to_string(), "parse error at offset 17: unexpected end of input");
        assert!(err.is_grammar());
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
