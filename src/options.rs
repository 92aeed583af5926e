//! Conversion options

/// Default nesting limit for containers in either direction.
///
/// JSON input is parsed one container level at a time, so this limit (not
/// serde_json's 128-level recursion limit) bounds JSON nesting as well.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// How bin/ext values are written as JSON strings, and whether tagged
/// strings are recognized when reading JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Base64Mode {
    /// Bin/ext have no JSON form; tagged strings are read literally
    #[default]
    Disabled,
    /// Bin is written as `"base64:<data>"`
    Prefixed,
    /// Bin is written as bare base64. Ext is always prefixed.
    Unprefixed,
}

impl Base64Mode {
    /// Whether bin/ext values can be written at all
    pub fn is_enabled(self) -> bool {
        self != Base64Mode::Disabled
    }
}

/// Handling of a binary stream holding several top-level documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuousMode {
    /// Exactly one document; trailing bytes are an error
    #[default]
    Off,
    /// Documents are separated by a newline
    Undelimited,
    /// Documents are separated by the given character
    Delimited(char),
}

/// Configuration threaded through one conversion.
///
/// Built once from the command line (or by a library caller) and never
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Viewing mode: render unencodable values as placeholders and accept
    /// any map key. Output is not guaranteed to be valid JSON.
    pub debug: bool,
    /// Pretty-print JSON output
    pub pretty: bool,
    /// Base64 tagging of bin/ext values
    pub base64: Base64Mode,
    /// Minimum length for treating an untagged base64-looking string as bin
    /// (0 disables detection)
    pub base64_min_len: usize,
    /// Accept comments and trailing commas in JSON input
    pub lax: bool,
    /// Write JSON floating point numbers as 32-bit floats
    pub use_float: bool,
    /// Require map keys to be strings
    pub strict_keys: bool,
    /// Multiple-document handling for MessagePack input
    pub continuous: ContinuousMode,
    /// Maximum container nesting depth. Exceeding it is a grammar error
    /// when reading MessagePack or JSON, and a data error when encoding a
    /// hand-built [`Value`](crate::Value) tree.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            pretty: false,
            base64: Base64Mode::Disabled,
            base64_min_len: 0,
            lax: false,
            use_float: false,
            strict_keys: true,
            continuous: ContinuousMode::Off,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Options {
    /// Create options with all modes off
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug viewing mode
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable or disable pretty-printing
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Set the base64 tagging mode
    pub fn with_base64(mut self, mode: Base64Mode) -> Self {
        self.base64 = mode;
        self
    }

    /// Set the opportunistic base64 detection threshold (0 disables it)
    pub fn with_base64_min_len(mut self, min_len: usize) -> Self {
        self.base64_min_len = min_len;
        self
    }

    /// Accept comments and trailing commas in JSON input
    pub fn with_lax(mut self, lax: bool) -> Self {
        self.lax = lax;
        self
    }

    /// Narrow JSON floats to 32 bits
    pub fn with_use_float(mut self, use_float: bool) -> Self {
        self.use_float = use_float;
        self
    }

    /// Require string map keys
    pub fn with_strict_keys(mut self, strict: bool) -> Self {
        self.strict_keys = strict;
        self
    }

    /// Set the multiple-document mode
    pub fn with_continuous(mut self, mode: ContinuousMode) -> Self {
        self.continuous = mode;
        self
    }

    /// Set the container nesting limit, for both input formats
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Debug output is always pretty-printed
    pub fn pretty_output(&self) -> bool {
        self.pretty || self.debug
    }

    /// Whether map keys of any type may be written
    pub fn allows_any_key(&self) -> bool {
        self.debug || !self.strict_keys
    }

    /// Whether `base64:` and `ext:` prefixes are recognized in JSON strings
    pub fn recognizes_tags(&self) -> bool {
        self.base64.is_enabled()
    }

    /// Whether untagged strings may be detected as base64
    pub fn detects_base64(&self) -> bool {
        self.base64_min_len > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict() {
        let options = Options::default();
        assert!(!options.debug);
        assert!(!options.pretty_output());
        assert!(!options.allows_any_key());
        assert!(!options.recognizes_tags());
        assert!(!options.detects_base64());
        assert_eq!(options.continuous, ContinuousMode::Off);
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_debug_forces_pretty_and_any_key() {
        let options = Options::new().with_debug(true);
        assert!(options.pretty_output());
        assert!(options.allows_any_key());
        assert!(!options.pretty);
    }

    #[test]
    fn test_unprefixed_still_recognizes_tags() {
        let options = Options::new().with_base64(Base64Mode::Unprefixed);
        assert!(options.recognizes_tags());
        assert!(Base64Mode::Prefixed.is_enabled());
        assert!(!Base64Mode::Disabled.is_enabled());
    }

    #[test]
    fn test_loose_keys_without_debug() {
        let options = Options::new().with_strict_keys(false);
        assert!(options.allows_any_key());
        assert!(!options.pretty_output());
    }
}
