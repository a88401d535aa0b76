//! Error types for the PLY codec.

use thiserror::Error;

/// Main error type for PLY operations.
#[derive(Error, Debug)]
pub enum Error {
    /// First header line is not the `ply` magic token
    #[error("Not a PLY stream: expected 'ply' magic line")]
    NotThisFormat,

    /// Header ended without a `format` line
    #[error("Header has no format line")]
    MissingFormatLine,

    /// Header declares more than one `format` line
    #[error("Header has more than one format line (line {0})")]
    DuplicateFormatLine(usize),

    /// Header line with an unknown keyword or wrong token count
    #[error("Malformed header line {line}: '{text}'")]
    MalformedHeaderLine { line: usize, text: String },

    /// `property` line that precedes every `element` line
    #[error("Property '{0}' declared before any element")]
    PropertyBeforeElement(String),

    /// Property name declared twice in one element
    #[error("Duplicate property '{property}' in element '{element}'")]
    DuplicatePropertyName { element: String, property: String },

    /// Element count is not a non-negative integer
    #[error("Invalid instance count '{count}' for element '{element}'")]
    InvalidElementCount { element: String, count: String },

    /// Type token not present in the type registry
    #[error("Unknown property type: {0}")]
    UnknownType(String),

    /// List length type that is not an integer type
    #[error("Invalid list length type '{ty}' for property '{property}'")]
    InvalidListLengthType { property: String, ty: String },

    /// Element not found by name
    #[error("Element not found: {0}")]
    UnknownElement(String),

    /// Property not found in its element
    #[error("Property '{property}' not found in element '{element}'")]
    UnknownProperty { element: String, property: String },

    /// Request or write group mixing list and scalar properties
    #[error("Element '{0}': a group must be all scalar properties or exactly one list property")]
    MixedPropertyKinds(String),

    /// Request or write group whose properties differ in storage type
    #[error("Element '{element}': properties mix types {first} and {second}")]
    MixedPropertyTypes {
        element: String,
        first: String,
        second: String,
    },

    /// Request naming no properties
    #[error("Empty property request for element '{0}'")]
    EmptyRequest(String),

    /// ASCII body token missing or not parseable as its type
    #[error("Malformed ASCII body at token {token} ('{text}'): expected {expected}")]
    TruncatedOrMalformedAsciiBody {
        token: u64,
        text: String,
        expected: String,
    },

    /// List length prefix that is negative or does not fit its type
    #[error("Invalid list length {length} for property '{property}'")]
    InvalidListLength { property: String, length: i64 },

    /// Stream ended before the header or body was complete
    #[error("Unexpected end of stream at byte {0}")]
    UnexpectedEndOfStream(u64),

    /// Output stream rejected a write
    #[error("Stream write failed: {0}")]
    StreamWriteFailure(#[source] std::io::Error),

    /// Element added twice with different instance counts
    #[error("Element '{element}' has {existing} instances, got {given}")]
    ElementCountMismatch {
        element: String,
        existing: usize,
        given: usize,
    },

    /// Source buffer size does not match count and type
    #[error("Buffer for element '{element}' has {actual} bytes, expected {expected}")]
    BufferSizeMismatch {
        element: String,
        expected: usize,
        actual: usize,
    },

    /// Encode reached a property that has no bound source buffer
    #[error("No data bound to property '{property}' of element '{element}'")]
    MissingPropertyData { element: String, property: String },

    /// Typed view requested with the wrong type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Second body pass on one handle
    #[error("Body has already been decoded")]
    BodyAlreadyDecoded,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed header line error.
    pub fn malformed(line: usize, text: impl Into<String>) -> Self {
        Self::MalformedHeaderLine {
            line,
            text: text.into(),
        }
    }

    /// Map a read-side I/O error, turning EOF into `UnexpectedEndOfStream`.
    pub fn from_read(err: std::io::Error, offset: u64) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEndOfStream(offset)
        } else {
            Self::Io(err)
        }
    }

    /// Returns true if this error aborts a body pass rather than a single call.
    pub fn is_body_error(&self) -> bool {
        matches!(
            self,
            Self::TruncatedOrMalformedAsciiBody { .. }
                | Self::InvalidListLength { .. }
                | Self::UnexpectedEndOfStream(_)
                | Self::StreamWriteFailure(_)
                | Self::MissingPropertyData { .. }
                | Self::Io(_)
        )
    }
}

/// Result type alias for PLY operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::NotThisFormat;
        assert!(e.to_string().contains("ply"));

        let e = Error::UnknownProperty {
            element: "vertex".into(),
            property: "w".into(),
        };
        assert!(e.to_string().contains("vertex"));
        assert!(e.to_string().contains("'w'"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_eof_maps_to_end_of_stream() {
        let io_err = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        let err = Error::from_read(io_err, 42);
        assert!(matches!(err, Error::UnexpectedEndOfStream(42)));
        assert!(err.is_body_error());
        assert!(!Error::UnknownElement("face".into()).is_body_error());
    }
}
