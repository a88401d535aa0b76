//! PLY header keywords and body encodings.

use std::fmt;

/// Magic token on the first header line.
pub const PLY_MAGIC: &str = "ply";

/// Keyword of the format line.
pub const FORMAT_KEYWORD: &str = "format";

/// Keyword of comment lines.
pub const COMMENT_KEYWORD: &str = "comment";

/// Keyword of object info lines.
pub const OBJ_INFO_KEYWORD: &str = "obj_info";

/// Keyword introducing an element.
pub const ELEMENT_KEYWORD: &str = "element";

/// Keyword introducing a property.
pub const PROPERTY_KEYWORD: &str = "property";

/// Marker token of a list property.
pub const LIST_KEYWORD: &str = "list";

/// Last header line.
pub const END_HEADER: &str = "end_header";

/// Format version written by the encoder.
pub const FORMAT_VERSION: &str = "1.0";

/// Body encoding declared by the format line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Whitespace separated text tokens
    #[default]
    Ascii,
    /// Raw little-endian values
    BinaryLittleEndian,
    /// Raw big-endian values
    BinaryBigEndian,
}

impl Encoding {
    /// Binary encoding matching the host byte order.
    pub const NATIVE_BINARY: Self = if cfg!(target_endian = "big") {
        Self::BinaryBigEndian
    } else {
        Self::BinaryLittleEndian
    };

    /// Token used on the format line.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::BinaryLittleEndian => "binary_little_endian",
            Self::BinaryBigEndian => "binary_big_endian",
        }
    }

    /// Parse the format line token.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ascii" => Some(Self::Ascii),
            "binary_little_endian" => Some(Self::BinaryLittleEndian),
            "binary_big_endian" => Some(Self::BinaryBigEndian),
            _ => None,
        }
    }

    /// Returns true for both binary encodings.
    #[inline]
    pub const fn is_binary(self) -> bool {
        !matches!(self, Self::Ascii)
    }

    /// Returns true if binary values must be byte swapped to reach host order.
    #[inline]
    pub fn needs_swap(self) -> bool {
        self.is_binary() && self != Self::NATIVE_BINARY
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reverse the bytes of every `width`-sized value in `bytes`.
///
/// Swapping is its own inverse, so this converts host order to file order
/// and back.
#[inline]
pub fn swap_values(bytes: &mut [u8], width: usize) {
    if width > 1 {
        for value in bytes.chunks_exact_mut(width) {
            value.reverse();
        }
    }
}
