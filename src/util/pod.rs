//! Primitive property types - the fixed PLY type table.

use bytemuck::{Pod, Zeroable};
use std::fmt;

use super::{Error, Result};

/// Primitive type of a PLY property value or list length.
///
/// Every type has a fixed width in bytes. `Invalid` has width 0 and only
/// ever appears as the list-length type of a non-list property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PrimitiveType {
    /// Signed 8-bit integer (`char`)
    Int8 = 0,
    /// Unsigned 8-bit integer (`uchar`)
    Uint8 = 1,
    /// Signed 16-bit integer (`short`)
    Int16 = 2,
    /// Unsigned 16-bit integer (`ushort`)
    Uint16 = 3,
    /// Signed 32-bit integer (`int`)
    Int32 = 4,
    /// Unsigned 32-bit integer (`uint`)
    Uint32 = 5,
    /// 32-bit IEEE 754 float (`float`)
    Float32 = 6,
    /// 64-bit IEEE 754 float (`double`)
    Float64 = 7,
    /// No type / not a list
    #[default]
    Invalid = 127,
}

/// Every header token the type registry understands.
///
/// Canonical names come first; the sized aliases map to the same types.
const TYPE_NAMES: &[(&str, PrimitiveType)] = &[
    ("char", PrimitiveType::Int8),
    ("uchar", PrimitiveType::Uint8),
    ("short", PrimitiveType::Int16),
    ("ushort", PrimitiveType::Uint16),
    ("int", PrimitiveType::Int32),
    ("uint", PrimitiveType::Uint32),
    ("float", PrimitiveType::Float32),
    ("double", PrimitiveType::Float64),
    ("int8", PrimitiveType::Int8),
    ("uint8", PrimitiveType::Uint8),
    ("int16", PrimitiveType::Int16),
    ("uint16", PrimitiveType::Uint16),
    ("int32", PrimitiveType::Int32),
    ("uint32", PrimitiveType::Uint32),
    ("float32", PrimitiveType::Float32),
    ("float64", PrimitiveType::Float64),
];

impl PrimitiveType {
    /// All valid (storable) types, in tag order.
    pub const ALL: [Self; 8] = [
        Self::Int8,
        Self::Uint8,
        Self::Int16,
        Self::Uint16,
        Self::Int32,
        Self::Uint32,
        Self::Float32,
        Self::Float64,
    ];

    /// Returns the size in bytes of a single value of this type.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 => 8,
            Self::Invalid => 0,
        }
    }

    /// Returns the canonical header name of this type.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "char",
            Self::Uint8 => "uchar",
            Self::Int16 => "short",
            Self::Uint16 => "ushort",
            Self::Int32 => "int",
            Self::Uint32 => "uint",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Invalid => "INVALID",
        }
    }

    /// Parse a header type token (canonical name or alias).
    pub fn from_name(name: &str) -> Result<Self> {
        TYPE_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| *t)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Returns true for every type except `Invalid`.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Returns true if this is an integer type.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Uint8 | Self::Int16 | Self::Uint16 | Self::Int32 | Self::Uint32
        )
    }

    /// Returns true if this is a floating point type.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// === POD trait for typed views over byte buffers ===

/// Rust types that have a PLY primitive representation.
pub trait PlyPod: Pod + Zeroable + Copy + Default {
    /// The corresponding primitive type tag.
    const PRIMITIVE: PrimitiveType;

    /// Size of this type in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();
}

impl PlyPod for i8 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Int8;
}

impl PlyPod for u8 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Uint8;
}

impl PlyPod for i16 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Int16;
}

impl PlyPod for u16 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Uint16;
}

impl PlyPod for i32 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Int32;
}

impl PlyPod for u32 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Uint32;
}

impl PlyPod for f32 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Float32;
}

impl PlyPod for f64 {
    const PRIMITIVE: PrimitiveType = PrimitiveType::Float64;
}
