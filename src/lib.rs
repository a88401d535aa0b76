//! # plycodec
//!
//! Reader and writer for PLY (Polygon File Format) meshes.
//!
//! The codec moves typed byte buffers between caller code and a PLY
//! stream. It parses and emits the header, lets the caller request any
//! subset of properties, and decodes or encodes ASCII, binary
//! little-endian and binary big-endian bodies in a single pass.
//!
//! ## Modules
//!
//! - [`util`] - Type registry and errors
//! - [`ply`] - Header, request registry, body codecs and the file handle
//!
//! ## Example
//!
//! ```ignore
//! use plycodec::prelude::*;
//!
//! let mut reader = std::io::BufReader::new(std::fs::File::open("bunny.ply")?);
//! let mut ply = PlyFile::parse_header(&mut reader)?;
//! let verts = ply.request_properties("vertex", &["x", "y", "z"], 0)?;
//! let mut buffers = ply.read(&mut reader)?;
//!
//! let positions: Vec<[f32; 3]> = buffers.take(verts).unwrap().cast_vec()?;
//! ```

pub mod util;
pub mod ply;

// Re-export commonly used types
pub use util::{Error, PlyPod, PrimitiveType, Result};
pub use ply::{Encoding, PlyBuffers, PlyData, PlyFile, RequestId};

/// Crate version and build stamp, e.g. `plycodec 0.1.0 (built Oct 16 2026 09:30:00)`.
pub fn library_version() -> String {
    let date = option_env!("PLYCODEC_BUILD_DATE").unwrap_or("unknown");
    let time = option_env!("PLYCODEC_BUILD_TIME").unwrap_or("unknown");
    format!("plycodec {} (built {} {})", env!("CARGO_PKG_VERSION"), date, time)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, PlyPod, PrimitiveType, Result};
    pub use crate::ply::{to_bytes, Encoding, Element, PlyBuffers, PlyData, PlyFile, ProgressInfo, Property, RequestId};
}
