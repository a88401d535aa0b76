//! Utility types shared by the codec.
//!
//! - [`PrimitiveType`] - the type registry
//! - [`PlyPod`] - Rust types with a PLY representation
//! - [`Error`] / [`Result`] - error handling

mod pod;
mod error;

pub use pod::*;
pub use error::*;
