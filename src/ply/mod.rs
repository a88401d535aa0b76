//! PLY stream codec.
//!
//! A PLY stream is a text header describing named elements and their typed
//! properties, followed by a body in one of three encodings.
//!
//! ## Stream Structure
//!
//! ```text
//! +--------------------------------------+
//! | ply                                  |
//! | format <encoding> 1.0                |
//! | comment / obj_info ...               |
//! | element <name> <count>               |
//! |   property <type> <name>             |
//! |   property list <len> <type> <name>  |
//! | ...                                  |
//! | end_header                           |
//! +--------------------------------------+
//! | element 0: count x instance          |  instance = properties in
//! | element 1: count x instance          |  header order; a list is
//! | ...                                  |  <len> then len values
//! +--------------------------------------+
//! ```
//!
//! Reading: [`PlyFile::parse_header`], then [`PlyFile::request_properties`]
//! for the data you want, then one [`PlyFile::read`]. Writing:
//! [`PlyFile::add_properties_to_element`] per property group, then
//! [`PlyFile::write`].

mod format;
mod schema;
mod header;
mod data;
mod request;
mod source;
mod progress;
mod binary;
mod ascii;
mod file;

pub use format::*;
pub use schema::*;
pub use header::*;
pub use data::{to_bytes, Instances, PlyData};
pub use request::{PlyBuffers, RequestId};
pub use progress::{ProgressCallback, ProgressInfo};
pub use file::*;
