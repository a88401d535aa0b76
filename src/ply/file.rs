//! The `PlyFile` handle.
//!
//! One handle serves one lifecycle: either parse a header, register
//! requests and decode the body once, or declare elements from caller
//! buffers and write them out.

use std::io::{BufRead, BufWriter, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian};
use tracing::debug;

use super::ascii;
use super::binary;
use super::format::{swap_values, Encoding};
use super::header::Header;
use super::progress::{ProgressCallback, ProgressInfo, ProgressReporter};
use super::request::{PlyBuffers, RequestId, RequestRegistry};
use super::schema::{element_index, Element, Property};
use super::source::{resolve_bindings, Binding, SourceBuffer};
use crate::util::{Error, PrimitiveType, Result};

/// Reader and writer handle for one PLY stream.
///
/// # Reading
///
/// ```ignore
/// let mut reader = std::io::BufReader::new(std::fs::File::open("mesh.ply")?);
/// let mut ply = PlyFile::parse_header(&mut reader)?;
/// let verts = ply.request_properties("vertex", &["x", "y", "z"], 0)?;
/// let faces = ply.request_properties("face", &["vertex_indices"], 3)?;
/// let mut buffers = ply.read(&mut reader)?;
/// let positions: Vec<f32> = buffers.take(verts).unwrap().to_vec()?;
/// ```
///
/// # Writing
///
/// ```ignore
/// let mut ply = PlyFile::new();
/// ply.add_properties_to_element("vertex", &["x", "y", "z"], PrimitiveType::Float32,
///     count, to_bytes(&positions), PrimitiveType::Invalid, 0)?;
/// ply.write(&mut out, true)?;
/// ```
#[derive(Default)]
pub struct PlyFile {
    header: Header,
    header_size: u64,
    requests: RequestRegistry,
    decoded: bool,
    progress: Option<(u64, ProgressCallback)>,
    sources: Vec<SourceBuffer>,
    /// Source binding of every (element, property), parallel to the schema.
    bindings: Vec<Vec<Option<Binding>>>,
}

impl PlyFile {
    /// Create an empty handle for writing.
    pub fn new() -> Self {
        Self {
            header: Header::new(Encoding::default()),
            ..Self::default()
        }
    }

    /// Parse the header of a stream.
    ///
    /// The reader is left at the first body byte, ready for [`PlyFile::read`].
    pub fn parse_header<R: BufRead>(reader: &mut R) -> Result<Self> {
        let (header, header_size) = Header::parse(reader)?;
        Ok(Self {
            header,
            header_size,
            ..Self::default()
        })
    }

    // ------------------------------------------------------------------------
    // Header accessors
    // ------------------------------------------------------------------------

    /// The parsed or declared header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Size of the parsed header in bytes (0 for handles built for writing).
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Elements in declaration order.
    pub fn elements(&self) -> &[Element] {
        &self.header.elements
    }

    /// Find an element by name.
    pub fn element(&self, name: &str) -> Option<&Element> {
        element_index(&self.header.elements, name).map(|i| &self.header.elements[i])
    }

    /// Comment lines.
    pub fn comments(&self) -> &[String] {
        &self.header.comments
    }

    /// Comment lines, for editing before a write.
    pub fn comments_mut(&mut self) -> &mut Vec<String> {
        &mut self.header.comments
    }

    /// Object info lines.
    pub fn info(&self) -> &[String] {
        &self.header.info
    }

    /// Object info lines, for editing before a write.
    pub fn info_mut(&mut self) -> &mut Vec<String> {
        &mut self.header.info
    }

    /// Body encoding declared by the header.
    pub fn encoding(&self) -> Encoding {
        self.header.encoding
    }

    /// Returns true if the body is binary.
    pub fn is_binary(&self) -> bool {
        self.header.encoding.is_binary()
    }

    /// Version token of the format line.
    pub fn version(&self) -> &str {
        &self.header.version
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Register a request for some properties of one element.
    ///
    /// The properties must be all scalar with one shared type, or exactly
    /// one list property. `list_size_hint` is the expected length of each
    /// list; it only sizes the initial allocation. A failed request leaves
    /// the handle usable for other requests.
    pub fn request_properties(
        &mut self,
        element: &str,
        properties: &[&str],
        list_size_hint: usize,
    ) -> Result<RequestId> {
        if self.decoded {
            return Err(Error::BodyAlreadyDecoded);
        }
        self.requests
            .request(&self.header.elements, element, properties, list_size_hint)
    }

    /// Call `callback` every time decoding crosses a multiple of
    /// `granularity` bytes.
    pub fn set_progress_callback<F>(&mut self, granularity: u64, callback: F)
    where
        F: FnMut(ProgressInfo) + 'static,
    {
        self.progress = Some((granularity.max(1), Box::new(callback)));
    }

    /// Remove the progress callback.
    pub fn clear_progress_callback(&mut self) {
        self.progress = None;
    }

    /// Decode the body, filling every registered request.
    ///
    /// The stream length is taken from `reader` for progress reporting.
    pub fn read<R: BufRead + Seek>(&mut self, reader: &mut R) -> Result<PlyBuffers> {
        let body_start = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(body_start))?;
        let total = self.header_size + end.saturating_sub(body_start);
        self.read_stream(reader, total)
    }

    /// Decode the body from a non-seekable stream.
    ///
    /// `total_bytes` is only passed through to the progress callback.
    pub fn read_stream<R: BufRead>(&mut self, reader: &mut R, total_bytes: u64) -> Result<PlyBuffers> {
        if self.decoded {
            return Err(Error::BodyAlreadyDecoded);
        }
        self.decoded = true;

        let elements = &self.header.elements;
        let plan = self.requests.plan(elements);
        let mut buffers = self.requests.take_buffers();
        debug!(
            encoding = %self.header.encoding,
            requests = buffers.len(),
            total_bytes,
            "decoding PLY body"
        );

        let mut progress = match self.progress.as_mut() {
            Some((granularity, callback)) => ProgressReporter::new(
                Some(&mut **callback),
                *granularity,
                self.header_size,
                total_bytes,
            ),
            None => ProgressReporter::silent(self.header_size),
        };

        match self.header.encoding {
            Encoding::Ascii => ascii::decode_body(reader, elements, &plan, &mut buffers, &mut progress)?,
            Encoding::BinaryLittleEndian => {
                binary::decode_body::<LittleEndian, _>(reader, elements, &plan, &mut buffers, &mut progress)?
            }
            Encoding::BinaryBigEndian => {
                binary::decode_body::<BigEndian, _>(reader, elements, &plan, &mut buffers, &mut progress)?
            }
        }

        if self.header.encoding.needs_swap() {
            for data in &mut buffers {
                swap_values(&mut data.buffer, data.ty.num_bytes());
            }
        }

        debug!(bytes = progress.consumed(), "decoded PLY body");
        Ok(PlyBuffers::new(buffers))
    }

    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    /// Declare properties of an element from a caller buffer.
    ///
    /// Scalar form (`list_type` is `Invalid`): `buffer` holds `count`
    /// instances of the named properties interleaved, all of type `ty`.
    ///
    /// List form: exactly one name; every instance holds `list_count`
    /// values of type `ty`, and lengths are written as `list_type`. Use
    /// [`PlyFile::add_list_property_to_element`] for varying lengths.
    ///
    /// The element is created on first use. Adding to an existing element
    /// requires the same `count`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_properties_to_element(
        &mut self,
        element: &str,
        properties: &[&str],
        ty: PrimitiveType,
        count: usize,
        buffer: impl Into<Vec<u8>>,
        list_type: PrimitiveType,
        list_count: usize,
    ) -> Result<()> {
        if list_type.is_valid() {
            let name = match properties {
                [name] => *name,
                [] => return Err(Error::EmptyRequest(element.to_string())),
                _ => return Err(Error::MixedPropertyKinds(element.to_string())),
            };
            let length = u32::try_from(list_count).map_err(|_| Error::InvalidListLength {
                property: name.to_string(),
                length: i64::try_from(list_count).unwrap_or(i64::MAX),
            })?;
            // Size first, so a bogus count never builds its lengths vector.
            let buffer: Vec<u8> = buffer.into();
            let expected = count.checked_mul(list_count).and_then(|n| n.checked_mul(ty.num_bytes()));
            if ty.is_valid() && expected != Some(buffer.len()) {
                return Err(Error::BufferSizeMismatch {
                    element: element.to_string(),
                    expected: expected.unwrap_or(usize::MAX),
                    actual: buffer.len(),
                });
            }
            return self.add_list_property_to_element(element, name, ty, buffer, list_type, vec![length; count]);
        }

        check_value_type(ty)?;
        if properties.is_empty() {
            return Err(Error::EmptyRequest(element.to_string()));
        }
        for (i, name) in properties.iter().enumerate() {
            if properties[..i].contains(name) {
                return Err(Error::DuplicatePropertyName {
                    element: element.to_string(),
                    property: name.to_string(),
                });
            }
        }
        let slot = self.check_element(element, count, properties)?;
        let source = SourceBuffer::scalar(element, buffer.into(), ty, properties.len(), count)?;

        let ei = self.ensure_element(slot, element, count);
        let si = self.push_source(source);
        for (field, name) in properties.iter().enumerate() {
            self.push_property(ei, Property::scalar(*name, ty), Binding { source: si, field });
        }
        debug!(element, properties = ?properties, ty = %ty, count, "added scalar properties");
        Ok(())
    }

    /// Declare one list property with per-instance lengths.
    ///
    /// `buffer` holds the concatenated list payloads; its size must equal
    /// `sum(list_lengths) * ty.num_bytes()`. The element instance count is
    /// `list_lengths.len()`.
    pub fn add_list_property_to_element(
        &mut self,
        element: &str,
        property: &str,
        ty: PrimitiveType,
        buffer: impl Into<Vec<u8>>,
        list_type: PrimitiveType,
        list_lengths: Vec<u32>,
    ) -> Result<()> {
        check_value_type(ty)?;
        if !list_type.is_integer() {
            return Err(Error::InvalidListLengthType {
                property: property.to_string(),
                ty: list_type.name().to_string(),
            });
        }
        let count = list_lengths.len();
        let slot = self.check_element(element, count, &[property])?;
        let source = SourceBuffer::list(element, property, buffer.into(), ty, list_type, list_lengths)?;

        let ei = self.ensure_element(slot, element, count);
        let si = self.push_source(source);
        self.push_property(ei, Property::list(property, list_type, ty), Binding { source: si, field: 0 });
        debug!(element, property, ty = %ty, list_type = %list_type, count, "added list property");
        Ok(())
    }

    /// Declare an element with no properties yet.
    ///
    /// Elements are written in the order they are first declared, so this
    /// also fixes the position of an element whose properties come later.
    /// Declaring an existing element again requires the same `count`.
    pub fn add_element(&mut self, element: &str, count: usize) -> Result<()> {
        let slot = self.check_element(element, count, &[])?;
        self.ensure_element(slot, element, count);
        Ok(())
    }

    /// Write the header and body.
    ///
    /// Binary output uses the host byte order. Returns the bytes written.
    pub fn write<W: Write>(&self, writer: &mut W, binary: bool) -> Result<u64> {
        let encoding = if binary {
            Encoding::NATIVE_BINARY
        } else {
            Encoding::Ascii
        };
        self.write_with_encoding(writer, encoding)
    }

    /// Write the header and body in an explicit encoding.
    ///
    /// Every declared property must have data; nothing is written otherwise.
    pub fn write_with_encoding<W: Write>(&self, writer: &mut W, encoding: Encoding) -> Result<u64> {
        let elements = &self.header.elements;
        for (ei, element) in elements.iter().enumerate() {
            resolve_bindings(element, self.element_bindings(ei))?;
        }

        let mut out = BufWriter::new(writer);
        let mut written = self.header.write(&mut out, encoding)?;
        written += match encoding {
            Encoding::Ascii => ascii::encode_body(&mut out, elements, &self.bindings, &self.sources)?,
            Encoding::BinaryLittleEndian => binary::encode_body::<LittleEndian, _>(
                &mut out,
                elements,
                &self.bindings,
                &self.sources,
                encoding.needs_swap(),
            )?,
            Encoding::BinaryBigEndian => binary::encode_body::<BigEndian, _>(
                &mut out,
                elements,
                &self.bindings,
                &self.sources,
                encoding.needs_swap(),
            )?,
        };
        out.flush().map_err(Error::StreamWriteFailure)?;

        debug!(encoding = %encoding, bytes = written, "wrote PLY stream");
        Ok(written)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn element_bindings(&self, ei: usize) -> &[Option<Binding>] {
        self.bindings.get(ei).map_or(&[][..], Vec::as_slice)
    }

    /// Validate an addition against the existing schema without changing it.
    fn check_element(&self, element: &str, count: usize, properties: &[&str]) -> Result<Option<usize>> {
        let Some(ei) = element_index(&self.header.elements, element) else {
            return Ok(None);
        };
        let existing = &self.header.elements[ei];
        if existing.count != count {
            return Err(Error::ElementCountMismatch {
                element: element.to_string(),
                existing: existing.count,
                given: count,
            });
        }
        if let Some(name) = properties.iter().find(|n| existing.property_index(n).is_some()) {
            return Err(Error::DuplicatePropertyName {
                element: element.to_string(),
                property: name.to_string(),
            });
        }
        Ok(Some(ei))
    }

    fn ensure_element(&mut self, slot: Option<usize>, element: &str, count: usize) -> usize {
        let ei = slot.unwrap_or_else(|| {
            self.header.elements.push(Element::new(element, count));
            self.header.elements.len() - 1
        });
        if self.bindings.len() < self.header.elements.len() {
            self.bindings.resize_with(self.header.elements.len(), Vec::new);
        }
        ei
    }

    fn push_source(&mut self, source: SourceBuffer) -> usize {
        self.sources.push(source);
        self.sources.len() - 1
    }

    fn push_property(&mut self, ei: usize, property: Property, binding: Binding) {
        let element = &mut self.header.elements[ei];
        element.properties.push(property);
        let bindings = &mut self.bindings[ei];
        bindings.resize(element.properties.len() - 1, None);
        bindings.push(Some(binding));
    }
}

impl std::fmt::Debug for PlyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlyFile")
            .field("header", &self.header)
            .field("header_size", &self.header_size)
            .field("requests", &self.requests.len())
            .field("decoded", &self.decoded)
            .field("sources", &self.sources.len())
            .finish()
    }
}

fn check_value_type(ty: PrimitiveType) -> Result<()> {
    if ty.is_valid() {
        Ok(())
    } else {
        Err(Error::UnknownType(ty.name().to_string()))
    }
}

#[cfg(test)]
mod tests;
