//! Binary body codec.
//!
//! The body is the concatenation of every element's instances, in header
//! order, each instance holding its properties in header order. There is
//! no framing or random access, so every byte is read even when nothing
//! claims it. Payload bytes are copied as-is; byte order is fixed up once
//! per buffer after decoding (see [`super::format::swap_values`]).

use std::io::{self, BufRead, Read, Write};

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt};
use tracing::{instrument, trace};

use super::data::PlyData;
use super::format::swap_values;
use super::progress::ProgressReporter;
use super::request::SinkPlan;
use super::schema::{Element, Property};
use super::source::{resolve_bindings, Binding, SourceBuffer};
use crate::util::{Error, PrimitiveType, Result};

/// Rows of fixed-stride elements are read in chunks of about this size.
const READ_CHUNK: usize = 64 * 1024;

// ============================================================================
// Decode
// ============================================================================

/// Decode a binary body into the buffers claimed by `plan`.
#[instrument(skip_all, fields(elements = elements.len()))]
pub(crate) fn decode_body<E: ByteOrder, R: BufRead>(
    reader: &mut R,
    elements: &[Element],
    plan: &SinkPlan,
    buffers: &mut [PlyData],
    progress: &mut ProgressReporter<'_>,
) -> Result<()> {
    let mut body = BodyReader {
        inner: reader,
        progress,
    };
    let mut scratch = Vec::new();

    for (ei, element) in elements.iter().enumerate() {
        trace!(element = %element.name, count = element.count, "decoding element");
        match element.fixed_stride() {
            Some(0) => {}
            Some(stride) if plan.element_unclaimed(ei) => {
                // A count past what any stream holds still ends in EOF.
                body.skip((element.count as u64).saturating_mul(stride as u64))?;
            }
            Some(stride) => decode_fixed(&mut body, ei, element, stride, plan, buffers)?,
            None => decode_variable::<E, R>(&mut body, ei, element, plan, buffers, &mut scratch)?,
        }
    }
    Ok(())
}

/// Elements without lists: read whole rows, then scatter fields.
fn decode_fixed<R: BufRead>(
    body: &mut BodyReader<'_, '_, R>,
    ei: usize,
    element: &Element,
    stride: usize,
    plan: &SinkPlan,
    buffers: &mut [PlyData],
) -> Result<()> {
    // (offset in row, width, sinks) for every claimed property
    let mut fields = Vec::new();
    let mut offset = 0;
    for (pi, p) in element.properties.iter().enumerate() {
        let width = p.ty.num_bytes();
        let sinks = plan.sinks(ei, pi);
        if !sinks.is_empty() {
            fields.push((offset, width, sinks));
        }
        offset += width;
    }

    let rows_per_chunk = (READ_CHUNK / stride).max(1);
    let mut chunk = vec![0u8; rows_per_chunk * stride];
    let mut remaining = element.count;

    while remaining > 0 {
        let rows = remaining.min(rows_per_chunk);
        let bytes = &mut chunk[..rows * stride];
        body.read_exact(bytes)?;
        for row in bytes.chunks_exact(stride) {
            for &(offset, width, sinks) in &fields {
                let value = &row[offset..offset + width];
                for &s in sinks {
                    buffers[s].buffer.extend_from_slice(value);
                }
            }
        }
        remaining -= rows;
    }
    Ok(())
}

/// Elements with lists: walk property by property.
fn decode_variable<E: ByteOrder, R: BufRead>(
    body: &mut BodyReader<'_, '_, R>,
    ei: usize,
    element: &Element,
    plan: &SinkPlan,
    buffers: &mut [PlyData],
    scratch: &mut Vec<u8>,
) -> Result<()> {
    for _ in 0..element.count {
        for (pi, p) in element.properties.iter().enumerate() {
            let sinks = plan.sinks(ei, pi);
            let width = p.ty.num_bytes();
            if p.is_list() {
                let n = body.read_length::<E>(p)?;
                body.copy_to_sinks(n * width, sinks, buffers, scratch)?;
                for &s in sinks {
                    buffers[s].list_lengths.push(n as u32);
                }
            } else {
                body.copy_to_sinks(width, sinks, buffers, scratch)?;
            }
        }
    }
    Ok(())
}

/// Sequential body reader that keeps the progress count.
struct BodyReader<'a, 'p, R> {
    inner: &'a mut R,
    progress: &'a mut ProgressReporter<'p>,
}

impl<R: BufRead> BodyReader<'_, '_, R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| Error::from_read(e, self.progress.consumed()))?;
        self.progress.advance(buf.len() as u64);
        Ok(())
    }

    /// Consume `n` bytes without storing them.
    fn skip(&mut self, n: u64) -> Result<()> {
        let copied = io::copy(&mut self.inner.by_ref().take(n), &mut io::sink())
            .map_err(|e| Error::from_read(e, self.progress.consumed()))?;
        self.progress.advance(copied);
        if copied < n {
            return Err(Error::UnexpectedEndOfStream(self.progress.consumed()));
        }
        Ok(())
    }

    /// Append `len` bytes to `buf` in one contiguous move.
    fn append(&mut self, buf: &mut Vec<u8>, len: usize) -> Result<()> {
        if len <= READ_CHUNK {
            let start = buf.len();
            buf.resize(start + len, 0);
            return self.read_exact(&mut buf[start..]);
        }
        // Let the vector grow with the data actually present, so a corrupt
        // length cannot force a huge allocation up front.
        let got = self
            .inner
            .by_ref()
            .take(len as u64)
            .read_to_end(buf)
            .map_err(|e| Error::from_read(e, self.progress.consumed()))?;
        self.progress.advance(got as u64);
        if got < len {
            return Err(Error::UnexpectedEndOfStream(self.progress.consumed()));
        }
        Ok(())
    }

    /// Route `len` bytes to every sink, or discard them if there are none.
    fn copy_to_sinks(
        &mut self,
        len: usize,
        sinks: &[usize],
        buffers: &mut [PlyData],
        scratch: &mut Vec<u8>,
    ) -> Result<()> {
        let Some((&first, rest)) = sinks.split_first() else {
            return self.skip(len as u64);
        };
        let start = buffers[first].buffer.len();
        self.append(&mut buffers[first].buffer, len)?;
        if !rest.is_empty() {
            scratch.clear();
            scratch.extend_from_slice(&buffers[first].buffer[start..]);
            for &s in rest {
                buffers[s].buffer.extend_from_slice(scratch);
            }
        }
        Ok(())
    }

    /// Read a list length prefix of the property's length type.
    fn read_length<E: ByteOrder>(&mut self, p: &Property) -> Result<usize> {
        let at = self.progress.consumed();
        let r = &mut *self.inner;
        let value = match p.list_type {
            PrimitiveType::Int8 => r.read_i8().map(i64::from),
            PrimitiveType::Uint8 => r.read_u8().map(i64::from),
            PrimitiveType::Int16 => r.read_i16::<E>().map(i64::from),
            PrimitiveType::Uint16 => r.read_u16::<E>().map(i64::from),
            PrimitiveType::Int32 => r.read_i32::<E>().map(i64::from),
            PrimitiveType::Uint32 => r.read_u32::<E>().map(i64::from),
            other => {
                return Err(Error::InvalidListLengthType {
                    property: p.name.clone(),
                    ty: other.name().to_string(),
                })
            }
        }
        .map_err(|e| Error::from_read(e, at))?;
        self.progress.advance(p.list_type.num_bytes() as u64);

        if value < 0 {
            return Err(Error::InvalidListLength {
                property: p.name.clone(),
                length: value,
            });
        }
        Ok(value as usize)
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Encode every element from its bound sources. Returns bytes written.
#[instrument(skip_all, fields(elements = elements.len()))]
pub(crate) fn encode_body<E: ByteOrder, W: Write>(
    writer: &mut W,
    elements: &[Element],
    bindings: &[Vec<Option<Binding>>],
    sources: &[SourceBuffer],
    swap: bool,
) -> Result<u64> {
    let mut out = CountingWriter {
        inner: writer,
        written: 0,
    };
    let mut scratch = Vec::new();

    for (ei, element) in elements.iter().enumerate() {
        trace!(element = %element.name, count = element.count, "encoding element");
        if element.properties.is_empty() {
            continue;
        }
        let bound = resolve_bindings(element, bindings.get(ei).map_or(&[][..], Vec::as_slice))?;

        if let Some(source) = whole_source(element, &bound, sources) {
            if !swap {
                out.write_all(source.bytes())?;
                continue;
            }
        }

        for i in 0..element.count {
            for (p, b) in element.properties.iter().zip(&bound) {
                let source = &sources[b.source];
                let width = p.ty.num_bytes();
                if p.is_list() {
                    let (n, payload) = source.list_value(i);
                    write_length::<E, _>(&mut out, p.list_type, n)?;
                    out.write_values(payload, width, swap, &mut scratch)?;
                } else {
                    out.write_values(source.scalar_value(i, b.field), width, swap, &mut scratch)?;
                }
            }
        }
    }
    Ok(out.written)
}

/// The single source whose bytes are exactly this element's body, if any.
fn whole_source<'s>(
    element: &Element,
    bound: &[Binding],
    sources: &'s [SourceBuffer],
) -> Option<&'s SourceBuffer> {
    let stride = element.fixed_stride()?;
    let first = bound.first()?;
    let in_order = bound
        .iter()
        .enumerate()
        .all(|(i, b)| b.source == first.source && b.field == i);
    let source = &sources[first.source];
    (in_order && source.stride() == stride).then_some(source)
}

fn write_length<E: ByteOrder, W: Write>(out: &mut W, ty: PrimitiveType, n: u32) -> Result<()> {
    match ty {
        PrimitiveType::Int8 => out.write_i8(n as i8),
        PrimitiveType::Uint8 => out.write_u8(n as u8),
        PrimitiveType::Int16 => out.write_i16::<E>(n as i16),
        PrimitiveType::Uint16 => out.write_u16::<E>(n as u16),
        PrimitiveType::Int32 => out.write_i32::<E>(n as i32),
        PrimitiveType::Uint32 => out.write_u32::<E>(n),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a list length type", other),
        )),
    }
    .map_err(Error::StreamWriteFailure)
}

/// Writer that counts bytes and maps failures to `StreamWriteFailure`.
struct CountingWriter<'a, W> {
    inner: &'a mut W,
    written: u64,
}

impl<W: Write> CountingWriter<'_, W> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(Error::StreamWriteFailure)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Write host-order values, swapping into file order when needed.
    fn write_values(&mut self, bytes: &[u8], width: usize, swap: bool, scratch: &mut Vec<u8>) -> Result<()> {
        if !swap || width < 2 {
            return self.write_all(bytes);
        }
        scratch.clear();
        scratch.extend_from_slice(bytes);
        swap_values(scratch, width);
        self.inner.write_all(scratch).map_err(Error::StreamWriteFailure)?;
        self.written += scratch.len() as u64;
        Ok(())
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
