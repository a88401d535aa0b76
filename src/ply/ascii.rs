//! ASCII body codec.
//!
//! Same logical layout as the binary body, but every value is a text token
//! separated by whitespace. Line breaks carry no meaning on decode; the
//! encoder writes one line per element instance.

use std::fmt::{self, Write as _};
use std::io::{BufRead, Write};
use std::ops::Range;
use std::str::FromStr;

use tracing::{instrument, trace};

use super::data::PlyData;
use super::progress::ProgressReporter;
use super::request::SinkPlan;
use super::schema::{Element, Property};
use super::source::{resolve_bindings, Binding, SourceBuffer};
use crate::util::{Error, PrimitiveType, Result};

/// Text used in errors when the body runs out of tokens.
const END_OF_STREAM: &str = "<end of stream>";

// ============================================================================
// Decode
// ============================================================================

/// Decode an ASCII body into the buffers claimed by `plan`.
///
/// Every token is parsed, claimed or not, so a malformed value anywhere in
/// the body fails the read.
#[instrument(skip_all, fields(elements = elements.len()))]
pub(crate) fn decode_body<R: BufRead>(
    reader: &mut R,
    elements: &[Element],
    plan: &SinkPlan,
    buffers: &mut [PlyData],
    progress: &mut ProgressReporter<'_>,
) -> Result<()> {
    let mut tokens = Tokens {
        reader,
        progress,
        raw: Vec::new(),
        line: String::new(),
        pos: 0,
        index: 0,
    };
    let mut value = [0u8; 8];

    for (ei, element) in elements.iter().enumerate() {
        trace!(element = %element.name, count = element.count, "decoding element");
        if element.properties.is_empty() {
            continue;
        }
        for _ in 0..element.count {
            for (pi, p) in element.properties.iter().enumerate() {
                let sinks = plan.sinks(ei, pi);
                if p.is_list() {
                    let n = tokens.read_length(p)?;
                    for _ in 0..n {
                        let width = tokens.read_value(p.ty, &mut value)?;
                        for &s in sinks {
                            buffers[s].buffer.extend_from_slice(&value[..width]);
                        }
                    }
                    for &s in sinks {
                        buffers[s].list_lengths.push(n);
                    }
                } else {
                    let width = tokens.read_value(p.ty, &mut value)?;
                    for &s in sinks {
                        buffers[s].buffer.extend_from_slice(&value[..width]);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Whitespace tokenizer over a line reader.
struct Tokens<'a, 'p, R> {
    reader: &'a mut R,
    progress: &'a mut ProgressReporter<'p>,
    /// Bytes of the current line before UTF-8 validation.
    raw: Vec<u8>,
    line: String,
    /// Byte position of the next unread character in `line`.
    pos: usize,
    /// Number of tokens handed out so far.
    index: u64,
}

impl<R: BufRead> Tokens<'_, '_, R> {
    /// Range of the next token in `self.line`, reading lines as needed.
    fn next_range(&mut self, expected: PrimitiveType) -> Result<Option<Range<usize>>> {
        loop {
            let rest = &self.line[self.pos..];
            let trimmed = rest.trim_start();
            if !trimmed.is_empty() {
                let start = self.pos + (rest.len() - trimmed.len());
                let len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
                self.pos = start + len;
                self.index += 1;
                return Ok(Some(start..start + len));
            }

            self.line.clear();
            self.raw.clear();
            self.pos = 0;
            let n = self
                .reader
                .read_until(b'\n', &mut self.raw)
                .map_err(|e| Error::from_read(e, self.progress.consumed()))?;
            if n == 0 {
                return Ok(None);
            }
            self.progress.advance(n as u64);
            match std::str::from_utf8(&self.raw) {
                Ok(text) => self.line.push_str(text),
                Err(_) => {
                    return Err(Error::TruncatedOrMalformedAsciiBody {
                        token: self.index + 1,
                        text: String::from_utf8_lossy(&self.raw).trim_end().to_string(),
                        expected: expected.to_string(),
                    })
                }
            }
        }
    }

    /// Parse the next token as `T`, reporting failures against `expected`.
    fn parse<T: FromStr>(&mut self, expected: PrimitiveType) -> Result<T> {
        let Some(range) = self.next_range(expected)? else {
            return Err(Error::TruncatedOrMalformedAsciiBody {
                token: self.index + 1,
                text: END_OF_STREAM.to_string(),
                expected: expected.to_string(),
            });
        };
        let text = &self.line[range];
        text.parse::<T>()
            .map_err(|_| Error::TruncatedOrMalformedAsciiBody {
                token: self.index,
                text: text.to_string(),
                expected: expected.to_string(),
            })
    }

    /// Parse one value into `out` as host-order bytes; returns its width.
    fn read_value(&mut self, ty: PrimitiveType, out: &mut [u8; 8]) -> Result<usize> {
        let width = ty.num_bytes();
        let dst = &mut out[..width];
        match ty {
            PrimitiveType::Int8 => dst.copy_from_slice(&self.parse::<i8>(ty)?.to_ne_bytes()),
            PrimitiveType::Uint8 => dst.copy_from_slice(&self.parse::<u8>(ty)?.to_ne_bytes()),
            PrimitiveType::Int16 => dst.copy_from_slice(&self.parse::<i16>(ty)?.to_ne_bytes()),
            PrimitiveType::Uint16 => dst.copy_from_slice(&self.parse::<u16>(ty)?.to_ne_bytes()),
            PrimitiveType::Int32 => dst.copy_from_slice(&self.parse::<i32>(ty)?.to_ne_bytes()),
            PrimitiveType::Uint32 => dst.copy_from_slice(&self.parse::<u32>(ty)?.to_ne_bytes()),
            PrimitiveType::Float32 => dst.copy_from_slice(&self.parse::<f32>(ty)?.to_ne_bytes()),
            PrimitiveType::Float64 => dst.copy_from_slice(&self.parse::<f64>(ty)?.to_ne_bytes()),
            PrimitiveType::Invalid => return Err(Error::UnknownType(ty.name().to_string())),
        }
        Ok(width)
    }

    /// Parse a list length token as the property's length type.
    fn read_length(&mut self, p: &Property) -> Result<u32> {
        let ty = p.list_type;
        let value = match ty {
            PrimitiveType::Int8 => i64::from(self.parse::<i8>(ty)?),
            PrimitiveType::Uint8 => i64::from(self.parse::<u8>(ty)?),
            PrimitiveType::Int16 => i64::from(self.parse::<i16>(ty)?),
            PrimitiveType::Uint16 => i64::from(self.parse::<u16>(ty)?),
            PrimitiveType::Int32 => i64::from(self.parse::<i32>(ty)?),
            PrimitiveType::Uint32 => i64::from(self.parse::<u32>(ty)?),
            other => {
                return Err(Error::InvalidListLengthType {
                    property: p.name.clone(),
                    ty: other.name().to_string(),
                })
            }
        };
        u32::try_from(value).map_err(|_| Error::InvalidListLength {
            property: p.name.clone(),
            length: value,
        })
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Encode every element as text, one line per instance. Returns bytes written.
#[instrument(skip_all, fields(elements = elements.len()))]
pub(crate) fn encode_body<W: Write>(
    writer: &mut W,
    elements: &[Element],
    bindings: &[Vec<Option<Binding>>],
    sources: &[SourceBuffer],
) -> Result<u64> {
    let mut written = 0u64;
    let mut line = String::new();

    for (ei, element) in elements.iter().enumerate() {
        trace!(element = %element.name, count = element.count, "encoding element");
        if element.properties.is_empty() {
            continue;
        }
        let bound = resolve_bindings(element, bindings.get(ei).map_or(&[][..], Vec::as_slice))?;

        for i in 0..element.count {
            line.clear();
            for (p, b) in element.properties.iter().zip(&bound) {
                let source = &sources[b.source];
                let width = p.ty.num_bytes();
                if p.is_list() {
                    let (n, payload) = source.list_value(i);
                    push_token(&mut line, format_args!("{}", n));
                    for v in payload.chunks_exact(width) {
                        push_value(&mut line, p.ty, v);
                    }
                } else {
                    push_value(&mut line, p.ty, source.scalar_value(i, b.field));
                }
            }
            line.push('\n');
            writer
                .write_all(line.as_bytes())
                .map_err(Error::StreamWriteFailure)?;
            written += line.len() as u64;
        }
    }
    Ok(written)
}

/// Append a token, separated from the previous one by a single space.
fn push_token(line: &mut String, token: fmt::Arguments<'_>) {
    if !line.is_empty() {
        line.push(' ');
    }
    // Writing into a String cannot fail
    let _ = line.write_fmt(token);
}

/// Append one host-order value of type `ty` as text.
fn push_value(line: &mut String, ty: PrimitiveType, v: &[u8]) {
    match ty {
        PrimitiveType::Int8 => push_token(line, format_args!("{}", i8::from_ne_bytes([v[0]]))),
        PrimitiveType::Uint8 => push_token(line, format_args!("{}", v[0])),
        PrimitiveType::Int16 => push_token(line, format_args!("{}", i16::from_ne_bytes([v[0], v[1]]))),
        PrimitiveType::Uint16 => push_token(line, format_args!("{}", u16::from_ne_bytes([v[0], v[1]]))),
        PrimitiveType::Int32 => {
            push_token(line, format_args!("{}", i32::from_ne_bytes([v[0], v[1], v[2], v[3]])))
        }
        PrimitiveType::Uint32 => {
            push_token(line, format_args!("{}", u32::from_ne_bytes([v[0], v[1], v[2], v[3]])))
        }
        PrimitiveType::Float32 => {
            let f = f32::from_ne_bytes([v[0], v[1], v[2], v[3]]);
            push_float(line, f, f64::from(f));
        }
        PrimitiveType::Float64 => {
            let f = f64::from_ne_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
            push_float(line, f, f);
        }
        PrimitiveType::Invalid => {}
    }
}

/// Shortest text that parses back to the same bits.
///
/// Very large and very small magnitudes switch to exponent notation to keep
/// tokens short.
fn push_float<T: fmt::Display + fmt::LowerExp>(line: &mut String, value: T, magnitude: f64) {
    let m = magnitude.abs();
    if m.is_finite() && m != 0.0 && !(1e-5..1e16).contains(&m) {
        push_token(line, format_args!("{:e}", value));
    } else {
        push_token(line, format_args!("{}", value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ply::data::to_bytes;
    use crate::ply::progress::ProgressInfo;
    use crate::ply::request::RequestRegistry;
    use std::io::Cursor;

    fn schema() -> Vec<Element> {
        let mut vertex = Element::new("vertex", 2);
        for name in ["x", "y", "z"] {
            vertex.properties.push(Property::scalar(name, PrimitiveType::Float32));
        }
        let mut face = Element::new("face", 2);
        face.properties.push(Property::list("vertex_indices", PrimitiveType::Uint8, PrimitiveType::Int32));
        face.properties.push(Property::scalar("material", PrimitiveType::Uint16));
        vec![vertex, face]
    }

    fn decode(text: &str, elements: &[Element], requests: &[(&str, &[&str], usize)]) -> Result<Vec<PlyData>> {
        let mut reg = RequestRegistry::default();
        for &(e, props, hint) in requests {
            reg.request(elements, e, props, hint)?;
        }
        let plan = reg.plan(elements);
        let mut buffers = reg.take_buffers();
        let mut progress = ProgressReporter::silent(0);
        decode_body(&mut Cursor::new(text.as_bytes()), elements, &plan, &mut buffers, &mut progress)?;
        Ok(buffers)
    }

    const BODY: &str = "0 0.5 -1\n1e3 2 3\n3 0 1 2 7\n4 3 4\n 5 6 9\n";

    #[test]
    fn test_decode_scalars_and_lists() {
        let elements = schema();
        let buffers = decode(
            BODY,
            &elements,
            &[("vertex", &["x", "y", "z"], 0), ("face", &["vertex_indices"], 1), ("face", &["material"], 0)],
        )
        .unwrap();
        assert_eq!(buffers[0].to_vec::<f32>().unwrap(), vec![0.0, 0.5, -1.0, 1000.0, 2.0, 3.0]);
        // Hint of 1 is smaller than every list; data is still compact
        assert_eq!(buffers[1].list_lengths, vec![3, 4]);
        assert_eq!(buffers[1].to_vec::<i32>().unwrap(), vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(buffers[2].to_vec::<u16>().unwrap(), vec![7, 9]);
    }

    #[test]
    fn test_malformed_token() {
        let elements = schema();
        let err = decode("0 0 zero\n", &elements, &[]).unwrap_err();
        match err {
            Error::TruncatedOrMalformedAsciiBody { token, text, expected } => {
                assert_eq!(token, 3);
                assert_eq!(text, "zero");
                assert_eq!(expected, "float");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_utf8_is_malformed_body() {
        let mut vertex = Element::new("vertex", 2);
        vertex.properties.push(Property::scalar("x", PrimitiveType::Float32));
        let elements = vec![vertex];
        let plan = RequestRegistry::default().plan(&elements);
        let mut progress = ProgressReporter::silent(0);
        let body: &[u8] = b"2.5\n1\xff5\n";

        let err = decode_body(&mut Cursor::new(body), &elements, &plan, &mut [], &mut progress).unwrap_err();
        match err {
            Error::TruncatedOrMalformedAsciiBody { token, text, expected } => {
                assert_eq!(token, 2);
                assert_eq!(text, "1\u{fffd}5");
                assert_eq!(expected, "float");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_body() {
        let elements = schema();
        let err = decode("0 0 0\n1 1 1\n3 0 1\n", &elements, &[("vertex", &["x"], 0)]).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedOrMalformedAsciiBody { token: 10, ref text, .. } if text == END_OF_STREAM
        ));
    }

    #[test]
    fn test_integer_tokens_are_range_checked() {
        let elements = schema();
        let err = decode("0 0 0\n1 1 1\n300 0\n", &elements, &[]).unwrap_err();
        assert!(matches!(err, Error::TruncatedOrMalformedAsciiBody { ref text, .. } if text == "300"));
        let err = decode("0 0 0\n1 1 1\n1 2.5 0\n", &elements, &[]).unwrap_err();
        assert!(matches!(err, Error::TruncatedOrMalformedAsciiBody { ref text, .. } if text == "2.5"));
    }

    #[test]
    fn test_negative_list_length() {
        let mut e = Element::new("face", 1);
        e.properties.push(Property::list("vi", PrimitiveType::Int16, PrimitiveType::Int32));
        let err = decode("-2 0 0\n", &[e], &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidListLength { length: -2, .. }));
    }

    #[test]
    fn test_progress_counts_lines() {
        let elements = schema();
        let mut reg = RequestRegistry::default();
        reg.request(&elements, "vertex", &["x"], 0).unwrap();
        let plan = reg.plan(&elements);
        let mut buffers = reg.take_buffers();

        let mut seen = Vec::new();
        let mut cb = |info: ProgressInfo| seen.push(info.current_bytes);
        {
            let cb: &mut dyn FnMut(ProgressInfo) = &mut cb;
            let mut progress = ProgressReporter::new(Some(cb), 16, 0, BODY.len() as u64);
            decode_body(&mut Cursor::new(BODY.as_bytes()), &elements, &plan, &mut buffers, &mut progress).unwrap();
            assert_eq!(progress.consumed(), BODY.len() as u64);
        }
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_encode_lines() {
        let elements = schema();
        let sources = vec![
            SourceBuffer::scalar("vertex", to_bytes(&[0.0f32, 0.5, -1.0, 1000.0, 2.0, 3.0]), PrimitiveType::Float32, 3, 2)
                .unwrap(),
            SourceBuffer::list(
                "face",
                "vertex_indices",
                to_bytes(&[0i32, 1, 2, 3, 4, 5, 6]),
                PrimitiveType::Int32,
                PrimitiveType::Uint8,
                vec![3, 4],
            )
            .unwrap(),
            SourceBuffer::scalar("face", to_bytes(&[7u16, 9]), PrimitiveType::Uint16, 1, 2).unwrap(),
        ];
        let bindings = vec![
            (0..3).map(|f| Some(Binding { source: 0, field: f })).collect(),
            vec![Some(Binding { source: 1, field: 0 }), Some(Binding { source: 2, field: 0 })],
        ];
        let mut out = Vec::new();
        let n = encode_body(&mut out, &elements, &bindings, &sources).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(n as usize, text.len());
        assert_eq!(text, "0 0.5 -1\n1000 2 3\n3 0 1 2 7\n4 3 4 5 6 9\n");
    }

    #[test]
    fn test_float_text_reproduces_bits() {
        let values = [0.1f32, 1e30, -0.0, f32::MIN_POSITIVE, 123456.79, f32::MAX, 3e-6, f32::INFINITY];
        let mut line = String::new();
        for v in values {
            push_value(&mut line, PrimitiveType::Float32, &v.to_ne_bytes());
        }
        let parsed: Vec<f32> = line.split(' ').map(|t| t.parse().unwrap()).collect();
        for (a, b) in values.iter().zip(&parsed) {
            assert_eq!(a.to_bits(), b.to_bits(), "{line}");
        }

        let doubles = [std::f64::consts::PI, 1e-300, 2.5e17];
        line.clear();
        for v in doubles {
            push_value(&mut line, PrimitiveType::Float64, &v.to_ne_bytes());
        }
        let parsed: Vec<f64> = line.split(' ').map(|t| t.parse().unwrap()).collect();
        assert_eq!(parsed, doubles);
    }
}
