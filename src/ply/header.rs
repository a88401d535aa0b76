//! Header parsing and emission.
//!
//! The header is line oriented text ending with `end_header`:
//!
//! ```text
//! ply
//! format binary_little_endian 1.0
//! comment made by hand
//! element vertex 8
//! property float x
//! property float y
//! property float z
//! element face 6
//! property list uchar int vertex_indices
//! end_header
//! ```

use std::fmt::Write as _;
use std::io::{BufRead, Write};

use tracing::debug;

use super::format::*;
use super::schema::{Element, Property};
use crate::util::{Error, PrimitiveType, Result};

/// Parsed or caller-built PLY header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Body encoding.
    pub encoding: Encoding,
    /// Version token of the format line.
    pub version: String,
    /// Comment lines, without the `comment` keyword.
    pub comments: Vec<String>,
    /// Object info lines, without the `obj_info` keyword.
    pub info: Vec<String>,
    /// Elements in declaration order.
    pub elements: Vec<Element>,
}

impl Header {
    /// Create an empty header for writing.
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            version: FORMAT_VERSION.to_string(),
            ..Self::default()
        }
    }

    /// Parse a header, leaving `reader` positioned at the first body byte.
    ///
    /// Returns the header and the number of bytes consumed.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<(Self, u64)> {
        let mut lines = HeaderLines::new(reader);

        let magic = lines.next_line()?;
        if magic.trim() != PLY_MAGIC {
            return Err(Error::NotThisFormat);
        }

        let mut header = Header::default();
        let mut format_seen = false;

        loop {
            let line = lines.next_line()?;
            let line_no = lines.line_no;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(&keyword) = tokens.first() else {
                continue;
            };

            match keyword {
                FORMAT_KEYWORD => {
                    if format_seen {
                        return Err(Error::DuplicateFormatLine(line_no));
                    }
                    if tokens.len() != 3 {
                        return Err(Error::malformed(line_no, line.as_str()));
                    }
                    header.encoding = Encoding::from_name(tokens[1])
                        .ok_or_else(|| Error::malformed(line_no, line.as_str()))?;
                    header.version = tokens[2].to_string();
                    format_seen = true;
                }
                COMMENT_KEYWORD => header.comments.push(text_after_keyword(&line, keyword)),
                OBJ_INFO_KEYWORD => header.info.push(text_after_keyword(&line, keyword)),
                ELEMENT_KEYWORD => {
                    if tokens.len() != 3 {
                        return Err(Error::malformed(line_no, line.as_str()));
                    }
                    let count = tokens[2].parse::<usize>().map_err(|_| Error::InvalidElementCount {
                        element: tokens[1].to_string(),
                        count: tokens[2].to_string(),
                    })?;
                    header.elements.push(Element::new(tokens[1], count));
                }
                PROPERTY_KEYWORD => {
                    let property = parse_property(&tokens, line_no, &line)?;
                    let element = header
                        .elements
                        .last_mut()
                        .ok_or_else(|| Error::PropertyBeforeElement(property.name.clone()))?;
                    if element.property_index(&property.name).is_some() {
                        return Err(Error::DuplicatePropertyName {
                            element: element.name.clone(),
                            property: property.name,
                        });
                    }
                    element.properties.push(property);
                }
                END_HEADER if tokens.len() == 1 => break,
                _ => return Err(Error::malformed(line_no, line.as_str())),
            }
        }

        if !format_seen {
            return Err(Error::MissingFormatLine);
        }

        debug!(
            encoding = %header.encoding,
            elements = header.elements.len(),
            comments = header.comments.len(),
            bytes = lines.consumed,
            "parsed PLY header"
        );
        Ok((header, lines.consumed))
    }

    /// Render the header text, including the trailing `end_header` line.
    pub fn to_text(&self) -> String {
        self.render(self.encoding)
    }

    /// Render the header text with `encoding` on the format line.
    pub fn render(&self, encoding: Encoding) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = writeln!(out, "{}", PLY_MAGIC);
        let _ = writeln!(out, "{} {} {}", FORMAT_KEYWORD, encoding, self.version);
        for c in &self.comments {
            let _ = writeln!(out, "{} {}", COMMENT_KEYWORD, single_line(c));
        }
        for i in &self.info {
            let _ = writeln!(out, "{} {}", OBJ_INFO_KEYWORD, single_line(i));
        }
        for e in &self.elements {
            let _ = writeln!(out, "{} {} {}", ELEMENT_KEYWORD, e.name, e.count);
            for p in &e.properties {
                if p.is_list() {
                    let _ = writeln!(
                        out,
                        "{} {} {} {} {}",
                        PROPERTY_KEYWORD, LIST_KEYWORD, p.list_type, p.ty, p.name
                    );
                } else {
                    let _ = writeln!(out, "{} {} {}", PROPERTY_KEYWORD, p.ty, p.name);
                }
            }
        }
        let _ = writeln!(out, "{}", END_HEADER);
        out
    }

    /// Write the header text to a stream, announcing `encoding`.
    pub fn write<W: Write>(&self, writer: &mut W, encoding: Encoding) -> Result<u64> {
        let text = self.render(encoding);
        writer
            .write_all(text.as_bytes())
            .map_err(Error::StreamWriteFailure)?;
        Ok(text.len() as u64)
    }
}

/// Parse the tokens of a `property` line.
fn parse_property(tokens: &[&str], line_no: usize, line: &str) -> Result<Property> {
    match tokens {
        [_, LIST_KEYWORD, list_type, ty, name] => {
            let list_type = PrimitiveType::from_name(list_type)?;
            if !list_type.is_integer() {
                return Err(Error::InvalidListLengthType {
                    property: name.to_string(),
                    ty: list_type.name().to_string(),
                });
            }
            Ok(Property::list(*name, list_type, PrimitiveType::from_name(ty)?))
        }
        [_, ty, name] if *ty != LIST_KEYWORD => {
            Ok(Property::scalar(*name, PrimitiveType::from_name(ty)?))
        }
        _ => Err(Error::malformed(line_no, line)),
    }
}

/// Text following the keyword token, minus one separator.
fn text_after_keyword(line: &str, keyword: &str) -> String {
    let rest = line.trim_start();
    let rest = &rest[keyword.len()..];
    rest.strip_prefix([' ', '\t']).unwrap_or(rest).to_string()
}

/// Comments and info must not break the line structure of the header.
fn single_line(text: &str) -> std::borrow::Cow<'_, str> {
    if text.contains(['\n', '\r']) {
        text.replace(['\n', '\r'], " ").into()
    } else {
        text.into()
    }
}

/// Line reader that tracks line numbers and consumed bytes.
struct HeaderLines<'a, R> {
    reader: &'a mut R,
    buf: Vec<u8>,
    line_no: usize,
    consumed: u64,
}

impl<'a, R: BufRead> HeaderLines<'a, R> {
    fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(128),
            line_no: 0,
            consumed: 0,
        }
    }

    /// Next line without its terminator (`\n` or `\r\n`).
    fn next_line(&mut self) -> Result<String> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| Error::from_read(e, self.consumed))?;
        if n == 0 {
            return Err(Error::UnexpectedEndOfStream(self.consumed));
        }
        self.consumed += n as u64;
        self.line_no += 1;

        let mut bytes = self.buf.as_slice();
        while let [rest @ .., b'\n' | b'\r'] = bytes {
            bytes = rest;
        }
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(Error::malformed(
                self.line_no,
                String::from_utf8_lossy(bytes).into_owned(),
            )),
        }
    }
}
