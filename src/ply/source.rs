//! Caller-supplied buffers bound to properties for encoding.

use super::schema::Element;
use crate::util::{Error, PrimitiveType, Result};

/// One buffer passed to `add_properties_to_element`.
#[derive(Clone, Debug)]
pub(crate) struct SourceBuffer {
    data: Vec<u8>,
    ty: PrimitiveType,
    /// Bytes per instance (scalar sources).
    stride: usize,
    /// Per-instance list lengths (list sources).
    list_lengths: Vec<u32>,
    /// Byte offset of each instance's list payload.
    list_offsets: Vec<usize>,
}

impl SourceBuffer {
    /// Scalar source holding `fields` interleaved properties per instance.
    pub fn scalar(
        element: &str,
        data: Vec<u8>,
        ty: PrimitiveType,
        fields: usize,
        count: usize,
    ) -> Result<Self> {
        let stride = fields * ty.num_bytes();
        check_size(element, count.checked_mul(stride).unwrap_or(usize::MAX), data.len())?;
        Ok(Self {
            data,
            ty,
            stride,
            list_lengths: Vec::new(),
            list_offsets: Vec::new(),
        })
    }

    /// List source with explicit per-instance lengths.
    pub fn list(
        element: &str,
        property: &str,
        data: Vec<u8>,
        ty: PrimitiveType,
        list_type: PrimitiveType,
        list_lengths: Vec<u32>,
    ) -> Result<Self> {
        let max = max_list_length(list_type);
        if let Some(&bad) = list_lengths.iter().find(|&&n| u64::from(n) > max) {
            return Err(Error::InvalidListLength {
                property: property.to_string(),
                length: i64::from(bad),
            });
        }

        let width = ty.num_bytes();
        let mut list_offsets = Vec::with_capacity(list_lengths.len());
        let mut offset = 0usize;
        for &n in &list_lengths {
            list_offsets.push(offset);
            offset += n as usize * width;
        }
        check_size(element, offset, data.len())?;

        Ok(Self {
            data,
            ty,
            stride: 0,
            list_lengths,
            list_offsets,
        })
    }

    /// Bytes per instance (zero for list sources).
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// All bytes of the source.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of field `field` of scalar instance `instance`.
    #[inline]
    pub fn scalar_value(&self, instance: usize, field: usize) -> &[u8] {
        let width = self.ty.num_bytes();
        let start = instance * self.stride + field * width;
        &self.data[start..start + width]
    }

    /// Length and payload of list instance `instance`.
    #[inline]
    pub fn list_value(&self, instance: usize) -> (u32, &[u8]) {
        let n = self.list_lengths[instance];
        let start = self.list_offsets[instance];
        (n, &self.data[start..start + n as usize * self.ty.num_bytes()])
    }
}

/// Location of a property's values inside the source buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    pub source: usize,
    pub field: usize,
}

/// Bindings of every property of an element, failing on the first gap.
pub(crate) fn resolve_bindings(element: &Element, bindings: &[Option<Binding>]) -> Result<Vec<Binding>> {
    element
        .properties
        .iter()
        .enumerate()
        .map(|(pi, p)| {
            bindings.get(pi).copied().flatten().ok_or_else(|| Error::MissingPropertyData {
                element: element.name.clone(),
                property: p.name.clone(),
            })
        })
        .collect()
}

/// Largest length representable by an integer list-length type.
pub(crate) fn max_list_length(list_type: PrimitiveType) -> u64 {
    match list_type {
        PrimitiveType::Int8 => i8::MAX as u64,
        PrimitiveType::Uint8 => u8::MAX as u64,
        PrimitiveType::Int16 => i16::MAX as u64,
        PrimitiveType::Uint16 => u16::MAX as u64,
        PrimitiveType::Int32 => i32::MAX as u64,
        PrimitiveType::Uint32 => u32::MAX as u64,
        _ => 0,
    }
}

fn check_size(element: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::BufferSizeMismatch {
            element: element.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ply::data::to_bytes;

    #[test]
    fn test_scalar_fields() {
        let src = SourceBuffer::scalar(
            "vertex",
            to_bytes(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]),
            PrimitiveType::Float32,
            3,
            2,
        )
        .unwrap();
        assert_eq!(src.scalar_value(1, 2), &6.0f32.to_ne_bytes());
        assert_eq!(src.scalar_value(0, 1), &2.0f32.to_ne_bytes());
    }

    #[test]
    fn test_scalar_size_checked() {
        let err = SourceBuffer::scalar("vertex", vec![0; 10], PrimitiveType::Float32, 3, 1).unwrap_err();
        assert!(matches!(err, Error::BufferSizeMismatch { expected: 12, actual: 10, .. }));
    }

    #[test]
    fn test_list_offsets() {
        let src = SourceBuffer::list(
            "face",
            "vertex_indices",
            to_bytes(&[0u16, 1, 2, 3, 4]),
            PrimitiveType::Uint16,
            PrimitiveType::Uint8,
            vec![2, 0, 3],
        )
        .unwrap();
        let (n, bytes) = src.list_value(2);
        assert_eq!(n, 3);
        assert_eq!(bytes, to_bytes(&[2u16, 3, 4]).as_slice());
        assert_eq!(src.list_value(1).0, 0);
    }

    #[test]
    fn test_list_length_must_fit_type() {
        let err = SourceBuffer::list(
            "face",
            "vi",
            vec![0; 300],
            PrimitiveType::Uint8,
            PrimitiveType::Uint8,
            vec![300],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidListLength { length: 300, .. }));
        assert_eq!(max_list_length(PrimitiveType::Int16), 32767);
    }

    #[test]
    fn test_resolve_bindings_reports_gap() {
        let mut e = Element::new("vertex", 1);
        e.properties.push(crate::ply::schema::Property::scalar("x", PrimitiveType::Float32));
        e.properties.push(crate::ply::schema::Property::scalar("y", PrimitiveType::Float32));
        let bound = [Some(Binding { source: 0, field: 0 })];
        let err = resolve_bindings(&e, &bound).unwrap_err();
        assert!(matches!(err, Error::MissingPropertyData { ref property, .. } if property == "y"));
    }
}
