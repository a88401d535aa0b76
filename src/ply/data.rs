//! Decoded property buffers.
//!
//! The codec only ever moves raw bytes. A [`PlyData`] is a byte buffer
//! tagged with the [`PrimitiveType`] of its values; typed views are
//! conversion helpers at the boundary.

use bytemuck::{NoUninit, Pod};

use crate::util::{Error, PlyPod, PrimitiveType, Result};

/// Upper bound on bytes reserved before any data is decoded. Buffers grow
/// past it as values arrive, so a corrupt header count cannot force a
/// huge allocation.
const MAX_RESERVE: usize = 16 * 1024 * 1024;

/// Capacity for the product of `factors`, clamped to [`MAX_RESERVE`].
/// Overflow means "no preallocation".
fn reserve(factors: &[usize]) -> usize {
    factors
        .iter()
        .try_fold(1usize, |acc, &f| acc.checked_mul(f))
        .map_or(0, |n| n.min(MAX_RESERVE))
}

/// Buffer produced for one property request.
///
/// Values are stored in host byte order. Scalar requests pack the
/// requested properties of each instance back to back, in header order.
/// List requests concatenate the list payloads of all instances with no
/// gaps; `list_lengths` records how many values each instance holds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlyData {
    /// Packed values.
    pub buffer: Vec<u8>,
    /// Number of element instances.
    pub count: usize,
    /// Type of every value in `buffer`.
    pub ty: PrimitiveType,
    /// Length prefix type for list data, `Invalid` for scalar data.
    pub list_type: PrimitiveType,
    /// Per-instance list lengths (list data only).
    pub list_lengths: Vec<u32>,
    /// Property names in buffer order.
    pub properties: Vec<String>,
}

impl PlyData {
    /// Empty scalar buffer with room for `count` instances.
    pub fn scalar(properties: Vec<String>, ty: PrimitiveType, count: usize) -> Self {
        let capacity = reserve(&[count, properties.len(), ty.num_bytes()]);
        Self {
            buffer: Vec::with_capacity(capacity),
            count,
            ty,
            list_type: PrimitiveType::Invalid,
            list_lengths: Vec::new(),
            properties,
        }
    }

    /// Empty list buffer; `hint` is the expected length of each list.
    pub fn list(
        property: String,
        list_type: PrimitiveType,
        ty: PrimitiveType,
        count: usize,
        hint: usize,
    ) -> Self {
        Self {
            buffer: Vec::with_capacity(reserve(&[count, hint, ty.num_bytes()])),
            count,
            ty,
            list_type,
            list_lengths: Vec::with_capacity(reserve(&[count, 4]) / 4),
            properties: vec![property],
        }
    }

    /// Returns true if this buffer holds list data.
    #[inline]
    pub fn is_list(&self) -> bool {
        self.list_type.is_valid()
    }

    /// Size of the packed data in bytes.
    #[inline]
    pub fn num_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes were decoded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of values in the buffer.
    #[inline]
    pub fn num_values(&self) -> usize {
        match self.ty.num_bytes() {
            0 => 0,
            w => self.buffer.len() / w,
        }
    }

    /// Bytes per instance of scalar data.
    #[inline]
    pub fn stride(&self) -> usize {
        self.properties.len() * self.ty.num_bytes()
    }

    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Per-instance byte slices.
    ///
    /// Scalar data yields fixed-size records; list data yields each
    /// instance's list payload.
    pub fn instances(&self) -> Instances<'_> {
        Instances {
            data: self,
            index: 0,
            offset: 0,
        }
    }

    /// Copy the values out as `T`, which must match the buffer's type.
    pub fn to_vec<T: PlyPod>(&self) -> Result<Vec<T>> {
        self.check_type::<T>()?;
        Ok(bytemuck::pod_collect_to_vec(self.buffer.as_slice()))
    }

    /// Borrow the values as `T` without copying.
    ///
    /// Fails if the type differs or the buffer is not aligned for `T`.
    pub fn try_as_slice<T: PlyPod>(&self) -> Result<&[T]> {
        self.check_type::<T>()?;
        bytemuck::try_cast_slice(self.buffer.as_slice()).map_err(|e| Error::TypeMismatch {
            expected: format!("aligned {}", T::PRIMITIVE),
            actual: format!("{:?}", e),
        })
    }

    /// Copy the buffer into application records such as `[f32; 3]`.
    ///
    /// Only the record size is checked against the buffer length.
    pub fn cast_vec<T: Pod>(&self) -> Result<Vec<T>> {
        let size = std::mem::size_of::<T>();
        if size == 0 || self.buffer.len() % size != 0 {
            return Err(Error::TypeMismatch {
                expected: format!("{}-byte records", size),
                actual: format!("{} bytes", self.buffer.len()),
            });
        }
        Ok(bytemuck::pod_collect_to_vec(self.buffer.as_slice()))
    }

    /// Widen every value to `f64`, whatever the stored type.
    pub fn values_as_f64(&self) -> Vec<f64> {
        let width = self.ty.num_bytes();
        if width == 0 {
            return Vec::new();
        }
        self.buffer
            .chunks_exact(width)
            .map(|v| value_as_f64(self.ty, v))
            .collect()
    }

    fn check_type<T: PlyPod>(&self) -> Result<()> {
        if T::PRIMITIVE != self.ty {
            return Err(Error::TypeMismatch {
                expected: self.ty.to_string(),
                actual: T::PRIMITIVE.to_string(),
            });
        }
        Ok(())
    }
}

/// Iterator over the per-instance slices of a [`PlyData`].
pub struct Instances<'a> {
    data: &'a PlyData,
    index: usize,
    offset: usize,
}

impl<'a> Iterator for Instances<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let len = if self.data.is_list() {
            *self.data.list_lengths.get(self.index)? as usize * self.data.ty.num_bytes()
        } else if self.index < self.data.count {
            self.data.stride()
        } else {
            return None;
        };
        let slice = self.data.buffer.get(self.offset..self.offset + len)?;
        self.index += 1;
        self.offset += len;
        Some(slice)
    }
}

/// Reinterpret a slice of plain values as bytes for the write API.
pub fn to_bytes<T: NoUninit>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Read one host-order value of type `ty` as `f64`.
pub(crate) fn value_as_f64(ty: PrimitiveType, v: &[u8]) -> f64 {
    match ty {
        PrimitiveType::Int8 => i8::from_ne_bytes([v[0]]) as f64,
        PrimitiveType::Uint8 => v[0] as f64,
        PrimitiveType::Int16 => i16::from_ne_bytes([v[0], v[1]]) as f64,
        PrimitiveType::Uint16 => u16::from_ne_bytes([v[0], v[1]]) as f64,
        PrimitiveType::Int32 => i32::from_ne_bytes([v[0], v[1], v[2], v[3]]) as f64,
        PrimitiveType::Uint32 => u32::from_ne_bytes([v[0], v[1], v[2], v[3]]) as f64,
        PrimitiveType::Float32 => f32::from_ne_bytes([v[0], v[1], v[2], v[3]]) as f64,
        PrimitiveType::Float64 => {
            f64::from_ne_bytes([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]])
        }
        PrimitiveType::Invalid => 0.0,
    }
}
