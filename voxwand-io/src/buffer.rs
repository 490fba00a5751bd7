//! Typed voxel payloads.
//!
//! [`VoxelBuffer`] holds a decoded payload in its on-disk element type so an
//! encode after decode reproduces the original bytes exactly.

use crate::{Error, Result};
use voxwand_core::{GridDims, Scalar, VoxelGrid};

/// Byte order of a header and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running machine.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Voxel element types with a NIfTI datatype code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementType {
    /// Every supported type.
    pub const ALL: [ElementType; 10] = [
        ElementType::U8,
        ElementType::I8,
        ElementType::U16,
        ElementType::I16,
        ElementType::U32,
        ElementType::I32,
        ElementType::U64,
        ElementType::I64,
        ElementType::F32,
        ElementType::F64,
    ];

    /// Maps a NIfTI datatype code.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedElementType`] for complex, RGB, `f128`,
    /// binary, and unknown codes.
    pub fn from_code(code: i16) -> Result<Self> {
        Ok(match code {
            2 => ElementType::U8,
            4 => ElementType::I16,
            8 => ElementType::I32,
            16 => ElementType::F32,
            64 => ElementType::F64,
            256 => ElementType::I8,
            512 => ElementType::U16,
            768 => ElementType::U32,
            1024 => ElementType::I64,
            1280 => ElementType::U64,
            other => return Err(Error::UnsupportedElementType(other)),
        })
    }

    /// NIfTI datatype code.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            ElementType::U8 => 2,
            ElementType::I16 => 4,
            ElementType::I32 => 8,
            ElementType::F32 => 16,
            ElementType::F64 => 64,
            ElementType::I8 => 256,
            ElementType::U16 => 512,
            ElementType::U32 => 768,
            ElementType::I64 => 1024,
            ElementType::U64 => 1280,
        }
    }

    /// Bytes per element.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
            ElementType::U64 | ElementType::I64 | ElementType::F64 => 8,
        }
    }

    /// Bits per element, as stored in `bitpix`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn bitpix(self) -> i16 {
        (self.size() * 8) as i16
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
            ElementType::U64 => "u64",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Element with a fixed-width byte representation.
trait Element: Scalar {
    const SIZE: usize;
    fn read(bytes: &[u8], order: ByteOrder) -> Self;
    fn write(self, order: ByteOrder, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($($t:ty),*) => {$(
        impl Element for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            #[inline]
            fn read(bytes: &[u8], order: ByteOrder) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                match order {
                    ByteOrder::Little => <$t>::from_le_bytes(raw),
                    ByteOrder::Big => <$t>::from_be_bytes(raw),
                }
            }

            #[inline]
            fn write(self, order: ByteOrder, out: &mut Vec<u8>) {
                match order {
                    ByteOrder::Little => out.extend_from_slice(&self.to_le_bytes()),
                    ByteOrder::Big => out.extend_from_slice(&self.to_be_bytes()),
                }
            }
        }
    )*};
}

impl_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

fn read_vec<T: Element>(bytes: &[u8], order: ByteOrder) -> Vec<T> {
    bytes
        .chunks_exact(T::SIZE)
        .map(|chunk| T::read(chunk, order))
        .collect()
}

/// Voxel payload tagged with its element type.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelBuffer {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Applies `$body` to the inner vector of any variant.
macro_rules! dispatch {
    ($buffer:expr, $v:ident => $body:expr) => {
        match $buffer {
            VoxelBuffer::U8($v) => $body,
            VoxelBuffer::I8($v) => $body,
            VoxelBuffer::U16($v) => $body,
            VoxelBuffer::I16($v) => $body,
            VoxelBuffer::U32($v) => $body,
            VoxelBuffer::I32($v) => $body,
            VoxelBuffer::U64($v) => $body,
            VoxelBuffer::I64($v) => $body,
            VoxelBuffer::F32($v) => $body,
            VoxelBuffer::F64($v) => $body,
        }
    };
}

/// Builds the variant for `$element` from an expression generic over the element type.
macro_rules! construct {
    ($element:expr, $t:ident => $body:expr) => {
        match $element {
            ElementType::U8 => { type $t = u8; VoxelBuffer::U8($body) }
            ElementType::I8 => { type $t = i8; VoxelBuffer::I8($body) }
            ElementType::U16 => { type $t = u16; VoxelBuffer::U16($body) }
            ElementType::I16 => { type $t = i16; VoxelBuffer::I16($body) }
            ElementType::U32 => { type $t = u32; VoxelBuffer::U32($body) }
            ElementType::I32 => { type $t = i32; VoxelBuffer::I32($body) }
            ElementType::U64 => { type $t = u64; VoxelBuffer::U64($body) }
            ElementType::I64 => { type $t = i64; VoxelBuffer::I64($body) }
            ElementType::F32 => { type $t = f32; VoxelBuffer::F32($body) }
            ElementType::F64 => { type $t = f64; VoxelBuffer::F64($body) }
        }
    };
}

impl VoxelBuffer {
    /// Decodes `bytes` as a packed array of `element`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] if the length is not a whole number of elements.
    pub fn from_bytes(element: ElementType, bytes: &[u8], order: ByteOrder) -> Result<Self> {
        if bytes.len() % element.size() != 0 {
            return Err(Error::InvalidFormat(format!(
                "{} payload bytes is not a multiple of {} ({element})",
                bytes.len(),
                element.size()
            )));
        }
        Ok(construct!(element, T => read_vec::<T>(bytes, order)))
    }

    /// Appends the packed bytes in `order`.
    pub fn write_bytes(&self, order: ByteOrder, out: &mut Vec<u8>) {
        out.reserve(self.byte_len());
        dispatch!(self, v => {
            for &x in v {
                x.write(order, out);
            }
        });
    }

    /// Packed bytes in `order`.
    #[must_use]
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_bytes(order, &mut out);
        out
    }

    /// Converts grid values into a buffer of `element`, rounding and
    /// saturating where the target is narrower.
    #[must_use]
    pub fn from_grid<S: Scalar>(element: ElementType, grid: &VoxelGrid<S>) -> Self {
        let values = grid.as_slice();
        construct!(element, T => values.iter().map(|v| T::from_f64(v.to_f64())).collect())
    }

    /// Converts into a grid of `dims`.
    ///
    /// # Errors
    /// Returns a core `DimensionMismatch` when the length differs from `dims`.
    pub fn to_grid<S: Scalar>(&self, dims: GridDims) -> Result<VoxelGrid<S>> {
        let data: Vec<S> = dispatch!(self, v => v.iter().map(|x| S::from_f64(x.to_f64())).collect());
        Ok(VoxelGrid::from_vec(dims, data)?)
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            VoxelBuffer::U8(_) => ElementType::U8,
            VoxelBuffer::I8(_) => ElementType::I8,
            VoxelBuffer::U16(_) => ElementType::U16,
            VoxelBuffer::I16(_) => ElementType::I16,
            VoxelBuffer::U32(_) => ElementType::U32,
            VoxelBuffer::I32(_) => ElementType::I32,
            VoxelBuffer::U64(_) => ElementType::U64,
            VoxelBuffer::I64(_) => ElementType::I64,
            VoxelBuffer::F32(_) => ElementType::F32,
            VoxelBuffer::F64(_) => ElementType::F64,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the packed payload in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.len() * self.element_type().size()
    }

    /// Element `index` widened to `f64`.
    #[must_use]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        dispatch!(self, v => v.get(index).map(|x| x.to_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for element in ElementType::ALL {
            assert_eq!(ElementType::from_code(element.code()).unwrap(), element);
            assert_eq!(element.bitpix() as usize, element.size() * 8);
        }
    }

    #[test]
    fn test_unsupported_codes() {
        for code in [0, 1, 32, 128, 1536, 1792, 2048, 2304] {
            assert!(matches!(
                ElementType::from_code(code),
                Err(Error::UnsupportedElementType(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_byte_order_applies() {
        let buffer = VoxelBuffer::U16(vec![0x0102, 0x0304]);
        assert_eq!(buffer.to_bytes(ByteOrder::Little), vec![2, 1, 4, 3]);
        assert_eq!(buffer.to_bytes(ByteOrder::Big), vec![1, 2, 3, 4]);
        let back = VoxelBuffer::from_bytes(ElementType::U16, &[1, 2, 3, 4], ByteOrder::Big).unwrap();
        assert_eq!(back, buffer);
    }

    #[test]
    fn test_ragged_payload_rejected() {
        assert!(VoxelBuffer::from_bytes(ElementType::F32, &[0; 7], ByteOrder::Little).is_err());
    }

    #[test]
    fn test_grid_conversion_saturates() {
        let dims = GridDims::new(3, 1, 1);
        let grid = VoxelGrid::from_vec(dims, vec![-3.0_f32, 2.6, 300.0]).unwrap();
        let buffer = VoxelBuffer::from_grid(ElementType::U8, &grid);
        assert_eq!(buffer, VoxelBuffer::U8(vec![0, 3, 255]));
        let labels: VoxelGrid<u32> = buffer.to_grid(dims).unwrap();
        assert_eq!(labels.as_slice(), &[0, 3, 255]);
        assert!(buffer.to_grid::<u32>(GridDims::new(2, 1, 1)).is_err());
    }
}
