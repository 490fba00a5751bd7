//! NIfTI-1 and NIfTI-2 single-file headers.
//!
//! The header is kept as raw bytes (everything before the voxel offset,
//! extensions included) so it can be written back verbatim. The fields the
//! editor needs are decoded once at parse time.

use crate::buffer::{ByteOrder, ElementType};
use crate::{Error, Result};
use log::debug;
use voxwand_core::{Affine, GridDims};

const NIFTI1_HEADER_SIZE: usize = 348;
const NIFTI2_HEADER_SIZE: usize = 540;
/// Header plus the 4-byte extension flag.
const NIFTI1_DEFAULT_OFFSET: usize = 352;
const NIFTI2_DEFAULT_OFFSET: usize = 544;

/// Header layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiVersion {
    /// 348-byte header with 16-bit dimensions.
    One,
    /// 540-byte header with 64-bit dimensions.
    Two,
}

impl NiftiVersion {
    /// Format generation number.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            NiftiVersion::One => 1,
            NiftiVersion::Two => 2,
        }
    }

    /// Size of the fixed header in bytes.
    #[must_use]
    pub const fn header_size(self) -> usize {
        match self {
            NiftiVersion::One => NIFTI1_HEADER_SIZE,
            NiftiVersion::Two => NIFTI2_HEADER_SIZE,
        }
    }
}

/// Field offsets for one header generation.
struct Layout {
    datatype: usize,
    bitpix: usize,
    dim: usize,
    pixdim: usize,
    vox_offset: usize,
    scl_slope: usize,
    scl_inter: usize,
    qform_code: usize,
    sform_code: usize,
    srow_x: usize,
    magic: usize,
}

const NIFTI1: Layout = Layout {
    datatype: 70,
    bitpix: 72,
    dim: 40,
    pixdim: 76,
    vox_offset: 108,
    scl_slope: 112,
    scl_inter: 116,
    qform_code: 252,
    sform_code: 254,
    srow_x: 280,
    magic: 344,
};

const NIFTI2: Layout = Layout {
    datatype: 12,
    bitpix: 14,
    dim: 16,
    pixdim: 104,
    vox_offset: 168,
    scl_slope: 176,
    scl_inter: 184,
    qform_code: 344,
    sform_code: 348,
    srow_x: 400,
    magic: 4,
};

impl NiftiVersion {
    fn layout(self) -> &'static Layout {
        match self {
            NiftiVersion::One => &NIFTI1,
            NiftiVersion::Two => &NIFTI2,
        }
    }
}

/// Bounds-checked scalar reads at fixed offsets.
struct FieldReader<'a> {
    bytes: &'a [u8],
    order: ByteOrder,
}

macro_rules! reader_fn {
    ($name:ident, $t:ty) => {
        fn $name(&self, offset: usize) -> Result<$t> {
            const N: usize = std::mem::size_of::<$t>();
            let raw: [u8; N] = self
                .bytes
                .get(offset..offset + N)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| {
                    Error::InvalidFormat(format!("header truncated at byte {offset}"))
                })?;
            Ok(match self.order {
                ByteOrder::Little => <$t>::from_le_bytes(raw),
                ByteOrder::Big => <$t>::from_be_bytes(raw),
            })
        }
    };
}

impl FieldReader<'_> {
    reader_fn!(i16, i16);
    reader_fn!(i32, i32);
    reader_fn!(i64, i64);
    reader_fn!(f32, f32);
    reader_fn!(f64, f64);
}

/// Scalar writes at fixed offsets into a buffer sized by the caller.
struct FieldWriter<'a> {
    bytes: &'a mut [u8],
    order: ByteOrder,
}

macro_rules! writer_fn {
    ($name:ident, $t:ty) => {
        fn $name(&mut self, offset: usize, value: $t) {
            let raw = match self.order {
                ByteOrder::Little => value.to_le_bytes(),
                ByteOrder::Big => value.to_be_bytes(),
            };
            self.bytes[offset..offset + raw.len()].copy_from_slice(&raw);
        }
    };
}

impl FieldWriter<'_> {
    writer_fn!(i16, i16);
    writer_fn!(i32, i32);
    writer_fn!(i64, i64);
    writer_fn!(f32, f32);
    writer_fn!(f64, f64);
}

/// Parsed NIfTI header.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    raw: Vec<u8>,
    version: NiftiVersion,
    byte_order: ByteOrder,
    dim: [i64; 8],
    datatype: i16,
    bitpix: i16,
    pixdim: [f64; 8],
    voxel_count: usize,
    vox_offset: usize,
    scl_slope: f64,
    scl_inter: f64,
    qform_code: i32,
    sform_code: i32,
    srow: [[f64; 4]; 3],
}

impl ImageHeader {
    /// Parses the header at the start of an uncompressed single-file image.
    ///
    /// Generation and byte order come from `sizeof_hdr`. The returned header
    /// owns `bytes[..vox_offset]`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for unknown sizes, a bad magic string,
    /// detached-header files, and offsets beyond the input.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let (version, byte_order) = detect(bytes)?;
        let layout = version.layout();
        let r = FieldReader {
            bytes,
            order: byte_order,
        };

        let magic = bytes
            .get(layout.magic..layout.magic + 4)
            .ok_or_else(|| Error::InvalidFormat("header truncated before magic".into()))?;
        let expected_magic: &[u8] = match version {
            NiftiVersion::One => b"n+1\0",
            NiftiVersion::Two => b"n+2\0",
        };
        if magic != expected_magic {
            if magic[..3] == *b"ni1" || magic[..3] == *b"ni2" {
                return Err(Error::InvalidFormat(
                    "detached header (.hdr/.img) images are not supported".into(),
                ));
            }
            return Err(Error::InvalidFormat(format!("bad magic {magic:?}")));
        }

        let mut dim = [0i64; 8];
        let mut pixdim = [0f64; 8];
        for i in 0..8 {
            match version {
                NiftiVersion::One => {
                    dim[i] = i64::from(r.i16(layout.dim + 2 * i)?);
                    pixdim[i] = f64::from(r.f32(layout.pixdim + 4 * i)?);
                }
                NiftiVersion::Two => {
                    dim[i] = r.i64(layout.dim + 8 * i)?;
                    pixdim[i] = r.f64(layout.pixdim + 8 * i)?;
                }
            }
        }
        if !(1..=7).contains(&dim[0]) {
            return Err(Error::InvalidFormat(format!("dim[0] = {} out of range", dim[0])));
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let ndim = dim[0] as usize;
        if dim[1..=ndim].iter().any(|&d| d < 1) {
            return Err(Error::InvalidFormat(format!("non-positive dimension in {dim:?}")));
        }
        let datatype = r.i16(layout.datatype)?;
        let voxel_count = dim[1..=ndim]
            .iter()
            .try_fold(1usize, |acc, &d| {
                usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
            })
            .ok_or_else(|| Error::InvalidFormat("voxel count overflows".into()))?;
        if let Ok(element) = ElementType::from_code(datatype) {
            if voxel_count.checked_mul(element.size()).is_none() {
                return Err(Error::InvalidFormat("payload size overflows".into()));
            }
        }

        let (vox_offset, scl_slope, scl_inter, qform_code, sform_code) = match version {
            NiftiVersion::One => (
                f64::from(r.f32(layout.vox_offset)?),
                f64::from(r.f32(layout.scl_slope)?),
                f64::from(r.f32(layout.scl_inter)?),
                i32::from(r.i16(layout.qform_code)?),
                i32::from(r.i16(layout.sform_code)?),
            ),
            NiftiVersion::Two => {
                #[allow(clippy::cast_precision_loss)]
                let offset = r.i64(layout.vox_offset)? as f64;
                (
                    offset,
                    r.f64(layout.scl_slope)?,
                    r.f64(layout.scl_inter)?,
                    r.i32(layout.qform_code)?,
                    r.i32(layout.sform_code)?,
                )
            }
        };

        let mut srow = [[0f64; 4]; 3];
        for (row, values) in srow.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = match version {
                    NiftiVersion::One => f64::from(r.f32(layout.srow_x + 16 * row + 4 * col)?),
                    NiftiVersion::Two => r.f64(layout.srow_x + 32 * row + 8 * col)?,
                };
            }
        }

        let header_size = version.header_size();
        #[allow(clippy::cast_precision_loss)]
        let (min_offset, max_offset) = (header_size as f64, bytes.len() as f64);
        if !vox_offset.is_finite() || vox_offset < min_offset || vox_offset > max_offset {
            return Err(Error::InvalidFormat(format!(
                "vox_offset {vox_offset} outside {header_size}..={}",
                bytes.len()
            )));
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let vox_offset = vox_offset as usize;

        let header = Self {
            raw: bytes[..vox_offset].to_vec(),
            version,
            byte_order,
            dim,
            datatype,
            bitpix: r.i16(layout.bitpix)?,
            pixdim,
            voxel_count,
            vox_offset,
            scl_slope,
            scl_inter,
            qform_code,
            sform_code,
            srow,
        };
        debug!(
            "parsed {:?} header ({:?} endian): dims {:?}, datatype {}, vox_offset {}",
            version,
            byte_order,
            &dim[1..=ndim],
            header.datatype,
            vox_offset
        );
        Ok(header)
    }

    /// Builds a fresh single-file header for a 3-D volume.
    ///
    /// The sform is set from `transform`; the payload starts right after the
    /// header and its empty extension flag.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn create(
        version: NiftiVersion,
        byte_order: ByteOrder,
        dims: GridDims,
        element: ElementType,
        transform: &Affine,
    ) -> Self {
        let layout = version.layout();
        let vox_offset = match version {
            NiftiVersion::One => NIFTI1_DEFAULT_OFFSET,
            NiftiVersion::Two => NIFTI2_DEFAULT_OFFSET,
        };
        let mut raw = vec![0u8; vox_offset];
        let m = transform.matrix();
        let spacing = [
            m.fixed_view::<3, 1>(0, 0).norm(),
            m.fixed_view::<3, 1>(0, 1).norm(),
            m.fixed_view::<3, 1>(0, 2).norm(),
        ];
        let dim = [
            3,
            dims.nx as i64,
            dims.ny as i64,
            dims.nz as i64,
            1,
            1,
            1,
            1,
        ];
        let pixdim = [1.0, spacing[0], spacing[1], spacing[2], 0.0, 0.0, 0.0, 0.0];
        let mut srow = [[0f64; 4]; 3];
        for (row, values) in srow.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = m[(row, col)];
            }
        }

        {
            let mut w = FieldWriter {
                bytes: &mut raw,
                order: byte_order,
            };
            match version {
                NiftiVersion::One => {
                    w.i32(0, NIFTI1_HEADER_SIZE as i32);
                    for i in 0..8 {
                        w.i16(layout.dim + 2 * i, dim[i] as i16);
                        w.f32(layout.pixdim + 4 * i, pixdim[i] as f32);
                    }
                    w.f32(layout.vox_offset, vox_offset as f32);
                    w.f32(layout.scl_slope, 1.0);
                    w.i16(layout.sform_code, 2);
                    for (row, values) in srow.iter().enumerate() {
                        for (col, &value) in values.iter().enumerate() {
                            w.f32(layout.srow_x + 16 * row + 4 * col, value as f32);
                        }
                    }
                }
                NiftiVersion::Two => {
                    w.i32(0, NIFTI2_HEADER_SIZE as i32);
                    for i in 0..8 {
                        w.i64(layout.dim + 8 * i, dim[i]);
                        w.f64(layout.pixdim + 8 * i, pixdim[i]);
                    }
                    w.i64(layout.vox_offset, vox_offset as i64);
                    w.f64(layout.scl_slope, 1.0);
                    w.i32(layout.sform_code, 2);
                    for (row, values) in srow.iter().enumerate() {
                        for (col, &value) in values.iter().enumerate() {
                            w.f64(layout.srow_x + 32 * row + 8 * col, value);
                        }
                    }
                }
            }
            w.i16(layout.datatype, element.code());
            w.i16(layout.bitpix, element.bitpix());
        }
        let magic: &[u8; 4] = match version {
            NiftiVersion::One => b"n+1\0",
            NiftiVersion::Two => b"n+2\0",
        };
        raw[layout.magic..layout.magic + 4].copy_from_slice(magic);
        if version == NiftiVersion::Two {
            // Line-ending check bytes that follow the NIfTI-2 magic.
            raw[8..12].copy_from_slice(&[0x0D, 0x0A, 0x1A, 0x0A]);
        }

        Self {
            raw,
            version,
            byte_order,
            dim,
            datatype: element.code(),
            bitpix: element.bitpix(),
            pixdim,
            voxel_count: dims.len(),
            vox_offset,
            scl_slope: 1.0,
            scl_inter: 0.0,
            qform_code: 0,
            sform_code: 2,
            srow,
        }
    }

    /// Returns a copy whose datatype and bitpix describe `element`, leaving
    /// every other byte untouched.
    #[must_use]
    pub fn with_element_type(&self, element: ElementType) -> Self {
        let layout = self.version.layout();
        let mut header = self.clone();
        let mut w = FieldWriter {
            bytes: &mut header.raw,
            order: self.byte_order,
        };
        w.i16(layout.datatype, element.code());
        w.i16(layout.bitpix, element.bitpix());
        header.datatype = element.code();
        header.bitpix = element.bitpix();
        header
    }

    /// Header bytes up to the voxel offset, extensions included.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub fn version(&self) -> NiftiVersion {
        self.version
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// The `dim` array: `dim[0]` is the rank, `dim[1..=rank]` the extents.
    #[must_use]
    pub fn dim(&self) -> &[i64; 8] {
        &self.dim
    }

    /// Spatial extent; axes beyond the rank count as 1.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn dims(&self) -> GridDims {
        let axis = |i: usize| {
            if i <= self.rank() {
                self.dim[i] as usize
            } else {
                1
            }
        };
        GridDims::new(axis(1), axis(2), axis(3))
    }

    /// Number of axes.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn rank(&self) -> usize {
        self.dim[0] as usize
    }

    /// Voxels across all axes, including time and beyond.
    #[must_use]
    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// True if the image has more than one volume along axes 4 and up.
    #[must_use]
    pub fn is_multi_volume(&self) -> bool {
        self.dim[4..=self.rank().max(3)].iter().any(|&d| d > 1)
    }

    /// Raw datatype code.
    #[must_use]
    pub fn datatype(&self) -> i16 {
        self.datatype
    }

    #[must_use]
    pub fn bitpix(&self) -> i16 {
        self.bitpix
    }

    /// Element type of the payload.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedElementType`] for codes without a buffer type.
    pub fn element_type(&self) -> Result<ElementType> {
        ElementType::from_code(self.datatype)
    }

    /// Byte offset of the payload.
    #[must_use]
    pub fn vox_offset(&self) -> usize {
        self.vox_offset
    }

    #[must_use]
    pub fn pixdim(&self) -> &[f64; 8] {
        &self.pixdim
    }

    #[must_use]
    pub fn qform_code(&self) -> i32 {
        self.qform_code
    }

    #[must_use]
    pub fn sform_code(&self) -> i32 {
        self.sform_code
    }

    /// Scaling slope and intercept, or `None` when the slope is zero (no scaling).
    #[must_use]
    pub fn scaling(&self) -> Option<(f64, f64)> {
        if self.scl_slope == 0.0 || !self.scl_slope.is_finite() {
            None
        } else {
            Some((self.scl_slope, self.scl_inter))
        }
    }

    /// Index-to-world transform: the sform when present, else pixdim spacing.
    ///
    /// # Errors
    /// Returns a core `SingularTransform` error for a degenerate sform or spacing.
    pub fn affine(&self) -> Result<Affine> {
        if self.sform_code > 0 {
            return Ok(Affine::from_rows(self.srow)?);
        }
        let spacing = |i: usize| {
            if self.pixdim[i] == 0.0 {
                1.0
            } else {
                self.pixdim[i].abs()
            }
        };
        Ok(Affine::from_spacing(spacing(1), spacing(2), spacing(3))?)
    }
}

/// Detects generation and byte order from `sizeof_hdr`.
fn detect(bytes: &[u8]) -> Result<(NiftiVersion, ByteOrder)> {
    let raw: [u8; 4] = bytes
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::InvalidFormat("input shorter than 4 bytes".into()))?;
    let le = i32::from_le_bytes(raw);
    let be = i32::from_be_bytes(raw);
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let found = match (le, be) {
        (n, _) if n == NIFTI1_HEADER_SIZE as i32 => (NiftiVersion::One, ByteOrder::Little),
        (_, n) if n == NIFTI1_HEADER_SIZE as i32 => (NiftiVersion::One, ByteOrder::Big),
        (n, _) if n == NIFTI2_HEADER_SIZE as i32 => (NiftiVersion::Two, ByteOrder::Little),
        (_, n) if n == NIFTI2_HEADER_SIZE as i32 => (NiftiVersion::Two, ByteOrder::Big),
        _ => {
            return Err(Error::InvalidFormat(format!(
                "sizeof_hdr {le} is neither 348 nor 540 in either byte order"
            )))
        }
    };
    if bytes.len() < found.0.header_size() {
        return Err(Error::InvalidFormat(format!(
            "{} bytes is shorter than a {:?} header",
            bytes.len(),
            found.0
        )));
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn all_layouts() -> [(NiftiVersion, ByteOrder); 4] {
        [
            (NiftiVersion::One, ByteOrder::Little),
            (NiftiVersion::One, ByteOrder::Big),
            (NiftiVersion::Two, ByteOrder::Little),
            (NiftiVersion::Two, ByteOrder::Big),
        ]
    }

    #[test]
    fn test_create_then_parse() {
        let dims = GridDims::new(4, 5, 6);
        let affine = Affine::from_rows([
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 2.0, 0.0, 5.0],
            [0.0, 0.0, 3.0, 1.0],
        ])
        .unwrap();
        for (version, order) in all_layouts() {
            let created = ImageHeader::create(version, order, dims, ElementType::I16, &affine);
            let parsed = ImageHeader::parse(created.raw()).unwrap();
            assert_eq!(parsed, created, "{version:?} {order:?}");
            assert_eq!(parsed.dims(), dims);
            assert_eq!(parsed.voxel_count(), 120);
            assert_eq!(parsed.element_type().unwrap(), ElementType::I16);
            assert_eq!(parsed.byte_order(), order);
            let world = parsed.affine().unwrap().to_world(&Point3::new(1.0, 1.0, 1.0));
            assert_relative_eq!(world, Point3::new(-8.0, 7.0, 4.0));
            assert_relative_eq!(parsed.pixdim()[3], 3.0);
        }
    }

    #[test]
    fn test_pixdim_affine_without_sform() {
        let header = ImageHeader::create(
            NiftiVersion::One,
            ByteOrder::Little,
            GridDims::new(2, 2, 2),
            ElementType::U8,
            &Affine::from_spacing(1.5, 1.5, 2.0).unwrap(),
        );
        let mut raw = header.raw().to_vec();
        raw[NIFTI1.sform_code..NIFTI1.sform_code + 2].copy_from_slice(&0i16.to_le_bytes());
        let parsed = ImageHeader::parse(&raw).unwrap();
        assert_eq!(parsed.sform_code(), 0);
        let world = parsed.affine().unwrap().to_world(&Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(world, Point3::new(1.5, 1.5, 2.0));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ImageHeader::parse(&[0u8; 2]).is_err());
        assert!(ImageHeader::parse(&[0u8; 400]).is_err());
        let mut raw = vec![0u8; 400];
        raw[..4].copy_from_slice(&348i32.to_le_bytes());
        raw[344..348].copy_from_slice(b"ni1\0");
        let err = ImageHeader::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("detached"));
    }

    #[test]
    fn test_overflowing_dims_rejected() {
        let header = ImageHeader::create(
            NiftiVersion::One,
            ByteOrder::Little,
            GridDims::new(1, 1, 1),
            ElementType::F64,
            &Affine::identity(),
        );
        let mut raw = header.raw().to_vec();
        let mut dim = [i16::MAX; 8];
        dim[0] = 5;
        for (i, d) in dim.iter().enumerate() {
            let at = NIFTI1.dim + 2 * i;
            raw[at..at + 2].copy_from_slice(&d.to_le_bytes());
        }
        let err = ImageHeader::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");

        let mut bytes = raw.clone();
        bytes.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            crate::decode(&bytes),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_datatype_is_reported() {
        let header = ImageHeader::create(
            NiftiVersion::One,
            ByteOrder::Little,
            GridDims::new(1, 1, 1),
            ElementType::U8,
            &Affine::identity(),
        );
        let mut raw = header.raw().to_vec();
        raw[NIFTI1.datatype..NIFTI1.datatype + 2].copy_from_slice(&32i16.to_le_bytes());
        let parsed = ImageHeader::parse(&raw).unwrap();
        assert!(matches!(
            parsed.element_type(),
            Err(Error::UnsupportedElementType(32))
        ));
    }

    #[test]
    fn test_with_element_type_patches_bytes() {
        let header = ImageHeader::create(
            NiftiVersion::Two,
            ByteOrder::Big,
            GridDims::new(3, 3, 3),
            ElementType::F32,
            &Affine::identity(),
        );
        let labels = header.with_element_type(ElementType::U32);
        let parsed = ImageHeader::parse(labels.raw()).unwrap();
        assert_eq!(parsed.element_type().unwrap(), ElementType::U32);
        assert_eq!(parsed.bitpix(), 32);
        assert_eq!(parsed.raw().len(), header.raw().len());
    }
}
