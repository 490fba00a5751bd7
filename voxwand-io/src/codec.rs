//! Image encode/decode and gzip transport.

use crate::buffer::VoxelBuffer;
use crate::nifti::ImageHeader;
use crate::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use std::io::{Read, Write};
use voxwand_core::{Scalar, VoxelGrid};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A decoded image: header plus typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiImage {
    header: ImageHeader,
    data: VoxelBuffer,
}

impl NiftiImage {
    /// Pairs a header with a payload of matching type and length.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for a type mismatch and
    /// [`Error::LengthMismatch`] for a length mismatch.
    pub fn new(header: ImageHeader, data: VoxelBuffer) -> Result<Self> {
        check_payload(&header, &data)?;
        Ok(Self { header, data })
    }

    #[must_use]
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    #[must_use]
    pub fn data(&self) -> &VoxelBuffer {
        &self.data
    }

    #[must_use]
    pub fn into_parts(self) -> (ImageHeader, VoxelBuffer) {
        (self.header, self.data)
    }

    /// Converts the first volume into a grid carrying the header's transform.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for multi-volume images and propagates
    /// transform errors.
    pub fn to_grid<T: Scalar>(&self) -> Result<VoxelGrid<T>> {
        if self.header.is_multi_volume() {
            return Err(Error::InvalidFormat(format!(
                "expected a single volume, dims are {:?}",
                self.header.dim()
            )));
        }
        let grid = self.data.to_grid(self.header.dims())?;
        Ok(grid.with_transform(self.header.affine()?))
    }

    /// Same header, payload replaced by `grid` converted to the header's element type.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the grid size differs from the header,
    /// or [`Error::UnsupportedElementType`] for a header without a buffer type.
    pub fn with_grid<T: Scalar>(&self, grid: &VoxelGrid<T>) -> Result<Self> {
        let element = self.header.element_type()?;
        let data = VoxelBuffer::from_grid(element, grid);
        Self::new(self.header.clone(), data)
    }

    /// Uncompressed file bytes.
    ///
    /// # Errors
    /// See [`encode`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.header, &self.data)
    }
}

fn check_payload(header: &ImageHeader, data: &VoxelBuffer) -> Result<()> {
    let element = header.element_type()?;
    if data.element_type() != element {
        return Err(Error::InvalidFormat(format!(
            "buffer holds {} but header datatype is {element}",
            data.element_type()
        )));
    }
    if data.len() != header.voxel_count() {
        return Err(Error::LengthMismatch {
            expected: header.voxel_count(),
            actual: data.len(),
        });
    }
    Ok(())
}

/// Writes the raw header followed by the payload at the header's offset, in
/// the header's byte order.
///
/// # Errors
/// Returns [`Error::UnsupportedElementType`], [`Error::InvalidFormat`] or
/// [`Error::LengthMismatch`] when `buffer` does not fit `header`.
pub fn encode(header: &ImageHeader, buffer: &VoxelBuffer) -> Result<Vec<u8>> {
    check_payload(header, buffer)?;
    let mut out = Vec::with_capacity(header.vox_offset() + buffer.byte_len());
    out.extend_from_slice(header.raw());
    buffer.write_bytes(header.byte_order(), &mut out);
    debug!(
        "encoded {} voxels of {} into {} bytes",
        buffer.len(),
        buffer.element_type(),
        out.len()
    );
    Ok(out)
}

/// Parses an uncompressed image. Bytes past the payload are ignored.
///
/// # Errors
/// Returns header errors, [`Error::UnsupportedElementType`], or
/// [`Error::LengthMismatch`] when the payload is short.
pub fn decode(bytes: &[u8]) -> Result<NiftiImage> {
    let header = ImageHeader::parse(bytes)?;
    let element = header.element_type()?;
    let expected = header.voxel_count();
    let start = header.vox_offset();
    let available = (bytes.len() - start) / element.size();
    if available < expected {
        return Err(Error::LengthMismatch {
            expected,
            actual: available,
        });
    }
    let payload = &bytes[start..start + expected * element.size()];
    let data = VoxelBuffer::from_bytes(element, payload, header.byte_order())?;
    debug!("decoded {expected} voxels of {element}");
    Ok(NiftiImage { header, data })
}

/// Gzip-compresses `bytes`.
///
/// # Errors
/// Returns [`Error::Io`] if the encoder fails.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder.write_all(bytes)?;
    let out = encoder.finish()?;
    info!("compressed {} bytes to {}", bytes.len(), out.len());
    Ok(out)
}

/// Reverses [`compress`].
///
/// # Errors
/// Returns [`Error::Io`] for corrupt or truncated gzip data.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// True if `bytes` start with the gzip magic.
#[must_use]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decodes plain or gzip-wrapped images.
///
/// # Errors
/// See [`decompress`] and [`decode`].
pub fn decode_any(bytes: &[u8]) -> Result<NiftiImage> {
    if is_gzip(bytes) {
        decode(&decompress(bytes)?)
    } else {
        decode(bytes)
    }
}
