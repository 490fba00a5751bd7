//! Memory-mapped image loading.
//!
//! `.nii` files are parsed in place from the mapping. `.nii.gz` files are
//! inflated into memory first, since gzip has no random access.

use crate::codec::{decode, decompress, is_gzip, NiftiImage};
use crate::nifti::ImageHeader;
use crate::{Error, Result};
use log::{debug, info};
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A NIfTI file mapped read-only into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Maps an image file.
    ///
    /// # Errors
    /// Returns I/O errors, and [`Error::InvalidFormat`] for an empty file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::InvalidFormat(format!(
                "{} is empty",
                path.display()
            )));
        }
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Raw file bytes, still compressed for `.nii.gz`.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// File size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the file is gzip-wrapped.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        is_gzip(&self.mmap)
    }

    /// The uncompressed image bytes, borrowed from the mapping when possible.
    ///
    /// # Errors
    /// Returns [`Error::Io`] for corrupt gzip streams.
    pub fn image_bytes(&self) -> Result<Cow<'_, [u8]>> {
        if self.is_compressed() {
            let inflated = decompress(&self.mmap)?;
            debug!(
                "inflated {} from {} to {} bytes",
                self.path.display(),
                self.mmap.len(),
                inflated.len()
            );
            Ok(Cow::Owned(inflated))
        } else {
            Ok(Cow::Borrowed(&self.mmap[..]))
        }
    }

    /// Parses only the header. Unsupported datatypes and multi-volume
    /// images still succeed here.
    ///
    /// # Errors
    /// Returns decompression and header errors.
    pub fn header(&self) -> Result<ImageHeader> {
        ImageHeader::parse(&self.image_bytes()?)
    }

    /// Decodes header and payload.
    ///
    /// # Errors
    /// Returns decompression, header, and payload errors.
    pub fn decode(&self) -> Result<NiftiImage> {
        decode(&self.image_bytes()?)
    }
}

/// Loads a `.nii` or `.nii.gz` image.
///
/// # Errors
/// Returns I/O errors and any decode error.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<NiftiImage> {
    let reader = MappedFileReader::open(path)?;
    let image = reader.decode()?;
    info!(
        "loaded {} ({}, {} bytes)",
        reader.path().display(),
        image.header().dims(),
        reader.len()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ByteOrder, ElementType, VoxelBuffer};
    use crate::codec::{compress, encode};
    use crate::nifti::NiftiVersion;
    use tempfile::tempdir;
    use voxwand_core::{Affine, GridDims};

    fn mask_bytes() -> Vec<u8> {
        let header = ImageHeader::create(
            NiftiVersion::One,
            ByteOrder::Little,
            GridDims::new(2, 2, 2),
            ElementType::U8,
            &Affine::identity(),
        );
        encode(&header, &VoxelBuffer::U8(vec![3; 8])).unwrap()
    }

    #[test]
    fn test_plain_and_gzip_agree() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("mask.nii");
        let packed = dir.path().join("mask.nii.gz");
        let bytes = mask_bytes();
        std::fs::write(&plain, &bytes).unwrap();
        std::fs::write(&packed, compress(&bytes).unwrap()).unwrap();

        let plain = MappedFileReader::open(&plain).unwrap();
        let packed = MappedFileReader::open(&packed).unwrap();
        assert!(!plain.is_compressed());
        assert!(packed.is_compressed());
        assert!(matches!(plain.image_bytes().unwrap(), Cow::Borrowed(_)));
        assert_eq!(plain.image_bytes().unwrap(), packed.image_bytes().unwrap());
        assert_eq!(plain.decode().unwrap(), packed.decode().unwrap());
    }

    #[test]
    fn test_header_reads_unsupported_datatype() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("complex.nii");
        let mut bytes = mask_bytes();
        bytes[70..72].copy_from_slice(&32i16.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let reader = MappedFileReader::open(&path).unwrap();
        assert_eq!(reader.header().unwrap().datatype(), 32);
        assert!(matches!(
            reader.decode(),
            Err(Error::UnsupportedElementType(32))
        ));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.nii");
        std::fs::write(&path, []).unwrap();
        assert!(matches!(
            MappedFileReader::open(&path),
            Err(Error::InvalidFormat(_))
        ));
    }
}
