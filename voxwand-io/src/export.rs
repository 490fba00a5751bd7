//! Export of edited volumes as named, compressed blobs.

use crate::codec::{compress, NiftiImage};
use crate::Result;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use voxwand_core::{Scalar, VoxelGrid};

/// File name given to exported label volumes.
pub const EXPORT_NAME: &str = "edited_lesion.nii.gz";
/// MIME type of exported blobs.
pub const EXPORT_MIME: &str = "application/gzip";

/// Bytes ready to hand to an upload or download collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Encodes `grid` under the header of `image` (converted to its datatype)
/// and gzip-compresses the result.
///
/// # Errors
/// Returns codec errors when the grid does not fit the header.
pub fn export_volume<T: Scalar>(image: &NiftiImage, grid: &VoxelGrid<T>) -> Result<NamedBlob> {
    let edited = image.with_grid(grid)?;
    let bytes = compress(&edited.encode()?)?;
    info!("exported {EXPORT_NAME} ({} bytes)", bytes.len());
    Ok(NamedBlob {
        name: EXPORT_NAME.to_string(),
        mime_type: EXPORT_MIME.to_string(),
        bytes,
    })
}

/// Writes the blob to `path`, or into `path/<blob name>` when `path` is a directory.
///
/// # Errors
/// Returns [`crate::Error::Io`] if the write fails.
pub fn download<P: AsRef<Path>>(blob: &NamedBlob, path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    let target = if path.is_dir() {
        path.join(&blob.name)
    } else {
        path.to_path_buf()
    };
    fs::write(&target, &blob.bytes)?;
    Ok(target)
}
