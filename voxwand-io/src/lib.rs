//! voxwand-io: Image persistence and export for voxwand.
//!
//! This crate reads and writes NIfTI-1/NIfTI-2 volumes (plain or gzip),
//! converts payloads to and from voxel grids, exports edited label volumes,
//! writes binary STL meshes, and loads JSON editor configuration. Files are
//! read through memory maps via memmap2.
//!

mod buffer;
mod codec;
pub mod config;
mod error;
mod export;
pub mod nifti;
mod reader;
pub mod stl;

pub use buffer::{ByteOrder, ElementType, VoxelBuffer};
pub use codec::{compress, decode, decode_any, decompress, encode, is_gzip, NiftiImage};
pub use config::{config_from_json, load_config};
pub use error::{Error, Result};
pub use export::{download, export_volume, NamedBlob, EXPORT_MIME, EXPORT_NAME};
pub use nifti::{ImageHeader, NiftiVersion};
pub use reader::{load_image, MappedFileReader};
pub use stl::{mesh_to_binary_stl_bytes, write_binary_stl};
