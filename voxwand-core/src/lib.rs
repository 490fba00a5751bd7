//! voxwand-core: Core types for interactive voxel segmentation.
//!
//! This crate provides the foundational data model shared by region growing,
//! isosurface extraction, and image persistence: voxel grids, voxel keys,
//! index-to-world transforms, and selection records.
//!

pub mod config;
pub mod error;
pub mod grid;
pub mod key;
pub mod selection;
pub mod transform;
pub mod volumes;

pub use config::{AdaptiveSearchConfig, EditorConfig, MeshConfig, SelectorConfig};
pub use error::{Error, Result};
pub use grid::{Scalar, VoxelGrid};
pub use key::{GridDims, VoxelKey, NEIGHBOR_OFFSETS};
pub use selection::{Category, LabelId, VoxelRef};
pub use transform::{Affine, Interpolation};
pub use volumes::VolumeSet;
