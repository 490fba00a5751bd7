//! Error types for voxwand-core.

use crate::GridDims;
use thiserror::Error;

/// Result type alias for voxwand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for voxwand operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer length does not match the grid dimensions.
    #[error("buffer holds {actual} voxels but dimensions {dims} need {expected}")]
    DimensionMismatch {
        dims: GridDims,
        expected: usize,
        actual: usize,
    },

    /// Two grids that must share a shape do not.
    #[error("grid '{name}' has dimensions {actual}, expected {expected}")]
    GridShapeMismatch {
        name: &'static str,
        expected: GridDims,
        actual: GridDims,
    },

    /// Index-to-world transform cannot be inverted.
    #[error("index-to-world transform is singular")]
    SingularTransform,

    /// Configuration error.
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}
