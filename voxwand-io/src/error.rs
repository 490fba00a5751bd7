//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unrecognized image header.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Datatype code without a voxel buffer representation.
    #[error("unsupported element type: datatype code {0}")]
    UnsupportedElementType(i16),

    /// Buffer or payload size disagrees with the header.
    #[error("length mismatch: header expects {expected} voxels, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Configuration file error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] voxwand_core::Error),
}
