//! Index-to-world coordinate transforms.

use crate::{Error, Result};
use nalgebra::{Matrix4, Point3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sampling mode for fractional positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Interpolation {
    /// Value of the closest voxel center.
    #[default]
    Nearest,
    /// Weighted blend of the 8 surrounding voxel centers.
    Trilinear,
}

/// Affine map from voxel index space to world (scanner) space.
///
/// Stores both directions so sampling never re-inverts the matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    to_world: Matrix4<f64>,
    to_index: Matrix4<f64>,
}

impl Affine {
    /// Identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            to_world: Matrix4::identity(),
            to_index: Matrix4::identity(),
        }
    }

    /// Axis-aligned scaling by the voxel spacing (the `pixdim` fallback).
    ///
    /// # Errors
    /// Returns [`Error::SingularTransform`] if any spacing is zero.
    pub fn from_spacing(dx: f64, dy: f64, dz: f64) -> Result<Self> {
        let m = Matrix4::new(
            dx, 0.0, 0.0, 0.0, //
            0.0, dy, 0.0, 0.0, //
            0.0, 0.0, dz, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );
        Self::from_matrix(m)
    }

    /// Builds a transform from the three affine rows (e.g. NIfTI `srow_x/y/z`).
    ///
    /// # Errors
    /// Returns [`Error::SingularTransform`] if the rows are not invertible.
    pub fn from_rows(rows: [[f64; 4]; 3]) -> Result<Self> {
        let [r0, r1, r2] = rows;
        let m = Matrix4::new(
            r0[0], r0[1], r0[2], r0[3], //
            r1[0], r1[1], r1[2], r1[3], //
            r2[0], r2[1], r2[2], r2[3], //
            0.0, 0.0, 0.0, 1.0,
        );
        Self::from_matrix(m)
    }

    /// Builds a transform from a homogeneous index-to-world matrix.
    ///
    /// # Errors
    /// Returns [`Error::SingularTransform`] if the matrix is not invertible.
    pub fn from_matrix(to_world: Matrix4<f64>) -> Result<Self> {
        let to_index = to_world.try_inverse().ok_or(Error::SingularTransform)?;
        Ok(Self { to_world, to_index })
    }

    /// The index-to-world matrix.
    #[must_use]
    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.to_world
    }

    /// Maps an index-space point to world space.
    #[must_use]
    pub fn to_world(&self, index: &Point3<f64>) -> Point3<f64> {
        self.to_world.transform_point(index)
    }

    /// Maps a world-space point to fractional index space.
    #[must_use]
    pub fn to_index(&self, world: &Point3<f64>) -> Point3<f64> {
        self.to_index.transform_point(world)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spacing_round_trip() {
        let affine = Affine::from_spacing(2.0, 0.5, 1.5).unwrap();
        let world = affine.to_world(&Point3::new(3.0, 4.0, 2.0));
        assert_relative_eq!(world, Point3::new(6.0, 2.0, 3.0));
        let back = affine.to_index(&world);
        assert_relative_eq!(back, Point3::new(3.0, 4.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rows_with_flip_and_offset() {
        let affine = Affine::from_rows([
            [-1.0, 0.0, 0.0, 90.0],
            [0.0, 1.0, 0.0, -126.0],
            [0.0, 0.0, 1.0, -72.0],
        ])
        .unwrap();
        let world = affine.to_world(&Point3::new(10.0, 20.0, 30.0));
        assert_relative_eq!(world, Point3::new(80.0, -106.0, -42.0));
    }

    #[test]
    fn test_singular_rejected() {
        assert!(matches!(
            Affine::from_spacing(1.0, 0.0, 1.0),
            Err(Error::SingularTransform)
        ));
    }
}
