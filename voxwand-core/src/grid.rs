//! Dense 3-D voxel grids.
//!
//! A [`VoxelGrid`] stores one scalar per voxel in a flat buffer, x varying
//! fastest, with an [`Affine`] mapping voxel indices to world coordinates.
//! Element types are abstracted by [`Scalar`] so intensity volumes (`f32`),
//! label maps (`u32`) and masks (`u8`) share one implementation.

use crate::{Affine, Error, GridDims, Interpolation, Result, VoxelKey};
use nalgebra::Point3;

/// Numeric voxel element.
pub trait Scalar: Copy + Default + PartialEq + PartialOrd + Send + Sync + 'static {
    /// Widens to `f64` for thresholding and interpolation.
    fn to_f64(self) -> f64;

    /// Narrows from `f64`, rounding and saturating for integer types.
    fn from_f64(value: f64) -> Self;

    /// Returns true for the additive identity.
    #[inline]
    fn is_zero(self) -> bool {
        self == Self::default()
    }
}

macro_rules! impl_scalar_int {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            #[inline]
            #[allow(clippy::cast_lossless, clippy::cast_precision_loss)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn from_f64(value: f64) -> Self {
                value.round() as $t
            }
        }
    )*};
}

impl_scalar_int!(u8, i8, u16, i16, u32, i32, u64, i64);

impl Scalar for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Scalar for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// A dense 3-D grid of scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid<T> {
    dims: GridDims,
    data: Vec<T>,
    transform: Affine,
}

impl<T: Scalar> VoxelGrid<T> {
    /// Creates a zero-filled grid with an identity transform.
    #[must_use]
    pub fn zeros(dims: GridDims) -> Self {
        Self {
            dims,
            data: vec![T::default(); dims.len()],
            transform: Affine::identity(),
        }
    }

    /// Wraps an existing buffer.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] if `data.len()` differs from `dims.len()`.
    pub fn from_vec(dims: GridDims, data: Vec<T>) -> Result<Self> {
        if data.len() != dims.len() {
            return Err(Error::DimensionMismatch {
                dims,
                expected: dims.len(),
                actual: data.len(),
            });
        }
        Ok(Self {
            dims,
            data,
            transform: Affine::identity(),
        })
    }

    /// Sets the index-to-world transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    /// Grid extent.
    #[must_use]
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    /// Index-to-world transform.
    #[must_use]
    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    /// Flat voxel buffer, x fastest.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consumes the grid and returns its buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Value at a key, or `None` outside the grid.
    #[inline]
    #[must_use]
    pub fn get(&self, key: VoxelKey) -> Option<T> {
        self.dims.linear_index(key).map(|i| self.data[i])
    }

    /// Value at a linear index. The index must come from this grid's dims.
    #[inline]
    #[must_use]
    pub fn at(&self, index: usize) -> T {
        self.data[index]
    }

    /// Writes one voxel. Returns false (and writes nothing) outside the grid.
    #[inline]
    pub fn set(&mut self, key: VoxelKey, value: T) -> bool {
        match self.dims.linear_index(key) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    /// Writes one voxel by linear index.
    #[inline]
    pub fn set_at(&mut self, index: usize, value: T) {
        self.data[index] = value;
    }

    /// Overwrites every voxel.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Zeroes every voxel.
    pub fn clear(&mut self) {
        self.fill(T::default());
    }

    /// Number of nonzero voxels.
    #[must_use]
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|v| !v.is_zero()).count()
    }

    /// Every key in memory order.
    pub fn iter_keys(&self) -> impl Iterator<Item = VoxelKey> {
        let dims = self.dims;
        (0..dims.len()).map(move |i| dims.key_of(i))
    }

    /// Keys of voxels satisfying a predicate, in memory order.
    pub fn keys_where<'a, F>(&'a self, mut pred: F) -> impl Iterator<Item = VoxelKey> + 'a
    where
        F: FnMut(T) -> bool + 'a,
    {
        let dims = self.dims;
        self.data
            .iter()
            .enumerate()
            .filter(move |(_, v)| pred(**v))
            .map(move |(i, _)| dims.key_of(i))
    }

    /// Converts every element into another scalar type, keeping the transform.
    #[must_use]
    pub fn map<U: Scalar>(&self, mut f: impl FnMut(T) -> U) -> VoxelGrid<U> {
        VoxelGrid {
            dims: self.dims,
            data: self.data.iter().map(|v| f(*v)).collect(),
            transform: self.transform.clone(),
        }
    }

    /// World position of a voxel center.
    #[must_use]
    pub fn world_of(&self, key: VoxelKey) -> Point3<f64> {
        self.transform.to_world(&Point3::new(
            f64::from(key.x),
            f64::from(key.y),
            f64::from(key.z),
        ))
    }

    /// Samples at a world-space point.
    #[must_use]
    pub fn sample_world(&self, world: &Point3<f64>, interpolation: Interpolation) -> Option<f64> {
        self.sample_index(&self.transform.to_index(world), interpolation)
    }

    /// Samples at a fractional index-space point.
    ///
    /// Returns `None` when the point (or, for trilinear, any contributing
    /// corner with nonzero weight) lies outside the grid, and for non-finite
    /// points.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample_index(&self, p: &Point3<f64>, interpolation: Interpolation) -> Option<f64> {
        if !p.iter().all(|c| c.is_finite()) {
            return None;
        }
        match interpolation {
            Interpolation::Nearest => {
                let key = VoxelKey::new(
                    p.x.round() as i32,
                    p.y.round() as i32,
                    p.z.round() as i32,
                );
                self.get(key).map(Scalar::to_f64)
            }
            Interpolation::Trilinear => self.trilinear(p),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn trilinear(&self, p: &Point3<f64>) -> Option<f64> {
        let base = (p.x.floor(), p.y.floor(), p.z.floor());
        let (fx, fy, fz) = (p.x - base.0, p.y - base.1, p.z - base.2);
        let origin = VoxelKey::new(base.0 as i32, base.1 as i32, base.2 as i32);

        let mut acc = 0.0;
        for (dz, wz) in [(0, 1.0 - fz), (1, fz)] {
            for (dy, wy) in [(0, 1.0 - fy), (1, fy)] {
                for (dx, wx) in [(0, 1.0 - fx), (1, fx)] {
                    let w = wx * wy * wz;
                    if w == 0.0 {
                        continue;
                    }
                    let v = self.get(origin.offset((dx, dy, dz))?)?;
                    acc += w * v.to_f64();
                }
            }
        }
        Some(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> VoxelGrid<f32> {
        let dims = GridDims::new(3, 3, 3);
        #[allow(clippy::cast_precision_loss)]
        let data = (0..dims.len()).map(|i| i as f32).collect();
        VoxelGrid::from_vec(dims, data).unwrap()
    }

    #[test]
    fn test_get_set_bounds() {
        let mut grid: VoxelGrid<u32> = VoxelGrid::zeros(GridDims::new(2, 2, 2));
        assert!(grid.set(VoxelKey::new(1, 1, 1), 7));
        assert_eq!(grid.get(VoxelKey::new(1, 1, 1)), Some(7));
        assert!(!grid.set(VoxelKey::new(2, 0, 0), 7));
        assert_eq!(grid.get(VoxelKey::new(-1, 0, 0)), None);
        assert_eq!(grid.count_nonzero(), 1);
    }

    #[test]
    fn test_from_vec_length_check() {
        let err = VoxelGrid::<u8>::from_vec(GridDims::new(2, 2, 2), vec![0; 7]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 8,
                actual: 7,
                ..
            }
        ));
    }

    #[test]
    fn test_fill_and_clear() {
        let mut grid: VoxelGrid<u8> = VoxelGrid::zeros(GridDims::new(4, 4, 4));
        grid.fill(5);
        assert_eq!(grid.count_nonzero(), 64);
        grid.clear();
        assert_eq!(grid.count_nonzero(), 0);
    }

    #[test]
    fn test_trilinear_midpoint() {
        let grid = ramp();
        // Linear field: value = x + 3y + 9z, so trilinear is exact.
        let v = grid
            .sample_index(&Point3::new(0.5, 0.5, 0.5), Interpolation::Trilinear)
            .unwrap();
        assert_relative_eq!(v, 0.5 + 1.5 + 4.5);
    }

    #[test]
    fn test_trilinear_on_last_voxel() {
        let grid = ramp();
        let v = grid
            .sample_index(&Point3::new(2.0, 2.0, 2.0), Interpolation::Trilinear)
            .unwrap();
        assert_relative_eq!(v, 26.0);
        assert!(grid
            .sample_index(&Point3::new(2.5, 0.0, 0.0), Interpolation::Trilinear)
            .is_none());
    }

    #[test]
    fn test_sample_world_uses_transform() {
        let grid = ramp().with_transform(Affine::from_spacing(2.0, 2.0, 2.0).unwrap());
        let v = grid
            .sample_world(&Point3::new(2.0, 0.0, 0.0), Interpolation::Nearest)
            .unwrap();
        assert_relative_eq!(v, 1.0);
        assert_relative_eq!(grid.world_of(VoxelKey::new(1, 1, 1)), Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_non_finite_points_sample_nothing() {
        let mut grid = ramp();
        grid.set(VoxelKey::new(0, 0, 0), 7.0);
        for interpolation in [Interpolation::Nearest, Interpolation::Trilinear] {
            let nan = Point3::new(f64::NAN, f64::NAN, f64::NAN);
            assert_eq!(grid.sample_world(&nan, interpolation), None);
            let inf = Point3::new(f64::INFINITY, 0.0, 0.0);
            assert_eq!(grid.sample_index(&inf, interpolation), None);
            let far = Point3::new(1.0e12, 0.0, 0.0);
            assert_eq!(grid.sample_index(&far, interpolation), None);
        }
        assert_relative_eq!(
            grid.sample_index(&Point3::origin(), Interpolation::Nearest).unwrap(),
            7.0
        );
    }

    #[test]
    fn test_scalar_from_f64_rounds_and_saturates() {
        assert_eq!(u8::from_f64(2.6), 3);
        assert_eq!(u8::from_f64(-4.0), 0);
        assert_eq!(i16::from_f64(1e9), i16::MAX);
        assert!(0u32.is_zero());
    }
}
