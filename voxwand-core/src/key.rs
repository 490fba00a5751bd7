//! Voxel identity and grid extents.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Integer grid position of a voxel.
///
/// Two voxels are the same entity iff their keys are equal. Keys may hold
/// coordinates outside any particular grid (neighbors of a border voxel);
/// [`GridDims::linear_index`] is the bounds check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelKey {
    /// X index (fastest varying in memory).
    pub x: i32,
    /// Y index.
    pub y: i32,
    /// Z index (slowest varying in memory).
    pub z: i32,
}

impl VoxelKey {
    /// Creates a new key.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the key shifted by an offset, or `None` if a component leaves
    /// the `i32` range.
    #[inline]
    #[must_use]
    pub fn offset(self, (dx, dy, dz): (i32, i32, i32)) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    /// Iterates the 26 Moore neighbors in [`NEIGHBOR_OFFSETS`] order.
    ///
    /// Neighbors outside the `i32` range are skipped.
    pub fn neighbors(self) -> impl Iterator<Item = VoxelKey> {
        NEIGHBOR_OFFSETS.iter().filter_map(move |&d| self.offset(d))
    }

    /// Checks if this key is 26-adjacent to another.
    #[inline]
    #[must_use]
    pub fn is_adjacent(&self, other: &Self) -> bool {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        dx <= 1 && dy <= 1 && dz <= 1 && (dx, dy, dz) != (0, 0, 0)
    }
}

impl From<(i32, i32, i32)> for VoxelKey {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for VoxelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Moore neighborhood offsets, `dx` outermost and `dz` innermost, origin skipped.
pub const NEIGHBOR_OFFSETS: [(i32, i32, i32); 26] = {
    let mut out = [(0, 0, 0); 26];
    let mut n = 0;
    let mut dx = -1;
    while dx <= 1 {
        let mut dy = -1;
        while dy <= 1 {
            let mut dz = -1;
            while dz <= 1 {
                if dx != 0 || dy != 0 || dz != 0 {
                    out[n] = (dx, dy, dz);
                    n += 1;
                }
                dz += 1;
            }
            dy += 1;
        }
        dx += 1;
    }
    out
};

/// Extent of a voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridDims {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridDims {
    /// Creates grid dimensions.
    #[must_use]
    pub const fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    /// Total number of voxels.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Returns true if any axis has zero extent.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the key addresses a voxel of this grid.
    #[inline]
    #[must_use]
    pub fn contains(&self, key: VoxelKey) -> bool {
        self.linear_index(key).is_some()
    }

    /// Flattens a key into a linear index (x fastest), or `None` when out of bounds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn linear_index(&self, key: VoxelKey) -> Option<usize> {
        if key.x < 0 || key.y < 0 || key.z < 0 {
            return None;
        }
        let (x, y, z) = (key.x as usize, key.y as usize, key.z as usize);
        if x >= self.nx || y >= self.ny || z >= self.nz {
            return None;
        }
        Some((z * self.ny + y) * self.nx + x)
    }

    /// Inverse of [`Self::linear_index`]. The index must be `< self.len()`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn key_of(&self, index: usize) -> VoxelKey {
        debug_assert!(index < self.len());
        let x = index % self.nx;
        let y = (index / self.nx) % self.ny;
        let z = index / (self.nx * self.ny);
        VoxelKey::new(x as i32, y as i32, z as i32)
    }
}

impl fmt::Display for GridDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_offsets_order() {
        assert_eq!(NEIGHBOR_OFFSETS.len(), 26);
        assert_eq!(NEIGHBOR_OFFSETS[0], (-1, -1, -1));
        assert_eq!(NEIGHBOR_OFFSETS[1], (-1, -1, 0));
        assert_eq!(NEIGHBOR_OFFSETS[25], (1, 1, 1));
        assert!(!NEIGHBOR_OFFSETS.contains(&(0, 0, 0)));
    }

    #[test]
    fn test_linear_index_round_trip() {
        let dims = GridDims::new(4, 3, 2);
        let key = VoxelKey::new(3, 2, 1);
        let idx = dims.linear_index(key).unwrap();
        assert_eq!(idx, 23);
        assert_eq!(dims.key_of(idx), key);
    }

    #[test]
    fn test_linear_index_rejects_out_of_bounds() {
        let dims = GridDims::new(4, 3, 2);
        assert_eq!(dims.linear_index(VoxelKey::new(-1, 0, 0)), None);
        assert_eq!(dims.linear_index(VoxelKey::new(4, 0, 0)), None);
        assert_eq!(dims.linear_index(VoxelKey::new(0, 3, 0)), None);
        assert_eq!(dims.linear_index(VoxelKey::new(0, 0, 2)), None);
    }

    #[test]
    fn test_adjacency() {
        let a = VoxelKey::new(5, 5, 5);
        assert!(a.is_adjacent(&VoxelKey::new(6, 6, 6)));
        assert!(a.is_adjacent(&VoxelKey::new(4, 5, 5)));
        assert!(!a.is_adjacent(&a));
        assert!(!a.is_adjacent(&VoxelKey::new(7, 5, 5)));
        assert_eq!(a.neighbors().count(), 26);
    }

    #[test]
    fn test_offset_at_range_edge() {
        let edge = VoxelKey::new(i32::MAX, 0, i32::MIN);
        assert_eq!(edge.offset((1, 0, 0)), None);
        assert_eq!(edge.offset((0, 0, -1)), None);
        assert_eq!(
            edge.offset((-1, 2, 1)),
            Some(VoxelKey::new(i32::MAX - 1, 2, i32::MIN + 1))
        );
        assert_eq!(edge.neighbors().count(), 11);
        assert!(!edge.is_adjacent(&VoxelKey::new(i32::MIN, 0, i32::MIN)));
    }
}
