//! The named grids of one editing session.

use crate::{Error, GridDims, LabelId, Result, VoxelGrid};

/// Every grid the editor works with. All grids share one extent.
///
/// `t1` and `flair` are carried for display only; growth reads `background`,
/// `choroid_plexus` and `lesion`, and previews are drawn into `sandbox`.
#[derive(Debug, Clone)]
pub struct VolumeSet {
    pub t1: Option<VoxelGrid<f32>>,
    pub flair: Option<VoxelGrid<f32>>,
    pub background: VoxelGrid<f32>,
    /// Nonzero voxels are never grown into.
    pub choroid_plexus: Option<VoxelGrid<u8>>,
    pub lesion: VoxelGrid<LabelId>,
    pub sandbox: VoxelGrid<u8>,
}

impl VolumeSet {
    /// Creates a set from the growth grids, with an empty sandbox.
    ///
    /// # Errors
    /// Returns [`Error::GridShapeMismatch`] if `lesion` differs in extent from `background`.
    pub fn new(background: VoxelGrid<f32>, lesion: VoxelGrid<LabelId>) -> Result<Self> {
        let dims = background.dims();
        check("lesion", dims, lesion.dims())?;
        let sandbox = VoxelGrid::zeros(dims).with_transform(background.transform().clone());
        Ok(Self {
            t1: None,
            flair: None,
            background,
            choroid_plexus: None,
            lesion,
            sandbox,
        })
    }

    /// Creates a set whose background and lesion grids are all zero.
    #[must_use]
    pub fn empty(dims: GridDims) -> Self {
        Self {
            t1: None,
            flair: None,
            background: VoxelGrid::zeros(dims),
            choroid_plexus: None,
            lesion: VoxelGrid::zeros(dims),
            sandbox: VoxelGrid::zeros(dims),
        }
    }

    /// Attaches the exclusion mask.
    ///
    /// # Errors
    /// Returns [`Error::GridShapeMismatch`] on an extent mismatch.
    pub fn with_choroid_plexus(mut self, mask: VoxelGrid<u8>) -> Result<Self> {
        check("choroid_plexus", self.dims(), mask.dims())?;
        self.choroid_plexus = Some(mask);
        Ok(self)
    }

    /// Attaches the display volumes.
    ///
    /// # Errors
    /// Returns [`Error::GridShapeMismatch`] on an extent mismatch.
    pub fn with_display(
        mut self,
        t1: Option<VoxelGrid<f32>>,
        flair: Option<VoxelGrid<f32>>,
    ) -> Result<Self> {
        if let Some(grid) = &t1 {
            check("t1", self.dims(), grid.dims())?;
        }
        if let Some(grid) = &flair {
            check("flair", self.dims(), grid.dims())?;
        }
        self.t1 = t1;
        self.flair = flair;
        Ok(self)
    }

    /// Shared extent of every grid.
    #[must_use]
    pub fn dims(&self) -> GridDims {
        self.background.dims()
    }

    /// True if the exclusion mask flags the voxel at `index`.
    #[inline]
    #[must_use]
    pub fn is_excluded(&self, index: usize) -> bool {
        self.choroid_plexus
            .as_ref()
            .is_some_and(|mask| mask.at(index) != 0)
    }
}

fn check(name: &'static str, expected: GridDims, actual: GridDims) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::GridShapeMismatch {
            name,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_is_reported() {
        let background = VoxelGrid::zeros(GridDims::new(4, 4, 4));
        let lesion = VoxelGrid::zeros(GridDims::new(4, 4, 5));
        let err = VolumeSet::new(background, lesion).unwrap_err();
        assert!(matches!(err, Error::GridShapeMismatch { name: "lesion", .. }));
    }

    #[test]
    fn test_exclusion_mask() {
        let dims = GridDims::new(2, 2, 2);
        let mut mask = VoxelGrid::zeros(dims);
        mask.set_at(3, 1);
        let volumes = VolumeSet::empty(dims).with_choroid_plexus(mask).unwrap();
        assert!(volumes.is_excluded(3));
        assert!(!volumes.is_excluded(2));
        assert!(!VolumeSet::empty(dims).is_excluded(3));
    }
}
