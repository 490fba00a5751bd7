//! Selection overlay state: the live flood-fill result, brush strokes, and
//! committed lesion labels.
//!
//! The store owns no grids. Operations that touch `lesion` or `sandbox` take
//! the session's [`VolumeSet`] explicitly.

use crate::region::Component;
use log::{debug, info};
use std::collections::BTreeMap;
use voxwand_core::{Category, LabelId, Scalar, VolumeSet, VoxelKey, VoxelRef};

/// Selection maps keyed by linear voxel index.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    current: BTreeMap<usize, VoxelRef>,
    paint: BTreeMap<usize, VoxelRef>,
    lesion_labels: BTreeMap<usize, VoxelRef>,
    marker: u8,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new(5)
    }
}

impl SelectionStore {
    /// Creates an empty store writing `marker` into the sandbox for previews.
    #[must_use]
    pub fn new(marker: u8) -> Self {
        Self {
            current: BTreeMap::new(),
            paint: BTreeMap::new(),
            lesion_labels: BTreeMap::new(),
            marker,
        }
    }

    /// Replaces the current selection wholesale.
    pub fn replace_current(&mut self, component: &Component) {
        self.current = component
            .voxels
            .iter()
            .map(|v| (v.index, v.with_category(Category::Selected)))
            .collect();
    }

    /// Clears the sandbox, then marks every voxel of the union.
    pub fn draw_preview(&self, volumes: &mut VolumeSet) {
        volumes.sandbox.clear();
        let mut drawn = 0;
        for v in self.selected() {
            volumes.sandbox.set_at(v.index, self.marker);
            drawn += 1;
        }
        debug!("highlighting {drawn} voxels");
    }

    /// Adds or overwrites one brush voxel and marks it in the sandbox.
    ///
    /// Returns `false` without side effects when `key` is outside the grid.
    pub fn paint(&mut self, volumes: &mut VolumeSet, key: VoxelKey, category: Category) -> bool {
        let Some(index) = volumes.dims().linear_index(key) else {
            return false;
        };
        let voxel = VoxelRef {
            key,
            index,
            background: volumes.background.at(index).to_f64(),
            lesion: volumes.lesion.at(index),
            category,
        };
        self.paint.insert(index, voxel);
        volumes.sandbox.set_at(index, self.marker);
        true
    }

    /// Paints the `(2r+1)^3` cube around `center`, skipping voxels outside the grid.
    ///
    /// Returns the number of voxels painted.
    pub fn paint_brush(&mut self, volumes: &mut VolumeSet, center: VoxelKey, radius: u32) -> usize {
        #[allow(clippy::cast_possible_wrap)]
        let r = radius as i32;
        let mut painted = 0;
        for dx in -r..=r {
            for dy in -r..=r {
                for dz in -r..=r {
                    let Some(key) = center.offset((dx, dy, dz)) else {
                        continue;
                    };
                    if self.paint(volumes, key, Category::Selected) {
                        painted += 1;
                    }
                }
            }
        }
        painted
    }

    /// Drops brush strokes and redraws the preview from the current selection.
    pub fn clear_paint(&mut self, volumes: &mut VolumeSet) {
        self.paint.clear();
        self.draw_preview(volumes);
    }

    /// Writes `label` into `lesion` for every selected voxel, then clears the
    /// sandbox and both selection maps.
    ///
    /// Returns the number of voxels committed; an empty selection is a no-op.
    pub fn commit(&mut self, volumes: &mut VolumeSet, label: LabelId) -> usize {
        let selected: Vec<VoxelRef> = self.selected().copied().collect();
        if selected.is_empty() {
            return 0;
        }
        for v in &selected {
            volumes.lesion.set_at(v.index, label);
            let committed = VoxelRef {
                lesion: label,
                ..v.with_category(Category::Lesion)
            };
            self.lesion_labels.insert(v.index, committed);
        }
        volumes.sandbox.clear();
        self.current.clear();
        self.paint.clear();
        info!("committed {} voxels with label {label}", selected.len());
        selected.len()
    }

    /// Unlabels every selected voxel and forgets it everywhere.
    ///
    /// Returns the number of voxels removed; an empty selection is a no-op.
    pub fn remove(&mut self, volumes: &mut VolumeSet) -> usize {
        let indices: Vec<usize> = self.selected().map(|v| v.index).collect();
        for &index in &indices {
            volumes.lesion.set_at(index, 0);
            volumes.sandbox.set_at(index, 0);
            self.current.remove(&index);
            self.paint.remove(&index);
            self.lesion_labels.remove(&index);
        }
        if !indices.is_empty() {
            info!("removed {} voxels", indices.len());
        }
        indices.len()
    }

    /// Union of the current selection and brush strokes, brush entries winning.
    pub fn selected(&self) -> impl Iterator<Item = &VoxelRef> + '_ {
        self.current
            .iter()
            .filter(move |(index, _)| !self.paint.contains_key(*index))
            .map(|(_, v)| v)
            .chain(self.paint.values())
    }

    /// Number of voxels in the union.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selected().count()
    }

    /// Returns true if nothing is selected or painted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.paint.is_empty()
    }

    /// Latest flood-fill result.
    #[must_use]
    pub fn current(&self) -> &BTreeMap<usize, VoxelRef> {
        &self.current
    }

    /// Accumulated brush strokes.
    #[must_use]
    pub fn painted(&self) -> &BTreeMap<usize, VoxelRef> {
        &self.paint
    }

    /// Voxels committed during this session, with their labels.
    #[must_use]
    pub fn lesion_labels(&self) -> &BTreeMap<usize, VoxelRef> {
        &self.lesion_labels
    }

    /// Sandbox value used for previews.
    #[must_use]
    pub fn marker(&self) -> u8 {
        self.marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{RegionSelector, SelectParams, SelectorState};
    use voxwand_core::GridDims;

    fn setup() -> (VolumeSet, Component) {
        let mut volumes = VolumeSet::empty(GridDims::new(8, 8, 8));
        for x in 2..5 {
            volumes.background.set(VoxelKey::new(x, 3, 3), 10.0);
        }
        let component = RegionSelector::default().select(
            &volumes,
            VoxelKey::new(3, 3, 3),
            SelectParams::new(5.0, 100.0),
            &mut SelectorState::new(),
        );
        (volumes, component)
    }

    #[test]
    fn test_replace_and_preview() {
        let (mut volumes, component) = setup();
        let mut store = SelectionStore::default();
        store.replace_current(&component);
        store.draw_preview(&mut volumes);
        assert_eq!(store.len(), 3);
        assert_eq!(volumes.sandbox.count_nonzero(), 3);
        assert_eq!(volumes.sandbox.get(VoxelKey::new(2, 3, 3)), Some(5));

        store.replace_current(&Component::default());
        store.draw_preview(&mut volumes);
        assert!(store.is_empty());
        assert_eq!(volumes.sandbox.count_nonzero(), 0);
    }

    #[test]
    fn test_paint_out_of_bounds() {
        let (mut volumes, _) = setup();
        let mut store = SelectionStore::default();
        assert!(!store.paint(&mut volumes, VoxelKey::new(-1, 0, 0), Category::Selected));
        assert!(store.paint(&mut volumes, VoxelKey::new(0, 0, 0), Category::Selected));
        assert_eq!(store.painted().len(), 1);
        assert_eq!(volumes.sandbox.at(0), 5);
    }

    #[test]
    fn test_paint_brush_clips_at_edges() {
        let (mut volumes, _) = setup();
        let mut store = SelectionStore::default();
        assert_eq!(store.paint_brush(&mut volumes, VoxelKey::new(4, 4, 4), 1), 27);
        assert_eq!(store.paint_brush(&mut volumes, VoxelKey::new(0, 0, 0), 1), 8);
        // Corner brush overlaps nothing from the first stroke.
        assert_eq!(store.len(), 35);
    }

    #[test]
    fn test_paint_brush_at_key_range_edge() {
        let (mut volumes, _) = setup();
        let mut store = SelectionStore::default();
        assert_eq!(store.paint_brush(&mut volumes, VoxelKey::new(i32::MAX, 0, 0), 1), 0);
        assert_eq!(store.paint_brush(&mut volumes, VoxelKey::new(0, i32::MIN, 0), 1), 0);
        assert!(store.is_empty());
        assert_eq!(volumes.sandbox.count_nonzero(), 0);
    }

    #[test]
    fn test_selection_union_counts_overlap_once() {
        let (mut volumes, component) = setup();
        let mut store = SelectionStore::default();
        store.replace_current(&component);
        store.paint(&mut volumes, VoxelKey::new(3, 3, 3), Category::Selected);
        store.paint(&mut volumes, VoxelKey::new(0, 0, 0), Category::Selected);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_commit_writes_labels_and_clears() {
        let (mut volumes, component) = setup();
        let mut store = SelectionStore::default();
        store.replace_current(&component);
        store.paint(&mut volumes, VoxelKey::new(7, 7, 7), Category::Selected);
        store.draw_preview(&mut volumes);

        assert_eq!(store.commit(&mut volumes, 2), 4);
        assert_eq!(volumes.lesion.get(VoxelKey::new(3, 3, 3)), Some(2));
        assert_eq!(volumes.lesion.get(VoxelKey::new(7, 7, 7)), Some(2));
        assert_eq!(volumes.sandbox.count_nonzero(), 0);
        assert!(store.is_empty());
        assert_eq!(store.lesion_labels().len(), 4);
        assert!(store
            .lesion_labels()
            .values()
            .all(|v| v.category == Category::Lesion && v.lesion == 2));
    }

    #[test]
    fn test_commit_empty_is_noop() {
        let (mut volumes, _) = setup();
        volumes.sandbox.set_at(0, 5);
        let mut store = SelectionStore::default();
        assert_eq!(store.commit(&mut volumes, 1), 0);
        assert_eq!(volumes.sandbox.at(0), 5);
        assert_eq!(volumes.lesion.count_nonzero(), 0);
    }

    #[test]
    fn test_remove_forgets_everywhere() {
        let (mut volumes, component) = setup();
        let mut store = SelectionStore::default();
        store.replace_current(&component);
        store.commit(&mut volumes, 3);

        let relabeled = RegionSelector::default().select(
            &volumes,
            VoxelKey::new(3, 3, 3),
            SelectParams::new(0.0, 0.0),
            &mut SelectorState::new(),
        );
        store.replace_current(&relabeled);
        store.draw_preview(&mut volumes);
        assert_eq!(store.remove(&mut volumes), 3);
        assert_eq!(volumes.lesion.count_nonzero(), 0);
        assert_eq!(volumes.sandbox.count_nonzero(), 0);
        assert!(store.lesion_labels().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_paint_keeps_current() {
        let (mut volumes, component) = setup();
        let mut store = SelectionStore::default();
        store.replace_current(&component);
        store.paint_brush(&mut volumes, VoxelKey::new(6, 6, 6), 0);
        store.clear_paint(&mut volumes);
        assert!(store.painted().is_empty());
        assert_eq!(volumes.sandbox.count_nonzero(), 3);
    }
}
