//! Editing session: owns the grids and overlays, and redraws meshes after
//! every state change.

use crate::marching_cubes::IsosurfaceExtractor;
use crate::mesh::{CenteredScale, TriangleMesh};
use crate::region::{Component, RegionSelector, SelectParams, SelectorState};
use crate::store::SelectionStore;
use log::{debug, info};
use nalgebra::Point3;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use voxwand_core::{Category, EditorConfig, LabelId, Result, VolumeSet, VoxelKey};

/// Mesh slots maintained by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeshSlot {
    /// Preview of the current selection and brush strokes.
    Selection,
    /// Voxels committed during the session.
    Lesion,
}

impl MeshSlot {
    /// Every slot, in redraw order.
    pub const ALL: [MeshSlot; 2] = [MeshSlot::Selection, MeshSlot::Lesion];

    /// Category whose color the slot is drawn with.
    #[must_use]
    pub const fn category(self) -> Category {
        match self {
            MeshSlot::Selection => Category::Selected,
            MeshSlot::Lesion => Category::Lesion,
        }
    }
}

/// Consumer of meshes and category colors, typically a scene host.
pub trait MeshSink {
    /// Takes ownership of a freshly built mesh for `slot`.
    fn add_mesh(&mut self, slot: MeshSlot, mesh: TriangleMesh);

    /// Releases the mesh previously added for `slot`, if any.
    fn release_mesh(&mut self, slot: MeshSlot);

    /// Clears the scene before a redraw adds fresh meshes.
    fn clear(&mut self);

    /// Sets the `#rrggbb` color used for a category.
    fn set_category_color(&mut self, category: Category, hex: &str);
}

/// Sink that keeps the latest mesh per slot for callers to pull.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    meshes: BTreeMap<MeshSlot, TriangleMesh>,
    colors: BTreeMap<Category, String>,
    adds: usize,
    releases: usize,
    clears: usize,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest mesh for `slot`.
    #[must_use]
    pub fn mesh(&self, slot: MeshSlot) -> Option<&TriangleMesh> {
        self.meshes.get(&slot)
    }

    /// Removes and returns the mesh for `slot`.
    pub fn take(&mut self, slot: MeshSlot) -> Option<TriangleMesh> {
        self.meshes.remove(&slot)
    }

    /// Color last set for `category`.
    #[must_use]
    pub fn color(&self, category: Category) -> Option<&str> {
        self.colors.get(&category).map(String::as_str)
    }

    /// Number of meshes added so far.
    #[must_use]
    pub fn add_count(&self) -> usize {
        self.adds
    }

    /// Number of release calls so far.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.releases
    }

    /// Number of scene clears so far.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl MeshSink for RecordingSink {
    fn add_mesh(&mut self, slot: MeshSlot, mesh: TriangleMesh) {
        self.adds += 1;
        self.meshes.insert(slot, mesh);
    }

    fn release_mesh(&mut self, slot: MeshSlot) {
        self.releases += 1;
        self.meshes.remove(&slot);
    }

    fn clear(&mut self) {
        self.clears += 1;
        self.meshes.clear();
    }

    fn set_category_color(&mut self, category: Category, hex: &str) {
        self.colors.insert(category, hex.to_string());
    }
}

/// Outcome of a selection click.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectSummary {
    /// Voxels in the new current selection.
    pub voxels: usize,
    /// Voxels expanded by the traversal.
    pub steps: usize,
    /// True if the step cap cut the traversal short.
    pub truncated: bool,
    /// Lower threshold actually used, which differs from the request only
    /// when the adaptive search is enabled.
    pub local_min: f64,
}

/// One interactive editing session over a [`VolumeSet`].
///
/// Every mutating operation takes `&mut self` and finishes with a redraw, so
/// the sink always reflects the latest overlay state.
#[derive(Debug)]
pub struct EditorSession<S: MeshSink> {
    volumes: VolumeSet,
    config: EditorConfig,
    selector: RegionSelector,
    extractor: IsosurfaceExtractor,
    store: SelectionStore,
    state: SelectorState,
    scale: CenteredScale,
    sink: S,
}

impl<S: MeshSink> EditorSession<S> {
    /// Starts a session after validating `config`.
    ///
    /// # Errors
    /// Returns [`voxwand_core::Error::InvalidConfig`] for invalid configuration.
    pub fn new(volumes: VolumeSet, config: EditorConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let scale = CenteredScale::new(volumes.dims(), config.mesh.position_scale);
        Ok(Self {
            selector: RegionSelector::new(config.selector.clone()),
            extractor: IsosurfaceExtractor::new(config.mesh.clone()),
            store: SelectionStore::new(config.preview_marker),
            state: SelectorState::new(),
            scale,
            volumes,
            config,
            sink,
        })
    }

    /// Grids being edited.
    #[must_use]
    pub fn volumes(&self) -> &VolumeSet {
        &self.volumes
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Selection overlays.
    #[must_use]
    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    /// Mesh sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mesh sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Ends the session, handing back the grids and the sink.
    #[must_use]
    pub fn into_parts(self) -> (VolumeSet, S) {
        (self.volumes, self.sink)
    }

    /// Grows a selection from `seed` with the configured upper bound.
    pub fn select(&mut self, seed: VoxelKey, local_min: f64) -> SelectSummary {
        let params = SelectParams::with_local_min(local_min, &self.config.selector);
        self.select_with(seed, params)
    }

    /// Grows a selection from `seed`, replacing the current one, and redraws.
    pub fn select_with(&mut self, seed: VoxelKey, params: SelectParams) -> SelectSummary {
        let (component, local_min) = match &self.config.selector.adaptive {
            Some(adaptive) => {
                let outcome = self.selector.search_threshold(
                    &self.volumes,
                    seed,
                    params,
                    adaptive,
                    &mut self.state,
                );
                (outcome.component, outcome.local_min)
            }
            None => (
                self.selector
                    .select(&self.volumes, seed, params, &mut self.state),
                params.local_min,
            ),
        };
        let summary = summarize(&component, local_min);
        self.store.replace_current(&component);
        self.store.draw_preview(&mut self.volumes);
        self.redraw();
        summary
    }

    /// Paints one voxel; returns `false` if it lies outside the grid.
    pub fn paint(&mut self, key: VoxelKey) -> bool {
        let painted = self
            .store
            .paint(&mut self.volumes, key, Category::Selected);
        if painted {
            self.redraw();
        }
        painted
    }

    /// Paints the cube of half-width `radius` around `center`.
    pub fn paint_brush(&mut self, center: VoxelKey, radius: u32) -> usize {
        let painted = self.store.paint_brush(&mut self.volumes, center, radius);
        if painted > 0 {
            self.redraw();
        }
        painted
    }

    /// Discards brush strokes.
    pub fn clear_paint(&mut self) {
        self.store.clear_paint(&mut self.volumes);
        self.redraw();
    }

    /// Commits the selection under `label`, or the configured default label.
    pub fn commit(&mut self, label: Option<LabelId>) -> usize {
        let label = label.unwrap_or(self.config.default_label);
        let committed = self.store.commit(&mut self.volumes, label);
        if committed > 0 {
            self.redraw();
        }
        committed
    }

    /// Unlabels the selection.
    pub fn remove(&mut self) -> usize {
        let removed = self.store.remove(&mut self.volumes);
        if removed > 0 {
            self.redraw();
        }
        removed
    }

    /// Releases both meshes, rebuilds them from the overlays, and pushes
    /// category colors.
    pub fn redraw(&mut self) {
        for slot in MeshSlot::ALL {
            self.sink.release_mesh(slot);
        }
        self.sink.clear();

        let selection = self
            .extractor
            .build(self.store.selected().map(|v| v.key), &self.scale);
        let lesion = self
            .extractor
            .build(self.store.lesion_labels().values().map(|v| v.key), &self.scale);
        debug!(
            "redraw: {} selection triangles, {} lesion triangles",
            selection.face_count(),
            lesion.face_count()
        );
        if !selection.is_empty() {
            self.sink.add_mesh(MeshSlot::Selection, selection);
        }
        if !lesion.is_empty() {
            self.sink.add_mesh(MeshSlot::Lesion, lesion);
        }
        for category in Category::ALL {
            self.sink
                .set_category_color(category, category.default_color());
        }
    }

    /// Samples the background at a world position with the configured interpolation.
    #[must_use]
    pub fn background_at(&self, world: &Point3<f64>) -> Option<f64> {
        self.volumes
            .background
            .sample_world(world, self.config.interpolation)
    }
}

fn summarize(component: &Component, local_min: f64) -> SelectSummary {
    if component.truncated {
        info!(
            "selection truncated at {} voxels after {} steps",
            component.len(),
            component.steps
        );
    }
    SelectSummary {
        voxels: component.len(),
        steps: component.steps,
        truncated: component.truncated,
        local_min,
    }
}
