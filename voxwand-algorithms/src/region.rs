//! Breadth-first region growing ("magic wand").
//!
//! One traversal serves both growth policies: the policy is a tagged value
//! deciding which voxels are admitted and whether the search is step-capped.
//! Working memory lives in a reusable [`SelectorState`] so repeated clicks on
//! the same session do not reallocate the visited array.

use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use voxwand_core::{
    AdaptiveSearchConfig, Category, LabelId, Scalar, SelectorConfig, VolumeSet, VoxelKey,
    VoxelRef,
};

/// Per-call thresholds for new-region growth.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectParams {
    /// Inclusive lower bound on background intensity.
    pub local_min: f64,
    /// Inclusive upper bound on background intensity.
    pub global_max: f64,
}

impl SelectParams {
    /// Creates thresholds.
    #[must_use]
    pub fn new(local_min: f64, global_max: f64) -> Self {
        Self {
            local_min,
            global_max,
        }
    }

    /// Thresholds with the configured default upper bound.
    #[must_use]
    pub fn with_local_min(local_min: f64, config: &SelectorConfig) -> Self {
        Self::new(local_min, config.global_max)
    }
}

/// Admission rule for one region-growing run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GrowthPolicy {
    /// Grow over voxels carrying exactly this nonzero label.
    ExpandLabel(LabelId),
    /// Grow over unlabeled, non-excluded voxels whose background lies in range.
    Threshold {
        /// Inclusive lower bound.
        local_min: f64,
        /// Inclusive upper bound.
        global_max: f64,
    },
}

impl GrowthPolicy {
    /// Picks the policy from the lesion label at the seed, or `None` outside the grid.
    #[must_use]
    pub fn for_seed(volumes: &VolumeSet, seed: VoxelKey, params: SelectParams) -> Option<Self> {
        let label = volumes.lesion.get(seed)?;
        Some(if label == 0 {
            GrowthPolicy::Threshold {
                local_min: params.local_min,
                global_max: params.global_max,
            }
        } else {
            GrowthPolicy::ExpandLabel(label)
        })
    }

    /// True if the voxel at `index` may join the component.
    #[inline]
    #[must_use]
    pub fn admits(&self, volumes: &VolumeSet, index: usize) -> bool {
        match *self {
            GrowthPolicy::ExpandLabel(label) => volumes.lesion.at(index) == label,
            GrowthPolicy::Threshold {
                local_min,
                global_max,
            } => {
                let value = volumes.background.at(index).to_f64();
                value >= local_min
                    && value <= global_max
                    && volumes.lesion.at(index) == 0
                    && !volumes.is_excluded(index)
            }
        }
    }

    /// Step cap for this policy; label expansion always covers the whole region.
    #[must_use]
    pub fn step_cap(&self, config: &SelectorConfig) -> Option<usize> {
        match self {
            GrowthPolicy::ExpandLabel(_) => None,
            GrowthPolicy::Threshold { .. } => Some(config.max_steps),
        }
    }
}

/// Result of one region-growing run.
#[derive(Debug, Clone, Default)]
pub struct Component {
    /// Voxels in discovery order.
    pub voxels: Vec<VoxelRef>,
    /// Policy the run used; `None` when the seed was outside the grid.
    pub policy: Option<GrowthPolicy>,
    /// Number of voxels whose neighbors were examined.
    pub steps: usize,
    /// True if the step cap stopped the search with voxels still queued.
    pub truncated: bool,
}

impl Component {
    /// Number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// Returns true if no voxel was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Iterates the voxel keys.
    pub fn keys(&self) -> impl Iterator<Item = VoxelKey> + '_ {
        self.voxels.iter().map(|v| v.key)
    }
}

/// Reusable working memory for [`RegionSelector`].
#[derive(Debug, Default)]
pub struct SelectorState {
    visited: Vec<bool>,
    touched: Vec<usize>,
    queue: VecDeque<usize>,
}

impl SelectorState {
    /// Creates empty state; buffers grow on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the previous run, resizing for a grid of `len` voxels.
    fn prepare(&mut self, len: usize) {
        if self.visited.len() == len {
            for &i in &self.touched {
                self.visited[i] = false;
            }
        } else {
            self.visited.clear();
            self.visited.resize(len, false);
        }
        self.touched.clear();
        self.queue.clear();
    }

    #[inline]
    fn visit(&mut self, index: usize) -> bool {
        if self.visited[index] {
            return false;
        }
        self.visited[index] = true;
        self.touched.push(index);
        true
    }
}

/// Region growing over a [`VolumeSet`].
#[derive(Debug, Clone, Default)]
pub struct RegionSelector {
    config: SelectorConfig,
}

impl RegionSelector {
    /// Creates a selector with the given configuration.
    #[must_use]
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    /// Selector configuration.
    #[must_use]
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Grows the 26-connected component around `seed`.
    ///
    /// The policy is chosen from the lesion label at the seed. A seed outside
    /// the grid, or one the policy rejects, yields an empty component.
    pub fn select(
        &self,
        volumes: &VolumeSet,
        seed: VoxelKey,
        params: SelectParams,
        state: &mut SelectorState,
    ) -> Component {
        let Some(policy) = GrowthPolicy::for_seed(volumes, seed, params) else {
            debug!("seed {seed} outside grid {}", volumes.dims());
            return Component::default();
        };
        match policy {
            GrowthPolicy::ExpandLabel(label) => {
                debug!("computing existing component for label {label} from {seed}");
            }
            GrowthPolicy::Threshold { local_min, .. } => {
                debug!("computing new component from {seed} with local_min {local_min}");
            }
        }
        self.grow(volumes, seed, policy, state)
    }

    /// Runs the traversal with an explicit policy.
    pub fn grow(
        &self,
        volumes: &VolumeSet,
        seed: VoxelKey,
        policy: GrowthPolicy,
        state: &mut SelectorState,
    ) -> Component {
        let dims = volumes.dims();
        let mut component = Component {
            policy: Some(policy),
            ..Component::default()
        };
        let Some(seed_index) = dims.linear_index(seed) else {
            return component;
        };

        state.prepare(dims.len());
        state.visit(seed_index);
        if !policy.admits(volumes, seed_index) {
            return component;
        }
        component.voxels.push(make_ref(volumes, seed, seed_index));
        state.queue.push_back(seed_index);

        let cap = policy.step_cap(&self.config);
        while let Some(index) = state.queue.pop_front() {
            if cap.is_some_and(|cap| component.steps >= cap) {
                component.truncated = true;
                break;
            }
            component.steps += 1;

            let key = dims.key_of(index);
            for neighbor in key.neighbors() {
                let Some(n) = dims.linear_index(neighbor) else {
                    continue;
                };
                if !state.visit(n) {
                    continue;
                }
                if policy.admits(volumes, n) {
                    component.voxels.push(make_ref(volumes, neighbor, n));
                    state.queue.push_back(n);
                }
            }
        }

        if component.truncated {
            debug!(
                "step cap {} reached, returning partial component of {} voxels",
                self.config.max_steps,
                component.len()
            );
        }
        component
    }

    /// Threshold search that lowers `local_min` until component growth settles.
    ///
    /// Label expansion seeds fall through to a single [`Self::select`]. This
    /// search is experimental; [`Self::select`] is the reference behavior.
    pub fn search_threshold(
        &self,
        volumes: &VolumeSet,
        seed: VoxelKey,
        params: SelectParams,
        adaptive: &AdaptiveSearchConfig,
        state: &mut SelectorState,
    ) -> AdaptiveOutcome {
        let mut outcome = AdaptiveOutcome {
            component: Component::default(),
            local_min: params.local_min,
            iterations: 0,
        };
        match GrowthPolicy::for_seed(volumes, seed, params) {
            Some(GrowthPolicy::Threshold { .. }) => {}
            _ => {
                outcome.component = self.select(volumes, seed, params, state);
                outcome.iterations = 1;
                return outcome;
            }
        }

        let mut search_min = params.local_min;
        let mut ratio = 0.0_f64;
        let mut last_len: Option<usize> = None;
        while outcome.iterations < adaptive.max_iterations {
            let component = self.select(
                volumes,
                seed,
                SelectParams::new(search_min, params.global_max),
                state,
            );
            outcome.iterations += 1;

            let mut delta = None;
            if let Some(prev) = last_len {
                #[allow(clippy::cast_precision_loss)]
                let next = if prev == 0 {
                    if component.is_empty() {
                        1.0
                    } else {
                        f64::INFINITY
                    }
                } else {
                    component.len() as f64 / prev as f64
                };
                delta = Some(next - ratio);
                ratio = next;
            }
            last_len = Some(component.len());
            outcome.component = component;
            outcome.local_min = search_min;

            search_min -= adaptive.decrement;
            if search_min <= adaptive.floor {
                break;
            }
            if delta.is_some_and(|d| d.abs() < adaptive.tolerance) {
                break;
            }
            if (ratio - 1.0).abs() < f64::EPSILON {
                break;
            }
        }
        debug!(
            "threshold search settled at local_min {} after {} iterations ({} voxels)",
            outcome.local_min,
            outcome.iterations,
            outcome.component.len()
        );
        outcome
    }
}

/// Result of [`RegionSelector::search_threshold`].
#[derive(Debug, Clone)]
pub struct AdaptiveOutcome {
    /// Last component grown.
    pub component: Component,
    /// Lower threshold that produced `component`.
    pub local_min: f64,
    /// Number of growth runs performed.
    pub iterations: usize,
}

fn make_ref(volumes: &VolumeSet, key: VoxelKey, index: usize) -> VoxelRef {
    VoxelRef {
        key,
        index,
        background: volumes.background.at(index).to_f64(),
        lesion: volumes.lesion.at(index),
        category: Category::Selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use voxwand_core::{GridDims, VoxelGrid};

    fn volumes(dims: GridDims) -> VolumeSet {
        VolumeSet::empty(dims)
    }

    fn fill_box(grid: &mut VoxelGrid<f32>, lo: (i32, i32, i32), hi: (i32, i32, i32), v: f32) {
        for z in lo.2..=hi.2 {
            for y in lo.1..=hi.1 {
                for x in lo.0..=hi.0 {
                    grid.set(VoxelKey::new(x, y, z), v);
                }
            }
        }
    }

    fn keyset(component: &Component) -> BTreeSet<VoxelKey> {
        component.keys().collect()
    }

    #[test]
    fn test_threshold_growth_box() {
        let mut v = volumes(GridDims::new(16, 16, 16));
        fill_box(&mut v.background, (4, 4, 4), (6, 6, 6), 10.0);
        let selector = RegionSelector::default();
        let mut state = SelectorState::new();
        let c = selector.select(
            &v,
            VoxelKey::new(5, 5, 5),
            SelectParams::new(5.0, 100.0),
            &mut state,
        );
        assert_eq!(c.len(), 27);
        assert!(!c.truncated);
        assert!(matches!(c.policy, Some(GrowthPolicy::Threshold { .. })));
        assert!(c.voxels.iter().all(|r| r.category == Category::Selected));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let mut v = volumes(GridDims::new(8, 8, 8));
        v.background.set(VoxelKey::new(1, 1, 1), 5.0);
        v.background.set(VoxelKey::new(2, 2, 2), 100.0);
        v.background.set(VoxelKey::new(3, 3, 3), 100.5);
        let c = RegionSelector::default().select(
            &v,
            VoxelKey::new(1, 1, 1),
            SelectParams::new(5.0, 100.0),
            &mut SelectorState::new(),
        );
        let keys = keyset(&c);
        assert!(keys.contains(&VoxelKey::new(2, 2, 2)));
        assert!(!keys.contains(&VoxelKey::new(3, 3, 3)));
    }

    #[test]
    fn test_diagonal_connectivity() {
        let mut v = volumes(GridDims::new(8, 8, 8));
        for i in 0..5 {
            v.background.set(VoxelKey::new(i, i, i), 10.0);
        }
        let c = RegionSelector::default().select(
            &v,
            VoxelKey::new(0, 0, 0),
            SelectParams::new(5.0, 100.0),
            &mut SelectorState::new(),
        );
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn test_exclusions_respected() {
        let dims = GridDims::new(8, 8, 8);
        let mut v = volumes(dims);
        fill_box(&mut v.background, (0, 0, 0), (7, 7, 7), 10.0);
        let mut mask = VoxelGrid::zeros(dims);
        mask.set(VoxelKey::new(3, 3, 3), 1);
        v = v.with_choroid_plexus(mask).unwrap();
        v.lesion.set(VoxelKey::new(4, 4, 4), 3);

        let c = RegionSelector::default().select(
            &v,
            VoxelKey::new(0, 0, 0),
            SelectParams::new(5.0, 100.0),
            &mut SelectorState::new(),
        );
        let keys = keyset(&c);
        assert_eq!(keys.len(), 512 - 2);
        assert!(!keys.contains(&VoxelKey::new(3, 3, 3)));
        assert!(!keys.contains(&VoxelKey::new(4, 4, 4)));
        for r in &c.voxels {
            assert!(r.background >= 5.0 && r.background <= 100.0);
            assert_eq!(r.lesion, 0);
        }
    }

    #[test]
    fn test_label_expansion_exact_region() {
        let mut v = volumes(GridDims::new(10, 10, 10));
        // Two blobs of label 2 joined only through a diagonal, one separate blob.
        v.lesion.set(VoxelKey::new(1, 1, 1), 2);
        v.lesion.set(VoxelKey::new(2, 1, 1), 2);
        v.lesion.set(VoxelKey::new(3, 2, 2), 2);
        v.lesion.set(VoxelKey::new(8, 8, 8), 2);
        // Adjacent voxel with another label is not part of the region.
        v.lesion.set(VoxelKey::new(1, 2, 1), 4);

        let c = RegionSelector::default().select(
            &v,
            VoxelKey::new(1, 1, 1),
            SelectParams::new(0.0, 0.0),
            &mut SelectorState::new(),
        );
        let expected: BTreeSet<_> = [(1, 1, 1), (2, 1, 1), (3, 2, 2)]
            .into_iter()
            .map(VoxelKey::from)
            .collect();
        assert_eq!(keyset(&c), expected);
        assert_eq!(c.policy, Some(GrowthPolicy::ExpandLabel(2)));
    }

    #[test]
    fn test_label_expansion_ignores_step_cap() {
        let mut v = volumes(GridDims::new(12, 12, 12));
        for z in 0..12 {
            for y in 0..12 {
                for x in 0..12 {
                    v.lesion.set(VoxelKey::new(x, y, z), 1);
                }
            }
        }
        let selector = RegionSelector::new(SelectorConfig::new().with_max_steps(3));
        let c = selector.select(
            &v,
            VoxelKey::new(6, 6, 6),
            SelectParams::new(0.0, 0.0),
            &mut SelectorState::new(),
        );
        assert_eq!(c.len(), 12 * 12 * 12);
        assert!(!c.truncated);
    }

    #[test]
    fn test_step_cap_truncates() {
        let mut v = volumes(GridDims::new(32, 32, 32));
        v.background.fill(10.0);
        let selector = RegionSelector::new(SelectorConfig::new().with_max_steps(10));
        let c = selector.select(
            &v,
            VoxelKey::new(16, 16, 16),
            SelectParams::new(5.0, 100.0),
            &mut SelectorState::new(),
        );
        assert!(c.truncated);
        assert_eq!(c.steps, 10);
        assert!(c.len() <= 1 + 26 * 10);
        assert!(c.len() > 10);
    }

    #[test]
    fn test_out_of_bounds_seed_is_empty() {
        let v = volumes(GridDims::new(4, 4, 4));
        let c = RegionSelector::default().select(
            &v,
            VoxelKey::new(9, 0, 0),
            SelectParams::new(0.0, 1.0),
            &mut SelectorState::new(),
        );
        assert!(c.is_empty());
        assert!(c.policy.is_none());
    }

    #[test]
    fn test_rejected_seed_is_empty() {
        let v = volumes(GridDims::new(4, 4, 4));
        let c = RegionSelector::default().select(
            &v,
            VoxelKey::new(1, 1, 1),
            SelectParams::new(5.0, 100.0),
            &mut SelectorState::new(),
        );
        assert!(c.is_empty());
    }

    #[test]
    fn test_state_reuse_gives_same_result() {
        let mut v = volumes(GridDims::new(16, 16, 16));
        fill_box(&mut v.background, (2, 2, 2), (5, 5, 5), 10.0);
        fill_box(&mut v.background, (9, 9, 9), (12, 12, 12), 10.0);
        let selector = RegionSelector::default();
        let mut state = SelectorState::new();
        let params = SelectParams::new(5.0, 100.0);
        let first = selector.select(&v, VoxelKey::new(3, 3, 3), params, &mut state);
        let other = selector.select(&v, VoxelKey::new(10, 10, 10), params, &mut state);
        let again = selector.select(&v, VoxelKey::new(3, 3, 3), params, &mut state);
        assert_eq!(first.len(), 64);
        assert_eq!(other.len(), 64);
        assert_eq!(keyset(&first), keyset(&again));
    }

    #[test]
    fn test_adaptive_search_stops_when_growth_settles() {
        let mut v = volumes(GridDims::new(16, 16, 16));
        fill_box(&mut v.background, (4, 4, 4), (8, 8, 8), 10.0);
        let selector = RegionSelector::default();
        let adaptive = AdaptiveSearchConfig {
            decrement: 1.0,
            floor: 0.5,
            ..AdaptiveSearchConfig::default()
        };
        let outcome = selector.search_threshold(
            &v,
            VoxelKey::new(6, 6, 6),
            SelectParams::new(9.0, 100.0),
            &adaptive,
            &mut SelectorState::new(),
        );
        // Lowering from 9 to 8 selects the same box, so the ratio hits 1.
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.component.len(), 125);
        assert!((outcome.local_min - 8.0).abs() < 1e-9);
    }
}
