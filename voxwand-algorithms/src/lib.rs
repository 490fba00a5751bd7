//! voxwand-algorithms: Region growing and surface extraction for voxel editing.
//!
//! This crate provides the interactive editing engine:
//! - **Region growing** - 26-connected BFS with label-expansion and threshold policies
//! - **Marching cubes** - triangle meshes from selection indicator fields
//! - **Selection store** - current selection, brush strokes, and committed labels
//! - **Editor session** - ties the above to a mesh sink and redraws after each edit
//!
#![warn(missing_docs)]

mod marching_cubes;
pub mod mesh;
mod region;
mod session;
mod store;
pub mod tables;

pub use marching_cubes::IsosurfaceExtractor;
pub use mesh::{CenteredScale, IndexSpace, PositionScale, TriangleMesh};
pub use region::{
    AdaptiveOutcome, Component, GrowthPolicy, RegionSelector, SelectParams, SelectorState,
};
pub use session::{EditorSession, MeshSink, MeshSlot, RecordingSink, SelectSummary};
pub use store::SelectionStore;
