//! Selected-voxel records and their display categories.

use crate::VoxelKey;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Label id stored in the lesion map. Zero means unlabeled.
pub type LabelId = u32;

/// Display category of a voxel, used only for coloring downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Category {
    /// Part of the live selection preview.
    Selected,
    /// Context voxels.
    Background,
    /// Committed to the lesion map.
    Lesion,
}

impl Category {
    /// All categories, in the order colors are pushed to a sink.
    pub const ALL: [Category; 3] = [Category::Selected, Category::Background, Category::Lesion];

    /// Name used by the rendering host.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Category::Selected => "selected",
            Category::Background => "background",
            Category::Lesion => "lesion",
        }
    }

    /// Default `#rrggbb` color.
    #[must_use]
    pub const fn default_color(self) -> &'static str {
        match self {
            Category::Selected => "#ff00ff",
            Category::Background => "#ffff00",
            Category::Lesion => "#f54242",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A voxel materialized by a selection, with cached samples.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelRef {
    /// Grid position.
    pub key: VoxelKey,
    /// Linear index into grids of the session's dimensions.
    pub index: usize,
    /// Background intensity at selection time.
    pub background: f64,
    /// Lesion label at selection time.
    pub lesion: LabelId,
    /// Display category.
    pub category: Category,
}

impl VoxelRef {
    /// Returns a copy with a different category.
    #[must_use]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}
