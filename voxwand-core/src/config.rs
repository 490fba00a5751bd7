//! Configuration for selection, meshing, and the editing session.

use crate::{Error, Interpolation, LabelId, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Region-growing configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SelectorConfig {
    /// Maximum voxels expanded by new-region growth before returning a partial result.
    pub max_steps: usize,
    /// Default upper bound on background intensity.
    pub global_max: f64,
    /// Adaptive threshold search; `None` runs the single-pass growth.
    pub adaptive: Option<AdaptiveSearchConfig>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            max_steps: 5000,
            global_max: 100_000.0,
            adaptive: None,
        }
    }
}

impl SelectorConfig {
    /// Creates a selector configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the step cap.
    #[must_use]
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Sets the default intensity upper bound.
    #[must_use]
    pub fn with_global_max(mut self, global_max: f64) -> Self {
        self.global_max = global_max;
        self
    }

    /// Enables the adaptive threshold search.
    #[must_use]
    pub fn with_adaptive(mut self, adaptive: AdaptiveSearchConfig) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for a zero step cap or a non-finite bound.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::InvalidConfig("max_steps must be at least 1".into()));
        }
        if self.global_max.is_nan() {
            return Err(Error::InvalidConfig("global_max must be a number".into()));
        }
        if let Some(adaptive) = &self.adaptive {
            adaptive.validate()?;
        }
        Ok(())
    }
}

/// Parameters of the adaptive threshold search.
///
/// The search lowers the lower threshold in fixed decrements and stops once
/// the growth ratio between successive components settles. It has not been
/// validated against annotated data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AdaptiveSearchConfig {
    /// Amount subtracted from the lower threshold per iteration.
    pub decrement: f64,
    /// The search never lowers the threshold to or below this value.
    pub floor: f64,
    /// Stop once the change in growth ratio is below this tolerance.
    pub tolerance: f64,
    /// Hard cap on iterations.
    pub max_iterations: usize,
}

impl Default for AdaptiveSearchConfig {
    fn default() -> Self {
        Self {
            decrement: 0.01,
            floor: 1.0,
            tolerance: 0.01,
            max_iterations: 1000,
        }
    }
}

impl AdaptiveSearchConfig {
    fn validate(&self) -> Result<()> {
        if self.decrement <= 0.0 || self.decrement.is_nan() {
            return Err(Error::InvalidConfig(
                "adaptive.decrement must be positive".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "adaptive.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Isosurface extraction configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeshConfig {
    /// Indicator threshold; corners strictly above it are inside.
    pub iso_level: f64,
    /// Divisor applied after centering voxel indices on the grid middle.
    pub position_scale: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            iso_level: 0.0,
            position_scale: 32.0,
        }
    }
}

impl MeshConfig {
    /// Sets the iso-level.
    #[must_use]
    pub fn with_iso_level(mut self, iso_level: f64) -> Self {
        self.iso_level = iso_level;
        self
    }

    /// Sets the position scale divisor.
    #[must_use]
    pub fn with_position_scale(mut self, scale: f64) -> Self {
        self.position_scale = scale;
        self
    }
}

/// Top-level editing session configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EditorConfig {
    pub selector: SelectorConfig,
    pub mesh: MeshConfig,
    /// Interpolation preference for world-space sampling.
    pub interpolation: Interpolation,
    /// Value written into the sandbox for previewed voxels.
    pub preview_marker: u8,
    /// Label used when a commit does not name one.
    pub default_label: LabelId,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            mesh: MeshConfig::default(),
            interpolation: Interpolation::Nearest,
            preview_marker: 5,
            default_label: 1,
        }
    }
}

impl EditorConfig {
    /// Checks every nested section.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.selector.validate()?;
        if self.preview_marker == 0 {
            return Err(Error::InvalidConfig(
                "preview_marker must be nonzero".into(),
            ));
        }
        if self.default_label == 0 {
            return Err(Error::InvalidConfig("default_label must be nonzero".into()));
        }
        if self.mesh.position_scale == 0.0 || self.mesh.position_scale.is_nan() {
            return Err(Error::InvalidConfig(
                "mesh.position_scale must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
