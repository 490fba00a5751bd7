//! JSON configuration files.
//!
//! The file schema nests editor settings under an `editor` key; every field
//! is optional and falls back to the [`EditorConfig`] defaults.

use crate::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use voxwand_core::{
    AdaptiveSearchConfig, EditorConfig, Interpolation, LabelId, MeshConfig, SelectorConfig,
};

// Intermediate structs for the on-disk schema
#[derive(Deserialize, Default)]
#[serde(default)]
struct JsonConfig {
    editor: JsonEditor,
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonEditor {
    selection: JsonSelection,
    mesh: JsonMesh,
    interpolation: Interpolation,
    preview_marker: u8,
    default_label: LabelId,
}

impl Default for JsonEditor {
    fn default() -> Self {
        let defaults = EditorConfig::default();
        Self {
            selection: JsonSelection::default(),
            mesh: JsonMesh::default(),
            interpolation: defaults.interpolation,
            preview_marker: defaults.preview_marker,
            default_label: defaults.default_label,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonSelection {
    max_bfs_steps: usize,
    global_max: f64,
    adaptive: Option<AdaptiveSearchConfig>,
}

impl Default for JsonSelection {
    fn default() -> Self {
        let defaults = SelectorConfig::default();
        Self {
            max_bfs_steps: defaults.max_steps,
            global_max: defaults.global_max,
            adaptive: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonMesh {
    iso_level: f64,
    position_scale: f64,
}

impl Default for JsonMesh {
    fn default() -> Self {
        let defaults = MeshConfig::default();
        Self {
            iso_level: defaults.iso_level,
            position_scale: defaults.position_scale,
        }
    }
}

/// Loads and validates an editor configuration file.
///
/// # Errors
/// Returns I/O, JSON, or validation errors.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EditorConfig> {
    let file = File::open(path)?;
    let json: JsonConfig = serde_json::from_reader(BufReader::new(file))?;
    from_json_config(json)
}

/// Parses and validates an editor configuration from a JSON string.
///
/// # Errors
/// Returns JSON or validation errors.
pub fn config_from_json(json: &str) -> Result<EditorConfig> {
    let json: JsonConfig = serde_json::from_str(json)?;
    from_json_config(json)
}

fn from_json_config(config: JsonConfig) -> Result<EditorConfig> {
    let editor = config.editor;
    let mut selector = SelectorConfig::new()
        .with_max_steps(editor.selection.max_bfs_steps)
        .with_global_max(editor.selection.global_max);
    selector.adaptive = editor.selection.adaptive;

    let config = EditorConfig {
        selector,
        mesh: MeshConfig::default()
            .with_iso_level(editor.mesh.iso_level)
            .with_position_scale(editor.mesh.position_scale),
        interpolation: editor.interpolation,
        preview_marker: editor.preview_marker,
        default_label: editor.default_label,
    };
    config.validate()?;
    Ok(config)
}
