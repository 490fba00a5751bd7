//! voxwand CLI - Command-line interface for voxwand.
//!
//! Inspects NIfTI volumes, grows and commits lesion selections, and exports
//! selection or label surfaces as STL.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand};
use log::info;
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use thiserror::Error;
use voxwand_algorithms::{
    EditorSession, IsosurfaceExtractor, MeshSlot, RecordingSink, SelectParams,
};
use voxwand_core::{EditorConfig, LabelId, VolumeSet, VoxelGrid, VoxelKey};
use voxwand_io::{
    compress, download, export_volume, load_config, load_image, write_binary_stl, ElementType,
    MappedFileReader, NamedBlob, NiftiImage, VoxelBuffer, EXPORT_MIME,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    VoxwandIo(#[from] voxwand_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] voxwand_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Interactive lesion segmentation from the command line.
#[derive(Parser)]
#[command(name = "voxwand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header information for a NIfTI file
    Info {
        /// Input .nii or .nii.gz file
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Grow a selection from a seed voxel, optionally committing it as a label
    Select {
        /// Background intensity volume used for thresholding
        #[arg(long)]
        background: PathBuf,

        /// Existing lesion label volume
        #[arg(long)]
        lesion: Option<PathBuf>,

        /// Exclusion mask; nonzero voxels are never selected
        #[arg(long)]
        choroid_plexus: Option<PathBuf>,

        /// Seed voxel as x,y,z
        #[arg(long, value_parser = parse_seed)]
        seed: VoxelKey,

        /// Lower background threshold (inclusive)
        #[arg(long)]
        local_min: f64,

        /// Upper background threshold (inclusive)
        #[arg(long)]
        global_max: Option<f64>,

        /// Maximum voxels expanded when growing a new region
        #[arg(long)]
        max_steps: Option<usize>,

        /// Commit the selection into the lesion volume
        #[arg(long)]
        commit: bool,

        /// Label written on commit
        #[arg(long)]
        label: Option<LabelId>,

        /// Output .nii.gz: the label volume with --commit, else the selection mask
        #[arg(short, long)]
        output: PathBuf,

        /// Also write the resulting surface as binary STL
        #[arg(long)]
        mesh: Option<PathBuf>,

        /// JSON editor configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Extract the surface of one label as binary STL in world coordinates
    Mesh {
        /// Label volume
        labels: PathBuf,

        /// Label to extract
        #[arg(long, default_value = "1")]
        label: LabelId,

        /// Output STL file
        #[arg(short, long)]
        output: PathBuf,

        /// JSON editor configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_seed(s: &str) -> std::result::Result<VoxelKey, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z but got '{s}'"));
    };
    let parse = |v: &str| v.parse::<i32>().map_err(|e| format!("'{v}': {e}"));
    Ok(VoxelKey::new(parse(*x)?, parse(*y)?, parse(*z)?))
}

fn editor_config(path: Option<&Path>) -> Result<EditorConfig> {
    Ok(match path {
        Some(path) => load_config(path)?,
        None => EditorConfig::default(),
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { input, json } => {
            let header = MappedFileReader::open(&input)?.header()?;
            let element = header
                .element_type()
                .map_or_else(|_| format!("code {}", header.datatype()), |e| e.to_string());
            if json {
                let summary = serde_json::json!({
                    "file": input.display().to_string(),
                    "version": header.version().number(),
                    "byte_order": format!("{:?}", header.byte_order()),
                    "dim": &header.dim()[..=header.rank()],
                    "pixdim": &header.pixdim()[1..=3],
                    "datatype": element,
                    "vox_offset": header.vox_offset(),
                    "sform_code": header.sform_code(),
                    "qform_code": header.qform_code(),
                    "scaling": header.scaling(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("File: {}", input.display());
                println!(
                    "Format: NIfTI-{} ({:?} endian)",
                    header.version().number(),
                    header.byte_order()
                );
                println!("Dimensions: {}", header.dims());
                println!("Datatype: {} (bitpix {})", element, header.bitpix());
                println!(
                    "Voxel size: {:.3} x {:.3} x {:.3}",
                    header.pixdim()[1],
                    header.pixdim()[2],
                    header.pixdim()[3]
                );
                println!("Voxel offset: {}", header.vox_offset());
                if let Some((slope, inter)) = header.scaling() {
                    println!("Scaling: {} * v + {} (not applied)", slope, inter);
                }
                if header.is_multi_volume() {
                    println!("Note: multi-volume image; only the first volume is editable");
                }
            }
        }

        Commands::Select {
            background,
            lesion,
            choroid_plexus,
            seed,
            local_min,
            global_max,
            max_steps,
            commit,
            label,
            output,
            mesh,
            config,
        } => {
            let mut config = editor_config(config.as_deref())?;
            if let Some(global_max) = global_max {
                config.selector.global_max = global_max;
            }
            if let Some(max_steps) = max_steps {
                config.selector.max_steps = max_steps;
            }

            let background_image = load_image(&background)?;
            let background_grid: VoxelGrid<f32> = background_image.to_grid()?;
            let lesion_image = match &lesion {
                Some(path) => load_image(path)?,
                None => blank_like(&background_image, ElementType::I32)?,
            };
            let mut volumes = VolumeSet::new(background_grid, lesion_image.to_grid()?)?;
            if let Some(path) = &choroid_plexus {
                let mask: VoxelGrid<u8> = load_image(path)?.to_grid()?;
                volumes = volumes.with_choroid_plexus(mask)?;
            }

            let params = SelectParams::new(local_min, config.selector.global_max);
            let mut session = EditorSession::new(volumes, config, RecordingSink::new())?;
            let summary = session.select_with(seed, params);
            println!(
                "Selected {} voxels from {} ({} steps{})",
                summary.voxels,
                seed,
                summary.steps,
                if summary.truncated { ", truncated" } else { "" }
            );
            if summary.voxels == 0 {
                return Err(CliError::Usage(format!(
                    "seed {} selected nothing; check --local-min and the seed position",
                    seed
                )));
            }

            let slot = if commit {
                let committed = session.commit(label);
                println!("Committed {} voxels", committed);
                MeshSlot::Lesion
            } else {
                MeshSlot::Selection
            };

            let (volumes, mut sink) = session.into_parts();
            let blob = if commit {
                export_volume(&lesion_image, &volumes.lesion)?
            } else {
                let mask_image =
                    blank_like(&background_image, ElementType::U8)?.with_grid(&volumes.sandbox)?;
                NamedBlob {
                    name: "selection.nii.gz".to_string(),
                    mime_type: EXPORT_MIME.to_string(),
                    bytes: compress(&mask_image.encode()?)?,
                }
            };
            let written = download(&blob, &output)?;
            println!("Wrote {}", written.display());

            if let Some(mesh_path) = mesh {
                let surface = sink.take(slot).unwrap_or_default();
                write_binary_stl(&mesh_path, &surface, "voxwand")?;
                println!(
                    "Wrote {} triangles to {}",
                    surface.face_count(),
                    mesh_path.display()
                );
            }
        }

        Commands::Mesh {
            labels,
            label,
            output,
            config,
        } => {
            let config = editor_config(config.as_deref())?;
            let grid: VoxelGrid<LabelId> = load_image(&labels)?.to_grid()?;
            let keys: Vec<VoxelKey> = grid.keys_where(|v| v == label).collect();
            if keys.is_empty() {
                return Err(CliError::Usage(format!("label {} not present", label)));
            }
            info!("meshing {} voxels of label {}", keys.len(), label);

            let transform = grid.transform().clone();
            let to_world =
                move |p: &Point3<f64>| -> Point3<f32> { transform.to_world(p).map(|c| c as f32) };
            let surface = IsosurfaceExtractor::new(config.mesh).build(keys, &to_world);
            write_binary_stl(&output, &surface, "voxwand")?;
            println!(
                "Wrote {} triangles to {}",
                surface.face_count(),
                output.display()
            );
        }
    }

    Ok(())
}

/// An all-zero image of `element` sharing the geometry of `template`.
fn blank_like(template: &NiftiImage, element: ElementType) -> Result<NiftiImage> {
    let header = template.header().with_element_type(element);
    let data = VoxelBuffer::from_grid(
        element,
        &VoxelGrid::<u8>::zeros(template.header().dims()),
    );
    Ok(NiftiImage::new(header, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("1, 2,3").unwrap(), VoxelKey::new(1, 2, 3));
        assert!(parse_seed("1,2").is_err());
        assert!(parse_seed("a,b,c").is_err());
    }

    #[test]
    fn test_cli_parses_select() {
        let cli = Cli::try_parse_from([
            "voxwand",
            "select",
            "--background",
            "bg.nii.gz",
            "--seed",
            "32,32,32",
            "--local-min",
            "5",
            "--commit",
            "--label",
            "2",
            "-o",
            "out.nii.gz",
        ])
        .unwrap();
        match cli.command {
            Commands::Select {
                seed, commit, label, ..
            } => {
                assert_eq!(seed, VoxelKey::new(32, 32, 32));
                assert!(commit);
                assert_eq!(label, Some(2));
            }
            _ => panic!("expected select"),
        }
    }
}
