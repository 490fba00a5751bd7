//! Binary STL export of extracted meshes.

use crate::Result;
use std::fs;
use std::path::Path;
use voxwand_algorithms::TriangleMesh;

/// Serializes `mesh` as binary STL: an 80-byte header, a `u32` triangle
/// count, then 50 bytes per triangle.
#[must_use]
pub fn mesh_to_binary_stl_bytes(mesh: &TriangleMesh, header_name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(84 + mesh.face_count() * 50);

    let mut header = [0u8; 80];
    let name_bytes = header_name.as_bytes();
    let copy_n = name_bytes.len().min(header.len());
    header[..copy_n].copy_from_slice(&name_bytes[..copy_n]);
    out.extend_from_slice(&header);

    #[allow(clippy::cast_possible_truncation)]
    let count = mesh.face_count() as u32;
    out.extend_from_slice(&count.to_le_bytes());

    let normals = mesh.face_normals();
    for (i, tri) in mesh.triangles().enumerate() {
        let normal = normals.get(i).copied().unwrap_or_default();
        for c in normal.iter() {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for p in &tri {
            for c in p.iter() {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }

    out
}

/// Writes `mesh` to `path` as binary STL.
///
/// # Errors
/// Returns [`crate::Error::Io`] if the write fails.
pub fn write_binary_stl(path: &Path, mesh: &TriangleMesh, header_name: &str) -> Result<()> {
    let bytes = mesh_to_binary_stl_bytes(mesh, header_name);
    fs::write(path, bytes)?;
    Ok(())
}
