//! Marching-cubes surface extraction over a selection's indicator field.
//!
//! Selected voxels have value 1 and all others 0. Cube corners sit on voxel
//! centers, so the unit cubes covering a selection span its bounding box grown
//! by one voxel per side; the outermost layer closes the surface.

use crate::mesh::{PositionScale, TriangleMesh};
use crate::tables::{CORNERS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use log::debug;
use nalgebra::Point3;
use voxwand_core::{MeshConfig, VoxelKey};

/// Builds triangle meshes from voxel selections.
#[derive(Debug, Clone, Default)]
pub struct IsosurfaceExtractor {
    config: MeshConfig,
}

impl IsosurfaceExtractor {
    /// Creates an extractor.
    #[must_use]
    pub fn new(config: MeshConfig) -> Self {
        Self { config }
    }

    /// Extraction configuration.
    #[must_use]
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Extracts the surface enclosing `keys`, mapped through `scale`.
    ///
    /// Duplicate keys are harmless. An empty selection yields an empty mesh.
    pub fn build<I, P>(&self, keys: I, scale: &P) -> TriangleMesh
    where
        I: IntoIterator<Item = VoxelKey>,
        P: PositionScale + ?Sized,
    {
        let keys: Vec<VoxelKey> = keys.into_iter().collect();
        let Some(field) = IndicatorField::from_keys(&keys) else {
            return TriangleMesh::new();
        };

        let mut mesh = TriangleMesh::new();
        let mut triangles = Vec::with_capacity(5);
        let (lo, hi) = (field.origin, field.far_corner());
        for z in lo[2]..hi[2] {
            for y in lo[1]..hi[1] {
                for x in lo[0]..hi[0] {
                    let mut values = [0.0; 8];
                    let mut positions = [Point3::origin(); 8];
                    for (i, &(cx, cy, cz)) in CORNERS.iter().enumerate() {
                        let corner = [x + i64::from(cx), y + i64::from(cy), z + i64::from(cz)];
                        values[i] = field.value(corner);
                        #[allow(clippy::cast_precision_loss)]
                        let position = corner.map(|c| c as f64);
                        positions[i] = Point3::from(position);
                    }

                    triangles.clear();
                    self.polygonize_cube(&values, &positions, &mut triangles);
                    for tri in &triangles {
                        mesh.push_triangle([
                            scale.apply(&tri[0]),
                            scale.apply(&tri[1]),
                            scale.apply(&tri[2]),
                        ]);
                    }
                }
            }
        }
        mesh.compute_normals();
        debug!(
            "extracted {} triangles from {} voxels",
            mesh.face_count(),
            keys.len()
        );
        mesh
    }

    /// Triangulates one cube, appending triangles to `out`.
    ///
    /// Corner `i` counts as inside when `values[i]` exceeds the iso-level.
    /// Triangles wind counter-clockwise seen from outside. Returns the number
    /// of triangles added.
    pub fn polygonize_cube(
        &self,
        values: &[f64; 8],
        positions: &[Point3<f64>; 8],
        out: &mut Vec<[Point3<f64>; 3]>,
    ) -> usize {
        let iso = self.config.iso_level;
        let case = values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > iso)
            .fold(0usize, |acc, (i, _)| acc | (1 << i));

        let crossed = EDGE_TABLE[case];
        if crossed == 0 {
            return 0;
        }

        let mut edge_points = [Point3::origin(); 12];
        for (edge, &(a, b)) in EDGE_CORNERS.iter().enumerate() {
            if crossed & (1 << edge) != 0 {
                edge_points[edge] =
                    interpolate(iso, &positions[a], &positions[b], values[a], values[b]);
            }
        }

        let before = out.len();
        for tri in TRI_TABLE[case].chunks_exact(3) {
            if tri[0] < 0 {
                break;
            }
            #[allow(clippy::cast_sign_loss)]
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            // Table winding faces the set corners; reverse it to face outward.
            out.push([edge_points[a], edge_points[c], edge_points[b]]);
        }
        out.len() - before
    }
}

/// Point on the edge `p0 -> p1` where the linear field crosses `iso`.
fn interpolate(iso: f64, p0: &Point3<f64>, p1: &Point3<f64>, v0: f64, v1: f64) -> Point3<f64> {
    let mu = if (v1 - v0).abs() < f64::EPSILON {
        0.5
    } else {
        ((iso - v0) / (v1 - v0)).clamp(0.0, 1.0)
    };
    p0 + (p1 - p0) * mu
}

/// Dense 0/1 lattice covering the padded bounding box of a selection.
///
/// Lattice coordinates are `i64` so padding never overflows at the edge of
/// the key range.
struct IndicatorField {
    origin: [i64; 3],
    extent: [usize; 3],
    inside: Vec<bool>,
}

impl IndicatorField {
    fn from_keys(keys: &[VoxelKey]) -> Option<Self> {
        let first = *keys.first()?;
        let (lo, hi) = keys.iter().fold((first, first), |(lo, hi), k| {
            (
                VoxelKey::new(lo.x.min(k.x), lo.y.min(k.y), lo.z.min(k.z)),
                VoxelKey::new(hi.x.max(k.x), hi.y.max(k.y), hi.z.max(k.z)),
            )
        });
        let (lo, hi) = (lattice(lo), lattice(hi));
        let origin = lo.map(|c| c - 1);
        let extent = [
            usize::try_from(hi[0] - lo[0] + 3).ok()?,
            usize::try_from(hi[1] - lo[1] + 3).ok()?,
            usize::try_from(hi[2] - lo[2] + 3).ok()?,
        ];
        let len = extent[0].checked_mul(extent[1])?.checked_mul(extent[2])?;
        let mut field = Self {
            origin,
            extent,
            inside: vec![false; len],
        };
        for &k in keys {
            if let Some(i) = field.index(lattice(k)) {
                field.inside[i] = true;
            }
        }
        Some(field)
    }

    /// Last lattice corner; cube origins run up to but excluding it.
    #[allow(clippy::cast_possible_wrap)]
    fn far_corner(&self) -> [i64; 3] {
        [
            self.origin[0] + self.extent[0] as i64 - 1,
            self.origin[1] + self.extent[1] as i64 - 1,
            self.origin[2] + self.extent[2] as i64 - 1,
        ]
    }

    fn index(&self, p: [i64; 3]) -> Option<usize> {
        let dx = usize::try_from(p[0] - self.origin[0]).ok()?;
        let dy = usize::try_from(p[1] - self.origin[1]).ok()?;
        let dz = usize::try_from(p[2] - self.origin[2]).ok()?;
        if dx >= self.extent[0] || dy >= self.extent[1] || dz >= self.extent[2] {
            return None;
        }
        Some((dz * self.extent[1] + dy) * self.extent[0] + dx)
    }

    fn value(&self, p: [i64; 3]) -> f64 {
        match self.index(p) {
            Some(i) if self.inside[i] => 1.0,
            _ => 0.0,
        }
    }
}

fn lattice(key: VoxelKey) -> [i64; 3] {
    [i64::from(key.x), i64::from(key.y), i64::from(key.z)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::IndexSpace;
    use approx::assert_relative_eq;

    fn unit_positions() -> [Point3<f64>; 8] {
        CORNERS.map(|(x, y, z)| Point3::new(f64::from(x), f64::from(y), f64::from(z)))
    }

    #[test]
    fn test_uniform_cube_has_no_triangles() {
        let mc = IsosurfaceExtractor::default();
        let mut out = Vec::new();
        assert_eq!(mc.polygonize_cube(&[0.0; 8], &unit_positions(), &mut out), 0);
        assert_eq!(mc.polygonize_cube(&[1.0; 8], &unit_positions(), &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_differing_corner_has_one_triangle() {
        let mc = IsosurfaceExtractor::default();
        for corner in 0..8 {
            let mut values = [0.0; 8];
            values[corner] = 1.0;
            let mut out = Vec::new();
            assert_eq!(mc.polygonize_cube(&values, &unit_positions(), &mut out), 1);

            let mut values = [1.0; 8];
            values[corner] = 0.0;
            let mut out = Vec::new();
            assert_eq!(mc.polygonize_cube(&values, &unit_positions(), &mut out), 1);
        }
    }

    #[test]
    fn test_half_iso_places_vertices_at_midpoints() {
        let mc = IsosurfaceExtractor::new(MeshConfig::default().with_iso_level(0.5));
        let mut values = [0.0; 8];
        values[0] = 1.0;
        let mut out = Vec::new();
        mc.polygonize_cube(&values, &unit_positions(), &mut out);
        for p in out[0] {
            let coords = [p.x, p.y, p.z];
            assert_eq!(coords.iter().filter(|&&c| (c - 0.5).abs() < 1e-12).count(), 1);
            assert_eq!(coords.iter().filter(|&&c| c.abs() < 1e-12).count(), 2);
        }
    }

    #[test]
    fn test_interpolate_equal_values_uses_midpoint() {
        let p = interpolate(
            0.0,
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(2.0, 0.0, 0.0),
            1.0,
            1.0,
        );
        assert_relative_eq!(p, Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_single_voxel_is_closed_and_faces_outward() {
        let mc = IsosurfaceExtractor::new(MeshConfig::default().with_iso_level(0.5));
        let center = VoxelKey::new(4, 4, 4);
        let mesh = mc.build([center], &IndexSpace);
        assert_eq!(mesh.face_count(), 8);
        let c = Point3::new(4.0_f32, 4.0, 4.0);
        for (tri, n) in mesh.triangles().zip(mesh.face_normals()) {
            let centroid = Point3::from((tri[0].coords + tri[1].coords + tri[2].coords) / 3.0);
            assert!(n.dot(&(centroid - c)) > 0.0);
        }
    }

    #[test]
    fn test_default_iso_keeps_triangle_count() {
        let mesh = IsosurfaceExtractor::default().build([VoxelKey::new(0, 0, 0)], &IndexSpace);
        assert_eq!(mesh.face_count(), 8);
        assert_eq!(mesh.vertex_normals().len(), mesh.vertex_count());
    }

    #[test]
    fn test_keys_at_range_edge() {
        let keys = [
            VoxelKey::new(i32::MAX, i32::MIN, 0),
            VoxelKey::new(i32::MIN, i32::MAX, 0),
        ];
        let mesh = IsosurfaceExtractor::default().build([keys[0]], &IndexSpace);
        assert_eq!(mesh.face_count(), 8);
        let (lo, hi) = mesh.bounds().unwrap();
        assert!(lo.x > 2.0e9 && hi.y < -2.0e9);
        // A bounding box spanning the whole key range is too large to lattice.
        assert!(IsosurfaceExtractor::default().build(keys, &IndexSpace).is_empty());
    }

    #[test]
    fn test_empty_selection() {
        let mesh = IsosurfaceExtractor::default().build(std::iter::empty(), &IndexSpace);
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_block_surface_is_bounded() {
        let mut keys = Vec::new();
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    keys.push(VoxelKey::new(x, y, z));
                }
            }
        }
        let mc = IsosurfaceExtractor::new(MeshConfig::default().with_iso_level(0.5));
        let mesh = mc.build(keys, &IndexSpace);
        assert!(!mesh.is_empty());
        let (lo, hi) = mesh.bounds().unwrap();
        assert_relative_eq!(lo, Point3::new(-0.5, -0.5, -0.5));
        assert_relative_eq!(hi, Point3::new(2.5, 2.5, 2.5));
    }
}
