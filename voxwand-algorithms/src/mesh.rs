//! Triangle meshes produced by isosurface extraction.

use nalgebra::{Point3, Vector3};
use voxwand_core::GridDims;

/// Maps fractional voxel indices to rendering coordinates.
pub trait PositionScale {
    /// Rendering position of an index-space point.
    fn apply(&self, index: &Point3<f64>) -> Point3<f32>;
}

impl<F> PositionScale for F
where
    F: Fn(&Point3<f64>) -> Point3<f32>,
{
    fn apply(&self, index: &Point3<f64>) -> Point3<f32> {
        self(index)
    }
}

/// Leaves index coordinates unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexSpace;

impl PositionScale for IndexSpace {
    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, index: &Point3<f64>) -> Point3<f32> {
        index.map(|c| c as f32)
    }
}

/// Centers indices on the grid middle and divides by a constant:
/// `(i - dim / 2) / divisor` per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenteredScale {
    center: Vector3<f64>,
    divisor: f64,
}

impl CenteredScale {
    /// Creates a scale for grids of `dims`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(dims: GridDims, divisor: f64) -> Self {
        Self {
            center: Vector3::new(
                dims.nx as f64 / 2.0,
                dims.ny as f64 / 2.0,
                dims.nz as f64 / 2.0,
            ),
            divisor,
        }
    }
}

impl PositionScale for CenteredScale {
    #[allow(clippy::cast_possible_truncation)]
    fn apply(&self, index: &Point3<f64>) -> Point3<f32> {
        ((index - self.center) / self.divisor).map(|c| c as f32)
    }
}

/// Unwelded triangle soup with face and vertex normals.
///
/// Every face owns its three vertices, so vertex normals equal the normal of
/// the face that owns them once [`TriangleMesh::compute_normals`] has run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    vertices: Vec<Point3<f32>>,
    faces: Vec<[u32; 3]>,
    face_normals: Vec<Vector3<f32>>,
    vertex_normals: Vec<Vector3<f32>>,
}

impl TriangleMesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mesh with room for `faces` triangles.
    #[must_use]
    pub fn with_capacity(faces: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(faces * 3),
            faces: Vec::with_capacity(faces),
            ..Self::default()
        }
    }

    /// Appends a triangle as a new face with three new vertices.
    pub fn push_triangle(&mut self, triangle: [Point3<f32>; 3]) {
        #[allow(clippy::cast_possible_truncation)]
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&triangle);
        self.faces.push([base, base + 1, base + 2]);
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns true if the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Vertex positions.
    #[must_use]
    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    /// Vertex indices per triangle.
    #[must_use]
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Unit face normals; empty until [`Self::compute_normals`] runs.
    #[must_use]
    pub fn face_normals(&self) -> &[Vector3<f32>] {
        &self.face_normals
    }

    /// Unit vertex normals; empty until [`Self::compute_normals`] runs.
    #[must_use]
    pub fn vertex_normals(&self) -> &[Vector3<f32>] {
        &self.vertex_normals
    }

    /// Computes face normals from winding, then accumulates them per vertex.
    ///
    /// Degenerate faces get a zero normal.
    pub fn compute_normals(&mut self) {
        self.face_normals = self
            .faces
            .iter()
            .map(|&[a, b, c]| {
                let a = self.vertices[a as usize];
                let b = self.vertices[b as usize];
                let c = self.vertices[c as usize];
                (b - a)
                    .cross(&(c - a))
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(Vector3::zeros)
            })
            .collect();

        let mut acc = vec![Vector3::zeros(); self.vertices.len()];
        for (face, normal) in self.faces.iter().zip(&self.face_normals) {
            for &v in face {
                acc[v as usize] += normal;
            }
        }
        self.vertex_normals = acc
            .into_iter()
            .map(|n| n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros))
            .collect();
    }

    /// Iterates triangles as vertex triples.
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f32>; 3]> + '_ {
        self.faces.iter().map(|&[a, b, c]| {
            [
                self.vertices[a as usize],
                self.vertices[b as usize],
                self.vertices[c as usize],
            ]
        })
    }

    /// Axis-aligned bounds of all vertices, or `None` for an empty mesh.
    #[must_use]
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_and_normals() {
        let mut mesh = TriangleMesh::new();
        mesh.push_triangle([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.compute_normals();
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_relative_eq!(mesh.face_normals()[0], Vector3::z());
        for n in mesh.vertex_normals() {
            assert_relative_eq!(*n, Vector3::z());
        }
    }

    #[test]
    fn test_degenerate_face_has_zero_normal() {
        let mut mesh = TriangleMesh::new();
        let p = Point3::new(1.0, 1.0, 1.0);
        mesh.push_triangle([p, p, p]);
        mesh.compute_normals();
        assert_eq!(mesh.face_normals()[0], Vector3::zeros());
    }

    #[test]
    fn test_centered_scale() {
        let scale = CenteredScale::new(GridDims::new(64, 64, 32), 32.0);
        let p = scale.apply(&Point3::new(32.0, 0.0, 16.0));
        assert_relative_eq!(p, Point3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_bounds() {
        let mut mesh = TriangleMesh::new();
        assert!(mesh.bounds().is_none());
        mesh.push_triangle([
            Point3::new(-1.0, 0.0, 2.0),
            Point3::new(1.0, 3.0, 0.0),
            Point3::new(0.0, -2.0, 1.0),
        ]);
        let (lo, hi) = mesh.bounds().unwrap();
        assert_relative_eq!(lo, Point3::new(-1.0, -2.0, 0.0));
        assert_relative_eq!(hi, Point3::new(1.0, 3.0, 2.0));
    }
}
