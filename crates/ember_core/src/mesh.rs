//! Triangle mesh storage shared between primitives.

use std::sync::Arc;

use ember_math::{Aabb, Vec2, Vec3};

/// An indexed triangle mesh.
///
/// Normals and uvs are optional; faces fall back to the geometric normal and
/// barycentric uvs when they are absent.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    /// Three indices per triangle.
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a mesh from positions and triangle indices.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let mut bounds = Aabb::EMPTY;
        for p in &positions {
            bounds.grow(*p);
        }
        Self {
            positions,
            normals: Vec::new(),
            uvs: Vec::new(),
            indices,
            bounds,
        }
    }

    /// Attach per-vertex normals.
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    /// Attach per-vertex uvs.
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// The three vertex positions of a face.
    #[inline]
    pub fn triangle(&self, face: usize) -> (Vec3, Vec3, Vec3) {
        let i = face * 3;
        (
            self.positions[self.indices[i] as usize],
            self.positions[self.indices[i + 1] as usize],
            self.positions[self.indices[i + 2] as usize],
        )
    }

    /// True when any face has a repeated vertex index or zero area.
    pub fn has_degenerate_faces(&self) -> bool {
        (0..self.triangle_count()).any(|f| {
            let i = f * 3;
            let (a, b, c) = (
                self.indices[i],
                self.indices[i + 1],
                self.indices[i + 2],
            );
            if a == b || b == c || a == c {
                return true;
            }
            let (v0, v1, v2) = self.triangle(f);
            (v1 - v0).cross(v2 - v0).length_squared() < 1e-20
        })
    }
}

/// Shared handle to an immutable mesh.
pub type MeshHandle = Arc<Mesh>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_bounds() {
        let mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(0.0, 2.0, 0.0)],
            vec![0, 1, 2],
        );
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.bounds.max(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_degenerate_detection() {
        let mesh = Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 1]);
        assert!(mesh.has_degenerate_faces());

        let ok = Mesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        assert!(!ok.has_degenerate_faces());
    }
}
