pub mod export;
pub mod import;
pub mod polygonize;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use sdf_core::{Aabb, Point3};

/// Indexed triangle mesh. Triangles wind counter-clockwise seen from outside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

#[inline]
pub(crate) fn cross(a: Point3, b: Point3) -> Point3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub(crate) fn dot(a: Point3, b: Point3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub(crate) fn sub(a: Point3, b: Point3) -> Point3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Unnormalised face normal; its length is twice the triangle area.
#[inline]
pub(crate) fn face_normal(a: Point3, b: Point3, c: Point3) -> Point3 {
    cross(sub(b, a), sub(c, a))
}

impl Mesh {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Builds an indexed mesh from loose triangles, merging bit-identical vertices.
    pub fn from_triangle_soup<I>(triangles: I) -> Self
    where
        I: IntoIterator<Item = [Point3; 3]>,
    {
        let mut mesh = Self::empty();
        let mut cache = HashMap::<(u64, u64, u64), u32>::new();
        for [a, b, c] in triangles {
            let i0 = mesh.weld_vertex(&mut cache, a);
            let i1 = mesh.weld_vertex(&mut cache, b);
            let i2 = mesh.weld_vertex(&mut cache, c);
            mesh.triangles.push([i0, i1, i2]);
        }
        mesh
    }

    fn weld_vertex(&mut self, cache: &mut HashMap<(u64, u64, u64), u32>, point: Point3) -> u32 {
        // Normalise -0.0 so mirrored coordinates weld.
        let key_of = |v: f64| if v == 0.0 { 0.0_f64.to_bits() } else { v.to_bits() };
        let key = (key_of(point[0]), key_of(point[1]), key_of(point[2]));
        if let Some(index) = cache.get(&key).copied() {
            return index;
        }
        let index = self.vertices.len() as u32;
        self.vertices.push(point);
        cache.insert(key, index);
        index
    }

    pub fn triangle(&self, index: usize) -> [Point3; 3] {
        let [a, b, c] = self.triangles[index];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    pub fn triangle_points(&self) -> impl Iterator<Item = [Point3; 3]> + '_ {
        (0..self.triangles.len()).map(|index| self.triangle(index))
    }

    /// Signed enclosed volume (divergence theorem); positive for outward winding.
    pub fn volume(&self) -> f64 {
        self.triangle_points()
            .map(|[a, b, c]| dot(a, cross(b, c)) / 6.0)
            .sum()
    }

    pub fn area(&self) -> f64 {
        self.triangle_points()
            .map(|[a, b, c]| dot(face_normal(a, b, c), face_normal(a, b, c)).sqrt() * 0.5)
            .sum()
    }

    /// Bounds of the referenced vertices, `None` when there are no triangles.
    pub fn bounds(&self) -> Option<Aabb> {
        if self.triangles.is_empty() {
            return None;
        }
        Aabb::from_points(
            self.triangles
                .iter()
                .flat_map(|tri| tri.iter().map(|&i| self.vertices[i as usize])),
        )
    }

    /// Every undirected edge is shared by exactly two triangles.
    pub fn is_watertight(&self) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let mut counts = HashMap::<(u32, u32), usize>::new();
        for tri in &self.triangles {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        counts.values().all(|&count| count == 2)
    }
}

pub use export::{to_binary_stl, to_dxf, to_step};
pub use import::{MeshIoError, read_dxf, read_obj, read_ply, read_step, read_stl};
pub use polygonize::{GridConfig, extract_mesh_from_sdf, extract_mesh_with, polygonize};


#[cfg(test)]
mod tests {
    use super::Mesh;
    use super::test_support::unit_cube;

    #[test]
    fn empty_mesh_has_no_geometry() {
        let mesh = Mesh::empty();
        assert!(mesh.vertices.is_empty());
        assert!(mesh.triangles.is_empty());
        assert!(mesh.bounds().is_none());
        assert!(!mesh.is_watertight());
    }

    #[test]
    fn unit_cube_metrics() {
        let cube = unit_cube();
        assert!((cube.volume() - 1.0).abs() < 1e-12);
        assert!((cube.area() - 6.0).abs() < 1e-12);
        assert!(cube.is_watertight());
        let bounds = cube.bounds().expect("bounds");
        assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn triangle_soup_welds_shared_corners() {
        let cube = unit_cube();
        let soup = Mesh::from_triangle_soup(cube.triangle_points());
        assert_eq!(soup.vertices.len(), 8);
        assert_eq!(soup.triangles.len(), 12);
        assert!(soup.is_watertight());
    }
}
