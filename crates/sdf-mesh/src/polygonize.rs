use std::collections::HashMap;

use sdf_core::{Aabb, Point3, Sdf3};

use crate::{Mesh, dot, face_normal};

/// Cube corner offsets, indexed by the bit pattern `x | y << 1 | z << 2`.
const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Kuhn split of a cube into six tetrahedra sharing the 0-7 diagonal. Every cube uses
/// the same split, so faces of neighbouring cubes line up.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Grid padding in multiples of the spacing. Deliberately not a round number so grid
/// nodes rarely land exactly on faces of round-dimension solids.
const PADDING_CELLS: f64 = 1.37;

/// Cells across the thinnest feature. Keeps tetrahedron diagonals shorter than a wall.
const FEATURE_CELLS: f64 = 3.0;

/// Longest cell side over the shortest. Stretched cells shave edges off thin plates.
const MAX_CELL_ASPECT: f64 = 4.0;

/// Node budget in multiples of `max_resolution^3`.
const SAMPLE_BUDGET_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, Copy)]
pub struct GridConfig {
    pub min: Point3,
    pub max: Point3,
    pub resolution: [usize; 3],
}

impl GridConfig {
    pub fn new(min: Point3, max: Point3, resolution: [usize; 3]) -> Self {
        Self {
            min,
            max,
            resolution,
        }
    }

    /// Cubic cells of size `max(tolerance, extent / max_resolution)` covering `bounds`
    /// plus padding.
    pub fn for_bounds(bounds: &Aabb, tolerance: f64, max_resolution: usize) -> Self {
        Self::for_shape(bounds, [f64::INFINITY; 3], tolerance, max_resolution)
    }

    /// Like [`GridConfig::for_bounds`], but every axis is refined until
    /// `FEATURE_CELLS` cells fit across the thinnest feature on it. The node count
    /// is scaled back to roughly `SAMPLE_BUDGET_FACTOR * max_resolution^3`.
    pub fn for_shape(
        bounds: &Aabb,
        feature: Point3,
        tolerance: f64,
        max_resolution: usize,
    ) -> Self {
        let max_resolution = max_resolution.max(1);
        let extent = bounds.max_extent().max(f64::EPSILON);
        let coarse = tolerance.max(extent / max_resolution as f64);
        let mut spacing = feature.map(|size| {
            if size.is_finite() && size > 0.0 {
                coarse.min(size / FEATURE_CELLS)
            } else {
                coarse
            }
        });
        let finest = spacing.iter().copied().fold(f64::INFINITY, f64::min);
        spacing = spacing.map(|step| step.min(finest * MAX_CELL_ASPECT));

        let budget = SAMPLE_BUDGET_FACTOR * (max_resolution as f64).powi(3);
        let nodes = Self::layout(bounds, spacing).2;
        if nodes > budget {
            let grow = (nodes / budget).cbrt();
            spacing = spacing.map(|step| step * grow);
        }

        let (min, max, _) = Self::layout(bounds, spacing);
        let resolution =
            [0, 1, 2].map(|axis| ((max[axis] - min[axis]) / spacing[axis]).round() as usize + 1);
        Self {
            min,
            max,
            resolution,
        }
    }

    /// Padded corners and node count for the given per-axis spacing.
    fn layout(bounds: &Aabb, spacing: Point3) -> (Point3, Point3, f64) {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        let mut nodes = 1.0;
        for axis in 0..3 {
            let pad = PADDING_CELLS * spacing[axis];
            min[axis] = bounds.min[axis] - pad;
            let span = bounds.max[axis] + pad - min[axis];
            let cells = (span / spacing[axis]).ceil().max(1.0);
            max[axis] = min[axis] + cells * spacing[axis];
            nodes *= cells + 1.0;
        }
        (min, max, nodes)
    }

    fn spacing(&self) -> Point3 {
        let [nx, ny, nz] = self.resolution;
        [
            (self.max[0] - self.min[0]) / ((nx - 1) as f64),
            (self.max[1] - self.min[1]) / ((ny - 1) as f64),
            (self.max[2] - self.min[2]) / ((nz - 1) as f64),
        ]
    }
}

/// Tessellates the zero level set of `sdf` inside `bounds`.
pub fn polygonize<S>(sdf: &S, bounds: &Aabb, tolerance: f64, max_resolution: usize) -> Mesh
where
    S: Sdf3,
{
    let config = GridConfig::for_shape(bounds, sdf.feature_size(), tolerance, max_resolution);
    extract_mesh_from_sdf(&config, sdf)
}

pub fn extract_mesh_from_sdf<S>(config: &GridConfig, sdf: &S) -> Mesh
where
    S: Sdf3,
{
    extract_mesh_with(config, |point| sdf.evaluate(point))
}

/// Marching tetrahedra over a regular grid. Negative samples are inside.
pub fn extract_mesh_with<F>(config: &GridConfig, mut sample: F) -> Mesh
where
    F: FnMut(Point3) -> f64,
{
    let [nx, ny, nz] = config.resolution;
    if nx < 2 || ny < 2 || nz < 2 {
        return Mesh::empty();
    }

    let spacing = config.spacing();
    let field = sample_grid(config, spacing, &mut sample);
    let point_at = |index: usize| {
        let x = index % nx;
        let y = (index / nx) % ny;
        let z = index / (nx * ny);
        [
            config.min[0] + (x as f64) * spacing[0],
            config.min[1] + (y as f64) * spacing[1],
            config.min[2] + (z as f64) * spacing[2],
        ]
    };

    let mut mesh = Mesh::empty();
    let mut vertex_cache = HashMap::<(usize, usize), u32>::new();
    let mut edge_vertex = |mesh: &mut Mesh, a: usize, b: usize| -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(index) = vertex_cache.get(&key).copied() {
            return index;
        }
        // Always interpolate from the lower index so shared edges agree bit for bit.
        let (lo, hi) = key;
        let point = interpolate_edge(point_at(lo), point_at(hi), field[lo], field[hi]);
        let index = mesh.vertices.len() as u32;
        mesh.vertices.push(point);
        vertex_cache.insert(key, index);
        index
    };

    let mut corners = [0usize; 8];
    for z in 0..(nz - 1) {
        for y in 0..(ny - 1) {
            for x in 0..(nx - 1) {
                let mut inside_mask = 0u8;
                for (corner_id, offset) in CORNER_OFFSETS.iter().enumerate() {
                    let idx = grid_index(x + offset[0], y + offset[1], z + offset[2], nx, ny);
                    corners[corner_id] = idx;
                    if field[idx] < 0.0 {
                        inside_mask |= 1 << corner_id;
                    }
                }
                if inside_mask == 0 || inside_mask == u8::MAX {
                    continue;
                }

                for tet in TETRAHEDRA {
                    let ids = tet.map(|corner| corners[corner]);
                    let (inside, outside): (Vec<usize>, Vec<usize>) =
                        ids.iter().partition(|&&id| field[id] < 0.0);
                    match (inside.as_slice(), outside.as_slice()) {
                        ([a], [b, c, d]) | ([b, c, d], [a]) => {
                            let tri = [
                                edge_vertex(&mut mesh, *a, *b),
                                edge_vertex(&mut mesh, *a, *c),
                                edge_vertex(&mut mesh, *a, *d),
                            ];
                            push_oriented(&mut mesh, tri, &inside, &outside, &point_at);
                        }
                        ([a, b], [c, d]) => {
                            let ac = edge_vertex(&mut mesh, *a, *c);
                            let ad = edge_vertex(&mut mesh, *a, *d);
                            let bd = edge_vertex(&mut mesh, *b, *d);
                            let bc = edge_vertex(&mut mesh, *b, *c);
                            push_oriented(&mut mesh, [ac, ad, bd], &inside, &outside, &point_at);
                            push_oriented(&mut mesh, [ac, bd, bc], &inside, &outside, &point_at);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    mesh
}

/// Winds the triangle so its normal points from the inside corners toward the outside ones.
fn push_oriented<P>(mesh: &mut Mesh, tri: [u32; 3], inside: &[usize], outside: &[usize], point_at: &P)
where
    P: Fn(usize) -> Point3,
{
    let [a, b, c] = tri.map(|i| mesh.vertices[i as usize]);
    let normal = face_normal(a, b, c);
    if dot(normal, normal) == 0.0 {
        return;
    }
    let centroid = |ids: &[usize]| {
        let mut sum = [0.0; 3];
        for &id in ids {
            let p = point_at(id);
            sum = [sum[0] + p[0], sum[1] + p[1], sum[2] + p[2]];
        }
        let n = ids.len() as f64;
        [sum[0] / n, sum[1] / n, sum[2] / n]
    };
    let inner = centroid(inside);
    let outer = centroid(outside);
    let direction = [outer[0] - inner[0], outer[1] - inner[1], outer[2] - inner[2]];
    if dot(normal, direction) < 0.0 {
        mesh.triangles.push([tri[0], tri[2], tri[1]]);
    } else {
        mesh.triangles.push(tri);
    }
}

fn sample_grid<F>(config: &GridConfig, spacing: Point3, sample: &mut F) -> Vec<f64>
where
    F: FnMut(Point3) -> f64,
{
    let [nx, ny, nz] = config.resolution;
    let mut field = vec![0.0_f64; nx * ny * nz];

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let point = [
                    config.min[0] + (x as f64) * spacing[0],
                    config.min[1] + (y as f64) * spacing[1],
                    config.min[2] + (z as f64) * spacing[2],
                ];
                field[grid_index(x, y, z, nx, ny)] = sample(point);
            }
        }
    }

    field
}

#[inline]
fn grid_index(x: usize, y: usize, z: usize, nx: usize, ny: usize) -> usize {
    x + y * nx + z * nx * ny
}

/// `v1` and `v2` straddle zero: one is negative, the other is not.
#[inline]
fn interpolate_edge(p1: Point3, p2: Point3, v1: f64, v2: f64) -> Point3 {
    let dv = v2 - v1;
    let t = if dv.abs() <= f64::EPSILON {
        0.5
    } else {
        (-v1 / dv).clamp(0.0, 1.0)
    };
    [
        p1[0] + t * (p2[0] - p1[0]),
        p1[1] + t * (p2[1] - p1[1]),
        p1[2] + t * (p2[2] - p1[2]),
    ]
}
