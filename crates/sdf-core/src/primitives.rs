//! Exact distance functions for the placed primitives a [`crate::Solid`] is built from.
//!
//! Callers validate parameters first; these functions never fail.

/// Cartesian point in millimetres.
pub type Point3 = [f64; 3];

/// Anything with a signed distance: negative inside, zero on the surface.
pub trait Sdf3 {
    fn evaluate(&self, point: Point3) -> f64;

    /// Thinnest wall or slab along each axis. Sampling grids must be finer than this.
    fn feature_size(&self) -> Point3 {
        [f64::INFINITY; 3]
    }
}

#[inline]
fn hypot2(x: f64, y: f64) -> f64 {
    (x * x + y * y).sqrt()
}

/// Distance to an extruded 2D profile, given the signed radial and axial overshoot.
#[inline]
fn extruded(radial: f64, axial: f64) -> f64 {
    hypot2(radial.max(0.0), axial.max(0.0)) + radial.max(axial).min(0.0)
}

/// Cuboid spanning `[0, size]` on every axis.
pub fn cuboid_distance(p: Point3, size: Point3) -> f64 {
    let mut outside = 0.0;
    let mut inside = f64::NEG_INFINITY;
    for axis in 0..3 {
        let half = size[axis] * 0.5;
        let q = (p[axis] - half).abs() - half;
        outside += q.max(0.0) * q.max(0.0);
        inside = inside.max(q);
    }
    outside.sqrt() + inside.min(0.0)
}

/// Z-aligned cylinder standing on the XY plane.
pub fn cylinder_distance(p: Point3, radius: f64, height: f64) -> f64 {
    let half = height * 0.5;
    extruded(hypot2(p[0], p[1]) - radius, (p[2] - half).abs() - half)
}

/// Sphere centred at the origin.
pub fn sphere_distance(p: Point3, radius: f64) -> f64 {
    hypot2(hypot2(p[0], p[1]), p[2]) - radius
}

/// Frustum standing on the XY plane, `radius1` at z=0 and `radius2` at z=height.
pub fn cone_distance(p: Point3, radius1: f64, radius2: f64, height: f64) -> f64 {
    let half = height * 0.5;
    let (r, z) = (hypot2(p[0], p[1]), p[2] - half);

    // Nearest point on the flat cap of the half we are in.
    let cap_radius = if z < 0.0 { radius1 } else { radius2 };
    let cap = [r - r.min(cap_radius), z.abs() - half];

    // Nearest point on the slanted side, from the top rim towards the bottom rim.
    let edge = [radius2 - radius1, height];
    let edge_len2 = edge[0] * edge[0] + edge[1] * edge[1];
    let t = if edge_len2 <= f64::EPSILON {
        0.0
    } else {
        (((radius2 - r) * edge[0] + (half - z) * edge[1]) / edge_len2).clamp(0.0, 1.0)
    };
    let side = [r - radius2 + edge[0] * t, z - half + edge[1] * t];

    let sign = if side[0] < 0.0 && cap[1] < 0.0 { -1.0 } else { 1.0 };
    let cap_d2 = cap[0] * cap[0] + cap[1] * cap[1];
    let side_d2 = side[0] * side[0] + side[1] * side[1];
    sign * cap_d2.min(side_d2).sqrt()
}

/// Torus around the Z axis, centred at the origin.
pub fn torus_distance(p: Point3, major_radius: f64, minor_radius: f64) -> f64 {
    hypot2(hypot2(p[0], p[1]) - major_radius, p[2]) - minor_radius
}

/// Boolean difference of two exact distances.
#[inline]
pub fn difference(base: f64, tool: f64) -> f64 {
    base.max(-tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn cuboid_starts_at_origin() {
        let size = [2.0, 4.0, 6.0];
        assert!(close(cuboid_distance([1.0, 2.0, 3.0], size), -1.0));
        assert!(close(cuboid_distance([0.0, 2.0, 3.0], size), 0.0));
        assert!(close(cuboid_distance([-2.0, 2.0, 3.0], size), 2.0));
        assert!(close(cuboid_distance([-3.0, -4.0, 3.0], size), 5.0));
    }

    #[test]
    fn cylinder_stands_on_base() {
        assert!(cylinder_distance([0.0, 0.0, 1.0], 1.0, 2.0) < 0.0);
        assert!(close(cylinder_distance([1.0, 0.0, 1.0], 1.0, 2.0), 0.0));
        assert!(close(cylinder_distance([0.0, 0.0, 0.0], 1.0, 2.0), 0.0));
        assert!(close(cylinder_distance([0.0, 0.0, 3.0], 1.0, 2.0), 1.0));
    }

    #[test]
    fn sphere_and_torus_are_centred() {
        assert!(close(sphere_distance([0.0; 3], 1.0), -1.0));
        assert!(close(sphere_distance([0.0, 2.0, 0.0], 1.0), 1.0));
        assert!(close(torus_distance([2.0, 0.0, 0.0], 2.0, 0.5), -0.5));
        assert!(close(torus_distance([0.0, 2.5, 0.0], 2.0, 0.5), 0.0));
    }

    #[test]
    fn cone_with_equal_radii_is_a_cylinder() {
        for p in [[1.0, 0.0, 1.0], [0.0, 0.0, 2.0], [0.3, 0.2, 0.5], [2.0, 1.0, 3.0]] {
            assert!(close(cone_distance(p, 1.0, 1.0, 2.0), cylinder_distance(p, 1.0, 2.0)));
        }
    }

    #[test]
    fn cone_narrows_towards_top() {
        assert!(cone_distance([1.5, 0.0, 0.1], 2.0, 0.5, 2.0) < 0.0);
        assert!(cone_distance([1.5, 0.0, 1.9], 2.0, 0.5, 2.0) > 0.0);
        assert!(cone_distance([0.0, 0.0, 1.0], 2.0, 0.0, 2.0) < 0.0);
    }

    #[test]
    fn difference_carves_tool_out_of_base() {
        let base = sphere_distance([0.0; 3], 2.0);
        let tool = sphere_distance([0.0; 3], 1.0);
        assert!(difference(base, tool) > 0.0);
        let shell = [1.5, 0.0, 0.0];
        assert!(difference(sphere_distance(shell, 2.0), sphere_distance(shell, 1.0)) < 0.0);
    }
}
