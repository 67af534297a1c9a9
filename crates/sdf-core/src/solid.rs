use serde::{Deserialize, Serialize};

use crate::affine::{Affine3, AffineError};
use crate::primitives::{
    Point3, Sdf3, cone_distance, cuboid_distance, cylinder_distance, difference, sphere_distance,
    torus_distance,
};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> Point3 {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn max_extent(&self) -> f64 {
        let size = self.size();
        size[0].max(size[1]).max(size[2])
    }

    pub fn corners(&self) -> [Point3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            [lo[0], lo[1], lo[2]],
            [hi[0], lo[1], lo[2]],
            [lo[0], hi[1], lo[2]],
            [hi[0], hi[1], lo[2]],
            [lo[0], lo[1], hi[2]],
            [hi[0], lo[1], hi[2]],
            [lo[0], hi[1], hi[2]],
            [hi[0], hi[1], hi[2]],
        ]
    }

    /// Smallest box containing every point; `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first, first);
        for point in iter {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(point[axis]);
                bounds.max[axis] = bounds.max[axis].max(point[axis]);
            }
        }
        Some(bounds)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolidError {
    #[error("{name} must be a finite value greater than zero, got {value}")]
    InvalidDimension { name: &'static str, value: f64 },
    #[error("cone radii must be non-negative and not both zero, got {radius1} and {radius2}")]
    InvalidConeRadii { radius1: f64, radius2: f64 },
    #[error("transform is not invertible")]
    SingularTransform,
    #[error(transparent)]
    Affine(#[from] AffineError),
}

fn positive(name: &'static str, value: f64) -> Result<f64, SolidError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SolidError::InvalidDimension { name, value })
    }
}

/// CSG tree of placed primitives. Leaf placement follows modelling-kernel conventions:
/// cuboids start at the origin, cylinders and cones stand on z=0, spheres and tori are
/// centred at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Solid {
    Cuboid {
        width: f64,
        depth: f64,
        height: f64,
    },
    Cylinder {
        radius: f64,
        height: f64,
    },
    Sphere {
        radius: f64,
    },
    Cone {
        radius1: f64,
        radius2: f64,
        height: f64,
    },
    Torus {
        major_radius: f64,
        minor_radius: f64,
    },
    Cut {
        base: Box<Solid>,
        tool: Box<Solid>,
    },
    Transformed {
        solid: Box<Solid>,
        transform: Affine3,
        inverse: Affine3,
    },
}

impl Solid {
    pub fn cuboid(width: f64, depth: f64, height: f64) -> Result<Self, SolidError> {
        Ok(Self::Cuboid {
            width: positive("width", width)?,
            depth: positive("depth", depth)?,
            height: positive("height", height)?,
        })
    }

    pub fn cylinder(radius: f64, height: f64) -> Result<Self, SolidError> {
        Ok(Self::Cylinder {
            radius: positive("radius", radius)?,
            height: positive("height", height)?,
        })
    }

    pub fn sphere(radius: f64) -> Result<Self, SolidError> {
        Ok(Self::Sphere {
            radius: positive("radius", radius)?,
        })
    }

    pub fn cone(radius1: f64, radius2: f64, height: f64) -> Result<Self, SolidError> {
        let valid = |r: f64| r.is_finite() && r >= 0.0;
        if !valid(radius1) || !valid(radius2) || (radius1 == 0.0 && radius2 == 0.0) {
            return Err(SolidError::InvalidConeRadii { radius1, radius2 });
        }
        Ok(Self::Cone {
            radius1,
            radius2,
            height: positive("height", height)?,
        })
    }

    pub fn torus(major_radius: f64, minor_radius: f64) -> Result<Self, SolidError> {
        Ok(Self::Torus {
            major_radius: positive("major radius", major_radius)?,
            minor_radius: positive("minor radius", minor_radius)?,
        })
    }

    /// Boolean difference `self - tool`.
    pub fn cut(self, tool: Solid) -> Self {
        Self::Cut {
            base: Box::new(self),
            tool: Box::new(tool),
        }
    }

    /// Applies `map` after any transform already on this solid.
    pub fn transformed(self, map: &Affine3) -> Result<Self, SolidError> {
        let (solid, transform) = match self {
            Self::Transformed {
                solid, transform, ..
            } => (solid, transform.then(map)),
            other => (Box::new(other), *map),
        };
        let inverse = transform.inverse().ok_or(SolidError::SingularTransform)?;
        Ok(Self::Transformed {
            solid,
            transform,
            inverse,
        })
    }

    /// Re-checks every parameter in the tree, e.g. after deserialisation.
    pub fn validate(&self) -> Result<(), SolidError> {
        match self {
            Self::Cuboid {
                width,
                depth,
                height,
            } => Self::cuboid(*width, *depth, *height).map(drop),
            Self::Cylinder { radius, height } => Self::cylinder(*radius, *height).map(drop),
            Self::Sphere { radius } => Self::sphere(*radius).map(drop),
            Self::Cone {
                radius1,
                radius2,
                height,
            } => Self::cone(*radius1, *radius2, *height).map(drop),
            Self::Torus {
                major_radius,
                minor_radius,
            } => Self::torus(*major_radius, *minor_radius).map(drop),
            Self::Cut { base, tool } => {
                base.validate()?;
                tool.validate()
            }
            Self::Transformed {
                solid, transform, ..
            } => {
                if transform.inverse().is_none() {
                    return Err(SolidError::SingularTransform);
                }
                solid.validate()
            }
        }
    }

    /// Conservative bounds of the solid.
    pub fn bounds(&self) -> Aabb {
        match self {
            Self::Cuboid {
                width,
                depth,
                height,
            } => Aabb::new([0.0, 0.0, 0.0], [*width, *depth, *height]),
            Self::Cylinder { radius, height } => {
                Aabb::new([-radius, -radius, 0.0], [*radius, *radius, *height])
            }
            Self::Sphere { radius } => {
                Aabb::new([-radius, -radius, -radius], [*radius, *radius, *radius])
            }
            Self::Cone {
                radius1,
                radius2,
                height,
            } => {
                let r = radius1.max(*radius2);
                Aabb::new([-r, -r, 0.0], [r, r, *height])
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                let outer = major_radius + minor_radius;
                Aabb::new(
                    [-outer, -outer, -minor_radius],
                    [outer, outer, *minor_radius],
                )
            }
            Self::Cut { base, .. } => base.bounds(),
            Self::Transformed {
                solid, transform, ..
            } => {
                let inner = solid.bounds();
                // Eight corners always produce a value.
                Aabb::from_points(inner.corners().map(|c| transform.apply(c))).unwrap_or(inner)
            }
        }
    }
}

impl Sdf3 for Solid {
    fn evaluate(&self, p: Point3) -> f64 {
        match self {
            Self::Cuboid {
                width,
                depth,
                height,
            } => cuboid_distance(p, [*width, *depth, *height]),
            Self::Cylinder { radius, height } => cylinder_distance(p, *radius, *height),
            Self::Sphere { radius } => sphere_distance(p, *radius),
            Self::Cone {
                radius1,
                radius2,
                height,
            } => cone_distance(p, *radius1, *radius2, *height),
            Self::Torus {
                major_radius,
                minor_radius,
            } => torus_distance(p, *major_radius, *minor_radius),
            Self::Cut { base, tool } => difference(base.evaluate(p), tool.evaluate(p)),
            Self::Transformed {
                solid,
                transform,
                inverse,
            } => solid.evaluate(inverse.apply(p)) * transform.distance_scale(),
        }
    }

    fn feature_size(&self) -> Point3 {
        match self {
            Self::Cuboid {
                width,
                depth,
                height,
            } => [*width, *depth, *height],
            Self::Cylinder { radius, height } => [2.0 * radius, 2.0 * radius, *height],
            Self::Sphere { radius } => [2.0 * radius; 3],
            Self::Cone {
                radius1,
                radius2,
                height,
            } => {
                let across = 2.0 * radius1.max(*radius2);
                [across, across, *height]
            }
            Self::Torus { minor_radius, .. } => [2.0 * minor_radius; 3],
            Self::Cut { base, tool } => {
                let (outer, inner) = (base.bounds(), tool.bounds());
                let (base_size, tool_size) = (base.feature_size(), tool.feature_size());
                let mut size = [0.0; 3];
                for axis in 0..3 {
                    // Material left between the tool and the base boundary.
                    let wall = (inner.min[axis] - outer.min[axis])
                        .min(outer.max[axis] - inner.max[axis]);
                    let wall = if wall > 0.0 { wall } else { f64::INFINITY };
                    size[axis] = base_size[axis].min(tool_size[axis]).min(wall);
                }
                size
            }
            Self::Transformed {
                solid, transform, ..
            } => {
                let local = solid.feature_size();
                let m = &transform.linear;
                let axis_aligned = (0..3).all(|r| (0..3).all(|c| r == c || m[r][c] == 0.0));
                if axis_aligned {
                    [0, 1, 2].map(|axis| local[axis] * m[axis][axis].abs())
                } else {
                    let thinnest = local.iter().copied().fold(f64::INFINITY, f64::min);
                    [thinnest * transform.distance_scale(); 3]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Solid, SolidError};
    use crate::affine::Affine3;
    use crate::primitives::Sdf3;

    #[test]
    fn cuboid_sits_on_the_origin_corner() {
        let solid = Solid::cuboid(50.0, 20.0, 30.0).expect("valid cuboid");
        assert!(solid.evaluate([25.0, 10.0, 15.0]) < 0.0);
        assert!(solid.evaluate([-1.0, 10.0, 15.0]) > 0.0);
        assert!(solid.evaluate([50.0, 10.0, 15.0]).abs() < 1e-12);
        let bounds = solid.bounds();
        assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [50.0, 20.0, 30.0]);
    }

    #[test]
    fn cylinder_and_cone_stand_on_the_xy_plane() {
        let cylinder = Solid::cylinder(5.0, 10.0).expect("valid cylinder");
        assert!(cylinder.evaluate([0.0, 0.0, 0.0]).abs() < 1e-12);
        assert!(cylinder.evaluate([0.0, 0.0, 9.0]) < 0.0);
        assert!(cylinder.evaluate([0.0, 0.0, -1.0]) > 0.0);

        let cone = Solid::cone(5.0, 0.0, 10.0).expect("valid cone");
        assert!(cone.evaluate([4.0, 0.0, 0.5]) < 0.0);
        assert!(cone.evaluate([4.0, 0.0, 9.5]) > 0.0);
    }

    #[test]
    fn cut_removes_the_tool_volume() {
        let tube = Solid::cylinder(10.0, 20.0)
            .expect("outer")
            .cut(Solid::cylinder(7.0, 20.0).expect("inner"));
        assert!(tube.evaluate([0.0, 0.0, 10.0]) > 0.0);
        assert!(tube.evaluate([8.5, 0.0, 10.0]) < 0.0);
    }

    #[test]
    fn feature_size_tracks_thin_walls() {
        let plate = Solid::cuboid(500.0, 500.0, 1.0).expect("plate");
        assert_eq!(plate.feature_size(), [500.0, 500.0, 1.0]);

        let tube = Solid::cylinder(100.0, 100.0)
            .expect("outer")
            .cut(Solid::cylinder(99.0, 100.0).expect("inner"));
        let size = tube.feature_size();
        assert!((size[0] - 1.0).abs() < 1e-9 && (size[1] - 1.0).abs() < 1e-9);
        assert_eq!(size[2], 100.0);

        let stretch = Affine3::scale([1.0, 1.0, 3.0]).expect("stretch");
        let stretched = plate.transformed(&stretch).expect("scale");
        assert!((stretched.feature_size()[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn nested_transforms_collapse_into_one_node() {
        let solid = Solid::sphere(1.0)
            .expect("sphere")
            .transformed(&Affine3::translation([5.0, 0.0, 0.0]).expect("translation"))
            .expect("invertible")
            .transformed(&Affine3::translation([0.0, 5.0, 0.0]).expect("translation"))
            .expect("invertible");
        match &solid {
            Solid::Transformed { solid: inner, .. } => {
                assert!(matches!(inner.as_ref(), Solid::Sphere { .. }))
            }
            other => panic!("unexpected node: {other:?}"),
        }
        assert!(solid.evaluate([5.0, 5.0, 0.0]) < 0.0);
        let bounds = solid.bounds();
        assert!((bounds.min[0] - 4.0).abs() < 1e-12);
        assert!((bounds.max[1] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn scaled_solid_keeps_the_sign_of_distances() {
        let solid = Solid::sphere(1.0)
            .expect("sphere")
            .transformed(&Affine3::scale([3.0, 1.0, 1.0]).expect("scale"))
            .expect("invertible");
        assert!(solid.evaluate([2.5, 0.0, 0.0]) < 0.0);
        assert!(solid.evaluate([0.0, 1.5, 0.0]) > 0.0);
    }

    #[test]
    fn invalid_dimensions_are_reported() {
        assert_eq!(
            Solid::cuboid(10.0, -1.0, 5.0),
            Err(SolidError::InvalidDimension {
                name: "depth",
                value: -1.0
            })
        );
        assert!(matches!(
            Solid::cone(0.0, 0.0, 4.0),
            Err(SolidError::InvalidConeRadii { .. })
        ));
        assert!(Solid::cylinder(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn serialized_tree_round_trips_through_json() {
        let solid = Solid::cylinder(10.0, 20.0)
            .expect("outer")
            .cut(Solid::cylinder(7.0, 20.0).expect("inner"))
            .transformed(&Affine3::rotation_degrees([1.0, 0.0, 0.0], 90.0).expect("rotation"))
            .expect("invertible");
        let json = serde_json::to_string(&solid).expect("serialize");
        assert!(json.contains("\"kind\":\"transformed\""));
        let back: Solid = serde_json::from_str(&json).expect("deserialize");
        back.validate().expect("still valid");
        for point in [[0.0, -10.0, 8.5], [0.0, -10.0, 0.0], [0.0, -25.0, 0.0]] {
            assert!((back.evaluate(point) - solid.evaluate(point)).abs() < 1e-9);
        }
    }
}
