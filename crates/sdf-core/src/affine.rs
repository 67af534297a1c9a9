use serde::{Deserialize, Serialize};

use crate::primitives::Point3;

#[inline]
fn dot(a: Point3, b: Point3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross(a: Point3, b: Point3) -> Point3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
fn length(v: Point3) -> f64 {
    dot(v, v).sqrt()
}

/// Rotates `point` about the unit vector `axis` by `angle` radians (Rodrigues).
#[inline]
fn rotate_about_unit(point: Point3, axis: Point3, angle: f64) -> Point3 {
    let (sin_theta, cos_theta) = angle.sin_cos();
    let c = cross(axis, point);
    let k = dot(axis, point) * (1.0 - cos_theta);
    [
        point[0] * cos_theta + c[0] * sin_theta + axis[0] * k,
        point[1] * cos_theta + c[1] * sin_theta + axis[1] * k,
        point[2] * cos_theta + c[2] * sin_theta + axis[2] * k,
    ]
}

/// Error raised when an affine map would collapse space.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AffineError {
    #[error("scale factors must be finite and non-zero, got {0:?}")]
    DegenerateScale(Point3),
    #[error("rotation axis must be a finite non-zero vector, got {0:?}")]
    DegenerateAxis(Point3),
    #[error("rotation angle must be finite")]
    NonFiniteAngle,
    #[error("translation must be finite, got {0:?}")]
    NonFiniteTranslation(Point3),
}

/// Row-major 3x3 linear part plus translation: `p' = linear * p + translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine3 {
    pub linear: [[f64; 3]; 3],
    pub translation: Point3,
}

impl Default for Affine3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine3 {
    pub const IDENTITY: Self = Self {
        linear: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0, 0.0, 0.0],
    };

    pub fn scale(factors: Point3) -> Result<Self, AffineError> {
        if factors.iter().any(|f| !f.is_finite() || *f == 0.0) {
            return Err(AffineError::DegenerateScale(factors));
        }
        Ok(Self {
            linear: [
                [factors[0], 0.0, 0.0],
                [0.0, factors[1], 0.0],
                [0.0, 0.0, factors[2]],
            ],
            translation: [0.0, 0.0, 0.0],
        })
    }

    /// Rotation about `axis` through the origin. Positive angles are counter-clockwise
    /// when looking down the axis toward the origin.
    pub fn rotation_degrees(axis: Point3, angle_degrees: f64) -> Result<Self, AffineError> {
        if !angle_degrees.is_finite() {
            return Err(AffineError::NonFiniteAngle);
        }
        let len = length(axis);
        if !len.is_finite() || len <= f64::EPSILON {
            return Err(AffineError::DegenerateAxis(axis));
        }
        let unit = [axis[0] / len, axis[1] / len, axis[2] / len];
        let angle = angle_degrees.to_radians();

        // Columns are the images of the basis vectors.
        let ex = rotate_about_unit([1.0, 0.0, 0.0], unit, angle);
        let ey = rotate_about_unit([0.0, 1.0, 0.0], unit, angle);
        let ez = rotate_about_unit([0.0, 0.0, 1.0], unit, angle);
        Ok(Self {
            linear: [
                [ex[0], ey[0], ez[0]],
                [ex[1], ey[1], ez[1]],
                [ex[2], ey[2], ez[2]],
            ],
            translation: [0.0, 0.0, 0.0],
        })
    }

    pub fn translation(offset: Point3) -> Result<Self, AffineError> {
        if offset.iter().any(|v| !v.is_finite()) {
            return Err(AffineError::NonFiniteTranslation(offset));
        }
        Ok(Self {
            translation: offset,
            ..Self::IDENTITY
        })
    }

    /// Composition that applies `self` first, then `next`.
    pub fn then(&self, next: &Self) -> Self {
        let mut linear = [[0.0; 3]; 3];
        for (row, out) in linear.iter_mut().enumerate() {
            for (col, cell) in out.iter_mut().enumerate() {
                *cell = (0..3)
                    .map(|k| next.linear[row][k] * self.linear[k][col])
                    .sum();
            }
        }
        let moved = next.apply_linear(self.translation);
        Self {
            linear,
            translation: [
                moved[0] + next.translation[0],
                moved[1] + next.translation[1],
                moved[2] + next.translation[2],
            ],
        }
    }

    #[inline]
    pub fn apply_linear(&self, v: Point3) -> Point3 {
        [
            dot(self.linear[0], v),
            dot(self.linear[1], v),
            dot(self.linear[2], v),
        ]
    }

    #[inline]
    pub fn apply(&self, point: Point3) -> Point3 {
        let v = self.apply_linear(point);
        [
            v[0] + self.translation[0],
            v[1] + self.translation[1],
            v[2] + self.translation[2],
        ]
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.linear;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() <= f64::EPSILON {
            return None;
        }
        let m = &self.linear;
        let inv_det = 1.0 / det;
        let linear = [
            [
                (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
            ],
            [
                (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
            ],
        ];
        let partial = Self {
            linear,
            translation: [0.0, 0.0, 0.0],
        };
        let t = partial.apply_linear(self.translation);
        Some(Self {
            linear,
            translation: [-t[0], -t[1], -t[2]],
        })
    }

    /// Smallest column length of the linear part. Local distances multiplied by this
    /// stay a lower bound for world distances under non-uniform scaling.
    pub fn distance_scale(&self) -> f64 {
        (0..3)
            .map(|col| {
                length([
                    self.linear[0][col],
                    self.linear[1][col],
                    self.linear[2][col],
                ])
            })
            .fold(f64::INFINITY, f64::min)
    }
}
