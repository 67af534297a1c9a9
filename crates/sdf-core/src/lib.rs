pub mod affine;
pub mod primitives;
pub mod solid;

pub use affine::{Affine3, AffineError};
pub use primitives::{Point3, Sdf3, difference};
pub use solid::{Aabb, Solid, SolidError};
