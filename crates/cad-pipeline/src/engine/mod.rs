mod sdf;

use std::io;
use std::path::{Path, PathBuf};

use sdf_core::{Aabb, AffineError, Point3, SolidError};
use sdf_mesh::{Mesh, MeshIoError};

use crate::document::Document;

pub use sdf::SdfEngine;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Solid(#[from] SolidError),
    #[error(transparent)]
    Transform(#[from] AffineError),
    #[error(transparent)]
    MeshIo(#[from] MeshIoError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document snapshot is invalid: {0}")]
    Snapshot(String),
    #[error("tessellation produced no triangles")]
    EmptyTessellation,
    #[error("unsupported mesh format: {0}")]
    UnsupportedMeshFormat(String),
}

impl EngineError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        EngineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Exchange formats that carry a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterchangeFormat {
    Step,
    Dxf,
}

/// Mass properties reported for a solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeProperties {
    pub volume: f64,
    pub area: f64,
    pub bounds: Aabb,
}

/// Solid-modelling kernel consumed by the pipeline.
///
/// Solids are opaque to callers; every operation returns a new solid and leaves its
/// input untouched. Lengths are millimetres and angles degrees.
pub trait GeometryEngine {
    type Solid: Clone + std::fmt::Debug;

    /// Prism of `width × depth × height` with one corner on the origin.
    fn make_box(&self, width: f64, depth: f64, height: f64) -> Result<Self::Solid, EngineError>;
    /// Cylinder standing on z=0 around the z axis.
    fn make_cylinder(&self, radius: f64, height: f64) -> Result<Self::Solid, EngineError>;
    fn make_sphere(&self, radius: f64) -> Result<Self::Solid, EngineError>;
    /// Frustum standing on z=0, `radius1` at the base.
    fn make_cone(&self, radius1: f64, radius2: f64, height: f64)
    -> Result<Self::Solid, EngineError>;
    /// Torus in the XY plane centred on the origin.
    fn make_torus(&self, major_radius: f64, minor_radius: f64)
    -> Result<Self::Solid, EngineError>;
    fn cut(&self, base: &Self::Solid, tool: &Self::Solid) -> Result<Self::Solid, EngineError>;

    fn scale(&self, solid: &Self::Solid, factors: Point3) -> Result<Self::Solid, EngineError>;
    /// Rotation about `axis` through the origin.
    fn rotate(
        &self,
        solid: &Self::Solid,
        axis: Point3,
        angle_degrees: f64,
    ) -> Result<Self::Solid, EngineError>;
    fn translate(&self, solid: &Self::Solid, offset: Point3) -> Result<Self::Solid, EngineError>;

    fn tessellate(&self, solid: &Self::Solid, tolerance: f64) -> Result<Mesh, EngineError>;
    fn properties(&self, solid: &Self::Solid) -> Result<ShapeProperties, EngineError>;

    /// Writes a mesh as binary STL.
    fn write_mesh(&self, mesh: &Mesh, path: &Path) -> Result<(), EngineError>;
    /// Reads STL, OBJ or ASCII PLY, chosen by extension.
    fn read_mesh(&self, path: &Path) -> Result<Mesh, EngineError>;

    fn export_interchange(
        &self,
        document: &Document<Self::Solid>,
        path: &Path,
        format: InterchangeFormat,
    ) -> Result<(), EngineError>;
    fn import_interchange(
        &self,
        path: &Path,
        format: InterchangeFormat,
    ) -> Result<Mesh, EngineError>;

    fn save_document(&self, document: &Document<Self::Solid>, path: &Path)
    -> Result<(), EngineError>;
    fn open_document(&self, path: &Path) -> Result<Document<Self::Solid>, EngineError>;

    /// Re-validates touched objects and clears their flags.
    fn recompute(&self, document: &mut Document<Self::Solid>) -> Result<(), EngineError>;
}
