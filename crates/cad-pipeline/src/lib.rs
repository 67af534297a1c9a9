pub mod builder;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod export;
pub mod heightmap;
pub mod load;
pub mod modify;
pub mod session;

pub use builder::{build_document, build_shape, validate_parameters};
pub use config::PipelineConfig;
pub use document::{Document, ObjectData, ObjectType, ShapeObject};
pub use engine::{EngineError, GeometryEngine, InterchangeFormat, SdfEngine, ShapeProperties};
pub use error::{CadError, CadResult};
pub use export::{ExportFormat, ExportOutcome, export_document, export_path};
pub use heightmap::{HeightmapOptions, heightmap_document, heightmap_mesh};
pub use load::load_document;
pub use modify::{ModRequest, Rotation, ScaleSpec, apply_modifications};
pub use session::{BoundsInfo, DocumentInfo, Generation, ObjectInfo, Session, SessionBuilder};

pub const INPUT_EXTENSIONS: &[&str] = &["stl", "step", "stp", "dxf", "fcstd", "fcstd1", "obj", "ply"];
pub const OUTPUT_EXTENSIONS: &[&str] = &["stl", "step", "stp", "dxf", "fcstd", "png"];
