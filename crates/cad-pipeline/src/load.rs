use std::path::Path;

use tracing::info;

use crate::document::Document;
use crate::engine::{GeometryEngine, InterchangeFormat};
use crate::error::{CadError, CadResult};

pub const IMPORTED_DOCUMENT: &str = "Imported";

/// Opens a native snapshot or imports an exchange/mesh file into a new document.
pub fn load_document<E: GeometryEngine>(
    engine: &E,
    path: &Path,
) -> CadResult<Document<E::Solid>> {
    if !path.is_file() {
        return Err(CadError::FileNotFound(path.to_path_buf()));
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let mesh = match extension.as_str() {
        "fcstd" | "fcstd1" => {
            let document = engine.open_document(path)?;
            info!(path = %path.display(), objects = document.objects.len(), "opened document");
            return Ok(document);
        }
        "step" | "stp" => engine.import_interchange(path, InterchangeFormat::Step)?,
        "dxf" => engine.import_interchange(path, InterchangeFormat::Dxf)?,
        "stl" | "obj" | "ply" => engine.read_mesh(path)?,
        other => return Err(CadError::UnsupportedFormat(format!(".{other}"))),
    };

    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("Mesh");
    let mut document = Document::new(IMPORTED_DOCUMENT);
    document.add_mesh(name, mesh);
    document.file_path = Some(path.to_path_buf());
    engine.recompute(&mut document)?;
    info!(path = %path.display(), "imported mesh");
    Ok(document)
}
