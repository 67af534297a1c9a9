use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::document::Document;
use crate::engine::{GeometryEngine, InterchangeFormat};
use crate::error::{CadError, CadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Stl,
    Step,
    Dxf,
    Native,
    Png,
}

impl ExportFormat {
    pub fn from_extension(extension: &str) -> CadResult<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "stl" => Ok(ExportFormat::Stl),
            "step" | "stp" => Ok(ExportFormat::Step),
            "dxf" => Ok(ExportFormat::Dxf),
            "fcstd" | "fcstd1" => Ok(ExportFormat::Native),
            "png" => Ok(ExportFormat::Png),
            other => Err(CadError::UnsupportedFormat(format!(".{other}"))),
        }
    }
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub format: ExportFormat,
    /// False for the render stub, which writes nothing.
    pub written: bool,
    pub notice: Option<String>,
}

/// Target path after applying an explicit format, which replaces the suffix.
pub fn export_path(path: &Path, format: Option<&str>) -> PathBuf {
    match format.map(|f| f.trim().trim_start_matches('.')) {
        Some(extension) if !extension.is_empty() => path.with_extension(extension),
        _ => path.to_path_buf(),
    }
}

/// Writes the document in the format named by `format` or, failing that, by the path.
pub fn export_document<E: GeometryEngine>(
    engine: &E,
    document: Option<&Document<E::Solid>>,
    path: &Path,
    format: Option<&str>,
    tolerance: f64,
) -> CadResult<ExportOutcome> {
    let document = document.ok_or(CadError::NoDocument)?;
    let path = export_path(path, format);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let format = ExportFormat::from_extension(extension)?;

    let mut notice = None;
    match format {
        ExportFormat::Stl => {
            let mesh = match (document.first_mesh(), document.first_solid()) {
                (Some(mesh), _) => mesh.clone(),
                (None, Some(solid)) => engine.tessellate(solid, tolerance)?,
                (None, None) => return Err(CadError::NoExportableObject),
            };
            engine.write_mesh(&mesh, &path)?;
        }
        ExportFormat::Step => engine.export_interchange(document, &path, InterchangeFormat::Step)?,
        ExportFormat::Dxf => engine.export_interchange(document, &path, InterchangeFormat::Dxf)?,
        ExportFormat::Native => engine.save_document(document, &path)?,
        ExportFormat::Png => {
            warn!(path = %path.display(), "raster rendering is not available, nothing written");
            notice = Some(format!(
                "Rendering to {}...\nNote: full rendering needs an interactive viewer; no image was written",
                path.display()
            ));
        }
    }

    let written = format != ExportFormat::Png;
    if written {
        info!(path = %path.display(), ?format, "exported document");
    }
    Ok(ExportOutcome {
        path,
        format,
        written,
        notice,
    })
}
