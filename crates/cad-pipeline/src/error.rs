use std::path::PathBuf;

use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum CadError {
    #[error("{0} is not available in this session")]
    MissingCapability(&'static str),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("no active document")]
    NoDocument,
    #[error("document has no exportable object")]
    NoExportableObject,
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type CadResult<T> = Result<T, CadError>;
