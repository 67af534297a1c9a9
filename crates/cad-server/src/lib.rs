use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cad_intent::{ExplicitParams, ParsedDimensions, ResolvedParameters, ShapeIntent};
use cad_pipeline::{CadError, ExportFormat, PipelineConfig, Session};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub const MAX_RECENT: usize = 10;
const DEFAULT_FORMAT: &str = "stl";

/// Shared by every handler. Each request builds its own pipeline session from `config`.
#[derive(Clone)]
pub struct AppState {
    config: Arc<PipelineConfig>,
    recent: Arc<Mutex<VecDeque<RecentGeneration>>>,
}

impl AppState {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config: Arc::new(config),
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_RECENT))),
        }
    }
}

pub fn app(config: PipelineConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/parse", post(parse))
        .route("/api/generate", post(generate))
        .route("/api/examples", get(examples))
        .route("/api/recent", get(recent))
        .route("/download/{filename}", get(download))
        .with_state(AppState::new(config))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct ParseRequest {
    description: String,
    #[serde(default)]
    params: ExplicitParams,
    #[serde(default)]
    use_semantic: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    description: String,
    #[serde(default)]
    params: ExplicitParams,
    #[serde(default)]
    use_semantic: bool,
    format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParseResponse {
    shape: ShapeIntent,
    classified: ShapeIntent,
    extracted: ParsedDimensions,
    params: ResolvedParameters,
    semantic_succeeded: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateResponse {
    filename: String,
    shape: ShapeIntent,
    params: ResolvedParameters,
    download_url: String,
    timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecentGeneration {
    description: String,
    filename: String,
    params: ResolvedParameters,
    download_url: String,
    timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecentResponse {
    recent: Vec<RecentGeneration>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<CadError> for ApiError {
    fn from(err: CadError) -> Self {
        match err {
            CadError::InvalidParameters(_) | CadError::UnsupportedFormat(_) => {
                Self::bad_request(err.to_string())
            }
            CadError::FileNotFound(_) => Self::not_found(err.to_string()),
            other => {
                error!(error = %other, "pipeline failure");
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn parse(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ParseResponse>, ApiError> {
    let request: ParseRequest = parse_json(&body)?;
    require_description(&request.description)?;

    let config = PipelineConfig::clone(&state.config);
    let response = run_blocking(move || {
        let mut session = Session::from_config(config);
        let generation =
            session.parse(&request.description, &request.params, request.use_semantic);
        let interpretation = generation.interpretation;
        Ok(ParseResponse {
            shape: interpretation.intent.buildable(),
            classified: interpretation.classified,
            extracted: interpretation.extracted,
            params: interpretation.params,
            semantic_succeeded: generation.semantic.map(|outcome| outcome.succeeded),
        })
    })
    .await?;
    Ok(Json(response))
}

async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request: GenerateRequest = parse_json(&body)?;
    require_description(&request.description)?;
    let extension = output_extension(request.format.as_deref())?;

    let config = PipelineConfig::clone(&state.config);
    let now = chrono::Local::now();
    let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
    let path = unique_output_path(&config.output_dir, &timestamp, &extension);
    let description = request.description.clone();

    let (shape, params, written) = run_blocking(move || {
        let mut session = Session::from_config(config);
        let generation =
            session.generate(&request.description, &request.params, request.use_semantic)?;
        let outcome = session.export(&path, None)?;
        let interpretation = generation.interpretation;
        Ok((interpretation.intent.buildable(), interpretation.params, outcome.path))
    })
    .await?;

    let filename = written
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::internal("export produced an unnamed file"))?;
    let download_url = format!("/download/{filename}");
    info!(%filename, %shape, "generated model");

    let mut recent = state.recent.lock().await;
    recent.push_front(RecentGeneration {
        description,
        filename: filename.clone(),
        params,
        download_url: download_url.clone(),
        timestamp: timestamp.clone(),
    });
    recent.truncate(MAX_RECENT);

    Ok(Json(GenerateResponse {
        filename,
        shape,
        params,
        download_url,
        timestamp,
    }))
}

async fn download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    if !is_plain_filename(&filename) {
        return Err(ApiError::bad_request(format!("invalid file name `{filename}`")));
    }
    let path = state.config.output_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("File not found"));
        }
        Err(err) => return Err(ApiError::internal(format!("failed to read {filename}: {err}"))),
    };

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|err| ApiError::bad_request(format!("invalid file name: {err}")))?;
    let mut response = Response::new(axum::body::Body::from(bytes));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response.headers_mut().insert(CONTENT_DISPOSITION, disposition);
    Ok(response)
}

async fn examples() -> Json<Value> {
    Json(json!({
        "examples": [
            {
                "description": "a cube with side length 50mm",
                "expected_shape": "box",
                "expected_dims": {"width": 50, "height": 50, "depth": 50}
            },
            {
                "description": "a cylinder with diameter 80mm and height 100mm",
                "expected_shape": "cylinder",
                "expected_dims": {"diameter": 80, "height": 100}
            },
            {
                "description": "create a box 100mm wide, 60mm high, and 40mm deep",
                "expected_shape": "box",
                "expected_dims": {"width": 100, "height": 60, "depth": 20}
            },
            {
                "description": "a hollow tube with outer diameter 60mm and height 80mm",
                "expected_shape": "tube",
                "expected_dims": {"diameter": 60, "height": 80, "hollow": true}
            },
            {
                "description": "一个直径80高100的圆柱",
                "expected_shape": "cylinder",
                "expected_dims": {"diameter": 80, "height": 100}
            },
            {
                "description": "50x30x20盒子",
                "expected_shape": "box",
                "expected_dims": {"width": 50, "height": 20, "depth": 30}
            }
        ]
    }))
}

async fn recent(State(state): State<AppState>) -> Json<RecentResponse> {
    let recent = state.recent.lock().await;
    Json(RecentResponse {
        recent: recent.iter().cloned().collect(),
    })
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

fn require_description(description: &str) -> Result<(), ApiError> {
    if description.trim().is_empty() {
        return Err(ApiError::bad_request("description must not be empty"));
    }
    Ok(())
}

/// Geometry work is CPU bound and stays off the async workers.
async fn run_blocking<T, F>(task: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CadError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ApiError::internal(format!("pipeline task failed: {err}")))?
        .map_err(ApiError::from)
}

/// Normalised extension of a downloadable format. Rendering writes nothing, so it is
/// refused here.
fn output_extension(format: Option<&str>) -> Result<String, ApiError> {
    let extension = format
        .map(|f| f.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_FORMAT.to_owned());
    match ExportFormat::from_extension(&extension)? {
        ExportFormat::Png => Err(ApiError::bad_request(
            "png rendering is not available for download",
        )),
        _ => Ok(extension),
    }
}

/// `model_<timestamp>.<ext>`, with a counter when the second is already taken.
fn unique_output_path(dir: &Path, timestamp: &str, extension: &str) -> PathBuf {
    let first = dir.join(format!("model_{timestamp}.{extension}"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("model_{timestamp}_{n}.{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && Path::new(name).file_name().is_some_and(|file| file == name)
}
