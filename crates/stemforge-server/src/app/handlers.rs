//! Route handlers

use super::error::{ApiError, ApiResult};
use super::i18n::Locale;
use super::upload::receive_upload;
use super::AppState;

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Path, Request, State},
    http::{header, HeaderValue},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stemforge_core::artifacts::resolve_processed;
use stemforge_core::FilesResponse;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::info;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub separator: SeparatorStatus,
    pub started_at: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct SeparatorStatus {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let separator = match state.service.separator().get() {
        Ok(separator) => SeparatorStatus {
            ready: true,
            model: Some(separator.name().to_string()),
            reason: None,
        },
        Err(reason) => SeparatorStatus {
            ready: false,
            model: None,
            reason: Some(reason.to_string()),
        },
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        separator,
        started_at: state.started_at.to_rfc3339(),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}

/// POST /separate
pub async fn separate(
    State(state): State<AppState>,
    locale: Locale,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<FilesResponse>> {
    let fail = |e| ApiError::new(e, locale, "/separate");

    // Refuse before reading the body when the model never loaded
    state.service.ensure_separator().map_err(fail)?;

    let upload = receive_upload(state.service.intake(), multipart, state.max_upload_mb())
        .await
        .map_err(fail)?;
    let output = state.service.separate(&upload).await.map_err(fail)?;

    info!("Separation complete for {}", upload.sanitized_name);
    Ok(Json(FilesResponse::from(&output)))
}

/// POST /enhance
pub async fn enhance(
    State(state): State<AppState>,
    locale: Locale,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<FilesResponse>> {
    let fail = |e| ApiError::new(e, locale, "/enhance");

    let upload = receive_upload(state.service.intake(), multipart, state.max_upload_mb())
        .await
        .map_err(fail)?;
    let output = state.service.enhance(&upload).await.map_err(fail)?;

    info!("Enhancement complete for {}", upload.sanitized_name);
    Ok(Json(FilesResponse::from(&output)))
}

/// GET /processed/*path, always as a download
pub async fn processed_file(
    State(state): State<AppState>,
    locale: Locale,
    Path(path): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let file = resolve_processed(state.service.processed_dir(), &path)
        .map_err(|e| ApiError::new(e, locale, "/processed"))?;

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().replace(['"', '\\'], "_"))
        .unwrap_or_default();

    let mut response = match ServeFile::new(&file).oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(never) => match never {},
    };

    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}
