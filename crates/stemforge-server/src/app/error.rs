//! HTTP error envelope

use super::i18n::Locale;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use stemforge_core::{ErrorKind, StemforgeError};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// A failed request: the core error plus what is needed to report it
#[derive(Debug)]
pub struct ApiError {
    pub error: StemforgeError,
    pub locale: Locale,
    pub route: &'static str,
    pub request_id: Uuid,
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(error: StemforgeError, locale: Locale, route: &'static str) -> Self {
        Self {
            error,
            locale,
            route,
            request_id: Uuid::new_v4(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ServiceUnavailable | ErrorKind::Processing => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();

        match kind {
            ErrorKind::Validation => warn!(
                request_id = %self.request_id,
                route = self.route,
                "Rejected upload: {}", self.error
            ),
            ErrorKind::NotFound => debug!(
                request_id = %self.request_id,
                route = self.route,
                "{}", self.error
            ),
            ErrorKind::ServiceUnavailable | ErrorKind::Processing => error!(
                request_id = %self.request_id,
                route = self.route,
                kind = %kind,
                "Request failed: {:?}", self.error
            ),
        }

        let body = Json(json!({
            "error": self.locale.message(&self.error),
            "kind": kind,
            "request_id": self.request_id.to_string(),
        }));

        (self.status(), body).into_response()
    }
}
