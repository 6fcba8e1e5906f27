//! HTTP application: shared state and routes

pub mod error;
pub mod handlers;
pub mod i18n;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use stemforge_core::AudioService;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use i18n::Locale;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AudioService>,
    pub default_locale: Locale,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
}

impl AppState {
    pub fn new(service: AudioService) -> Self {
        let configured = &service.config().server.default_locale;
        let default_locale = Locale::from_str(configured).unwrap_or_else(|| {
            warn!("Unsupported default locale {:?}, using ar", configured);
            Locale::Ar
        });

        Self {
            service: Arc::new(service),
            default_locale,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn max_upload_mb(&self) -> usize {
        self.service.config().server.max_upload_mb
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.service.config().max_upload_bytes();

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/separate", post(handlers::separate))
        .route("/enhance", post(handlers::enhance))
        .route("/processed/*path", get(handlers::processed_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
