//! stemforge: HTTP front-end for stem separation and noise reduction

pub mod app;

pub use app::{build_router, AppState, Locale};
