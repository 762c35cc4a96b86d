//! Serving the web frontend, or a built-in landing page when none is configured.

use crate::error::ApiError;
use axum::Router;
use axum::http::{Method, Uri};
use axum::response::{Html, IntoResponse, Response};
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};

/// Page shown at `/` when no frontend directory is configured.
pub const LANDING_TEMPLATE: &str = include_str!("templates/landing.html");

/// Install the catch-all for non-API paths.
///
/// A usable frontend directory is served as a single-page app: unknown paths
/// fall back to its `index.html`.
pub fn attach(router: Router, frontend_dir: Option<&Path>) -> Router {
    match frontend_dir {
        Some(dir) if dir.join("index.html").is_file() => {
            tracing::info!(dir = %dir.display(), "serving frontend");
            let index = ServeFile::new(dir.join("index.html"));
            router.fallback_service(ServeDir::new(dir).fallback(index))
        }
        Some(dir) => {
            tracing::warn!(
                dir = %dir.display(),
                "frontend directory has no index.html, serving landing page"
            );
            router.fallback(landing)
        }
        None => router.fallback(landing),
    }
}

async fn landing(method: Method, uri: Uri) -> Response {
    if uri.path() == "/" && (method == Method::GET || method == Method::HEAD) {
        Html(LANDING_TEMPLATE).into_response()
    } else {
        ApiError::route_not_found(uri.path()).into_response()
    }
}
