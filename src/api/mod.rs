//! JSON REST API.
//!
//! Handlers validate input shape, delegate to [`Database`] and translate
//! failures into [`ApiError`] responses. Everything under `/api` sits behind
//! the optional API-key guard; `/health` and the frontend do not.

pub mod attachments;
pub mod auth;
pub mod categories;
pub mod extract;
pub mod frontend;
pub mod priorities;
pub mod tags;
pub mod todos;

use crate::db::Database;
use crate::error::ApiError;
use crate::files::{FileStore, UploadPolicy};
use axum::extract::DefaultBodyLimit;
use axum::http::Uri;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub files: Arc<FileStore>,
    pub uploads: Arc<UploadPolicy>,
    /// Required key for `/api` routes. `None` disables the guard.
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Arc<Database>, files: FileStore, uploads: UploadPolicy) -> Self {
        Self {
            db,
            files: Arc::new(files),
            uploads: Arc::new(uploads),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: Option<&str>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }
}

/// Health check response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn api_not_found(uri: Uri) -> Response {
    ApiError::route_not_found(uri.path()).into_response()
}

fn api_routes(state: &AppState) -> Router<AppState> {
    let upload_limit = state
        .uploads
        .max_size_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
        .try_into()
        .unwrap_or(usize::MAX);

    Router::new()
        // Todos
        .route("/todos", get(todos::list_todos).post(todos::create_todo))
        .route(
            "/todos/{todo_id}",
            get(todos::get_todo)
                .put(todos::update_todo)
                .patch(todos::update_todo)
                .delete(todos::delete_todo),
        )
        .route("/todos/{todo_id}/complete", post(todos::complete_todo))
        .route("/todos/{todo_id}/uncomplete", post(todos::uncomplete_todo))
        .route("/todos/{todo_id}/subtasks", post(todos::create_subtask))
        .route(
            "/todos/{todo_id}/attachments",
            get(attachments::list_attachments)
                .post(attachments::upload_attachment)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Categories
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/{category_id}",
            get(categories::get_category)
                .put(categories::update_category)
                .patch(categories::update_category)
                .delete(categories::delete_category),
        )
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tags/{tag_id}",
            get(tags::get_tag)
                .put(tags::update_tag)
                .patch(tags::update_tag)
                .delete(tags::delete_tag),
        )
        // Priorities
        .route("/priorities", get(priorities::list_priorities))
        .route(
            "/priorities/{level}",
            axum::routing::put(priorities::update_priority),
        )
        // Attachments
        .route(
            "/attachments/{attachment_id}",
            get(attachments::download_attachment).delete(attachments::delete_attachment),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_api_key))
        .fallback(api_not_found)
}

/// Build the router with the built-in landing page at `/`.
pub fn build_router(state: AppState) -> Router {
    build_router_with_frontend(state, None)
}

/// Build the router, serving `frontend_dir` for non-API paths when given.
pub fn build_router_with_frontend(state: AppState, frontend_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes(&state))
        .with_state(state);

    frontend::attach(router, frontend_dir)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Todo tracker listening on http://{}", bound_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
