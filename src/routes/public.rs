use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Read-only catalog plus the download endpoints. Anonymous callers are welcome
/// here; the admin guard lets every one of these paths through untouched.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // GET /api/scores?composer_id=&instrument=&difficulty=&limit=
        .route("/api/scores", get(handlers::get_scores))
        // GET /api/scores/{id}
        // Score with composer and tags.
        .route("/api/scores/{id}", get(handlers::get_score_detail))
        .route("/api/composers", get(handlers::get_composers))
        .route("/api/composers/{id}", get(handlers::get_composer_detail))
        .route("/api/tags", get(handlers::get_tags))
        // POST /api/download
        // Client-side counter bump after a download started elsewhere.
        .route("/api/download", post(handlers::count_download))
        // GET /api/download/descarga/{id}
        // 302 to a signed URL; counts the download in the background.
        .route(
            "/api/download/descarga/{id}",
            get(handlers::download_redirect),
        )
        // GET /api/download-info/{id}
        // Signed URL and metadata as JSON, not counted.
        .route("/api/download-info/{id}", get(handlers::download_info))
}
