use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::post,
};

/// Admin API Router
///
/// JSON endpoints used by the admin pages. They are outside the guarded prefix, so
/// every handler takes `AdminUser` as its first argument and answers 401/403 as
/// JSON instead of redirecting.
pub fn api_admin_routes() -> Router<AppState> {
    Router::new()
        // POST/PUT/DELETE /api/admin/scores
        // Create, partially update, or delete a score. The id travels in the body.
        .route(
            "/api/admin/scores",
            post(handlers::create_score)
                .put(handlers::update_score)
                .delete(handlers::delete_score),
        )
        // POST /api/admin/upload-pdf
        // Multipart PDF upload. The body limit leaves room for the form fields so an
        // oversized file is rejected by the handler with a clear message.
        .route(
            "/api/admin/upload-pdf",
            post(handlers::upload_pdf)
                .layer(DefaultBodyLimit::max(handlers::MAX_PDF_BYTES + 1024 * 1024)),
        )
}
