use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Pages Router
///
/// Nested under the admin prefix. Nothing here checks roles itself: the route guard
/// has already redirected anyone who is not an admin, and handlers read the
/// `AdminContext` it attached.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin
        // Dashboard counters (scores, composers, downloads).
        .route("/", get(handlers::admin_dashboard))
        // GET /admin/scores
        .route("/scores", get(handlers::admin_scores))
}
