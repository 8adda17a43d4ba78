use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    AppState,
    auth::{self, REFRESH_TOKEN_COOKIE},
    config::AppConfig,
    gate::{self, AdminDecision, DenyReason},
};

/// is_admin_path
///
/// True for the prefix itself and anything below it (`/admin`, `/admin/…`).
/// `/administrator` is not under `/admin`.
pub fn is_admin_path(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Location of the login page, carrying the attempted path back as `redirect`.
pub fn login_location(config: &AppConfig, attempted_path: &str) -> String {
    format!(
        "{}?redirect={}",
        config.login_path,
        urlencoding::encode(attempted_path)
    )
}

/// Location of the public landing page flagged with the denial.
pub fn denied_location(config: &AppConfig) -> String {
    format!("{}?error=unauthorized", config.landing_path)
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// admin_route_guard
///
/// Middleware installed on the whole router. Requests outside the admin prefix
/// pass through untouched. Under the prefix:
/// - no session: 302 to the login page,
/// - session without the admin role: 302 to the landing page with an error flag,
/// - admin: the `AdminContext` is inserted into request extensions and the
///   request continues to its handler.
pub async fn admin_route_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let config = &state.config;
    let path = request.uri().path().to_string();

    if !is_admin_path(&path, &config.admin_prefix) {
        return next.run(request).await;
    }

    let identity = auth::session_from_headers(request.headers(), config);
    if identity.is_none() {
        if CookieJar::from_headers(request.headers())
            .get(REFRESH_TOKEN_COOKIE)
            .is_some()
        {
            tracing::debug!(path = %path, "refresh token without a usable access token");
        }
        return found(login_location(config, &path));
    }

    match gate::check_admin(&state.roles, identity).await {
        AdminDecision::Admit(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        AdminDecision::Deny(DenyReason::Unauthenticated) => found(login_location(config, &path)),
        AdminDecision::Deny(DenyReason::InsufficientRole) => found(denied_location(config)),
    }
}
