use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control: session reading, role resolution, the gate and the route guard.
pub mod auth;
pub mod gate;
pub mod guard;
pub mod roles;

// Catalog services.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;

pub mod routes;
use routes::{admin, api_admin, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{PostgresRepository, RepositoryState};
pub use roles::{RoleResolver, RoleResolverState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every handler annotated with `#[utoipa::path]`, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_scores, handlers::get_score_detail, handlers::get_composers,
        handlers::get_composer_detail, handlers::get_tags, handlers::count_download,
        handlers::download_redirect, handlers::download_info, handlers::admin_dashboard,
        handlers::admin_scores, handlers::create_score, handlers::update_score,
        handlers::delete_score, handlers::upload_pdf
    ),
    components(
        schemas(
            models::Difficulty, models::Composer, models::Score, models::ScoreWithComposer,
            models::ScoreDetail, models::ComposerDetail, models::Tag, models::CreateScoreRequest,
            models::UpdateScoreRequest, models::DeleteScoreRequest, models::DownloadCountRequest,
            models::DownloadCountResponse, models::DownloadInfo, models::UploadPdfResponse,
            models::ScoreResponse, models::SuccessResponse, models::AdminDashboardStats,
        )
    ),
    tags(
        (name = "score-portal", description = "Sheet music catalog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, cloneable container of every service a request may need. Built once in
/// `main` (or by a test) and handed to `create_router`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    /// Role lookup used by the gate. Its source is fixed at startup.
    pub roles: RoleResolverState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for RoleResolverState {
    fn from_ref(app_state: &AppState) -> RoleResolverState {
        app_state.roles.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route, installs the admin route guard over all of them, and
/// wraps the result in the observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");
    let admin_prefix = state.config.admin_prefix.clone();

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(api_admin::api_admin_routes())
        .nest(&admin_prefix, admin::admin_routes())
        // The guard sees the full path and only acts on the admin prefix, so it
        // can sit over the whole router.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            guard::admin_route_guard,
        ))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with the `x-request-id` set by the layer above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
