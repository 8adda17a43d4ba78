use crate::{
    AppState,
    error::AppError,
    gate::{AdminContext, AdminUser},
    models::{
        AdminDashboardStats, Composer, ComposerDetail, CreateScoreRequest, DeleteScoreRequest,
        DownloadCountRequest, DownloadCountResponse, DownloadInfo, Score, ScoreDetail,
        ScoreFilter, ScoreResponse, ScoreWithComposer, SuccessResponse, Tag, UpdateScoreRequest,
        UploadPdfResponse,
    },
    storage::{self, PDF_CONTENT_TYPE},
};
use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

/// Lifetime of a signed download URL.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(600);
/// Largest PDF accepted by the upload endpoint.
pub const MAX_PDF_BYTES: usize = 50 * 1024 * 1024;

/// Unwraps a JSON body, turning extractor rejections into a 400 with our error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// --- Catalog ---

/// get_scores
///
/// [Public Route] Newest-first score listing with optional composer, instrument and
/// difficulty filters.
#[utoipa::path(
    get,
    path = "/api/scores",
    params(ScoreFilter),
    responses((status = 200, description = "Scores with their composer", body = [ScoreWithComposer]))
)]
pub async fn get_scores(
    State(state): State<AppState>,
    Query(filter): Query<ScoreFilter>,
) -> Json<Vec<ScoreWithComposer>> {
    Json(state.repo.get_scores(&filter).await)
}

/// get_score_detail
///
/// [Public Route] One score with its composer and tags.
#[utoipa::path(
    get,
    path = "/api/scores/{id}",
    params(("id" = Uuid, Path, description = "Score ID")),
    responses(
        (status = 200, description = "Found", body = ScoreDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_score_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreDetail>, AppError> {
    let score = state
        .repo
        .get_score(id)
        .await
        .ok_or(AppError::NotFound("Score not found"))?;
    let tags = state.repo.get_score_tags(id).await;
    Ok(Json(ScoreDetail { score, tags }))
}

#[utoipa::path(
    get,
    path = "/api/composers",
    responses((status = 200, description = "Composers by name", body = [Composer]))
)]
pub async fn get_composers(State(state): State<AppState>) -> Json<Vec<Composer>> {
    Json(state.repo.get_composers().await)
}

/// get_composer_detail
///
/// [Public Route] A composer together with their scores.
#[utoipa::path(
    get,
    path = "/api/composers/{id}",
    params(("id" = Uuid, Path, description = "Composer ID")),
    responses(
        (status = 200, description = "Found", body = ComposerDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_composer_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ComposerDetail>, AppError> {
    let composer = state
        .repo
        .get_composer(id)
        .await
        .ok_or(AppError::NotFound("Composer not found"))?;
    let scores = state.repo.get_composer_scores(id).await;
    Ok(Json(ComposerDetail { composer, scores }))
}

#[utoipa::path(
    get,
    path = "/api/tags",
    responses((status = 200, description = "Tags by name", body = [Tag]))
)]
pub async fn get_tags(State(state): State<AppState>) -> Json<Vec<Tag>> {
    Json(state.repo.get_tags().await)
}

// --- Downloads ---

/// count_download
///
/// [Public Route] Bumps a score's download counter and returns the new value.
#[utoipa::path(
    post,
    path = "/api/download",
    request_body = DownloadCountRequest,
    responses(
        (status = 200, description = "Counted", body = DownloadCountResponse),
        (status = 400, description = "Missing scoreId"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn count_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadCountRequest>, JsonRejection>,
) -> Result<Json<DownloadCountResponse>, AppError> {
    let score_id = json_body(payload)?
        .score_id
        .ok_or_else(|| AppError::BadRequest("Score ID required".to_string()))?;

    let downloads = state
        .repo
        .increment_downloads(score_id)
        .await?
        .ok_or(AppError::NotFound("Score not found"))?;

    Ok(Json(DownloadCountResponse {
        success: true,
        downloads,
    }))
}

/// A signed download ready to hand out.
struct PreparedDownload {
    url: String,
    filename: String,
    title: String,
    composer: String,
}

/// Shared checks of both download endpoints: the score exists, has a PDF reference,
/// and the object is really in the bucket. Only then is a URL signed.
async fn prepare_download(state: &AppState, id: Uuid) -> Result<PreparedDownload, AppError> {
    let ScoreWithComposer { score, composer } = state
        .repo
        .get_score(id)
        .await
        .ok_or(AppError::NotFound("Score not found"))?;

    let key = score
        .pdf_url
        .as_deref()
        .and_then(|url| storage::pdf_key_from_url(url, &state.config.s3_public_url))
        .ok_or(AppError::NotFound("PDF not available"))?;

    if !state.storage.file_exists(&key).await? {
        return Err(AppError::NotFound("PDF file not found in storage"));
    }

    let composer = composer
        .map(|c| c.name)
        .unwrap_or_else(|| "Unknown".to_string());
    let filename = storage::download_filename(&score.title, &composer);
    let url = state
        .storage
        .get_download_url(&key, DOWNLOAD_URL_TTL, &filename)
        .await?;

    Ok(PreparedDownload {
        url,
        filename,
        title: score.title,
        composer,
    })
}

/// download_redirect
///
/// [Public Route] Redirects (302) to a short-lived signed URL for the score's PDF.
/// The download counter is bumped in the background; a failure there is only logged.
#[utoipa::path(
    get,
    path = "/api/download/descarga/{id}",
    params(("id" = Uuid, Path, description = "Score ID")),
    responses(
        (status = 302, description = "Redirect to the signed PDF URL"),
        (status = 404, description = "Score, PDF reference or object missing")
    )
)]
pub async fn download_redirect(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let download = prepare_download(&state, id).await?;

    let repo = state.repo.clone();
    tokio::spawn(async move {
        if let Err(e) = repo.increment_downloads(id).await {
            tracing::error!(score = %id, error = ?e, "failed to increment downloads");
        }
    });

    Ok((StatusCode::FOUND, [(header::LOCATION, download.url)]).into_response())
}

/// download_info
///
/// [Public Route] Same checks as the redirect, but answers with the signed URL and
/// metadata as JSON. Does not count a download.
#[utoipa::path(
    get,
    path = "/api/download-info/{id}",
    params(("id" = Uuid, Path, description = "Score ID")),
    responses(
        (status = 200, description = "Signed URL", body = DownloadInfo),
        (status = 404, description = "Score, PDF reference or object missing")
    )
)]
pub async fn download_info(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadInfo>, AppError> {
    let download = prepare_download(&state, id).await?;

    Ok(Json(DownloadInfo {
        success: true,
        download_url: download.url,
        filename: download.filename,
        title: download.title,
        composer: download.composer,
        expires_in: DOWNLOAD_URL_TTL.as_secs(),
    }))
}

// --- Admin pages (behind the route guard) ---

/// admin_dashboard
///
/// [Admin Route] Catalog counters. Reached only through the route guard, which has
/// already attached the `AdminContext`.
#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Stats", body = AdminDashboardStats),
        (status = 302, description = "Redirect to login or landing page")
    )
)]
pub async fn admin_dashboard(
    Extension(ctx): Extension<AdminContext>,
    State(state): State<AppState>,
) -> Json<AdminDashboardStats> {
    tracing::debug!(admin = %ctx.identity.subject_id, "dashboard");
    Json(state.repo.get_stats().await)
}

#[utoipa::path(
    get,
    path = "/admin/scores",
    responses(
        (status = 200, description = "Every score", body = [Score]),
        (status = 302, description = "Redirect to login or landing page")
    )
)]
pub async fn admin_scores(
    Extension(ctx): Extension<AdminContext>,
    State(state): State<AppState>,
) -> Json<Vec<Score>> {
    tracing::debug!(admin = %ctx.identity.subject_id, "score list");
    Json(state.repo.get_all_scores().await)
}

// --- Admin API (require_admin at the top of each handler) ---

/// create_score
///
/// [Admin API] Validates and inserts a score.
#[utoipa::path(
    post,
    path = "/api/admin/scores",
    request_body = CreateScoreRequest,
    responses(
        (status = 201, description = "Created", body = ScoreResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "No session"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_score(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateScoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScoreResponse>), AppError> {
    let payload = json_body(payload)?;
    payload.validate()?;

    if state.repo.get_composer(payload.composer_id).await.is_none() {
        return Err(AppError::BadRequest("Unknown composer_id".to_string()));
    }

    let score = state.repo.create_score(payload).await?;
    tracing::info!(admin = %admin.identity.subject_id, score = %score.id, "score created");

    Ok((
        StatusCode::CREATED,
        Json(ScoreResponse {
            success: true,
            score,
        }),
    ))
}

/// update_score
///
/// [Admin API] Partial update; `id` identifies the score and is never written.
#[utoipa::path(
    put,
    path = "/api/admin/scores",
    request_body = UpdateScoreRequest,
    responses(
        (status = 200, description = "Updated", body = ScoreResponse),
        (status = 400, description = "Missing id or invalid payload"),
        (status = 401, description = "No session"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_score(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<UpdateScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, AppError> {
    let payload = json_body(payload)?;
    let id = payload
        .id
        .ok_or_else(|| AppError::BadRequest("Score ID required".to_string()))?;
    payload.validate()?;

    if let Some(composer_id) = payload.composer_id {
        if state.repo.get_composer(composer_id).await.is_none() {
            return Err(AppError::BadRequest("Unknown composer_id".to_string()));
        }
    }

    let score = state
        .repo
        .update_score(id, payload)
        .await?
        .ok_or(AppError::NotFound("Score not found"))?;
    tracing::info!(admin = %admin.identity.subject_id, score = %id, "score updated");

    Ok(Json(ScoreResponse {
        success: true,
        score,
    }))
}

/// delete_score
///
/// [Admin API] Deletes the row, then removes its PDF when the object lives in our
/// bucket. A failed object removal is logged and does not undo the delete.
#[utoipa::path(
    delete,
    path = "/api/admin/scores",
    request_body = DeleteScoreRequest,
    responses(
        (status = 200, description = "Deleted", body = SuccessResponse),
        (status = 400, description = "Missing id"),
        (status = 401, description = "No session"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_score(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    payload: Result<Json<DeleteScoreRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let id = json_body(payload)?
        .id
        .ok_or_else(|| AppError::BadRequest("Score ID required".to_string()))?;

    let deleted = state
        .repo
        .delete_score(id)
        .await?
        .ok_or(AppError::NotFound("Score not found"))?;
    tracing::info!(admin = %admin.identity.subject_id, score = %id, "score deleted");

    let owned_key = deleted
        .pdf_url
        .as_deref()
        .filter(|url| storage::is_owned_pdf(url, &state.config.s3_public_url))
        .and_then(|url| storage::pdf_key_from_url(url, &state.config.s3_public_url));
    if let Some(key) = owned_key {
        if let Err(e) = state.storage.delete_pdf(&key).await {
            tracing::error!(score = %id, key = %key, error = %e, "orphaned PDF after delete");
        }
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// upload_pdf
///
/// [Admin API] Multipart upload of a score PDF (`pdf`, `composer_id`, `title`).
/// Returns the public URL to store on the score and the object key.
#[utoipa::path(
    post,
    path = "/api/admin/upload-pdf",
    responses(
        (status = 200, description = "Uploaded", body = UploadPdfResponse),
        (status = 400, description = "Missing field, not a PDF, or larger than 50 MiB"),
        (status = 401, description = "No session"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn upload_pdf(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadPdfResponse>, AppError> {
    let mut multipart =
        multipart.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

    let mut pdf: Option<(Option<String>, Vec<u8>)> = None;
    let mut composer_id: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("pdf") => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                pdf = Some((content_type, bytes.to_vec()));
            }
            Some("composer_id") => {
                composer_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?,
                );
            }
            Some("title") => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?,
                );
            }
            _ => {}
        }
    }

    let (Some((content_type, body)), Some(composer_id), Some(title)) = (
        pdf,
        composer_id.filter(|s| !s.trim().is_empty()),
        title.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    };

    if content_type.as_deref() != Some(PDF_CONTENT_TYPE) {
        return Err(AppError::BadRequest("File must be a PDF".to_string()));
    }
    if body.len() > MAX_PDF_BYTES {
        return Err(AppError::BadRequest(
            "File is too large (max. 50MB)".to_string(),
        ));
    }
    let composer_id = Uuid::parse_str(composer_id.trim())
        .map_err(|_| AppError::BadRequest("composer_id must be a UUID".to_string()))?;

    let key = storage::generate_pdf_key(&title, composer_id);
    let url = state.storage.upload_pdf(&key, body).await?;
    tracing::info!(admin = %admin.identity.subject_id, key = %key, "pdf uploaded");

    Ok(Json(UploadPdfResponse {
        success: true,
        url,
        key,
    }))
}
