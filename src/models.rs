use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Core Catalog Schemas (Mapped to Database) ---

/// Difficulty
///
/// Closed set of difficulty grades a score may carry. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            "expert" => Ok(Difficulty::Expert),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

impl TryFrom<String> for Difficulty {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Composer
///
/// A row of the `composers` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Composer {
    pub id: Uuid,
    pub name: String,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
    pub nationality: Option<String>,
    pub bio: Option<String>,
    pub imagen_url: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Score
///
/// A row of the `scores` table. `pdf_url` holds either a full public URL or a bare
/// object key; the download handlers accept both.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Score {
    pub id: Uuid,
    pub title: String,
    pub composer_id: Uuid,
    pub instrument: String,
    #[sqlx(try_from = "String")]
    pub difficulty: Difficulty,
    pub genre: Option<String>,
    pub year_composed: Option<i32>,
    pub duration_minutes: Option<i32>,
    pub pdf_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub views: i32,
    pub downloads: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ScoreWithComposer
///
/// A score joined with its composer, as served by the catalog listing.
/// The composer is optional so a dangling `composer_id` never hides the score.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ScoreWithComposer {
    #[serde(flatten)]
    pub score: Score,
    pub composer: Option<Composer>,
}

/// ScoreDetail
///
/// Output of the score detail endpoint: the score, its composer and its tags.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ScoreDetail {
    #[serde(flatten)]
    pub score: ScoreWithComposer,
    pub tags: Vec<Tag>,
}

/// ComposerDetail
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ComposerDetail {
    #[serde(flatten)]
    pub composer: Composer,
    pub scores: Vec<Score>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// UserRole
///
/// A row of the `user_roles` table. `role` is an open string ("admin", "user", ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// --- Query Parameters ---

/// ScoreFilter
///
/// Accepted query parameters for `GET /api/scores`.
#[derive(Debug, Clone, Deserialize, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScoreFilter {
    /// Page size, defaults to 20 and is capped at 100.
    pub limit: Option<i64>,
    pub composer_id: Option<Uuid>,
    pub instrument: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl ScoreFilter {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

// --- Request Payloads (Input Schemas) ---

/// CreateScoreRequest
///
/// Input payload for `POST /api/admin/scores`. The PDF is uploaded first through
/// `/api/admin/upload-pdf`; its URL is then referenced here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateScoreRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub composer_id: Uuid,
    #[validate(length(min = 1))]
    pub instrument: String,
    pub difficulty: Difficulty,
    pub genre: Option<String>,
    #[validate(range(min = 1500, max = 2025))]
    pub year_composed: Option<i32>,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i32>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(url)]
    pub pdf_url: String,
    #[validate(url)]
    pub thumbnail_url: Option<String>,
}

/// UpdateScoreRequest
///
/// Partial update for `PUT /api/admin/scores`. `id` is mandatory but kept optional
/// here so its absence maps to a 400 with a precise message.
///
/// Nullable columns are tri-state: an absent key leaves the column alone
/// (`None`), an explicit `null` clears it (`Some(None)`), a value sets it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default, PartialEq)]
#[ts(export)]
pub struct UpdateScoreRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub instrument: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<String>)]
    #[ts(optional)]
    pub genre: Option<Option<String>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(range(min = 1500, max = 2025))]
    #[schema(value_type = Option<i32>)]
    #[ts(optional)]
    pub year_composed: Option<Option<i32>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(range(min = 1))]
    #[schema(value_type = Option<i32>)]
    #[ts(optional)]
    pub duration_minutes: Option<Option<i32>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(length(max = 2000))]
    #[schema(value_type = Option<String>)]
    #[ts(optional)]
    pub description: Option<Option<String>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(url)]
    #[schema(value_type = Option<String>)]
    #[ts(optional)]
    pub pdf_url: Option<Option<String>>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    #[validate(url)]
    #[schema(value_type = Option<String>)]
    #[ts(optional)]
    pub thumbnail_url: Option<Option<String>>,
}

/// Marks a key as present, keeping an explicit `null` as `Some(None)`.
/// Paired with `#[serde(default)]`, which yields `None` for a missing key.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// DeleteScoreRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DeleteScoreRequest {
    pub id: Option<Uuid>,
}

/// DownloadCountRequest
///
/// Body of `POST /api/download`; the frontend sends camelCase.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DownloadCountRequest {
    pub score_id: Option<Uuid>,
}

// --- Response Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DownloadCountResponse {
    pub success: bool,
    pub downloads: i32,
}

/// DownloadInfo
///
/// Output of `GET /api/download-info/{id}`: a signed URL plus the metadata the
/// download dialog shows.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DownloadInfo {
    pub success: bool,
    pub download_url: String,
    pub filename: String,
    pub title: String,
    pub composer: String,
    /// Seconds until `download_url` stops working.
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UploadPdfResponse {
    pub success: bool,
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ScoreResponse {
    pub success: bool,
    pub score: Score,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SuccessResponse {
    pub success: bool,
}

/// AdminDashboardStats
///
/// Output of `GET /admin`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_scores: i64,
    pub total_composers: i64,
    pub total_downloads: i64,
}
