use crate::models::{
    AdminDashboardStats, Composer, CreateScoreRequest, Score, ScoreFilter, ScoreWithComposer, Tag,
    UpdateScoreRequest, UserRole,
};
use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Columns selected for every `Score` row.
const SCORE_COLUMNS: &str = "id, title, composer_id, instrument, difficulty, genre, \
     year_composed, duration_minutes, pdf_url, thumbnail_url, description, views, downloads, \
     created_at, updated_at";

const COMPOSER_COLUMNS: &str =
    "id, name, birth_year, death_year, nationality, bio, imagen_url, created_at";

/// Repository Trait
///
/// Contract for everything the service reads from or writes to the relational backend.
/// Catalog reads degrade to empty results on failure (and log); writes and the role
/// lookup return the error so callers can decide.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Catalog ---
    async fn get_scores(&self, filter: &ScoreFilter) -> Vec<ScoreWithComposer>;
    // Admin listing: every score, no paging.
    async fn get_all_scores(&self) -> Vec<Score>;
    async fn get_score(&self, id: Uuid) -> Option<ScoreWithComposer>;
    async fn get_score_tags(&self, score_id: Uuid) -> Vec<Tag>;
    async fn get_composers(&self) -> Vec<Composer>;
    async fn get_composer(&self, id: Uuid) -> Option<Composer>;
    async fn get_composer_scores(&self, composer_id: Uuid) -> Vec<Score>;
    async fn get_tags(&self) -> Vec<Tag>;

    // --- Downloads ---
    // Returns the new counter, or None when the score does not exist.
    async fn increment_downloads(&self, score_id: Uuid) -> Result<Option<i32>, sqlx::Error>;

    // --- Admin writes ---
    async fn create_score(&self, req: CreateScoreRequest) -> Result<Score, sqlx::Error>;
    // Only fields that are Some are written.
    async fn update_score(
        &self,
        id: Uuid,
        req: UpdateScoreRequest,
    ) -> Result<Option<Score>, sqlx::Error>;
    // Returns the deleted row so its PDF can be cleaned up.
    async fn delete_score(&self, id: Uuid) -> Result<Option<Score>, sqlx::Error>;
    async fn get_stats(&self) -> AdminDashboardStats;

    // --- Roles ---
    async fn get_user_role(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the Supabase Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the composers referenced by `scores` in one query and pairs them up.
    async fn attach_composers(&self, scores: Vec<Score>) -> Vec<ScoreWithComposer> {
        let mut ids: Vec<Uuid> = scores.iter().map(|s| s.composer_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let composers: HashMap<Uuid, Composer> = if ids.is_empty() {
            HashMap::new()
        } else {
            let sql = format!(
                "SELECT {} FROM composers WHERE id = ANY($1)",
                COMPOSER_COLUMNS
            );
            sqlx::query_as::<_, Composer>(&sql)
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("attach_composers error: {:?}", e);
                    vec![]
                })
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        scores
            .into_iter()
            .map(|score| ScoreWithComposer {
                composer: composers.get(&score.composer_id).cloned(),
                score,
            })
            .collect()
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_scores
    ///
    /// Filtered, newest-first listing built with QueryBuilder so every user value is
    /// a bound parameter.
    async fn get_scores(&self, filter: &ScoreFilter) -> Vec<ScoreWithComposer> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM scores WHERE true", SCORE_COLUMNS));

        if let Some(composer_id) = filter.composer_id {
            builder.push(" AND composer_id = ");
            builder.push_bind(composer_id);
        }
        if let Some(instrument) = &filter.instrument {
            builder.push(" AND instrument ILIKE ");
            builder.push_bind(instrument.clone());
        }
        if let Some(difficulty) = filter.difficulty {
            builder.push(" AND difficulty = ");
            builder.push_bind(difficulty.as_str());
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(filter.effective_limit());

        let scores = match builder.build_query_as::<Score>().fetch_all(&self.pool).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("get_scores error: {:?}", e);
                return vec![];
            }
        };

        self.attach_composers(scores).await
    }

    async fn get_all_scores(&self) -> Vec<Score> {
        let sql = format!("SELECT {} FROM scores ORDER BY created_at DESC", SCORE_COLUMNS);
        sqlx::query_as::<_, Score>(&sql)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_all_scores error: {:?}", e);
                vec![]
            })
    }

    async fn get_score(&self, id: Uuid) -> Option<ScoreWithComposer> {
        let sql = format!("SELECT {} FROM scores WHERE id = $1", SCORE_COLUMNS);
        let score = sqlx::query_as::<_, Score>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_score error: {:?}", e);
                None
            })?;

        self.attach_composers(vec![score]).await.pop()
    }

    async fn get_score_tags(&self, score_id: Uuid) -> Vec<Tag> {
        sqlx::query_as::<_, Tag>(
            r#"
            SELECT t.id, t.name
            FROM tags t
            JOIN score_tags st ON st.tag_id = t.id
            WHERE st.score_id = $1
            ORDER BY t.name
            "#,
        )
        .bind(score_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_score_tags error: {:?}", e);
            vec![]
        })
    }

    async fn get_composers(&self) -> Vec<Composer> {
        let sql = format!("SELECT {} FROM composers ORDER BY name", COMPOSER_COLUMNS);
        sqlx::query_as::<_, Composer>(&sql)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_composers error: {:?}", e);
                vec![]
            })
    }

    async fn get_composer(&self, id: Uuid) -> Option<Composer> {
        let sql = format!("SELECT {} FROM composers WHERE id = $1", COMPOSER_COLUMNS);
        sqlx::query_as::<_, Composer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_composer error: {:?}", e);
                None
            })
    }

    async fn get_composer_scores(&self, composer_id: Uuid) -> Vec<Score> {
        let sql = format!(
            "SELECT {} FROM scores WHERE composer_id = $1 ORDER BY title",
            SCORE_COLUMNS
        );
        sqlx::query_as::<_, Score>(&sql)
            .bind(composer_id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_composer_scores error: {:?}", e);
                vec![]
            })
    }

    async fn get_tags(&self) -> Vec<Tag> {
        sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_tags error: {:?}", e);
                vec![]
            })
    }

    /// increment_downloads
    ///
    /// Single atomic UPDATE; concurrent downloads never lose an increment.
    async fn increment_downloads(&self, score_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE scores SET downloads = downloads + 1 WHERE id = $1 RETURNING downloads",
        )
        .bind(score_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// create_score
    ///
    /// Counters start at zero; timestamps are set by the database.
    async fn create_score(&self, req: CreateScoreRequest) -> Result<Score, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO scores (
                id, title, composer_id, instrument, difficulty, genre, year_composed,
                duration_minutes, description, pdf_url, thumbnail_url,
                views, downloads, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, 0, NOW(), NOW())
            RETURNING {}
            "#,
            SCORE_COLUMNS
        );
        sqlx::query_as::<_, Score>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.title)
            .bind(req.composer_id)
            .bind(req.instrument)
            .bind(req.difficulty.as_str())
            .bind(req.genre)
            .bind(req.year_composed)
            .bind(req.duration_minutes)
            .bind(req.description)
            .bind(req.pdf_url)
            .bind(req.thumbnail_url)
            .fetch_one(&self.pool)
            .await
    }

    /// update_score
    ///
    /// Required columns use COALESCE, so None keeps the stored value. Nullable
    /// columns take a "present" flag plus a value: an explicit null clears them.
    async fn update_score(
        &self,
        id: Uuid,
        req: UpdateScoreRequest,
    ) -> Result<Option<Score>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE scores
            SET title = COALESCE($2, title),
                composer_id = COALESCE($3, composer_id),
                instrument = COALESCE($4, instrument),
                difficulty = COALESCE($5, difficulty),
                genre = CASE WHEN $6 THEN $7 ELSE genre END,
                year_composed = CASE WHEN $8 THEN $9 ELSE year_composed END,
                duration_minutes = CASE WHEN $10 THEN $11 ELSE duration_minutes END,
                description = CASE WHEN $12 THEN $13 ELSE description END,
                pdf_url = CASE WHEN $14 THEN $15 ELSE pdf_url END,
                thumbnail_url = CASE WHEN $16 THEN $17 ELSE thumbnail_url END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SCORE_COLUMNS
        );
        sqlx::query_as::<_, Score>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.composer_id)
            .bind(req.instrument)
            .bind(req.difficulty.map(|d| d.as_str()))
            .bind(req.genre.is_some())
            .bind(req.genre.flatten())
            .bind(req.year_composed.is_some())
            .bind(req.year_composed.flatten())
            .bind(req.duration_minutes.is_some())
            .bind(req.duration_minutes.flatten())
            .bind(req.description.is_some())
            .bind(req.description.flatten())
            .bind(req.pdf_url.is_some())
            .bind(req.pdf_url.flatten())
            .bind(req.thumbnail_url.is_some())
            .bind(req.thumbnail_url.flatten())
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_score(&self, id: Uuid) -> Result<Option<Score>, sqlx::Error> {
        let sql = format!("DELETE FROM scores WHERE id = $1 RETURNING {}", SCORE_COLUMNS);
        sqlx::query_as::<_, Score>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// get_stats
    ///
    /// Counters for the admin dashboard; a failing counter reads as zero.
    async fn get_stats(&self) -> AdminDashboardStats {
        let total_scores = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scores")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_composers = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM composers")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);
        let total_downloads =
            sqlx::query_scalar::<_, i64>("SELECT COALESCE(SUM(downloads), 0)::BIGINT FROM scores")
                .fetch_one(&self.pool)
                .await
                .unwrap_or(0);
        AdminDashboardStats {
            total_scores,
            total_composers,
            total_downloads,
        }
    }

    /// get_user_role
    ///
    /// Exact match on `user_id`. Should a subject hold several rows, the most recent
    /// assignment is the effective one.
    async fn get_user_role(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query_as::<_, UserRole>(
            r#"
            SELECT user_id, role, created_at
            FROM user_roles
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.role))
    }
}
