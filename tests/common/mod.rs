#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use score_portal::{
    AppConfig, AppState, RoleResolver, create_router,
    auth::{AppMetadata, Claims, Identity},
    models::{
        AdminDashboardStats, Composer, CreateScoreRequest, Score, ScoreFilter, ScoreWithComposer,
        Tag, UpdateScoreRequest,
    },
    repository::{Repository, RepositoryState},
    roles::RoleResolverState,
    storage::{MockStorageService, StorageState},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::SystemTime,
};
use tower::util::ServiceExt;
use uuid::Uuid;

// --- Well-known subjects ---

pub const ADMIN_ID: Uuid = Uuid::from_u128(1);
pub const USER_ID: Uuid = Uuid::from_u128(2);
pub const NO_ROLE_ID: Uuid = Uuid::from_u128(3);

// --- In-memory repository ---

/// Repository double holding the catalog and `user_roles` in memory.
/// Counts role lookups and can be told to fail them.
#[derive(Default)]
pub struct InMemoryRepo {
    composers: Mutex<Vec<Composer>>,
    scores: Mutex<Vec<Score>>,
    score_tags: Mutex<HashMap<Uuid, Vec<Tag>>>,
    roles: Mutex<HashMap<Uuid, String>>,
    role_lookups: AtomicUsize,
    fail_role_lookups: AtomicBool,
}

impl InMemoryRepo {
    /// ADMIN_ID is "admin", USER_ID is "user", NO_ROLE_ID has no row.
    pub fn with_default_roles() -> Self {
        let repo = Self::default();
        repo.set_role(ADMIN_ID, "admin");
        repo.set_role(USER_ID, "user");
        repo
    }

    pub fn set_role(&self, user_id: Uuid, role: &str) {
        self.roles.lock().unwrap().insert(user_id, role.to_string());
    }

    pub fn revoke_role(&self, user_id: Uuid) {
        self.roles.lock().unwrap().remove(&user_id);
    }

    pub fn fail_role_lookups(&self, fail: bool) {
        self.fail_role_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn role_lookups(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    pub fn add_composer(&self, name: &str) -> Composer {
        let composer = Composer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
            ..Composer::default()
        };
        self.composers.lock().unwrap().push(composer.clone());
        composer
    }

    pub fn add_score(&self, composer_id: Uuid, title: &str, pdf_url: Option<&str>) -> Score {
        // Strictly increasing timestamps so "newest first" is deterministic.
        let offset = self.scores.lock().unwrap().len() as i64;
        let now = Utc::now() + ChronoDuration::seconds(offset);
        let score = Score {
            id: Uuid::new_v4(),
            title: title.to_string(),
            composer_id,
            instrument: "piano".to_string(),
            pdf_url: pdf_url.map(str::to_string),
            created_at: now,
            updated_at: now,
            ..Score::default()
        };
        self.scores.lock().unwrap().push(score.clone());
        score
    }

    pub fn tag_score(&self, score_id: Uuid, name: &str) {
        self.score_tags
            .lock()
            .unwrap()
            .entry(score_id)
            .or_default()
            .push(Tag {
                id: Uuid::new_v4(),
                name: name.to_string(),
            });
    }

    pub fn score(&self, id: Uuid) -> Option<Score> {
        self.scores.lock().unwrap().iter().find(|s| s.id == id).cloned()
    }

    pub fn score_count(&self) -> usize {
        self.scores.lock().unwrap().len()
    }

    fn with_composer(&self, score: Score) -> ScoreWithComposer {
        let composer = self
            .composers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == score.composer_id)
            .cloned();
        ScoreWithComposer { score, composer }
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn get_scores(&self, filter: &ScoreFilter) -> Vec<ScoreWithComposer> {
        let mut scores: Vec<Score> = self
            .scores
            .lock()
            .unwrap()
            .iter()
            .filter(|s| filter.composer_id.is_none_or(|id| s.composer_id == id))
            .filter(|s| {
                filter
                    .instrument
                    .as_ref()
                    .is_none_or(|i| s.instrument.eq_ignore_ascii_case(i))
            })
            .filter(|s| filter.difficulty.is_none_or(|d| s.difficulty == d))
            .cloned()
            .collect();
        scores.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        scores.truncate(filter.effective_limit() as usize);
        scores.into_iter().map(|s| self.with_composer(s)).collect()
    }

    async fn get_all_scores(&self) -> Vec<Score> {
        self.scores.lock().unwrap().clone()
    }

    async fn get_score(&self, id: Uuid) -> Option<ScoreWithComposer> {
        self.score(id).map(|s| self.with_composer(s))
    }

    async fn get_score_tags(&self, score_id: Uuid) -> Vec<Tag> {
        self.score_tags
            .lock()
            .unwrap()
            .get(&score_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn get_composers(&self) -> Vec<Composer> {
        self.composers.lock().unwrap().clone()
    }

    async fn get_composer(&self, id: Uuid) -> Option<Composer> {
        self.composers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    async fn get_composer_scores(&self, composer_id: Uuid) -> Vec<Score> {
        self.scores
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.composer_id == composer_id)
            .cloned()
            .collect()
    }

    async fn get_tags(&self) -> Vec<Tag> {
        self.score_tags
            .lock()
            .unwrap()
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    async fn increment_downloads(&self, score_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        let mut scores = self.scores.lock().unwrap();
        Ok(scores.iter_mut().find(|s| s.id == score_id).map(|s| {
            s.downloads += 1;
            s.downloads
        }))
    }

    async fn create_score(&self, req: CreateScoreRequest) -> Result<Score, sqlx::Error> {
        let now = Utc::now();
        let score = Score {
            id: Uuid::new_v4(),
            title: req.title,
            composer_id: req.composer_id,
            instrument: req.instrument,
            difficulty: req.difficulty,
            genre: req.genre,
            year_composed: req.year_composed,
            duration_minutes: req.duration_minutes,
            pdf_url: Some(req.pdf_url),
            thumbnail_url: req.thumbnail_url,
            description: req.description,
            views: 0,
            downloads: 0,
            created_at: now,
            updated_at: now,
        };
        self.scores.lock().unwrap().push(score.clone());
        Ok(score)
    }

    async fn update_score(
        &self,
        id: Uuid,
        req: UpdateScoreRequest,
    ) -> Result<Option<Score>, sqlx::Error> {
        let mut scores = self.scores.lock().unwrap();
        let Some(score) = scores.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            score.title = title;
        }
        if let Some(composer_id) = req.composer_id {
            score.composer_id = composer_id;
        }
        if let Some(instrument) = req.instrument {
            score.instrument = instrument;
        }
        if let Some(difficulty) = req.difficulty {
            score.difficulty = difficulty;
        }
        if let Some(genre) = req.genre {
            score.genre = genre;
        }
        if let Some(year_composed) = req.year_composed {
            score.year_composed = year_composed;
        }
        if let Some(duration_minutes) = req.duration_minutes {
            score.duration_minutes = duration_minutes;
        }
        if let Some(description) = req.description {
            score.description = description;
        }
        if let Some(pdf_url) = req.pdf_url {
            score.pdf_url = pdf_url;
        }
        if let Some(thumbnail_url) = req.thumbnail_url {
            score.thumbnail_url = thumbnail_url;
        }
        score.updated_at = Utc::now();
        Ok(Some(score.clone()))
    }

    async fn delete_score(&self, id: Uuid) -> Result<Option<Score>, sqlx::Error> {
        let mut scores = self.scores.lock().unwrap();
        let index = scores.iter().position(|s| s.id == id);
        Ok(index.map(|i| scores.remove(i)))
    }

    async fn get_stats(&self) -> AdminDashboardStats {
        let scores = self.scores.lock().unwrap();
        AdminDashboardStats {
            total_scores: scores.len() as i64,
            total_composers: self.composers.lock().unwrap().len() as i64,
            total_downloads: scores.iter().map(|s| s.downloads as i64).sum(),
        }
    }

    async fn get_user_role(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_role_lookups.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self.roles.lock().unwrap().get(&user_id).cloned())
    }
}

// --- App assembly ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepo>,
    pub storage: MockStorageService,
    pub config: AppConfig,
}

/// Test configuration: local env, `user_roles` source, storage URLs of the mock.
pub fn test_config() -> AppConfig {
    AppConfig {
        s3_public_url: MockStorageService::PUBLIC_URL.to_string(),
        ..AppConfig::default()
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(InMemoryRepo::with_default_roles(), MockStorageService::new(), test_config())
}

pub fn spawn_app_with(repo: InMemoryRepo, storage: MockStorageService, config: AppConfig) -> TestApp {
    let repo = Arc::new(repo);
    let repo_state = repo.clone() as RepositoryState;
    let roles: RoleResolverState = Arc::new(RoleResolver::from_config(&config, repo_state.clone()));

    let state = AppState {
        repo: repo_state,
        storage: Arc::new(storage.clone()) as StorageState,
        roles,
        config: config.clone(),
    };

    TestApp {
        router: create_router(state),
        repo,
        storage,
        config,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(axum::http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("Location header")
}

// --- Tokens ---

/// Mints an access token the way Supabase does, signed with `config.jwt_secret`.
/// `exp_offset` is relative to now in seconds and may be negative.
pub fn token_for(config: &AppConfig, user_id: Uuid, embedded_role: Option<&str>, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
        aud: config.jwt_audience.clone(),
        email: Some(format!("{}@example.com", user_id.simple())),
        app_metadata: AppMetadata {
            role: embedded_role.map(str::to_string),
        },
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .unwrap()
}

pub fn bearer(config: &AppConfig, user_id: Uuid) -> String {
    format!("Bearer {}", token_for(config, user_id, None, 3600))
}

pub fn identity(user_id: Uuid) -> Identity {
    Identity {
        subject_id: user_id,
        embedded_role: None,
    }
}
