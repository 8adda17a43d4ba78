//! Runs against a real Postgres. Set DATABASE_URL and run with `--ignored`.

use score_portal::{
    models::{CreateScoreRequest, Difficulty, ScoreFilter, UpdateScoreRequest},
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

async fn create_test_composer(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO composers (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("Failed to create test composer");
    id
}

async fn assign_role(pool: &PgPool, user_id: Uuid, role: &str, age_secs: i64) {
    sqlx::query(
        "INSERT INTO user_roles (user_id, role, created_at) \
         VALUES ($1, $2, NOW() - make_interval(secs => $3))",
    )
    .bind(user_id)
    .bind(role)
    .bind(age_secs as f64)
    .execute(pool)
    .await
    .expect("Failed to assign role");
}

fn new_score(composer_id: Uuid, title: &str) -> CreateScoreRequest {
    CreateScoreRequest {
        title: title.to_string(),
        composer_id,
        instrument: "piano".to_string(),
        difficulty: Difficulty::Advanced,
        pdf_url: format!("scores/{}/test.pdf", composer_id),
        ..CreateScoreRequest::default()
    }
}

// --- Tests ---

#[tokio::test]
#[ignore = "requires Postgres (DATABASE_URL)"]
async fn test_score_lifecycle() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let composer_id = create_test_composer(&ctx.pool, "Integration Composer").await;

    let created = repo
        .create_score(new_score(composer_id, "Integration Sonata"))
        .await
        .unwrap();
    assert_eq!(created.downloads, 0);
    assert_eq!(created.difficulty, Difficulty::Advanced);

    let fetched = repo.get_score(created.id).await.expect("score exists");
    assert_eq!(fetched.composer.unwrap().id, composer_id);

    let listed = repo
        .get_scores(&ScoreFilter {
            composer_id: Some(composer_id),
            ..ScoreFilter::default()
        })
        .await;
    assert_eq!(listed.len(), 1);

    let updated = repo
        .update_score(
            created.id,
            UpdateScoreRequest {
                title: Some("Integration Sonata (rev.)".to_string()),
                ..UpdateScoreRequest::default()
            },
        )
        .await
        .unwrap()
        .expect("score updated");
    assert_eq!(updated.title, "Integration Sonata (rev.)");
    assert_eq!(updated.instrument, "piano");

    let tagged = repo
        .update_score(
            created.id,
            UpdateScoreRequest {
                genre: Some(Some("sonata".to_string())),
                year_composed: Some(Some(1801)),
                ..UpdateScoreRequest::default()
            },
        )
        .await
        .unwrap()
        .expect("score updated");
    assert_eq!(tagged.genre.as_deref(), Some("sonata"));

    let cleared = repo
        .update_score(
            created.id,
            UpdateScoreRequest {
                genre: Some(None),
                ..UpdateScoreRequest::default()
            },
        )
        .await
        .unwrap()
        .expect("score updated");
    assert_eq!(cleared.genre, None);
    assert_eq!(cleared.year_composed, Some(1801));
    assert_eq!(cleared.title, "Integration Sonata (rev.)");

    assert_eq!(repo.increment_downloads(created.id).await.unwrap(), Some(1));
    assert_eq!(repo.increment_downloads(created.id).await.unwrap(), Some(2));

    let deleted = repo.delete_score(created.id).await.unwrap();
    assert!(deleted.is_some());
    assert!(repo.get_score(created.id).await.is_none());
    assert_eq!(repo.increment_downloads(created.id).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Postgres (DATABASE_URL)"]
async fn test_user_role_lookup() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let admin = Uuid::new_v4();
    assign_role(&ctx.pool, admin, "admin", 0).await;
    assert_eq!(
        repo.get_user_role(admin).await.unwrap().as_deref(),
        Some("admin")
    );

    assert_eq!(repo.get_user_role(Uuid::new_v4()).await.unwrap(), None);

    // Most recent assignment wins.
    let promoted = Uuid::new_v4();
    assign_role(&ctx.pool, promoted, "user", 3600).await;
    assign_role(&ctx.pool, promoted, "admin", 0).await;
    assert_eq!(
        repo.get_user_role(promoted).await.unwrap().as_deref(),
        Some("admin")
    );
}
