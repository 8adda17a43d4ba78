mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{body_json, spawn_app};
use score_portal::models::ScoreFilter;
use uuid::Uuid;

fn get(uri: String) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();

    let response = app.send(get("/health".to_string())).await;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_list_scores_newest_first_with_composer() {
    let app = spawn_app();
    let bach = app.repo.add_composer("Johann Sebastian Bach");
    app.repo.add_score(bach.id, "Prelude in C", None);
    app.repo.add_score(bach.id, "Fugue in C minor", None);

    let response = app.send(get("/api/scores".to_string())).await;

    assert_eq!(response.status(), StatusCode::OK);
    let scores = body_json(response).await;
    let scores = scores.as_array().unwrap();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0]["title"], "Fugue in C minor");
    assert_eq!(scores[0]["composer"]["name"], "Johann Sebastian Bach");
}

#[tokio::test]
async fn test_list_scores_filters_and_limits() {
    let app = spawn_app();
    let bach = app.repo.add_composer("Johann Sebastian Bach");
    let mozart = app.repo.add_composer("Wolfgang Amadeus Mozart");
    for n in 0..3 {
        app.repo.add_score(bach.id, &format!("Invention {}", n), None);
    }
    app.repo.add_score(mozart.id, "Rondo alla Turca", None);

    let by_composer = body_json(
        app.send(get(format!("/api/scores?composer_id={}", mozart.id)))
            .await,
    )
    .await;
    assert_eq!(by_composer.as_array().unwrap().len(), 1);
    assert_eq!(by_composer[0]["title"], "Rondo alla Turca");

    let limited = body_json(app.send(get("/api/scores?limit=2".to_string())).await).await;
    assert_eq!(limited.as_array().unwrap().len(), 2);

    let by_difficulty =
        body_json(app.send(get("/api/scores?difficulty=expert".to_string())).await).await;
    assert!(by_difficulty.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_difficulty_is_rejected() {
    let app = spawn_app();

    let response = app
        .send(get("/api/scores?difficulty=impossible".to_string()))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_score_detail_includes_composer_and_tags() {
    let app = spawn_app();
    let chopin = app.repo.add_composer("Frédéric Chopin");
    let score = app.repo.add_score(chopin.id, "Étude Op. 10 No. 3", None);
    app.repo.tag_score(score.id, "romantic");

    let response = app.send(get(format!("/api/scores/{}", score.id))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], score.id.to_string());
    assert_eq!(body["composer"]["id"], chopin.id.to_string());
    assert_eq!(body["tags"][0]["name"], "romantic");
}

#[tokio::test]
async fn test_score_detail_not_found() {
    let app = spawn_app();

    let response = app
        .send(get(format!("/api/scores/{}", Uuid::new_v4())))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Score not found");
}

#[tokio::test]
async fn test_composer_detail_lists_scores() {
    let app = spawn_app();
    let liszt = app.repo.add_composer("Franz Liszt");
    app.repo.add_score(liszt.id, "La Campanella", None);

    let composers = body_json(app.send(get("/api/composers".to_string())).await).await;
    assert_eq!(composers.as_array().unwrap().len(), 1);

    let detail = body_json(app.send(get(format!("/api/composers/{}", liszt.id))).await).await;
    assert_eq!(detail["name"], "Franz Liszt");
    assert_eq!(detail["scores"][0]["title"], "La Campanella");

    let missing = app
        .send(get(format!("/api/composers/{}", Uuid::new_v4())))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tags_listing() {
    let app = spawn_app();
    let satie = app.repo.add_composer("Erik Satie");
    let score = app.repo.add_score(satie.id, "Gymnopédie No. 1", None);
    app.repo.tag_score(score.id, "impressionist");

    let tags = body_json(app.send(get("/api/tags".to_string())).await).await;
    assert_eq!(tags[0]["name"], "impressionist");
}

#[test]
fn test_score_filter_limit_is_clamped() {
    let default = ScoreFilter::default();
    assert_eq!(default.effective_limit(), 20);

    let huge = ScoreFilter {
        limit: Some(10_000),
        ..ScoreFilter::default()
    };
    assert_eq!(huge.effective_limit(), 100);

    let zero = ScoreFilter {
        limit: Some(0),
        ..ScoreFilter::default()
    };
    assert_eq!(zero.effective_limit(), 1);
}
