//! Integration tests for the generation queue, with the processor running
//! and its results folded back into sessions.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use storyloom_core::generator::GenerationError;
use storyloom_test_support::ScriptStep;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_reference_import_result_is_added_to_session() {
    // Arrange
    let mut app = common::build_test_app(vec![ScriptStep::Reply(json!({
        "summary": "A bestiary of marsh spirits."
    }))]);
    let (_, created) = common::post_json(
        app.router.clone(),
        "/api/v1/sessions",
        &json!({ "title": "Marshlight" }),
    )
    .await;
    let session_id = created["session_id"].as_str().unwrap().to_owned();
    let shutdown = CancellationToken::new();
    let processor = tokio::spawn({
        let queue = app.state.queue.clone();
        let shutdown = shutdown.clone();
        async move { queue.run(shutdown).await }
    });

    // Act
    let (status, _) = common::post_json(
        app.router.clone(),
        "/api/v1/queue",
        &json!({
            "kind": "reference_import",
            "category": "reference",
            "title": "Bestiary",
            "payload": { "session_id": session_id }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let outcome = tokio::time::timeout(Duration::from_secs(5), app.outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    let applied = app.state.engine.apply_task_outcome(&outcome).await.unwrap();

    // Assert
    assert!(applied);
    let (_, session) =
        common::get_json(app.router.clone(), &format!("/api/v1/sessions/{session_id}")).await;
    let reference = &session["config"]["reference_material"][0];
    assert_eq!(reference["title"], "Bestiary");
    assert_eq!(reference["content"], "A bestiary of marsh spirits.");
    let (_, queue) = common::get_json(app.router.clone(), "/api/v1/queue").await;
    assert_eq!(queue["items"][0]["status"], "completed");

    shutdown.cancel();
    processor.await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_pauses_queue_until_resumed() {
    // Arrange
    let mut app = common::build_test_app(vec![
        ScriptStep::Fail(GenerationError::RateLimited("quota".to_owned())),
        ScriptStep::Reply(json!({ "summary": "two" })),
        ScriptStep::Reply(json!({ "summary": "three" })),
    ]);
    for title in ["one", "two", "three"] {
        common::post_json(
            app.router.clone(),
            "/api/v1/queue",
            &json!({ "kind": "reference_import", "category": "reference", "title": title }),
        )
        .await;
    }
    let shutdown = CancellationToken::new();
    let processor = tokio::spawn({
        let queue = app.state.queue.clone();
        let shutdown = shutdown.clone();
        async move { queue.run(shutdown).await }
    });

    // Act
    let failed = tokio::time::timeout(Duration::from_secs(5), app.outcomes.recv())
        .await
        .unwrap()
        .unwrap();

    // Assert
    assert!(matches!(failed.result, Err(GenerationError::RateLimited(_))));
    let (_, queue) = common::get_json(app.router.clone(), "/api/v1/queue").await;
    assert_eq!(queue["mode"], json!({ "state": "paused", "reason": "rate_limited" }));
    assert_eq!(queue["items"][1]["status"], "queued");
    assert_eq!(queue["items"][2]["status"], "queued");

    common::call(app.router.clone(), "POST", "/api/v1/queue/resume").await;
    for _ in 0..2 {
        let outcome = tokio::time::timeout(Duration::from_secs(5), app.outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.result.is_ok());
    }
    assert_eq!(app.generator.max_concurrency(), 1);

    shutdown.cancel();
    processor.await.unwrap();
}
