//! Integration tests for sessions, story and world commands through the
//! full router.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use storyloom_test_support::{InMemorySessionStore, ScriptStep};

fn reply(text: &str) -> ScriptStep {
    ScriptStep::Reply(json!({ "text": text }))
}

async fn create_session(app: &common::TestApp, title: &str) -> String {
    let (status, json) = common::post_json(
        app.router.clone(),
        "/api/v1/sessions",
        &json!({ "title": title, "config": { "setting": "salt marsh", "tone": "eerie" } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["session_id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn test_story_round_trip_with_branching() {
    // Arrange
    let app = common::build_test_app(vec![
        reply("Fog rolls over the reeds."),
        reply("A heron watches you."),
        reply("The water is still."),
    ]);
    let id = create_session(&app, "Marshlight").await;
    let base = format!("/api/v1/sessions/{id}/story");

    // Act
    let (status, first) =
        common::post_json(app.router.clone(), &format!("{base}/send"), &json!({ "text": "Wade in" }))
            .await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) =
        common::post_json(app.router.clone(), &format!("{base}/send"), &json!({ "text": "Look up" }))
            .await;
    let look_up = second["session"]["transcript"][2]["id"].clone();
    let (_, edited) = common::post_json(
        app.router.clone(),
        &format!("{base}/edit"),
        &json!({ "node_id": look_up, "text": "Look down" }),
    )
    .await;

    // Assert
    assert_eq!(first["outcome"], "generated");
    assert_eq!(edited["outcome"], "generated");
    let transcript = edited["session"]["transcript"].as_array().unwrap();
    let texts: Vec<&str> = transcript
        .iter()
        .map(|turn| turn["text"].as_str().unwrap())
        .collect();
    assert_eq!(
        texts,
        vec!["Wade in", "Fog rolls over the reeds.", "Look down", "The water is still."]
    );
    assert_eq!(transcript[2]["sibling_count"], 2);
    assert_eq!(transcript[2]["sibling_index"], 1);
    let request = &app.generator.requests()[2];
    assert_eq!(request.context["setting"], "salt marsh");

    let (_, back) = common::post_json(
        app.router.clone(),
        &format!("{base}/navigate"),
        &json!({ "node_id": transcript[2]["id"], "direction": "prev" }),
    )
    .await;
    assert_eq!(back["session"]["transcript"][2]["text"], "Look up");
    assert_eq!(back["session"]["transcript"][3]["text"], "A heron watches you.");
}

#[tokio::test]
async fn test_sessions_persist_and_reload_into_new_engine() {
    // Arrange
    let store = Arc::new(InMemorySessionStore::new());
    let app = common::build_test_app_with_store(vec![reply("Answer")], store.clone());
    let id = create_session(&app, "Marshlight").await;
    common::post_json(
        app.router.clone(),
        &format!("/api/v1/sessions/{id}/story/send"),
        &json!({ "text": "Hello" }),
    )
    .await;

    // Act
    let reloaded = common::build_test_app_with_store(vec![], store);
    let count = reloaded.state.engine.load().await.unwrap();

    // Assert
    assert_eq!(count, 1);
    let (status, json) =
        common::get_json(reloaded.router, &format!("/api/v1/sessions/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transcript"].as_array().unwrap().len(), 2);
    assert_eq!(json["config"]["tone"], "eerie");
}

#[tokio::test]
async fn test_export_and_import_through_router() {
    let app = common::build_test_app(vec![reply("Answer")]);
    let id = create_session(&app, "Marshlight").await;
    common::post_json(
        app.router.clone(),
        &format!("/api/v1/sessions/{id}/story/send"),
        &json!({ "text": "Hello" }),
    )
    .await;

    let (status, document) =
        common::get_text(app.router.clone(), &format!("/api/v1/sessions/{id}/export")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(document.contains("checksum"));

    let (status, imported) =
        common::post_text(app.router.clone(), "/api/v1/sessions/import", document.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(imported["session"]["transcript"].as_array().unwrap().len(), 2);

    let tampered = document.replace("Answer", "Forged");
    let (status, json) =
        common::post_text(app.router.clone(), "/api/v1/sessions/import", tampered).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "import_error");

    let (_, list) = common::get_json(app.router, "/api/v1/sessions").await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_world_generate_edit_undo_through_router() {
    let app = common::build_test_app(vec![ScriptStep::Reply(json!({
        "timeline": [{ "year": "12", "title": "Flood" }, { "year": "3", "title": "Drought" }]
    }))]);
    let id = create_session(&app, "Marshlight").await;
    let base = format!("/api/v1/sessions/{id}/world");

    let (_, generated) =
        common::post_json(app.router.clone(), &format!("{base}/generate"), &json!({})).await;
    let (_, edited) = common::post_json(
        app.router.clone(),
        &format!("{base}/edit"),
        &json!({ "op": "delete_timeline_event", "index": 0 }),
    )
    .await;
    let (_, world) = common::get_json(app.router.clone(), &base).await;

    assert_eq!(generated["session"]["world"]["timeline"][0]["title"], "Drought");
    assert_eq!(edited["session"]["world"]["timeline"][0]["title"], "Flood");
    assert_eq!(world["versions"], 1);
    assert_eq!(world["can_undo"], false);
}
