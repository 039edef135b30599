//! Routes for the world model of a session.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use storyloom_core::ids::SessionId;
use storyloom_session::SessionCommand;
use storyloom_world_state::{WorldEdit, WorldSection, WorldSnapshot};
use tracing::instrument;

use super::{CommandResponse, run_command};
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /generate.
#[derive(Debug, Deserialize)]
pub struct GenerateWorldRequest {
    /// Section to regenerate; the whole world when absent.
    #[serde(default)]
    pub section: Option<WorldSection>,
    /// Extra instructions for this request.
    #[serde(default)]
    pub modifiers: Option<String>,
}

/// Response body for GET /world.
#[derive(Debug, Serialize)]
pub struct WorldResponse {
    /// The snapshot at the history cursor.
    pub world: Option<WorldSnapshot>,
    /// Number of stored versions.
    pub versions: usize,
    /// Whether undo is possible.
    pub can_undo: bool,
    /// Whether redo is possible.
    pub can_redo: bool,
}

/// GET /{session_id}/world
async fn get_world(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<WorldResponse>, ApiError> {
    let view = state.engine.session_view(session_id)?;
    Ok(Json(WorldResponse {
        world: view.world,
        versions: view.world_versions,
        can_undo: view.can_undo,
        can_redo: view.can_redo,
    }))
}

/// POST /{session_id}/world/generate
#[instrument(skip_all, fields(session_id = %session_id, section = ?request.section))]
async fn generate_world(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<GenerateWorldRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::GenerateWorld {
        section: request.section,
        modifiers: request.modifiers,
    };
    run_command(&state, session_id, command).await
}

/// POST /{session_id}/world/edit
///
/// The body is a tagged `WorldEdit`, e.g. `{"op": "add_tier", ...}`.
#[instrument(skip_all, fields(session_id = %session_id, op = edit.op_name()))]
async fn edit_world(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(edit): Json<WorldEdit>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, session_id, SessionCommand::EditWorld { edit }).await
}

/// POST /{session_id}/world/undo
#[instrument(skip_all, fields(session_id = %session_id))]
async fn undo_world(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, session_id, SessionCommand::UndoWorld).await
}

/// POST /{session_id}/world/redo
#[instrument(skip_all, fields(session_id = %session_id))]
async fn redo_world(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, session_id, SessionCommand::RedoWorld).await
}

/// Returns the router for world commands.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{session_id}/world", get(get_world))
        .route("/{session_id}/world/generate", post(generate_world))
        .route("/{session_id}/world/edit", post(edit_world))
        .route("/{session_id}/world/undo", post(undo_world))
        .route("/{session_id}/world/redo", post(redo_world))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use storyloom_core::generator::GenerationError;
    use storyloom_session::SessionConfig;
    use storyloom_test_support::{ScriptStep, ScriptedGenerator};
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_support::{body_json, empty_request, json_request, test_app_state};

    async fn fixture(steps: Vec<ScriptStep>) -> (Router, Arc<ScriptedGenerator>, SessionId) {
        let generator = Arc::new(ScriptedGenerator::new(steps));
        let state = test_app_state(generator.clone());
        let session_id = state
            .engine
            .create_session("Embers", SessionConfig::default())
            .await
            .unwrap();
        (router().with_state(state), generator, session_id)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => json_request(method, uri, &body),
            None => empty_request(method, uri),
        };
        body_json(app.clone().oneshot(request).await.unwrap()).await
    }

    #[tokio::test]
    async fn test_generate_then_partial_regenerate_keeps_other_sections() {
        // Arrange
        let (app, generator, id) = fixture(vec![
            ScriptStep::Reply(json!({
                "timeline": [{ "year": "5", "title": "Founding" }],
                "hierarchy": { "Houses": [{ "name": "Great", "entities": [] }] }
            })),
            ScriptStep::Reply(json!({ "timeline": [{ "year": "9", "title": "Schism" }] })),
        ])
        .await;
        send(&app, "POST", &format!("/{id}/world/generate"), Some(json!({}))).await;

        // Act
        let (status, json) = send(
            &app,
            "POST",
            &format!("/{id}/world/generate"),
            Some(json!({ "section": "timeline", "modifiers": "more wars" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "generated");
        let world = &json["session"]["world"];
        assert_eq!(world["timeline"][0]["title"], "Schism");
        assert_eq!(world["hierarchy"]["Houses"][0]["name"], "Great");
        assert_eq!(
            generator.requests()[1].modifiers.as_deref(),
            Some("more wars")
        );
    }

    #[tokio::test]
    async fn test_undo_redo_and_get_world() {
        // Arrange
        let (app, _, id) = fixture(vec![
            ScriptStep::Reply(json!({ "timeline": [{ "year": "1", "title": "Dawn" }] })),
            ScriptStep::Reply(json!({ "timeline": [{ "year": "2", "title": "Dusk" }] })),
        ])
        .await;
        send(&app, "POST", &format!("/{id}/world/generate"), Some(json!({}))).await;
        send(&app, "POST", &format!("/{id}/world/generate"), Some(json!({}))).await;

        // Act
        let (_, undone) = send(&app, "POST", &format!("/{id}/world/undo"), None).await;
        let (_, world) = send(&app, "GET", &format!("/{id}/world"), None).await;
        let (_, redone) = send(&app, "POST", &format!("/{id}/world/redo"), None).await;
        let (_, again) = send(&app, "POST", &format!("/{id}/world/redo"), None).await;

        // Assert
        assert_eq!(undone["outcome"], "applied");
        assert_eq!(world["world"]["timeline"][0]["title"], "Dawn");
        assert_eq!(world["versions"], 2);
        assert_eq!(world["can_redo"], true);
        assert_eq!(redone["session"]["world"]["timeline"][0]["title"], "Dusk");
        assert_eq!(again["outcome"], "unchanged");
    }

    #[tokio::test]
    async fn test_edit_world_on_empty_history_creates_snapshot() {
        let (app, _, id) = fixture(vec![]).await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/{id}/world/edit"),
            Some(json!({ "op": "add_tier", "category": "Clergy", "name": "Bishops" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session"]["world"]["hierarchy"]["Clergy"][0]["name"], "Bishops");
        assert_eq!(json["session"]["world_versions"], 1);
    }

    #[tokio::test]
    async fn test_edit_world_with_unknown_op_returns_422() {
        let (app, _, id) = fixture(vec![]).await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/{id}/world/edit"),
            Some(json!({ "op": "summon_dragon" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_rate_limited_generation_is_reported_on_session() {
        let (app, _, id) = fixture(vec![ScriptStep::Fail(GenerationError::RateLimited(
            "quota".to_owned(),
        ))])
        .await;

        let (status, json) = send(&app, "POST", &format!("/{id}/world/generate"), Some(json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["session"]["last_error"]["kind"], "rate_limited");
        assert!(json["session"]["world"].is_null());
    }

    #[tokio::test]
    async fn test_get_world_of_unknown_session_returns_404() {
        let (app, _, _) = fixture(vec![]).await;

        let (status, _) = send(&app, "GET", &format!("/{}/world", SessionId::new()), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
