//! Routes for the background generation queue.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use storyloom_core::generator::GenerationKind;
use storyloom_core::ids::TaskId;
use storyloom_queue::{QueueSnapshot, TaskInput, TaskItem};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    /// What to generate.
    pub kind: GenerationKind,
    /// Caller-defined grouping.
    pub category: String,
    /// Human-readable label.
    pub title: String,
    /// Forwarded to the generator; `session_id` routes the result to a
    /// session.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Request body for POST /reorder.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    /// The item being moved.
    pub dragged: TaskId,
    /// The item whose position it takes.
    pub target: TaskId,
}

/// Response body for POST /.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    /// The new item's id.
    pub task_id: TaskId,
    /// The queue afterwards.
    pub queue: QueueSnapshot,
}

/// Response body for POST /reorder.
#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    /// Whether the items moved.
    pub reordered: bool,
    /// The queue afterwards.
    pub queue: QueueSnapshot,
}

/// Response body for POST /clear.
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    /// Number of items dropped.
    pub removed: usize,
    /// The queue afterwards.
    pub queue: QueueSnapshot,
}

/// POST /
#[instrument(skip_all, fields(kind = %request.kind, category = %request.category))]
async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    info!(correlation_id = %Uuid::new_v4(), "handling enqueue command");

    let input = TaskInput {
        title: request.title,
        payload: request.payload,
    };
    let task_id = state.queue.enqueue(request.kind, &request.category, input);

    Ok((
        StatusCode::CREATED,
        Json(EnqueueResponse {
            task_id,
            queue: state.queue.snapshot(),
        }),
    ))
}

/// GET /
async fn list(State(state): State<AppState>) -> Json<QueueSnapshot> {
    Json(state.queue.snapshot())
}

/// POST /{task_id}/retry
#[instrument(skip_all, fields(task_id = %task_id))]
async fn retry(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<QueueSnapshot>, ApiError> {
    state.queue.retry(task_id)?;
    Ok(Json(state.queue.snapshot()))
}

/// DELETE /{task_id}
#[instrument(skip_all, fields(task_id = %task_id))]
async fn remove(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<TaskItem>, ApiError> {
    Ok(Json(state.queue.remove(task_id)?))
}

/// POST /reorder
#[instrument(skip_all, fields(dragged = %request.dragged, target = %request.target))]
async fn reorder(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Json<ReorderResponse> {
    let reordered = state.queue.reorder(request.dragged, request.target);
    Json(ReorderResponse {
        reordered,
        queue: state.queue.snapshot(),
    })
}

/// POST /pause
async fn pause(State(state): State<AppState>) -> Json<QueueSnapshot> {
    state.queue.pause();
    Json(state.queue.snapshot())
}

/// POST /resume
async fn resume(State(state): State<AppState>) -> Json<QueueSnapshot> {
    state.queue.resume();
    Json(state.queue.snapshot())
}

/// POST /clear
async fn clear(State(state): State<AppState>) -> Json<ClearResponse> {
    let removed = state.queue.clear_finished();
    Json(ClearResponse {
        removed,
        queue: state.queue.snapshot(),
    })
}

/// Returns the router for the generation queue.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(enqueue).get(list))
        .route("/reorder", post(reorder))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/clear", post(clear))
        .route("/{task_id}", delete(remove))
        .route("/{task_id}/retry", post(retry))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};
    use storyloom_core::generator::GenerationError;
    use storyloom_queue::StepOutcome;
    use storyloom_test_support::{ScriptStep, ScriptedGenerator};
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_support::{body_json, empty_request, json_request, test_app_state};

    fn app(steps: Vec<ScriptStep>) -> (Router, AppState) {
        let state = test_app_state(Arc::new(ScriptedGenerator::new(steps)));
        (router().with_state(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => json_request(method, uri, &body),
            None => empty_request(method, uri),
        };
        body_json(app.clone().oneshot(request).await.unwrap()).await
    }

    fn reference(title: &str) -> Value {
        json!({ "kind": "reference_import", "category": "reference", "title": title })
    }

    async fn enqueue_id(app: &Router, title: &str) -> String {
        let (status, json) = call(app, "POST", "/", Some(reference(title))).await;
        assert_eq!(status, StatusCode::CREATED);
        json["task_id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn test_enqueue_returns_201_and_lists_item() {
        // Arrange
        let (app, _) = app(vec![]);

        // Act
        let (status, json) = call(&app, "POST", "/", Some(reference("Atlas"))).await;

        // Assert
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["queue"]["items"][0]["status"], "queued");
        assert_eq!(json["queue"]["items"][0]["input"]["title"], "Atlas");
        let (_, listed) = call(&app, "GET", "/", None).await;
        assert_eq!(listed["items"].as_array().unwrap().len(), 1);
        assert_eq!(listed["mode"]["state"], "running");
    }

    #[tokio::test]
    async fn test_enqueue_with_unknown_kind_returns_422() {
        let (app, _) = app(vec![]);

        let (status, _) = call(
            &app,
            "POST",
            "/",
            Some(json!({ "kind": "poem", "category": "x", "title": "y" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_reorder_moves_dragged_item_to_target_position() {
        let (app, _) = app(vec![]);
        let first = enqueue_id(&app, "one").await;
        enqueue_id(&app, "two").await;
        let third = enqueue_id(&app, "three").await;

        let (status, json) = call(
            &app,
            "POST",
            "/reorder",
            Some(json!({ "dragged": third, "target": first })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reordered"], true);
        let titles: Vec<&str> = json["queue"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["input"]["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["three", "one", "two"]);
    }

    #[tokio::test]
    async fn test_pause_and_resume_report_mode() {
        let (app, _) = app(vec![]);

        let (_, paused) = call(&app, "POST", "/pause", None).await;
        let (_, resumed) = call(&app, "POST", "/resume", None).await;

        assert_eq!(paused["mode"], json!({ "state": "paused", "reason": "user" }));
        assert_eq!(resumed["mode"]["state"], "running");
    }

    #[tokio::test]
    async fn test_failed_item_can_be_retried() {
        // Arrange
        let (app, state) = app(vec![ScriptStep::Fail(GenerationError::Failed(
            "upstream".to_owned(),
        ))]);
        let id = enqueue_id(&app, "Atlas").await;
        assert!(matches!(
            state.queue.process_step().await,
            StepOutcome::Failed(_)
        ));

        // Act
        let (status, json) = call(&app, "POST", &format!("/{id}/retry"), None).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["items"][0]["status"], "queued");
    }

    #[tokio::test]
    async fn test_retry_of_queued_item_returns_400() {
        let (app, _) = app(vec![]);
        let id = enqueue_id(&app, "Atlas").await;

        let (status, json) = call(&app, "POST", &format!("/{id}/retry"), None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_remove_returns_item_then_404() {
        let (app, _) = app(vec![]);
        let id = enqueue_id(&app, "Atlas").await;

        let (status, removed) = call(&app, "DELETE", &format!("/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(removed["id"], id);

        let (status, json) = call(&app, "DELETE", &format!("/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "task_not_found");
    }

    #[tokio::test]
    async fn test_clear_drops_completed_items() {
        let (app, state) = app(vec![ScriptStep::Reply(json!({ "summary": "maps" }))]);
        enqueue_id(&app, "Atlas").await;
        enqueue_id(&app, "Bestiary").await;
        assert!(matches!(
            state.queue.process_step().await,
            StepOutcome::Completed(_)
        ));

        let (_, json) = call(&app, "POST", "/clear", None).await;

        assert_eq!(json["removed"], 1);
        assert_eq!(json["queue"]["items"][0]["input"]["title"], "Bestiary");
    }
}
