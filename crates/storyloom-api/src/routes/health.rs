//! Health check endpoint.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use storyloom_queue::QueueMode;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Sessions currently loaded.
    pub sessions: usize,
    /// Generation queue mode.
    pub queue: QueueMode,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.engine.list_sessions().len(),
        queue: state.queue.snapshot().mode,
    })
}

/// Returns the health check router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storyloom_test_support::ScriptedGenerator;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_support::{body_json, empty_request, test_app_state};

    #[tokio::test]
    async fn test_health_reports_version_and_queue_mode() {
        // Arrange
        let app = router().with_state(test_app_state(Arc::new(ScriptedGenerator::new(vec![]))));

        // Act
        let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();

        // Assert
        let (status, json) = body_json(response).await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["sessions"], 0);
        assert_eq!(json["queue"]["state"], "running");
    }
}
