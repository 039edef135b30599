//! Route modules and the shared command response.

pub mod health;
pub mod queue;
pub mod sessions;
pub mod story;
pub mod world;

use axum::{Json, Router};
use serde::Serialize;
use storyloom_core::ids::SessionId;
use storyloom_session::{DispatchOutcome, SessionCommand, SessionView};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Builds the application router without middleware or state.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest(
            "/api/v1/sessions",
            sessions::router()
                .merge(story::router())
                .merge(world::router()),
        )
        .nest("/api/v1/queue", queue::router())
}

/// Response body returned after a session command is handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// What the command did.
    pub outcome: &'static str,
    /// Generation failure message, when the outcome is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The new session created by a fork.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_session_id: Option<SessionId>,
    /// The session after the command.
    pub session: SessionView,
}

impl CommandResponse {
    fn new(outcome: DispatchOutcome, session: SessionView) -> Self {
        let (name, error, forked_session_id) = match outcome {
            DispatchOutcome::Applied => ("applied", None, None),
            DispatchOutcome::Unchanged => ("unchanged", None, None),
            DispatchOutcome::Generated => ("generated", None, None),
            DispatchOutcome::Cancelled => ("cancelled", None, None),
            DispatchOutcome::Failed(error) => ("failed", Some(error.to_string()), None),
            DispatchOutcome::Forked(id) => ("forked", None, Some(id)),
        };
        Self {
            outcome: name,
            error,
            forked_session_id,
            session,
        }
    }
}

/// Dispatches `command` and returns the session's view afterwards.
pub(crate) async fn run_command(
    state: &AppState,
    session_id: SessionId,
    command: SessionCommand,
) -> Result<Json<CommandResponse>, ApiError> {
    let correlation_id = Uuid::new_v4();
    info!(%correlation_id, command_type = command.command_type(), "handling session command");

    let outcome = state.engine.dispatch(session_id, command).await?;
    if matches!(&outcome, DispatchOutcome::Failed(error) if error.is_rate_limited()) {
        // The queue shares the provider; stop it from retrying into the limit.
        warn!(%correlation_id, %session_id, "rate limited; pausing generation queue");
        state.queue.pause_for_rate_limit();
    }
    let session = state.engine.session_view(session_id)?;

    Ok(Json(CommandResponse::new(outcome, session)))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers shared by the route unit tests.

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use chrono::TimeZone;
    use serde_json::Value;
    use storyloom_core::clock::Clock;
    use storyloom_core::generator::Generator;
    use storyloom_core::store::SessionStore;
    use storyloom_queue::TaskQueue;
    use storyloom_session::SessionEngine;
    use storyloom_test_support::{FixedClock, InMemorySessionStore, ScriptedGenerator};

    use crate::state::AppState;

    pub(crate) fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    pub(crate) fn app_state_with(
        generator: Arc<ScriptedGenerator>,
        store: Arc<dyn SessionStore>,
    ) -> AppState {
        let generator: Arc<dyn Generator> = generator;
        let engine = SessionEngine::new(Arc::clone(&generator), clock(), store);
        let (queue, _outcomes) = TaskQueue::new(generator);
        AppState::new(Arc::new(engine), queue)
    }

    pub(crate) fn test_app_state(generator: Arc<ScriptedGenerator>) -> AppState {
        app_state_with(generator, Arc::new(InMemorySessionStore::new()))
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    pub(crate) fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    pub(crate) async fn body_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }
}
