//! Routes for the session library: create, list, view, delete, settings
//! and YAML export/import.

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use storyloom_core::ids::SessionId;
use storyloom_session::{SessionCommand, SessionConfig, SessionSummary, SessionView};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{CommandResponse, run_command};
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Display title.
    pub title: String,
    /// Initial settings.
    #[serde(default)]
    pub config: SessionConfig,
}

/// Request body for PUT /{session_id}/config.
#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    /// New title; unchanged when absent.
    #[serde(default)]
    pub title: Option<String>,
    /// Replacement settings.
    pub config: SessionConfig,
}

/// Response body for operations that produce a new session.
#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    /// The new session's id.
    pub session_id: SessionId,
    /// The new session.
    pub session: SessionView,
}

/// POST /
#[instrument(skip_all, fields(title = %request.title))]
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionCreatedResponse>), ApiError> {
    info!(correlation_id = %Uuid::new_v4(), "handling create_session command");

    let session_id = state
        .engine
        .create_session(&request.title, request.config)
        .await?;
    let session = state.engine.session_view(session_id)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionCreatedResponse {
            session_id,
            session,
        }),
    ))
}

/// GET /
async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.engine.list_sessions())
}

/// GET /{session_id}
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.engine.session_view(session_id)?))
}

/// DELETE /{session_id}
#[instrument(skip_all, fields(session_id = %session_id))]
async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    info!(correlation_id = %Uuid::new_v4(), "handling delete_session command");
    state.engine.delete_session(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /{session_id}/config
#[instrument(skip_all, fields(session_id = %session_id))]
async fn update_config(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::UpdateConfig {
        title: request.title,
        config: request.config,
    };
    run_command(&state, session_id, command).await
}

/// GET /{session_id}/export
#[instrument(skip_all, fields(session_id = %session_id))]
async fn export_session(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.engine.export_session(session_id)?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], document))
}

/// POST /import
///
/// The body is the YAML document produced by the export endpoint, or a
/// legacy document with a flat `messages` list.
#[instrument(skip_all, fields(bytes = document.len()))]
async fn import_session(
    State(state): State<AppState>,
    document: String,
) -> Result<(StatusCode, Json<SessionCreatedResponse>), ApiError> {
    info!(correlation_id = %Uuid::new_v4(), "handling import_session command");

    let session_id = state.engine.import_session(&document).await?;
    let session = state.engine.session_view(session_id)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionCreatedResponse {
            session_id,
            session,
        }),
    ))
}

/// Returns the router for the session library.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session).get(list_sessions))
        .route("/import", post(import_session))
        .route("/{session_id}", get(get_session).delete(delete_session))
        .route("/{session_id}/config", put(update_config))
        .route("/{session_id}/export", get(export_session))
}
