//! Routes for the story branch of a session.
//!
//! Generating commands hold the request open until the generator settles.
//! A concurrent POST to `cancel` (or any new generating command) makes the
//! pending request return with outcome `cancelled`.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use serde::Deserialize;
use storyloom_core::ids::{NodeId, SessionId};
use storyloom_narrative::Direction;
use storyloom_session::SessionCommand;
use tracing::instrument;

use super::{CommandResponse, run_command};
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /send.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// The user's text.
    pub text: String,
}

/// Request body for POST /edit.
#[derive(Debug, Deserialize)]
pub struct EditNodeRequest {
    /// The turn to edit.
    pub node_id: NodeId,
    /// Replacement text.
    pub text: String,
}

/// Request body for POST /regenerate.
#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    /// The agent turn to regenerate.
    pub node_id: NodeId,
}

/// Request body for POST /navigate.
#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    /// The turn whose siblings are navigated.
    pub node_id: NodeId,
    /// `prev` or `next`.
    pub direction: Direction,
}

/// Request body for POST /fork.
#[derive(Debug, Deserialize)]
pub struct ForkRequest {
    /// Zero-based transcript index of the last copied turn.
    pub at_index: usize,
}

/// POST /{session_id}/story/send
#[instrument(skip_all, fields(session_id = %session_id))]
async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::SendMessage { text: request.text };
    run_command(&state, session_id, command).await
}

/// POST /{session_id}/story/edit
#[instrument(skip_all, fields(session_id = %session_id, node_id = %request.node_id))]
async fn edit_node(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<EditNodeRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::EditNode {
        node_id: request.node_id,
        text: request.text,
    };
    run_command(&state, session_id, command).await
}

/// POST /{session_id}/story/regenerate
#[instrument(skip_all, fields(session_id = %session_id, node_id = %request.node_id))]
async fn regenerate(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::Regenerate {
        node_id: request.node_id,
    };
    run_command(&state, session_id, command).await
}

/// POST /{session_id}/story/retry
#[instrument(skip_all, fields(session_id = %session_id))]
async fn retry(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, session_id, SessionCommand::Retry).await
}

/// POST /{session_id}/story/navigate
#[instrument(skip_all, fields(session_id = %session_id, node_id = %request.node_id))]
async fn navigate(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::NavigateSibling {
        node_id: request.node_id,
        direction: request.direction,
    };
    run_command(&state, session_id, command).await
}

/// POST /{session_id}/story/fork
#[instrument(skip_all, fields(session_id = %session_id, at_index = request.at_index))]
async fn fork(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<ForkRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = SessionCommand::Fork {
        at_index: request.at_index,
    };
    run_command(&state, session_id, command).await
}

/// POST /{session_id}/story/cancel
#[instrument(skip_all, fields(session_id = %session_id))]
async fn cancel(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, session_id, SessionCommand::Cancel).await
}

/// POST /{session_id}/story/dismiss-error
#[instrument(skip_all, fields(session_id = %session_id))]
async fn dismiss_error(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, session_id, SessionCommand::DismissError).await
}

/// Returns the router for story commands.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{session_id}/story/send", post(send_message))
        .route("/{session_id}/story/edit", post(edit_node))
        .route("/{session_id}/story/regenerate", post(regenerate))
        .route("/{session_id}/story/retry", post(retry))
        .route("/{session_id}/story/navigate", post(navigate))
        .route("/{session_id}/story/fork", post(fork))
        .route("/{session_id}/story/cancel", post(cancel))
        .route("/{session_id}/story/dismiss-error", post(dismiss_error))
}
