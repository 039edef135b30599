//! Builds generator requests from session state.
//!
//! Context is captured synchronously when a request starts; later edits to
//! the session do not leak into a request that is already running.

use serde_json::{Value, json};
use storyloom_core::generator::{GenerationKind, GenerationRequest};
use storyloom_core::ids::NodeId;
use storyloom_narrative::Node;
use storyloom_world_state::WorldSection;

use crate::domain::session::{GenerationTarget, Session};

fn transcript_json(path: &[&Node]) -> Value {
    Value::Array(
        path.iter()
            .map(|node| {
                json!({
                    "role": node.role(),
                    "text": node.text(),
                })
            })
            .collect(),
    )
}

fn base_context(session: &Session) -> Value {
    json!({
        "setting": session.config.setting,
        "tone": session.config.tone,
        "reference_material": session.config.reference_material,
        "world": session.world.current(),
    })
}

/// Request for the agent turn that follows `parent_id`.
#[must_use]
pub fn story_request(session: &Session, parent_id: Option<NodeId>) -> GenerationRequest {
    let path = parent_id
        .map(|id| session.tree.history_path(id))
        .unwrap_or_default();
    let mut context = base_context(session);
    context["transcript"] = transcript_json(&path);
    GenerationRequest::new(GenerationKind::StoryTurn, context)
        .with_modifiers(session.config.story_modifiers.clone())
}

/// Request for a full or single-section world generation.
#[must_use]
pub fn world_request(
    session: &Session,
    section: Option<WorldSection>,
    modifiers: Option<String>,
) -> GenerationRequest {
    let kind = section.map_or(GenerationKind::WorldFull, WorldSection::generation_kind);
    let mut context = base_context(session);
    context["transcript"] = transcript_json(&session.tree.transcript());
    context["target_section"] = json!(section);
    GenerationRequest::new(kind, context).with_modifiers(modifiers)
}

/// Request for an arbitrary target.
#[must_use]
pub fn request_for(session: &Session, target: &GenerationTarget) -> GenerationRequest {
    match target {
        GenerationTarget::StoryTurn { parent_id } => story_request(session, *parent_id),
        GenerationTarget::World { section, modifiers } => {
            world_request(session, *section, modifiers.clone())
        }
    }
}
