//! Generator collaborator contract.
//!
//! The generative content provider is opaque: given a request and a
//! cancellation token it eventually returns structured content or fails.
//! Fields missing from the returned content mean "unspecified", never
//! "intentionally emptied".

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// What a generation request is asking the provider to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// The next agent turn of the story.
    StoryTurn,
    /// A complete world model.
    WorldFull,
    /// Only the world timeline.
    WorldTimeline,
    /// Only the world hierarchy.
    WorldHierarchy,
    /// Only the entity adaptations.
    WorldAdaptations,
    /// A single entity adaptation.
    EntityAdaptation,
    /// Analysis of imported reference material.
    ReferenceImport,
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StoryTurn => "story_turn",
            Self::WorldFull => "world_full",
            Self::WorldTimeline => "world_timeline",
            Self::WorldHierarchy => "world_hierarchy",
            Self::WorldAdaptations => "world_adaptations",
            Self::EntityAdaptation => "entity_adaptation",
            Self::ReferenceImport => "reference_import",
        };
        f.write_str(name)
    }
}

/// A request to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// What to generate.
    pub kind: GenerationKind,
    /// Immutable context: transcript, world snapshot, session settings.
    pub context: serde_json::Value,
    /// Free-form user instructions layered on top of the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<String>,
}

impl GenerationRequest {
    /// Creates a request without modifiers.
    #[must_use]
    pub fn new(kind: GenerationKind, context: serde_json::Value) -> Self {
        Self {
            kind,
            context,
            modifiers: None,
        }
    }

    /// Attaches user modifiers, ignoring blank input.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Option<String>) -> Self {
        self.modifiers = modifiers.filter(|m| !m.trim().is_empty());
        self
    }
}

/// Structured content returned by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredContent(pub serde_json::Value);

impl StructuredContent {
    /// Decodes the content into a typed shape.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Malformed` if the content does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, GenerationError> {
        serde_json::from_value(self.0.clone())
            .map_err(|e| GenerationError::Malformed(e.to_string()))
    }

    /// Returns a top-level string field, if present and non-empty.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Failures reported by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The request was cancelled before it settled.
    #[error("generation cancelled")]
    Cancelled,

    /// The provider refused the request because of a rate limit.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// The provider returned content that could not be interpreted.
    #[error("malformed generator output: {0}")]
    Malformed(String),

    /// Network or provider failure.
    #[error("generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    /// Returns `true` for provider-side rate limits.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Returns `true` for cancellations.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// The generative content provider.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates content for `request`. Implementations should observe
    /// `cancel` and return `GenerationError::Cancelled` promptly.
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<StructuredContent, GenerationError>;
}

/// Runs `generator` against `cancel`, returning `Cancelled` as soon as the
/// token fires even if the provider keeps working. A result that races a
/// cancellation is discarded.
///
/// # Errors
///
/// Returns the provider's error, or `GenerationError::Cancelled`.
pub async fn generate_cancellable(
    generator: &dyn Generator,
    request: GenerationRequest,
    cancel: CancellationToken,
) -> Result<StructuredContent, GenerationError> {
    if cancel.is_cancelled() {
        return Err(GenerationError::Cancelled);
    }
    let kind = request.kind;
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GenerationError::Cancelled),
        result = generator.generate(request, cancel.clone()) => result,
    };
    match result {
        Ok(_) if cancel.is_cancelled() => {
            tracing::debug!(%kind, "discarding generation result that arrived after cancellation");
            Err(GenerationError::Cancelled)
        }
        other => other,
    }
}
