//! Command handlers for the session engine.
//!
//! Every command runs in two phases. The synchronous phase validates the
//! command, applies speculative mutations and captures the generator
//! request under the registry lock. The generator call then runs without
//! the lock, and the completion phase re-checks that the request is still
//! the session's current one before applying its result. Starting a new
//! request cancels the previous one and rolls back its speculative turn.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storyloom_core::clock::Clock;
use storyloom_core::error::DomainError;
use storyloom_core::generator::{
    GenerationError, GenerationKind, GenerationRequest, Generator, StructuredContent,
    generate_cancellable,
};
use storyloom_core::ids::{NodeId, SessionId};
use storyloom_core::store::SessionStore;
use storyloom_narrative::{EditOutcome, PendingTurn, Placement, TurnContent};
use storyloom_queue::TaskOutcome;
use storyloom_world_state::{
    EntityAdaptation, WorldDraft, WorldEdit, WorldSnapshot, merge_full, merge_partial,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::application::context::request_for;
use crate::application::persistence::{decode_library, encode_library};
use crate::application::query_handlers::{
    SessionSummary, SessionView, session_summary, session_view,
};
use crate::application::transfer::{export_session, import_session};
use crate::domain::commands::SessionCommand;
use crate::domain::session::{
    GenerationTarget, ReferenceDocument, Session, SessionConfig, SessionFailure,
};

/// What a dispatched command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A synchronous change was applied.
    Applied,
    /// The command was a no-op, e.g. navigation at a boundary.
    Unchanged,
    /// A generation request settled and its result was applied.
    Generated,
    /// The request was cancelled or superseded; speculative changes were
    /// rolled back.
    Cancelled,
    /// The request failed; the failure is recorded on the session.
    Failed(GenerationError),
    /// A fork produced a new session.
    Forked(SessionId),
}

impl DispatchOutcome {
    fn mutated(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

struct InFlight {
    request_id: u64,
    token: CancellationToken,
    pending: Option<PendingTurn>,
    target: GenerationTarget,
}

struct SessionSlot {
    session: Session,
    in_flight: Option<InFlight>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            session,
            in_flight: None,
        }
    }

    fn pending_node(&self) -> Option<NodeId> {
        self.in_flight
            .as_ref()
            .and_then(|in_flight| in_flight.pending.as_ref())
            .map(|pending| pending.node_id)
    }

    /// Cancels the in-flight request and compensates its speculative turn.
    fn supersede(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.token.cancel();
        if let Some(pending) = &in_flight.pending {
            self.session.tree.rollback(pending);
        }
        info!(session_id = %self.session.id, request_id = in_flight.request_id, "cancelled in-flight generation");
        true
    }
}

struct Ticket {
    request_id: u64,
    request: GenerationRequest,
    token: CancellationToken,
}

enum Begun {
    Done(DispatchOutcome),
    Generate(Ticket),
}

/// Owns all live sessions and dispatches commands against them.
pub struct SessionEngine {
    sessions: Mutex<BTreeMap<SessionId, SessionSlot>>,
    generator: Arc<dyn Generator>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SessionStore>,
    save_lock: tokio::sync::Mutex<()>,
    next_request: AtomicU64,
}

impl SessionEngine {
    /// Creates an engine with no sessions loaded.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            generator,
            clock,
            store,
            save_lock: tokio::sync::Mutex::new(()),
            next_request: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SessionId, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the persisted library, replacing any sessions in memory.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or `DomainError::Import` if the stored
    /// blob is not a session library.
    pub async fn load(&self) -> Result<usize, DomainError> {
        let sessions = match self.store.load().await? {
            Some(blob) => decode_library(blob, self.clock.as_ref())?,
            None => Vec::new(),
        };
        let count = sessions.len();
        let mut slots = self.lock();
        slots.clear();
        slots.extend(
            sessions
                .into_iter()
                .map(|session| (session.id, SessionSlot::new(session))),
        );
        info!(sessions = count, "session library loaded");
        Ok(count)
    }

    /// Writes the whole library to the store. Saves are serialised so an
    /// older snapshot never overwrites a newer one.
    async fn persist(&self) -> Result<(), DomainError> {
        let _guard = self.save_lock.lock().await;
        let blob = {
            let slots = self.lock();
            encode_library(slots.values().map(|slot| &slot.session))?
        };
        self.store.save(&blob).await
    }

    /// Creates and persists an empty session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if persisting fails.
    pub async fn create_session(
        &self,
        title: &str,
        config: SessionConfig,
    ) -> Result<SessionId, DomainError> {
        let session = Session::new(title, config, self.clock.as_ref());
        let id = session.id;
        self.lock().insert(id, SessionSlot::new(session));
        info!(session_id = %id, "session created");
        self.persist().await?;
        Ok(id)
    }

    /// Deletes a session, cancelling its in-flight request.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` for unknown ids, or the
    /// store's error.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), DomainError> {
        {
            let mut slot = self
                .lock()
                .remove(&id)
                .ok_or(DomainError::SessionNotFound(id))?;
            slot.supersede();
        }
        info!(session_id = %id, "session deleted");
        self.persist().await
    }

    /// Summaries of all sessions, most recently updated first.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let slots = self.lock();
        let mut summaries: Vec<SessionSummary> = slots
            .values()
            .map(|slot| session_summary(&slot.session, slot.in_flight.is_some()))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// The full view of one session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` for unknown ids.
    pub fn session_view(&self, id: SessionId) -> Result<SessionView, DomainError> {
        let slots = self.lock();
        let slot = slots.get(&id).ok_or(DomainError::SessionNotFound(id))?;
        Ok(session_view(&slot.session, slot.in_flight.is_some()))
    }

    /// Exports one session as YAML.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` for unknown ids.
    pub fn export_session(&self, id: SessionId) -> Result<String, DomainError> {
        let slots = self.lock();
        let slot = slots.get(&id).ok_or(DomainError::SessionNotFound(id))?;
        export_session(&slot.session)
    }

    /// Imports a YAML document as a new session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Import` for invalid documents; nothing is
    /// changed in that case.
    pub async fn import_session(&self, document: &str) -> Result<SessionId, DomainError> {
        let session = import_session(document, self.clock.as_ref())?;
        let id = session.id;
        self.lock().insert(id, SessionSlot::new(session));
        info!(session_id = %id, "session imported");
        self.persist().await?;
        Ok(id)
    }

    /// Dispatches a command and persists the library if anything changed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` for unknown sessions or nodes, invalid
    /// commands, and persistence failures. Generation failures are not
    /// errors; they are reported as [`DispatchOutcome::Failed`].
    #[instrument(skip(self, command), fields(session_id = %id, command_type = command.command_type()))]
    pub async fn dispatch(
        &self,
        id: SessionId,
        command: SessionCommand,
    ) -> Result<DispatchOutcome, DomainError> {
        let outcome = match self.begin(id, command)? {
            Begun::Done(outcome) => outcome,
            Begun::Generate(ticket) => self.complete(id, ticket).await,
        };
        debug!(?outcome, "command dispatched");
        if outcome.mutated() {
            self.persist().await?;
        }
        Ok(outcome)
    }

    fn begin(&self, id: SessionId, command: SessionCommand) -> Result<Begun, DomainError> {
        let clock = self.clock.as_ref();
        let mut slots = self.lock();
        let slot = slots.get_mut(&id).ok_or(DomainError::SessionNotFound(id))?;

        let begun = match command {
            SessionCommand::SendMessage { text } => {
                if text.trim().is_empty() {
                    return Err(DomainError::Validation("message text is empty".to_owned()));
                }
                slot.supersede();
                let pending = slot.session.tree.begin_user_turn(Placement::Leaf, text, clock);
                let target = GenerationTarget::StoryTurn {
                    parent_id: Some(pending.node_id),
                };
                self.start(slot, target, Some(pending))
            }
            SessionCommand::EditNode { node_id, text } => {
                let parent_id = slot
                    .session
                    .tree
                    .node(node_id)
                    .ok_or(DomainError::NodeNotFound(node_id))?
                    .parent_id();
                let editing_pending = slot.pending_node() == Some(node_id);
                slot.supersede();
                if editing_pending {
                    // The rollback removed the edited turn; re-send it in its place.
                    let placement = Placement::from_parent(parent_id);
                    let pending = slot.session.tree.begin_user_turn(placement, text, clock);
                    let target = GenerationTarget::StoryTurn {
                        parent_id: Some(pending.node_id),
                    };
                    self.start(slot, target, Some(pending))
                } else {
                    match slot.session.tree.edit_as_branch(node_id, text, clock)? {
                        EditOutcome::Branched(_) => Begun::Done(DispatchOutcome::Applied),
                        EditOutcome::Resubmitted(pending) => {
                            let target = GenerationTarget::StoryTurn {
                                parent_id: Some(pending.node_id),
                            };
                            self.start(slot, target, Some(pending))
                        }
                    }
                }
            }
            SessionCommand::Regenerate { node_id } => {
                let plan = slot.session.tree.regenerate(node_id)?;
                slot.supersede();
                let target = GenerationTarget::StoryTurn {
                    parent_id: plan.parent_id,
                };
                self.start(slot, target, None)
            }
            SessionCommand::Retry => {
                let failure = slot
                    .session
                    .last_error
                    .clone()
                    .ok_or_else(|| DomainError::Validation("no failed request to retry".to_owned()))?;
                slot.supersede();
                self.start(slot, failure.retry, None)
            }
            SessionCommand::NavigateSibling { node_id, direction } => {
                slot.session
                    .tree
                    .node(node_id)
                    .ok_or(DomainError::NodeNotFound(node_id))?;
                match slot.session.tree.sibling_navigate(node_id, direction) {
                    Some(_) => Begun::Done(DispatchOutcome::Applied),
                    None => Begun::Done(DispatchOutcome::Unchanged),
                }
            }
            SessionCommand::Fork { at_index } => {
                let leaf = match slot.in_flight.as_ref().and_then(|f| f.pending.as_ref()) {
                    Some(pending) => pending.previous_leaf,
                    None => slot.session.tree.leaf_id(),
                };
                let tree = slot.session.tree.fork_from(leaf, at_index).ok_or_else(|| {
                    DomainError::Validation(format!(
                        "cannot fork at turn {at_index}: transcript is shorter"
                    ))
                })?;
                let fork = slot.session.forked(tree, clock);
                let fork_id = fork.id;
                slots.insert(fork_id, SessionSlot::new(fork));
                info!(%fork_id, at_index, "session forked");
                return Ok(Begun::Done(DispatchOutcome::Forked(fork_id)));
            }
            SessionCommand::GenerateWorld { section, modifiers } => {
                slot.supersede();
                self.start(slot, GenerationTarget::World { section, modifiers }, None)
            }
            SessionCommand::EditWorld { edit } => {
                apply_world_edit(&mut slot.session, &edit);
                Begun::Done(DispatchOutcome::Applied)
            }
            SessionCommand::UndoWorld => Begun::Done(changed(slot.session.world.undo())),
            SessionCommand::RedoWorld => Begun::Done(changed(slot.session.world.redo())),
            SessionCommand::Cancel => Begun::Done(if slot.supersede() {
                DispatchOutcome::Cancelled
            } else {
                DispatchOutcome::Unchanged
            }),
            SessionCommand::DismissError => {
                Begun::Done(changed(slot.session.last_error.take().is_some()))
            }
            SessionCommand::UpdateConfig { title, config } => {
                if let Some(title) = title {
                    slot.session.title = title;
                }
                slot.session.config = config;
                Begun::Done(DispatchOutcome::Applied)
            }
        };

        if !matches!(begun, Begun::Done(DispatchOutcome::Unchanged)) {
            slot.session.touch(clock);
        }
        Ok(begun)
    }

    fn start(
        &self,
        slot: &mut SessionSlot,
        target: GenerationTarget,
        pending: Option<PendingTurn>,
    ) -> Begun {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let request = request_for(&slot.session, &target);
        let token = CancellationToken::new();
        slot.session.last_error = None;
        slot.in_flight = Some(InFlight {
            request_id,
            token: token.clone(),
            pending,
            target,
        });
        info!(session_id = %slot.session.id, request_id, kind = %request.kind, "generation started");
        Begun::Generate(Ticket {
            request_id,
            request,
            token,
        })
    }

    async fn complete(&self, id: SessionId, ticket: Ticket) -> DispatchOutcome {
        let result =
            generate_cancellable(self.generator.as_ref(), ticket.request, ticket.token).await;

        let clock = self.clock.as_ref();
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&id) else {
            debug!(session_id = %id, "session deleted while generating; result discarded");
            return DispatchOutcome::Cancelled;
        };
        let is_current = slot
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.request_id == ticket.request_id);
        if !is_current {
            debug!(request_id = ticket.request_id, "superseded result discarded");
            return DispatchOutcome::Cancelled;
        }
        let Some(in_flight) = slot.in_flight.take() else {
            return DispatchOutcome::Cancelled;
        };

        let outcome = match result.and_then(|content| {
            apply_generated(&mut slot.session, &in_flight.target, &content, clock)
        }) {
            Ok(()) => {
                info!(request_id = in_flight.request_id, "generation applied");
                DispatchOutcome::Generated
            }
            Err(GenerationError::Cancelled) => {
                if let Some(pending) = &in_flight.pending {
                    slot.session.tree.rollback(pending);
                }
                DispatchOutcome::Cancelled
            }
            Err(error) => {
                warn!(request_id = in_flight.request_id, %error, "generation failed");
                slot.session.last_error = Some(SessionFailure::new(&error, in_flight.target));
                DispatchOutcome::Failed(error)
            }
        };
        slot.session.touch(clock);
        outcome
    }

    /// Folds a settled queue item into the session named by its payload's
    /// `session_id`. Returns `false` if the outcome does not apply to any
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::SessionNotFound` if the named session is gone,
    /// or the store's error.
    pub async fn apply_task_outcome(&self, outcome: &TaskOutcome) -> Result<bool, DomainError> {
        let Some(session_id) = outcome
            .input
            .payload
            .get("session_id")
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| raw.parse::<SessionId>().ok())
        else {
            return Ok(false);
        };
        let Ok(content) = &outcome.result else {
            return Ok(false);
        };

        let applied = {
            let mut slots = self.lock();
            let slot = slots
                .get_mut(&session_id)
                .ok_or(DomainError::SessionNotFound(session_id))?;
            let applied = match outcome.kind {
                GenerationKind::ReferenceImport => {
                    let summary = content
                        .str_field("summary")
                        .or_else(|| content.str_field("content"))
                        .unwrap_or_default();
                    slot.session.config.reference_material.push(ReferenceDocument {
                        title: outcome.input.title.clone(),
                        content: summary.to_owned(),
                    });
                    true
                }
                GenerationKind::EntityAdaptation => {
                    let entity_id = outcome
                        .input
                        .payload
                        .get("entity_id")
                        .and_then(serde_json::Value::as_str);
                    match (entity_id, content.decode::<EntityAdaptation>()) {
                        (Some(entity_id), Ok(adaptation)) => {
                            let edit = WorldEdit::SetAdaptation {
                                entity_id: entity_id.to_owned(),
                                adaptation,
                            };
                            apply_world_edit(&mut slot.session, &edit);
                            true
                        }
                        (_, Err(error)) => {
                            warn!(task_id = %outcome.id, %error, "unusable entity adaptation");
                            false
                        }
                        (None, Ok(_)) => false,
                    }
                }
                other => {
                    debug!(kind = %other, "queue outcome kind not applied to sessions");
                    false
                }
            };
            if applied {
                slot.session.touch(self.clock.as_ref());
            }
            applied
        };

        if applied {
            info!(%session_id, task_id = %outcome.id, "queue result applied to session");
            self.persist().await?;
        }
        Ok(applied)
    }

    /// Applies queue outcomes until every sender is dropped, so results
    /// settled just before shutdown are still folded in and persisted.
    /// Returns how many outcomes changed a session.
    pub async fn drain_task_outcomes(
        &self,
        mut outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
    ) -> usize {
        let mut applied = 0;
        while let Some(outcome) = outcomes.recv().await {
            match self.apply_task_outcome(&outcome).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(task_id = %outcome.id, error = %e, "could not apply queue result"),
            }
        }
        debug!(applied, "queue outcome channel closed");
        applied
    }
}

fn changed(moved: bool) -> DispatchOutcome {
    if moved {
        DispatchOutcome::Applied
    } else {
        DispatchOutcome::Unchanged
    }
}

/// Edits the current snapshot in place; an empty history starts from an
/// empty snapshot.
fn apply_world_edit(session: &mut Session, edit: &WorldEdit) {
    if !session.world.mutate_current(|snapshot| edit.apply(snapshot)) {
        session.world.push(edit.apply(WorldSnapshot::default()));
    }
}

fn apply_generated(
    session: &mut Session,
    target: &GenerationTarget,
    content: &StructuredContent,
    clock: &dyn Clock,
) -> Result<(), GenerationError> {
    match target {
        GenerationTarget::StoryTurn { parent_id } => {
            let turn: TurnContent = content.decode()?;
            if turn.text.trim().is_empty() {
                return Err(GenerationError::Malformed(
                    "agent turn has no text".to_owned(),
                ));
            }
            session
                .tree
                .append_agent(Placement::from_parent(*parent_id), turn, clock);
        }
        GenerationTarget::World { section, .. } => {
            let draft: WorldDraft = content.decode()?;
            let previous = session.world.current();
            let merged = match section {
                Some(section) => merge_partial(draft, previous, *section),
                None => merge_full(draft, previous),
            };
            session.world.push(merged);
        }
    }
    Ok(())
}
