//! Async single-flight processor around [`QueueState`].
//!
//! The state lives behind a mutex that is never held across the generator
//! call. Each in-flight request gets its own cancellation token so a
//! removed item can be cancelled without touching the rest of the queue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use storyloom_core::error::DomainError;
use storyloom_core::generator::{
    GenerationError, GenerationKind, GenerationRequest, Generator, StructuredContent,
    generate_cancellable,
};
use storyloom_core::ids::TaskId;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::item::{TaskInput, TaskItem};
use crate::domain::state::{QueueSnapshot, QueueState};

/// A settled item, forwarded to whoever consumes queue results.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// The item.
    pub id: TaskId,
    /// What was generated.
    pub kind: GenerationKind,
    /// The item's category.
    pub category: String,
    /// The item's input descriptor.
    pub input: TaskInput,
    /// Content on success, the provider error otherwise.
    pub result: Result<StructuredContent, GenerationError>,
}

/// Result of a single [`TaskQueue::process_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Paused, or nothing queued.
    Idle,
    /// Another item is already generating.
    Busy,
    /// The item completed.
    Completed(TaskId),
    /// The item failed.
    Failed(TaskId),
    /// The request was cancelled; its result, if any, was discarded.
    Cancelled(TaskId),
}

struct Inner {
    state: QueueState,
    in_flight: Option<(TaskId, CancellationToken)>,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Notify,
    generator: Arc<dyn Generator>,
    outcomes: mpsc::UnboundedSender<TaskOutcome>,
}

/// Cloneable handle to the generation queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Creates a running, empty queue. Settled items are reported on the
    /// returned receiver.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>) -> (Self, mpsc::UnboundedReceiver<TaskOutcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            inner: Mutex::new(Inner {
                state: QueueState::new(),
                in_flight: None,
            }),
            wake: Notify::new(),
            generator,
            outcomes,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        self.shared.wake.notify_one();
    }

    /// Adds an item to the end of the queue.
    pub fn enqueue(&self, kind: GenerationKind, category: &str, input: TaskInput) -> TaskId {
        let id = self.lock().state.enqueue(kind, category, input);
        self.wake();
        id
    }

    /// Requeues a failed item.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TaskNotFound` or `DomainError::Validation` if the
    /// item does not exist or has not failed.
    pub fn retry(&self, id: TaskId) -> Result<(), DomainError> {
        self.lock().state.retry(id)?;
        self.wake();
        Ok(())
    }

    /// Deletes an item. A generating item has its request cancelled before
    /// it is removed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::TaskNotFound` for unknown ids.
    pub fn remove(&self, id: TaskId) -> Result<TaskItem, DomainError> {
        let removed = {
            let mut inner = self.lock();
            if let Some((_, token)) = inner.in_flight.take_if(|(flight, _)| *flight == id) {
                info!(task_id = %id, "cancelling in-flight task before removal");
                token.cancel();
            }
            inner.state.remove(id)
        };
        self.wake();
        removed.ok_or(DomainError::TaskNotFound(id))
    }

    /// Moves a queued item to another queued item's position.
    pub fn reorder(&self, dragged: TaskId, target: TaskId) -> bool {
        self.lock().state.reorder(dragged, target)
    }

    /// Stops picking up new items. The in-flight item, if any, finishes.
    pub fn pause(&self) {
        self.lock().state.pause();
    }

    /// Pauses the queue because the provider it shares with interactive
    /// requests reported a rate limit.
    pub fn pause_for_rate_limit(&self) {
        self.lock().state.pause_for_rate_limit();
    }

    /// Restarts processing.
    pub fn resume(&self) {
        self.lock().state.resume();
        self.wake();
    }

    /// Drops completed items.
    pub fn clear_finished(&self) -> usize {
        self.lock().state.clear_finished()
    }

    /// Current items and mode.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        self.lock().state.snapshot()
    }

    /// Processes at most one item.
    pub async fn process_step(&self) -> StepOutcome {
        self.step(&CancellationToken::new()).await
    }

    #[instrument(skip_all)]
    async fn step(&self, parent: &CancellationToken) -> StepOutcome {
        let (id, category, input, request, token) = {
            let mut inner = self.lock();
            if inner.state.generating().is_some() {
                return StepOutcome::Busy;
            }
            let carried = inner.state.carried_context().cloned();
            let Some(item) = inner.state.start_next() else {
                return StepOutcome::Idle;
            };
            let (id, category, input) = (item.id, item.category.clone(), item.input.clone());
            let request = GenerationRequest::new(
                item.kind,
                json!({
                    "category": item.category,
                    "input": item.input,
                    "carried_context": carried,
                }),
            );
            let token = parent.child_token();
            inner.in_flight = Some((id, token.clone()));
            (id, category, input, request, token)
        };

        info!(task_id = %id, kind = %request.kind, "generating task");
        let kind = request.kind;
        let result = generate_cancellable(self.shared.generator.as_ref(), request, token).await;

        let outcome = {
            let mut inner = self.lock();
            if inner.in_flight.as_ref().is_some_and(|(flight, _)| *flight == id) {
                inner.in_flight = None;
            }
            match &result {
                Ok(content) if inner.state.complete(id, content.clone()) => {
                    StepOutcome::Completed(id)
                }
                Err(error) if !error.is_cancelled() && inner.state.fail(id, error) => {
                    StepOutcome::Failed(id)
                }
                _ => {
                    if inner.state.requeue(id) {
                        debug!(task_id = %id, "cancelled task returned to the queue");
                    } else {
                        debug!(task_id = %id, "discarding result for a removed task");
                    }
                    StepOutcome::Cancelled(id)
                }
            }
        };

        if matches!(outcome, StepOutcome::Completed(_) | StepOutcome::Failed(_)) {
            let report = TaskOutcome {
                id,
                kind,
                category,
                input,
                result,
            };
            if self.shared.outcomes.send(report).is_err() {
                debug!(task_id = %id, "no outcome receiver; result dropped");
            }
        }
        self.wake();
        outcome
    }

    /// Processes items until `shutdown` fires, sleeping while idle or
    /// paused. An in-flight request is cancelled on shutdown and its item
    /// returned to the queue.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("task queue processor started");
        while !shutdown.is_cancelled() {
            match self.step(&shutdown).await {
                StepOutcome::Idle | StepOutcome::Busy => {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = self.shared.wake.notified() => {}
                    }
                }
                StepOutcome::Completed(_) | StepOutcome::Failed(_) | StepOutcome::Cancelled(_) => {}
            }
        }
        info!("task queue processor stopped");
    }
}
