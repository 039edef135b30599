//! Scripted `Generator` for exercising orchestration without a provider.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use storyloom_core::generator::{
    GenerationError, GenerationRequest, Generator, StructuredContent,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// One scripted response, consumed in order.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Succeed immediately with this content.
    Reply(serde_json::Value),
    /// Fail immediately.
    Fail(GenerationError),
    /// Never settle until the request's token is cancelled.
    Hang,
    /// Succeed after a delay, unless cancelled first.
    Delay(Duration, serde_json::Value),
}

/// A generator that plays back a script and records every call.
///
/// Once the script is exhausted every call fails with
/// `GenerationError::Failed`.
#[derive(Debug)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<ScriptStep>>,
    requests: Mutex<Vec<GenerationRequest>>,
    tokens: Mutex<Vec<CancellationToken>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: watch::Sender<usize>,
}

impl ScriptedGenerator {
    /// Creates a generator that answers with `steps` in order.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: watch::Sender::new(0),
        }
    }

    /// Convenience for a script of successful replies.
    #[must_use]
    pub fn replying(replies: impl IntoIterator<Item = serde_json::Value>) -> Self {
        Self::new(replies.into_iter().map(ScriptStep::Reply).collect())
    }

    /// Appends more steps to the script.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn push(&self, step: ScriptStep) {
        self.script.lock().unwrap().push_back(step);
    }

    /// Every request received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The cancellation token handed to each call, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        *self.calls.borrow()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut calls = self.calls.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = calls.wait_for(|count| *count >= n).await;
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<StructuredContent, GenerationError> {
        let step = self.script.lock().unwrap().pop_front();
        self.requests.lock().unwrap().push(request);
        self.tokens.lock().unwrap().push(cancel.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);
        self.calls.send_modify(|count| *count += 1);

        match step {
            Some(ScriptStep::Reply(value)) => Ok(StructuredContent(value)),
            Some(ScriptStep::Fail(error)) => Err(error),
            Some(ScriptStep::Hang) => {
                cancel.cancelled().await;
                Err(GenerationError::Cancelled)
            }
            Some(ScriptStep::Delay(delay, value)) => {
                tokio::select! {
                    () = cancel.cancelled() => Err(GenerationError::Cancelled),
                    () = tokio::time::sleep(delay) => Ok(StructuredContent(value)),
                }
            }
            None => Err(GenerationError::Failed("generator script exhausted".into())),
        }
    }
}
