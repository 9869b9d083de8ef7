//! Scripted fakes for the gateway and human seams (testing only).
//!
//! Provides `ScriptedGateway` and `ScriptedHuman`, which replay queued
//! responses and record what they were asked.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::checkpoint::{CheckpointError, CheckpointResult, CheckpointState, Decision, HumanInterface};
use crate::gateway::{BackendId, InvocationError, ModelGateway, OutputSchema, Prompt, Structured, Task};

// ---------------------------------------------------------------------------
// ScriptedGateway
// ---------------------------------------------------------------------------

type Key = (BackendId, Task);

/// Gateway answering from per-(backend, task) queues.
///
/// Queued responses are consumed in order; once a queue is empty the sticky
/// response for that key is returned, if any, else `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    queued: Mutex<HashMap<Key, VecDeque<Result<Structured, InvocationError>>>>,
    sticky: Mutex<HashMap<Key, Result<Structured, InvocationError>>>,
    delays: Mutex<HashMap<BackendId, Duration>>,
    calls: Mutex<Vec<(BackendId, Prompt)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful response.
    pub fn respond(&self, backend: &str, task: Task, value: Structured) -> &Self {
        self.push(backend, task, Ok(value))
    }

    /// Queue one failure.
    pub fn fail(&self, backend: &str, task: Task, error: InvocationError) -> &Self {
        self.push(backend, task, Err(error))
    }

    /// Answer every otherwise unscripted call for this key with `value`.
    pub fn always(&self, backend: &str, task: Task, value: Structured) -> &Self {
        self.sticky
            .lock()
            .unwrap()
            .insert((BackendId::new(backend), task), Ok(value));
        self
    }

    /// Delay every response from `backend`.
    pub fn delay(&self, backend: &str, delay: Duration) -> &Self {
        self.delays
            .lock()
            .unwrap()
            .insert(BackendId::new(backend), delay);
        self
    }

    fn push(&self, backend: &str, task: Task, response: Result<Structured, InvocationError>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry((BackendId::new(backend), task))
            .or_default()
            .push_back(response);
        self
    }

    /// Every call received, in arrival order.
    pub fn calls(&self) -> Vec<(BackendId, Prompt)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls received for `task`.
    pub fn call_count(&self, task: Task) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.task == task)
            .count()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(
        &self,
        backend: &BackendId,
        prompt: &Prompt,
        _schema: OutputSchema,
    ) -> Result<Structured, InvocationError> {
        self.calls
            .lock()
            .unwrap()
            .push((backend.clone(), prompt.clone()));

        let delay = self.delays.lock().unwrap().get(backend).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = (backend.clone(), prompt.task);
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(response) = queued {
            return response;
        }
        self.sticky
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| {
                Err(InvocationError::unavailable(format!(
                    "no scripted response for {backend} / {:?}",
                    prompt.task
                )))
            })
    }
}

// ---------------------------------------------------------------------------
// ScriptedHuman
// ---------------------------------------------------------------------------

/// Human answering checkpoints from a queue of decisions.
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    decisions: Mutex<VecDeque<Decision>>,
    presented: Mutex<Vec<CheckpointState>>,
}

impl ScriptedHuman {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            presented: Mutex::new(Vec::new()),
        }
    }

    /// Every state presented so far.
    pub fn presented(&self) -> Vec<CheckpointState> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanInterface for ScriptedHuman {
    async fn present(&self, state: &CheckpointState) -> CheckpointResult<Decision> {
        self.presented.lock().unwrap().push(state.clone());
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CheckpointError::Interface("no scripted decision left".to_string()))
    }
}
