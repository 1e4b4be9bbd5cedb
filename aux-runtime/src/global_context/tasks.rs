//! Tasks settled by the runtime or by a remote peer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::GlobalContext;

/// Task identifier.
///
/// Sequential numbers by default; UUIDs when the ID must not be guessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskId {
    Number(u64),
    Uuid(String),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Uuid(id) => f.write_str(id),
        }
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::Uuid(id.to_string())
    }
}

/// Why a task promise did not produce a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    /// The task was rejected
    #[error("Task rejected: {0}")]
    Rejected(Value),
    /// The context was dropped before the task settled
    #[error("Task abandoned before it settled")]
    Abandoned,
}

/// Future that settles when its task is resolved or rejected.
#[derive(Debug)]
pub struct TaskPromise {
    receiver: oneshot::Receiver<Result<Value, Value>>,
}

impl Future for TaskPromise {
    type Output = Result<Value, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|settled| match settled {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(TaskError::Rejected(error)),
            Err(_) => Err(TaskError::Abandoned),
        })
    }
}

/// A newly created task.
#[derive(Debug)]
pub struct AsyncTask {
    pub task_id: TaskId,
    pub promise: TaskPromise,
}

pub(super) struct PendingTask {
    sender: oneshot::Sender<Result<Value, Value>>,
    expected_remote: bool,
}

impl GlobalContext {
    /// Create a pending task.
    ///
    /// Tasks created for a factory, or by any caller when unguessable IDs are
    /// forced by the config, get a UUID. `expected_remote` decides whether
    /// only a remote peer or only the local runtime may settle it.
    pub fn create_task(&mut self, from_factory: bool, expected_remote: bool) -> AsyncTask {
        let task_id = if from_factory || self.config.force_unguessable_task_ids {
            TaskId::Uuid(self.uuid())
        } else {
            self.next_task_id += 1;
            TaskId::Number(self.next_task_id)
        };
        let (sender, receiver) = oneshot::channel();
        self.tasks.insert(
            task_id.clone(),
            PendingTask {
                sender,
                expected_remote,
            },
        );
        AsyncTask {
            task_id,
            promise: TaskPromise { receiver },
        }
    }

    /// Resolve a task. Returns whether the task was settled.
    pub fn resolve_task(&mut self, task_id: &TaskId, result: Value, is_remote: bool) -> bool {
        self.settle_task(task_id, Ok(result), is_remote)
    }

    /// Reject a task. Returns whether the task was settled.
    pub fn reject_task(&mut self, task_id: &TaskId, error: Value, is_remote: bool) -> bool {
        self.settle_task(task_id, Err(error), is_remote)
    }

    /// Number of tasks that have not settled yet.
    pub fn pending_task_count(&self) -> usize {
        self.tasks.len()
    }

    fn settle_task(
        &mut self,
        task_id: &TaskId,
        outcome: Result<Value, Value>,
        is_remote: bool,
    ) -> bool {
        let Some(task) = self.tasks.get(task_id) else {
            return false;
        };
        if task.expected_remote != is_remote {
            debug!(
                task_id = %task_id,
                is_remote,
                expected_remote = task.expected_remote,
                "Ignoring task settlement from the wrong origin"
            );
            return false;
        }
        let Some(task) = self.tasks.remove(task_id) else {
            return false;
        };
        // The promise may already be gone; the task still counts as settled.
        let _ = task.sender.send(outcome);
        true
    }
}
