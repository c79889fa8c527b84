//! Queue engine: keyed locking, priority selection, presentation, and the
//! push / pop / execute / restart operations over a persisted document.

mod engine;
pub mod locks;
pub mod presentation;
pub mod selector;

pub use engine::{EngineSettings, QueueEngine};
pub use locks::KeyedLocks;
pub use presentation::{PresentationDefaults, QueueListing, QueueView};
pub use selector::select;

use serde::Serialize;

use crate::domain::{Comment, Task, TaskId};

/// Result of `push`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReceipt {
    /// The task in its latest state (completed / failed when auto-dispatched).
    pub task: Task,
    /// `insert_comment` of the target queue.
    pub insert_comment: Option<String>,
    pub dispatch: Dispatch,
}

/// What happened to a pushed task right after insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum Dispatch {
    /// Left in its queue.
    Queued,
    /// Auto-dispatched and succeeded with this result.
    Completed(serde_json::Value),
    /// Auto-dispatched and the executor failed.
    Failed(String),
}

/// Where a popped task came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum PopSource {
    /// Already in flight from this queue; nothing was claimed.
    Working(String),
    /// Freshly claimed from this queue.
    Queue(String),
}

/// Outcome of an executable `pop_comment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum CommentOutcome {
    Executed(serde_json::Value),
    Failed(String),
}

/// Result of `pop`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopResult {
    pub working_item: Option<Task>,
    pub source: Option<PopSource>,
    pub comment: Option<Comment>,
    pub comment_outcome: Option<CommentOutcome>,
}

impl PopResult {
    pub fn is_empty(&self) -> bool {
        self.working_item.is_none()
    }

    /// True when the task was claimed by this call.
    pub fn newly_claimed(&self) -> bool {
        matches!(self.source, Some(PopSource::Queue(_)))
    }
}

/// Result of `run_next`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunNext {
    /// Nothing pending, nothing in flight.
    Idle,
    /// A task holds the working slot but was not executed here.
    Claimed(Task),
    Completed(Task),
    Failed { task_id: TaskId, error: String },
}
