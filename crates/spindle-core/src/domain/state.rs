//! Task status and kind.

use serde::{Deserialize, Serialize};

/// Task status.
///
/// State transitions:
/// - Pending -> Working -> Completed
/// - Pending -> Working -> Failed
/// - Pending -> Working -> Pending (restart, re-queued at the head)
///
/// Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in a priority queue.
    #[default]
    Pending,

    /// Claimed by `pop` and occupying the working slot.
    Working,

    /// Executor returned successfully.
    Completed,

    /// Executor returned an error.
    Failed,
}

/// What a task carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Carries an executable specification.
    Runnable,

    /// Human-readable message.
    Message,

    /// Arbitrary payload.
    #[default]
    Data,

    /// Placeholder synthesized for an empty queue. Never persisted.
    Empty,
}

impl TaskKind {
    pub fn is_runnable(self) -> bool {
        matches!(self, TaskKind::Runnable)
    }
}
