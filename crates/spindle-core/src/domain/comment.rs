//! Queue comments: operator guidance text or an executable hook.

use serde::{Deserialize, Serialize};

use super::task::Runnable;

/// A queue annotation.
///
/// In JSON a comment is either a plain string or a runnable object:
/// `"pop_comment": "Handle the next story"` or
/// `"pop_comment": {"type":"command","command":"notify-send","args":["popped"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Comment {
    PlainText(String),
    Executable(Runnable),
}

impl Comment {
    pub fn text(value: impl Into<String>) -> Self {
        Comment::PlainText(value.into())
    }

    pub fn as_executable(&self) -> Option<&Runnable> {
        match self {
            Comment::Executable(spec) => Some(spec),
            Comment::PlainText(_) => None,
        }
    }
}
