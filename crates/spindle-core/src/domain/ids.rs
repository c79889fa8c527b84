//! Task identifiers.
//!
//! # ID の方針
//! 永続ドキュメントは人間も編集するため、ID は不透明な文字列として扱います。
//! 呼び出し側が `"t1"` のような ID を渡すことも、エンジンが生成することもできます。
//!
//! 生成される ID は `task-<ULID>` 形式です。
//! - **時刻でソート可能**: ULID の先頭は timestamp
//! - **分散生成可能**: 複数プロセスが同じキューに push しても調整不要

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Prefix used for generated task identifiers.
pub const TASK_ID_PREFIX: &str = "task-";

/// Identifier of a Task within one queue document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// ULID から `task-<ULID>` 形式の ID を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{TASK_ID_PREFIX}{ulid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the embedded ULID for generated ids, `None` for caller-supplied ones.
    pub fn as_ulid(&self) -> Option<Ulid> {
        self.0
            .strip_prefix(TASK_ID_PREFIX)
            .and_then(|raw| Ulid::from_string(raw).ok())
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
