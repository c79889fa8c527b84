//! Executor ports - runnable タスクとコメントフックの実行
//!
//! Engine から見ると executor は不透明な async 関数です。
//! 成功時は JSON の結果を返し、失敗時は `ExecutionError` を返します。

use async_trait::async_trait;

use crate::domain::{Runnable, Task};
use crate::error::ExecutionError;

/// Runs a claimed task's payload.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError>;
}

/// Runs an executable `pop_comment`. Best-effort: the engine logs and swallows errors.
#[async_trait]
pub trait CommentHook: Send + Sync {
    async fn run(&self, spec: &Runnable) -> Result<serde_json::Value, ExecutionError>;
}
