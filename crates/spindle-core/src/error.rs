use std::path::PathBuf;

use thiserror::Error;

use crate::domain::TaskId;

#[derive(Debug, Error)]
pub enum SpindleError {
    #[error("no task executor configured; dispatch requires one")]
    ExecutorNotConfigured,

    #[error("task {task_id} failed: {source}")]
    Execution {
        task_id: TaskId,
        #[source]
        source: ExecutionError,
    },

    #[error("task id already in use: {0}")]
    DuplicateTaskId(TaskId),

    #[error("`empty` is reserved for queue placeholders and cannot be pushed")]
    PlaceholderKind,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not encode queue document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// State store I/O failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write `{path}`: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed document `{key}`: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },

    #[error("invalid store key `{0}`")]
    InvalidKey(String),
}

/// Task executor failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("task is not runnable or missing runnable configuration")]
    NotRunnable,

    #[error("script not found: {0}")]
    ScriptNotFound(String),

    #[error("function not registered: {0}")]
    FunctionNotRegistered(String),

    #[error("could not start `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("command exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("{0}")]
    Failed(String),
}
