//! spindle-core
//!
//! Durable priority task queue with a single in-flight working slot.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（TaskId, Task, Runnable, Comment, QueueState）
//! - **ports**: 抽象化レイヤー（StateStore, TaskExecutor, CommentHook, Clock, IdGenerator）
//! - **impls**: ports の実装（JsonFileStore, InMemoryStore, DefaultTaskExecutor）
//! - **queue**: QueueEngine（push / pop / peek / execute_task / restart / ...）
//! - **app**: EngineBuilder, WorkerLoop, ReaperLoop
//! - **config**: TOML + 環境変数による設定
//! - **observability**: QueueStatus

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{BuildError, EngineBuilder, ReaperLoop, WorkerLoop};
pub use config::{EngineConfig, LoadOptions};
pub use domain::{Comment, NewTask, QueueState, Runnable, Task, TaskId, TaskKind, TaskStatus};
pub use error::{ExecutionError, SpindleError, StoreError};
pub use observability::QueueStatus;
pub use queue::{
    CommentOutcome, Dispatch, PopResult, PopSource, PushReceipt, QueueEngine, QueueView, RunNext,
};
