//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **JsonFileStore**: JSON ファイルの StateStore（本番用）
//! - **InMemoryStore**: 開発用・テスト用の StateStore
//! - **DefaultTaskExecutor**: command / script / function の実行
//! - **RunnableHook**: 実行可能な pop_comment を DefaultTaskExecutor で実行

pub mod default_executor;
pub mod file_store;
pub mod memory_store;

pub use self::default_executor::{
    DefaultTaskExecutor, FunctionRegistry, RegistryError, RunnableHook, TaskFunction,
};
pub use self::file_store::JsonFileStore;
pub use self::memory_store::InMemoryStore;
