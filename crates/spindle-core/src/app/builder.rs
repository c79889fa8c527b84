//! EngineBuilder - QueueEngine の構築とワイヤリング
//!
//! # 方針
//! - 起動時検証（Fail-fast 設計）: store が無ければ build() が失敗する
//! - executor / comment hook / clock / id generator は任意

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ConfigError, EngineConfig};
use crate::impls::{DefaultTaskExecutor, JsonFileStore, RunnableHook};
use crate::ports::{Clock, CommentHook, IdGenerator, StateStore, SystemClock, TaskExecutor, UlidGenerator};
use crate::queue::QueueEngine;

/// EngineBuilder は QueueEngine を構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .config(config)
///     .file_store(".spindle")
///     .default_executor()
///     .build()?;
/// ```
pub struct EngineBuilder {
    store: Option<Arc<dyn StateStore>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    comment_hook: Option<Arc<dyn CommentHook>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: EngineConfig,
}

/// BuildError は構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no state store configured; call `store()` or `file_store()` before `build()`")]
    MissingStore,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            executor: None,
            comment_hook: None,
            clock: None,
            ids: None,
            config: EngineConfig::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// JSON files under `root`.
    pub fn file_store(self, root: impl Into<PathBuf>) -> Self {
        self.store(Arc::new(JsonFileStore::new(root)))
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn comment_hook(mut self, hook: Arc<dyn CommentHook>) -> Self {
        self.comment_hook = Some(hook);
        self
    }

    /// `DefaultTaskExecutor` with builtins, rooted at `[executor] working_dir`,
    /// used both as the task executor and as the comment hook.
    pub fn default_executor(self) -> Self {
        let executor = DefaultTaskExecutor::with_builtins(self.config.executor.working_dir.clone());
        self.comment_hook(Arc::new(RunnableHook::new(executor.clone())))
            .executor(Arc::new(executor))
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 検証してから QueueEngine を生成
    ///
    /// - config が不正なら BuildError::Config
    /// - store が無ければ BuildError::MissingStore
    pub fn build(self) -> Result<QueueEngine, BuildError> {
        self.config.validate()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let mut engine = QueueEngine::new(store)
            .with_clock(clock)
            .with_id_generator(ids)
            .with_settings(self.config.engine_settings());
        if let Some(executor) = self.executor {
            engine = engine.with_executor(executor);
        }
        if let Some(hook) = self.comment_hook {
            engine = engine.with_comment_hook(hook);
        }
        Ok(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
