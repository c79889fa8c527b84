//! QueueEngine - 永続化されたキュー文書に対する操作
//!
//! 書き込み系（push / pop / execute_task のコミット / restart / clear_completed）は
//! key ごとの write lock の中で read-modify-write を完結させます。
//! executor と comment hook はロック解放後に呼び出します。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use super::locks::KeyedLocks;
use super::presentation::{self, PresentationDefaults, QueueView};
use super::selector;
use super::{CommentOutcome, Dispatch, PopResult, PopSource, PushReceipt, RunNext};
use crate::domain::{
    Comment, DEFAULT_PRIORITY_ORDER, NewTask, QueueState, Runnable, Task, TaskId, TaskKind,
};
use crate::error::{ExecutionError, SpindleError, StoreError};
use crate::observability::QueueStatus;
use crate::ports::{
    Clock, CommentHook, IdGenerator, StateStore, SystemClock, TaskExecutor, UlidGenerator,
};

/// Engine-wide knobs that are not part of any document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Used when a document carries no `priority_order`.
    pub priority_order: Vec<String>,
    pub presentation: PresentationDefaults,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            priority_order: DEFAULT_PRIORITY_ORDER.iter().map(|s| s.to_string()).collect(),
            presentation: PresentationDefaults::default(),
        }
    }
}

/// Priority queue engine with a single working slot per document.
pub struct QueueEngine {
    store: Arc<dyn StateStore>,
    executor: Option<Arc<dyn TaskExecutor>>,
    comment_hook: Option<Arc<dyn CommentHook>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    settings: EngineSettings,
    locks: KeyedLocks,
    store_fallbacks: AtomicU64,
}

impl QueueEngine {
    /// Engine over `store` with no executor, no hook and the system clock.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store,
            executor: None,
            comment_hook: None,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            settings: EngineSettings::default(),
            locks: KeyedLocks::new(),
            store_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_comment_hook(mut self, hook: Arc<dyn CommentHook>) -> Self {
        self.comment_hook = Some(hook);
        self
    }

    /// Replace the clock. Generated ids keep using the generator's own clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    /// How many times an unreadable or malformed document was replaced by an empty one.
    pub fn store_fallbacks(&self) -> u64 {
        self.store_fallbacks.load(Ordering::Relaxed)
    }

    /// Insert a task at the tail of `priority`.
    ///
    /// A runnable task is auto-dispatched when the working slot is free and an
    /// executor is configured: it goes straight into the slot in the same
    /// critical section, and is executed once the lock is released.
    pub async fn push(
        &self,
        new: NewTask,
        priority: &str,
        key: &str,
    ) -> Result<PushReceipt, SpindleError> {
        if new.kind == TaskKind::Empty {
            return Err(SpindleError::PlaceholderKind);
        }
        let (task, insert_comment, promoted) = {
            let _guard = self.locks.write(key).await;
            let mut state = self.load(key).await;
            let now = self.clock.now();

            let id = match new.id.clone() {
                Some(id) if state.contains_id(&id) => {
                    return Err(SpindleError::DuplicateTaskId(id));
                }
                Some(id) => id,
                None => self.ids.generate_task_id(),
            };
            let mut task = Task::from_new(new, id, priority, now);
            let insert_comment = state.queue_mut(priority).insert_comment.clone();

            let promote =
                task.is_runnable() && state.working_item.is_none() && self.executor.is_some();
            if promote {
                task.start(now);
                state.working_item = Some(task.clone());
                info!(key, task_id = %task.id, priority, "auto-dispatching runnable task");
            } else {
                state.queue_mut(priority).items.push(task.clone());
                info!(key, task_id = %task.id, priority, "task queued");
            }
            self.save(key, &mut state).await?;
            (task, insert_comment, promote)
        };

        let Some(executor) = self.executor.as_ref().filter(|_| promoted) else {
            return Ok(PushReceipt {
                task,
                insert_comment,
                dispatch: Dispatch::Queued,
            });
        };

        let (task, failure) = self.run_and_record(executor.as_ref(), task, key).await?;
        let dispatch = match failure {
            None => Dispatch::Completed(task.result.clone().unwrap_or_default()),
            Some(err) => Dispatch::Failed(err.to_string()),
        };
        Ok(PushReceipt {
            task,
            insert_comment,
            dispatch,
        })
    }

    /// Claim the next task into the working slot.
    ///
    /// An occupied slot is returned unchanged, with its queue's comment; the
    /// comment hook only runs for a fresh claim. With `execute_comment`, an
    /// executable `pop_comment` of the source queue runs through the comment
    /// hook after the lock is released; its failure never fails the pop.
    pub async fn pop(
        &self,
        priority: Option<&str>,
        key: &str,
        execute_comment: bool,
    ) -> Result<PopResult, SpindleError> {
        let mut result = {
            let _guard = self.locks.write(key).await;
            let mut state = self.load(key).await;

            if let Some(working) = &state.working_item {
                debug!(key, task_id = %working.id, "task already in flight");
                let label = if working.priority.is_empty() {
                    self.first_label(&state)
                } else {
                    working.priority.clone()
                };
                let comment = state.queues.get(&label).and_then(|q| q.pop_comment.clone());
                return Ok(PopResult {
                    working_item: Some(working.clone()),
                    source: Some(PopSource::Working(label)),
                    comment,
                    comment_outcome: None,
                });
            }

            let Some(label) = selector::select(&state, priority, &self.settings.priority_order)
            else {
                debug!(key, "no task available");
                return Ok(PopResult::default());
            };

            let now = self.clock.now();
            let queue = state.queue_mut(&label);
            let Some(mut task) = queue.take_head() else {
                return Ok(PopResult::default());
            };
            let comment = queue.pop_comment.clone();

            task.start(now);
            state.working_item = Some(task.clone());
            self.save(key, &mut state).await?;
            info!(key, task_id = %task.id, priority = %label, "task claimed");

            PopResult {
                working_item: Some(task),
                source: Some(PopSource::Queue(label)),
                comment,
                comment_outcome: None,
            }
        };

        let executable = result
            .comment
            .as_ref()
            .and_then(Comment::as_executable)
            .cloned();
        if execute_comment && let Some(spec) = executable {
            result.comment_outcome = self.run_comment_hook(&spec, key).await;
        }
        Ok(result)
    }

    /// The task `pop` would return, without claiming it.
    pub async fn peek(&self, priority: Option<&str>, key: &str) -> Option<Task> {
        let _guard = self.locks.read(key).await;
        let state = self.load(key).await;

        if let Some(working) = &state.working_item {
            return Some(working.clone());
        }
        let label = selector::select(&state, priority, &self.settings.priority_order)?;
        state.queues.get(&label).and_then(|q| q.head()).cloned()
    }

    /// Run `task` through the executor and record the outcome.
    ///
    /// The working slot is cleared only if it still holds this task.
    /// An executor failure is recorded, then returned as `SpindleError::Execution`.
    pub async fn execute_task(&self, task: Task, key: &str) -> Result<Task, SpindleError> {
        let executor = self
            .executor
            .as_ref()
            .ok_or(SpindleError::ExecutorNotConfigured)?;

        let (finished, failure) = self.run_and_record(executor.as_ref(), task, key).await?;
        match failure {
            None => Ok(finished),
            Some(source) => Err(SpindleError::Execution {
                task_id: finished.id,
                source,
            }),
        }
    }

    /// Put the working task back at the head of its queue.
    pub async fn restart(&self, key: &str) -> Result<Option<Task>, SpindleError> {
        self.restart_matching(key, None).await
    }

    /// `restart`, but only while `task_id` still holds the working slot.
    pub async fn restart_if_working(
        &self,
        key: &str,
        task_id: &TaskId,
    ) -> Result<Option<Task>, SpindleError> {
        self.restart_matching(key, Some(task_id)).await
    }

    async fn restart_matching(
        &self,
        key: &str,
        expected: Option<&TaskId>,
    ) -> Result<Option<Task>, SpindleError> {
        let _guard = self.locks.write(key).await;
        let mut state = self.load(key).await;

        let Some(mut task) = state
            .working_item
            .take_if(|working| expected.is_none_or(|id| &working.id == id))
        else {
            debug!(key, "nothing to restart");
            return Ok(None);
        };
        if task.priority.is_empty() {
            task.priority = self.first_label(&state);
        }
        task.reset();
        state.queue_mut(&task.priority).items.insert(0, task.clone());

        self.save(key, &mut state).await?;
        info!(key, task_id = %task.id, priority = %task.priority, "task restarted");
        Ok(Some(task))
    }

    /// Reset the processed / failed counters. Queues are untouched.
    pub async fn clear_completed(&self, key: &str) -> Result<(), SpindleError> {
        let _guard = self.locks.write(key).await;
        let mut state = self.load(key).await;

        let processed = std::mem::take(&mut state.metadata.total_processed);
        let failed = std::mem::take(&mut state.metadata.total_failed);
        self.save(key, &mut state).await?;
        info!(key, processed, failed, "counters reset");
        Ok(())
    }

    pub async fn queue_status(&self, key: &str) -> QueueStatus {
        let _guard = self.locks.read(key).await;
        QueueStatus::from_state(&self.load(key).await)
    }

    /// Presentation snapshot with placeholders for empty queues.
    pub async fn read(&self, key: &str) -> QueueView {
        let _guard = self.locks.read(key).await;
        let state = self.load(key).await;
        presentation::present(
            &state,
            &self.settings.presentation,
            &self.settings.priority_order,
        )
    }

    /// Pop, then execute the claimed task if it is runnable and an executor is set.
    ///
    /// A task that was already in flight is reported as `Claimed` and not
    /// executed a second time.
    pub async fn run_next(
        &self,
        priority: Option<&str>,
        key: &str,
        execute_comment: bool,
    ) -> Result<RunNext, SpindleError> {
        let popped = self.pop(priority, key, execute_comment).await?;
        let newly_claimed = popped.newly_claimed();
        let Some(task) = popped.working_item else {
            return Ok(RunNext::Idle);
        };

        let executor = match self.executor.as_ref() {
            Some(executor) if newly_claimed && task.is_runnable() => executor,
            _ => return Ok(RunNext::Claimed(task)),
        };

        let (finished, failure) = self.run_and_record(executor.as_ref(), task, key).await?;
        Ok(match failure {
            None => RunNext::Completed(finished),
            Some(err) => RunNext::Failed {
                task_id: finished.id,
                error: err.to_string(),
            },
        })
    }

    async fn run_and_record(
        &self,
        executor: &dyn TaskExecutor,
        mut task: Task,
        key: &str,
    ) -> Result<(Task, Option<ExecutionError>), SpindleError> {
        debug!(key, task_id = %task.id, "executing task");
        let outcome = executor.execute(&task).await;

        let _guard = self.locks.write(key).await;
        let mut state = self.load(key).await;
        let now = self.clock.now();

        if state.working_item.as_ref().is_some_and(|w| w.id == task.id) {
            state.working_item = None;
        } else {
            debug!(key, task_id = %task.id, "working slot no longer holds this task");
        }

        let failure = match outcome {
            Ok(result) => {
                task.complete(now, result);
                state.metadata.total_processed += 1;
                info!(key, task_id = %task.id, "task completed");
                None
            }
            Err(err) => {
                task.fail(now, err.to_string());
                state.metadata.total_failed += 1;
                warn!(key, task_id = %task.id, error = %err, "task failed");
                Some(err)
            }
        };

        self.save(key, &mut state).await?;
        Ok((task, failure))
    }

    async fn run_comment_hook(&self, spec: &Runnable, key: &str) -> Option<CommentOutcome> {
        let Some(hook) = self.comment_hook.as_ref() else {
            debug!(key, "executable pop comment ignored: no hook configured");
            return None;
        };
        match hook.run(spec).await {
            Ok(value) => Some(CommentOutcome::Executed(value)),
            Err(err) => {
                warn!(key, hook = %spec.describe(), error = %err, "pop comment hook failed");
                Some(CommentOutcome::Failed(err.to_string()))
            }
        }
    }

    fn first_label(&self, state: &QueueState) -> String {
        state
            .priority_order
            .as_ref()
            .and_then(|order| order.first())
            .or(self.settings.priority_order.first())
            .cloned()
            .unwrap_or_else(|| DEFAULT_PRIORITY_ORDER[0].to_string())
    }

    async fn load(&self, key: &str) -> QueueState {
        let raw = match self.store.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return QueueState::new(self.clock.now()),
            Err(err) => {
                self.note_fallback(key, &err);
                return QueueState::new(self.clock.now());
            }
        };
        match serde_json::from_value(raw) {
            Ok(state) => state,
            Err(source) => {
                let err = StoreError::Malformed {
                    key: key.to_string(),
                    source,
                };
                self.note_fallback(key, &err);
                QueueState::new(self.clock.now())
            }
        }
    }

    fn note_fallback(&self, key: &str, err: &StoreError) {
        let total = self.store_fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(key, error = %err, fallbacks = total, "queue document unusable; starting from an empty one");
    }

    async fn save(&self, key: &str, state: &mut QueueState) -> Result<(), SpindleError> {
        state.touch(self.clock.now());
        let document = serde_json::to_value(&*state)?;
        self.store.write(key, &document).await?;
        debug!(key, pending = state.total_pending(), "queue document saved");
        Ok(())
    }
}
