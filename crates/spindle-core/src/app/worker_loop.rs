//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. QueueEngine::run_next() で working slot を確保
//! 2. runnable なら executor で実行し、結果を記録
//! 3. 何も無ければ poll_interval 待ってから再試行
//!
//! working slot は key ごとに 1 つなので、1 key につき 1 ループで十分です。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::LoopHandle;
use crate::config::EngineConfig;
use crate::queue::{QueueEngine, RunNext};

/// Counters reported when a loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub errors: u64,
}

pub struct WorkerLoop {
    engine: Arc<QueueEngine>,
    key: String,
    priority: Option<String>,
    poll_interval: Duration,
    execute_comments: bool,
}

impl WorkerLoop {
    pub fn new(engine: Arc<QueueEngine>, key: impl Into<String>) -> Self {
        Self {
            engine,
            key: key.into(),
            priority: None,
            poll_interval: Duration::from_millis(500),
            execute_comments: true,
        }
    }

    /// Default key, poll interval and comment handling from `config`.
    pub fn from_config(engine: Arc<QueueEngine>, config: &EngineConfig) -> Self {
        Self::new(engine, config.store.default_key.clone())
            .poll_interval(config.poll_interval())
            .execute_comments(config.worker.execute_comments)
    }

    /// Prefer this queue; other queues are still drained when it is empty.
    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn execute_comments(mut self, execute_comments: bool) -> Self {
        self.execute_comments = execute_comments;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run until nothing more can be executed right now.
    pub async fn drain(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while self.step(&mut stats).await {}
        stats
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(key = %self.key, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.step(&mut stats).await {
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(key = %self.key, completed = stats.completed, failed = stats.failed, "worker stopped");
        stats
    }

    pub fn spawn(self) -> LoopHandle<WorkerStats> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        LoopHandle::new(shutdown_tx, join)
    }

    /// One `run_next`. True when a task was executed and another may be ready.
    async fn step(&self, stats: &mut WorkerStats) -> bool {
        let next = self
            .engine
            .run_next(self.priority.as_deref(), &self.key, self.execute_comments)
            .await;

        match next {
            Ok(RunNext::Completed(task)) => {
                stats.completed += 1;
                debug!(key = %self.key, task_id = %task.id, "worker finished task");
                true
            }
            Ok(RunNext::Failed { task_id, error }) => {
                stats.failed += 1;
                warn!(key = %self.key, %task_id, %error, "worker task failed");
                true
            }
            Ok(RunNext::Claimed(task)) => {
                debug!(key = %self.key, task_id = %task.id, "working slot held; waiting");
                false
            }
            Ok(RunNext::Idle) => false,
            Err(err) => {
                stats.errors += 1;
                error!(key = %self.key, error = %err, "run_next failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, Runnable};
    use crate::impls::{DefaultTaskExecutor, InMemoryStore};
    use serde_json::json;

    const KEY: &str = "worker.json";

    fn engine() -> Arc<QueueEngine> {
        let executor = DefaultTaskExecutor::with_builtins(std::env::temp_dir());
        Arc::new(QueueEngine::new(Arc::new(InMemoryStore::new())).with_executor(Arc::new(executor)))
    }

    async fn queue_runnables(engine: &QueueEngine, specs: Vec<Runnable>) {
        // Park a message in the slot so pushes are not auto-dispatched.
        engine.push(NewTask::message("hold"), "high", KEY).await.unwrap();
        engine.pop(None, KEY, false).await.unwrap();
        for spec in specs {
            engine.push(NewTask::runnable(spec), "medium", KEY).await.unwrap();
        }
        engine.restart(KEY).await.unwrap();
    }

    #[tokio::test]
    async fn drain_stops_at_non_runnable_work() {
        let engine = engine();
        queue_runnables(
            &engine,
            vec![
                Runnable::function("echo", vec![json!("hi")]),
                Runnable::function("missing", vec![]),
            ],
        )
        .await;

        let stats = WorkerLoop::new(Arc::clone(&engine), KEY).drain().await;

        // The parked message is claimed first and blocks the slot.
        assert_eq!(stats, WorkerStats::default());
        let status = engine.queue_status(KEY).await;
        assert_eq!(status.working.unwrap().content, json!("hold"));
        assert_eq!(status.queue_sizes["medium"], 2);
    }

    #[tokio::test]
    async fn drain_executes_runnables_in_order() {
        let engine = engine();
        queue_runnables(
            &engine,
            vec![
                Runnable::function("echo", vec![json!("hi")]),
                Runnable::function("missing", vec![]),
            ],
        )
        .await;
        // Clear the parked message out of the slot.
        let parked = engine.pop(None, KEY, false).await.unwrap().working_item.unwrap();
        let _ = engine.execute_task(parked, KEY).await;

        let stats = WorkerLoop::new(Arc::clone(&engine), KEY).drain().await;

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!(engine.queue_status(KEY).await.is_idle());
    }

    #[tokio::test]
    async fn spawned_loop_picks_up_new_work_and_stops_on_shutdown() {
        let engine = engine();
        let handle = WorkerLoop::new(Arc::clone(&engine), KEY)
            .poll_interval(Duration::from_millis(10))
            .spawn();

        // Slot busy with a message, so this runnable waits in its queue.
        engine.push(NewTask::message("hold"), "high", KEY).await.unwrap();
        engine.pop(None, KEY, false).await.unwrap();
        engine
            .push(NewTask::runnable(Runnable::function("echo", vec![json!(1)])), "low", KEY)
            .await
            .unwrap();
        let parked = engine.queue_status(KEY).await.working.unwrap();
        let _ = engine.execute_task(parked, KEY).await;

        let mut waited = 0;
        while !engine.queue_status(KEY).await.is_idle() && waited < 200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }

        let stats = handle.shutdown_and_join().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert!(engine.queue_status(KEY).await.is_idle());
    }
}
