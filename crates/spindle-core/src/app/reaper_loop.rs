//! ReaperLoop - 止まった working タスクの回収
//!
//! # フロー
//! 1. QueueEngine::queue_status() で working タスクを確認
//! 2. startedAt から stall_timeout 以上経過していれば restart
//! 3. restart は id が一致する場合のみ（その間に別タスクが claim されていたら何もしない）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::LoopHandle;
use crate::config::EngineConfig;
use crate::domain::Task;
use crate::error::SpindleError;
use crate::ports::{Clock, SystemClock};
use crate::queue::QueueEngine;

pub struct ReaperLoop {
    engine: Arc<QueueEngine>,
    key: String,
    clock: Arc<dyn Clock>,
    stall_timeout: Duration,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(engine: Arc<QueueEngine>, key: impl Into<String>, stall_timeout: Duration) -> Self {
        Self {
            engine,
            key: key.into(),
            clock: Arc::new(SystemClock),
            stall_timeout,
            interval: Duration::from_secs(30),
        }
    }

    pub fn from_config(engine: Arc<QueueEngine>, config: &EngineConfig) -> Self {
        Self::new(engine, config.store.default_key.clone(), config.stall_timeout())
    }

    /// Clock used to age the working task; should match the engine's.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Restart the working task if it has been in flight for too long.
    pub async fn reap_once(&self) -> Result<Option<Task>, SpindleError> {
        let Some(working) = self.engine.queue_status(&self.key).await.working else {
            return Ok(None);
        };
        // Without a start time there is nothing to age.
        let Some(started_at) = working.started_at else {
            return Ok(None);
        };

        let age = self.clock.now().signed_duration_since(started_at);
        let stalled = age
            .to_std()
            .is_ok_and(|age| age >= self.stall_timeout);
        if !stalled {
            return Ok(None);
        }

        warn!(key = %self.key, task_id = %working.id, age_secs = age.num_seconds(), "working task stalled");
        let restarted = self
            .engine
            .restart_if_working(&self.key, &working.id)
            .await?;
        if let Some(task) = &restarted {
            info!(key = %self.key, task_id = %task.id, "stalled task requeued");
        }
        Ok(restarted)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut reaped = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.reap_once().await {
                Ok(Some(_)) => reaped += 1,
                Ok(None) => {}
                Err(err) => error!(key = %self.key, error = %err, "reaper pass failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        reaped
    }

    pub fn spawn(self) -> LoopHandle<u64> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        LoopHandle::new(shutdown_tx, join)
    }
}
