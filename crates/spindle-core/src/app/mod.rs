//! App - アプリケーション層
//!
//! QueueEngine と ports を組み合わせて、常駐ループと構築処理を提供します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: QueueEngine の構築とワイヤリング
//! - **WorkerLoop**: run_next を回して runnable タスクを実行するループ
//! - **ReaperLoop**: 止まった working タスクを restart する外部監視

pub mod builder;
pub mod reaper_loop;
pub mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::reaper_loop::ReaperLoop;
pub use self::worker_loop::{WorkerLoop, WorkerStats};

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle for a spawned loop.
/// - `request_shutdown()` でループに停止を伝える（実行中の処理は中断しない）
/// - `shutdown_and_join()` で停止を待ち、ループの戻り値を受け取る
pub struct LoopHandle<T> {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<T>,
}

impl<T: Send + 'static> LoopHandle<T> {
    pub(crate) fn new(shutdown_tx: watch::Sender<bool>, join: JoinHandle<T>) -> Self {
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// `None` if the loop panicked or was aborted.
    pub async fn shutdown_and_join(self) -> Option<T> {
        self.request_shutdown();
        self.join.await.ok()
    }
}
