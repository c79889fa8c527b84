use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use spindle_core::config::LogFormat;
use spindle_core::{
    EngineBuilder, EngineConfig, LoadOptions, NewTask, QueueEngine, ReaperLoop, Runnable,
    WorkerLoop,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over `[logging] level`.
fn init_logging(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let engine = Arc::new(
        EngineBuilder::new()
            .config(config.clone())
            .file_store(config.store.root.clone())
            .default_executor()
            .build()?,
    );
    let key = config.store.default_key.clone();
    info!(root = %config.store.root.display(), %key, "queue engine ready");

    // (A) 遅いタスクを auto-dispatch させて working slot を埋める
    let slow = {
        let engine = Arc::clone(&engine);
        let key = key.clone();
        tokio::spawn(async move {
            engine
                .push(
                    NewTask::runnable(Runnable::function("sleep", vec![json!(200)])),
                    "high",
                    &key,
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // (B) slot が埋まっている間の push はキューに積まれる
    let pushes = [
        ("medium", NewTask::runnable(Runnable::command("echo", &["queued", "work"]))),
        ("high", NewTask::runnable(Runnable::function("echo", vec![json!("hello from spindle")]))),
        ("low", NewTask::message("Review the overnight failures")),
    ];
    for (priority, task) in pushes {
        let receipt = engine.push(task, priority, &key).await?;
        info!(task_id = %receipt.task.id, priority, dispatch = ?receipt.dispatch, "pushed");
    }
    let receipt = slow.await??;
    info!(task_id = %receipt.task.id, dispatch = ?receipt.dispatch, "slow task finished");

    // (C) worker が残りを処理、reaper は止まったタスクを監視
    let worker = WorkerLoop::from_config(Arc::clone(&engine), &config).spawn();
    let reaper = ReaperLoop::from_config(Arc::clone(&engine), &config).spawn();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = wait_until_settled(&engine, &key, config.poll_interval()) => {}
    }

    let stats = worker.shutdown_and_join().await.unwrap_or_default();
    let reaped = reaper.shutdown_and_join().await.unwrap_or_default();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        reaped,
        fallbacks = engine.store_fallbacks(),
        "stopped"
    );

    // (D) 最終状態（空キューにはプレースホルダが付く）
    println!("{}", serde_json::to_string_pretty(&engine.read(&key).await)?);
    Ok(())
}

/// Settled once nothing runnable is waiting: the slot is empty or held by
/// work only a person can finish.
async fn wait_until_settled(engine: &QueueEngine, key: &str, poll: Duration) {
    loop {
        let status = engine.queue_status(key).await;
        let slot_settled = status.working.as_ref().is_none_or(|task| !task.is_runnable());
        let next_runnable = engine
            .peek(None, key)
            .await
            .is_some_and(|task| task.is_runnable());
        if slot_settled && !next_runnable {
            return;
        }
        tokio::time::sleep(poll).await;
    }
}
