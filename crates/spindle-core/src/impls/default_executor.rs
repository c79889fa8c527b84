//! DefaultTaskExecutor - command / script / function の実行
//!
//! runnable タスクの `runnable` 仕様を見て実行方法を切り替えます。
//! - command: `tokio::process::Command` で直接起動（シェルは通さない）
//! - script: working_dir 基準でパスを解決し、実行ビットがなければ付与して起動
//! - function: FunctionRegistry に登録された関数を名前で呼ぶ
//!
//! 非ゼロ終了は失敗として扱います（engine 側で `failed` になり totalFailed に数えられる）。

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{Runnable, Task};
use crate::error::ExecutionError;
use crate::ports::{CommentHook, TaskExecutor};

/// A named function callable from `{"type":"function"}` runnables.
#[async_trait]
pub trait TaskFunction: Send + Sync {
    async fn call(&self, args: &[serde_json::Value]) -> Result<serde_json::Value, ExecutionError>;
}

/// Plain closures can be registered directly.
#[async_trait]
impl<F> TaskFunction for F
where
    F: Fn(&[serde_json::Value]) -> Result<serde_json::Value, ExecutionError> + Send + Sync,
{
    async fn call(&self, args: &[serde_json::Value]) -> Result<serde_json::Value, ExecutionError> {
        self(args)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("function already registered: {0}")]
    AlreadyRegistered(String),
}

/// Registry of functions (name -> function).
///
/// Built during initialization, read-only afterwards.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn TaskFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl TaskFunction + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    fn builtins(dir: &Path) -> Self {
        let entries: [(&str, Arc<dyn TaskFunction>); 4] = [
            ("echo", Arc::new(EchoFn)),
            ("sleep", Arc::new(SleepFn)),
            ("writeFile", Arc::new(WriteFileFn { dir: dir.to_path_buf() })),
            ("readFile", Arc::new(ReadFileFn { dir: dir.to_path_buf() })),
        ];
        Self {
            functions: entries
                .into_iter()
                .map(|(name, function)| (name.to_string(), function))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Executor for `Runnable` specifications.
#[derive(Clone)]
pub struct DefaultTaskExecutor {
    working_dir: PathBuf,
    functions: FunctionRegistry,
}

impl DefaultTaskExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            functions: FunctionRegistry::new(),
        }
    }

    /// Executor with `echo`, `sleep`, `writeFile` and `readFile` registered.
    pub fn with_builtins(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            functions: FunctionRegistry::builtins(&working_dir),
            working_dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        function: impl TaskFunction + 'static,
    ) -> Result<(), RegistryError> {
        self.functions.register(name, function)
    }

    /// Run one specification.
    pub async fn run(&self, spec: &Runnable) -> Result<serde_json::Value, ExecutionError> {
        debug!(runnable = %spec.describe(), "running");
        match spec {
            Runnable::Command {
                command,
                args,
                env,
                cwd,
            } => {
                let (program, args) = split_command(command, args);
                let dir = match cwd {
                    Some(cwd) => resolve(&self.working_dir, cwd),
                    None => self.working_dir.clone(),
                };
                run_process(&program, &args, env, &dir).await
            }
            Runnable::Script { path, args, env } => {
                let script = resolve(&self.working_dir, path);
                if !tokio::fs::try_exists(&script).await.unwrap_or(false) {
                    return Err(ExecutionError::ScriptNotFound(script.display().to_string()));
                }
                ensure_executable(&script).await?;
                let program = script.display().to_string();
                run_process(&program, args, env, &self.working_dir).await
            }
            Runnable::Function { function, args } => {
                let f = self
                    .functions
                    .get(function)
                    .ok_or_else(|| ExecutionError::FunctionNotRegistered(function.clone()))?;
                let result = f.call(args).await?;
                Ok(serde_json::json!({ "result": result }))
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for DefaultTaskExecutor {
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError> {
        let spec = task.runnable.as_ref().ok_or(ExecutionError::NotRunnable)?;
        if !task.is_runnable() {
            return Err(ExecutionError::NotRunnable);
        }
        self.run(spec).await
    }
}

/// Comment hook that runs executable comments with a `DefaultTaskExecutor`.
#[derive(Clone)]
pub struct RunnableHook {
    executor: DefaultTaskExecutor,
}

impl RunnableHook {
    pub fn new(executor: DefaultTaskExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl CommentHook for RunnableHook {
    async fn run(&self, spec: &Runnable) -> Result<serde_json::Value, ExecutionError> {
        self.executor.run(spec).await
    }
}

/// `"echo hi"` with no args is split on whitespace; otherwise `command` is the program.
fn split_command(command: &str, args: &[String]) -> (String, Vec<String>) {
    if args.is_empty() && command.contains(char::is_whitespace) {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        (program, parts.collect())
    } else {
        (command.to_string(), args.to_vec())
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(unix)]
async fn ensure_executable(path: &Path) -> Result<(), ExecutionError> {
    use std::os::unix::fs::PermissionsExt;

    let io_err = |e: std::io::Error| ExecutionError::Failed(format!("{}: {e}", path.display()));
    let mut permissions = tokio::fs::metadata(path).await.map_err(io_err)?.permissions();
    if permissions.mode() & 0o111 == 0 {
        permissions.set_mode(permissions.mode() | 0o755);
        tokio::fs::set_permissions(path, permissions)
            .await
            .map_err(io_err)?;
        info!(path = %path.display(), "made script executable");
    }
    Ok(())
}

#[cfg(not(unix))]
async fn ensure_executable(_path: &Path) -> Result<(), ExecutionError> {
    Ok(())
}

async fn run_process(
    program: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    dir: &Path,
) -> Result<serde_json::Value, ExecutionError> {
    if program.is_empty() {
        return Err(ExecutionError::Spawn {
            program: String::new(),
            message: "empty command".to_string(),
        });
    }

    let output = Command::new(program)
        .args(args)
        .envs(env)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ExecutionError::Spawn {
            program: program.to_string(),
            message: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        debug!(program, bytes = stdout.len(), "command finished");
        Ok(serde_json::json!({
            "stdout": stdout,
            "stderr": stderr,
            "exitCode": output.status.code(),
        }))
    } else {
        Err(ExecutionError::NonZeroExit {
            code: output.status.code(),
            stderr,
        })
    }
}

fn string_arg(args: &[serde_json::Value], index: usize, name: &str) -> Result<String, ExecutionError> {
    match args.get(index) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(ExecutionError::Failed(format!("missing argument `{name}`"))),
    }
}

struct EchoFn;

#[async_trait]
impl TaskFunction for EchoFn {
    async fn call(&self, args: &[serde_json::Value]) -> Result<serde_json::Value, ExecutionError> {
        let text = args
            .iter()
            .map(|a| match a {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "spindle::echo", "{text}");
        Ok(serde_json::Value::String(text))
    }
}

struct SleepFn;

#[async_trait]
impl TaskFunction for SleepFn {
    async fn call(&self, args: &[serde_json::Value]) -> Result<serde_json::Value, ExecutionError> {
        let raw = string_arg(args, 0, "ms")?;
        let ms: u64 = raw
            .trim()
            .parse()
            .map_err(|_| ExecutionError::Failed(format!("invalid sleep duration: {raw}")))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(serde_json::Value::String(format!("Slept for {ms}ms")))
    }
}

struct WriteFileFn {
    dir: PathBuf,
}

#[async_trait]
impl TaskFunction for WriteFileFn {
    async fn call(&self, args: &[serde_json::Value]) -> Result<serde_json::Value, ExecutionError> {
        let path = string_arg(args, 0, "path")?;
        let content = string_arg(args, 1, "content")?;
        let target = resolve(&self.dir, &path);
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| ExecutionError::Failed(format!("{}: {e}", target.display())))?;
        Ok(serde_json::Value::String(format!("Written to {path}")))
    }
}

struct ReadFileFn {
    dir: PathBuf,
}

#[async_trait]
impl TaskFunction for ReadFileFn {
    async fn call(&self, args: &[serde_json::Value]) -> Result<serde_json::Value, ExecutionError> {
        let path = string_arg(args, 0, "path")?;
        let target = resolve(&self.dir, &path);
        let content = tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| ExecutionError::Failed(format!("{}: {e}", target.display())))?;
        Ok(serde_json::Value::String(content))
    }
}
