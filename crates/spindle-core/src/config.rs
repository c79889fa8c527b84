//! Engine configuration.
//!
//! Precedence: built-in defaults, then the TOML file, then `SPINDLE_*`
//! environment variables. The result is validated before use.
//!
//! ```toml
//! [store]
//! root = ".spindle"
//! default_key = "TASK_QUEUE.vf.json"
//!
//! [queue]
//! priority_order = ["high", "medium", "low"]
//!
//! [presentation]
//! empty_queue_comment = "Queue is empty. Push a task to get started."
//!
//! [worker]
//! poll_interval_ms = 500
//! stall_timeout_secs = 900
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DEFAULT_PRIORITY_ORDER;
use crate::queue::presentation::FALLBACK_EMPTY_QUEUE_COMMENT;
use crate::queue::{EngineSettings, PresentationDefaults};

const DEFAULT_CONFIG_FILES: [&str; 2] = ["spindle.toml", ".spindle/config.toml"];

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub presentation: PresentationConfig,
    pub executor: ExecutorConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Directory holding the queue documents.
    pub root: PathBuf,
    /// Key used when a caller does not name one.
    pub default_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueConfig {
    pub priority_order: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PresentationConfig {
    pub empty_queue_comment: String,
    pub all_queues_empty_comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutorConfig {
    pub working_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub stall_timeout_secs: u64,
    /// Run executable pop comments when the worker claims a task.
    pub execute_comments: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                root: PathBuf::from(".spindle"),
                default_key: "TASK_QUEUE.vf.json".to_string(),
            },
            queue: QueueConfig {
                priority_order: DEFAULT_PRIORITY_ORDER.iter().map(|s| s.to_string()).collect(),
            },
            presentation: PresentationConfig {
                empty_queue_comment: FALLBACK_EMPTY_QUEUE_COMMENT.to_string(),
                all_queues_empty_comment: None,
            },
            executor: ExecutorConfig {
                working_dir: PathBuf::from("."),
            },
            worker: WorkerConfig {
                poll_interval_ms: 500,
                stall_timeout_secs: 900,
                execute_comments: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
            },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        Self::load_with_env(options, read_env)
    }

    /// Like `load`, with environment lookups going through `lookup`.
    pub fn load_with_env(
        options: LoadOptions,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        } else if options.require_file {
            let expected = options
                .config_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_queue(&self.queue)?;
        validate_worker(&self.worker)?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            priority_order: self.queue.priority_order.clone(),
            presentation: PresentationDefaults {
                empty_queue_comment: self.presentation.empty_queue_comment.clone(),
                all_queues_empty_comment: self.presentation.all_queues_empty_comment.clone(),
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.stall_timeout_secs)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(root) = store.root {
                self.store.root = root;
            }
            if let Some(default_key) = store.default_key {
                self.store.default_key = default_key;
            }
        }

        if let Some(queue) = patch.queue
            && let Some(priority_order) = queue.priority_order
        {
            self.queue.priority_order = priority_order;
        }

        if let Some(presentation) = patch.presentation {
            if let Some(text) = presentation.empty_queue_comment {
                self.presentation.empty_queue_comment = text;
            }
            if let Some(text) = presentation.all_queues_empty_comment {
                self.presentation.all_queues_empty_comment = Some(text);
            }
        }

        if let Some(executor) = patch.executor
            && let Some(working_dir) = executor.working_dir
        {
            self.executor.working_dir = working_dir;
        }

        if let Some(worker) = patch.worker {
            if let Some(poll_interval_ms) = worker.poll_interval_ms {
                self.worker.poll_interval_ms = poll_interval_ms;
            }
            if let Some(stall_timeout_secs) = worker.stall_timeout_secs {
                self.worker.stall_timeout_secs = stall_timeout_secs;
            }
            if let Some(execute_comments) = worker.execute_comments {
                self.worker.execute_comments = execute_comments;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup("SPINDLE_STORE_ROOT") {
            self.store.root = PathBuf::from(value);
        }
        if let Some(value) = lookup("SPINDLE_DEFAULT_KEY") {
            self.store.default_key = value;
        }
        if let Some(value) = lookup("SPINDLE_WORKING_DIR") {
            self.executor.working_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("SPINDLE_POLL_INTERVAL_MS") {
            self.worker.poll_interval_ms = parse_u64("SPINDLE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("SPINDLE_STALL_TIMEOUT_SECS") {
            self.worker.stall_timeout_secs = parse_u64("SPINDLE_STALL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("SPINDLE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("SPINDLE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ConfigPatch>(&raw).map_err(|source| ConfigError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.default_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "store.default_key must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_queue(queue: &QueueConfig) -> Result<(), ConfigError> {
    if queue.priority_order.is_empty() {
        return Err(ConfigError::Validation(
            "queue.priority_order must name at least one label".to_string(),
        ));
    }
    for (index, label) in queue.priority_order.iter().enumerate() {
        if label.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "queue.priority_order[{index}] is empty"
            )));
        }
        if queue.priority_order[..index].contains(label) {
            return Err(ConfigError::Validation(format!(
                "queue.priority_order lists `{label}` twice"
            )));
        }
    }
    Ok(())
}

fn validate_worker(worker: &WorkerConfig) -> Result<(), ConfigError> {
    if worker.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "worker.poll_interval_ms must be greater than 0".to_string(),
        ));
    }
    if worker.stall_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "worker.stall_timeout_secs must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    store: Option<StorePatch>,
    queue: Option<QueuePatch>,
    presentation: Option<PresentationPatch>,
    executor: Option<ExecutorPatch>,
    worker: Option<WorkerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    root: Option<PathBuf>,
    default_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueuePatch {
    priority_order: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PresentationPatch {
    empty_queue_comment: Option<String>,
    all_queues_empty_comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutorPatch {
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerPatch {
    poll_interval_ms: Option<u64>,
    stall_timeout_secs: Option<u64>,
    execute_comments: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("spindle.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load_with_env(
            LoadOptions {
                config_path: Some(dir.path().join("absent.toml")),
                require_file: false,
            },
            no_env,
        )
        .unwrap();

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let expected = dir.path().join("absent.toml");
        let err = EngineConfig::load_with_env(
            LoadOptions {
                config_path: Some(expected.clone()),
                require_file: true,
            },
            no_env,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::MissingConfigFile(path) if path == expected));
    }

    #[test]
    fn precedence_defaults_file_env() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[store]
root = "/var/lib/spindle"
default_key = "from-file.json"

[queue]
priority_order = ["critical", "high", "low"]

[presentation]
all_queues_empty_comment = "All caught up"

[logging]
level = "debug"
format = "json"
"#,
        );
        let env: HashMap<&str, &str> = HashMap::from([
            ("SPINDLE_DEFAULT_KEY", "from-env.json"),
            ("SPINDLE_LOG_LEVEL", "  "),
        ]);

        let config = EngineConfig::load_with_env(
            LoadOptions {
                config_path: Some(path),
                require_file: true,
            },
            |key| env.get(key).map(|v| v.to_string()),
        )
        .unwrap();

        assert_eq!(config.store.root, PathBuf::from("/var/lib/spindle"));
        assert_eq!(config.store.default_key, "from-env.json");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let settings = config.engine_settings();
        assert_eq!(settings.priority_order, vec!["critical", "high", "low"]);
        assert_eq!(
            settings.presentation.all_queues_empty_comment.as_deref(),
            Some("All caught up")
        );
        assert_eq!(
            settings.presentation.empty_queue_comment,
            FALLBACK_EMPTY_QUEUE_COMMENT
        );
    }

    #[test]
    fn invalid_env_number_is_reported() {
        let err = EngineConfig::load_with_env(LoadOptions::default(), |key| {
            (key == "SPINDLE_POLL_INTERVAL_MS").then(|| "soon".to_string())
        })
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidEnvOverride { ref key, .. } if key == "SPINDLE_POLL_INTERVAL_MS"
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[queue]\npriority_order = [\"high\", \"\"]\n");
        let err = EngineConfig::load_with_env(
            LoadOptions {
                config_path: Some(path),
                require_file: true,
            },
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("priority_order[1]")));

        let path = write_config(&dir, "[worker]\npoll_interval_ms = 0\n");
        let err = EngineConfig::load_with_env(
            LoadOptions {
                config_path: Some(path),
                require_file: true,
            },
            no_env,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("poll_interval_ms")));
    }

    #[test]
    fn unknown_section_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[stroe]\nroot = \"x\"\n");
        let err = EngineConfig::load_with_env(
            LoadOptions {
                config_path: Some(path),
                require_file: true,
            },
            no_env,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::ParseFile { .. }));
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
