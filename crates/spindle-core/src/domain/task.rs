//! Task record and its executable specification.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::{TaskKind, TaskStatus};

/// Executable specification carried by runnable tasks (and executable comments).
///
/// Serialized with a `type` tag, e.g. `{"type":"command","command":"echo","args":["hi"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Runnable {
    /// A program started directly (no shell).
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },

    /// A script file on disk, resolved against the executor's working directory.
    Script {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },

    /// A function registered with the executor by name.
    Function {
        function: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<serde_json::Value>,
    },
}

impl Runnable {
    pub fn command(command: impl Into<String>, args: &[&str]) -> Self {
        Runnable::Command {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<serde_json::Value>) -> Self {
        Runnable::Function {
            function: name.into(),
            args,
        }
    }

    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        match self {
            Runnable::Command { command, .. } => format!("command:{command}"),
            Runnable::Script { path, .. } => format!("script:{path}"),
            Runnable::Function { function, .. } => format!("function:{function}"),
        }
    }
}

/// A unit of work stored in a priority queue.
///
/// Design:
/// - The engine only changes `status` and timestamps through the transition
///   methods below.
/// - `content` is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    #[serde(rename = "type", default)]
    pub kind: TaskKind,

    #[serde(default)]
    pub priority: String,

    #[serde(default)]
    pub content: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runnable: Option<Runnable>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Missing on some older documents; `QueueState` fills it from
    /// `metadata.lastUpdated` when the document is read.
    #[serde(default = "unknown_created_at")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

pub(crate) fn unknown_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

impl Task {
    /// Complete a partial task into a pending one.
    pub fn from_new(new: NewTask, id: TaskId, priority: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: new.kind,
            priority: priority.to_string(),
            content: new.content,
            runnable: new.runnable,
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    /// Synthesized placeholder for an empty queue.
    pub fn placeholder(priority: &str, comment: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(format!("empty-{priority}")),
            kind: TaskKind::Empty,
            priority: priority.to_string(),
            content: serde_json::json!({ "comment": comment }),
            runnable: None,
            status: TaskStatus::Pending,
            created_at: at,
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind == TaskKind::Empty
    }

    pub fn is_runnable(&self) -> bool {
        self.kind.is_runnable()
    }

    /// Claim into the working slot.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Working;
        self.started_at = Some(now);
    }

    /// Executor succeeded.
    pub fn complete(&mut self, now: DateTime<Utc>, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(result);
        self.error = None;
    }

    /// Executor failed.
    pub fn fail(&mut self, now: DateTime<Utc>, error: String) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(error);
    }

    /// Return a claimed task to pending (restart).
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
    }
}

/// Caller-side partial task for `push`.
///
/// Missing fields (id, status, timestamps, priority) are filled in by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,

    #[serde(rename = "type", default)]
    pub kind: TaskKind,

    #[serde(default)]
    pub content: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runnable: Option<Runnable>,
}

impl NewTask {
    pub fn data(content: serde_json::Value) -> Self {
        Self {
            kind: TaskKind::Data,
            content,
            ..Self::default()
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: TaskKind::Message,
            content: serde_json::Value::String(text.into()),
            ..Self::default()
        }
    }

    pub fn runnable(spec: Runnable) -> Self {
        Self {
            kind: TaskKind::Runnable,
            runnable: Some(spec),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn from_new_fills_missing_fields() {
        let task = Task::from_new(
            NewTask::data(serde_json::json!("x")),
            TaskId::from("t1"),
            "high",
            at(),
        );

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, "high");
        assert_eq!(task.created_at, at());
        assert!(task.started_at.is_none());
    }

    #[test]
    fn lifecycle_transitions() {
        let mut task = Task::from_new(NewTask::default(), TaskId::from("t1"), "low", at());

        task.start(at());
        assert_eq!(task.status, TaskStatus::Working);
        assert_eq!(task.started_at, Some(at()));

        task.reset();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());

        task.start(at());
        task.fail(at(), "boom".to_string());
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn task_json_uses_camel_case_and_type_tag() {
        let mut task = Task::from_new(
            NewTask::runnable(Runnable::command("echo", &["hi"])),
            TaskId::from("r1"),
            "medium",
            at(),
        );
        task.start(at());

        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["type"], "runnable");
        assert_eq!(v["status"], "working");
        assert!(v.get("createdAt").is_some());
        assert!(v.get("startedAt").is_some());
        assert_eq!(v["runnable"]["type"], "command");
        assert_eq!(v["runnable"]["args"][0], "hi");
    }

    #[test]
    fn sparse_task_json_is_accepted() {
        let task: Task = serde_json::from_str(r#"{"id":"legacy-1","content":{"title":"x"}}"#).unwrap();
        assert_eq!(task.kind, TaskKind::Data);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.content["title"], "x");
    }

    #[test]
    fn placeholder_is_deterministic() {
        let a = Task::placeholder("high", "nothing to do", at());
        let b = Task::placeholder("high", "nothing to do", at());
        assert_eq!(a, b);
        assert!(a.is_placeholder());
        assert_eq!(a.id.as_str(), "empty-high");
    }
}
