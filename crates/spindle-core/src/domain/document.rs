//! The persisted queue document.
//!
//! One `QueueState` per store key. Shape:
//!
//! ```json
//! {
//!   "workingItem": null,
//!   "queues": { "high": { "items": [] }, "medium": { "items": [] }, "low": { "items": [] } },
//!   "metadata": { "totalProcessed": 0, "totalFailed": 0, "lastUpdated": "2024-01-01T00:00:00Z" },
//!   "priority_order": ["high", "medium", "low"],
//!   "global_config": { "all_queues_empty_comment": "..." }
//! }
//! ```
//!
//! Older documents are still readable: `working_item`, bare-array queues, and
//! `processedCount` / `failedCount` counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::comment::Comment;
use super::ids::TaskId;
use super::task::{Task, unknown_created_at};

/// Order used when a document has no `priority_order`.
pub const DEFAULT_PRIORITY_ORDER: [&str; 3] = ["high", "medium", "low"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StateRepr")]
pub struct QueueState {
    #[serde(rename = "workingItem")]
    pub working_item: Option<Task>,

    pub queues: BTreeMap<String, PriorityQueue>,

    pub metadata: Metadata,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_order: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_config: Option<GlobalConfig>,
}

/// On-disk shape of a document, before missing timestamps are filled in.
#[derive(Deserialize)]
struct StateRepr {
    #[serde(rename = "workingItem", alias = "working_item", default)]
    working_item: Option<Task>,
    #[serde(default)]
    queues: BTreeMap<String, PriorityQueue>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    priority_order: Option<Vec<String>>,
    #[serde(default)]
    global_config: Option<GlobalConfig>,
}

impl From<StateRepr> for QueueState {
    fn from(repr: StateRepr) -> Self {
        let mut state = Self {
            working_item: repr.working_item,
            queues: repr.queues,
            metadata: repr.metadata,
            priority_order: repr.priority_order,
            global_config: repr.global_config,
        };
        let fallback = state.metadata.last_updated;
        let tasks = state
            .working_item
            .iter_mut()
            .chain(state.queues.values_mut().flat_map(|q| q.items.iter_mut()));
        for task in tasks {
            if task.created_at == unknown_created_at() {
                task.created_at = fallback;
            }
        }
        state
    }
}

impl QueueState {
    /// Fresh document with empty `high`, `medium` and `low` queues.
    pub fn new(now: DateTime<Utc>) -> Self {
        let queues = DEFAULT_PRIORITY_ORDER
            .iter()
            .map(|label| (label.to_string(), PriorityQueue::default()))
            .collect();
        Self {
            working_item: None,
            queues,
            metadata: Metadata::new(now),
            priority_order: None,
            global_config: None,
        }
    }

    /// Queue for `label`, created if absent.
    pub fn queue_mut(&mut self, label: &str) -> &mut PriorityQueue {
        self.queues.entry(label.to_string()).or_default()
    }

    /// Number of real (non-placeholder) items waiting in `label`.
    pub fn pending_len(&self, label: &str) -> usize {
        self.queues.get(label).map_or(0, PriorityQueue::real_len)
    }

    pub fn has_pending(&self, label: &str) -> bool {
        self.pending_len(label) > 0
    }

    /// True when no queue holds a real item.
    pub fn all_queues_empty(&self) -> bool {
        self.queues.values().all(|q| q.real_len() == 0)
    }

    /// Is `id` used by a queued or working task?
    pub fn contains_id(&self, id: &TaskId) -> bool {
        self.working_item.as_ref().is_some_and(|t| &t.id == id)
            || self
                .queues
                .values()
                .any(|q| q.items.iter().any(|t| &t.id == id))
    }

    pub fn total_pending(&self) -> usize {
        self.queues.values().map(PriorityQueue::real_len).sum()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.last_updated = now;
    }
}

impl Default for QueueState {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// One named FIFO queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "QueueRepr")]
pub struct PriorityQueue {
    pub items: Vec<Task>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_queue_comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pop_comment: Option<Comment>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_comment: Option<String>,
}

impl PriorityQueue {
    /// Item count ignoring placeholders that may have been written by older tools.
    pub fn real_len(&self) -> usize {
        self.items.iter().filter(|t| !t.is_placeholder()).count()
    }

    /// First real item, if any.
    pub fn head(&self) -> Option<&Task> {
        self.items.iter().find(|t| !t.is_placeholder())
    }

    /// Remove and return the first real item.
    pub fn take_head(&mut self) -> Option<Task> {
        let index = self.items.iter().position(|t| !t.is_placeholder())?;
        Some(self.items.remove(index))
    }
}

/// Accepted on-disk shapes of a queue.
#[derive(Deserialize)]
#[serde(untagged)]
enum QueueRepr {
    Items(Vec<Task>),
    Full {
        #[serde(default)]
        items: Vec<Task>,
        #[serde(default)]
        empty_queue_comment: Option<String>,
        #[serde(default)]
        pop_comment: Option<Comment>,
        #[serde(default)]
        insert_comment: Option<String>,
    },
}

impl From<QueueRepr> for PriorityQueue {
    fn from(repr: QueueRepr) -> Self {
        match repr {
            QueueRepr::Items(items) => Self {
                items,
                ..Self::default()
            },
            QueueRepr::Full {
                items,
                empty_queue_comment,
                pop_comment,
                insert_comment,
            } => Self {
                items,
                empty_queue_comment,
                pop_comment,
                insert_comment,
            },
        }
    }
}

/// Running counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, alias = "processedCount")]
    pub total_processed: u64,

    #[serde(default, alias = "failedCount")]
    pub total_failed: u64,

    #[serde(default = "never_updated", alias = "updated_at")]
    pub last_updated: DateTime<Utc>,
}

fn never_updated() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Metadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_processed: 0,
            total_failed: 0,
            last_updated: now,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Document-wide presentation settings. Unknown keys are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_queues_empty_comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_empty_queue_comment: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskStatus};
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_state_has_default_queues() {
        let state = QueueState::new(at());
        assert_eq!(
            state.queues.keys().cloned().collect::<Vec<_>>(),
            vec!["high", "low", "medium"]
        );
        assert!(state.working_item.is_none());
        assert!(state.all_queues_empty());
        assert_eq!(state.metadata.last_updated, at());
    }

    #[test]
    fn serialized_shape_matches_document_contract() {
        let state = QueueState::new(at());
        let v = serde_json::to_value(&state).unwrap();

        assert!(v["workingItem"].is_null());
        assert!(v["queues"]["high"]["items"].as_array().unwrap().is_empty());
        assert_eq!(v["metadata"]["totalProcessed"], 0);
        assert_eq!(v["metadata"]["totalFailed"], 0);
        assert!(v["metadata"]["lastUpdated"].is_string());
        assert!(v.get("priority_order").is_none());
    }

    #[test]
    fn legacy_document_shape_is_accepted() {
        let raw = r#"{
            "working_item": null,
            "queues": {
                "high": [],
                "critical": [{"id": "c1", "type": "runnable", "content": {"title": "fix"}}],
                "user_story": {"items": [], "pop_comment": "Implement story", "insert_comment": "Add stories"}
            },
            "metadata": {"processedCount": 3, "failedCount": 1, "lastUpdated": "2024-01-01T12:00:00Z"},
            "global_config": {"seldom_display_default": 5}
        }"#;
        let state: QueueState = serde_json::from_str(raw).unwrap();

        assert_eq!(state.pending_len("critical"), 1);
        assert_eq!(state.metadata.total_processed, 3);
        assert_eq!(state.metadata.total_failed, 1);
        assert_eq!(
            state.queues["user_story"].pop_comment,
            Some(Comment::text("Implement story"))
        );
        let global = state.global_config.unwrap();
        assert_eq!(global.extra["seldom_display_default"], 5);
    }

    #[test]
    fn missing_created_at_is_read_as_last_updated() {
        let raw = serde_json::json!({
            "workingItem": {"id": "w1", "status": "working"},
            "queues": {"high": [{"id": "h1"}, {"id": "h2", "createdAt": "2023-06-01T00:00:00Z"}]},
            "metadata": {"lastUpdated": "2024-01-01T12:00:00Z"}
        });

        let first: QueueState = serde_json::from_value(raw.clone()).unwrap();
        let second: QueueState = serde_json::from_value(raw).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.working_item.as_ref().unwrap().created_at, at());
        assert_eq!(first.queues["high"].items[0].created_at, at());
        assert_eq!(
            first.queues["high"].items[1].created_at,
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn document_without_timestamps_reads_the_same_twice() {
        let raw = serde_json::json!({"queues": {"low": [{"id": "l1"}]}});

        let first: QueueState = serde_json::from_value(raw.clone()).unwrap();
        let second: QueueState = serde_json::from_value(raw).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.metadata.last_updated, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn placeholders_do_not_count_as_items() {
        let mut state = QueueState::new(at());
        state
            .queue_mut("high")
            .items
            .push(Task::placeholder("high", "empty", at()));

        assert!(!state.has_pending("high"));
        assert!(state.all_queues_empty());
        assert!(state.queue_mut("high").take_head().is_none());
    }

    #[test]
    fn contains_id_checks_queues_and_working_slot() {
        let mut state = QueueState::new(at());
        let queued = Task::from_new(NewTask::default(), TaskId::from("q1"), "low", at());
        let mut working = Task::from_new(NewTask::default(), TaskId::from("w1"), "high", at());
        working.start(at());
        state.queue_mut("low").items.push(queued);
        state.working_item = Some(working);

        assert!(state.contains_id(&TaskId::from("q1")));
        assert!(state.contains_id(&TaskId::from("w1")));
        assert!(!state.contains_id(&TaskId::from("zz")));
        assert_eq!(
            state.working_item.as_ref().map(|t| t.status),
            Some(TaskStatus::Working)
        );
    }
}
