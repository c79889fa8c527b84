//! Read-time view of a queue document.
//!
//! Empty queues get a synthetic placeholder task carrying guidance text.
//! Placeholders live only in the returned `QueueView`; the stored document
//! never sees them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Comment, Metadata, QueueState, Task};

/// Last-resort guidance text.
pub const FALLBACK_EMPTY_QUEUE_COMMENT: &str = "Queue is empty. Push a task to get started.";

/// Engine-side presentation settings (from `[presentation]` config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationDefaults {
    pub empty_queue_comment: String,
    pub all_queues_empty_comment: Option<String>,
}

impl Default for PresentationDefaults {
    fn default() -> Self {
        Self {
            empty_queue_comment: FALLBACK_EMPTY_QUEUE_COMMENT.to_string(),
            all_queues_empty_comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueView {
    pub working_item: Option<Task>,
    pub queues: BTreeMap<String, QueueListing>,
    pub metadata: Metadata,
    pub priority_order: Vec<String>,
}

/// One queue as shown to a reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListing {
    pub items: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pop_comment: Option<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_comment: Option<String>,
}

impl QueueListing {
    /// Items followed by the placeholder, if any.
    pub fn displayed(&self) -> impl Iterator<Item = &Task> {
        self.items.iter().chain(self.placeholder.iter())
    }
}

impl QueueView {
    pub fn placeholder_for(&self, label: &str) -> Option<&Task> {
        self.queues.get(label).and_then(|q| q.placeholder.as_ref())
    }
}

/// Build the view. Pure: same state and defaults give the same view.
pub fn present(state: &QueueState, defaults: &PresentationDefaults, default_order: &[String]) -> QueueView {
    let all_empty = state.all_queues_empty();
    let global = state.global_config.as_ref();

    let queues = state
        .queues
        .iter()
        .map(|(label, queue)| {
            let items: Vec<Task> = queue
                .items
                .iter()
                .filter(|t| !t.is_placeholder())
                .cloned()
                .collect();

            let placeholder = items.is_empty().then(|| {
                let text = queue
                    .empty_queue_comment
                    .clone()
                    .or_else(|| {
                        all_empty
                            .then(|| global.and_then(|g| g.all_queues_empty_comment.clone()))
                            .flatten()
                    })
                    .or_else(|| global.and_then(|g| g.default_empty_queue_comment.clone()))
                    .or_else(|| {
                        all_empty
                            .then(|| defaults.all_queues_empty_comment.clone())
                            .flatten()
                    })
                    .unwrap_or_else(|| defaults.empty_queue_comment.clone());
                Task::placeholder(label, &text, state.metadata.last_updated)
            });

            let listing = QueueListing {
                items,
                placeholder,
                pop_comment: queue.pop_comment.clone(),
                insert_comment: queue.insert_comment.clone(),
            };
            (label.clone(), listing)
        })
        .collect();

    QueueView {
        working_item: state.working_item.clone(),
        queues,
        metadata: state.metadata.clone(),
        priority_order: state
            .priority_order
            .clone()
            .unwrap_or_else(|| default_order.to_vec()),
    }
}
