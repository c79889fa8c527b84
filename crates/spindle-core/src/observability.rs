//! Status views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{QueueState, Task};

/// Read-only snapshot of one queue document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// Pending (non-placeholder) items per label.
    pub queue_sizes: BTreeMap<String, usize>,
    pub total_pending: usize,
    pub working: Option<Task>,
    pub total_processed: u64,
    pub total_failed: u64,
}

impl QueueStatus {
    pub fn from_state(state: &QueueState) -> Self {
        let queue_sizes: BTreeMap<String, usize> = state
            .queues
            .iter()
            .map(|(label, queue)| (label.clone(), queue.real_len()))
            .collect();
        Self {
            total_pending: queue_sizes.values().sum(),
            queue_sizes,
            working: state.working_item.clone(),
            total_processed: state.metadata.total_processed,
            total_failed: state.metadata.total_failed,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.working.is_none() && self.total_pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn counts_real_items_per_label() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut state = QueueState::new(at);
        for id in ["a", "b"] {
            let task = Task::from_new(NewTask::default(), TaskId::from(id), "low", at);
            state.queue_mut("low").items.push(task);
        }
        state
            .queue_mut("high")
            .items
            .push(Task::placeholder("high", "nothing", at));
        state.metadata.total_processed = 4;

        let status = QueueStatus::from_state(&state);

        assert_eq!(status.queue_sizes["low"], 2);
        assert_eq!(status.queue_sizes["high"], 0);
        assert_eq!(status.total_pending, 2);
        assert_eq!(status.total_processed, 4);
        assert!(!status.is_idle());
    }
}
