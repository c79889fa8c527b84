//! Priority selector: which queue does the next task come from?

use crate::domain::QueueState;

/// Pick the queue to draw from.
///
/// 1. `explicit`, if that queue holds a real item;
/// 2. the first non-empty label of the document's `priority_order`
///    (or `default_order` when the document has none);
/// 3. the first non-empty remaining label, in lexical order.
///
/// Placeholders never make a queue non-empty. `None` means no task is available.
pub fn select(state: &QueueState, explicit: Option<&str>, default_order: &[String]) -> Option<String> {
    if let Some(label) = explicit
        && state.has_pending(label)
    {
        return Some(label.to_string());
    }

    let order: &[String] = state.priority_order.as_deref().unwrap_or(default_order);
    if let Some(label) = order.iter().find(|label| state.has_pending(label)) {
        return Some(label.clone());
    }

    // BTreeMap keys iterate in lexical order.
    state
        .queues
        .keys()
        .filter(|label| !order.contains(label))
        .find(|label| state.has_pending(label))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_PRIORITY_ORDER, NewTask, Task, TaskId};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn default_order() -> Vec<String> {
        DEFAULT_PRIORITY_ORDER.iter().map(|s| s.to_string()).collect()
    }

    fn state_with(labels: &[&str]) -> QueueState {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut state = QueueState::new(at);
        for (i, label) in labels.iter().enumerate() {
            let task = Task::from_new(NewTask::default(), TaskId::new(format!("t{i}")), label, at);
            state.queue_mut(label).items.push(task);
        }
        state
    }

    #[rstest]
    #[case::high_wins(&["low", "high"], None, Some("high"))]
    #[case::medium_before_low(&["low", "medium"], None, Some("medium"))]
    #[case::explicit_respected(&["low", "high"], Some("low"), Some("low"))]
    #[case::explicit_empty_falls_through(&["low"], Some("high"), Some("low"))]
    #[case::unknown_label_after_known(&["zeta", "low"], None, Some("low"))]
    #[case::unknown_labels_lexical(&["zeta", "alpha"], None, Some("alpha"))]
    #[case::nothing(&[], None, None)]
    fn selection(
        #[case] labels: &[&str],
        #[case] explicit: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let state = state_with(labels);
        assert_eq!(
            select(&state, explicit, &default_order()).as_deref(),
            expected
        );
    }

    #[test]
    fn document_priority_order_overrides_default() {
        let mut state = state_with(&["high", "critical"]);
        state.priority_order = Some(vec!["critical".to_string(), "high".to_string()]);

        assert_eq!(select(&state, None, &default_order()).as_deref(), Some("critical"));
    }

    #[test]
    fn placeholder_only_queue_is_empty() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut state = state_with(&["low"]);
        state
            .queue_mut("high")
            .items
            .push(Task::placeholder("high", "nothing here", at));

        assert_eq!(select(&state, None, &default_order()).as_deref(), Some("low"));
        assert_eq!(select(&state, Some("high"), &default_order()).as_deref(), Some("low"));
    }
}
