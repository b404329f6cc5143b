//! Per-instance change notifications emitted by the save workflows.

use std::sync::Mutex;

use serde::Serialize;

use calyx_rfc::rfc::ical::core::RecurrenceId;

use super::model::MasterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// One instance-level change of a recurring event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceChange {
    pub kind: ChangeKind,
    pub master_id: MasterId,
    pub recurrence_id: RecurrenceId,
}

/// Receiver of instance changes, called after the store committed them.
pub trait ChangeSink {
    fn notify(&self, change: &InstanceChange);
}

/// Logs every change at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChangeSink;

impl ChangeSink for TracingChangeSink {
    fn notify(&self, change: &InstanceChange) {
        tracing::info!(
            kind = ?change.kind,
            master_id = %change.master_id,
            recurrence_id = %change.recurrence_id,
            "Instance changed"
        );
    }
}

/// Buffers changes in memory until taken.
#[derive(Debug, Default)]
pub struct CollectingChangeSink {
    changes: Mutex<Vec<InstanceChange>>,
}

impl CollectingChangeSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains everything collected so far.
    pub fn take(&self) -> Vec<InstanceChange> {
        self.changes
            .lock()
            .map(|mut changes| std::mem::take(&mut *changes))
            .unwrap_or_default()
    }
}

impl ChangeSink for CollectingChangeSink {
    fn notify(&self, change: &InstanceChange) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.push(change.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn collecting_sink_drains() {
        let sink = CollectingChangeSink::new();
        let change = InstanceChange {
            kind: ChangeKind::Added,
            master_id: MasterId::new(),
            recurrence_id: "20240101T090000Z".parse().expect("valid rid"),
        };
        sink.notify(&change);
        TracingChangeSink.notify(&change);

        assert_eq!(sink.take(), vec![change]);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn change_serializes_kind_in_snake_case() {
        let change = InstanceChange {
            kind: ChangeKind::Removed,
            master_id: MasterId::new(),
            recurrence_id: "20240101".parse().expect("valid rid"),
        };
        let json = serde_json::to_value(&change).expect("serializable");
        assert_eq!(json["kind"], "removed");
        assert_eq!(json["recurrence_id"], "20240101");
    }
}
