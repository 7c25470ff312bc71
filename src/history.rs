//! Task change auditing.
//!
//! Every tracked-field change on a task appends one immutable row to
//! the project's `history.jsonl` ledger. Rows are never edited; ULID
//! ids keep the ledger sorted by creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Result;
use crate::storage::Storage;

/// One recorded field change on a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChange {
    pub id: String,
    pub task_id: String,
    pub actor: String,
    /// Name of the changed field, e.g. `"priority"` or `"status_id"`
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl TaskChange {
    pub fn new(
        task_id: impl Into<String>,
        actor: impl Into<String>,
        field: impl Into<String>,
        old: Option<String>,
        new: Option<String>,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            task_id: task_id.into(),
            actor: actor.into(),
            field: field.into(),
            old,
            new,
            changed_at: Utc::now(),
        }
    }
}

/// Store for the task-change ledger
#[derive(Debug, Clone)]
pub struct HistoryStore {
    storage: Storage,
}

impl HistoryStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Append change rows for one mutation
    pub fn append(&self, project_id: &str, changes: &[TaskChange]) -> Result<()> {
        let path = self.storage.history_file(project_id);
        for change in changes {
            self.storage.append_jsonl(&path, change)?;
        }
        Ok(())
    }

    /// All recorded changes for a task, oldest first
    pub fn for_task(&self, project_id: &str, task_id: &str) -> Result<Vec<TaskChange>> {
        let mut rows: Vec<TaskChange> = self
            .storage
            .read_jsonl(&self.storage.history_file(project_id))?;
        rows.retain(|row| row.task_id == task_id);
        rows.sort_by(|a, b| {
            a.changed_at
                .cmp(&b.changed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    /// Drop all rows belonging to a task (cascade on task delete)
    pub fn remove_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        let path = self.storage.history_file(project_id);
        let rows: Vec<TaskChange> = self.storage.read_jsonl(&path)?;
        let kept: Vec<TaskChange> = rows
            .into_iter()
            .filter(|row| row.task_id != task_id)
            .collect();
        self.storage.write_jsonl(&path, &kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, HistoryStore) {
        let dir = TempDir::new().expect("tempdir");
        let storage = Storage::new(dir.path());
        (dir, HistoryStore::new(storage))
    }

    #[test]
    fn append_and_read_back_per_task() {
        let (_dir, store) = setup();
        let changes = vec![
            TaskChange::new("t1", "alice", "title", Some("Old".into()), Some("New".into())),
            TaskChange::new("t1", "alice", "priority", Some("low".into()), Some("high".into())),
            TaskChange::new("t2", "bob", "title", None, Some("Other".into())),
        ];
        store.append("p1", &changes).expect("append");

        let rows = store.for_task("p1", "t1").expect("read");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field, "title");
        assert_eq!(rows[1].field, "priority");
        assert_eq!(rows[1].new.as_deref(), Some("high"));
    }

    #[test]
    fn remove_task_drops_only_that_task() {
        let (_dir, store) = setup();
        store
            .append(
                "p1",
                &[
                    TaskChange::new("t1", "alice", "title", None, Some("A".into())),
                    TaskChange::new("t2", "alice", "title", None, Some("B".into())),
                ],
            )
            .expect("append");

        store.remove_task("p1", "t1").expect("remove");
        assert!(store.for_task("p1", "t1").expect("t1").is_empty());
        assert_eq!(store.for_task("p1", "t2").expect("t2").len(), 1);
    }
}
