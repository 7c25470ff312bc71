//! Time ledger.
//!
//! Per-task time entries live in an append-only `time.jsonl` ledger.
//! Entries are deletable only by their author; deletion rewrites the
//! ledger whole under its lock. A task's `logged_hours` is always an
//! aggregate over this ledger, never a stored counter.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::task::TaskSet;

/// One logged slice of work on a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    /// Always > 0
    pub hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The day the work happened (not the day it was logged)
    pub date: NaiveDate,
    pub logged_at: DateTime<Utc>,
}

/// Store for a project's time ledger
#[derive(Debug, Clone)]
pub struct TimeStore {
    storage: Storage,
}

impl TimeStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Append a time entry
    pub fn log(
        &self,
        project_id: &str,
        task_id: &str,
        user_id: &str,
        hours: f64,
        description: Option<String>,
        date: NaiveDate,
    ) -> Result<TimeEntry> {
        if !(hours > 0.0) {
            return Err(Error::InvalidArgument(
                "hours must be greater than zero".to_string(),
            ));
        }
        self.require_task(project_id, task_id)?;

        let entry = TimeEntry {
            id: Ulid::new().to_string(),
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            hours,
            description: description.filter(|text| !text.trim().is_empty()),
            date,
            logged_at: Utc::now(),
        };
        self.storage
            .append_jsonl(&self.storage.time_file(project_id), &entry)?;

        tracing::debug!(task = %task_id, hours, "time logged");
        Ok(entry)
    }

    /// Delete an entry; only the author may do so
    pub fn delete(&self, project_id: &str, entry_id: &str, actor: &str) -> Result<()> {
        let path = self.storage.time_file(project_id);
        let entries: Vec<TimeEntry> = self.storage.read_jsonl(&path)?;

        let entry = entries
            .iter()
            .find(|entry| entry.id == entry_id)
            .ok_or_else(|| Error::TimeEntryNotFound(entry_id.to_string()))?;
        if entry.user_id != actor {
            return Err(Error::InvalidArgument(
                "a time entry can only be deleted by its author".to_string(),
            ));
        }

        let kept: Vec<TimeEntry> = entries
            .into_iter()
            .filter(|entry| entry.id != entry_id)
            .collect();
        self.storage.write_jsonl(&path, &kept)
    }

    /// All entries for a task, oldest first
    pub fn for_task(&self, project_id: &str, task_id: &str) -> Result<Vec<TimeEntry>> {
        let mut entries: Vec<TimeEntry> = self
            .storage
            .read_jsonl(&self.storage.time_file(project_id))?;
        entries.retain(|entry| entry.task_id == task_id);
        entries.sort_by(|a, b| {
            a.logged_at
                .cmp(&b.logged_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Sum of logged hours on a task
    pub fn logged_hours(&self, project_id: &str, task_id: &str) -> Result<f64> {
        Ok(self
            .for_task(project_id, task_id)?
            .iter()
            .map(|entry| entry.hours)
            .sum())
    }

    fn require_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        let set: TaskSet = self
            .storage
            .read_json_or(&self.storage.tasks_file(project_id), TaskSet::empty)?;
        if set.find(task_id).is_some() {
            Ok(())
        } else {
            Err(Error::TaskNotFound(task_id.to_string()))
        }
    }
}
