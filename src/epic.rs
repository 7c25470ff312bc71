//! Epic entities.
//!
//! An epic is a named grouping of tasks within a project. Epic status
//! is a fixed enum, deliberately independent of the project's
//! configurable workflow stages.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ident;
use crate::storage::Storage;
use crate::task::TaskSet;

const EPICS_SCHEMA_VERSION: &str = "tempo.epics.v1";
const DEFAULT_EPIC_COLOR: &str = "#6b7280";

/// Epic lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    Todo,
    InProgress,
    Done,
    Cancelled,
}

impl EpicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpicStatus::Todo => "todo",
            EpicStatus::InProgress => "in_progress",
            EpicStatus::Done => "done",
            EpicStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Epic record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: String,
    pub project_id: String,
    /// Project-unique code, e.g. `ACME-E2`
    pub code: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: String,
    pub status: EpicStatus,
    #[serde(default)]
    pub ai_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Fields accepted when creating an epic
#[derive(Debug, Clone)]
pub struct NewEpic {
    pub title: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub status: EpicStatus,
    pub ai_generated: bool,
}

impl NewEpic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            color: None,
            status: EpicStatus::Todo,
            ai_generated: false,
        }
    }
}

/// Patch for epic updates; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct EpicPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub status: Option<EpicStatus>,
}

/// Collection document for a project's epics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicSet {
    pub schema_version: String,
    pub epics: Vec<Epic>,
}

impl EpicSet {
    pub fn empty() -> Self {
        Self {
            schema_version: EPICS_SCHEMA_VERSION.to_string(),
            epics: Vec::new(),
        }
    }
}

/// Store for a project's epics
#[derive(Debug, Clone)]
pub struct EpicStore {
    storage: Storage,
}

impl EpicStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Create an epic, allocating its code inside the document lock
    pub fn create(&self, project_id: &str, project_code: &str, new: NewEpic, actor: &str) -> Result<Epic> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument(
                "epic title cannot be empty".to_string(),
            ));
        }

        let path = self.storage.epics_file(project_id);
        let project_id = project_id.to_string();
        let project_code = project_code.to_string();
        let actor = actor.to_string();
        let epic = self
            .storage
            .update_json(&path, EpicSet::empty, move |set: &mut EpicSet| {
                let existing: HashSet<String> =
                    set.epics.iter().map(|epic| epic.code.clone()).collect();
                let code = ident::next_epic_code(&project_code, &existing);

                let now = Utc::now();
                let epic = Epic {
                    id: Uuid::new_v4().to_string(),
                    project_id,
                    code,
                    title,
                    description: normalize_text(new.description),
                    color: new.color.unwrap_or_else(|| DEFAULT_EPIC_COLOR.to_string()),
                    status: new.status,
                    ai_generated: new.ai_generated,
                    created_at: now,
                    updated_at: now,
                    created_by: Some(actor.clone()),
                    updated_by: Some(actor),
                };
                set.epics.push(epic.clone());
                Ok(epic)
            })?;

        tracing::debug!(epic = %epic.id, code = %epic.code, "epic created");
        Ok(epic)
    }

    /// Fetch an epic by id
    pub fn get(&self, project_id: &str, epic_id: &str) -> Result<Epic> {
        let set: EpicSet = self
            .storage
            .read_json_or(&self.storage.epics_file(project_id), EpicSet::empty)?;
        set.epics
            .into_iter()
            .find(|epic| epic.id == epic_id)
            .ok_or_else(|| Error::EpicNotFound(epic_id.to_string()))
    }

    /// List a project's epics, ordered by code sequence
    pub fn list(&self, project_id: &str) -> Result<Vec<Epic>> {
        let set: EpicSet = self
            .storage
            .read_json_or(&self.storage.epics_file(project_id), EpicSet::empty)?;
        let mut epics = set.epics;
        epics.sort_by(|a, b| code_sort_key(&a.code).cmp(&code_sort_key(&b.code)));
        Ok(epics)
    }

    /// Apply a patch to an epic
    pub fn update(
        &self,
        project_id: &str,
        epic_id: &str,
        patch: EpicPatch,
        actor: &str,
    ) -> Result<Epic> {
        let path = self.storage.epics_file(project_id);
        let epic_id = epic_id.to_string();
        let actor = actor.to_string();
        self.storage
            .update_json(&path, EpicSet::empty, move |set: &mut EpicSet| {
                let epic = set
                    .epics
                    .iter_mut()
                    .find(|epic| epic.id == epic_id)
                    .ok_or_else(|| Error::EpicNotFound(epic_id.clone()))?;

                if let Some(title) = patch.title {
                    let title = title.trim().to_string();
                    if title.is_empty() {
                        return Err(Error::InvalidArgument(
                            "epic title cannot be empty".to_string(),
                        ));
                    }
                    epic.title = title;
                }
                if let Some(description) = patch.description {
                    epic.description = normalize_text(description);
                }
                if let Some(color) = patch.color {
                    epic.color = color;
                }
                if let Some(status) = patch.status {
                    epic.status = status;
                }
                epic.updated_at = Utc::now();
                epic.updated_by = Some(actor);
                Ok(epic.clone())
            })
    }

    /// Delete an epic and detach its tasks
    pub fn delete(&self, project_id: &str, epic_id: &str) -> Result<()> {
        let path = self.storage.epics_file(project_id);
        let id = epic_id.to_string();
        self.storage
            .update_json(&path, EpicSet::empty, move |set: &mut EpicSet| {
                let before = set.epics.len();
                set.epics.retain(|epic| epic.id != id);
                if set.epics.len() == before {
                    return Err(Error::EpicNotFound(id.clone()));
                }
                Ok(())
            })?;

        // Tasks keep existing; they just lose their epic grouping.
        let tasks_path = self.storage.tasks_file(project_id);
        let id = epic_id.to_string();
        self.storage
            .update_json(&tasks_path, TaskSet::empty, move |set: &mut TaskSet| {
                for task in &mut set.tasks {
                    if task.epic_id.as_deref() == Some(id.as_str()) {
                        task.epic_id = None;
                    }
                }
                Ok(())
            })
    }
}

fn normalize_text(value: Option<String>) -> Option<String> {
    let value = value?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Sort key that orders `ACME-E2` before `ACME-E10`
fn code_sort_key(code: &str) -> (String, u64) {
    match code.rfind(|ch: char| !ch.is_ascii_digit()) {
        Some(split) => {
            let (head, digits) = code.split_at(split + 1);
            (head.to_string(), digits.parse().unwrap_or(0))
        }
        None => (code.to_string(), 0),
    }
}
