//! Task entities and the task manager.
//!
//! Tasks belong to a project, optionally to an epic, and optionally to
//! a parent task (one level of nesting; a task with a parent is a
//! subtask). Creation allocates a project-unique code and resolves the
//! initial workflow stage; every tracked-field update appends one
//! audit row per changed field to the history ledger. Completion state
//! is derived: `completed_at` is stamped and cleared as the task moves
//! into and out of done-flagged stages.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PlanningConfig;
use crate::deps::DependencySet;
use crate::error::{Error, Result};
use crate::history::{HistoryStore, TaskChange};
use crate::ident;
use crate::project::Project;
use crate::status::{AbstractStatus, StageResolver};
use crate::storage::Storage;
use crate::timelog::TimeEntry;

const TASKS_SCHEMA_VERSION: &str = "tempo.tasks.v1";

/// Task flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Task,
    Story,
    Bug,
    Subtask,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Task => "task",
            TaskKind::Story => "story",
            TaskKind::Bug => "bug",
            TaskKind::Subtask => "subtask",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Whether this priority puts a fresh task into the initial sprint
    pub fn is_sprint_worthy(&self) -> bool {
        matches!(self, Priority::High | Priority::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,
    /// Present on subtasks; at most one level of nesting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Project-unique code, e.g. `ACME-12`
    pub code: String,
    pub kind: TaskKind,
    pub priority: Priority,
    /// Id of the current workflow stage
    pub status_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    pub reporter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    /// Manual ordering within the task's grouping
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Set while the task sits in a done-flagged stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(default)]
    pub ai_estimated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Completion is derived from the stage flag, denormalized here
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Fields accepted when creating a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub priority: Priority,
    /// Abstract status resolved against the project's stages
    pub status: Option<AbstractStatus>,
    /// Explicit stage id; wins over `status` when given
    pub status_id: Option<String>,
    pub epic_id: Option<String>,
    pub parent_id: Option<String>,
    pub story_points: Option<u32>,
    pub estimated_hours: Option<f64>,
    pub labels: Vec<String>,
    pub assignee_id: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub ai_generated: bool,
    pub ai_estimated: bool,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            kind: TaskKind::Task,
            priority: Priority::Medium,
            status: None,
            status_id: None,
            epic_id: None,
            parent_id: None,
            story_points: None,
            estimated_hours: None,
            labels: Vec::new(),
            assignee_id: None,
            due_date: None,
            start_date: None,
            ai_generated: false,
            ai_estimated: false,
        }
    }
}

/// Patch for task updates
///
/// Outer `None` leaves a field untouched; for optional fields the
/// inner `None` clears the stored value. Label sets are replaced
/// wholesale, never diffed element-wise.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub kind: Option<TaskKind>,
    pub priority: Option<Priority>,
    pub status_id: Option<String>,
    pub epic_id: Option<Option<String>>,
    pub assignee_id: Option<Option<String>>,
    pub story_points: Option<Option<u32>>,
    pub estimated_hours: Option<Option<f64>>,
    pub labels: Option<Vec<String>>,
    pub sprint_id: Option<Option<String>>,
    pub position: Option<u32>,
    pub due_date: Option<Option<NaiveDate>>,
    pub start_date: Option<Option<NaiveDate>>,
}

/// Collection document for a project's tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSet {
    pub schema_version: String,
    pub tasks: Vec<Task>,
}

impl TaskSet {
    pub fn empty() -> Self {
        Self {
            schema_version: TASKS_SCHEMA_VERSION.to_string(),
            tasks: Vec::new(),
        }
    }

    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == task_id)
    }
}

/// Store for a project's tasks
#[derive(Debug, Clone)]
pub struct TaskStore {
    storage: Storage,
    config: PlanningConfig,
    history: HistoryStore,
}

impl TaskStore {
    pub fn new(storage: Storage, config: PlanningConfig) -> Self {
        let history = HistoryStore::new(storage.clone());
        Self {
            storage,
            config,
            history,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Create a task
    ///
    /// Allocates the next task code, resolves the initial stage (an
    /// explicit `status_id` wins over the abstract status), stamps the
    /// reporter, and assigns the next position within the task's
    /// grouping. Creation writes no history rows; a task created into
    /// a done stage gets `completed_at` stamped immediately.
    pub fn create(&self, project: &Project, new: NewTask, actor: &str) -> Result<Task> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument(
                "task title cannot be empty".to_string(),
            ));
        }

        if let Some(epic_id) = new.epic_id.as_deref() {
            self.require_epic(&project.id, epic_id)?;
        }

        let status_id = match new.status_id {
            Some(status_id) => {
                if project.stage(&status_id).is_none() {
                    return Err(Error::InvalidArgument(format!(
                        "unknown workflow stage: {status_id}"
                    )));
                }
                status_id
            }
            None => StageResolver::new(&project.stages, &self.config).resolve(new.status)?,
        };
        let done = project.stage_is_done(&status_id);

        let path = self.storage.tasks_file(&project.id);
        let project_id = project.id.clone();
        let project_code = project.code.clone();
        let actor = actor.to_string();
        let task = self
            .storage
            .update_json(&path, TaskSet::empty, move |set: &mut TaskSet| {
                if let Some(parent_id) = new.parent_id.as_deref() {
                    let parent = set
                        .find(parent_id)
                        .ok_or_else(|| Error::TaskNotFound(parent_id.to_string()))?;
                    if parent.parent_id.is_some() {
                        return Err(Error::InvalidArgument(
                            "subtasks cannot be nested".to_string(),
                        ));
                    }
                }

                let existing: HashSet<String> =
                    set.tasks.iter().map(|task| task.code.clone()).collect();
                let code = ident::next_task_code(&project_code, &existing);

                let position = set
                    .tasks
                    .iter()
                    .filter(|task| {
                        task.parent_id == new.parent_id && task.epic_id == new.epic_id
                    })
                    .map(|task| task.position)
                    .max()
                    .unwrap_or(0)
                    + 1;

                // A parented task is a subtask whatever the caller said.
                let kind = if new.parent_id.is_some() {
                    TaskKind::Subtask
                } else {
                    new.kind
                };

                let now = Utc::now();
                let task = Task {
                    id: Uuid::new_v4().to_string(),
                    project_id,
                    epic_id: new.epic_id,
                    parent_id: new.parent_id,
                    code,
                    kind,
                    priority: new.priority,
                    status_id,
                    title,
                    description: normalize_text(new.description),
                    story_points: new.story_points,
                    estimated_hours: new.estimated_hours,
                    labels: new.labels,
                    assignee_id: new.assignee_id,
                    reporter_id: actor,
                    sprint_id: None,
                    position,
                    due_date: new.due_date,
                    start_date: new.start_date,
                    completed_at: if done { Some(now) } else { None },
                    ai_generated: new.ai_generated,
                    ai_estimated: new.ai_estimated,
                    created_at: now,
                    updated_at: now,
                };
                set.tasks.push(task.clone());
                Ok(task)
            })?;

        tracing::debug!(task = %task.id, code = %task.code, "task created");
        Ok(task)
    }

    /// Fetch a task by id
    pub fn get(&self, project: &Project, task_id: &str) -> Result<Task> {
        let set: TaskSet = self
            .storage
            .read_json_or(&self.storage.tasks_file(&project.id), TaskSet::empty)?;
        set.find(task_id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    /// List a project's tasks
    pub fn list(&self, project: &Project) -> Result<Vec<Task>> {
        let set: TaskSet = self
            .storage
            .read_json_or(&self.storage.tasks_file(&project.id), TaskSet::empty)?;
        Ok(set.tasks)
    }

    /// Apply a patch, recording one history row per changed field
    pub fn update(
        &self,
        project: &Project,
        task_id: &str,
        patch: TaskPatch,
        actor: &str,
    ) -> Result<Task> {
        if let Some(Some(epic_id)) = patch.epic_id.as_ref().map(|inner| inner.as_deref()) {
            self.require_epic(&project.id, epic_id)?;
        }
        if let Some(status_id) = patch.status_id.as_deref() {
            if project.stage(status_id).is_none() {
                return Err(Error::InvalidArgument(format!(
                    "unknown workflow stage: {status_id}"
                )));
            }
        }

        let path = self.storage.tasks_file(&project.id);
        let task_id_owned = task_id.to_string();
        let actor_owned = actor.to_string();
        let project_ref = project;
        let (task, changes) =
            self.storage
                .update_json(&path, TaskSet::empty, move |set: &mut TaskSet| {
                    let task = set
                        .tasks
                        .iter_mut()
                        .find(|task| task.id == task_id_owned)
                        .ok_or_else(|| Error::TaskNotFound(task_id_owned.clone()))?;

                    let mut changes = Vec::new();
                    apply_patch(task, patch, project_ref, &actor_owned, &mut changes)?;
                    if !changes.is_empty() {
                        task.updated_at = Utc::now();
                    }
                    Ok((task.clone(), changes))
                })?;

        self.history.append(&project.id, &changes)?;
        Ok(task)
    }

    /// Delete a task and cascade its ledgers and edges
    ///
    /// Children are detached (their `parent_id` is cleared), matching
    /// how epic deletion detaches tasks.
    pub fn delete(&self, project: &Project, task_id: &str) -> Result<()> {
        let path = self.storage.tasks_file(&project.id);
        let id = task_id.to_string();
        self.storage
            .update_json(&path, TaskSet::empty, move |set: &mut TaskSet| {
                let before = set.tasks.len();
                set.tasks.retain(|task| task.id != id);
                if set.tasks.len() == before {
                    return Err(Error::TaskNotFound(id.clone()));
                }
                for task in &mut set.tasks {
                    if task.parent_id.as_deref() == Some(id.as_str()) {
                        task.parent_id = None;
                    }
                }
                Ok(())
            })?;

        let deps_path = self.storage.dependencies_file(&project.id);
        let id = task_id.to_string();
        self.storage
            .update_json(&deps_path, DependencySet::empty, move |set: &mut DependencySet| {
                set.edges
                    .retain(|edge| edge.from_task_id != id && edge.to_task_id != id);
                Ok(())
            })?;

        let time_path = self.storage.time_file(&project.id);
        let entries: Vec<TimeEntry> = self.storage.read_jsonl(&time_path)?;
        let kept: Vec<TimeEntry> = entries
            .into_iter()
            .filter(|entry| entry.task_id != task_id)
            .collect();
        self.storage.write_jsonl(&time_path, &kept)?;

        self.history.remove_task(&project.id, task_id)?;

        tracing::debug!(task = %task_id, "task deleted");
        Ok(())
    }

    fn require_epic(&self, project_id: &str, epic_id: &str) -> Result<()> {
        let set: crate::epic::EpicSet = self
            .storage
            .read_json_or(&self.storage.epics_file(project_id), crate::epic::EpicSet::empty)?;
        if set.epics.iter().any(|epic| epic.id == epic_id) {
            Ok(())
        } else {
            Err(Error::EpicNotFound(epic_id.to_string()))
        }
    }
}

fn apply_patch(
    task: &mut Task,
    patch: TaskPatch,
    project: &Project,
    actor: &str,
    changes: &mut Vec<TaskChange>,
) -> Result<()> {
    if let Some(title) = patch.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument(
                "task title cannot be empty".to_string(),
            ));
        }
        if title != task.title {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "title",
                Some(task.title.clone()),
                Some(title.clone()),
            ));
            task.title = title;
        }
    }

    if let Some(description) = patch.description {
        let next = normalize_text(description);
        if next != task.description {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "description",
                task.description.clone(),
                next.clone(),
            ));
            task.description = next;
        }
    }

    if let Some(kind) = patch.kind {
        if kind != task.kind {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "kind",
                Some(task.kind.to_string()),
                Some(kind.to_string()),
            ));
            task.kind = kind;
        }
    }

    if let Some(priority) = patch.priority {
        if priority != task.priority {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "priority",
                Some(task.priority.to_string()),
                Some(priority.to_string()),
            ));
            task.priority = priority;
        }
    }

    if let Some(status_id) = patch.status_id {
        // Validated against the stage list by the caller.
        if status_id != task.status_id {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "status_id",
                Some(task.status_id.clone()),
                Some(status_id.clone()),
            ));
            task.status_id = status_id;
        }
        let done = project.stage_is_done(&task.status_id);
        if done && task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        } else if !done && task.completed_at.is_some() {
            task.completed_at = None;
        }
    }

    if let Some(epic_id) = patch.epic_id {
        if epic_id != task.epic_id {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "epic_id",
                task.epic_id.clone(),
                epic_id.clone(),
            ));
            task.epic_id = epic_id;
        }
    }

    if let Some(assignee_id) = patch.assignee_id {
        if assignee_id != task.assignee_id {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "assignee_id",
                task.assignee_id.clone(),
                assignee_id.clone(),
            ));
            task.assignee_id = assignee_id;
        }
    }

    if let Some(story_points) = patch.story_points {
        if story_points != task.story_points {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "story_points",
                render(&task.story_points),
                render(&story_points),
            ));
            task.story_points = story_points;
        }
    }

    if let Some(estimated_hours) = patch.estimated_hours {
        if estimated_hours != task.estimated_hours {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "estimated_hours",
                render(&task.estimated_hours),
                render(&estimated_hours),
            ));
            task.estimated_hours = estimated_hours;
        }
    }

    if let Some(labels) = patch.labels {
        // Whole-set replacement; one row covers the swap.
        if labels != task.labels {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "labels",
                Some(task.labels.join(",")),
                Some(labels.join(",")),
            ));
            task.labels = labels;
        }
    }

    if let Some(sprint_id) = patch.sprint_id {
        if sprint_id != task.sprint_id {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "sprint_id",
                task.sprint_id.clone(),
                sprint_id.clone(),
            ));
            task.sprint_id = sprint_id;
        }
    }

    if let Some(position) = patch.position {
        if position != task.position {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "position",
                Some(task.position.to_string()),
                Some(position.to_string()),
            ));
            task.position = position;
        }
    }

    if let Some(due_date) = patch.due_date {
        if due_date != task.due_date {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "due_date",
                render(&task.due_date),
                render(&due_date),
            ));
            task.due_date = due_date;
        }
    }

    if let Some(start_date) = patch.start_date {
        if start_date != task.start_date {
            changes.push(TaskChange::new(
                &task.id,
                actor,
                "start_date",
                render(&task.start_date),
                render(&start_date),
            ));
            task.start_date = start_date;
        }
    }

    Ok(())
}

fn normalize_text(value: Option<String>) -> Option<String> {
    let value = value?;
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn render<T: fmt::Display>(value: &Option<T>) -> Option<String> {
    value.as_ref().map(|value| value.to_string())
}
