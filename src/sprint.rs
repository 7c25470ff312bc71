//! Sprint lifecycle.
//!
//! Sprints move PLANNING -> ACTIVE -> COMPLETED, forward only. A
//! project holds at most one active sprint; the check-and-set happens
//! inside the sprint document's lock. `planned_points` is always
//! recomputed from the persisted task set after assignment rather than
//! accumulated while iterating, so a partially failed bulk assignment
//! cannot leave a drifted total.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::project::Project;
use crate::storage::Storage;
use crate::task::TaskSet;

const SPRINTS_SCHEMA_VERSION: &str = "tempo.sprints.v1";

/// Sprint lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    Planning,
    Active,
    Completed,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Planning => "planning",
            SprintStatus::Active => "active",
            SprintStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sprint record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub status: SprintStatus,
    /// Planned window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Actual transitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Story points assigned at planning time, recomputed after
    /// assignment
    #[serde(default)]
    pub planned_points: u32,
    /// Story points sitting in a done stage when the sprint completed
    #[serde(default)]
    pub completed_points: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Fields accepted when creating a sprint
#[derive(Debug, Clone)]
pub struct NewSprint {
    pub name: String,
    pub goal: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewSprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: None,
            start_date: None,
            end_date: None,
        }
    }
}

/// Collection document for a project's sprints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintSet {
    pub schema_version: String,
    pub sprints: Vec<Sprint>,
}

impl SprintSet {
    pub fn empty() -> Self {
        Self {
            schema_version: SPRINTS_SCHEMA_VERSION.to_string(),
            sprints: Vec::new(),
        }
    }

    fn find_mut(&mut self, sprint_id: &str) -> Option<&mut Sprint> {
        self.sprints.iter_mut().find(|sprint| sprint.id == sprint_id)
    }
}

/// Store for a project's sprints
#[derive(Debug, Clone)]
pub struct SprintStore {
    storage: Storage,
}

impl SprintStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Create a sprint in the planning state
    pub fn create(&self, project: &Project, new: NewSprint, actor: &str) -> Result<Sprint> {
        self.create_with_status(project, new, SprintStatus::Planning, actor)
    }

    /// Create a sprint directly in the active state
    ///
    /// Used by the bulk-apply triage, which skips planning entirely.
    /// Unlike `start`, this does not refuse when another sprint is
    /// already active; the start transition owns that rule.
    pub fn create_active(&self, project: &Project, new: NewSprint, actor: &str) -> Result<Sprint> {
        self.create_with_status(project, new, SprintStatus::Active, actor)
    }

    fn create_with_status(
        &self,
        project: &Project,
        new: NewSprint,
        status: SprintStatus,
        actor: &str,
    ) -> Result<Sprint> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "sprint name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let sprint = Sprint {
            id: Uuid::new_v4().to_string(),
            project_id: project.id.clone(),
            name,
            goal: new.goal.filter(|goal| !goal.trim().is_empty()),
            status,
            start_date: new.start_date,
            end_date: new.end_date,
            started_at: if status == SprintStatus::Active {
                Some(now)
            } else {
                None
            },
            completed_at: None,
            planned_points: 0,
            completed_points: 0,
            created_at: now,
            updated_at: now,
            created_by: Some(actor.to_string()),
            updated_by: Some(actor.to_string()),
        };

        let path = self.storage.sprints_file(&project.id);
        let stored = sprint.clone();
        self.storage
            .update_json(&path, SprintSet::empty, move |set: &mut SprintSet| {
                set.sprints.push(sprint);
                Ok(())
            })?;

        tracing::info!(sprint = %stored.id, status = %stored.status, "sprint created");
        Ok(stored)
    }

    /// Fetch a sprint by id
    pub fn get(&self, project: &Project, sprint_id: &str) -> Result<Sprint> {
        let set: SprintSet = self
            .storage
            .read_json_or(&self.storage.sprints_file(&project.id), SprintSet::empty)?;
        set.sprints
            .into_iter()
            .find(|sprint| sprint.id == sprint_id)
            .ok_or_else(|| Error::SprintNotFound(sprint_id.to_string()))
    }

    /// List a project's sprints
    pub fn list(&self, project: &Project) -> Result<Vec<Sprint>> {
        let set: SprintSet = self
            .storage
            .read_json_or(&self.storage.sprints_file(&project.id), SprintSet::empty)?;
        Ok(set.sprints)
    }

    /// Count of sprints ever created for a project
    pub fn count(&self, project: &Project) -> Result<usize> {
        Ok(self.list(project)?.len())
    }

    /// Start a sprint
    ///
    /// Fails with `InvalidState` if the sprint is not in planning or
    /// another sprint of the project is already active. The whole
    /// check-and-set runs inside the document lock.
    pub fn start(&self, project: &Project, sprint_id: &str, actor: &str) -> Result<Sprint> {
        let path = self.storage.sprints_file(&project.id);
        let sprint_id = sprint_id.to_string();
        let actor = actor.to_string();
        let sprint = self
            .storage
            .update_json(&path, SprintSet::empty, move |set: &mut SprintSet| {
                let already_active = set
                    .sprints
                    .iter()
                    .any(|sprint| sprint.status == SprintStatus::Active && sprint.id != sprint_id);
                if already_active {
                    return Err(Error::InvalidState(
                        "another sprint is already active in this project".to_string(),
                    ));
                }

                let sprint = set
                    .find_mut(&sprint_id)
                    .ok_or_else(|| Error::SprintNotFound(sprint_id.clone()))?;
                if sprint.status != SprintStatus::Planning {
                    return Err(Error::InvalidState(format!(
                        "sprint cannot start from the {} state",
                        sprint.status
                    )));
                }

                let now = Utc::now();
                sprint.status = SprintStatus::Active;
                sprint.started_at = Some(now);
                sprint.updated_at = now;
                sprint.updated_by = Some(actor);
                Ok(sprint.clone())
            })?;

        tracing::info!(sprint = %sprint.id, "sprint started");
        Ok(sprint)
    }

    /// Complete a sprint
    ///
    /// Only an active sprint can complete. `completed_points` is the
    /// sum of story points over the sprint's tasks whose current stage
    /// is done-flagged. Unfinished tasks are left untouched; moving
    /// them is a separate, explicit action.
    pub fn complete(&self, project: &Project, sprint_id: &str, actor: &str) -> Result<Sprint> {
        let tasks: TaskSet = self
            .storage
            .read_json_or(&self.storage.tasks_file(&project.id), TaskSet::empty)?;
        let done_points: u32 = tasks
            .tasks
            .iter()
            .filter(|task| {
                task.sprint_id.as_deref() == Some(sprint_id)
                    && project.stage_is_done(&task.status_id)
            })
            .filter_map(|task| task.story_points)
            .sum();

        let path = self.storage.sprints_file(&project.id);
        let sprint_id = sprint_id.to_string();
        let actor = actor.to_string();
        let sprint = self
            .storage
            .update_json(&path, SprintSet::empty, move |set: &mut SprintSet| {
                let sprint = set
                    .find_mut(&sprint_id)
                    .ok_or_else(|| Error::SprintNotFound(sprint_id.clone()))?;
                if sprint.status != SprintStatus::Active {
                    return Err(Error::InvalidState(format!(
                        "sprint cannot complete from the {} state",
                        sprint.status
                    )));
                }

                let now = Utc::now();
                sprint.status = SprintStatus::Completed;
                sprint.completed_at = Some(now);
                sprint.completed_points = done_points;
                sprint.updated_at = now;
                sprint.updated_by = Some(actor);
                Ok(sprint.clone())
            })?;

        tracing::info!(
            sprint = %sprint.id,
            completed_points = sprint.completed_points,
            "sprint completed"
        );
        Ok(sprint)
    }

    /// Assign tasks to a sprint and recompute its planned points
    ///
    /// Points are re-read from the persisted task set after the
    /// assignment lands, never summed while iterating.
    pub fn assign_tasks(
        &self,
        project: &Project,
        sprint_id: &str,
        task_ids: &[String],
        actor: &str,
    ) -> Result<Sprint> {
        // Fail early on an unknown sprint rather than after moving tasks.
        let _ = self.get(project, sprint_id)?;

        let tasks_path = self.storage.tasks_file(&project.id);
        let sprint_ref = sprint_id.to_string();
        let wanted: Vec<String> = task_ids.to_vec();
        self.storage
            .update_json(&tasks_path, TaskSet::empty, move |set: &mut TaskSet| {
                for task_id in &wanted {
                    let task = set
                        .tasks
                        .iter_mut()
                        .find(|task| task.id == *task_id)
                        .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
                    task.sprint_id = Some(sprint_ref.clone());
                    task.updated_at = Utc::now();
                }
                Ok(())
            })?;

        let tasks: TaskSet = self
            .storage
            .read_json_or(&self.storage.tasks_file(&project.id), TaskSet::empty)?;
        let planned: u32 = tasks
            .tasks
            .iter()
            .filter(|task| task.sprint_id.as_deref() == Some(sprint_id))
            .filter_map(|task| task.story_points)
            .sum();

        let path = self.storage.sprints_file(&project.id);
        let sprint_id = sprint_id.to_string();
        let actor = actor.to_string();
        self.storage
            .update_json(&path, SprintSet::empty, move |set: &mut SprintSet| {
                let sprint = set
                    .find_mut(&sprint_id)
                    .ok_or_else(|| Error::SprintNotFound(sprint_id.clone()))?;
                sprint.planned_points = planned;
                sprint.updated_at = Utc::now();
                sprint.updated_by = Some(actor);
                Ok(sprint.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::project::ProjectStore;
    use crate::task::{NewTask, TaskPatch, TaskStore};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Project, TaskStore, SprintStore) {
        let dir = TempDir::new().expect("tempdir");
        let storage = Storage::new(dir.path());
        let config = PlanningConfig::default();
        let projects = ProjectStore::new(storage.clone(), config.clone());
        let project = projects
            .create("Apollo", "APO", None, Vec::new(), "alice")
            .expect("project");
        let tasks = TaskStore::new(storage.clone(), config);
        (dir, project, tasks, SprintStore::new(storage))
    }

    #[test]
    fn start_enforces_single_active_sprint() {
        let (_dir, project, _tasks, sprints) = setup();
        let first = sprints
            .create(&project, NewSprint::new("Sprint 1"), "alice")
            .expect("create");
        let second = sprints
            .create(&project, NewSprint::new("Sprint 2"), "alice")
            .expect("create");

        let started = sprints
            .start(&project, &first.id, "alice")
            .expect("start first");
        assert_eq!(started.status, SprintStatus::Active);
        assert!(started.started_at.is_some());

        let err = sprints
            .start(&project, &second.id, "alice")
            .expect_err("second active");
        assert!(matches!(err, Error::InvalidState(_)));

        // Completing the first frees the slot.
        sprints
            .complete(&project, &first.id, "alice")
            .expect("complete");
        sprints
            .start(&project, &second.id, "alice")
            .expect("start second");
    }

    #[test]
    fn transitions_are_forward_only() {
        let (_dir, project, _tasks, sprints) = setup();
        let sprint = sprints
            .create(&project, NewSprint::new("Sprint 1"), "alice")
            .expect("create");

        let err = sprints
            .complete(&project, &sprint.id, "alice")
            .expect_err("complete from planning");
        assert!(matches!(err, Error::InvalidState(_)));

        sprints.start(&project, &sprint.id, "alice").expect("start");
        sprints
            .complete(&project, &sprint.id, "alice")
            .expect("complete");

        let err = sprints
            .start(&project, &sprint.id, "alice")
            .expect_err("restart completed");
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn assign_tasks_recomputes_planned_points() {
        let (_dir, project, tasks, sprints) = setup();
        let sprint = sprints
            .create(&project, NewSprint::new("Sprint 1"), "alice")
            .expect("create");

        let mut ids = Vec::new();
        for (title, points) in [("A", Some(3)), ("B", Some(5)), ("C", None)] {
            let mut new = NewTask::new(title);
            new.story_points = points;
            ids.push(tasks.create(&project, new, "alice").expect("task").id);
        }

        let updated = sprints
            .assign_tasks(&project, &sprint.id, &ids, "alice")
            .expect("assign");
        assert_eq!(updated.planned_points, 8);

        for id in &ids {
            let task = tasks.get(&project, id).expect("task");
            assert_eq!(task.sprint_id.as_deref(), Some(sprint.id.as_str()));
        }
    }

    #[test]
    fn complete_counts_only_done_stage_points() {
        let (_dir, project, tasks, sprints) = setup();
        let sprint = sprints
            .create(&project, NewSprint::new("Sprint 1"), "alice")
            .expect("create");
        sprints.start(&project, &sprint.id, "alice").expect("start");

        let done_stage = project
            .stages
            .iter()
            .find(|stage| stage.is_done)
            .expect("done stage")
            .id
            .clone();

        let mut finished = NewTask::new("Finished");
        finished.story_points = Some(3);
        let finished = tasks.create(&project, finished, "alice").expect("task");
        let mut open = NewTask::new("Open");
        open.story_points = Some(5);
        let open = tasks.create(&project, open, "alice").expect("task");

        sprints
            .assign_tasks(
                &project,
                &sprint.id,
                &[finished.id.clone(), open.id.clone()],
                "alice",
            )
            .expect("assign");

        let patch = TaskPatch {
            status_id: Some(done_stage),
            ..TaskPatch::default()
        };
        tasks
            .update(&project, &finished.id, patch, "alice")
            .expect("finish one");

        let completed = sprints
            .complete(&project, &sprint.id, "alice")
            .expect("complete");
        assert_eq!(completed.planned_points, 8);
        assert_eq!(completed.completed_points, 3);
        assert!(completed.completed_at.is_some());

        // Unfinished work stays assigned to the completed sprint.
        let open = tasks.get(&project, &open.id).expect("open");
        assert_eq!(open.sprint_id.as_deref(), Some(sprint.id.as_str()));
    }

    #[test]
    fn create_active_skips_planning() {
        let (_dir, project, _tasks, sprints) = setup();
        let sprint = sprints
            .create_active(&project, NewSprint::new("Kickoff"), "alice")
            .expect("create active");
        assert_eq!(sprint.status, SprintStatus::Active);
        assert!(sprint.started_at.is_some());
    }

    #[test]
    fn unknown_sprint_is_not_found() {
        let (_dir, project, _tasks, sprints) = setup();
        let err = sprints
            .start(&project, "missing", "alice")
            .expect_err("unknown sprint");
        assert!(matches!(err, Error::SprintNotFound(_)));
    }
}
