//! Bulk plan application and sprint triage.
//!
//! One call applies a whole batch of epics and tasks (manual bulk
//! entry, an imported plan, or a generated one), then decides which
//! top-level tasks seed an automatically created sprint and which stay
//! in the backlog.
//!
//! Candidate rules, applied to top-level tasks only:
//!
//! - import mode: `InProgress` is always a candidate; `Done` never is
//!   (the task is created already completed); `Todo` or no status
//!   qualifies only at high or critical priority.
//! - new mode: every task is nominally todo; high or critical priority
//!   qualifies.
//!
//! A failure on one item is logged and skipped, never aborts the
//! batch. The created sprint's planned points are re-read from the
//! persisted task set, not accumulated while iterating.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::config::PlanningConfig;
use crate::epic::{EpicStatus, EpicStore, NewEpic};
use crate::error::Result;
use crate::project::Project;
use crate::sprint::{NewSprint, SprintStore};
use crate::status::AbstractStatus;
use crate::storage::Storage;
use crate::task::{NewTask, Priority, TaskKind, TaskStore};

/// How the incoming plan should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Freshly authored plan; incoming statuses are ignored
    New,
    /// Externally tracked plan; items carry their own status
    Import,
}

/// A batch of epics and tasks to materialize in one operation
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub epics: Vec<PlanEpic>,
    /// Top-level tasks with no epic
    pub tasks: Vec<PlanTask>,
    /// Provenance flag stamped onto everything the plan creates
    pub ai_generated: bool,
}

/// An epic and its tasks within a plan
#[derive(Debug, Clone)]
pub struct PlanEpic {
    pub title: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub status: Option<AbstractStatus>,
    pub tasks: Vec<PlanTask>,
}

impl PlanEpic {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            color: None,
            status: None,
            tasks: Vec::new(),
        }
    }
}

/// A top-level task within a plan
#[derive(Debug, Clone)]
pub struct PlanTask {
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub priority: Priority,
    /// Only honored in import mode
    pub status: Option<AbstractStatus>,
    pub story_points: Option<u32>,
    pub estimated_hours: Option<f64>,
    pub ai_estimated: bool,
    pub subtasks: Vec<PlanSubtask>,
}

impl PlanTask {
    pub fn new(title: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            description: None,
            kind: TaskKind::Task,
            priority,
            status: None,
            story_points: None,
            estimated_hours: None,
            ai_estimated: false,
            subtasks: Vec::new(),
        }
    }
}

/// A subtask within a plan; never triaged directly
#[derive(Debug, Clone)]
pub struct PlanSubtask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<AbstractStatus>,
    pub estimated_hours: Option<f64>,
}

impl PlanSubtask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: None,
            estimated_hours: None,
        }
    }
}

/// Summary of the sprint the triage created, if any
#[derive(Debug, Clone, Serialize)]
pub struct SprintSummary {
    pub id: String,
    pub name: String,
    pub planned_points: u32,
    pub task_count: usize,
}

/// What one bulk apply actually created
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub epics_created: usize,
    /// Subtasks included
    pub tasks_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint: Option<SprintSummary>,
    /// Top-level tasks left without a sprint
    pub backlog_count: usize,
}

/// Applies plans against one storage root
#[derive(Debug, Clone)]
pub struct Triage {
    config: PlanningConfig,
    epics: EpicStore,
    tasks: TaskStore,
    sprints: SprintStore,
}

impl Triage {
    pub fn new(storage: Storage, config: PlanningConfig) -> Self {
        Self {
            epics: EpicStore::new(storage.clone()),
            tasks: TaskStore::new(storage.clone(), config.clone()),
            sprints: SprintStore::new(storage),
            config,
        }
    }

    /// Apply a plan and triage its top-level tasks
    pub fn apply(
        &self,
        project: &Project,
        plan: Plan,
        mode: ApplyMode,
        actor: &str,
    ) -> Result<ApplyReport> {
        let mut epics_created = 0;
        let mut tasks_created = 0;
        let mut top_level_created = 0;
        let mut candidates: Vec<String> = Vec::new();

        for plan_epic in plan.epics {
            let mut new = NewEpic::new(plan_epic.title.clone());
            new.description = plan_epic.description;
            new.color = plan_epic.color;
            new.status = epic_status(mode, plan_epic.status);
            new.ai_generated = plan.ai_generated;

            let epic = match self.epics.create(&project.id, &project.code, new, actor) {
                Ok(epic) => epic,
                Err(err) => {
                    tracing::warn!(title = %plan_epic.title, error = %err, "skipping epic from plan");
                    continue;
                }
            };
            epics_created += 1;

            for plan_task in plan_epic.tasks {
                self.apply_task(
                    project,
                    Some(epic.id.clone()),
                    plan_task,
                    mode,
                    plan.ai_generated,
                    actor,
                    &mut tasks_created,
                    &mut top_level_created,
                    &mut candidates,
                );
            }
        }

        for plan_task in plan.tasks {
            self.apply_task(
                project,
                None,
                plan_task,
                mode,
                plan.ai_generated,
                actor,
                &mut tasks_created,
                &mut top_level_created,
                &mut candidates,
            );
        }

        let sprint = if candidates.is_empty() {
            None
        } else {
            let now = Utc::now();
            let number = self.sprints.count(project)? + 1;
            let mut new = NewSprint::new(format!("Sprint {number}"));
            new.start_date = Some(now);
            new.end_date = Some(now + Duration::days(self.config.sprint.length_days));

            let sprint = self.sprints.create_active(project, new, actor)?;
            let sprint = self
                .sprints
                .assign_tasks(project, &sprint.id, &candidates, actor)?;
            Some(SprintSummary {
                id: sprint.id,
                name: sprint.name,
                planned_points: sprint.planned_points,
                task_count: candidates.len(),
            })
        };

        let backlog_count = top_level_created - candidates.len();
        tracing::info!(
            epics_created,
            tasks_created,
            backlog_count,
            sprint_created = sprint.is_some(),
            "plan applied"
        );

        Ok(ApplyReport {
            epics_created,
            tasks_created,
            sprint,
            backlog_count,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_task(
        &self,
        project: &Project,
        epic_id: Option<String>,
        plan_task: PlanTask,
        mode: ApplyMode,
        ai_generated: bool,
        actor: &str,
        tasks_created: &mut usize,
        top_level_created: &mut usize,
        candidates: &mut Vec<String>,
    ) {
        let status = incoming_status(mode, plan_task.status);

        let mut new = NewTask::new(plan_task.title.clone());
        new.description = plan_task.description;
        new.kind = plan_task.kind;
        new.priority = plan_task.priority;
        new.status = status;
        new.epic_id = epic_id.clone();
        new.story_points = plan_task.story_points;
        new.estimated_hours = plan_task.estimated_hours;
        new.ai_generated = ai_generated;
        new.ai_estimated = plan_task.ai_estimated;

        let task = match self.tasks.create(project, new, actor) {
            Ok(task) => task,
            Err(err) => {
                tracing::warn!(title = %plan_task.title, error = %err, "skipping task from plan");
                return;
            }
        };
        *tasks_created += 1;
        *top_level_created += 1;

        if is_candidate(mode, status, plan_task.priority) {
            candidates.push(task.id.clone());
        }

        for plan_subtask in plan_task.subtasks {
            let mut new = NewTask::new(plan_subtask.title.clone());
            new.description = plan_subtask.description;
            new.kind = TaskKind::Subtask;
            new.priority = plan_task.priority;
            new.status = incoming_status(mode, plan_subtask.status);
            new.epic_id = epic_id.clone();
            new.parent_id = Some(task.id.clone());
            new.estimated_hours = plan_subtask.estimated_hours;
            new.ai_generated = ai_generated;

            match self.tasks.create(project, new, actor) {
                Ok(_) => *tasks_created += 1,
                Err(err) => {
                    tracing::warn!(
                        title = %plan_subtask.title,
                        error = %err,
                        "skipping subtask from plan"
                    );
                }
            }
        }
    }
}

/// Whether a freshly created top-level task seeds the initial sprint
fn is_candidate(mode: ApplyMode, status: Option<AbstractStatus>, priority: Priority) -> bool {
    match mode {
        ApplyMode::New => priority.is_sprint_worthy(),
        ApplyMode::Import => match status {
            Some(AbstractStatus::InProgress) => true,
            Some(AbstractStatus::Done) => false,
            Some(AbstractStatus::Todo) | None => priority.is_sprint_worthy(),
        },
    }
}

/// Statuses only travel in import mode; a new plan is all todo
fn incoming_status(mode: ApplyMode, status: Option<AbstractStatus>) -> Option<AbstractStatus> {
    match mode {
        ApplyMode::New => None,
        ApplyMode::Import => status,
    }
}

fn epic_status(mode: ApplyMode, status: Option<AbstractStatus>) -> EpicStatus {
    match incoming_status(mode, status) {
        Some(AbstractStatus::InProgress) => EpicStatus::InProgress,
        Some(AbstractStatus::Done) => EpicStatus::Done,
        Some(AbstractStatus::Todo) | None => EpicStatus::Todo,
    }
}
